//! Polling-context consumer.

use etherframe::{EthernetFrame, FrameQueue};
use isa_platform::Halt;

/// Blocks until the next Ethernet-II frame is available and returns ownership
/// of it.
///
/// Between empty dequeue attempts the CPU idles via `halt` rather than
/// spinning; the enqueueing interrupt is what wakes it. There is no timeout:
/// if no frame ever arrives, this never returns.
pub fn next_frame(queue: &FrameQueue, halt: &mut impl Halt) -> EthernetFrame {
    loop {
        if let Some(frame) = queue.dequeue() {
            return frame;
        }
        halt.halt();
    }
}
