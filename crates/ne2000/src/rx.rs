//! Interrupt-context receive pipeline: drain the card's ring buffer into the
//! frame queue.

use etherframe::{EtherType, EthernetFrame, MacAddr};
use isa_platform::PortIo;
use tracing::{debug, warn};

use crate::driver::Ne2000;
use crate::regs::{page0, FIFO};

/// Shortest frame the wire can legally carry (header + minimum payload +
/// FCS). Anything shorter is a runt.
pub const MIN_WIRE_LEN: u16 = 64;

/// Bytes of every wire frame that do not land in the payload buffer:
/// destination MAC, source MAC, Ethertype, and the hardware-validated FCS.
const NON_PAYLOAD_LEN: u16 = 6 + 6 + 2 + 4;

impl<P: PortIo> Ne2000<P> {
    /// Services a NIC interrupt.
    ///
    /// Drains every complete frame between the driver's read pointer and the
    /// card's current-page pointer, then acknowledges the interrupt-status
    /// bits that were set. Errors are all local to a single frame: a runt, an
    /// Ethernet-I frame or a failed payload allocation drops that frame only
    /// and the loop continues.
    pub fn handle_interrupt(&mut self) {
        while self.next_pkt != self.current_read() {
            // The 4-byte ring header: receive status, next-page pointer, then
            // the frame's total on-wire length.
            self.remote_start_address_write(u16::from(self.next_pkt) << 8);
            self.remote_byte_count_write(4);
            self.remote_dma_read();

            let header = self.io.inw(self.iobase + FIFO);
            self.next_pkt = (header >> 8) as u8;
            let wire_len = self.io.inw(self.iobase + FIFO);

            if wire_len >= MIN_WIRE_LEN {
                self.receive_frame(wire_len);
            } else {
                warn!(wire_len, "runt frame received; discarded");
                self.stats.runts += 1;
            }

            self.remote_dma_stop();
            // Pages behind the new read position are reclaimable.
            self.boundary_write(self.next_pkt.wrapping_sub(1));
        }

        self.select_page(0);
        let status = self.io.inb(self.iobase + page0::ISR);
        self.io.outb(self.iobase + page0::ISR, status);
    }

    /// Streams one frame's addressing fields and payload out of the FIFO and
    /// enqueues it. The remote-DMA read set up by the caller continues from
    /// byte 4 of the ring entry.
    fn receive_frame(&mut self, wire_len: u16) {
        let payload_len = usize::from(wire_len - NON_PAYLOAD_LEN);

        let mut payload = Vec::new();
        if payload.try_reserve_exact(payload_len).is_err() {
            warn!(payload_len, "payload allocation failed; frame dropped");
            self.stats.dropped += 1;
            return;
        }

        let dst = self.read_mac();
        let src = self.read_mac();
        // The FIFO yields little-endian words; the wire is big-endian.
        let ethertype = EtherType(self.io.inw(self.iobase + FIFO).swap_bytes());

        if !ethertype.is_ethernet_ii() {
            warn!(%ethertype, "Ethernet-I frame (not supported); discarded");
            self.stats.dropped += 1;
            return;
        }

        for _ in 0..payload_len / 2 {
            let word = self.io.inw(self.iobase + FIFO);
            payload.extend_from_slice(&word.to_le_bytes());
        }
        if payload_len % 2 != 0 {
            payload.push(self.io.inb(self.iobase + FIFO));
        }

        debug!(%ethertype, payload_len, "frame received");
        self.stats.frames += 1;
        self.queue.enqueue(EthernetFrame {
            dst,
            src,
            ethertype,
            payload,
        });
    }

    fn read_mac(&mut self) -> MacAddr {
        let mut bytes = [0u8; 6];
        for pair in bytes.chunks_exact_mut(2) {
            let word = self.io.inw(self.iobase + FIFO);
            pair.copy_from_slice(&word.to_le_bytes());
        }
        MacAddr(bytes)
    }
}
