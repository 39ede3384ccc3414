//! The receive queue between interrupt context and the polling consumer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::frame::EthernetFrame;

/// Unbounded, insertion-ordered queue of owned frames.
///
/// The producer is an interrupt handler, so every operation must be
/// indivisible with respect to that interrupt. The mutex is the explicit
/// critical-section primitive standing in for a single-core
/// interrupt-disable guard: it is held only for the duration of the queue
/// mutation and released on every exit path.
///
/// Handles are cheap clones sharing the same queue.
#[derive(Clone, Default)]
pub struct FrameQueue {
    inner: Arc<Mutex<VecDeque<EthernetFrame>>>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, frame: EthernetFrame) {
        self.lock().push_back(frame);
    }

    /// Removes and returns the oldest frame, or `None` if the queue is empty.
    /// Never blocks waiting for a producer.
    pub fn dequeue(&self) -> Option<EthernetFrame> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<EthernetFrame>> {
        // A poisoned queue only means a producer panicked mid-push; the
        // structure itself is still consistent for VecDeque operations.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
