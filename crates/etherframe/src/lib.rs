//! Ethernet-II frame model, the interrupt-safe receive queue, and thin
//! Ethertype dispatch.
//!
//! This crate deals exclusively in owned frames: the NIC driver's interrupt
//! handler allocates and enqueues them, ownership transfers through the queue
//! to whichever consumer dequeues, and dropping the frame releases the
//! payload.
#![forbid(unsafe_code)]

pub mod dispatch;
pub mod frame;
pub mod queue;

pub use dispatch::{ArpLogger, Dispatcher, FrameSink};
pub use frame::{EtherType, EthernetFrame, MacAddr};
pub use queue::FrameQueue;
