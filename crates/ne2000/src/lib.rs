//! NE2000-compatible NIC driver.
//!
//! Consumes the I/O base and IRQ line the ISA PnP configurator assigned,
//! brings the card from reset to a running, interrupt-driven receive state,
//! and drains arriving frames from the card's ring buffer into an
//! [`etherframe::FrameQueue`]. The protocol layer consumes frames through a
//! single blocking operation, [`recv::next_frame`].
#![forbid(unsafe_code)]

pub mod driver;
pub mod recv;
pub mod regs;
mod rx;

pub use driver::{install_interrupt_handler, InitError, Ne2000, RxStats, SharedNe2000};
pub use recv::next_frame;

use isa_pnp::DeviceId;

/// The PnP identity NE2000-compatible cards answer to.
pub const PNP_ID: DeviceId = DeviceId::new(*b"PNP", 0x80D6);
