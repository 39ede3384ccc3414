//! ISA Plug-and-Play bus enumerator and configurator.
//!
//! Discovery on the PnP ISA bus is a bit-serial protocol: cards are woken with
//! a 32-byte LFSR-derived initiation key, isolated one at a time by reading 72
//! bits through dual-phase (`0xAA55`/`0xFFFF`) bus samples, and assigned Card
//! Select Numbers. Each card then streams a tagged resource-descriptor record
//! sequence describing its logical devices; the configurator picks concrete
//! I/O ranges and IRQ lines for one of them and writes the choices back
//! through the card's configuration registers.
//!
//! All hardware access goes through [`isa_platform::PortIo`], so the whole
//! cycle runs against simulated cards in this crate's integration tests.
#![forbid(unsafe_code)]

pub mod config;
pub mod enumerate;
pub mod ident;
pub mod lfsr;
pub mod protocol;
pub mod resource;

pub use config::{AssignedResources, ConfigError};
pub use enumerate::{enumerate, configure_matching, PnpDevice, MAX_DEVICES};
pub use ident::{CardId, DeviceId, IsolationError};
pub use protocol::PnpBus;
pub use resource::{CardResources, DecodeError, LogicalDevice};
