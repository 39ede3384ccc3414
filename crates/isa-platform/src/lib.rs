//! Hardware-facing seams shared by the ISA PnP enumerator and the NE2000
//! driver: x86 port I/O, a legacy interrupt controller, and the "halt until
//! the next interrupt" hook used by blocking consumers.
//!
//! Drivers only ever see the [`PortIo`] trait. A kernel integration backs it
//! with real `in`/`out` instructions; tests back it with an [`IoPortBus`]
//! populated by simulated cards.
#![forbid(unsafe_code)]

pub mod halt;
pub mod interrupts;
pub mod io;

pub use halt::Halt;
pub use interrupts::{InterruptController, IrqRouter};
pub use io::{IoPortBus, PortIo, PortIoDevice};
