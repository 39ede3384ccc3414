//! Legacy interrupt-controller seam.
//!
//! Drivers only need two verbs from the interrupt controller: install a
//! handler on an IRQ line and unmask that line. [`IrqRouter`] is the hosted
//! model of a single 8259-style controller: tests (and hosted integrations)
//! call [`IrqRouter::raise`] where real hardware would assert the line.

use tracing::warn;

pub type IrqHandler = Box<dyn FnMut()>;

pub const NUM_IRQ_LINES: usize = 16;

pub trait InterruptController {
    /// Install `handler` on `irq`. Replaces any previous handler on the line.
    fn register_handler(&mut self, irq: u8, handler: IrqHandler);

    /// Allow `irq` to be delivered.
    fn unmask(&mut self, irq: u8);
}

/// Dispatches raised IRQ lines to registered handlers.
///
/// Masked or handler-less lines are dropped with a diagnostic, mirroring what
/// an unprogrammed PIC would do with an unexpected line.
pub struct IrqRouter {
    handlers: [Option<IrqHandler>; NUM_IRQ_LINES],
    masked: u16,
}

impl IrqRouter {
    pub fn new() -> Self {
        Self {
            handlers: Default::default(),
            masked: 0xFFFF,
        }
    }

    pub fn is_masked(&self, irq: u8) -> bool {
        irq as usize >= NUM_IRQ_LINES || self.masked & (1 << irq) != 0
    }

    /// Assert `irq` and run its handler to completion.
    pub fn raise(&mut self, irq: u8) {
        if self.is_masked(irq) {
            warn!(irq, "spurious raise on masked IRQ line");
            return;
        }
        match &mut self.handlers[irq as usize] {
            Some(handler) => handler(),
            None => warn!(irq, "no handler installed for IRQ line"),
        }
    }
}

impl Default for IrqRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptController for IrqRouter {
    fn register_handler(&mut self, irq: u8, handler: IrqHandler) {
        assert!((irq as usize) < NUM_IRQ_LINES, "IRQ line out of range: {irq}");
        self.handlers[irq as usize] = Some(handler);
    }

    fn unmask(&mut self, irq: u8) {
        assert!((irq as usize) < NUM_IRQ_LINES, "IRQ line out of range: {irq}");
        self.masked &= !(1 << irq);
    }
}
