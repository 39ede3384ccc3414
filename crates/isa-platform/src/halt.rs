//! CPU idle hook.

/// "Idle until the next interrupt".
///
/// On real hardware this is a `hlt` instruction; hosted implementations pump
/// whatever delivers interrupts (e.g. an `IrqRouter`) or park the thread. A
/// blocking consumer calls this between empty dequeue attempts so the CPU is
/// not spun uselessly while idle.
pub trait Halt {
    fn halt(&mut self);
}

impl<F: FnMut()> Halt for F {
    fn halt(&mut self) {
        self();
    }
}
