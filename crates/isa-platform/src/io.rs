//! x86 I/O-port plumbing.
//!
//! [`PortIo`] is the driver-side view (what `outb`/`inb`/`outw`/`inw` look
//! like to code that owns a device). [`PortIoDevice`] is the device-side view;
//! [`IoPortBus`] routes driver accesses to registered devices and is the
//! hosted stand-in for the real ISA bus in tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Driver-side port I/O.
///
/// `io_delay` stands in for the calibrated busy-wait the PnP isolation
/// protocol inserts between bit reads; hosted implementations can leave it as
/// the default no-op.
pub trait PortIo {
    fn outb(&mut self, port: u16, value: u8);
    fn inb(&mut self, port: u16) -> u8;
    fn outw(&mut self, port: u16, value: u16);
    fn inw(&mut self, port: u16) -> u16;

    fn io_delay(&mut self) {}
}

impl<T: PortIo + ?Sized> PortIo for &mut T {
    fn outb(&mut self, port: u16, value: u8) {
        <T as PortIo>::outb(&mut **self, port, value);
    }

    fn inb(&mut self, port: u16) -> u8 {
        <T as PortIo>::inb(&mut **self, port)
    }

    fn outw(&mut self, port: u16, value: u16) {
        <T as PortIo>::outw(&mut **self, port, value);
    }

    fn inw(&mut self, port: u16) -> u16 {
        <T as PortIo>::inw(&mut **self, port)
    }

    fn io_delay(&mut self) {
        <T as PortIo>::io_delay(&mut **self);
    }
}

impl<T: PortIo + ?Sized> PortIo for Box<T> {
    fn outb(&mut self, port: u16, value: u8) {
        <T as PortIo>::outb(&mut **self, port, value);
    }

    fn inb(&mut self, port: u16) -> u8 {
        <T as PortIo>::inb(&mut **self, port)
    }

    fn outw(&mut self, port: u16, value: u16) {
        <T as PortIo>::outw(&mut **self, port, value);
    }

    fn inw(&mut self, port: u16) -> u16 {
        <T as PortIo>::inw(&mut **self, port)
    }

    fn io_delay(&mut self) {
        <T as PortIo>::io_delay(&mut **self);
    }
}

/// Shared-handle forwarding so a driver and an interrupt closure can address
/// the same bus.
impl<T: PortIo> PortIo for Rc<RefCell<T>> {
    fn outb(&mut self, port: u16, value: u8) {
        self.borrow_mut().outb(port, value);
    }

    fn inb(&mut self, port: u16) -> u8 {
        self.borrow_mut().inb(port)
    }

    fn outw(&mut self, port: u16, value: u16) {
        self.borrow_mut().outw(port, value);
    }

    fn inw(&mut self, port: u16) -> u16 {
        self.borrow_mut().inw(port)
    }

    fn io_delay(&mut self) {
        self.borrow_mut().io_delay();
    }
}

/// Device-side port I/O.
///
/// `size` is 1 or 2 (ISA byte/word accesses); a device that only decodes bytes
/// can ignore `size` and the bus will still hand it the full access.
pub trait PortIoDevice {
    fn read(&mut self, port: u16, size: u8) -> u16;
    fn write(&mut self, port: u16, size: u8, value: u16);

    /// Reset the device back to its power-on state.
    fn reset(&mut self) {}
}

struct RangeDevice {
    start: u16,
    len: u16,
    dev: Box<dyn PortIoDevice>,
}

impl RangeDevice {
    fn contains(&self, port: u16) -> bool {
        let p = u32::from(port);
        p >= u32::from(self.start) && p < u32::from(self.start) + u32::from(self.len)
    }
}

/// Routes port accesses to registered devices.
///
/// Exact-port registrations take precedence over range registrations.
/// Unclaimed ports float: reads return all-ones (`0xFF`/`0xFFFF`), which is
/// what an empty ISA bus returns and what the PnP I/O-range probe relies on.
pub struct IoPortBus {
    devices: HashMap<u16, Box<dyn PortIoDevice>>,
    ranges: Vec<RangeDevice>,
}

impl IoPortBus {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
            ranges: Vec::new(),
        }
    }

    pub fn register(&mut self, port: u16, device: Box<dyn PortIoDevice>) {
        self.devices.insert(port, device);
    }

    /// Register a device for a contiguous range of I/O ports.
    ///
    /// Ranges are searched only when no exact-port device claims the access.
    pub fn register_range(&mut self, start: u16, len: u16, dev: Box<dyn PortIoDevice>) {
        assert!(len != 0, "I/O port range length must be non-zero");
        let end_exclusive = u32::from(start) + u32::from(len);
        assert!(
            end_exclusive <= 0x1_0000,
            "I/O port range wraps past 0xFFFF: start={start:#x} len={len:#x}"
        );
        let idx = self.ranges.partition_point(|r| r.start < start);
        self.ranges.insert(idx, RangeDevice { start, len, dev });
    }

    /// Register per-port wrapper devices sharing one underlying implementation
    /// (typically behind `Rc<RefCell<...>>`).
    pub fn register_shared_range<F>(&mut self, start: u16, len: u16, mut make: F)
    where
        F: FnMut(u16) -> Box<dyn PortIoDevice>,
    {
        for offset in 0..len {
            let port = start.wrapping_add(offset);
            self.register(port, make(port));
        }
    }

    /// Unregister an exact-port handler, returning the removed device (if any).
    pub fn unregister(&mut self, port: u16) -> Option<Box<dyn PortIoDevice>> {
        self.devices.remove(&port)
    }

    pub fn reset(&mut self) {
        for dev in self.devices.values_mut() {
            dev.reset();
        }
        for range in &mut self.ranges {
            range.dev.reset();
        }
    }

    fn read(&mut self, port: u16, size: u8) -> u16 {
        if let Some(dev) = self.devices.get_mut(&port) {
            return dev.read(port, size);
        }
        if let Some(range) = self.ranges.iter_mut().find(|r| r.contains(port)) {
            return range.dev.read(port, size);
        }
        // Floating bus.
        if size == 1 {
            0xFF
        } else {
            0xFFFF
        }
    }

    fn write(&mut self, port: u16, size: u8, value: u16) {
        if let Some(dev) = self.devices.get_mut(&port) {
            dev.write(port, size, value);
            return;
        }
        if let Some(range) = self.ranges.iter_mut().find(|r| r.contains(port)) {
            range.dev.write(port, size, value);
        }
    }
}

impl Default for IoPortBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PortIo for IoPortBus {
    fn outb(&mut self, port: u16, value: u8) {
        self.write(port, 1, u16::from(value));
    }

    fn inb(&mut self, port: u16) -> u8 {
        self.read(port, 1) as u8
    }

    fn outw(&mut self, port: u16, value: u16) {
        self.write(port, 2, value);
    }

    fn inw(&mut self, port: u16) -> u16 {
        self.read(port, 2)
    }
}
