//! Simulated DP8390/NE2000 card behind an [`IoPortBus`].
//!
//! Models the register file, reset sequencing, PROM access and remote-DMA
//! reads the driver exercises, plus injection of received frames into the
//! ring buffer the way the card's local DMA would.

// Not every test binary touches every part of the simulation.
#![allow(dead_code)]

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use etherframe::FrameQueue;
use isa_platform::{IoPortBus, PortIoDevice};
use ne2000::Ne2000;

struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a formatting subscriber installed and returns its result
/// together with everything the driver logged.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let writer = Arc::clone(&buf);
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || LogBuffer(Arc::clone(&writer)))
        .finish();
    let value = tracing::subscriber::with_default(subscriber, f);
    let logged = String::from_utf8_lossy(&buf.lock().unwrap()).into_owned();
    (value, logged)
}

const CR: u16 = 0x00;
const FIFO: u16 = 0x10;
const RESET: u16 = 0x1F;

pub struct SimNic {
    iobase: u16,
    pub cr: u8,
    pub isr: u8,
    pub imr: u8,
    pub dcr: u8,
    pub rcr: u8,
    pub tcr: u8,
    pub pstart: u8,
    pub pstop: u8,
    pub bnry: u8,
    pub curr: u8,
    pub par: [u8; 6],
    rsar: u16,
    rbcr: u16,
    dma_addr: u16,
    pub prom: [u8; 32],
    mem: Vec<u8>,
    /// Total command-register writes, for asserting page-select behavior.
    pub cr_writes: u32,
}

impl SimNic {
    pub fn new(iobase: u16, mac: [u8; 6]) -> Self {
        let mut prom = [0u8; 32];
        prom[..6].copy_from_slice(&mac);
        // 'W' 'W' signature bytes NE2000 clones carry at the PROM tail.
        prom[30] = 0x57;
        prom[31] = 0x57;
        Self {
            iobase,
            cr: 0x21,
            isr: 0,
            imr: 0,
            dcr: 0,
            rcr: 0,
            tcr: 0,
            pstart: 0,
            pstop: 0,
            bnry: 0,
            curr: 0x40,
            par: [0; 6],
            rsar: 0,
            rbcr: 0,
            dma_addr: 0,
            prom,
            mem: vec![0; 0x1_0000],
            cr_writes: 0,
        }
    }

    fn page(&self) -> u8 {
        (self.cr >> 6) & 3
    }

    fn write_cr(&mut self, value: u8) {
        let old = self.cr;
        self.cr = value;
        self.cr_writes += 1;
        // Leaving stop mode clears reset state.
        if value & 0x02 != 0 && value & 0x01 == 0 {
            self.isr &= !0x80;
        }
        // A write that newly selects remote read latches the start address.
        if value & 0x38 == 0x08 && old & 0x38 != 0x08 {
            self.dma_addr = self.rsar;
        }
    }

    fn fifo_pop(&mut self) -> u8 {
        let addr = self.dma_addr;
        self.dma_addr = self.dma_addr.wrapping_add(1);
        self.rbcr = self.rbcr.wrapping_sub(1);
        // Card addresses below 32 map to the station-address PROM.
        if addr < 32 {
            self.prom[usize::from(addr)]
        } else {
            self.mem[usize::from(addr)]
        }
    }

    fn read(&mut self, port: u16, size: u8) -> u16 {
        let offset = port - self.iobase;
        match offset {
            CR => u16::from(self.cr),
            FIFO => {
                let lo = u16::from(self.fifo_pop());
                if size == 2 {
                    lo | (u16::from(self.fifo_pop()) << 8)
                } else {
                    lo
                }
            }
            RESET => {
                self.isr |= 0x80;
                0
            }
            0x03 if self.page() == 0 => u16::from(self.bnry),
            0x07 if self.page() == 0 => u16::from(self.isr),
            0x01..=0x06 if self.page() == 1 => u16::from(self.par[usize::from(offset) - 1]),
            0x07 if self.page() == 1 => u16::from(self.curr),
            // Error tallies and write-only registers.
            _ => 0,
        }
    }

    fn write(&mut self, port: u16, _size: u8, value: u16) {
        let offset = port - self.iobase;
        let value = value as u8;
        match offset {
            CR => self.write_cr(value),
            RESET => self.isr |= 0x80,
            0x01 if self.page() == 0 => self.pstart = value,
            0x02 if self.page() == 0 => self.pstop = value,
            0x03 if self.page() == 0 => self.bnry = value,
            0x07 if self.page() == 0 => self.isr &= !value,
            0x08 if self.page() == 0 => self.rsar = (self.rsar & 0xFF00) | u16::from(value),
            0x09 if self.page() == 0 => {
                self.rsar = (self.rsar & 0x00FF) | (u16::from(value) << 8)
            }
            0x0A if self.page() == 0 => self.rbcr = (self.rbcr & 0xFF00) | u16::from(value),
            0x0B if self.page() == 0 => {
                self.rbcr = (self.rbcr & 0x00FF) | (u16::from(value) << 8)
            }
            0x0C if self.page() == 0 => self.rcr = value,
            0x0D if self.page() == 0 => self.tcr = value,
            0x0E if self.page() == 0 => self.dcr = value,
            0x0F if self.page() == 0 => self.imr = value,
            0x01..=0x06 if self.page() == 1 => self.par[usize::from(offset) - 1] = value,
            0x07 if self.page() == 1 => self.curr = value,
            _ => {}
        }
    }

    /// Deposits one received frame into the ring with an arbitrary claimed
    /// wire length, advances CURR, and sets the packet-received status bit.
    pub fn inject_with_wire_len(
        &mut self,
        dst: [u8; 6],
        src: [u8; 6],
        ethertype: u16,
        payload: &[u8],
        wire_len: u16,
    ) {
        let start = usize::from(self.curr) << 8;
        let total = 4 + 14 + payload.len();

        self.mem[start] = 0x01; // receive status: packet received intact
        let pages = total.div_ceil(256) as u8;
        let mut next = self.curr + pages;
        if next >= self.pstop {
            next = self.pstart + (next - self.pstop);
        }
        self.mem[start + 1] = next;
        self.mem[start + 2] = (wire_len & 0xFF) as u8;
        self.mem[start + 3] = (wire_len >> 8) as u8;

        self.mem[start + 4..start + 10].copy_from_slice(&dst);
        self.mem[start + 10..start + 16].copy_from_slice(&src);
        self.mem[start + 16] = (ethertype >> 8) as u8;
        self.mem[start + 17] = (ethertype & 0xFF) as u8;
        self.mem[start + 18..start + 18 + payload.len()].copy_from_slice(payload);

        self.curr = next;
        self.isr |= 0x01;
    }

    /// Deposits a well-formed frame: the claimed wire length is the stored
    /// bytes plus the 4-byte FCS the card validated and stripped.
    pub fn inject_frame(&mut self, dst: [u8; 6], src: [u8; 6], ethertype: u16, payload: &[u8]) {
        let wire_len = (14 + payload.len() + 4) as u16;
        self.inject_with_wire_len(dst, src, ethertype, payload, wire_len);
    }
}

struct NicPort(Rc<RefCell<SimNic>>);

impl PortIoDevice for NicPort {
    fn read(&mut self, port: u16, size: u8) -> u16 {
        self.0.borrow_mut().read(port, size)
    }

    fn write(&mut self, port: u16, size: u8, value: u16) {
        self.0.borrow_mut().write(port, size, value);
    }
}

pub const MAC: [u8; 6] = [0x00, 0x1F, 0x11, 0x22, 0x33, 0x44];
pub const IOBASE: u16 = 0x300;
pub const IRQ: u8 = 5;

/// Bus with one simulated card at [`IOBASE`].
pub fn nic_fixture() -> (Rc<RefCell<IoPortBus>>, Rc<RefCell<SimNic>>) {
    let nic = Rc::new(RefCell::new(SimNic::new(IOBASE, MAC)));
    let mut bus = IoPortBus::new();
    bus.register_range(IOBASE, 0x20, Box::new(NicPort(nic.clone())));
    (Rc::new(RefCell::new(bus)), nic)
}

/// A fully initialized driver over [`nic_fixture`].
pub fn running_driver() -> (
    Ne2000<Rc<RefCell<IoPortBus>>>,
    Rc<RefCell<SimNic>>,
    FrameQueue,
) {
    let (bus, nic) = nic_fixture();
    let queue = FrameQueue::new();
    let ne = Ne2000::initialize(bus, IOBASE, IRQ, queue.clone())
        .expect("simulated card failed to initialize");
    (ne, nic, queue)
}
