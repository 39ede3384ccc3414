//! Driver context and the initialization state machine.

use std::cell::RefCell;
use std::rc::Rc;

use etherframe::FrameQueue;
use isa_platform::{InterruptController, PortIo};
use isa_pnp::AssignedResources;
use thiserror::Error;
use tracing::{debug, info};

use crate::regs::{
    page0, page1, Command, DataConfig, InterruptMask, InterruptStatus, ReceiveConfig,
    TransmitConfig, CR, FIFO, FIRST_RX_PAGE, RESET, RING_START, RING_STOP,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InitError {
    /// The PROM read back as a floating bus; nothing is decoding the I/O
    /// range the PnP layer assigned.
    #[error("no NE2000 responding at I/O base {iobase:#05x}")]
    NoCard { iobase: u16 },
}

/// Receive-path counters, readable while the driver runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStats {
    /// Frames enqueued for the protocol layer.
    pub frames: u64,
    /// Frames under the 64-byte Ethernet minimum, discarded.
    pub runts: u64,
    /// Frames dropped for any other reason (Ethernet-I framing, allocation
    /// failure).
    pub dropped: u64,
}

/// Driver context for one NE2000 card.
///
/// Created once the PnP layer has assigned the card an I/O base and IRQ, and
/// lives for the lifetime of the kernel. Shared between the main context and
/// the interrupt closure via [`SharedNe2000`].
pub struct Ne2000<P: PortIo> {
    pub(crate) io: P,
    pub(crate) iobase: u16,
    page: u8,
    prom: [u8; 32],
    pub(crate) next_pkt: u8,
    pub(crate) queue: FrameQueue,
    irq: u8,
    pub(crate) stats: RxStats,
}

pub type SharedNe2000<P> = Rc<RefCell<Ne2000<P>>>;

impl<P: PortIo> std::fmt::Debug for Ne2000<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ne2000")
            .field("iobase", &self.iobase)
            .field("irq", &self.irq)
            .field("page", &self.page)
            .field("next_pkt", &self.next_pkt)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<P: PortIo> Ne2000<P> {
    /// Brings the card from reset to running: reset, basic page-0 setup in
    /// loopback, MAC programming, receive-ring configuration, interrupt
    /// enable, loopback clear. Interrupt delivery additionally requires
    /// [`install_interrupt_handler`].
    pub fn initialize(
        io: P,
        iobase: u16,
        irq: u8,
        queue: FrameQueue,
    ) -> Result<Self, InitError> {
        let mut ne = Self {
            io,
            iobase,
            page: 0,
            prom: [0; 32],
            next_pkt: FIRST_RX_PAGE,
            queue,
            irq,
            stats: RxStats::default(),
        };

        ne.reset();
        ne.basic_init();
        ne.program_mac()?;
        ne.configure_ring();
        ne.start();
        ne.enable_interrupts();
        ne.clear_loopback();

        info!(
            iobase = format_args!("{iobase:#05x}"),
            irq,
            mac = %format_args!(
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                ne.prom[0], ne.prom[1], ne.prom[2], ne.prom[3], ne.prom[4], ne.prom[5]
            ),
            "NE2000 running"
        );
        Ok(ne)
    }

    /// Initializes from the resources the PnP configurator committed.
    pub fn from_assigned(
        io: P,
        assigned: AssignedResources,
        queue: FrameQueue,
    ) -> Result<Self, InitError> {
        Self::initialize(io, assigned.io_base, assigned.irq, queue)
    }

    pub fn irq(&self) -> u8 {
        self.irq
    }

    /// The burned-in MAC address from the first six PROM bytes.
    pub fn mac(&self) -> [u8; 6] {
        self.prom[..6].try_into().unwrap_or([0; 6])
    }

    pub fn stats(&self) -> RxStats {
        self.stats
    }

    pub fn queue(&self) -> FrameQueue {
        self.queue.clone()
    }

    /// Toggle the reset register, then wait for the card to report reset
    /// state. There is no watchdog: a card that never leaves reset hangs
    /// initialization, by design of the surrounding kernel.
    fn reset(&mut self) {
        let value = self.io.inb(self.iobase + RESET);
        self.io.outb(self.iobase + RESET, value);
        while self.io.inb(self.iobase + page0::ISR) & InterruptStatus::RESET_STATUS.bits() == 0 {
            self.io.io_delay();
        }
    }

    /// Page 0, card stopped: word-wide DMA in internal loopback, remote byte
    /// count cleared, receive broadcast, transmit loopback.
    fn basic_init(&mut self) {
        self.command_write((Command::STOP | Command::DMA_ABORT).bits());
        self.page = 0;
        self.io.outb(
            self.iobase + page0::DCR,
            (DataConfig::WORD_WIDE | DataConfig::FIFO_4_WORDS).bits(),
        );
        self.remote_byte_count_write(0);
        self.io.outb(
            self.iobase + page0::RCR,
            ReceiveConfig::ACCEPT_BROADCAST.bits(),
        );
        self.io.outb(
            self.iobase + page0::TCR,
            TransmitConfig::INTERNAL_LOOPBACK.bits(),
        );
    }

    /// Fetches the 32-byte PROM via remote DMA from card address 0 and
    /// programs PAR0..PAR5 with the MAC in its first six bytes.
    fn program_mac(&mut self) -> Result<(), InitError> {
        self.remote_byte_count_write(32);
        self.remote_start_address_write(0);
        self.command_write((Command::START | Command::DMA_READ).bits());
        for byte in &mut self.prom {
            *byte = self.io.inb(self.iobase + FIFO);
        }
        if self.prom.iter().all(|b| *b == 0xFF) {
            return Err(InitError::NoCard { iobase: self.iobase });
        }

        self.select_page(1);
        for i in 0..6u16 {
            self.io
                .outb(self.iobase + page1::PAR0 + i, self.prom[usize::from(i)]);
        }
        Ok(())
    }

    /// Delimits the receive ring in card memory and seats the read pointer.
    fn configure_ring(&mut self) {
        self.select_page(0);
        self.io.outb(self.iobase + page0::PSTART, RING_START);
        self.io.outb(self.iobase + page0::PSTOP, RING_STOP);
        self.io.outb(self.iobase + page0::BNRY, RING_START);
        self.select_page(1);
        self.io.outb(self.iobase + page1::CURR, FIRST_RX_PAGE);
        self.next_pkt = FIRST_RX_PAGE;
    }

    /// Clears the stop bit and waits for the card to leave reset state.
    fn start(&mut self) {
        let page_bits = self.page << 6;
        self.command_write(Command::START.bits() | Command::DMA_ABORT.bits() | page_bits);
        while self.io.inb(self.iobase + page0::ISR) & InterruptStatus::RESET_STATUS.bits() != 0 {
            self.io.io_delay();
        }
    }

    fn enable_interrupts(&mut self) {
        self.select_page(0);
        self.io
            .outb(self.iobase + page0::ISR, InterruptStatus::all().bits());
        self.io
            .outb(self.iobase + page0::IMR, InterruptMask::ALL.bits());
    }

    fn clear_loopback(&mut self) {
        self.select_page(0);
        self.io.outb(
            self.iobase + page0::DCR,
            (DataConfig::WORD_WIDE | DataConfig::LOOPBACK_OFF | DataConfig::FIFO_4_WORDS).bits(),
        );
        self.io.outb(self.iobase + page0::TCR, 0);
    }

    /// Selects a register page. A no-op when the page is already active;
    /// pages past 2 silently fall back to page 0.
    pub fn select_page(&mut self, page: u8) {
        let page = if page > 2 { 0 } else { page };
        if self.page != page {
            self.page = page;
            let cr = self.command_read() & !Command::PAGE_FIELD;
            self.command_write(cr | (page << 6));
        }
    }

    /// Logs the card's ring pointers, interrupt status and error tallies.
    pub fn dump_state(&mut self) {
        let current = self.current_read();
        self.select_page(0);
        let boundary = self.io.inb(self.iobase + page0::BNRY);
        let isr = self.io.inb(self.iobase + page0::ISR);
        let frame = self.io.inb(self.iobase + page0::FRAME_ERRORS);
        let crc = self.io.inb(self.iobase + page0::CRC_ERRORS);
        let missed = self.io.inb(self.iobase + page0::MISSED_ERRORS);
        debug!(
            boundary = format_args!("{boundary:#04x}"),
            current = format_args!("{current:#04x}"),
            isr = format_args!("{isr:#04x}"),
            frame, crc, missed,
            "NE2000 state"
        );
    }

    // Remote-DMA verbs: field updates on the command register.

    pub fn remote_dma_read(&mut self) {
        let cr = self.command_read() & !Command::DMA_FIELD;
        self.command_write(cr | Command::DMA_READ.bits());
    }

    /// Kicks off the card's send-packet automation: the NIC transfers the
    /// packet under CLDA/CURR control without the host programming RSAR/RBCR.
    pub fn remote_send_packet(&mut self) {
        let cr = self.command_read() & !Command::DMA_FIELD;
        self.command_write(cr | Command::DMA_SEND_PACKET.bits());
    }

    pub fn remote_dma_stop(&mut self) {
        let cr = self.command_read() & !Command::DMA_FIELD;
        self.command_write(cr | Command::DMA_ABORT.bits());
    }

    // Register accessors. Each forces the page it needs; the command
    // register is page-independent.

    pub(crate) fn command_read(&mut self) -> u8 {
        self.io.inb(self.iobase + CR)
    }

    pub(crate) fn command_write(&mut self, value: u8) {
        self.io.outb(self.iobase + CR, value);
    }

    pub(crate) fn boundary_write(&mut self, value: u8) {
        self.select_page(0);
        self.io.outb(self.iobase + page0::BNRY, value);
    }

    pub(crate) fn current_read(&mut self) -> u8 {
        self.select_page(1);
        self.io.inb(self.iobase + page1::CURR)
    }

    pub(crate) fn remote_start_address_write(&mut self, addr: u16) {
        self.select_page(0);
        self.io.outb(self.iobase + page0::RSAR0, (addr & 0xFF) as u8);
        self.io.outb(self.iobase + page0::RSAR1, (addr >> 8) as u8);
    }

    pub(crate) fn remote_byte_count_write(&mut self, count: u16) {
        self.select_page(0);
        self.io.outb(self.iobase + page0::RBCR0, (count & 0xFF) as u8);
        self.io.outb(self.iobase + page0::RBCR1, (count >> 8) as u8);
    }
}

/// Wires the driver's interrupt handler into the interrupt controller and
/// unmasks its line.
pub fn install_interrupt_handler<P: PortIo + 'static>(
    ne: &SharedNe2000<P>,
    controller: &mut dyn InterruptController,
) {
    let irq = ne.borrow().irq;
    let shared = Rc::clone(ne);
    controller.register_handler(irq, Box::new(move || shared.borrow_mut().handle_interrupt()));
    controller.unmask(irq);
}
