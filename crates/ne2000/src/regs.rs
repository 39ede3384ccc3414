//! DP8390 register map and register bit definitions.
//!
//! Most registers are banked behind the page-select bits of the command
//! register; offsets below are relative to the card's I/O base and grouped by
//! the page they live on. The command register and the data FIFO are
//! page-independent.

use bitflags::bitflags;

/// Command register (all pages).
pub const CR: u16 = 0x00;
/// Remote-DMA data FIFO (all pages).
pub const FIFO: u16 = 0x10;
/// Reset register: any read/write toggles a card reset.
pub const RESET: u16 = 0x1F;

pub mod page0 {
    pub const PSTART: u16 = 0x01;
    pub const PSTOP: u16 = 0x02;
    pub const BNRY: u16 = 0x03;
    pub const ISR: u16 = 0x07;
    pub const RSAR0: u16 = 0x08;
    pub const RSAR1: u16 = 0x09;
    pub const RBCR0: u16 = 0x0A;
    pub const RBCR1: u16 = 0x0B;
    pub const RCR: u16 = 0x0C;
    pub const TCR: u16 = 0x0D;
    pub const DCR: u16 = 0x0E;
    pub const IMR: u16 = 0x0F;

    // Read-side error tally registers (clear on read).
    pub const FRAME_ERRORS: u16 = 0x0D;
    pub const CRC_ERRORS: u16 = 0x0E;
    pub const MISSED_ERRORS: u16 = 0x0F;
}

pub mod page1 {
    /// Physical address registers PAR0..PAR5 at offsets 0x01..=0x06.
    pub const PAR0: u16 = 0x01;
    pub const CURR: u16 = 0x07;
}

/// First page of the receive ring buffer in card memory.
pub const RING_START: u8 = 0x40;
/// One past the last receive ring page.
pub const RING_STOP: u8 = 0x80;
/// Page the card writes the first received frame to (CURR's reset value).
pub const FIRST_RX_PAGE: u8 = RING_START + 1;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Command: u8 {
        const STOP = 0x01;
        const START = 0x02;
        const TRANSMIT = 0x04;
        const DMA_READ = 0x08;
        const DMA_WRITE = 0x10;
        const DMA_SEND_PACKET = 0x18;
        const DMA_ABORT = 0x20;
        const PAGE0 = 0x00;
        const PAGE1 = 0x40;
        const PAGE2 = 0x80;
    }
}

impl Command {
    /// Mask of the remote-DMA command field (bits 5:3).
    pub const DMA_FIELD: u8 = 0x38;
    /// Mask of the page-select field (bits 7:6).
    pub const PAGE_FIELD: u8 = 0xC0;
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterruptStatus: u8 {
        const PACKET_RECEIVED = 0x01;
        const PACKET_TRANSMITTED = 0x02;
        const RECEIVE_ERROR = 0x04;
        const TRANSMIT_ERROR = 0x08;
        const OVERWRITE_WARNING = 0x10;
        const COUNTER_OVERFLOW = 0x20;
        const REMOTE_DMA_COMPLETE = 0x40;
        const RESET_STATUS = 0x80;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterruptMask: u8 {
        const ALL = 0x7F;
    }
}

bitflags! {
    /// Data configuration register. LOOPBACK_OFF low means the FIFO is in
    /// internal loopback.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DataConfig: u8 {
        const WORD_WIDE = 0x01;
        const LOOPBACK_OFF = 0x08;
        const FIFO_4_WORDS = 0x40;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReceiveConfig: u8 {
        const ACCEPT_RUNTS = 0x02;
        const ACCEPT_BROADCAST = 0x04;
        const PROMISCUOUS = 0x10;
        const MONITOR = 0x20;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransmitConfig: u8 {
        const INTERNAL_LOOPBACK = 0x02;
    }
}
