//! PnP register-level protocol verbs.
//!
//! All card configuration goes through three ports: an address port and a
//! write-data port at fixed ISA addresses, and a read-data port whose address
//! the host chooses during isolation. Writing a configuration register means
//! selecting its index via the address port, then writing the value to the
//! write-data port; reading means selecting, then reading the read port.

use isa_platform::PortIo;

use crate::lfsr::initiation_key;

/// Address port (write-only, shared by all cards).
pub const ADDRESS_PORT: u16 = 0x279;
/// Write-data port (write-only, shared by all cards).
pub const WRITE_DATA_PORT: u16 = 0xA79;

/// Lowest candidate read-data port address.
pub const READ_PORT_MIN: u16 = 0x203;
/// Highest candidate read-data port address.
pub const READ_PORT_MAX: u16 = 0x3FF;

/// Standard card configuration register indices.
pub mod reg {
    pub const SET_RD_DATA_PORT: u8 = 0x00;
    pub const SERIAL_ISOLATION: u8 = 0x01;
    pub const CONFIG_CONTROL: u8 = 0x02;
    pub const WAKE: u8 = 0x03;
    pub const RESOURCE_DATA: u8 = 0x04;
    pub const STATUS: u8 = 0x05;
    pub const CARD_SELECT_NUMBER: u8 = 0x06;
    pub const LOGICAL_DEVICE_NUMBER: u8 = 0x07;
    pub const ACTIVATE: u8 = 0x30;
    pub const IO_RANGE_CHECK: u8 = 0x31;
    pub const IO_BASE_HIGH: u8 = 0x60;
    pub const IRQ_LEVEL: u8 = 0x70;
    pub const IRQ_TYPE: u8 = 0x71;
}

/// CONFIG_CONTROL bit: reset all CSNs to 0.
const CONFIG_CONTROL_RESET_CSN: u8 = 0x04;

/// Host-side handle on the PnP configuration ports.
///
/// Owns the port-I/O handle and remembers the currently programmed read-data
/// port address.
pub struct PnpBus<P: PortIo> {
    pub(crate) io: P,
    pub(crate) read_port: u16,
}

impl<P: PortIo> PnpBus<P> {
    pub fn new(io: P) -> Self {
        Self {
            io,
            read_port: READ_PORT_MIN,
        }
    }

    /// The raw port-I/O handle, for the configurator's range probing.
    pub fn io(&mut self) -> &mut P {
        &mut self.io
    }

    pub fn read_port(&self) -> u16 {
        self.read_port
    }

    /// Enables the PnP logic on all cards. Must be issued before any other
    /// PnP I/O: the two zero writes reset every card's key shift register,
    /// then the 32 key bytes clock it to the match state.
    pub fn send_initiation_key(&mut self) {
        self.io.outb(ADDRESS_PORT, 0);
        self.io.outb(ADDRESS_PORT, 0);
        for byte in initiation_key() {
            self.io.outb(ADDRESS_PORT, byte);
        }
    }

    /// Resets all cards' CSNs to 0.
    pub fn reset_csns(&mut self) {
        self.write_config(reg::CONFIG_CONTROL, CONFIG_CONTROL_RESET_CSN);
    }

    /// Wakes the card with the given CSN, or all unconfigured cards if
    /// `csn == 0`.
    pub fn wake(&mut self, csn: u8) {
        self.write_config(reg::WAKE, csn);
    }

    /// Programs the read-data port address. Only bits 9:2 are transferred;
    /// the low two bits are expected to be set by convention.
    pub fn set_read_port(&mut self, port: u16) {
        self.read_port = port;
        self.write_config(reg::SET_RD_DATA_PORT, (port >> 2) as u8);
    }

    /// Selects the serial isolation register so the card in isolation state
    /// drives its identifier onto the read port.
    pub fn select_isolation(&mut self) {
        self.io.outb(ADDRESS_PORT, reg::SERIAL_ISOLATION);
    }

    /// Assigns a CSN to the card currently in isolation state, moving it to
    /// configuration state.
    pub fn set_csn(&mut self, csn: u8) {
        self.write_config(reg::CARD_SELECT_NUMBER, csn);
    }

    /// Selects a logical device on the card in configuration state.
    pub fn select_logical_device(&mut self, ldn: u8) {
        self.write_config(reg::LOGICAL_DEVICE_NUMBER, ldn);
    }

    pub fn write_config(&mut self, register: u8, value: u8) {
        self.io.outb(ADDRESS_PORT, register);
        self.io.outb(WRITE_DATA_PORT, value);
    }

    pub fn read_config(&mut self, register: u8) -> u8 {
        self.io.outb(ADDRESS_PORT, register);
        self.io.inb(self.read_port)
    }

    /// Reads one resource-data byte from the card in configuration state.
    ///
    /// Polls the STATUS ready bit until the card has fetched the next byte
    /// from its serial EEPROM. There is no timeout; a card that never asserts
    /// ready hangs the enumeration, matching the hardware-level contract.
    pub fn read_resource_byte(&mut self) -> u8 {
        while self.read_config(reg::STATUS) & 0x01 == 0 {
            self.io.io_delay();
        }
        self.read_config(reg::RESOURCE_DATA)
    }
}
