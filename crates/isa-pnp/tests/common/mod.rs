//! Simulated PnP ISA card(s) behind an [`IoPortBus`].
//!
//! Models the pieces of card behavior the enumerator exercises: initiation-key
//! matching, serial isolation with wired-AND dropout between cards, CSN
//! assignment, resource-data streaming and the configuration register file.

// Not every test binary exercises every part of the simulation.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use isa_platform::{IoPortBus, PortIoDevice};
use isa_pnp::ident::DeviceId;
use isa_pnp::lfsr::{initiation_key, lfsr_shift, LFSR_SEED};
use isa_pnp::protocol::{reg, ADDRESS_PORT, WRITE_DATA_PORT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CardState {
    WaitForKey,
    Sleep,
    Isolation,
    Config,
}

pub struct SimPnpCard {
    /// 8 identifier bytes plus the LFSR checksum the card transmits.
    id_bytes: [u8; 9],
    resource_image: Vec<u8>,
    pub csn: u8,
    state: CardState,
    key_pos: usize,
    res_pos: usize,
    ldn: u8,
    /// (logical device, register) -> committed value.
    pub config: HashMap<(u8, u8), u8>,
    /// Logical devices that saw an ACTIVATE write.
    pub activated: Vec<u8>,
}

impl SimPnpCard {
    pub fn new(device: DeviceId, serial: u32, resource_image: Vec<u8>) -> Self {
        let mut id = [0u8; 9];
        id[..4].copy_from_slice(&device.to_wire());
        id[4..8].copy_from_slice(&serial.to_le_bytes());

        // Checksum over the 64 data bits in transmission order (LSB-first).
        let mut lfsr = LFSR_SEED;
        for byte in &id[..8] {
            for bit in 0..8 {
                lfsr = lfsr_shift(lfsr, (byte >> bit) & 1);
            }
        }
        id[8] = lfsr;

        Self {
            id_bytes: id,
            resource_image,
            csn: 0,
            state: CardState::WaitForKey,
            key_pos: 0,
            res_pos: 0,
            ldn: 0,
            config: HashMap::new(),
            activated: Vec::new(),
        }
    }

    /// Replaces the checksum byte of the transmitted identifier, for
    /// exercising the host-side mismatch path.
    pub fn corrupt_id_checksum(&mut self) {
        self.id_bytes[8] ^= 0x55;
    }

    fn id_bit(&self, index: usize) -> u8 {
        (self.id_bytes[index / 8] >> (index % 8)) & 1
    }

    fn track_key(&mut self, value: u8) {
        // Two zero writes reset the shift register, then the 32 key bytes.
        let expected: &[u8] = &initiation_key();
        if self.key_pos < 2 {
            self.key_pos = if value == 0 { self.key_pos + 1 } else { 0 };
            return;
        }
        if value == expected[self.key_pos - 2] {
            self.key_pos += 1;
            if self.key_pos == 2 + expected.len() {
                self.state = CardState::Sleep;
                self.key_pos = 0;
            }
        } else {
            self.key_pos = usize::from(value == 0);
        }
    }
}

/// All simulated cards plus the bus-level latches they share.
pub struct SimPnpField {
    pub cards: Vec<SimPnpCard>,
    address: u8,
    rd_port_bits: u8,
    iso_bit: usize,
    iso_high_phase: bool,
}

impl SimPnpField {
    pub fn new(cards: Vec<SimPnpCard>) -> Self {
        Self {
            cards,
            address: 0,
            rd_port_bits: 0,
            iso_bit: 0,
            iso_high_phase: false,
        }
    }

    fn read_port_addr(&self) -> u16 {
        (u16::from(self.rd_port_bits) << 2) | 3
    }

    /// One low/high sample of the current isolation bit period. Cards whose
    /// bit is 0 drop out of isolation at the end of a period another card
    /// drove.
    fn iso_sample(&mut self) -> u8 {
        if self.iso_bit >= 72 {
            return 0xFF;
        }
        let bit = self.iso_bit;
        let any_one = self
            .cards
            .iter()
            .any(|c| c.state == CardState::Isolation && c.id_bit(bit) == 1);

        let value = match (self.iso_high_phase, any_one) {
            (false, true) => 0x55,
            (true, true) => 0xAA,
            (_, false) => 0xFF,
        };

        if self.iso_high_phase {
            if any_one {
                for card in &mut self.cards {
                    if card.state == CardState::Isolation && card.id_bit(bit) == 0 {
                        card.state = CardState::Sleep;
                    }
                }
            }
            self.iso_bit += 1;
        }
        self.iso_high_phase = !self.iso_high_phase;
        value
    }

    fn config_card(&mut self) -> Option<&mut SimPnpCard> {
        self.cards.iter_mut().find(|c| c.state == CardState::Config)
    }

    fn read(&mut self, port: u16) -> u8 {
        if port != self.read_port_addr() {
            // Cards decode only the programmed read-data port.
            return 0xFF;
        }
        match self.address {
            reg::SERIAL_ISOLATION => self.iso_sample(),
            reg::STATUS => {
                if self.config_card().is_some() {
                    0x01
                } else {
                    0xFF
                }
            }
            reg::RESOURCE_DATA => match self.config_card() {
                Some(card) => {
                    let byte = card.resource_image.get(card.res_pos).copied().unwrap_or(0xFF);
                    card.res_pos += 1;
                    byte
                }
                None => 0xFF,
            },
            register => match self.config_card() {
                Some(card) => card.config.get(&(card.ldn, register)).copied().unwrap_or(0),
                None => 0xFF,
            },
        }
    }

    fn write(&mut self, port: u16, value: u8) {
        if port == ADDRESS_PORT {
            for card in &mut self.cards {
                if card.state == CardState::WaitForKey {
                    card.track_key(value);
                }
            }
            self.address = value;
            if value == reg::SERIAL_ISOLATION {
                self.iso_bit = 0;
                self.iso_high_phase = false;
            }
            return;
        }
        if port != WRITE_DATA_PORT {
            return;
        }
        match self.address {
            reg::SET_RD_DATA_PORT => self.rd_port_bits = value,
            reg::CONFIG_CONTROL => {
                if value & 0x04 != 0 {
                    for card in &mut self.cards {
                        card.csn = 0;
                    }
                }
            }
            reg::WAKE => {
                for card in &mut self.cards {
                    if card.state == CardState::WaitForKey {
                        continue;
                    }
                    if card.csn == value {
                        card.state = if value == 0 {
                            CardState::Isolation
                        } else {
                            CardState::Config
                        };
                        card.res_pos = 0;
                    } else {
                        card.state = CardState::Sleep;
                    }
                }
            }
            reg::CARD_SELECT_NUMBER => {
                for card in &mut self.cards {
                    if card.state == CardState::Isolation {
                        card.csn = value;
                        card.state = CardState::Config;
                    }
                }
            }
            reg::LOGICAL_DEVICE_NUMBER => {
                if let Some(card) = self.config_card() {
                    card.ldn = value;
                }
            }
            reg::ACTIVATE => {
                if let Some(card) = self.config_card() {
                    if value & 0x01 != 0 {
                        let ldn = card.ldn;
                        card.activated.push(ldn);
                    }
                }
            }
            register => {
                if let Some(card) = self.config_card() {
                    let ldn = card.ldn;
                    card.config.insert((ldn, register), value);
                }
            }
        }
    }
}

struct FieldPort(Rc<RefCell<SimPnpField>>);

impl PortIoDevice for FieldPort {
    fn read(&mut self, port: u16, _size: u8) -> u16 {
        u16::from(self.0.borrow_mut().read(port))
    }

    fn write(&mut self, port: u16, _size: u8, value: u16) {
        self.0.borrow_mut().write(port, value as u8);
    }
}

/// Builds an I/O bus with the given cards attached to the PnP ports and the
/// whole candidate read-port window.
pub fn pnp_fixture(
    cards: Vec<SimPnpCard>,
) -> (Rc<RefCell<IoPortBus>>, Rc<RefCell<SimPnpField>>) {
    let field = Rc::new(RefCell::new(SimPnpField::new(cards)));
    let mut bus = IoPortBus::new();
    bus.register(ADDRESS_PORT, Box::new(FieldPort(field.clone())));
    bus.register(WRITE_DATA_PORT, Box::new(FieldPort(field.clone())));
    // Cards listen across the whole candidate read-port window; ports other
    // than the programmed one read as floating.
    bus.register_range(0x200, 0x200, Box::new(FieldPort(field.clone())));
    (Rc::new(RefCell::new(bus)), field)
}

/// Appends an end tag whose checksum matches the running sum.
pub fn with_end_tag(mut bytes: Vec<u8>) -> Vec<u8> {
    bytes.push(0x79);
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    bytes.push(sum);
    bytes
}

pub fn ne2000_device_id() -> DeviceId {
    DeviceId::new(*b"PNP", 0x80D6)
}

/// Resource image of a typical NE2000 clone: one logical device offering
/// I/O `[0x280, 0x3FF]` (alignment 0x20, 32 ports) and IRQ mask bit 5,
/// high-true edge-sensitive.
pub fn ne2000_resource_image(id: DeviceId, compatible: Option<DeviceId>) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&[0x0A, 0x10, 0x00]); // PnP version 1.0
    bytes.push(0x15);
    bytes.extend_from_slice(&id.to_wire());
    bytes.push(0x00);
    if let Some(compat) = compatible {
        bytes.push(0x1C);
        bytes.extend_from_slice(&compat.to_wire());
    }
    bytes.extend_from_slice(&[0x47, 0x01, 0x80, 0x02, 0xFF, 0x03, 0x20, 0x20]);
    bytes.extend_from_slice(&[0x23, 0x20, 0x00, 0x01]);
    with_end_tag(bytes)
}

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
/// together with everything the enumerator logged.
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
