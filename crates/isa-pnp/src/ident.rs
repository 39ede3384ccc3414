//! Card and logical-device identifiers, and the 72-bit serial isolation read.

use std::fmt;

use isa_platform::PortIo;
use thiserror::Error;
use tracing::trace;

use crate::lfsr::{lfsr_shift, LFSR_SEED};
use crate::protocol::PnpBus;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IsolationError {
    /// The bus returned something other than the two legal sample values.
    /// Either no card is responding or two cards lost synchronization.
    #[error("unexpected bus value {0:#06x} during isolation read")]
    UnexpectedBusValue(u16),

    /// All 72 bit periods completed but no card ever drove the 0xAA55 phase.
    #[error("no card asserted an identifier bit")]
    NoCardResponding,

    /// The transmitted 9th byte disagrees with the locally clocked LFSR.
    #[error("identifier checksum mismatch: computed {computed:#04x}, received {received:#04x}")]
    ChecksumMismatch { computed: u8, received: u8 },
}

/// EISA-style device identifier: a three-letter vendor code packed into 5-bit
/// fields plus a 16-bit product id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    vendor: [u8; 3],
    product: u16,
}

impl DeviceId {
    pub const fn new(vendor: [u8; 3], product: u16) -> Self {
        Self { vendor, product }
    }

    /// Decodes the 4-byte wire form: two bytes of 5-bit packed letters
    /// (offset `'A' - 1`), then the product id high and low bytes.
    pub fn from_wire(bytes: [u8; 4]) -> Self {
        const BASE: u8 = b'A' - 1;
        let c1 = (bytes[0] >> 2) & 0x1F;
        let c2 = ((bytes[0] & 0x03) << 3) | (bytes[1] >> 5);
        let c3 = bytes[1] & 0x1F;
        Self {
            vendor: [BASE + c1, BASE + c2, BASE + c3],
            product: u16::from_be_bytes([bytes[2], bytes[3]]),
        }
    }

    /// Encodes back to the 4-byte wire form. Inverse of [`Self::from_wire`];
    /// simulated cards use this to build identifier streams.
    pub fn to_wire(self) -> [u8; 4] {
        const BASE: u8 = b'A' - 1;
        let c1 = self.vendor[0] - BASE;
        let c2 = self.vendor[1] - BASE;
        let c3 = self.vendor[2] - BASE;
        let [hi, lo] = self.product.to_be_bytes();
        [(c1 << 2) | (c2 >> 3), ((c2 & 0x07) << 5) | c3, hi, lo]
    }

    pub fn vendor(&self) -> &str {
        // Vendor bytes are ASCII uppercase by construction.
        std::str::from_utf8(&self.vendor).unwrap_or("???")
    }

    pub fn product(&self) -> u16 {
        self.product
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:04X}", self.vendor(), self.product)
    }
}

/// Full card identity read during isolation: device id plus the 32-bit
/// serial number that makes multi-card isolation deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardId {
    pub device: DeviceId,
    pub serial: u32,
}

impl CardId {
    /// Builds the identity from the 8 data bytes of an isolation read.
    pub fn from_isolation_bytes(bytes: &[u8; 8]) -> Self {
        Self {
            device: DeviceId::from_wire([bytes[0], bytes[1], bytes[2], bytes[3]]),
            serial: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:08x}", self.device, self.serial)
    }
}

impl<P: PortIo> PnpBus<P> {
    /// Reads one card identifier during serial isolation.
    ///
    /// 72 bits are sampled as 16-bit pairs from the read port: `0xAA55`
    /// asserts a 1 bit, `0xFFFF` a 0 bit, anything else aborts the read.
    /// Bits arrive LSB-first per byte. The first 8 bytes clock the checksum
    /// LFSR; the 9th byte is the card's transmitted checksum and must match.
    pub fn read_card_id(&mut self) -> Result<CardId, IsolationError> {
        let mut id = [0u8; 9];
        let mut lfsr = LFSR_SEED;
        let mut card_detected = false;

        for (i, byte) in id.iter_mut().enumerate() {
            for _ in 0..8 {
                self.io.io_delay();
                let lo = u16::from(self.io.inb(self.read_port));
                let hi = u16::from(self.io.inb(self.read_port));
                match lo | (hi << 8) {
                    0xAA55 => {
                        card_detected = true;
                        *byte = (*byte >> 1) | 0x80;
                        if i != 8 {
                            lfsr = lfsr_shift(lfsr, 1);
                        }
                    }
                    0xFFFF => {
                        *byte >>= 1;
                        if i != 8 {
                            lfsr = lfsr_shift(lfsr, 0);
                        }
                    }
                    other => return Err(IsolationError::UnexpectedBusValue(other)),
                }
            }
        }

        if !card_detected {
            return Err(IsolationError::NoCardResponding);
        }
        if lfsr != id[8] {
            return Err(IsolationError::ChecksumMismatch {
                computed: lfsr,
                received: id[8],
            });
        }

        let mut data = [0u8; 8];
        data.copy_from_slice(&id[..8]);
        let card = CardId::from_isolation_bytes(&data);
        trace!(%card, "isolated card identifier");
        Ok(card)
    }
}
