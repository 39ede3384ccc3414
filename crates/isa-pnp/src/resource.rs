//! Card resource data: the tagged record stream and its decoded model.
//!
//! Each card in configuration state streams a self-describing byte sequence:
//! small records carry the tag in bits [6:3] and a 3-bit length, large records
//! (high bit set) carry the tag in the whole byte followed by a little-endian
//! 16-bit length. The stream terminates in an end tag whose checksum byte must
//! reconcile with the running sum of everything read before it.
//!
//! The model uses bounded vectors with the capacities real cards respect: 4
//! logical devices, 10 compatible ids, 8 I/O ranges, 4 memory ranges, 4
//! dependent-function alternatives. Overflowing records are dropped with a
//! diagnostic and decoding continues.

use std::num::Wrapping;

use bitflags::bitflags;
use isa_platform::PortIo;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ident::DeviceId;
use crate::protocol::PnpBus;

pub const MAX_LOGICAL_DEVICES: usize = 4;
pub const MAX_COMPATIBLE_IDS: usize = 10;
pub const MAX_IO_RANGES: usize = 8;
pub const MAX_MEM_RANGES: usize = 4;
pub const MAX_DEPENDENT_FNS: usize = 4;

/// Configuration register index of the first I/O base descriptor pair.
pub const IO_CONFIG_BASE: u8 = 0x60;
/// Configuration register index of the first IRQ descriptor pair.
pub const IRQ_CONFIG_BASE: u8 = 0x70;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unrecognized resource tag {tag:#04x}")]
    UnknownTag { tag: u8 },

    #[error("resource checksum mismatch: running sum {computed:#04x}, end tag carries {declared:#04x}")]
    Checksum { computed: u8, declared: u8 },

    #[error("resource stream ended before the end tag")]
    UnexpectedEnd,
}

mod tag {
    // Small records, bits [6:3] of the header byte.
    pub const PNP_VERSION: u8 = 0x1;
    pub const LOGICAL_DEVICE_ID: u8 = 0x2;
    pub const COMPATIBLE_DEVICE_ID: u8 = 0x3;
    pub const IRQ_FORMAT: u8 = 0x4;
    pub const DMA_FORMAT: u8 = 0x5;
    pub const START_DEPENDENT: u8 = 0x6;
    pub const END_DEPENDENT: u8 = 0x7;
    pub const IO_PORT_RANGE: u8 = 0x8;
    pub const END: u8 = 0xF;

    // Large records, full header byte.
    pub const MEM_RANGE: u8 = 0x81;
    pub const ANSI_STRING: u8 = 0x82;
    pub const MEM32_RANGE: u8 = 0x85;
}

bitflags! {
    /// IRQ sensitivity bits from the optional IRQ-format information byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqSensitivity: u8 {
        const HIGH_EDGE = 0x01;
        const LOW_EDGE = 0x02;
        const HIGH_LEVEL = 0x04;
        const LOW_LEVEL = 0x08;
    }
}

/// An I/O port range descriptor plus the configuration register pair its
/// chosen base must be committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoRange {
    /// Card decodes all 16 address lines (vs. 10-bit ISA decode).
    pub decode_16bit: bool,
    pub min_base: u16,
    pub max_base: u16,
    pub alignment: u8,
    pub length: u8,
    pub config_reg: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqDescriptor {
    /// One bit per IRQ line 0..16.
    pub mask: u16,
    pub sensitivity: IrqSensitivity,
    pub config_reg: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaDescriptor {
    /// One bit per DMA channel 0..8.
    pub mask: u8,
    pub flags: u8,
}

/// 24-bit (8/16-bit decode) memory range. Bases and length arrive in 256-byte
/// units and are stored expanded to byte addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRange {
    pub flags: u8,
    pub min_base: u32,
    pub max_base: u32,
    pub alignment: u16,
    pub length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mem32Range {
    pub flags: u8,
    pub min_base: u32,
    pub max_base: u32,
    pub alignment: u32,
    pub length: u32,
}

/// One alternative resource set between start/end-dependent-function tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependentFn {
    pub priority: Option<u8>,
    pub io: Vec<IoRange>,
    pub mem: Vec<MemRange>,
    pub irq: Option<IrqDescriptor>,
    pub dma: Option<DmaDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalDevice {
    pub id: DeviceId,
    pub flags: u16,
    pub compatible: Vec<DeviceId>,
    pub identifier: Option<String>,
    pub io: Vec<IoRange>,
    pub mem: Vec<MemRange>,
    pub mem32: Vec<Mem32Range>,
    pub dma: Option<DmaDescriptor>,
    pub irq: Option<IrqDescriptor>,
    pub dependent: Vec<DependentFn>,
}

impl LogicalDevice {
    fn new(id: DeviceId, flags: u16) -> Self {
        Self {
            id,
            flags,
            compatible: Vec::new(),
            identifier: None,
            io: Vec::new(),
            mem: Vec::new(),
            mem32: Vec::new(),
            dma: None,
            irq: None,
            dependent: Vec::new(),
        }
    }

    /// Whether this device, or any of its compatible ids, answers to `id`.
    pub fn matches(&self, id: &DeviceId) -> bool {
        self.id == *id || self.compatible.contains(id)
    }
}

/// Decoded card resource data: PnP version, ANSI identifier and up to 4
/// logical devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardResources {
    /// Packed BCD, e.g. `0x10` for PnP 1.0.
    pub pnp_version: u8,
    pub vendor_version: u8,
    pub identifier: String,
    pub logical_devices: Vec<LogicalDevice>,
}

/// One byte at a time from a card's resource stream.
///
/// The live implementation polls the card's ready bit between bytes; tests
/// decode from in-memory slices.
pub trait ResourceSource {
    fn next_byte(&mut self) -> Result<u8, DecodeError>;
}

impl<P: PortIo> ResourceSource for PnpBus<P> {
    fn next_byte(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_resource_byte())
    }
}

/// In-memory resource stream, used by tests and diagnostics tooling.
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl ResourceSource for SliceSource<'_> {
    fn next_byte(&mut self) -> Result<u8, DecodeError> {
        let byte = *self.data.get(self.pos).ok_or(DecodeError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(byte)
    }
}

/// Where resource records currently attach.
enum Attach {
    Card,
    Base,
    Dependent,
    /// Records for a logical device (or dependent set) past capacity; dropped
    /// wholesale so they cannot corrupt the previous device's resources.
    Overflow,
}

struct Decoder {
    card: CardResources,
    attach: Attach,
    /// Next I/O base configuration register pair for the current device.
    io_reg: u8,
    /// Next IRQ configuration register pair for the current device.
    irq_reg: u8,
    sum: Wrapping<u8>,
}

/// Decodes one card's resource stream.
///
/// Stops at the first end tag whose checksum reconciles; an unknown tag or a
/// checksum mismatch abandons the card. Declared record lengths are always
/// authoritative for stream position; a length a record layout cannot account
/// for is logged and tolerated.
pub fn decode_resources<S: ResourceSource>(source: &mut S) -> Result<CardResources, DecodeError> {
    let mut dec = Decoder {
        card: CardResources::default(),
        attach: Attach::Card,
        io_reg: IO_CONFIG_BASE,
        irq_reg: IRQ_CONFIG_BASE,
        sum: Wrapping(0),
    };

    loop {
        let header = dec.read(source)?;
        let (tag, length, small) = if header & 0x80 != 0 {
            let lo = dec.read(source)?;
            let hi = dec.read(source)?;
            (header, usize::from(u16::from_le_bytes([lo, hi])), false)
        } else {
            ((header >> 3) & 0x0F, usize::from(header & 0x07), true)
        };

        if small && tag == tag::END {
            // The checksum byte itself is not part of the running sum.
            let computed = dec.sum.0;
            let declared = source.next_byte()?;
            if length != 1 {
                warn!(length, "end tag declares unexpected length");
            }
            if declared != 0 && computed != 0 && declared != computed {
                return Err(DecodeError::Checksum { computed, declared });
            }
            return Ok(dec.card);
        }

        let mut body = Vec::with_capacity(length);
        for _ in 0..length {
            body.push(dec.read(source)?);
        }

        match (small, tag) {
            (true, tag::PNP_VERSION) => dec.pnp_version(&body),
            (true, tag::LOGICAL_DEVICE_ID) => dec.logical_device(&body),
            (true, tag::COMPATIBLE_DEVICE_ID) => dec.compatible_id(&body),
            (true, tag::IRQ_FORMAT) => dec.irq(&body),
            (true, tag::DMA_FORMAT) => dec.dma(&body),
            (true, tag::START_DEPENDENT) => dec.start_dependent(&body),
            (true, tag::END_DEPENDENT) => dec.end_dependent(&body),
            (true, tag::IO_PORT_RANGE) => dec.io_range(&body),
            (false, tag::MEM_RANGE) => dec.mem_range(&body),
            (false, tag::ANSI_STRING) => dec.ansi_string(&body),
            (false, tag::MEM32_RANGE) => dec.mem32_range(&body),
            // For large records the tag is the whole header byte; for small
            // ones it is the extracted 4-bit type, with the length bits gone.
            _ => return Err(DecodeError::UnknownTag { tag }),
        }
    }
}

impl Decoder {
    fn read<S: ResourceSource>(&mut self, source: &mut S) -> Result<u8, DecodeError> {
        let byte = source.next_byte()?;
        self.sum += byte;
        Ok(byte)
    }

    fn expect_len(&self, tag: &'static str, body: &[u8], expected: usize) {
        if body.len() != expected {
            // Declared length stays authoritative for stream position; the
            // mismatch is only reported.
            warn!(
                tag,
                declared = body.len(),
                expected,
                "resource record length differs from its fixed layout"
            );
        }
    }

    fn byte(body: &[u8], index: usize) -> u8 {
        body.get(index).copied().unwrap_or(0)
    }

    fn word(body: &[u8], index: usize) -> u16 {
        u16::from_le_bytes([Self::byte(body, index), Self::byte(body, index + 1)])
    }

    fn dword(body: &[u8], index: usize) -> u32 {
        u32::from_le_bytes([
            Self::byte(body, index),
            Self::byte(body, index + 1),
            Self::byte(body, index + 2),
            Self::byte(body, index + 3),
        ])
    }

    fn device_id(body: &[u8]) -> DeviceId {
        DeviceId::from_wire([
            Self::byte(body, 0),
            Self::byte(body, 1),
            Self::byte(body, 2),
            Self::byte(body, 3),
        ])
    }

    fn current_device(&mut self) -> Option<&mut LogicalDevice> {
        match self.attach {
            Attach::Card | Attach::Overflow => None,
            Attach::Base | Attach::Dependent => self.card.logical_devices.last_mut(),
        }
    }

    fn pnp_version(&mut self, body: &[u8]) {
        self.expect_len("pnp-version", body, 2);
        self.card.pnp_version = Self::byte(body, 0);
        self.card.vendor_version = Self::byte(body, 1);
    }

    fn logical_device(&mut self, body: &[u8]) {
        if body.len() != 5 && body.len() != 6 {
            self.expect_len("logical-device-id", body, 5);
        }
        // Each logical device restarts the configuration-register allocation.
        self.io_reg = IO_CONFIG_BASE;
        self.irq_reg = IRQ_CONFIG_BASE;

        if self.card.logical_devices.len() >= MAX_LOGICAL_DEVICES {
            warn!(
                max = MAX_LOGICAL_DEVICES,
                "dropping logical device past capacity"
            );
            self.attach = Attach::Overflow;
            return;
        }
        let id = Self::device_id(body);
        let flags = u16::from_le_bytes([Self::byte(body, 4), Self::byte(body, 5)]);
        self.card.logical_devices.push(LogicalDevice::new(id, flags));
        self.attach = Attach::Base;
    }

    fn compatible_id(&mut self, body: &[u8]) {
        self.expect_len("compatible-device-id", body, 4);
        let id = Self::device_id(body);
        let Some(dev) = self.current_device() else {
            warn!(%id, "compatible id outside any logical device");
            return;
        };
        if dev.compatible.len() >= MAX_COMPATIBLE_IDS {
            warn!(%id, max = MAX_COMPATIBLE_IDS, "dropping compatible id past capacity");
            return;
        }
        dev.compatible.push(id);
    }

    fn irq(&mut self, body: &[u8]) {
        if body.len() != 2 && body.len() != 3 {
            self.expect_len("irq-format", body, 2);
        }
        let mask = Self::word(body, 0);
        let sensitivity = if body.len() >= 3 {
            IrqSensitivity::from_bits_truncate(Self::byte(body, 2))
        } else {
            // Two-byte form implies the default sensitivity.
            IrqSensitivity::HIGH_EDGE
        };
        let desc = IrqDescriptor {
            mask,
            sensitivity,
            config_reg: self.irq_reg,
        };
        self.irq_reg = self.irq_reg.wrapping_add(2);

        let in_dependent = matches!(self.attach, Attach::Dependent);
        let Some(dev) = self.current_device() else {
            warn!("IRQ descriptor outside any logical device");
            return;
        };
        let slot = if in_dependent {
            dev.dependent.last_mut().map(|d| &mut d.irq)
        } else {
            Some(&mut dev.irq)
        };
        match slot {
            Some(slot @ None) => *slot = Some(desc),
            _ => warn!("dropping IRQ descriptor past capacity"),
        }
    }

    fn dma(&mut self, body: &[u8]) {
        self.expect_len("dma-format", body, 2);
        let desc = DmaDescriptor {
            mask: Self::byte(body, 0),
            flags: Self::byte(body, 1),
        };
        let in_dependent = matches!(self.attach, Attach::Dependent);
        let Some(dev) = self.current_device() else {
            warn!("DMA descriptor outside any logical device");
            return;
        };
        let slot = if in_dependent {
            dev.dependent.last_mut().map(|d| &mut d.dma)
        } else {
            Some(&mut dev.dma)
        };
        match slot {
            Some(slot @ None) => *slot = Some(desc),
            _ => warn!("dropping DMA descriptor past capacity"),
        }
    }

    fn start_dependent(&mut self, body: &[u8]) {
        if body.len() > 1 {
            self.expect_len("start-dependent", body, 1);
        }
        let priority = body.first().copied();
        if matches!(self.attach, Attach::Overflow) {
            return;
        }
        let Some(dev) = self.card.logical_devices.last_mut() else {
            warn!("dependent function outside any logical device");
            return;
        };
        if dev.dependent.len() >= MAX_DEPENDENT_FNS {
            warn!(
                max = MAX_DEPENDENT_FNS,
                "dropping dependent function past capacity"
            );
            self.attach = Attach::Overflow;
            return;
        }
        dev.dependent.push(DependentFn {
            priority,
            ..DependentFn::default()
        });
        self.attach = Attach::Dependent;
    }

    fn end_dependent(&mut self, body: &[u8]) {
        self.expect_len("end-dependent", body, 0);
        if !self.card.logical_devices.is_empty() {
            self.attach = Attach::Base;
        }
    }

    fn io_range(&mut self, body: &[u8]) {
        self.expect_len("io-port-range", body, 7);
        let range = IoRange {
            decode_16bit: Self::byte(body, 0) & 0x01 != 0,
            min_base: Self::word(body, 1),
            max_base: Self::word(body, 3),
            alignment: Self::byte(body, 5),
            length: Self::byte(body, 6),
            config_reg: self.io_reg,
        };
        self.io_reg = self.io_reg.wrapping_add(2);

        let in_dependent = matches!(self.attach, Attach::Dependent);
        let Some(dev) = self.current_device() else {
            warn!("I/O range outside any logical device");
            return;
        };
        let list = if in_dependent {
            match dev.dependent.last_mut() {
                Some(dep) => &mut dep.io,
                None => return,
            }
        } else {
            &mut dev.io
        };
        if list.len() >= MAX_IO_RANGES {
            warn!(max = MAX_IO_RANGES, "dropping I/O range past capacity");
            return;
        }
        list.push(range);
    }

    fn mem_range(&mut self, body: &[u8]) {
        self.expect_len("memory-range", body, 9);
        let range = MemRange {
            flags: Self::byte(body, 0),
            min_base: u32::from(Self::word(body, 1)) << 8,
            max_base: u32::from(Self::word(body, 3)) << 8,
            alignment: Self::word(body, 5),
            length: u32::from(Self::word(body, 7)) << 8,
        };
        let in_dependent = matches!(self.attach, Attach::Dependent);
        let Some(dev) = self.current_device() else {
            warn!("memory range outside any logical device");
            return;
        };
        let list = if in_dependent {
            match dev.dependent.last_mut() {
                Some(dep) => &mut dep.mem,
                None => return,
            }
        } else {
            &mut dev.mem
        };
        if list.len() >= MAX_MEM_RANGES {
            warn!(max = MAX_MEM_RANGES, "dropping memory range past capacity");
            return;
        }
        list.push(range);
    }

    fn mem32_range(&mut self, body: &[u8]) {
        self.expect_len("memory32-range", body, 17);
        let range = Mem32Range {
            flags: Self::byte(body, 0),
            min_base: Self::dword(body, 1),
            max_base: Self::dword(body, 5),
            alignment: Self::dword(body, 9),
            length: Self::dword(body, 13),
        };
        let Some(dev) = self.current_device() else {
            warn!("32-bit memory range outside any logical device");
            return;
        };
        if dev.mem32.len() >= MAX_MEM_RANGES {
            warn!(max = MAX_MEM_RANGES, "dropping 32-bit memory range past capacity");
            return;
        }
        dev.mem32.push(range);
    }

    fn ansi_string(&mut self, body: &[u8]) {
        let text = String::from_utf8_lossy(body).into_owned();
        debug!(%text, "identifier string");
        match self.current_device() {
            Some(dev) => dev.identifier = Some(text),
            None => self.card.identifier = text,
        }
    }
}
