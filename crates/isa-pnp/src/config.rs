//! Resource allocation: picking a concrete I/O base and IRQ line for a
//! logical device and committing them through its configuration registers.

use isa_platform::PortIo;
use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::{reg, PnpBus};
use crate::resource::{IoRange, IrqDescriptor, IrqSensitivity, LogicalDevice};

/// Lowest I/O base the allocator will consider, regardless of what the
/// descriptor permits. Keeps assignments clear of legacy motherboard ranges.
pub const IO_SEARCH_FLOOR: u16 = 0x280;

/// The one IRQ line the trivial allocation policy hands out.
pub const ALLOCATED_IRQ: u8 = 5;

/// IRQ_TYPE register value for high-true, edge-sensitive delivery.
const IRQ_TYPE_HIGH_EDGE: u8 = 0x02;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no free I/O range in [{min:#05x}, {max:#05x}] (alignment {alignment:#x}, length {length})")]
    NoFreeIoRange {
        min: u16,
        max: u16,
        alignment: u8,
        length: u8,
    },

    #[error("IRQ mask {mask:#06x} ({sensitivity:?}) does not offer IRQ 5 high-true edge-sensitive")]
    NoUsableIrq {
        mask: u16,
        sensitivity: IrqSensitivity,
    },

    #[error("logical device offers no I/O range descriptor")]
    MissingIoRange,

    #[error("logical device offers no IRQ descriptor")]
    MissingIrq,
}

/// Resources committed to an activated logical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignedResources {
    pub io_base: u16,
    pub irq: u8,
}

/// Whether every port in `[base, base + length)` reads back as a floating
/// bus. Sampled forward and in reverse, twice, to shake out slow-settling
/// lines. A best-effort heuristic only: an occupied range can still float
/// high, so false negatives are accepted behavior.
fn range_is_free<P: PortIo>(io: &mut P, base: u16, length: u8) -> bool {
    for _ in 0..2 {
        for offset in 0..u16::from(length) {
            if io.inb(base + offset) != 0xFF {
                return false;
            }
        }
        for offset in (0..u16::from(length)).rev() {
            if io.inb(base + offset) != 0xFF {
                return false;
            }
        }
    }
    true
}

/// Picks the first free candidate base for `range` and commits it to the
/// descriptor's configuration register pair (high byte first).
pub fn assign_io_range<P: PortIo>(
    bus: &mut PnpBus<P>,
    range: &IoRange,
) -> Result<u16, ConfigError> {
    let alignment = u16::from(range.alignment).max(1);
    let length = u16::from(range.length).max(1);

    let base = IO_SEARCH_FLOOR.max(range.min_base);
    let rem = base % alignment;
    // Rounding up to the alignment can already run off the end of the 16-bit
    // port space; so can advancing to the next candidate.
    let mut candidate = if rem != 0 {
        base.checked_add(alignment - rem)
    } else {
        Some(base)
    };

    while let Some(base) = candidate {
        if base > range.max_base || u32::from(base) + u32::from(length) > 0x1_0000 {
            break;
        }
        if range_is_free(bus.io(), base, range.length.max(1)) {
            bus.write_config(range.config_reg, (base >> 8) as u8);
            bus.write_config(range.config_reg.wrapping_add(1), (base & 0xFF) as u8);
            debug!(base = format_args!("{base:#05x}"), config_reg = range.config_reg, "assigned I/O range");
            return Ok(base);
        }
        candidate = base.checked_add(alignment);
    }

    Err(ConfigError::NoFreeIoRange {
        min: range.min_base,
        max: range.max_base,
        alignment: range.alignment,
        length: range.length,
    })
}

/// Trivial IRQ policy: the device must offer IRQ 5, high-true and
/// edge-sensitive, or configuration of the whole device fails.
pub fn assign_irq<P: PortIo>(
    bus: &mut PnpBus<P>,
    desc: &IrqDescriptor,
) -> Result<u8, ConfigError> {
    if desc.mask & (1 << ALLOCATED_IRQ) == 0
        || !desc.sensitivity.contains(IrqSensitivity::HIGH_EDGE)
    {
        return Err(ConfigError::NoUsableIrq {
            mask: desc.mask,
            sensitivity: desc.sensitivity,
        });
    }
    bus.write_config(desc.config_reg, ALLOCATED_IRQ);
    bus.write_config(desc.config_reg.wrapping_add(1), IRQ_TYPE_HIGH_EDGE);
    Ok(ALLOCATED_IRQ)
}

/// Activates the selected logical device with I/O range checking disabled.
pub fn activate<P: PortIo>(bus: &mut PnpBus<P>, ldn: u8) {
    bus.select_logical_device(ldn);
    bus.write_config(reg::IO_RANGE_CHECK, 0);
    bus.write_config(reg::ACTIVATE, 1);
}

/// Configures and activates one logical device: every I/O descriptor gets a
/// base (the first one is reported as the device's primary base), the IRQ
/// descriptor gets IRQ 5, then the device is activated.
pub fn configure_logical_device<P: PortIo>(
    bus: &mut PnpBus<P>,
    device: &LogicalDevice,
    ldn: u8,
) -> Result<AssignedResources, ConfigError> {
    bus.select_logical_device(ldn);

    let mut primary = None;
    if device.io.is_empty() {
        return Err(ConfigError::MissingIoRange);
    }
    for range in &device.io {
        let base = assign_io_range(bus, range)?;
        primary.get_or_insert(base);
    }

    let irq_desc = device.irq.ok_or(ConfigError::MissingIrq)?;
    let irq = assign_irq(bus, &irq_desc).inspect_err(|err| {
        warn!(device = %device.id, %err, "IRQ allocation failed; device left inactive");
    })?;

    activate(bus, ldn);
    Ok(AssignedResources {
        // `primary` is set on the first loop iteration; the list is non-empty.
        io_base: primary.unwrap_or(0),
        irq,
    })
}
