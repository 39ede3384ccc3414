//! The full detect → read → configure → activate cycle.

use isa_platform::PortIo;
use tracing::{info, warn};

use crate::config::{configure_logical_device, AssignedResources};
use crate::ident::{CardId, DeviceId};
use crate::protocol::{PnpBus, READ_PORT_MAX, READ_PORT_MIN};
use crate::resource::{decode_resources, CardResources};

/// Fixed device-table capacity; discovery stops once it is full.
pub const MAX_DEVICES: usize = 10;

/// One card found on the bus: identity, assigned CSN, and (once the
/// resource-data pass has run) its decoded resource model.
#[derive(Debug, Clone)]
pub struct PnpDevice {
    pub id: CardId,
    pub csn: u8,
    pub resources: Option<CardResources>,
}

/// Enumerates the PnP ISA bus.
///
/// Sends the initiation key, resets all CSNs, then scans candidate read-port
/// addresses; at the first address where any card isolates, CSNs are handed
/// out until no further card responds or the table is full. A second pass
/// wakes each CSN in turn and decodes its resource data; per-card decode
/// failures leave that entry's `resources` empty and do not stop the pass.
pub fn enumerate<P: PortIo>(bus: &mut PnpBus<P>) -> Vec<PnpDevice> {
    let mut devices: Vec<PnpDevice> = Vec::new();

    bus.send_initiation_key();
    bus.reset_csns();

    let mut next_csn = 1u8;
    let mut read_port = READ_PORT_MIN;
    while devices.is_empty() && read_port <= READ_PORT_MAX {
        bus.wake(0);
        bus.set_read_port(read_port);

        loop {
            bus.select_isolation();
            let id = match bus.read_card_id() {
                Ok(id) => id,
                Err(err) => {
                    if !devices.is_empty() {
                        info!(%err, "isolation complete");
                    }
                    break;
                }
            };

            bus.set_csn(next_csn);
            devices.push(PnpDevice {
                id,
                csn: next_csn,
                resources: None,
            });
            next_csn += 1;

            if devices.len() >= MAX_DEVICES {
                warn!("maximum number of PnP cards reached");
                break;
            }

            // Put the remaining unconfigured cards back into isolation.
            bus.wake(0);
        }

        if devices.is_empty() {
            read_port += 4;
        }
    }

    if devices.is_empty() {
        info!("no PnP card detected");
        return devices;
    }

    info!(
        read_port = format_args!("{:#05x}", bus.read_port()),
        cards = devices.len(),
        "PnP isolation complete"
    );
    for device in &mut devices {
        info!(card = %device.id, csn = device.csn, "detected card");

        bus.wake(device.csn);
        match decode_resources(bus) {
            Ok(resources) => device.resources = Some(resources),
            Err(err) => {
                warn!(card = %device.id, %err, "resource data unusable; card skipped");
            }
        }
    }

    devices
}

/// Finds the first logical device matching `target` (by its own id or any
/// compatible id), configures it, and returns the committed resources.
///
/// Allocation failures abandon only that candidate; later matches are still
/// tried.
pub fn configure_matching<P: PortIo>(
    bus: &mut PnpBus<P>,
    devices: &[PnpDevice],
    target: &DeviceId,
) -> Option<AssignedResources> {
    for device in devices {
        let Some(resources) = &device.resources else {
            continue;
        };
        for (ldn, logical) in resources.logical_devices.iter().enumerate() {
            if !logical.matches(target) {
                continue;
            }
            bus.wake(device.csn);
            match configure_logical_device(bus, logical, ldn as u8) {
                Ok(assigned) => {
                    info!(
                        card = %device.id,
                        ldn,
                        io_base = format_args!("{:#05x}", assigned.io_base),
                        irq = assigned.irq,
                        "logical device configured and activated"
                    );
                    return Some(assigned);
                }
                Err(err) => {
                    warn!(card = %device.id, ldn, %err, "configuration failed");
                }
            }
        }
    }
    None
}
