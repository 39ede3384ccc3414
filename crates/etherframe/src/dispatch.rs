//! Ethertype routing.
//!
//! The receive pipeline hands finished frames to a [`Dispatcher`], which
//! transfers ownership to the sink registered for the frame's Ethertype.
//! Sinks are responsible for the payload from that point on. [`ArpLogger`] is
//! the canonical example consumer: it decodes ARP far enough to log who-has
//! and reply traffic.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use tracing::{info, warn};

use crate::frame::{EtherType, EthernetFrame, MacAddr};

/// A protocol handler consuming frames of one Ethertype.
pub trait FrameSink {
    fn handle(&mut self, frame: EthernetFrame);
}

impl<F: FnMut(EthernetFrame)> FrameSink for F {
    fn handle(&mut self, frame: EthernetFrame) {
        self(frame);
    }
}

/// Routes frames to registered sinks by Ethertype; unclaimed frames are
/// dropped with a diagnostic.
#[derive(Default)]
pub struct Dispatcher {
    sinks: HashMap<EtherType, Box<dyn FrameSink>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ethertype: EtherType, sink: Box<dyn FrameSink>) {
        self.sinks.insert(ethertype, sink);
    }

    pub fn dispatch(&mut self, frame: EthernetFrame) {
        match self.sinks.get_mut(&frame.ethertype) {
            Some(sink) => sink.handle(frame),
            None => warn!(ethertype = %frame.ethertype, "no handler for frame; dropped"),
        }
    }
}

const ARP_OP_REQUEST: u16 = 1;
const ARP_OP_REPLY: u16 = 2;

/// Logs ARP requests and replies for MAC-to-IPv4 resolution.
pub struct ArpLogger;

impl ArpLogger {
    fn word(payload: &[u8], index: usize) -> Option<u16> {
        Some(u16::from_be_bytes([
            *payload.get(index)?,
            *payload.get(index + 1)?,
        ]))
    }
}

impl FrameSink for ArpLogger {
    fn handle(&mut self, frame: EthernetFrame) {
        let p = &frame.payload;
        let (Some(htype), Some(ptype), Some(op)) = (
            Self::word(p, 0),
            Self::word(p, 2),
            Self::word(p, 6),
        ) else {
            warn!("truncated ARP frame");
            return;
        };
        if htype == 0 || ptype == 0 {
            return;
        }
        // Hardware/protocol address sizes for MAC to IPv4.
        if p.get(4) != Some(&6) || p.get(5) != Some(&4) {
            warn!("ARP address sizes do not match MAC-to-IPv4 resolution");
            return;
        }
        if p.len() < 28 {
            warn!("truncated ARP frame");
            return;
        }

        match op {
            ARP_OP_REQUEST => {
                let sender_mac = MacAddr([p[8], p[9], p[10], p[11], p[12], p[13]]);
                let sender_ip = Ipv4Addr::new(p[14], p[15], p[16], p[17]);
                let target_ip = Ipv4Addr::new(p[24], p[25], p[26], p[27]);
                info!(%target_ip, %sender_mac, %sender_ip, "ARP who-has");
            }
            ARP_OP_REPLY => info!("ARP response received"),
            other => warn!(operation = other, "invalid ARP operation"),
        }
    }
}
