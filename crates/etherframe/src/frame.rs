//! Ethernet-II frame representation.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// 16-bit Ethertype in host order.
///
/// Values at or below `0x600` are IEEE 802.3 length fields (Ethernet-I
/// framing); everything above is an Ethernet-II protocol number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EtherType(pub u16);

impl EtherType {
    pub const IPV4: EtherType = EtherType(0x0800);
    pub const ARP: EtherType = EtherType(0x0806);

    /// Highest value that still means "802.3 length" rather than a protocol.
    pub const MAX_LENGTH_FIELD: u16 = 0x600;

    pub fn is_ethernet_ii(&self) -> bool {
        self.0 > Self::MAX_LENGTH_FIELD
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// A received Ethernet-II frame with its owned payload.
///
/// The payload excludes the 14 bytes of addressing and the 4-byte FCS (the
/// hardware already validated the latter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: EtherType,
    pub payload: Vec<u8>,
}
