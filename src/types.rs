use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Placeholder source address stamped on every synthesized frame.
    pub const PLACEHOLDER_SOURCE: MacAddress = MacAddress([0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
    /// Placeholder destination address stamped on every synthesized frame.
    pub const PLACEHOLDER_DESTINATION: MacAddress =
        MacAddress([0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    pub source: u16,
    pub destination: u16,
}

impl fmt::Display for PortPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// One accepted line of a SIP trace log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    /// SIP message text with real CRLFs, always ending in a blank line.
    pub payload: Vec<u8>,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub source_port: u16,
    pub destination_port: u16,
    /// Time since the Unix epoch; `None` means "stamp at synthesis time".
    pub timestamp: Option<Duration>,
}

impl TraceRecord {
    pub fn ports(&self) -> PortPair {
        PortPair {
            source: self.source_port,
            destination: self.destination_port,
        }
    }
}

/// A fully serialized Ethernet/IPv4/UDP frame and its capture time.
///
/// Captured and original lengths are both taken from `data`, so they can
/// never disagree with the bytes actually written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedFrame {
    pub timestamp: Duration,
    pub data: Vec<u8>,
}

impl SynthesizedFrame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_display() {
        assert_eq!(
            MacAddress::PLACEHOLDER_DESTINATION.to_string(),
            "06:07:08:09:0a:0b"
        );
        assert_eq!(
            MacAddress::PLACEHOLDER_SOURCE.to_string(),
            "00:01:02:03:04:05"
        );
    }

    #[test]
    fn record_ports() {
        let record = TraceRecord {
            payload: Vec::new(),
            source: Ipv4Addr::new(10, 0, 0, 1),
            destination: Ipv4Addr::new(10, 0, 0, 2),
            source_port: 5000,
            destination_port: 6000,
            timestamp: None,
        };
        assert_eq!(
            record.ports(),
            PortPair {
                source: 5000,
                destination: 6000
            }
        );
        assert_eq!(record.ports().to_string(), "5000 -> 6000");
    }
}
