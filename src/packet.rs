//! Synthesis of Ethernet/IPv4/UDP frames around a SIP payload.
//!
//! The build runs inside-out in two explicit steps: an [`Ipv4Context`]
//! is fixed first, the [`UdpSegment`] is built against it (its checksum
//! covers the IPv4 pseudo-header), and the context then encapsulates the
//! finished segment. The Ethernet header goes on last.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::checksum::{internet_checksum, pseudo_header_checksum};
use crate::types::{MacAddress, PortPair, SynthesizedFrame, TraceRecord};

/// Well-known SIP port analyzers use to pick the SIP dissector.
pub const SIP_PORT: u16 = 5060;
/// Largest frame the capture header declares.
pub const SNAP_LEN: usize = 65535;

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;
/// Largest payload whose frame still fits within [`SNAP_LEN`].
pub const MAX_PAYLOAD_LEN: usize =
    SNAP_LEN - ETHERNET_HEADER_LEN - IPV4_HEADER_LEN - UDP_HEADER_LEN;

const ETHERTYPE_IPV4: u16 = 0x0800;
const IPPROTO_UDP: u8 = 17;
const DEFAULT_TTL: u8 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthError {
    /// A length does not fit the field or limit that has to carry it.
    TooLarge {
        layer: &'static str,
        len: usize,
        max: usize,
    },
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthError::TooLarge { layer, len, max } => {
                write!(f, "{layer} of {len} bytes exceeds the {max} byte limit")
            }
        }
    }
}

impl std::error::Error for SynthError {}

fn checked_len(layer: &'static str, len: usize) -> Result<u16, SynthError> {
    u16::try_from(len).map_err(|_| SynthError::TooLarge {
        layer,
        len,
        max: usize::from(u16::MAX),
    })
}

/// Move the destination to 5060 unless one side already uses it.
///
/// Only the destination is ever rewritten.
pub fn force_sip_port(ports: PortPair) -> PortPair {
    if ports.source != SIP_PORT && ports.destination != SIP_PORT {
        PortPair {
            source: ports.source,
            destination: SIP_PORT,
        }
    } else {
        ports
    }
}

/// Network-layer addressing a transport segment is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Context {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub ttl: u8,
}

impl Ipv4Context {
    pub fn new(source: Ipv4Addr, destination: Ipv4Addr) -> Self {
        Ipv4Context {
            source,
            destination,
            ttl: DEFAULT_TTL,
        }
    }

    /// Prepend an option-less IPv4 header to `segment`.
    ///
    /// Total length and header checksum are computed from the header as built.
    pub fn encapsulate(&self, segment: &UdpSegment) -> Result<BytesMut, SynthError> {
        let total_len = checked_len("ipv4 packet", IPV4_HEADER_LEN + segment.as_bytes().len())?;

        let mut buf = BytesMut::with_capacity(usize::from(total_len));
        buf.put_u8(0x45); // version 4, IHL 5
        buf.put_u8(0); // TOS
        buf.put_u16(total_len);
        buf.put_u16(0); // identification
        buf.put_u16(0); // flags + fragment offset
        buf.put_u8(self.ttl);
        buf.put_u8(IPPROTO_UDP);
        buf.put_u16(0); // checksum placeholder
        buf.put_slice(&self.source.octets());
        buf.put_slice(&self.destination.octets());

        let checksum = internet_checksum(&buf[..IPV4_HEADER_LEN]);
        buf[10..12].copy_from_slice(&checksum.to_be_bytes());

        buf.put_slice(segment.as_bytes());
        Ok(buf)
    }
}

/// A UDP header and payload with a checksum bound to an [`Ipv4Context`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpSegment {
    bytes: BytesMut,
}

impl UdpSegment {
    pub fn build(
        network: &Ipv4Context,
        ports: PortPair,
        payload: &[u8],
    ) -> Result<Self, SynthError> {
        let length = checked_len("udp datagram", UDP_HEADER_LEN + payload.len())?;

        let mut bytes = BytesMut::with_capacity(usize::from(length));
        bytes.put_u16(ports.source);
        bytes.put_u16(ports.destination);
        bytes.put_u16(length);
        bytes.put_u16(0);
        bytes.put_slice(payload);

        let checksum = pseudo_header_checksum(
            network.source,
            network.destination,
            IPPROTO_UDP,
            &bytes,
        );
        // Zero on the wire means "no checksum".
        let checksum = if checksum == 0 { 0xFFFF } else { checksum };
        bytes[6..8].copy_from_slice(&checksum.to_be_bytes());

        Ok(UdpSegment { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.bytes[6], self.bytes[7]])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub source: MacAddress,
    pub destination: MacAddress,
}

impl EthernetHeader {
    /// The fixed addresses every synthesized frame carries.
    pub fn placeholder() -> Self {
        EthernetHeader {
            source: MacAddress::PLACEHOLDER_SOURCE,
            destination: MacAddress::PLACEHOLDER_DESTINATION,
        }
    }

    pub fn frame(&self, packet: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(ETHERNET_HEADER_LEN + packet.len());
        buf.put_slice(&self.destination.octets());
        buf.put_slice(&self.source.octets());
        buf.put_u16(ETHERTYPE_IPV4);
        buf.put_slice(packet);
        buf.to_vec()
    }
}

fn capture_clock() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Build the complete frame for one record.
pub fn synthesize(record: &TraceRecord) -> Result<SynthesizedFrame, SynthError> {
    let ports = force_sip_port(record.ports());
    if ports != record.ports() {
        trace!(
            original = %record.ports(),
            forced = %ports,
            "forced destination to SIP port"
        );
    }

    let network = Ipv4Context::new(record.source, record.destination);
    let segment = UdpSegment::build(&network, ports, &record.payload)?;
    let packet = network.encapsulate(&segment)?;
    let data = EthernetHeader::placeholder().frame(&packet);

    if data.len() > SNAP_LEN {
        return Err(SynthError::TooLarge {
            layer: "ethernet frame",
            len: data.len(),
            max: SNAP_LEN,
        });
    }

    Ok(SynthesizedFrame {
        timestamp: record.timestamp.unwrap_or_else(capture_clock),
        data,
    })
}
