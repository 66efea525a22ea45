//! RFC 1071 internet checksum, as used by the IPv4 header and UDP.

use std::net::Ipv4Addr;

/// Add `data` as big-endian 16-bit words into a running 32-bit sum.
///
/// An odd trailing byte is padded with a zero low byte.
fn accumulate(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    if let Some(&byte) = chunks.remainder().first() {
        sum += u32::from(byte) << 8;
    }
    sum
}

fn fold(mut sum: u32) -> u16 {
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// One's complement of the one's complement sum of `data`.
pub fn internet_checksum(data: &[u8]) -> u16 {
    !fold(accumulate(0, data))
}

/// Checksum of a transport segment over the IPv4 pseudo-header
/// (source, destination, zero, protocol, segment length) plus `segment`.
///
/// `segment` must be at most 65535 bytes; callers enforce this.
pub fn pseudo_header_checksum(
    source: Ipv4Addr,
    destination: Ipv4Addr,
    protocol: u8,
    segment: &[u8],
) -> u16 {
    let mut sum = accumulate(0, &source.octets());
    sum = accumulate(sum, &destination.octets());
    sum += u32::from(protocol);
    sum += segment.len() as u32;
    // Segment length is bounded, so 32 bits cannot overflow before folding.
    !fold(accumulate(sum, segment))
}

/// True when `data`, checksum field included, sums to all ones.
pub fn verify(data: &[u8]) -> bool {
    internet_checksum(data) == 0
}
