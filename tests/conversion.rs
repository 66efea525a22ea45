use std::fs::File;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use pcap_file::pcap::PcapReader;
use pcap_file::DataLink;

use sip_trace_pcap::checksum::{pseudo_header_checksum, verify};
use sip_trace_pcap::{convert, ConvertOptions, ConvertStats, ParseOptions, PcapSink};

const INVITE_LINE: &str = r"INVITE sip:bob@example.com SIP/2.0\x0D\x0Ax|m1|m2|m3|m4|10.0.0.1|5000|m7|10.0.0.2|6000|1700000000.5";

struct CapturedFrame {
    timestamp: Duration,
    orig_len: u32,
    data: Vec<u8>,
}

impl CapturedFrame {
    fn ip(&self) -> &[u8] {
        &self.data[14..]
    }

    fn source(&self) -> Ipv4Addr {
        let ip = self.ip();
        Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15])
    }

    fn destination(&self) -> Ipv4Addr {
        let ip = self.ip();
        Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19])
    }

    fn udp(&self) -> &[u8] {
        &self.ip()[20..]
    }

    fn ports(&self) -> (u16, u16) {
        let udp = self.udp();
        (
            u16::from_be_bytes([udp[0], udp[1]]),
            u16::from_be_bytes([udp[2], udp[3]]),
        )
    }

    fn payload(&self) -> &[u8] {
        &self.udp()[8..]
    }
}

fn to_pcap(input: &[u8], options: &ConvertOptions) -> (ConvertStats, Vec<u8>) {
    let mut sink = PcapSink::new(Vec::new()).unwrap();
    let stats = convert(input, &mut sink, options).unwrap();
    (stats, sink.finish().unwrap())
}

fn read_back(pcap: &[u8]) -> Vec<CapturedFrame> {
    let mut reader = PcapReader::new(pcap).unwrap();
    assert_eq!(reader.header().datalink, DataLink::ETHERNET);
    assert_eq!(reader.header().snaplen, 65535);
    let mut frames = Vec::new();
    while let Some(packet) = reader.next_packet() {
        let packet = packet.unwrap();
        frames.push(CapturedFrame {
            timestamp: packet.timestamp,
            orig_len: packet.orig_len,
            data: packet.data.into_owned(),
        });
    }
    frames
}

fn assert_well_formed(frame: &CapturedFrame) {
    assert_eq!(frame.orig_len as usize, frame.data.len());
    assert!(verify(&frame.ip()[..20]), "bad IPv4 header checksum");
    assert_eq!(
        pseudo_header_checksum(frame.source(), frame.destination(), 17, frame.udp()),
        0,
        "bad UDP checksum"
    );
    assert!(frame.payload().ends_with(b"\r\n\r\n"));
}

#[test]
fn invite_line_end_to_end() {
    let (stats, pcap) = to_pcap(INVITE_LINE.as_bytes(), &ConvertOptions::default());
    assert_eq!(stats.written, 1);

    let frames = read_back(&pcap);
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_well_formed(frame);
    assert_eq!(frame.source(), Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(frame.destination(), Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(frame.ports(), (5000, 5060));
    assert_eq!(frame.timestamp, Duration::new(1_700_000_000, 500_000_000));
    assert_eq!(
        frame.payload(),
        b"INVITE sip:bob@example.com SIP/2.0\r\nx\r\n\r\n"
    );
}

#[test]
fn short_line_produces_nothing() {
    let (stats, pcap) = to_pcap(b"a|b|c|d|e\n", &ConvertOptions::default());
    assert_eq!(stats.skipped, 1);
    assert!(read_back(&pcap).is_empty());
}

#[test]
fn ipv6_address_produces_nothing() {
    let line = "MSG|m1|m2|m3|m4|fe80::1|5000|m7|10.0.0.2|6000|1700000000.5\n";
    let (stats, pcap) = to_pcap(line.as_bytes(), &ConvertOptions::default());
    assert_eq!(stats.skipped, 1);
    assert!(read_back(&pcap).is_empty());
}

#[test]
fn ipv4_mapped_address_converts() {
    let line = "MSG|m1|m2|m3|m4|::ffff:10.0.0.1|5000|m7|10.0.0.2|6000|1\n";
    let (stats, pcap) = to_pcap(line.as_bytes(), &ConvertOptions::default());
    assert_eq!(stats.written, 1);
    let frames = read_back(&pcap);
    assert_well_formed(&frames[0]);
    assert_eq!(frames[0].source(), Ipv4Addr::new(10, 0, 0, 1));
}

#[test]
fn non_utf8_payload_preserved_in_capture() {
    let mut line = b"MESSAGE sip:a SIP/2.0\\x0D\\x0AFrom: Ren\xe9\\x0D\\x0A\\x0D\\x0A\xc3\x28".to_vec();
    line.extend_from_slice(b"|m1|m2|m3|m4|10.0.0.1|5060|m7|10.0.0.2|5060|1\n");
    let (_, pcap) = to_pcap(&line, &ConvertOptions::default());
    let frames = read_back(&pcap);
    assert_eq!(frames.len(), 1);
    assert_well_formed(&frames[0]);
    assert_eq!(
        frames[0].payload(),
        b"MESSAGE sip:a SIP/2.0\r\nFrom: Ren\xe9\r\n\r\n\xc3\x28\r\n\r\n"
    );
}

#[test]
fn sip_source_port_left_alone() {
    let line = "MSG|m1|m2|m3|m4|10.0.0.1|5060|m7|10.0.0.2|6000|1";
    let (_, pcap) = to_pcap(line.as_bytes(), &ConvertOptions::default());
    let frames = read_back(&pcap);
    assert_eq!(frames[0].ports(), (5060, 6000));
}

#[test]
fn ignored_timestamps_use_conversion_time() {
    let options = ConvertOptions {
        parse: ParseOptions {
            use_line_timestamps: false,
        },
        ..Default::default()
    };
    let (_, pcap) = to_pcap(INVITE_LINE.as_bytes(), &options);
    let frames = read_back(&pcap);
    assert_eq!(frames.len(), 1);
    assert!(frames[0].timestamp > Duration::from_secs(1_700_000_001));
}

#[test]
fn large_payload_lengths_agree() {
    let body = "a".repeat(60_000);
    let line = format!("{body}|1|2|3|4|10.0.0.1|5060|7|10.0.0.2|5060|1");
    let (_, pcap) = to_pcap(line.as_bytes(), &ConvertOptions::default());
    let frames = read_back(&pcap);
    assert_eq!(frames.len(), 1);
    assert_well_formed(&frames[0]);
    assert_eq!(frames[0].data.len(), 14 + 20 + 8 + 60_004);
}

#[test]
fn sample_file() {
    let path = Path::new("samples").join("siptrace.log");
    if !path.exists() {
        eprintln!("skipping {}: file not found", path.display());
        return;
    }
    let mut sink = PcapSink::new(Vec::new()).unwrap();
    let stats = convert(
        File::open(&path).unwrap(),
        &mut sink,
        &ConvertOptions::default(),
    )
    .unwrap();
    assert_eq!(
        stats,
        ConvertStats {
            lines: 5,
            written: 3,
            skipped: 2,
            dropped: 0,
            filtered: 0,
        }
    );

    let frames = read_back(&sink.finish().unwrap());
    assert_eq!(frames.len(), 3);
    frames.iter().for_each(assert_well_formed);

    assert_eq!(frames[0].ports(), (5000, 5060));
    assert_eq!(frames[1].ports(), (5060, 5000));
    assert!(frames[1].payload().starts_with(b"SIP/2.0 100 Trying\r\n"));
    // Written in file order even though the BYE is stamped earlier.
    assert!(frames[2].timestamp < frames[0].timestamp);
    assert!(frames[2].payload().starts_with(b"BYE "));
}
