use std::fmt;
use std::io::Write;

use pcap_file::pcap::{PcapHeader, PcapPacket, PcapWriter};
use pcap_file::{DataLink, Endianness, PcapError};

use crate::packet::SNAP_LEN;
use crate::types::SynthesizedFrame;

#[derive(Debug)]
pub enum CaptureError {
    Pcap(PcapError),
    Io(std::io::Error),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Pcap(e) => write!(f, "pcap write error: {e}"),
            CaptureError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::Pcap(e) => Some(e),
            CaptureError::Io(e) => Some(e),
        }
    }
}

impl From<PcapError> for CaptureError {
    fn from(e: PcapError) -> Self {
        CaptureError::Pcap(e)
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        CaptureError::Io(e)
    }
}

/// Destination for synthesized frames, appended strictly in call order.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &SynthesizedFrame) -> Result<(), CaptureError>;
}

impl FrameSink for Vec<SynthesizedFrame> {
    fn write_frame(&mut self, frame: &SynthesizedFrame) -> Result<(), CaptureError> {
        self.push(frame.clone());
        Ok(())
    }
}

/// Global header of every capture this crate writes.
pub fn capture_header() -> PcapHeader {
    PcapHeader {
        snaplen: SNAP_LEN as u32,
        datalink: DataLink::ETHERNET,
        endianness: Endianness::Little,
        ..Default::default()
    }
}

/// Classic libpcap writer; timestamps are written as given, even out of order.
pub struct PcapSink<W: Write> {
    writer: PcapWriter<W>,
}

impl<W: Write> PcapSink<W> {
    /// Write the global header and return a sink ready for frames.
    pub fn new(writer: W) -> Result<Self, CaptureError> {
        let writer = PcapWriter::with_header(writer, capture_header())?;
        Ok(PcapSink { writer })
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(self) -> Result<W, CaptureError> {
        let mut inner = self.writer.into_writer();
        inner.flush()?;
        Ok(inner)
    }
}

impl<W: Write> FrameSink for PcapSink<W> {
    fn write_frame(&mut self, frame: &SynthesizedFrame) -> Result<(), CaptureError> {
        let len = frame.data.len() as u32;
        let packet = PcapPacket::new(frame.timestamp, len, &frame.data);
        self.writer.write_packet(&packet)?;
        Ok(())
    }
}
