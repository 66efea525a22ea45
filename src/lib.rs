pub mod capture;
pub mod checksum;
pub mod convert;
pub mod lines;
pub mod packet;
pub mod record;
pub mod types;

pub use capture::{CaptureError, FrameSink, PcapSink};
pub use convert::{convert, ConvertError, ConvertOptions, ConvertStats};
pub use lines::TraceLines;
pub use packet::{synthesize, SynthError};
pub use record::{parse_line, ParseOptions, SkipReason};
pub use types::*;
