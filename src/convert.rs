use std::fmt;
use std::io::{self, Read};

use regex::bytes::Regex;
use tracing::{debug, info, trace, warn};

use crate::capture::{CaptureError, FrameSink};
use crate::lines::TraceLines;
use crate::packet::synthesize;
use crate::record::{parse_line, ParseOptions};

#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub parse: ParseOptions,
    /// Only lines matching this pattern are converted. Matched against the
    /// raw line bytes, so non-UTF-8 text never blocks a match.
    pub filter: Option<Regex>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertStats {
    pub lines: u64,
    pub written: u64,
    pub skipped: u64,
    pub dropped: u64,
    pub filtered: u64,
}

impl fmt::Display for ConvertStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lines: {}, written: {}, skipped: {}, dropped: {}, filtered: {}",
            self.lines, self.written, self.skipped, self.dropped, self.filtered
        )
    }
}

/// Failure that ends the conversion. Frames already written stay written.
#[derive(Debug)]
pub enum ConvertError {
    Read(io::Error),
    Write(CaptureError),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::Read(e) => write!(f, "read error: {e}"),
            ConvertError::Write(e) => write!(f, "write error: {e}"),
        }
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConvertError::Read(e) => Some(e),
            ConvertError::Write(e) => Some(e),
        }
    }
}

impl From<io::Error> for ConvertError {
    fn from(e: io::Error) -> Self {
        ConvertError::Read(e)
    }
}

impl From<CaptureError> for ConvertError {
    fn from(e: CaptureError) -> Self {
        ConvertError::Write(e)
    }
}

/// Convert every line of `input` into a frame on `sink`.
///
/// Bad lines and frames that cannot be built are logged and counted;
/// only read and write failures stop the run.
pub fn convert<R: Read, S: FrameSink>(
    input: R,
    sink: &mut S,
    options: &ConvertOptions,
) -> Result<ConvertStats, ConvertError> {
    let mut stats = ConvertStats::default();
    let mut lines = TraceLines::new(input);

    while let Some(line) = lines.next() {
        let line = line?;
        let line_number = lines.line_number();
        stats.lines += 1;

        if let Some(ref re) = options.filter {
            if !re.is_match(&line) {
                stats.filtered += 1;
                continue;
            }
        }

        let record = match parse_line(&line, &options.parse) {
            Ok(record) => record,
            Err(reason) => {
                debug!(line = line_number, %reason, "skipping line");
                stats.skipped += 1;
                continue;
            }
        };

        let frame = match synthesize(&record) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(line = line_number, error = %e, "failed to build frame");
                stats.dropped += 1;
                continue;
            }
        };

        sink.write_frame(&frame)?;
        stats.written += 1;
        trace!(
            line = line_number,
            bytes = frame.len(),
            source = %record.source,
            destination = %record.destination,
            "wrote frame"
        );
    }

    info!(
        lines = stats.lines,
        written = stats.written,
        skipped = stats.skipped,
        dropped = stats.dropped,
        filtered = stats.filtered,
        "conversion finished"
    );
    Ok(stats)
}
