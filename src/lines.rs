use std::io::{self, BufRead, BufReader, Read};

/// Iterator over the lines of a trace log.
///
/// Line endings (`\n` or `\r\n`) are stripped and `--` context separators
/// left by `grep -A/-B/-C` are skipped. Everything else is returned as raw
/// bytes; no decoding happens here.
pub struct TraceLines<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    line_number: u64,
    failed: bool,
}

impl<R: Read> TraceLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::new(),
            line_number: 0,
            failed: false,
        }
    }

    /// 1-based number of the line most recently returned.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }
}

fn is_grep_separator(line: &[u8]) -> bool {
    line == b"--"
}

fn strip_line_ending(mut line: &[u8]) -> &[u8] {
    if let Some(rest) = line.strip_suffix(b"\n") {
        line = rest;
    }
    line.strip_suffix(b"\r").unwrap_or(line)
}

impl<R: Read> Iterator for TraceLines<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            self.buf.clear();
            match self.inner.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_number += 1;
                    let line = strip_line_ending(&self.buf);
                    if is_grep_separator(line) {
                        continue;
                    }
                    return Some(Ok(line.to_vec()));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
