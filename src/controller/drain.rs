use bytes::BytesMut;
use futures_util::StreamExt;
use regex::Regex;
use std::io;
use std::sync::LazyLock;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::{trace, warn};

use super::log_buffer::LogBuffer;

/// Longest diagnostic line kept; the remainder up to the next line break is discarded
pub const MAX_LINE_BYTES: usize = 8 * 1024;

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid ANSI pattern"));

/// Splits a diagnostic stream into lines on `\n` or `\r`.
///
/// ffmpeg rewrites its progress line with carriage returns, so `\r` must end a line too.
/// Overlong lines are cut at `max_length` instead of failing the stream.
#[derive(Debug)]
pub struct DiagnosticLineCodec {
    max_length: usize,
    discarding: bool,
}

impl DiagnosticLineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
            discarding: false,
        }
    }
}

impl Decoder for DiagnosticLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            match buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
                Some(pos) => {
                    let chunk = buf.split_to(pos + 1);
                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    let line = &chunk[..pos];
                    if line.len() > self.max_length {
                        return Ok(Some(truncated_line(&line[..self.max_length])));
                    }
                    return Ok(Some(clean_line(line)));
                }
                None if buf.len() > self.max_length => {
                    if self.discarding {
                        buf.clear();
                        return Ok(None);
                    }
                    let chunk = buf.split_to(self.max_length);
                    self.discarding = true;
                    return Ok(Some(truncated_line(&chunk)));
                }
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let chunk = buf.split_to(buf.len());
        if self.discarding {
            self.discarding = false;
            return Ok(None);
        }
        Ok(Some(clean_line(&chunk)))
    }
}

/// Lossy-decode, strip terminal colour codes and surrounding whitespace
fn clean_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    ANSI_ESCAPE.replace_all(&text, "").trim().to_string()
}

fn truncated_line(raw: &[u8]) -> String {
    format!("{} [truncated]", clean_line(raw))
}

/// Read `reader` until end of stream, appending non-blank lines to `logs` under `generation`.
/// Returns the number of lines accepted.
pub async fn drain_diagnostics<R>(reader: R, logs: &LogBuffer, generation: u64) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, DiagnosticLineCodec::new(MAX_LINE_BYTES));
    let mut accepted = 0;

    while let Some(item) = lines.next().await {
        match item {
            Ok(line) if line.is_empty() => {}
            Ok(line) => {
                trace!(run = generation, "{}", line);
                if logs.push(generation, line) {
                    accepted += 1;
                }
            }
            Err(e) => {
                warn!("Run {} diagnostic stream failed: {}", generation, e);
                break;
            }
        }
    }

    accepted
}
