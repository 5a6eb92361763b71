//! Line framing shared by the upstream reader and the relay consumer.

use std::str::Utf8Error;

/// Accumulates raw body chunks and hands back complete lines, so a line split
/// across two network chunks is only seen once it is whole.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn next_line(&mut self) -> Option<Result<String, Utf8Error>> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.buf.drain(..=pos).collect();
        Some(decode_line(&raw[..pos]))
    }

    /// Whatever is left once the body has ended without a trailing newline.
    pub fn take_remainder(&mut self) -> Option<Result<String, Utf8Error>> {
        if self.buf.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buf);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> Result<String, Utf8Error> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    std::str::from_utf8(raw).map(str::to_string)
}

/// Payload of an SSE `data:` line, or `None` for any other line.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
}
