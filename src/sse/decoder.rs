//! Incremental byte → frame decoding.

use std::borrow::Cow;

use crate::types::StreamFrame;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Stateful UTF-8 decoder.
///
/// A multi-byte character split across two chunks is held back until its
/// remaining bytes arrive. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, keeping an incomplete trailing sequence for the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let joined: Cow<'_, [u8]> = if self.pending.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut bytes = std::mem::take(&mut self.pending);
            bytes.extend_from_slice(chunk);
            Cow::Owned(bytes)
        };

        let mut out = String::with_capacity(joined.len());
        let mut rest: &[u8] = &joined;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let valid_len = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid_len]));
                    match err.error_len() {
                        Some(bad_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid_len + bad_len..];
                        }
                        None => {
                            self.pending = rest[valid_len..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush held-back bytes at end of stream.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&tail).into_owned()
    }

    /// Number of bytes waiting for the rest of a character.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }
}

/// Splits decoded text into newline-delimited frames.
///
/// Between calls the buffer holds at most one incomplete line.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    utf8: Utf8Decoder,
    buffer: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk and return every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        let text = self.utf8.decode(chunk);
        self.buffer.push_str(&text);
        self.drain_lines()
    }

    /// Flush the decoder and the trailing partial line at end of stream.
    pub fn finish(&mut self) -> Vec<StreamFrame> {
        let tail = self.utf8.finish();
        self.buffer.push_str(&tail);
        let mut frames = self.drain_lines();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            frames.push(parse_line(&line));
        }
        frames
    }

    /// Text received but not yet terminated by a newline.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    fn drain_lines(&mut self) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].find('\n') {
            let end = start + offset;
            frames.push(parse_line(&self.buffer[start..end]));
            start = end + 1;
        }
        self.buffer.drain(..start);
        frames
    }
}

/// Classify a single line (newline already removed).
pub fn parse_line(line: &str) -> StreamFrame {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if line.trim().is_empty() {
        return StreamFrame::Blank;
    }
    if let Some(comment) = line.strip_prefix(':') {
        return StreamFrame::Comment(comment.to_string());
    }
    match line.strip_prefix(DATA_PREFIX) {
        Some(payload) if payload.trim() == DONE_SENTINEL => StreamFrame::Done,
        Some(payload) => StreamFrame::Data(payload.to_string()),
        None => StreamFrame::Other(line.to_string()),
    }
}
