//! Server-Sent-Events framing for chat-completion streams.
//!
//! [`DeltaParser`] turns raw response chunks into text deltas:
//!
//! 1. bytes are decoded with a stateful UTF-8 decoder;
//! 2. the text is cut at each `\n`, one trailing `\r` removed;
//! 3. blank lines and `:` comments are skipped;
//! 4. lines without the `data: ` prefix are skipped;
//! 5. `data: [DONE]` ends accumulation, later frames are ignored;
//! 6. other payloads are parsed as JSON and their delta extracted. A payload
//!    that fails to parse is logged and dropped;
//! 7. an unterminated remainder waits for the next chunk.

pub mod decoder;
pub mod delta;

pub use decoder::{parse_line, FrameDecoder, Utf8Decoder};
pub use delta::{ChatCompletionDeltas, DeltaExtractor};

use std::sync::Arc;

use crate::types::StreamFrame;

/// Incremental chunk → delta parser for one response body.
///
/// A line without the `data: ` prefix is skipped and the rest of the chunk is
/// still processed, so the deltas produced never depend on where the network
/// split the body.
pub struct DeltaParser {
    frames: FrameDecoder,
    extractor: Arc<dyn DeltaExtractor>,
    done: bool,
    dropped_frames: usize,
}

impl Default for DeltaParser {
    fn default() -> Self {
        Self::new(Arc::new(ChatCompletionDeltas))
    }
}

impl DeltaParser {
    pub fn new(extractor: Arc<dyn DeltaExtractor>) -> Self {
        Self {
            frames: FrameDecoder::new(),
            extractor,
            done: false,
            dropped_frames: 0,
        }
    }

    /// Process one chunk, returning the deltas it completes in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        let frames = self.frames.feed(chunk);
        self.apply(frames)
    }

    /// Process whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        let frames = self.frames.finish();
        self.apply(frames)
    }

    /// Whether the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of `data:` frames discarded because they did not parse.
    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    fn apply(&mut self, frames: Vec<StreamFrame>) -> Vec<String> {
        let mut deltas = Vec::new();
        for frame in frames {
            match frame {
                StreamFrame::Blank | StreamFrame::Comment(_) | StreamFrame::Other(_) => continue,
                StreamFrame::Done => {
                    self.done = true;
                    break;
                }
                StreamFrame::Data(payload) => match self.extractor.extract(&payload) {
                    Ok(Some(text)) => deltas.push(text),
                    Ok(None) => {}
                    Err(err) => {
                        self.dropped_frames += 1;
                        tracing::warn!(error = %err, payload = %payload, "dropping malformed stream frame");
                    }
                },
            }
        }
        deltas
    }
}

/// Parse a complete body in one pass. Handy for tests and non-streaming callers.
pub fn collect_text(body: &[u8]) -> String {
    let mut parser = DeltaParser::default();
    let mut text: String = parser.feed(body).concat();
    text.push_str(&parser.finish().concat());
    text
}
