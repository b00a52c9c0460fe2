//! Extraction of incremental text from `data:` payloads.

use serde::Deserialize;

/// Pulls the text delta out of one frame payload.
///
/// The JSON shape is provider-specific; implementations return `Ok(None)` for
/// well-formed payloads that carry no text (role announcements, usage, etc.).
pub trait DeltaExtractor: Send + Sync {
    fn extract(&self, payload: &str) -> Result<Option<String>, serde_json::Error>;
}

/// OpenAI-compatible chat-completion chunks: `choices[0].delta.content`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChatCompletionDeltas;

impl DeltaExtractor for ChatCompletionDeltas {
    fn extract(&self, payload: &str) -> Result<Option<String>, serde_json::Error> {
        let chunk: ChatCompletionChunk = serde_json::from_str(payload.trim())?;
        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty()))
    }
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    content: Option<String>,
}
