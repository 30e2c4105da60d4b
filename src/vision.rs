//! Vision model port used by the extraction backend.
//!
//! The backend only needs one capability from a model: given a base64
//! image, stream back answer parts, each flagged as thought or answer.
//! [`GeminiModel`] implements it against the Gemini `streamGenerateContent`
//! endpoint; tests substitute scripted models.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use gptodo_core::sse::{data_payload, LineBuffer, DONE_SENTINEL};

use crate::config::ModelConfig;

/// One streamed piece of model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPart {
    pub thought: bool,
    pub text: String,
}

impl ModelPart {
    pub fn thought(text: impl Into<String>) -> Self {
        Self {
            thought: true,
            text: text.into(),
        }
    }

    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            thought: false,
            text: text.into(),
        }
    }
}

pub type PartStream = BoxStream<'static, Result<ModelPart>>;

#[async_trait]
pub trait VisionModel: Send + Sync {
    fn name(&self) -> &str;

    /// Start a request for `image_base64`.
    ///
    /// An `Err` here means the model never started answering; errors after
    /// that arrive as items of the stream, which ends after the first one.
    async fn stream_parts(&self, image_base64: &str) -> Result<PartStream>;
}

/// Build the configured model.
pub fn create_model(config: &ModelConfig) -> Result<Arc<dyn VisionModel>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiModel::from_config(config)?)),
        other => bail!("Unknown model provider: '{}'. Supported: gemini", other),
    }
}

const EXTRACTION_PROMPT: &str = "\
Read the handwritten or printed list in this image. \
Return every line item as a separate element, in the order it appears, \
with the text exactly as written. Leave out titles, dates, and decorations. \
If there is no list in the image, return an empty array.";

pub struct GeminiModel {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    thinking_budget: u32,
    temperature: f32,
}

impl GeminiModel {
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .with_context(|| format!("{} is not set", config.api_key_env))?;

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.name.clone(),
            api_key,
            thinking_budget: config.thinking_budget,
            temperature: config.temperature,
        })
    }

    fn request_body(&self, image_base64: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "inlineData": { "mimeType": sniff_mime(image_base64), "data": image_base64 } },
                    { "text": EXTRACTION_PROMPT }
                ]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": { "text": { "type": "STRING" } },
                        "required": ["text"]
                    }
                },
                "thinkingConfig": {
                    "thinkingBudget": self.thinking_budget,
                    "includeThoughts": true
                }
            }
        })
    }
}

#[async_trait]
impl VisionModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn stream_parts(&self, image_base64: &str) -> Result<PartStream> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(image_base64))
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{} {}", status, body);
        }

        Ok(part_stream(response.bytes_stream().boxed()))
    }
}

/// Guess the image MIME type from the leading base64 characters.
pub fn sniff_mime(image_base64: &str) -> &'static str {
    if image_base64.starts_with("iVBOR") {
        "image/png"
    } else if image_base64.starts_with("UklGR") {
        "image/webp"
    } else if image_base64.starts_with("R0lGOD") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
}

/// Parse one SSE line of a Gemini stream into parts.
///
/// Lines that are not `data:` records, or whose JSON does not parse, yield
/// nothing. An error object in the chunk is returned as `Err`.
fn parse_chunk_line(line: &str) -> Result<Vec<ModelPart>> {
    let Some(data) = data_payload(line) else {
        return Ok(Vec::new());
    };
    if data.is_empty() || data == DONE_SENTINEL {
        return Ok(Vec::new());
    }

    let chunk: GenerateChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(error = %e, "skipping malformed model chunk");
            return Ok(Vec::new());
        }
    };

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(anyhow!(message));
    }

    let parts = chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts)
        .unwrap_or_default();

    Ok(parts
        .into_iter()
        .filter_map(|p| {
            let text = p.text.filter(|t| !t.is_empty())?;
            Some(ModelPart {
                thought: p.thought.unwrap_or(false),
                text,
            })
        })
        .collect())
}

struct PartState<S> {
    body: S,
    lines: LineBuffer,
    queue: VecDeque<ModelPart>,
    ended: bool,
}

/// Turn a raw byte stream of Gemini SSE into a stream of parts.
fn part_stream<S, B, E>(body: S) -> PartStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    let state = PartState {
        body,
        lines: LineBuffer::new(),
        queue: VecDeque::new(),
        ended: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(part) = state.queue.pop_front() {
                return Some((Ok(part), state));
            }
            if state.ended {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for line in state.lines.push(chunk.as_ref()) {
                        match parse_chunk_line(&line) {
                            Ok(parts) => state.queue.extend(parts),
                            Err(e) => {
                                state.queue.clear();
                                state.ended = true;
                                return Some((Err(e), state));
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    state.queue.clear();
                    state.ended = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    if !state.lines.remainder().is_empty() {
                        debug!(
                            bytes = state.lines.remainder().len(),
                            "discarding unterminated model line"
                        );
                    }
                    state.ended = true;
                }
            }
        }
    })
    .boxed()
}
