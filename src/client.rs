//! Checklist extraction client.
//!
//! Sends one image to the extraction backend and turns the response into
//! [`ChecklistItem`]s. Two response modes are supported:
//!
//! - **Stream**: `text/event-stream` decoded by
//!   [`StreamDecoder`](gptodo_core::sse::StreamDecoder); thought and answer
//!   fragments are pushed to the caller while the body is still arriving.
//! - **Json**: the whole body is one JSON array of `{text}`.
//!
//! # Error mapping
//!
//! | Condition | Error |
//! |-----------|-------|
//! | empty image payload | `Validation` (no request is sent) |
//! | `{error}` body or in-stream error mentioning overload | `ServiceOverloaded` |
//! | any other `{error}` | `ExtractionFailed` (masked message) |
//! | network failure, unreadable error body | `ExtractionFailed` |
//! | success but not an array of `{text}` | `ResponseParse` |
//!
//! There is no retry here; retrying is the caller's decision.

use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use gptodo_core::answer::parse_answer;
use gptodo_core::error::ExtractError;
use gptodo_core::models::{ChecklistItem, ErrorBody, ExtractRequest};
use gptodo_core::sse::{StreamDecoder, StreamEvent};

use crate::config::{ClientConfig, ResponseMode};

/// Progress and terminal signals of one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractEvent {
    /// Raw intermediate reasoning text.
    Thought(String),
    /// A fragment of the final answer, as received.
    Answer(String),
    /// The extraction succeeded with this many items.
    Completed { items: usize },
    /// The extraction failed.
    Failed(ExtractError),
}

pub type EventSender = mpsc::UnboundedSender<ExtractEvent>;

#[derive(Clone)]
pub struct ExtractionClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    mode: ResponseMode,
}

impl ExtractionClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.resolved_api_key(),
            mode: config.mode,
        })
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    /// Extract checklist items from a base64 image payload.
    ///
    /// When `events` is given, fragments are sent as they arrive and the
    /// call always ends with exactly one `Completed` or `Failed` event. Send
    /// failures (receiver gone) are ignored.
    pub async fn extract(
        &self,
        base64_image: &str,
        events: Option<&EventSender>,
    ) -> Result<Vec<ChecklistItem>, ExtractError> {
        let result = self.run(base64_image, events).await;

        if let Some(tx) = events {
            let terminal = match &result {
                Ok(items) => ExtractEvent::Completed { items: items.len() },
                Err(e) => ExtractEvent::Failed(e.clone()),
            };
            let _ = tx.send(terminal);
        }

        result
    }

    async fn run(
        &self,
        base64_image: &str,
        events: Option<&EventSender>,
    ) -> Result<Vec<ChecklistItem>, ExtractError> {
        if base64_image.trim().is_empty() {
            return Err(ExtractError::invalid_image());
        }

        let body = ExtractRequest {
            base64_image: base64_image.to_string(),
        };
        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, endpoint = %self.endpoint, "extraction request failed");
            ExtractError::failed()
        })?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        match self.mode {
            ResponseMode::Stream => decode_stream(response, events).await,
            ResponseMode::Json => {
                let text = response.text().await.map_err(|e| {
                    warn!(error = %e, "failed to read extraction response");
                    ExtractError::failed()
                })?;
                parse_answer(&text)
            }
        }
    }
}

/// Classify a non-2xx response.
///
/// A body that cannot be read or is not `{error}` falls back to the generic
/// failure; it never replaces the fact that the request failed.
async fn error_from_response(response: reqwest::Response) -> ExtractError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            warn!(%status, error = %e, "failed to read error body");
            return ExtractError::failed();
        }
    };

    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody { error }) => {
            warn!(%status, upstream = %error, "backend reported an error");
            ExtractError::from_server_message(&error)
        }
        Err(_) => {
            warn!(%status, "extraction failed without an error body");
            ExtractError::failed()
        }
    }
}

/// Read the event stream to completion and parse the accumulated answer.
///
/// The body stream is dropped on every return path, releasing the
/// connection.
async fn decode_stream(
    response: reqwest::Response,
    events: Option<&EventSender>,
) -> Result<Vec<ChecklistItem>, ExtractError> {
    let mut decoder = StreamDecoder::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| {
            warn!(error = %e, "extraction stream interrupted");
            ExtractError::failed()
        })?;

        for event in decoder.feed(&chunk)? {
            if let Some(tx) = events {
                let _ = tx.send(match event {
                    StreamEvent::Thought(text) => ExtractEvent::Thought(text),
                    StreamEvent::Answer(text) => ExtractEvent::Answer(text),
                });
            }
        }

        if decoder.is_done() {
            break;
        }
    }

    if decoder.skipped_lines() > 0 {
        debug!(skipped = decoder.skipped_lines(), "stream contained malformed lines");
    }

    parse_answer(&decoder.finish())
}
