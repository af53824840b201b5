//! "Ask your data" reports from a hosted language model.
//!
//! The whole snapshot is rendered into the prompt and the answer is streamed
//! back as text fragments. Dropping the stream cancels the request.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::GeminiConfig;
use crate::error::{Error, Result};
use crate::models::AppData;

pub type ReportStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Start generating. Fails up front if the request is refused; a
    /// failure after streaming began is yielded once and ends the stream.
    async fn generate(&self, data: &AppData, query: &str) -> Result<ReportStream>;
}

pub fn build_prompt(data: &AppData, query: &str) -> Result<String> {
    let data_json = serde_json::to_string_pretty(data)?;
    Ok(format!(
        "You are an expert hostel management analyst. Based on the following data for a hostel \
         business, provide a concise and clear answer to the user's query.\n\n\
         Data (in JSON format):\n{data_json}\n\n\
         User Query:\n\"{query}\"\n\n\
         Your response should be formatted in clean markdown.\n"
    ))
}

/// Used when no API key is configured.
pub struct DisabledReporter;

#[async_trait]
impl ReportGenerator for DisabledReporter {
    async fn generate(&self, _data: &AppData, _query: &str) -> Result<ReportStream> {
        Err(Error::Report(
            "report generation is not configured (set GEMINI_API_KEY)".to_string(),
        ))
    }
}

/// Gemini `streamGenerateContent` over server-sent events.
pub struct GeminiReporter {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiReporter {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

/// Pick the generator for a config: Gemini when a key is present.
pub fn from_config(config: &GeminiConfig) -> Arc<dyn ReportGenerator> {
    match &config.api_key {
        Some(key) => {
            info!(model = %config.model, "report generation enabled");
            Arc::new(GeminiReporter::new(key.clone(), config.model.clone(), config.base_url.clone()))
        }
        None => {
            warn!("GEMINI_API_KEY not set, report generation disabled");
            Arc::new(DisabledReporter)
        }
    }
}

#[async_trait]
impl ReportGenerator for GeminiReporter {
    async fn generate(&self, data: &AppData, query: &str) -> Result<ReportStream> {
        let prompt = build_prompt(data, query)?;
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        debug!(model = %self.model, prompt_len = prompt.len(), "requesting report");
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Report(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, "report request rejected");
            return Err(Error::Report(format!("model API returned {status}: {detail}")));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| e.to_string()))
            .boxed();
        Ok(text_fragments(bytes))
    }
}

struct FragmentState {
    bytes: BoxStream<'static, std::result::Result<Vec<u8>, String>>,
    decoder: SseTextDecoder,
    pending: VecDeque<String>,
    done: bool,
}

/// Decode a raw SSE byte stream into text fragments.
fn text_fragments(
    bytes: BoxStream<'static, std::result::Result<Vec<u8>, String>>,
) -> ReportStream {
    let state = FragmentState {
        bytes,
        decoder: SseTextDecoder::default(),
        pending: VecDeque::new(),
        done: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                return Some((Ok(fragment), state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.pending.extend(state.decoder.feed(&chunk)),
                Some(Err(e)) => {
                    state.done = true;
                    state.pending.clear();
                    return Some((Err(Error::Report(format!("stream interrupted: {e}"))), state));
                }
                None => {
                    state.done = true;
                    state.pending.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

/// Incremental parser for `data: {json}` event lines.
///
/// Bytes may be split anywhere, including inside a UTF-8 sequence, so input
/// is buffered until a full line is available.
#[derive(Debug, Default)]
pub struct SseTextDecoder {
    buffer: Vec<u8>,
}

impl SseTextDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut fragments = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(text) = parse_line(&line) {
                fragments.push(text);
            }
        }
        fragments
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line).into_iter().collect()
    }
}

fn parse_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let payload = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?.trim_start();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => {
            let text: String = chunk
                .candidates
                .into_iter()
                .filter_map(|c| c.content)
                .flat_map(|c| c.parts)
                .filter_map(|p| p.text)
                .collect();
            (!text.is_empty()).then_some(text)
        }
        Err(e) => {
            warn!(error = %e, "skipping malformed stream event");
            None
        }
    }
}
