//! Wire types for the Ollama-compatible HTTP protocol.
//!
//! Everything the inference server's JSON shapes touch lives here, so the
//! orchestrator and callers never handle raw `serde_json::Value`. Swapping
//! in an alternate backend means replacing this module and the
//! [`NodeClient`](crate::client::NodeClient), nothing else.
//!
//! Stream parsing is best-effort: a malformed NDJSON line is logged and
//! skipped rather than aborting the generation.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ChatMessage;

/// Sampling options sent inside the chat payload.
#[derive(Serialize, Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub num_ctx: usize,
    pub temperature: f32,
    pub repeat_penalty: f32,
}

/// Body of a streaming chat request: POST `{base}/api/chat`.
#[derive(Serialize, Debug, Clone)]
pub struct ChatPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: GenerationOptions,
}

/// One newline-delimited JSON object from the chat stream.
///
/// Intermediate lines carry `message.content`; the terminal line has
/// `done: true` plus duration/count fields in nanoseconds.
#[derive(Deserialize, Debug, Default)]
pub struct ChatStreamLine {
    message: Option<LineMessage>,
    #[serde(default)]
    pub done: bool,
    pub total_duration: Option<u64>,
    pub load_duration: Option<u64>,
    pub prompt_eval_count: Option<u64>,
    pub eval_count: Option<u64>,
    pub eval_duration: Option<u64>,
    pub error: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct LineMessage {
    content: Option<String>,
}

impl ChatStreamLine {
    /// The text fragment this line carries, if any.
    pub fn content(&self) -> Option<&str> {
        self.message
            .as_ref()
            .and_then(|m| m.content.as_deref())
            .filter(|c| !c.is_empty())
    }
}

/// Parse one stream line. Returns `None` (with a warning) on malformed JSON.
pub fn parse_stream_line(line: &str) -> Option<ChatStreamLine> {
    match serde_json::from_str::<ChatStreamLine>(line) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!("skipping malformed stream line: {err}");
            None
        }
    }
}

/// Statistics for one completed (non-aborted) generation, derived from the
/// terminal protocol message. Durations are converted from nanoseconds to
/// milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationStats {
    pub total_duration_ms: f64,
    pub load_duration_ms: f64,
    pub prompt_eval_count: u64,
    pub eval_count: u64,
    pub eval_duration_ms: f64,
    pub tokens_per_second: f64,
}

impl GenerationStats {
    /// Derive stats from the terminal stream line.
    pub fn from_terminal(line: &ChatStreamLine) -> Self {
        let eval_duration = line.eval_duration.unwrap_or(0);
        let eval_count = line.eval_count.unwrap_or(0);
        let tokens_per_second = if eval_duration > 0 {
            eval_count as f64 / (eval_duration as f64 / 1e9)
        } else {
            0.0
        };
        Self {
            total_duration_ms: line.total_duration.unwrap_or(0) as f64 / 1e6,
            load_duration_ms: line.load_duration.unwrap_or(0) as f64 / 1e6,
            prompt_eval_count: line.prompt_eval_count.unwrap_or(0),
            eval_count,
            eval_duration_ms: eval_duration as f64 / 1e6,
            tokens_per_second,
        }
    }

    /// Synthetic stats for a response served from the cache.
    pub fn instant(completion_tokens: usize) -> Self {
        Self {
            total_duration_ms: 10.0,
            load_duration_ms: 0.0,
            prompt_eval_count: 0,
            eval_count: completion_tokens as u64,
            eval_duration_ms: 10.0,
            tokens_per_second: 9999.0,
        }
    }
}

// ── Non-streaming endpoints ────────────────────────────────────────

/// Body of a one-shot completion: POST `{base}/api/generate`.
#[derive(Serialize, Debug, Clone)]
pub struct OneShotPayload {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    /// `"json"` to constrain output to valid JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub options: OneShotOptions,
}

/// Sparse option set for one-shot calls; unset fields use server defaults.
#[derive(Serialize, Debug, Clone, Copy, Default)]
pub struct OneShotOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Response of `/api/generate` with `stream: false`.
#[derive(Deserialize, Debug)]
pub struct OneShotResponse {
    pub response: String,
}

/// Response of GET `{base}/api/tags`.
#[derive(Deserialize, Debug, Default)]
pub struct ModelList {
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

/// One installed model as reported by the listing endpoint.
#[derive(Deserialize, Debug, Clone)]
pub struct ModelEntry {
    pub name: String,
    /// Size in bytes.
    pub size: Option<u64>,
    pub digest: Option<String>,
    pub details: Option<ModelDetails>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ModelDetails {
    pub family: Option<String>,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
}

/// One progress line from the streaming pull endpoint.
#[derive(Deserialize, Debug, Default)]
pub struct PullProgress {
    pub status: Option<String>,
    pub completed: Option<u64>,
    pub total: Option<u64>,
    pub error: Option<String>,
}

impl PullProgress {
    /// Download completion as a percentage, when both counters are present.
    pub fn percent(&self) -> Option<u32> {
        match (self.completed, self.total) {
            (Some(done), Some(total)) if total > 0 => {
                Some(((done as f64 / total as f64) * 100.0).round() as u32)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_line_parses() {
        let line = parse_stream_line(r#"{"message":{"content":"hi"},"done":false}"#).unwrap();
        assert_eq!(line.content(), Some("hi"));
        assert!(!line.done);
    }

    #[test]
    fn empty_content_is_none() {
        let line = parse_stream_line(r#"{"message":{"content":""},"done":false}"#).unwrap();
        assert!(line.content().is_none());
    }

    #[test]
    fn malformed_line_is_skipped() {
        assert!(parse_stream_line("{not json").is_none());
    }

    #[test]
    fn terminal_line_produces_stats() {
        let line = parse_stream_line(
            r#"{"done":true,"total_duration":2000000000,"load_duration":500000000,
               "prompt_eval_count":42,"eval_count":100,"eval_duration":1000000000}"#,
        )
        .unwrap();
        assert!(line.done);
        let stats = GenerationStats::from_terminal(&line);
        assert_eq!(stats.total_duration_ms, 2000.0);
        assert_eq!(stats.load_duration_ms, 500.0);
        assert_eq!(stats.prompt_eval_count, 42);
        assert_eq!(stats.eval_count, 100);
        assert_eq!(stats.tokens_per_second, 100.0);
    }

    #[test]
    fn stats_guard_zero_eval_duration() {
        let line = ChatStreamLine {
            done: true,
            ..Default::default()
        };
        let stats = GenerationStats::from_terminal(&line);
        assert_eq!(stats.tokens_per_second, 0.0);
    }

    #[test]
    fn payload_serializes_expected_shape() {
        let payload = ChatPayload {
            model: "llama3".into(),
            messages: vec![ChatMessage::user("hi")],
            stream: true,
            options: GenerationOptions {
                num_ctx: 8192,
                temperature: 0.7,
                repeat_penalty: 1.1,
            },
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["options"]["num_ctx"], 8192);
        assert_eq!(json["messages"][0]["role"], "user");
        // Empty image lists are omitted from the wire.
        assert!(json["messages"][0].get("images").is_none());
    }

    #[test]
    fn one_shot_payload_omits_unset_fields() {
        let payload = OneShotPayload {
            model: "m".into(),
            prompt: "p".into(),
            stream: false,
            format: None,
            options: OneShotOptions::default(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("format").is_none());
        assert!(json["options"].get("temperature").is_none());
    }

    #[test]
    fn pull_progress_percent() {
        let progress: PullProgress =
            serde_json::from_str(r#"{"status":"downloading","completed":50,"total":200}"#).unwrap();
        assert_eq!(progress.percent(), Some(25));
        let no_total: PullProgress = serde_json::from_str(r#"{"status":"verifying"}"#).unwrap();
        assert!(no_total.percent().is_none());
    }
}
