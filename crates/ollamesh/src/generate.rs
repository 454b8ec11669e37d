//! Generation orchestration: the end-to-end path from a user message to a
//! streamed, failover-protected, cache-aware response.
//!
//! [`Gateway::generate`] composes the rest of the crate: the router picks
//! the node, the cache may short-circuit, the budgeter trims history, the
//! streaming chat call is opened (with a single remote-to-local failover),
//! and each NDJSON line is fed through the think-tag splitter before its
//! fragments reach the caller's callback. Errors never escape past this
//! boundary: cancellation is silent, everything else becomes a visible
//! inline fragment.

use tracing::{error, info, warn};

use crate::cache::{KeyProjection, ResponseCache, cache_key};
use crate::cancel::CancelToken;
use crate::client::NodeClient;
use crate::config::GatewaySettings;
use crate::context::budget_history;
use crate::error::{GatewayError, Result};
use crate::protocol::{ChatPayload, GenerationOptions, GenerationStats, parse_stream_line};
use crate::router::resolve_endpoint;
use crate::think::{StreamFragment, ThinkTagParser};
use crate::tokens::estimate_tokens;
use crate::{ChatMessage, MessageRole};

/// Callback invoked for every emitted fragment, in stream order.
///
/// Exactly one of the first two arguments is `Some`; the flag mirrors
/// which channel the fragment belongs to.
pub trait FragmentSink: FnMut(Option<&str>, Option<&str>, bool) {}
impl<F: FnMut(Option<&str>, Option<&str>, bool)> FragmentSink for F {}

/// One generation request. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// The current user message.
    pub message: String,
    /// Prior conversation, oldest to newest. System-role entries are
    /// transient UI notices and never reach the model.
    pub history: Vec<ChatMessage>,
    /// Compressed long-term memory injected into the system content.
    pub long_term_memory: Option<String>,
    /// Per-call persona override; falls back to the settings prompt.
    pub persona_override: Option<String>,
    /// Base64-encoded image attachments. Disables caching.
    pub images: Vec<String>,
    /// Per-call model override; falls back to the settings model.
    pub model_override: Option<String>,
    /// Per-call temperature override.
    pub temperature_override: Option<f32>,
}

impl GenerateRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_long_term_memory(mut self, memory: impl Into<String>) -> Self {
        self.long_term_memory = Some(memory.into());
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona_override = Some(persona.into());
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature_override = Some(temperature);
        self
    }
}

/// The streaming inference gateway. Owns its HTTP client and response
/// cache; settings are read per call and may be replaced between calls.
pub struct Gateway {
    client: NodeClient,
    cache: ResponseCache,
    settings: GatewaySettings,
    retry: crate::transport::RetryConfig,
}

impl Gateway {
    pub fn new(settings: GatewaySettings) -> Result<Self> {
        Ok(Self {
            client: NodeClient::new()?,
            cache: ResponseCache::default(),
            settings,
            retry: crate::transport::RetryConfig::default(),
        })
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Replace the settings (configuration edits are external; the gateway
    /// just consumes the result).
    pub fn update_settings(&mut self, settings: GatewaySettings) {
        self.settings = settings;
    }

    pub fn client(&self) -> &NodeClient {
        &self.client
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Retry policy applied to the gateway's short non-streaming calls.
    pub fn retry(&self) -> &crate::transport::RetryConfig {
        &self.retry
    }

    /// Run one generation, streaming fragments into `on_fragment`.
    ///
    /// Returns `Some(stats)` for a completed generation (including cache
    /// hits, which carry synthetic stats) and `None` when cancelled or
    /// failed. Failures other than cancellation surface as a visible
    /// inline error fragment, never as a panic or a bubbled error.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
        cancel: &CancelToken,
        mut on_fragment: impl FragmentSink,
    ) -> Option<GenerationStats> {
        match self.run_generation(request, cancel, &mut on_fragment).await {
            Ok(stats) => stats,
            Err(GatewayError::Cancelled) => {
                info!("generation cancelled by caller");
                None
            }
            Err(err) => {
                error!("generation failed: {err}");
                let notice =
                    format!("\n\n**Error:** Connection to the inference engine lost. {err}");
                on_fragment(Some(&notice), None, false);
                None
            }
        }
    }

    async fn run_generation(
        &self,
        request: &GenerateRequest,
        cancel: &CancelToken,
        on_fragment: &mut impl FragmentSink,
    ) -> Result<Option<GenerationStats>> {
        let settings = &self.settings;
        let target = request
            .model_override
            .as_deref()
            .unwrap_or(&settings.model);
        let decision = resolve_endpoint(target, settings);
        let model = decision.model.clone();
        let temperature = request
            .temperature_override
            .unwrap_or(settings.temperature);

        // Image-bearing prompts are unique; never cached.
        let cacheable = settings.cache_enabled && request.images.is_empty();
        let key = cacheable.then(|| {
            cache_key(
                &model,
                &request.message,
                &KeyProjection {
                    history_len: request.history.len(),
                    num_ctx: settings.context_window,
                    temperature,
                    repeat_penalty: settings.repeat_penalty,
                },
            )
        });

        if let Some(key) = &key
            && let Some(cached) = self.cache.get(key)
        {
            info!("cache hit, serving locally");
            on_fragment(Some(&cached), None, false);
            return Ok(Some(GenerationStats::instant(estimate_tokens(&cached))));
        }

        let system_content = compose_system_content(
            request
                .persona_override
                .as_deref()
                .unwrap_or(&settings.system_prompt),
            request.long_term_memory.as_deref(),
        );

        let kept_history = budget_history(
            &request.history,
            &system_content,
            &request.message,
            settings.context_window,
        );

        let mut messages = Vec::with_capacity(kept_history.len() + 2);
        messages.push(ChatMessage::system(&system_content));
        messages.extend(kept_history);
        messages.push(ChatMessage {
            role: MessageRole::User,
            content: request.message.clone(),
            images: request.images.clone(),
        });

        let payload = ChatPayload {
            model: model.clone(),
            messages,
            stream: true,
            options: GenerationOptions {
                num_ctx: settings.context_window,
                temperature,
                repeat_penalty: settings.repeat_penalty,
            },
        };

        info!(
            "starting generation: model={model}, endpoint={}, history={}",
            decision.url,
            payload.messages.len() - 2,
        );

        // One-shot failover: a failing remote falls back to the local
        // endpoint exactly once, with a visible warning in the stream.
        let response = match self
            .client
            .open_chat_stream(&decision.url, decision.auth_header.as_deref(), &payload)
            .await
        {
            Ok(resp) => resp,
            Err(err) if decision.is_remote && !cancel.is_cancelled() => {
                error!("mesh node {} failed: {err}", decision.url);
                warn!("failing over to local endpoint {}", settings.endpoint);
                let notice = format!(
                    "\n\n> ⚠️ **System alert**: mesh node `{}` is unresponsive. \
                     Rerouting request to the local inference engine...\n\n",
                    decision.url,
                );
                on_fragment(Some(&notice), None, false);
                self.client
                    .open_chat_stream(&settings.endpoint, None, &payload)
                    .await?
            }
            Err(err) => return Err(err),
        };

        self.read_stream(response, cancel, key, on_fragment).await
    }

    /// Drive the NDJSON stream to completion, feeding content through the
    /// think-tag splitter and forwarding fragments as they are produced.
    async fn read_stream(
        &self,
        mut response: reqwest::Response,
        cancel: &CancelToken,
        cache_key: Option<String>,
        on_fragment: &mut impl FragmentSink,
    ) -> Result<Option<GenerationStats>> {
        let mut parser = ThinkTagParser::new();
        let mut buffer = String::new();
        let mut full_text = String::new();

        loop {
            if cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }
            let Some(chunk) = response.chunk().await? else {
                break;
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline_pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline_pos).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                // Best-effort: malformed lines are logged and skipped.
                let Some(parsed) = parse_stream_line(line) else {
                    continue;
                };

                if let Some(content) = parsed.content() {
                    full_text.push_str(content);
                    for fragment in parser.feed(content) {
                        forward(fragment, on_fragment);
                    }
                }

                if parsed.done {
                    if let Some(fragment) = parser.finish() {
                        forward(fragment, on_fragment);
                    }
                    if let Some(key) = cache_key
                        && !full_text.is_empty()
                    {
                        self.cache.put(key, full_text);
                    }
                    return Ok(Some(GenerationStats::from_terminal(&parsed)));
                }
            }
        }

        // Stream ended without a terminal message: no stats.
        if let Some(fragment) = parser.finish() {
            forward(fragment, on_fragment);
        }
        Ok(None)
    }
}

/// Compose the system message: persona wrapped in sentinel sections, plus
/// an optional long-term-memory block with a continuity instruction.
fn compose_system_content(persona: &str, long_term_memory: Option<&str>) -> String {
    let mut content = format!("<system_persona>\n{persona}\n</system_persona>");
    if let Some(memory) = long_term_memory
        && !memory.trim().is_empty()
    {
        content.push_str(&format!(
            "\n\n<long_term_memory>\n{memory}\n</long_term_memory>\n\n\
             <instruction>Use the memory above to maintain continuity. \
             Respond to the User's last message in character.</instruction>"
        ));
    }
    content
}

fn forward(fragment: StreamFragment, on_fragment: &mut impl FragmentSink) {
    match fragment {
        StreamFragment::Answer(text) => on_fragment(Some(&text), None, false),
        StreamFragment::Thought(text) => on_fragment(None, Some(&text), true),
    }
}
