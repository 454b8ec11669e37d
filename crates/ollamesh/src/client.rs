//! Async HTTP client for Ollama-compatible inference nodes.
//!
//! [`NodeClient`] owns the `reqwest` client and speaks the endpoints in
//! [`protocol`](crate::protocol): the streaming chat call (returned as a
//! raw response for the orchestrator to drive), the model listing, the
//! streaming pull/provision endpoint, one-shot completions, unload, and the
//! version health probe. Short calls go through the retrying transport;
//! the two streaming calls do not.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::error::{GatewayError, Result};
use crate::protocol::{
    ChatPayload, ModelEntry, ModelList, OneShotOptions, OneShotPayload, OneShotResponse,
    PullProgress,
};
use crate::transport::{RetryConfig, send_with_retry};

/// How long a version probe waits when verifying a configured node.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(3);

/// Minimum interval between pull progress log lines.
const PULL_LOG_INTERVAL: Duration = Duration::from_secs(2);

/// HTTP client for one or more inference nodes. Cheap to clone would be
/// unnecessary — the gateway owns exactly one.
pub struct NodeClient {
    http: reqwest::Client,
}

impl NodeClient {
    /// Build a client with a connect timeout but no total-request timeout:
    /// a streaming generation legitimately runs for minutes.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("ollamesh/0.4")
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Clone of the underlying `reqwest` client (a cheap handle) for tasks
    /// that outlive a borrow of `self`, like discovery probes.
    pub(crate) fn clone_http(&self) -> reqwest::Client {
        self.http.clone()
    }

    /// Wrap an existing HTTP handle. Used by spawned tasks that need a
    /// `NodeClient` without borrowing the gateway's.
    pub(crate) fn from_http(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Open the streaming chat request against `base`.
    ///
    /// Returns the live response for the caller to read chunk by chunk.
    /// Status classification happens here so the orchestrator sees a typed
    /// error it can base its failover decision on.
    pub async fn open_chat_stream(
        &self,
        base: &str,
        auth_header: Option<&str>,
        payload: &ChatPayload,
    ) -> Result<reqwest::Response> {
        debug!(
            "opening chat stream: model={}, messages={}, endpoint={base}",
            payload.model,
            payload.messages.len(),
        );
        let mut request = self.http.post(format!("{base}/api/chat")).json(payload);
        if let Some(header) = auth_header {
            request = request.header("Authorization", header);
        }
        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let origin = resp.url().to_string();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), &origin, body));
        }
        Ok(resp)
    }

    /// One-shot non-streaming completion via `/api/generate`.
    pub async fn one_shot(
        &self,
        base: &str,
        model: &str,
        prompt: &str,
        options: OneShotOptions,
        json_format: bool,
        retry: &RetryConfig,
    ) -> Result<String> {
        let payload = OneShotPayload {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            format: json_format.then(|| "json".to_string()),
            options,
        };
        let request = self.http.post(format!("{base}/api/generate")).json(&payload);
        let resp = send_with_retry(request, retry).await?;
        let parsed: OneShotResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Protocol(format!("bad generate response: {e}")))?;
        Ok(parsed.response)
    }

    /// List the models installed on `base`.
    pub async fn list_models(
        &self,
        base: &str,
        auth_header: Option<&str>,
        retry: &RetryConfig,
    ) -> Result<Vec<ModelEntry>> {
        let mut request = self.http.get(format!("{base}/api/tags"));
        if let Some(header) = auth_header {
            request = request.header("Authorization", header);
        }
        let resp = send_with_retry(request, retry).await?;
        let listing: ModelList = resp
            .json()
            .await
            .map_err(|e| GatewayError::Protocol(format!("bad model listing: {e}")))?;
        Ok(listing.models)
    }

    /// Pull (provision) `model` onto `base`, streaming progress.
    ///
    /// Progress lines are logged at most once per two seconds to avoid
    /// spamming the log sink during large downloads. Partial JSON lines
    /// are ignored.
    pub async fn pull_model(&self, base: &str, model: &str) -> Result<()> {
        info!("provisioning model {model} on {base}");
        let body = serde_json::json!({ "name": model, "stream": true });
        let resp = self
            .http
            .post(format!("{base}/api/pull"))
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let origin = resp.url().to_string();
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), &origin, text));
        }

        let mut resp = resp;
        let mut buffer = String::new();
        let mut last_log: Option<Instant> = None;

        while let Some(chunk) = resp.chunk().await? {
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(newline_pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline_pos).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Ok(progress) = serde_json::from_str::<PullProgress>(line) else {
                    continue;
                };
                if let Some(err) = progress.error {
                    return Err(GatewayError::Protocol(err));
                }
                if let Some(status) = &progress.status
                    && last_log.is_none_or(|t| t.elapsed() >= PULL_LOG_INTERVAL)
                {
                    match progress.percent() {
                        Some(pct) => info!("[{model}] {status} ({pct}%)"),
                        None => info!("[{model}] {status}"),
                    }
                    last_log = Some(Instant::now());
                }
            }
        }

        info!("successfully pulled {model}");
        Ok(())
    }

    /// Ask `base` to unload `model` from memory. Best-effort: failures are
    /// logged and reported, never escalated.
    pub async fn unload_model(&self, base: &str, model: &str) -> Result<()> {
        info!("requesting unload of model {model}");
        let body = serde_json::json!({ "model": model, "keep_alive": 0 });
        match self
            .http
            .post(format!("{base}/api/generate"))
            .json(&body)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("failed to unload {model}: {e}");
                Err(GatewayError::Network(e.to_string()))
            }
        }
    }

    /// Probe `{url}/api/version` within `timeout`. `true` means reachable
    /// and healthy; everything else (timeout, refusal, non-2xx) is `false`.
    pub async fn check_version(
        &self,
        url: &str,
        auth_header: Option<&str>,
        timeout: Duration,
    ) -> bool {
        let mut request = self.http.get(format!("{url}/api/version"));
        if let Some(header) = auth_header {
            request = request.header("Authorization", header);
        }
        match tokio::time::timeout(timeout, request.send()).await {
            Ok(Ok(resp)) => resp.status().is_success(),
            Ok(Err(e)) => {
                warn!("version probe of {url} failed: {e}");
                false
            }
            Err(_) => false,
        }
    }
}
