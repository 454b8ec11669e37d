//! Streaming inference gateway for a mesh of Ollama-compatible nodes.
//!
//! `ollamesh` sits between a chat frontend and one or more local or remote
//! inference nodes. The core abstraction is the [`Gateway`] — a reusable
//! generation pipeline that routes each request to a node, budgets the
//! conversation history against the model's context window, streams the
//! NDJSON response, splits `<think>` reasoning from the visible answer, and
//! falls back to the local endpoint when a mesh node dies mid-handshake.
//!
//! Caching, retrying transport, parallel node discovery, and probabilistic
//! load balancing are all enabled through [`GatewaySettings`] with sensible
//! defaults.
//!
//! # Getting started
//!
//! ```ignore
//! use ollamesh::{CancelToken, Gateway, GatewaySettings, GenerateRequest};
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = GatewaySettings::new("http://localhost:11434", "llama3");
//!     let gateway = Gateway::new(settings).unwrap();
//!
//!     let cancel = CancelToken::new();
//!     let request = GenerateRequest::new("Why is the sky blue?");
//!     let stats = gateway
//!         .generate(&request, &cancel, |answer, thought, _thinking| {
//!             if let Some(text) = answer {
//!                 print!("{text}");
//!             }
//!             let _ = thought; // reasoning channel, render separately
//!         })
//!         .await;
//!
//!     if let Some(stats) = stats {
//!         eprintln!("\n{:.1} tok/s", stats.tokens_per_second);
//!     }
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Run a generation:** [`Gateway::generate`] with a [`GenerateRequest`]
//!   and a [`CancelToken`].
//! - **Configure nodes and balancing:** [`GatewaySettings`],
//!   [`NodeConfig`], and [`config::LoadBalancing`].
//! - **Find mesh peers:** [`discovery::scan_mesh`] and
//!   [`models::mesh_status`].
//! - **Provision and manage models:** [`client::NodeClient`]
//!   (`pull_model`, `list_models`, `unload_model`).
//! - **Assistive calls:** [`assist`] for chat titles, context compression,
//!   and agent plans.
//! - **Capture logs for a frontend:** [`logbuf::LogCaptureLayer`].

pub mod assist;
pub mod cache;
pub mod cancel;
pub mod client;
pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod generate;
pub mod logbuf;
pub mod models;
pub mod protocol;
pub mod router;
pub mod think;
pub mod tokens;
pub mod transport;

use serde::{Deserialize, Serialize};

pub use cancel::CancelToken;
pub use config::{GatewaySettings, NodeConfig};
pub use error::{GatewayError, Result};
pub use generate::{Gateway, GenerateRequest};
pub use protocol::GenerationStats;
pub use think::StreamFragment;

/// Who authored a chat message.
///
/// `System` covers both the model-visible system prompt and transient
/// gateway notices injected into the visible history; the budgeter strips
/// the latter before anything reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One chat turn as sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    /// Base64-encoded images attached to a user turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            images: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let msg = ChatMessage::assistant("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json.get("images").is_none());
    }

    #[test]
    fn images_round_trip_when_present() {
        let mut msg = ChatMessage::user("look");
        msg.images.push("aGVsbG8=".to_string());
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.images.len(), 1);
    }
}
