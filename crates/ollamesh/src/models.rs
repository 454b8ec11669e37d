//! Model capability tagging and mesh inventory.
//!
//! Capabilities are name-substring heuristics, not ground truth: they exist
//! so a frontend can badge models and pre-filter pickers, and a wrong tag
//! costs nothing. The mesh inventory combines the local model listing with
//! concurrent health checks of every configured remote node; an unreachable
//! node becomes an offline record, never an error.

use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::warn;

use crate::client::NodeClient;
use crate::config::{GatewaySettings, NodeConfig};
use crate::discovery::verify_node;
use crate::protocol::ModelEntry;
use crate::transport::RetryConfig;

/// Timeout for the detailed `/api/tags` inspection of a remote node.
const INSPECT_TIMEOUT: Duration = Duration::from_secs(4);

/// What a model is probably good at, guessed from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCapability {
    General,
    Coder,
    Vision,
    Math,
    Embedding,
}

/// Tag `name` with capabilities. Every model is at least [`General`];
/// further tags accumulate, they never replace each other.
///
/// [`General`]: ModelCapability::General
pub fn detect_capabilities(name: &str) -> Vec<ModelCapability> {
    let lower = name.to_lowercase();
    let mut caps = vec![ModelCapability::General];

    let any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    if any(&["llava", "vision", "moondream", "bakllava"]) {
        caps.push(ModelCapability::Vision);
    }
    if any(&["code", "deepseek", "starcoder", "sql", "qwen-coder"]) {
        caps.push(ModelCapability::Coder);
    }
    if any(&["math", "wizard-math", "phi", "reason", "deepseek-r1"]) {
        caps.push(ModelCapability::Math);
    }
    if any(&["embed", "nomic", "bert"]) {
        caps.push(ModelCapability::Embedding);
    }
    caps
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    Offline,
}

/// One row of the mesh inventory: either a locally installed model or a
/// configured remote node.
#[derive(Debug, Clone, Serialize)]
pub struct MeshNode {
    pub id: String,
    pub name: String,
    /// Human-readable size ("4.7 GB" for local models, "3 models" for a
    /// remote node's inventory, "unknown" when unavailable).
    pub size: String,
    pub family: String,
    pub status: NodeStatus,
    pub is_remote: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub capabilities: Vec<ModelCapability>,
}

/// The full inventory plus whether the local endpoint answered at all.
#[derive(Debug, Clone, Serialize)]
pub struct MeshStatus {
    pub nodes: Vec<MeshNode>,
    pub connected: bool,
}

fn human_size(bytes: Option<u64>) -> String {
    match bytes {
        Some(b) => format!("{:.1} GB", b as f64 / (1024.0 * 1024.0 * 1024.0)),
        None => "unknown".to_string(),
    }
}

fn local_node(entry: &ModelEntry, index: usize) -> MeshNode {
    let id = entry
        .digest
        .as_deref()
        .map(|d| d.chars().take(12).collect())
        .unwrap_or_else(|| format!("local-{index}"));
    let family = entry
        .details
        .as_ref()
        .and_then(|d| d.family.clone())
        .unwrap_or_else(|| "unknown".to_string());
    MeshNode {
        id,
        name: entry.name.clone(),
        size: human_size(entry.size),
        family,
        status: NodeStatus::Online,
        is_remote: false,
        endpoint: None,
        capabilities: detect_capabilities(&entry.name),
    }
}

/// Inspect one remote node: verify it, then (if alive) read its model
/// listing to derive its aggregate capabilities and inventory size.
async fn inspect_remote(client: &NodeClient, node: NodeConfig, retry: RetryConfig) -> MeshNode {
    let online = verify_node(client, &node).await;
    let mut capabilities = vec![ModelCapability::General];
    let mut size = "unknown".to_string();
    let mut family = "remote mesh".to_string();

    if online {
        let listing = tokio::time::timeout(
            INSPECT_TIMEOUT,
            client.list_models(&node.url, node.auth_header().as_deref(), &retry),
        )
        .await;
        match listing {
            Ok(Ok(models)) => {
                let joined = models
                    .iter()
                    .map(|m| m.name.to_lowercase())
                    .collect::<Vec<_>>()
                    .join(" ");
                for cap in detect_capabilities(&joined) {
                    if !capabilities.contains(&cap) {
                        capabilities.push(cap);
                    }
                }
                size = format!("{} models", models.len());
            }
            _ => warn!("detailed scan failed for {}", node.name),
        }
    } else {
        family = "unreachable".to_string();
    }

    MeshNode {
        id: node.id.clone(),
        name: node.name.clone(),
        size,
        family,
        status: if online {
            NodeStatus::Online
        } else {
            NodeStatus::Offline
        },
        is_remote: true,
        endpoint: Some(node.url),
        capabilities,
    }
}

/// Build the mesh inventory: local models first, then every configured
/// remote node checked concurrently. A dead local endpoint yields an empty
/// inventory with `connected: false` rather than an error.
pub async fn mesh_status(
    client: &NodeClient,
    settings: &GatewaySettings,
    retry: &RetryConfig,
) -> MeshStatus {
    let local = match client.list_models(&settings.endpoint, None, retry).await {
        Ok(models) => models,
        Err(err) => {
            warn!("local inventory unavailable: {err}");
            return MeshStatus {
                nodes: Vec::new(),
                connected: false,
            };
        }
    };

    let mut nodes: Vec<MeshNode> = local
        .iter()
        .enumerate()
        .map(|(i, entry)| local_node(entry, i))
        .collect();

    let mut checks: JoinSet<MeshNode> = JoinSet::new();
    for node in settings.nodes.clone() {
        // NodeClient is not Clone; each task gets the raw HTTP handle
        // wrapped in a fresh facade.
        let client = NodeClient::from_http(client.clone_http());
        let retry = retry.clone();
        checks.spawn(async move { inspect_remote(&client, node, retry).await });
    }
    while let Some(joined) = checks.join_next().await {
        if let Ok(node) = joined {
            nodes.push(node);
        }
    }

    MeshStatus {
        nodes,
        connected: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ModelDetails;

    #[test]
    fn every_model_is_at_least_general() {
        assert_eq!(detect_capabilities("llama3:8b"), vec![ModelCapability::General]);
    }

    #[test]
    fn coder_and_math_tags_accumulate() {
        let caps = detect_capabilities("deepseek-r1:14b");
        assert!(caps.contains(&ModelCapability::Coder));
        assert!(caps.contains(&ModelCapability::Math));
        assert_eq!(caps[0], ModelCapability::General);
    }

    #[test]
    fn vision_and_embedding_detection() {
        assert!(detect_capabilities("llava:13b").contains(&ModelCapability::Vision));
        assert!(
            detect_capabilities("nomic-embed-text").contains(&ModelCapability::Embedding)
        );
    }

    #[test]
    fn local_node_uses_digest_prefix_as_id() {
        let entry = ModelEntry {
            name: "llama3".into(),
            size: Some(4_700_000_000),
            digest: Some("abcdef0123456789deadbeef".into()),
            details: Some(ModelDetails {
                family: Some("llama".into()),
                ..Default::default()
            }),
        };
        let node = local_node(&entry, 0);
        assert_eq!(node.id, "abcdef012345");
        assert_eq!(node.family, "llama");
        assert_eq!(node.status, NodeStatus::Online);
        assert!(!node.is_remote);
        assert!(node.size.ends_with("GB"));
    }

    #[test]
    fn local_node_without_digest_falls_back_to_index() {
        let entry = ModelEntry {
            name: "tiny".into(),
            size: None,
            digest: None,
            details: None,
        };
        let node = local_node(&entry, 3);
        assert_eq!(node.id, "local-3");
        assert_eq!(node.size, "unknown");
    }
}
