//! Parallel node discovery across well-known local and LAN addresses.
//!
//! Every candidate is probed concurrently with its own timeout, so the
//! total scan latency is bounded by the slowest single probe rather than
//! the sum of all of them. Unreachable candidates are silently dropped —
//! a failed probe is normal, not an error — and a candidate matching the
//! caller's own endpoint is skipped. Deduplication against nodes that are
//! already configured is the caller's responsibility.

use std::time::Duration;

use tokio::task::JoinSet;
use tracing::info;

use crate::client::{NodeClient, VERIFY_TIMEOUT};
use crate::config::NodeConfig;

/// Per-probe timeout during a mesh scan.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(2500);

/// Well-known candidate endpoints: localhost variants, the Docker host
/// bridge, common mDNS hostnames, and a few popular static LAN addresses.
pub fn default_candidates() -> Vec<NodeConfig> {
    [
        ("local-11434", "Localhost Std", "http://localhost:11434"),
        ("local-ip", "Local IP", "http://127.0.0.1:11434"),
        ("local-11435", "Local Alt 1", "http://localhost:11435"),
        ("host-docker", "Docker Host", "http://host.docker.internal:11434"),
        ("local-8080", "Local Proxy", "http://localhost:8080"),
        ("lan-mac", "Mac Studio (mDNS)", "http://mac-studio.local:11434"),
        ("lan-pi", "Raspberry Pi (mDNS)", "http://raspberrypi.local:11434"),
        ("lan-ubuntu", "Ubuntu (mDNS)", "http://ubuntu.local:11434"),
        ("lan-win", "Windows PC (mDNS)", "http://desktop.local:11434"),
        ("lan-generic", "Generic Server (mDNS)", "http://server.local:11434"),
        ("lan-ip-100", "LAN Node (.100)", "http://192.168.1.100:11434"),
        ("lan-ip-200", "LAN Node (.200)", "http://192.168.1.200:11434"),
        ("lan-ip-10", "LAN Node (10.0.0.2)", "http://10.0.0.2:11434"),
    ]
    .into_iter()
    .map(|(id, name, url)| NodeConfig::new(id, name, url))
    .collect()
}

/// Normalize an endpoint for self-comparison: strip the scheme and any
/// trailing slash, lower-case the rest (host:port).
pub fn normalize_endpoint(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    without_scheme.to_lowercase()
}

/// Scan the default candidate list for live mesh peers, skipping
/// `self_endpoint`.
pub async fn scan_mesh(client: &NodeClient, self_endpoint: &str) -> Vec<NodeConfig> {
    scan_candidates(client, default_candidates(), self_endpoint, PROBE_TIMEOUT).await
}

/// Probe `candidates` concurrently, returning only confirmed-live nodes.
///
/// No ordering guarantee. Each probe carries its own `timeout` so a hung
/// host cannot stall the others.
pub async fn scan_candidates(
    client: &NodeClient,
    candidates: Vec<NodeConfig>,
    self_endpoint: &str,
    timeout: Duration,
) -> Vec<NodeConfig> {
    let own = normalize_endpoint(self_endpoint);
    info!("initiating mesh scan across {} candidates", candidates.len());

    let mut probes: JoinSet<Option<NodeConfig>> = JoinSet::new();
    for candidate in candidates {
        if normalize_endpoint(&candidate.url) == own {
            continue;
        }
        let url = candidate.url.clone();
        let probe_client = client.clone_http();
        probes.spawn(async move {
            let request = probe_client.get(format!("{url}/api/version")).send();
            match tokio::time::timeout(timeout, request).await {
                Ok(Ok(resp)) if resp.status().is_success() => Some(candidate),
                _ => None,
            }
        });
    }

    let mut live = Vec::new();
    while let Some(joined) = probes.join_next().await {
        if let Ok(Some(node)) = joined {
            info!("discovered active node {} at {}", node.name, node.url);
            live.push(node);
        }
    }

    info!("mesh scan complete, found {} neighbors", live.len());
    live
}

/// Verify that a configured node answers its version endpoint, using its
/// credentials and a slightly longer timeout than the broad scan.
pub async fn verify_node(client: &NodeClient, node: &NodeConfig) -> bool {
    client
        .check_version(&node.url, node.auth_header().as_deref(), VERIFY_TIMEOUT)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_scheme_slash_and_case() {
        assert_eq!(
            normalize_endpoint("http://LocalHost:11434/"),
            "localhost:11434"
        );
        assert_eq!(
            normalize_endpoint("https://Mac-Studio.local:11434"),
            "mac-studio.local:11434"
        );
        assert_eq!(normalize_endpoint("192.168.1.100:11434"), "192.168.1.100:11434");
    }

    #[test]
    fn candidates_have_unique_ids() {
        let candidates = default_candidates();
        let mut ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), candidates.len());
    }

    #[test]
    fn self_endpoint_matches_its_candidate_form() {
        // The scan must recognize itself whether configured with or
        // without a trailing slash or scheme casing differences.
        let own = normalize_endpoint("http://localhost:11434/");
        let candidate = normalize_endpoint("http://localhost:11434");
        assert_eq!(own, candidate);
    }
}
