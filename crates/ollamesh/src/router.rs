//! Per-request endpoint resolution and probabilistic load balancing.
//!
//! Routing is stateless and re-evaluated on every call: no sticky sessions,
//! no health-aware weighting. The remote-to-local failover in the
//! orchestrator is the correctness backstop, so the router stays simple.

use rand::Rng;
use tracing::info;

use crate::config::{GatewaySettings, LoadBalancing, NodeConfig};

/// Probability that a generic request is offloaded to a random remote node
/// when probabilistic load balancing is enabled.
pub const OFFLOAD_PROBABILITY: f64 = 0.3;

/// Where one request goes. Computed fresh per request, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    /// Base URL of the serving node.
    pub url: String,
    /// `Authorization` header value, if the node has credentials.
    pub auth_header: Option<String>,
    /// Whether the target is a remote mesh node (enables failover).
    pub is_remote: bool,
    /// Model name with any node prefix stripped.
    pub model: String,
}

impl RoutingDecision {
    fn remote(node: &NodeConfig, model: &str) -> Self {
        Self {
            url: node.url.clone(),
            auth_header: node.auth_header(),
            is_remote: true,
            model: model.to_string(),
        }
    }

    fn local(settings: &GatewaySettings, model: &str) -> Self {
        Self {
            url: settings.endpoint.clone(),
            auth_header: None,
            is_remote: false,
            model: model.to_string(),
        }
    }
}

/// Decide which node serves `model`.
///
/// 1. A `"<node-name>/"` prefix routes explicitly to that node, with the
///    prefix stripped from the downstream model name.
/// 2. Otherwise, in [`LoadBalancing::Random`] mode with at least one remote
///    node, a 30% coin flip offloads to a uniformly random node.
/// 3. Otherwise the local endpoint, no credentials.
pub fn resolve_endpoint(model: &str, settings: &GatewaySettings) -> RoutingDecision {
    let mut rng = rand::rng();
    resolve_with_draw(model, settings, rng.random(), rng.random_range(0..usize::MAX))
}

/// Deterministic core of [`resolve_endpoint`]: `roll` is the uniform [0,1)
/// offload draw and `pick` selects the node (modulo the node count).
fn resolve_with_draw(
    model: &str,
    settings: &GatewaySettings,
    roll: f64,
    pick: usize,
) -> RoutingDecision {
    for node in &settings.nodes {
        let prefix = format!("{}/", node.name);
        if let Some(stripped) = model.strip_prefix(&prefix) {
            info!("routing to mesh node {} for {stripped}", node.name);
            return RoutingDecision::remote(node, stripped);
        }
    }

    if settings.load_balancing == LoadBalancing::Random
        && !settings.nodes.is_empty()
        && roll < OFFLOAD_PROBABILITY
    {
        let node = &settings.nodes[pick % settings.nodes.len()];
        info!("load balancing: offloading to {}", node.name);
        return RoutingDecision::remote(node, model);
    }

    RoutingDecision::local(settings, model)
}
