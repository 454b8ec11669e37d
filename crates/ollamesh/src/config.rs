//! Gateway configuration.
//!
//! [`GatewaySettings`] is the inbound configuration surface: local endpoint,
//! default model, sampling options, persona text, configured mesh nodes, and
//! the load-balancing / caching toggles. The host application owns the
//! values (settings forms, encrypted storage, etc.); the gateway only reads
//! them. Builder methods cover the common overrides.

use serde::Deserialize;

/// Default local inference endpoint.
pub const DEFAULT_LOCAL_ENDPOINT: &str = "http://localhost:11434";

/// Default context window in tokens.
pub const DEFAULT_CONTEXT_WINDOW: usize = 8192;

/// A configured mesh node: an inference server instance reachable at `url`.
///
/// `name` doubles as the explicit routing prefix — a model identifier of
/// the form `"<name>/<model>"` is routed to this node directly.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl NodeConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            api_key: None,
        }
    }

    /// Set the bearer credential used when talking to this node.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// The `Authorization` header value for this node, if it has credentials.
    pub fn auth_header(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| format!("Bearer {k}"))
    }
}

/// How generic (non-prefixed) requests are spread across the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancing {
    /// Always use the local endpoint.
    #[default]
    Disabled,
    /// Probabilistic offload: a 30% coin flip per request picks a uniformly
    /// random remote node.
    Random,
}

/// Settings consumed by the gateway. Read-only during a generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Local/default inference endpoint.
    pub endpoint: String,
    /// Default model name.
    pub model: String,
    /// Context window size in tokens.
    pub context_window: usize,
    /// Sampling temperature, 0.0 to 2.0.
    pub temperature: f32,
    /// Repetition penalty, >= 1.0.
    pub repeat_penalty: f32,
    /// Persona / system prompt text.
    pub system_prompt: String,
    /// Configured remote mesh nodes.
    pub nodes: Vec<NodeConfig>,
    /// Load-balancing mode for non-prefixed requests.
    pub load_balancing: LoadBalancing,
    /// Whether completed responses are cached.
    pub cache_enabled: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_LOCAL_ENDPOINT.to_string(),
            model: String::new(),
            context_window: DEFAULT_CONTEXT_WINDOW,
            temperature: 0.7,
            repeat_penalty: 1.1,
            system_prompt: String::new(),
            nodes: Vec::new(),
            load_balancing: LoadBalancing::Disabled,
            cache_enabled: true,
        }
    }
}

impl GatewaySettings {
    /// Create settings for the given endpoint and model, defaults elsewhere.
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window = tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_repeat_penalty(mut self, penalty: f32) -> Self {
        self.repeat_penalty = penalty;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_nodes(mut self, nodes: Vec<NodeConfig>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_load_balancing(mut self, mode: LoadBalancing) -> Self {
        self.load_balancing = mode;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let settings = GatewaySettings::default();
        assert_eq!(settings.endpoint, DEFAULT_LOCAL_ENDPOINT);
        assert_eq!(settings.load_balancing, LoadBalancing::Disabled);
        assert!(settings.cache_enabled);
        assert!(settings.nodes.is_empty());
    }

    #[test]
    fn builder_overrides() {
        let settings = GatewaySettings::new("http://10.0.0.2:11434", "llama3")
            .with_context_window(32_768)
            .with_temperature(0.2)
            .with_load_balancing(LoadBalancing::Random);
        assert_eq!(settings.model, "llama3");
        assert_eq!(settings.context_window, 32_768);
        assert_eq!(settings.load_balancing, LoadBalancing::Random);
    }

    #[test]
    fn node_auth_header() {
        let node = NodeConfig::new("n1", "studio", "http://mac-studio.local:11434")
            .with_api_key("sekrit");
        assert_eq!(node.auth_header().as_deref(), Some("Bearer sekrit"));
        let bare = NodeConfig::new("n2", "pi", "http://raspberrypi.local:11434");
        assert!(bare.auth_header().is_none());
    }

    #[test]
    fn deserializes_from_partial_config() {
        let settings: GatewaySettings = serde_json::from_str(
            r#"{
                "model": "qwen3:8b",
                "load_balancing": "random",
                "nodes": [{"id": "n1", "name": "studio", "url": "http://s:11434"}]
            }"#,
        )
        .unwrap();
        assert_eq!(settings.model, "qwen3:8b");
        assert_eq!(settings.load_balancing, LoadBalancing::Random);
        assert_eq!(settings.nodes.len(), 1);
        assert_eq!(settings.endpoint, DEFAULT_LOCAL_ENDPOINT);
    }
}
