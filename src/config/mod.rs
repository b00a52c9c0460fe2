//! Configuration (layered: defaults < TOML file < environment).

use std::path::Path;
use std::time::Duration;

use bon::Builder;
use serde::Deserialize;

use crate::error::{ChatRelayError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
pub const DEFAULT_MAX_HISTORY: usize = 40;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the assistant on a cybersecurity consultant's \
portfolio site. Answer questions about security assessments, penetration testing, incident \
response and the consultant's services clearly and briefly. Do not give step-by-step \
instructions for attacking systems the visitor does not own. When a question needs a \
scoped engagement, suggest using the contact form.";

/// Relay-side configuration. Holds the only copy of the upstream credential.
#[derive(Clone)]
pub struct RelayConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    /// Bearer token callers must present; `None` disables the check.
    pub access_token: Option<String>,
    /// Trailing messages kept from each incoming request.
    pub max_history: usize,
    pub bind: String,
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| ".."))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("access_token", &self.access_token.as_ref().map(|_| ".."))
            .field("max_history", &self.max_history)
            .field("bind", &self.bind)
            .finish()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            access_token: None,
            max_history: DEFAULT_MAX_HISTORY,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    gateway: GatewaySection,
    #[serde(default)]
    relay: RelaySection,
    #[serde(default)]
    server: ServerSection,
}

#[derive(Debug, Deserialize, Default)]
struct GatewaySection {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RelaySection {
    system_prompt: Option<String>,
    access_token: Option<String>,
    max_history: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerSection {
    bind: Option<String>,
}

impl RelayConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();
        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)?;
            config.apply_toml(&raw)?;
        }
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Defaults plus environment only.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Overlay values from a TOML document.
    pub fn apply_toml(&mut self, raw: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(raw)
            .map_err(|e| ChatRelayError::Configuration(format!("invalid config file: {e}")))?;

        if let Some(key) = file.gateway.api_key {
            self.api_key = Some(key);
        }
        if let Some(url) = file.gateway.base_url {
            self.base_url = url;
        }
        if let Some(model) = file.gateway.model {
            self.model = model;
        }
        if let Some(prompt) = file.relay.system_prompt {
            self.system_prompt = prompt;
        }
        if let Some(token) = file.relay.access_token {
            self.access_token = Some(token);
        }
        if let Some(max) = file.relay.max_history {
            self.max_history = max;
        }
        if let Some(bind) = file.server.bind {
            self.bind = bind;
        }
        Ok(())
    }

    /// Overlay values from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("AI_GATEWAY_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(url) = non_empty("AI_GATEWAY_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = non_empty("AI_GATEWAY_MODEL") {
            self.model = model;
        }
        if let Some(prompt) = non_empty("CHATRELAY_SYSTEM_PROMPT") {
            self.system_prompt = prompt;
        }
        if let Some(token) = non_empty("CHATRELAY_ACCESS_TOKEN") {
            self.access_token = Some(token);
        }
        if let Some(bind) = non_empty("CHATRELAY_BIND") {
            self.bind = bind;
        }
        if let Some(max) = non_empty("CHATRELAY_MAX_HISTORY") {
            match max.parse() {
                Ok(n) => self.max_history = n,
                Err(_) => tracing::warn!(value = %max, "ignoring invalid CHATRELAY_MAX_HISTORY"),
            }
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// The configured upstream credential, or a configuration error.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ChatRelayError::Configuration("AI_GATEWAY_API_KEY is not configured".into()))
    }
}

/// Conversation size bounds for a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    /// Trailing messages sent upstream per turn.
    pub window: usize,
    /// Hard cap on retained messages.
    pub max_retained: usize,
    /// Messages kept when the cap would be exceeded.
    pub retain_after_prune: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            window: 20,
            max_retained: 50,
            retain_after_prune: 20,
        }
    }
}

impl HistoryLimits {
    /// A prune adds a notice and a turn adds up to three messages (user,
    /// assistant placeholder, error notice), so `retain_after_prune + 4` must
    /// fit under the cap.
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(ChatRelayError::InvalidArgument("window must be at least 1".into()));
        }
        if self.retain_after_prune + 4 > self.max_retained {
            return Err(ChatRelayError::InvalidArgument(format!(
                "retain_after_prune ({}) + 4 exceeds max_retained ({})",
                self.retain_after_prune, self.max_retained
            )));
        }
        Ok(())
    }
}

/// What `send_turn` does while another turn is still streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InFlightPolicy {
    /// Refuse the new turn.
    #[default]
    Reject,
    /// Cancel the running turn, wait for it to settle, then start.
    Preempt,
}

/// Client-side session configuration.
#[derive(Debug, Clone, Builder)]
pub struct ChatConfig {
    #[builder(default)]
    pub limits: HistoryLimits,
    #[builder(default)]
    pub in_flight: InFlightPolicy,
    /// Abort the stream if no chunk arrives within this long.
    #[builder(default = Duration::from_secs(60))]
    pub idle_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
