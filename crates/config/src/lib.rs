//! Configuration loading, validation, and management for Roost.
//!
//! Loads configuration from `~/.roost/config.toml` with environment
//! variable overrides (`ROOST_*`). Validates all settings at load time so
//! misconfiguration fails at startup, not mid-conversation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
///
/// Maps directly to `~/.roost/config.toml`.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Model provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Approval gate settings
    #[serde(default)]
    pub approval: ApprovalConfig,

    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// External capability (MCP) server entries
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("agent", &self.agent)
            .field("approval", &self.approval)
            .field("scheduler", &self.scheduler)
            .field("storage", &self.storage)
            .field("mcp_servers", &self.mcp_servers)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Endpoint of the local model server
    #[serde(default = "default_host")]
    pub host: String,

    /// Default model
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per response (None = provider default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "http://127.0.0.1:11434".into()
}
fn default_model() -> String {
    "qwen3:8b".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum tool-call rounds per turn (safety limit)
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Per-tool-call timeout in seconds
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// System prompt for the agent
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_max_rounds() -> u32 {
    10
}
fn default_tool_timeout() -> u64 {
    30
}
fn default_system_prompt() -> String {
    concat!(
        "You are Roost, a helpful local assistant. ",
        "You have access to tools; use them when they help accomplish the task. ",
        "Be concise and accurate.",
    )
    .into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            tool_timeout_secs: default_tool_timeout(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// How long a pending approval waits before expiring
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,
}

fn default_deadline() -> u64 {
    300
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Heartbeat poll interval in seconds
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
}

fn default_heartbeat() -> u64 {
    5
}
fn default_true() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_secs: default_heartbeat(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path; `:memory:` for ephemeral sessions
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    "~/.roost/roost.db".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

/// One external capability server entry.
#[derive(Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique server name; discovered tools are registered as `<name>_<tool>`
    pub name: String,

    /// "stdio" or "http"
    #[serde(default = "default_transport")]
    pub transport: String,

    /// stdio: program to spawn
    #[serde(default)]
    pub command: Option<String>,

    /// stdio: program arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// stdio: extra environment variables (values may be secrets)
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// http: endpoint URL
    #[serde(default)]
    pub url: Option<String>,

    /// http: extra headers (values may be secrets)
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Whether every tool from this server requires approval
    #[serde(default)]
    pub sensitive: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_mcp_timeout")]
    pub request_timeout_secs: u64,

    /// Reconnect attempts before the connection is Closed
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: u32,
}

fn default_transport() -> String {
    "stdio".into()
}
fn default_mcp_timeout() -> u64 {
    20
}
fn default_max_reconnects() -> u32 {
    5
}

impl std::fmt::Debug for McpServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // env/header values may carry tokens; show keys only
        f.debug_struct("McpServerConfig")
            .field("name", &self.name)
            .field("transport", &self.transport)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("url", &self.url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("sensitive", &self.sensitive)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl AppConfig {
    /// The configuration directory (`~/.roost`).
    pub fn config_dir() -> PathBuf {
        std::env::var("ROOST_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".roost"))
                    .unwrap_or_else(|_| PathBuf::from(".roost"))
            })
    }

    /// Load from `~/.roost/config.toml`, falling back to defaults when the
    /// file does not exist, then apply env overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_dir().join("config.toml");
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            Self::from_toml(&raw)?
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string (used by `load` and tests).
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Environment variables override the file:
    /// `ROOST_MODEL`, `ROOST_PROVIDER_HOST`, `ROOST_DATABASE`.
    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("ROOST_MODEL") {
            self.provider.model = model;
        }
        if let Ok(host) = std::env::var("ROOST_PROVIDER_HOST") {
            self.provider.host = host;
        }
        if let Ok(db) = std::env::var("ROOST_DATABASE") {
            self.storage.database = db;
        }
    }

    /// Validate settings that would otherwise fail deep inside a turn.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_rounds == 0 {
            return Err(ConfigError::Invalid(
                "agent.max_rounds must be at least 1".into(),
            ));
        }
        if self.approval.deadline_secs == 0 {
            return Err(ConfigError::Invalid(
                "approval.deadline_secs must be at least 1".into(),
            ));
        }
        if self.scheduler.heartbeat_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.heartbeat_secs must be at least 1".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for server in &self.mcp_servers {
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate mcp server name '{}'",
                    server.name
                )));
            }
            match server.transport.as_str() {
                "stdio" => {
                    if server.command.as_deref().unwrap_or("").is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "mcp server '{}' uses stdio transport but has no command",
                            server.name
                        )));
                    }
                }
                "http" => {
                    if server.url.as_deref().unwrap_or("").is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "mcp server '{}' uses http transport but has no url",
                            server.name
                        )));
                    }
                }
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "mcp server '{}' has unknown transport '{other}'",
                        server.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolve the database path, expanding a leading `~`.
    pub fn database_path(&self) -> String {
        if let Some(rest) = self.storage.database.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return format!("{home}/{rest}");
            }
        }
        self.storage.database.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_rounds, 10);
        assert_eq!(config.approval.deadline_secs, 300);
    }

    #[test]
    fn parse_full_config() {
        let raw = r#"
            [provider]
            host = "http://localhost:11434"
            model = "llama3.2:3b"
            temperature = 0.2

            [agent]
            max_rounds = 6
            system_prompt = "You are a test agent."

            [approval]
            deadline_secs = 60

            [[mcp_servers]]
            name = "github"
            transport = "stdio"
            command = "npx"
            args = ["-y", "@modelcontextprotocol/server-github"]

            [[mcp_servers]]
            name = "search"
            transport = "http"
            url = "http://127.0.0.1:8931/rpc"
            sensitive = true
        "#;
        let config = AppConfig::from_toml(raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.provider.model, "llama3.2:3b");
        assert_eq!(config.agent.max_rounds, 6);
        assert_eq!(config.mcp_servers.len(), 2);
        assert!(config.mcp_servers[1].sensitive);
    }

    #[test]
    fn zero_max_rounds_rejected() {
        let raw = "[agent]\nmax_rounds = 0";
        let config = AppConfig::from_toml(raw).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_server_names_rejected() {
        let raw = r#"
            [[mcp_servers]]
            name = "dup"
            transport = "http"
            url = "http://a"

            [[mcp_servers]]
            name = "dup"
            transport = "http"
            url = "http://b"
        "#;
        let config = AppConfig::from_toml(raw).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dup"));
    }

    #[test]
    fn stdio_server_without_command_rejected() {
        let raw = r#"
            [[mcp_servers]]
            name = "broken"
            transport = "stdio"
        "#;
        let config = AppConfig::from_toml(raw).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_hides_secret_values() {
        let raw = r#"
            [[mcp_servers]]
            name = "gh"
            transport = "http"
            url = "http://x"
            [mcp_servers.headers]
            Authorization = "Bearer super-secret-token"
        "#;
        let config = AppConfig::from_toml(raw).unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("Authorization"));
        assert!(!debug.contains("super-secret-token"));
    }
}
