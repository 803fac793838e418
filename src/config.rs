// ABOUTME: Configuration loading for chatclaw.
// ABOUTME: Reads ~/.chatclaw/config.toml, then applies env and CLI overrides.

use std::path::PathBuf;

use serde::Deserialize;

use crate::backend::BackendKind;

/// Environment variable selecting the backend, overriding the config file.
pub const BACKEND_ENV_VAR: &str = "CHATCLAW_BACKEND";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub identity: IdentityConfig,
    pub storage: StorageConfig,
}

/// Inference backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: String,
    pub model: String,
    /// Thinking budget handed to each new conversation; 0 disables it.
    pub budget_hint: u32,
    pub timeout_seconds: u64,
    pub gemini: GeminiConfig,
    pub ollama: OllamaConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            budget_hint: 1024,
            timeout_seconds: 120,
            gemini: GeminiConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

/// Gemini-specific configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Empty means the public endpoint.
    pub base_url: String,
}

/// Ollama-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
        }
    }
}

/// Persona injected into every session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub name: String,
    pub system_role: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "Assistant".to_string(),
            system_role: "You are a helpful assistant.".to_string(),
        }
    }
}

/// Where sessions and the transaction log live.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Empty means the platform data directory.
    pub data_dir: String,
}

impl Config {
    /// Load config from ~/.chatclaw/config.toml, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Directory holding user configuration.
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chatclaw")
    }

    /// Path to the config file.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Path to the optional system role override.
    pub fn system_override_path() -> PathBuf {
        Self::config_dir().join("system.md")
    }

    /// Root for session files and the transaction log.
    pub fn data_dir(&self) -> PathBuf {
        if !self.storage.data_dir.is_empty() {
            return PathBuf::from(&self.storage.data_dir);
        }
        dirs::data_local_dir()
            .unwrap_or_else(Self::config_dir)
            .join("chatclaw")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir().join("sessions")
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir().join("wal.json")
    }

    /// Apply an override from the process environment, if set.
    pub fn apply_env(&mut self) {
        self.apply_backend_override(std::env::var(BACKEND_ENV_VAR).ok());
    }

    fn apply_backend_override(&mut self, value: Option<String>) {
        if let Some(kind) = value.filter(|v| !v.trim().is_empty()) {
            self.backend.kind = kind.trim().to_string();
        }
    }

    /// Resolve the configured backend kind, rejecting unknown names.
    pub fn backend_kind(&self) -> anyhow::Result<BackendKind> {
        self.backend.kind.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.backend.kind, "gemini");
        assert_eq!(config.backend.budget_hint, 1024);
        assert_eq!(config.backend.ollama.base_url, "http://localhost:11434");
        assert_eq!(config.identity.name, "Assistant");
    }

    #[test]
    fn parse_config_toml() {
        let toml_str = r#"
[backend]
kind = "ollama"
model = "llama3"
budget_hint = 0

[backend.ollama]
base_url = "http://gpu-box:11434"

[identity]
name = "Ada"
system_role = "You are Ada."

[storage]
data_dir = "/var/lib/chatclaw"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend.kind, "ollama");
        assert_eq!(config.backend.model, "llama3");
        assert_eq!(config.backend.budget_hint, 0);
        assert_eq!(config.backend.ollama.base_url, "http://gpu-box:11434");
        assert_eq!(config.identity.name, "Ada");
        assert_eq!(config.sessions_dir(), PathBuf::from("/var/lib/chatclaw/sessions"));
        assert_eq!(config.wal_path(), PathBuf::from("/var/lib/chatclaw/wal.json"));
    }

    #[test]
    fn parse_partial_config_uses_defaults() {
        let toml_str = r#"
[backend]
kind = "stub"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend.kind, "stub");
        assert_eq!(config.backend.model, "gemini-2.5-flash");
        assert_eq!(config.backend.timeout_seconds, 120);
        assert_eq!(config.identity.system_role, "You are a helpful assistant.");
    }

    #[test]
    fn env_override_replaces_kind() {
        let mut config = Config::default();
        config.apply_backend_override(Some(" stub ".to_string()));
        assert_eq!(config.backend_kind().unwrap(), BackendKind::Stub);
    }

    #[test]
    fn blank_env_override_is_ignored() {
        let mut config = Config::default();
        config.apply_backend_override(Some("  ".to_string()));
        assert_eq!(config.backend.kind, "gemini");
    }

    #[test]
    fn unknown_backend_kind_errors() {
        let mut config = Config::default();
        config.backend.kind = "fakeprovider".to_string();
        let err = config.backend_kind().unwrap_err();
        assert!(err.to_string().contains("fakeprovider"));
    }
}
