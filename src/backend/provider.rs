// ABOUTME: Backend factory — creates the right provider based on the configured kind.
// ABOUTME: Supports gemini (remote API), ollama (local server), and stub (offline).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::Backend;
use crate::backend::gemini::GeminiBackend;
use crate::backend::ollama::OllamaBackend;
use crate::backend::stub::StubBackend;
use crate::config::BackendConfig;

/// Which provider implementation to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Gemini,
    Ollama,
    Stub,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "ollama" | "local" => Ok(Self::Ollama),
            "stub" => Ok(Self::Stub),
            other => anyhow::bail!(
                "Unknown backend: '{}'. Expected: gemini, ollama, stub",
                other
            ),
        }
    }
}

/// Create a backend for `kind` from its configuration section.
pub fn create_backend(kind: BackendKind, config: &BackendConfig) -> anyhow::Result<Arc<dyn Backend>> {
    let timeout = Duration::from_secs(config.timeout_seconds.max(1));
    match kind {
        BackendKind::Gemini => {
            let backend =
                GeminiBackend::new(None, &config.gemini.base_url, &config.model, timeout)?;
            Ok(Arc::new(backend))
        }
        BackendKind::Ollama => {
            let backend = OllamaBackend::new(&config.ollama.base_url, &config.model, timeout)?;
            Ok(Arc::new(backend))
        }
        BackendKind::Stub => Ok(Arc::new(StubBackend::new(&config.model))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds_case_insensitively() {
        assert_eq!("gemini".parse::<BackendKind>().unwrap(), BackendKind::Gemini);
        assert_eq!("Ollama".parse::<BackendKind>().unwrap(), BackendKind::Ollama);
        assert_eq!("local".parse::<BackendKind>().unwrap(), BackendKind::Ollama);
        assert_eq!("STUB".parse::<BackendKind>().unwrap(), BackendKind::Stub);
    }

    #[test]
    fn unknown_kind_errors() {
        let err = "fakeprovider".parse::<BackendKind>().unwrap_err();
        assert!(err.to_string().contains("fakeprovider"));
    }

    #[test]
    fn stub_backend_uses_configured_model() {
        let config = BackendConfig {
            model: "offline-1".to_string(),
            ..Default::default()
        };
        let backend = create_backend(BackendKind::Stub, &config).unwrap();
        assert_eq!(backend.model_name(), "offline-1");
        assert!(backend.is_available());
    }
}
