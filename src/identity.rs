// ABOUTME: Identity/persona — display name plus the system instruction given to every session.
// ABOUTME: Built from config, with an optional ~/.chatclaw/system.md override for the instruction.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Config, IdentityConfig};

/// Reads a file if it exists, returning None otherwise.
pub fn read_if_exists(path: &Path) -> Option<String> {
    if path.exists() {
        fs::read_to_string(path).ok()
    } else {
        None
    }
}

/// Static persona shared by all sessions in a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub system_role: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, system_role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_role: system_role.into(),
        }
    }

    /// Identity from config, honoring the user's system instruction override file.
    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::from_config_with_override(config, Config::system_override_path())
    }

    /// Like `from_config`, reading the override from an explicit path.
    pub fn from_config_with_override(config: &IdentityConfig, override_path: PathBuf) -> Self {
        let system_role = read_if_exists(&override_path)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| config.system_role.clone());
        Self::new(config.name.clone(), system_role)
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::from_config_with_override(&IdentityConfig::default(), PathBuf::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_come_from_config() {
        let identity = Identity::default();
        assert_eq!(identity.name, "Assistant");
        assert_eq!(identity.system_role, "You are a helpful assistant.");
    }

    #[test]
    fn override_file_replaces_system_role() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("system.md");
        fs::write(&path, "You are a pirate assistant. Arrr.\n").unwrap();

        let identity = Identity::from_config_with_override(&IdentityConfig::default(), path);
        assert_eq!(identity.system_role, "You are a pirate assistant. Arrr.");
        assert_eq!(identity.name, "Assistant");
    }

    #[test]
    fn blank_override_file_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("system.md");
        fs::write(&path, "   \n").unwrap();

        let identity = Identity::from_config_with_override(&IdentityConfig::default(), path);
        assert_eq!(identity.system_role, "You are a helpful assistant.");
    }

    #[test]
    fn missing_override_file_reads_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_if_exists(&tmp.path().join("absent.md")).is_none());
    }
}
