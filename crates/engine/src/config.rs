use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use formstack_storage::StorageConfig;

use crate::error::EngineError;

/// Engine settings, read from TOML. Every key is optional.
///
/// ```toml
/// [storage]
/// path = "forms.db"
/// busy_timeout_ms = 5000
///
/// [content]
/// dir = "uploads"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub content: ContentConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContentConfig {
    /// Root directory for uploaded files. `None` keeps uploads in memory.
    pub dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, EngineError> {
        toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let config = EngineConfig::from_toml_str("")?;
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.storage.busy_timeout_ms, 5_000);
        assert!(config.storage.path.is_none());
        assert!(config.content.dir.is_none());
        Ok(())
    }

    #[test]
    fn reads_all_sections() -> Result<(), Box<dyn std::error::Error>> {
        let config = EngineConfig::from_toml_str(
            r#"
            [storage]
            path = "forms.db"
            busy_timeout_ms = 250

            [content]
            dir = "uploads"
            "#,
        )?;
        assert_eq!(config.storage.path.as_deref(), Some(Path::new("forms.db")));
        assert_eq!(config.storage.busy_timeout_ms, 250);
        assert_eq!(config.content.dir.as_deref(), Some(Path::new("uploads")));
        Ok(())
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = EngineConfig::from_toml_str("[storage]\npth = \"x\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn load_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.toml");
        fs::write(&path, "[content]\ndir = \"files\"\n")?;
        let config = EngineConfig::load(&path)?;
        assert_eq!(config.content.dir.as_deref(), Some(Path::new("files")));
        assert!(EngineConfig::load(dir.path().join("missing.toml")).is_err());
        Ok(())
    }
}
