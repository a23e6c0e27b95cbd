//! Kernel configuration.
//!
//! Loaded from TOML. Every section is optional:
//!
//! ```toml
//! device_id = "laptop"
//! display_name = "Ada"
//!
//! [storage]
//! path = "/var/lib/taskweave/nodes.db"   # omit for an in-memory log
//!
//! [validation]
//! max_payload_bytes = 16384
//! max_title_chars = 256
//!
//! [sync]
//! enabled = true
//! pull_interval_ms = 30000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskweave_dag::ValidationLimits;
use taskweave_types::DeviceId;

use crate::error::ConfigError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub device_id: DeviceId,
    pub display_name: Option<String>,
    pub storage: StorageConfig,
    pub validation: ValidationLimits,
    pub sync: SyncConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            device_id: DeviceId::from("local"),
            display_name: None,
            storage: StorageConfig::default(),
            validation: ValidationLimits::default(),
            sync: SyncConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file. `None` keeps nodes in memory.
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub pull_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pull_interval_ms: 30_000,
        }
    }
}

impl SyncConfig {
    pub fn pull_interval(&self) -> Duration {
        Duration::from_millis(self.pull_interval_ms)
    }
}

impl KernelConfig {
    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.device_id.as_str().is_empty() {
            return Err(ConfigError::Invalid("device_id must not be empty".into()));
        }
        if self.sync.enabled && self.sync.pull_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sync.pull_interval_ms must be positive when sync is enabled".into(),
            ));
        }
        if self.validation.max_payload_bytes == 0 {
            return Err(ConfigError::Invalid("validation.max_payload_bytes must be positive".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_is_default() {
        let config = KernelConfig::from_toml_str("").unwrap();
        assert_eq!(config, KernelConfig::default());
        assert_eq!(config.sync.pull_interval(), Duration::from_secs(30));
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = KernelConfig::from_toml_str(
            r#"
            device_id = "phone"
            display_name = "Ada"

            [storage]
            path = "/tmp/nodes.db"

            [validation]
            max_title_chars = 80

            [sync]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.device_id.as_str(), "phone");
        assert_eq!(config.display_name.as_deref(), Some("Ada"));
        assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/nodes.db")));
        assert_eq!(config.validation.max_title_chars, 80);
        assert_eq!(config.validation.max_notes_chars, 4096);
        assert!(!config.sync.enabled);
        assert_eq!(config.sync.pull_interval_ms, 30_000);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            KernelConfig::from_toml_str("device_id = \"\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            KernelConfig::from_toml_str("[sync]\npull_interval_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            KernelConfig::from_toml_str("device_id = 12"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "device_id = \"desk\"").unwrap();
        let config = KernelConfig::load(file.path()).unwrap();
        assert_eq!(config.device_id.as_str(), "desk");

        assert!(matches!(
            KernelConfig::load("/nonexistent/taskweave.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
