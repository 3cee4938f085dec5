use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{MessengerError, Result};

/// Prefix for environment overrides, e.g. `HAVEN__STORAGE__BACKEND=memory`.
pub const ENV_PREFIX: &str = "HAVEN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local only; the identity is lost on exit.
    Memory,
    /// A single owner-only file on disk.
    File,
    /// The operating system credential store.
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// File backend location. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
    /// Service name the keyring backend files entries under.
    pub keyring_service: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: None,
            keyring_service: "haven-e2ee".to_string(),
        }
    }
}

impl StorageConfig {
    /// Effective path for the file backend.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("haven")
                .join("identity.bin")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file layered under
    /// `HAVEN__...` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| MessengerError::Config(config::ConfigError::Message(e.to_string())))
    }
}
