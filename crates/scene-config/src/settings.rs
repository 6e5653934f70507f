//! Scene engine configuration
//!
//! Parses `scenes.yaml`. Every section and field has a default, so an empty
//! file yields a working configuration.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::YamlLoader;

/// Engine settings from the `engine:` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Instance namespace, e.g. `scenes.0`
    pub namespace: String,

    /// Id prefix of scene definitions in the object store
    pub scene_prefix: String,

    /// Quiet period after the last member update before re-aggregating
    pub debounce_ms: u64,

    /// Longest a pending check is pushed back by further updates
    pub debounce_max_wait_ms: u64,

    /// Above this many distinct points, subscribe to all points at once
    pub subscribe_all_threshold: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            namespace: "scenes.0".to_string(),
            scene_prefix: "scene.".to_string(),
            debounce_ms: 200,
            debounce_max_wait_ms: 1000,
            subscribe_all_threshold: 20,
        }
    }
}

impl EngineSettings {
    /// The authority tag scene definitions must carry to belong to this engine
    pub fn authority(&self) -> String {
        format!("system.adapter.{}", self.namespace)
    }

    /// Debounce window as a duration
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Subscription pattern covering every scene point
    pub fn scene_pattern(&self) -> String {
        format!("{}*", self.scene_prefix)
    }
}

/// Store settings from the `store:` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// JSON or YAML file with initial objects and states
    pub seed_file: Option<PathBuf>,
}

/// Logger settings from the `logger:` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerSettings {
    /// Default level filter (`RUST_LOG` takes precedence)
    pub level: String,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub engine: EngineSettings,
    pub store: StoreSettings,
    pub logger: LoggerSettings,
}

impl SceneConfig {
    /// Load configuration from a file
    ///
    /// Relative paths inside the file (includes, seed file) resolve against
    /// the file's directory.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let config_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file = path.file_name().map(Path::new).unwrap_or(path);
        let yaml = YamlLoader::new(config_dir.clone()).load_file(file)?;

        let mut config = Self::from_yaml(&yaml)?;
        if let Some(seed) = &config.store.seed_file {
            if seed.is_relative() {
                config.store.seed_file = Some(config_dir.join(seed));
            }
        }
        Ok(config)
    }

    /// Parse configuration from a YAML value
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        if yaml.is_null() {
            return Ok(Self::default());
        }
        if !yaml.is_mapping() {
            return Err(ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: "configuration must be a mapping".to_string(),
            });
        }

        let config: SceneConfig =
            serde_yaml::from_value(yaml.clone()).map_err(|e| ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.engine.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "engine.namespace".to_string(),
                reason: "namespace cannot be empty".to_string(),
            });
        }
        if self.engine.scene_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "engine.scene_prefix".to_string(),
                reason: "scene prefix cannot be empty".to_string(),
            });
        }
        if self.engine.debounce_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "engine.debounce_ms".to_string(),
                reason: "debounce window must be positive".to_string(),
            });
        }
        if self.engine.debounce_max_wait_ms < self.engine.debounce_ms {
            return Err(ConfigError::InvalidValue {
                key: "engine.debounce_max_wait_ms".to_string(),
                reason: format!(
                    "must be at least debounce_ms ({})",
                    self.engine.debounce_ms
                ),
            });
        }
        Ok(())
    }
}
