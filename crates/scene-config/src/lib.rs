//! YAML configuration loading for the scene engine
//!
//! The configuration file is plain YAML with two custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use scene_config::SceneConfig;
//!
//! let config = SceneConfig::load("/etc/scenes/scenes.yaml")?;
//! println!("authority: {}", config.engine.authority());
//! ```

mod error;
mod loader;
mod settings;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use settings::{EngineSettings, LoggerSettings, SceneConfig, StoreSettings};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
