//! YAML loading with `!include` and `!env_var`
//!
//! Tags are expanded depth-first while the document is read. Unknown tags
//! are dropped and their inner value kept.

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

const TAG_INCLUDE: &str = "!include";
const TAG_ENV_VAR: &str = "!env_var";

/// Reads YAML files relative to a configuration directory
pub struct YamlLoader {
    config_dir: PathBuf,
    /// Files currently being read, outermost first
    chain: Vec<PathBuf>,
}

impl YamlLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            chain: Vec::new(),
        }
    }

    /// Read `path` (relative to the configuration directory) and expand
    /// its tags
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.config_dir.join(path.as_ref());
        if self.chain.contains(&path) {
            let chain = self
                .chain
                .iter()
                .chain(std::iter::once(&path))
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ConfigError::IncludeCycle { chain });
        }

        debug!(path = %path.display(), "Reading configuration file");
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
            path: path.clone(),
            source,
        })?;

        self.chain.push(path.clone());
        let loaded = self.load_string(&content, &path);
        self.chain.pop();
        loaded
    }

    /// Parse `content` as if read from `source` and expand its tags
    pub fn load_string(&mut self, content: &str, source: &Path) -> ConfigResult<Value> {
        let document: Value =
            serde_yaml::from_str(content).map_err(|source_err| ConfigError::ParseYaml {
                path: source.to_path_buf(),
                source: source_err,
            })?;
        self.expand(document, source)
    }

    fn expand(&mut self, value: Value, source: &Path) -> ConfigResult<Value> {
        Ok(match value {
            Value::Tagged(tagged) => self.expand_tag(*tagged, source)?,
            Value::Mapping(mapping) => {
                let mut expanded = Mapping::with_capacity(mapping.len());
                for (key, item) in mapping {
                    expanded.insert(key, self.expand(item, source)?);
                }
                Value::Mapping(expanded)
            }
            Value::Sequence(items) => Value::Sequence(
                items
                    .into_iter()
                    .map(|item| self.expand(item, source))
                    .collect::<ConfigResult<_>>()?,
            ),
            scalar => scalar,
        })
    }

    fn expand_tag(&mut self, tagged: TaggedValue, source: &Path) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!(tag = %tag, "Expanding tag");

        match tag.as_str() {
            TAG_INCLUDE => {
                let target = tag_argument(TAG_INCLUDE, &tagged.value)?;
                // Relative to the including file, not the configuration root
                let base = source.parent().unwrap_or(&self.config_dir).to_path_buf();
                self.load_file(base.join(target))
            }
            TAG_ENV_VAR => env_var(tag_argument(TAG_ENV_VAR, &tagged.value)?),
            _ => {
                warn!(tag = %tag, "Ignoring unknown tag");
                self.expand(tagged.value, source)
            }
        }
    }
}

fn tag_argument<'a>(tag: &str, value: &'a Value) -> ConfigResult<&'a str> {
    value
        .as_str()
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .ok_or_else(|| ConfigError::InvalidTag {
            tag: tag.to_string(),
            reason: "expected a non-empty string".to_string(),
        })
}

/// `NAME [default]`; the text is read back as a YAML scalar so numbers and
/// booleans keep their type
fn env_var(argument: &str) -> ConfigResult<Value> {
    let (name, default) = match argument.split_once(char::is_whitespace) {
        Some((name, default)) => (name, Some(default.trim())),
        None => (argument, None),
    };

    let text = match (std::env::var(name), default) {
        (Ok(text), _) => text,
        (Err(_), Some(default)) => default.to_string(),
        (Err(_), None) => {
            return Err(ConfigError::EnvVarNotFound {
                var: name.to_string(),
            })
        }
    };
    Ok(serde_yaml::from_str(&text).unwrap_or(Value::String(text)))
}

/// Read a YAML file from `config_dir` with tag expansion
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir).load_file(file)
}

/// Expand a YAML string; includes resolve against `config_dir`
pub fn load_yaml_string(
    config_dir: impl Into<PathBuf>,
    content: &str,
    source_name: &str,
) -> ConfigResult<Value> {
    let config_dir = config_dir.into();
    let source = config_dir.join(source_name);
    YamlLoader::new(config_dir).load_string(content, &source)
}
