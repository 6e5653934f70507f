//! Wildcard subscription patterns

use regex::Regex;

use crate::error::{StoreError, StoreResult};

/// A subscription pattern such as `scene.*` or an exact point id
///
/// `*` matches any run of characters; every other character is literal.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern
    pub fn new(pattern: &str) -> StoreResult<Self> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex =
            Regex::new(&format!("^{}$", body)).map_err(|source| StoreError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Check whether an id matches
    pub fn matches(&self, id: &str) -> bool {
        self.regex.is_match(id)
    }

    /// The pattern as written
    pub fn as_str(&self) -> &str {
        &self.source
    }
}
