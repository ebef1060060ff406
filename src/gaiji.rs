//! Gaiji-to-Unicode mapping table.
//!
//! Aozora texts describe characters missing from Shift_JIS with a bracketed
//! note such as `※［＃「木＋吉」、第3水準1-85-67］`. The table maps either the
//! whole description or just its quoted part (`木＋吉`) to the character it
//! stands for. Keys are stored in a `BTreeMap` so serialised tables are
//! stable between runs.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Read-only mapping from annotation text to its Unicode substitute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GaijiTable {
    entries: BTreeMap<String, String>,
}

impl GaijiTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(description, substitute)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into().trim().to_string(), v.into()))
                .collect(),
        }
    }

    /// Parse a JSON object of `"description": "character"` entries.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entries: BTreeMap<String, String> = serde_json::from_str(json)?;
        Ok(Self::from_pairs(entries))
    }

    /// Load a JSON table from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let json =
            std::fs::read_to_string(path).map_err(|e| PipelineError::InvalidGaijiTable {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        Self::from_json(&json).map_err(|e| PipelineError::InvalidGaijiTable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    pub fn insert(&mut self, description: impl Into<String>, substitute: impl Into<String>) {
        self.entries
            .insert(description.into().trim().to_string(), substitute.into());
    }

    pub fn get(&self, description: &str) -> Option<&str> {
        self.entries.get(description).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
