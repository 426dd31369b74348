//! Engine settings.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;

/// Knobs that change how templates compile and render.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root for relative `usetemplate`/`usedataset` names.
    pub base_dir: Option<PathBuf>,
    /// Drop the newline that directly follows a `%}`.
    pub trim_blocks: bool,
    /// Deepest allowed context nesting.
    pub max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: None,
            trim_blocks: false,
            max_depth: 64,
        }
    }
}

impl Config {
    pub fn from_json_str(text: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
