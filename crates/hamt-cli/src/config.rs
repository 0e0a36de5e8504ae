use std::path::{Path, PathBuf};

use anyhow::Context;
use hamt_container::TrieParams;
use serde::{Deserialize, Serialize};

/// Settings read from `--config`. Every field is optional in the file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub store_dir: PathBuf,
    pub trie: TrieParams,
    pub default_identity: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(".hamt"),
            trie: TrieParams::default(),
            default_identity: "hamt".to_string(),
        }
    }
}

impl CliConfig {
    /// Defaults when `path` is `None`, otherwise the parsed file.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self =
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        config
            .trie
            .validate()
            .with_context(|| format!("invalid trie settings in {}", path.display()))?;
        Ok(config)
    }

    /// Store directory, preferring the command-line flag.
    pub fn store_dir(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.unwrap_or_else(|| self.store_dir.clone())
    }
}
