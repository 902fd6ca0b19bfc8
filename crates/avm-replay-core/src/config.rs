//! Replay session configuration.
//!
//! Settings can be built in code, deserialized (every field has a default),
//! or read from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `AVM_REPLAY_STOP_ON_ENTRY` | `stop_on_entry` |
//! | `AVM_REPLAY_SOURCE_ROOT` | `source_root` |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use avm_replay_types::env_utils::{env_bool_or, env_var};

use crate::source::normalize_path;

pub const ENV_STOP_ON_ENTRY: &str = "AVM_REPLAY_STOP_ON_ENTRY";
pub const ENV_SOURCE_ROOT: &str = "AVM_REPLAY_SOURCE_ROOT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Stop at the first position after launch instead of running to the
    /// first breakpoint.
    pub stop_on_entry: bool,
    /// Directory that relative source paths are resolved against.
    pub source_root: Option<PathBuf>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            stop_on_entry: true,
            source_root: None,
        }
    }
}

impl ReplayConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stop_on_entry: env_bool_or(ENV_STOP_ON_ENTRY, defaults.stop_on_entry),
            source_root: env_var::<String>(ENV_SOURCE_ROOT)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn with_stop_on_entry(mut self, stop_on_entry: bool) -> Self {
        self.stop_on_entry = stop_on_entry;
        self
    }

    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    /// Normalized identity of a source file. Relative paths are joined onto
    /// `source_root` when one is configured.
    pub fn resolve_source(&self, file: &str) -> String {
        match &self.source_root {
            Some(root) if !Path::new(file).is_absolute() && !file.starts_with('/') => {
                normalize_path(&root.join(file).to_string_lossy())
            }
            _ => normalize_path(file),
        }
    }
}
