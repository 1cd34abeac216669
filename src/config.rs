//! Tunables for diffing and for the in-memory repository.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Diff configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Minimum number of nested state diffs a positional list diff must
    /// contain to be kept. Below this the new list replaces the old one
    /// wholesale.
    /// Default: 1
    pub min_nested_diffs: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            min_nested_diffs: 1,
        }
    }
}

/// Repository configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Prefix for generated document ids.
    pub id_prefix: String,

    /// Where `persist`/`load` read and write snapshots when no path is given.
    pub snapshot_path: Option<PathBuf>,

    /// Diff settings used by transactions over this repository.
    pub diff: DiffConfig,

    /// Apply updates as dotted-path batches instead of walking the diff,
    /// the way a path-addressed document store would.
    /// Default: false
    pub path_updates: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            id_prefix: "doc-".to_string(),
            snapshot_path: None,
            diff: DiffConfig::default(),
            path_updates: false,
        }
    }
}
