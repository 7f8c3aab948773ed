//! Profile type definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::Result;

/// Root migration profile.
///
/// The `source` and `destination` sections are passed through verbatim to
/// whichever connector factory the caller wires in; their shape is an
/// engine concern, not an orchestration one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Project name; status ledger tables are derived from it.
    pub project: String,

    /// Source connector settings, opaque to the core.
    #[serde(default)]
    pub source: HashMap<String, serde_yaml::Value>,

    /// Destination connector settings, opaque to the core.
    #[serde(default)]
    pub destination: HashMap<String, serde_yaml::Value>,

    /// Orchestration settings.
    #[serde(default)]
    pub migration: MigrationOptions,
}

/// Orchestration settings of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Databases to migrate wholesale.
    #[serde(default)]
    pub database_list: Vec<String>,

    /// Explicit `db.table` (or `db.*`) entries; takes precedence over
    /// `database_list`.
    #[serde(default)]
    pub table_list: Vec<String>,

    /// File with one `db.table` entry per line; takes precedence over
    /// both lists.
    #[serde(default)]
    pub external_table_file: Option<PathBuf>,

    /// Destination table remapping for data migration, positionally
    /// matched against the resolved table list.
    #[serde(default)]
    pub dest_table_list: Option<Vec<String>>,

    /// Per-table partition predicates for unloading.
    #[serde(default)]
    pub transform_partitions: Option<HashMap<String, Vec<String>>>,

    /// Number of scheduler groups.
    #[serde(default = "default_concurrency")]
    pub scheduler_concurrency: usize,

    /// Worker-pool size of each scheduler group.
    #[serde(default = "default_concurrency")]
    pub thread_concurrency: usize,

    #[serde(default)]
    pub quit_if_failed: bool,

    /// Retry budget per task.
    #[serde(default = "default_task_retry")]
    pub task_retry: u32,

    /// Per-attempt execution limit in seconds; unset leaves execution
    /// unbounded.
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,

    /// Completion-queue capacity of each scheduler group.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            database_list: Vec::new(),
            table_list: Vec::new(),
            external_table_file: None,
            dest_table_list: None,
            transform_partitions: None,
            scheduler_concurrency: default_concurrency(),
            thread_concurrency: default_concurrency(),
            quit_if_failed: false,
            task_retry: default_task_retry(),
            task_timeout_secs: None,
            queue_size: default_queue_size(),
        }
    }
}

impl MigrationOptions {
    /// Read the external table-list file, one `db.table` per line. Blank
    /// lines and `#` comments are skipped. Returns an empty list when no
    /// file is configured.
    pub fn load_external_table_list(&self) -> Result<Vec<String>> {
        let Some(path) = &self.external_table_file else {
            return Ok(Vec::new());
        };
        let content = std::fs::read_to_string(path)?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect())
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_task_retry() -> u32 {
    3
}

fn default_queue_size() -> usize {
    10
}
