//! Profile validation.

use super::Profile;
use crate::error::{MigrationError, Result};

/// Validate a loaded profile.
pub fn validate(profile: &Profile) -> Result<()> {
    if profile.project.is_empty() {
        return Err(MigrationError::profile("project is required"));
    }
    if profile.migration.scheduler_concurrency == 0 {
        return Err(MigrationError::profile(
            "migration.scheduler_concurrency must be at least 1",
        ));
    }
    if profile.migration.thread_concurrency == 0 {
        return Err(MigrationError::profile(
            "migration.thread_concurrency must be at least 1",
        ));
    }
    if profile.migration.queue_size == 0 {
        return Err(MigrationError::profile(
            "migration.queue_size must be at least 1",
        ));
    }
    if let Some(dest_list) = &profile.migration.dest_table_list {
        if dest_list.iter().any(|entry| !entry.contains('.')) {
            return Err(MigrationError::profile(
                "dest_table_list entries must be qualified as db.table",
            ));
        }
    }
    Ok(())
}
