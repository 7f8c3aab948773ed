//! Error types for the migration orchestration core.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Profile configuration error (empty scope, bad remap list, invalid knobs).
    #[error("Profile configuration error: {0}")]
    Profile(String),

    /// Destination DDL cannot be generated from the declared keys.
    #[error("DDL grammar restriction: {0}")]
    Grammar(String),

    /// Source connector failure (metadata query, SQL execution, unload).
    #[error("Source error: {0}")]
    Source(String),

    /// Destination connector failure (SQL execution, load, DDL).
    #[error("Destination error: {0}")]
    Destination(String),

    /// Status ledger protocol failure.
    #[error("Status ledger error: {0}")]
    Ledger(String),

    /// Internal scheduler fault - fatal to the owning scheduler instance.
    #[error("Scheduler fault: {0}")]
    Scheduler(String),

    /// A task payload failed while talking to a connector.
    #[error("Task {name} failed: {reason}")]
    Task { name: String, reason: String },

    /// IO error (profile files, external table lists).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrationError {
    /// Create a Profile error.
    pub fn profile(message: impl Into<String>) -> Self {
        MigrationError::Profile(message.into())
    }

    /// Create a Source error.
    pub fn source(message: impl Into<String>) -> Self {
        MigrationError::Source(message.into())
    }

    /// Create a Destination error.
    pub fn destination(message: impl Into<String>) -> Self {
        MigrationError::Destination(message.into())
    }

    /// Create a Ledger error.
    pub fn ledger(message: impl Into<String>) -> Self {
        MigrationError::Ledger(message.into())
    }

    /// Create a Scheduler fault.
    pub fn scheduler(message: impl Into<String>) -> Self {
        MigrationError::Scheduler(message.into())
    }

    /// Create a Task error.
    pub fn task(name: impl Into<String>, reason: impl Into<String>) -> Self {
        MigrationError::Task {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;
