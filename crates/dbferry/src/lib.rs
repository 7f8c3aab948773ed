//! # dbferry
//!
//! Orchestration core for moving schema and data between heterogeneous
//! database engines and validating the result.
//!
//! The crate coordinates many long-running, fallible, I/O-bound
//! operations with bounded concurrency, automatic retry and deterministic
//! completion semantics:
//!
//! - **Tasks** — schema migration, data migration and data validation
//!   units sharing one lifecycle state machine
//! - **Scheduler** — a bounded worker pool per task partition, with a
//!   single bookkeeping poller that classifies completions and drives
//!   retries
//! - **Transformer** — scope resolution, task generation, round-robin
//!   partitioning across scheduler groups, and phase execution (unified
//!   mode runs schema, data and validation strictly in sequence)
//! - **Status ledger** — a destination-backed table recording every
//!   task's lifecycle per run
//!
//! Engine-specific connectors plug in through the [`Source`] and
//! [`Destination`] traits; drivers, dialect SQL, object-storage mechanics
//! and report rendering all live outside this crate.
//!
//! ## Example
//!
//! ```ignore
//! use dbferry::{Profile, TransformOptions, Transformer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let profile = Profile::load("profile.yaml")?;
//!     let source = Arc::new(my_connectors::mysql(&profile.source)?);
//!     let destination = Arc::new(my_connectors::clickzetta(&profile.destination)?);
//!
//!     let options = TransformOptions::from_profile(&profile)?;
//!     let transformer = Transformer::new(source, destination, options).await?;
//!     let report = transformer.transform_all().await?;
//!     println!("{}", report.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod ledger;
pub mod scheduler;
pub mod task;
pub mod transform;

// Re-exports for convenient access
pub use config::{MigrationOptions, Profile};
pub use connector::{ClusterInfo, Column, Destination, Row, Source, SqlValue, UnloadRequest};
pub use error::{MigrationError, Result};
pub use ledger::{StatusLedger, STATUS_SCHEMA};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerReport};
pub use task::{Task, TaskContext, TaskPayload, TaskStatus, TaskType};
pub use transform::{
    TransformOptions, TransformPhase, TransformReport, Transformer, UnifiedReport,
};
