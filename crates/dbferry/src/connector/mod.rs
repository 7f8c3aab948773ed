//! Narrow capability interfaces consumed by the orchestration core.
//!
//! Engine-specific connectors (drivers, dialect SQL, object storage
//! mechanics) live outside this crate and plug in through the [`Source`]
//! and [`Destination`] traits. The core only depends on the capability
//! sets defined here; connector instances are shared across all scheduler
//! partitions and worker tasks, so implementations are responsible for
//! their own internal connection pooling.

mod destination;
mod source;
mod types;

pub use destination::Destination;
pub use source::Source;
pub use types::{ClusterInfo, Column, Row, SqlValue, UnloadRequest};
