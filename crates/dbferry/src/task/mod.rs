//! Migration task: a unit of schema change, data move, or validation
//! check against one logical table.
//!
//! A [`Task`] is a state-machine envelope (id, lifecycle status, retry
//! bookkeeping, timestamps) around a closed [`TaskPayload`] sum. Execution
//! never propagates connector errors past [`Task::run`]: any failure is
//! captured, the task transitions to FAILED, and the scheduler decides
//! whether to retry.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::connector::{Column, Destination, Source, SqlValue, UnloadRequest};
use crate::error::{MigrationError, Result};
use crate::ledger::StatusLedger;

/// Canonical type names treated as numeric by the validation statistics
/// check, after the source's type mapping has been applied.
const NUMERIC_TYPES: [&str; 7] = [
    "BIGINT", "DECIMAL", "DOUBLE", "FLOAT", "INT", "SMALLINT", "TINYINT",
];

/// Task lifecycle status.
///
/// INIT -> QUEUED -> RUNNING -> {COMPLETED | FAILED}. FAILED loops back to
/// RUNNING through scheduler retry until the retry budget is exhausted.
/// CANCELLED is terminal and only reachable when the owning pool shuts
/// down before the task has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Init,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Ledger string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Init => "INIT",
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    SchemaMigration,
    DataMigration,
    DataValidation,
}

impl TaskType {
    /// Ledger string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::SchemaMigration => "SCHEMA_MIGRATION",
            TaskType::DataMigration => "DATA_MIGRATION",
            TaskType::DataValidation => "DATA_VALIDATION",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-variant execution payload.
#[derive(Debug, Clone)]
pub enum TaskPayload {
    /// Execute one prepared DDL statement on the destination.
    Schema { ddl: String },

    /// Unload the source table to interchange files, then load each file
    /// into the destination. `dest_table` remaps the destination
    /// `db.table` when it differs from the source name.
    Data {
        dest_table: Option<String>,
        partitions: Option<Vec<String>>,
    },

    /// Compare row counts, then per-numeric-column min/max/avg between
    /// source and destination. Fail-fast: the first mismatch ends the
    /// check.
    Validation,
}

impl TaskPayload {
    fn task_type(&self) -> TaskType {
        match self {
            TaskPayload::Schema { .. } => TaskType::SchemaMigration,
            TaskPayload::Data { .. } => TaskType::DataMigration,
            TaskPayload::Validation => TaskType::DataValidation,
        }
    }
}

/// Shared handles every task execution needs.
pub struct TaskContext {
    pub source: Arc<dyn Source>,
    pub destination: Arc<dyn Destination>,
    pub ledger: StatusLedger,
}

/// One unit of migration work against one logical table.
#[derive(Debug)]
pub struct Task {
    /// Unique within a run: name, type and creation timestamp.
    pub id: String,

    /// Qualified table identifier, `db.table`.
    pub name: String,

    pub task_type: TaskType,
    pub payload: TaskPayload,
    pub status: TaskStatus,

    /// Execution attempts so far; the first attempt counts as 1.
    pub retry_times: u32,

    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,

    /// Row id of this task in the status ledger, once registered.
    pub status_id: Option<i64>,

    /// Reason of the most recent failure.
    pub failure: Option<String>,
}

impl Task {
    /// Create a task in INIT state.
    pub fn new(name: impl Into<String>, payload: TaskPayload) -> Self {
        let name = name.into();
        let task_type = payload.task_type();
        let id = format!(
            "{}_{}_{}",
            name,
            task_type,
            Utc::now().format("%Y%m%d%H%M%S%6f")
        );
        Self {
            id,
            name,
            task_type,
            payload,
            status: TaskStatus::Init,
            retry_times: 1,
            start_time: Utc::now(),
            end_time: None,
            status_id: None,
            failure: None,
        }
    }

    /// Short display label, `name-TYPE`.
    pub fn label(&self) -> String {
        format!("{}-{}", self.name, self.task_type)
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == TaskStatus::Cancelled
    }

    /// Execute the payload and settle the task into a terminal state.
    ///
    /// Connector failures (and a payload overrunning `task_timeout`, when
    /// one is configured) are captured into FAILED; they are never
    /// returned to the caller. End time is recorded and the status ledger
    /// is updated exactly once, on success and on failure alike.
    pub async fn run(&mut self, ctx: &TaskContext, task_timeout: Option<Duration>) {
        self.status = TaskStatus::Running;

        let outcome = match task_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.execute(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(MigrationError::task(
                    self.name.clone(),
                    format!("execution exceeded task timeout of {:?}", limit),
                )),
            },
            None => self.execute(ctx).await,
        };

        self.end_time = Some(Utc::now());
        match outcome {
            Ok(()) => {
                self.status = TaskStatus::Completed;
            }
            Err(e) => {
                self.status = TaskStatus::Failed;
                self.failure = Some(e.to_string());
                error!(
                    "{} {} failed to run, error: {}, try times: {}",
                    self.task_type, self.name, e, self.retry_times
                );
            }
        }

        if let Err(e) = ctx.ledger.update_task_status(self).await {
            error!("{} {} failed to record status: {}", self.task_type, self.name, e);
            if self.status == TaskStatus::Completed {
                self.status = TaskStatus::Failed;
                self.failure = Some(format!("status update failed: {}", e));
            }
        }

        if self.is_success() {
            info!(
                "{} {} finished running, status: {}",
                self.task_type, self.name, self.status
            );
        }
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<()> {
        match &self.payload {
            TaskPayload::Schema { ddl } => {
                ctx.destination.execute_sql(ddl).await?;
                Ok(())
            }
            TaskPayload::Data {
                dest_table,
                partitions,
            } => self.execute_data(ctx, dest_table.as_deref(), partitions).await,
            TaskPayload::Validation => self.execute_validation(ctx).await,
        }
    }

    async fn execute_data(
        &self,
        ctx: &TaskContext,
        dest_table: Option<&str>,
        partitions: &Option<Vec<String>>,
    ) -> Result<()> {
        let (database, table) = split_qualified(&self.name)?;
        let request = UnloadRequest {
            task_id: self.id.clone(),
            database: database.to_string(),
            table: table.to_string(),
            partitions: partitions.clone(),
        };
        let locations = ctx.source.unload_data(&request).await?;

        let (dest_schema, dest_table) = split_qualified(dest_table.unwrap_or(&self.name))?;
        for location in &locations {
            ctx.destination
                .load_external_data(location, dest_schema, dest_table)
                .await?;
        }
        Ok(())
    }

    async fn execute_validation(&self, ctx: &TaskContext) -> Result<()> {
        self.check_count(ctx).await?;
        self.check_numeric_statistics(ctx).await?;
        Ok(())
    }

    /// Row-count equality between source and destination.
    async fn check_count(&self, ctx: &TaskContext) -> Result<()> {
        let sql = format!("select count(*) from {}", self.name);

        let source_rows = ctx.source.execute_sql(&sql).await?;
        let source_count = scalar(&source_rows);
        info!("source table: {} count: {:?}", self.name, source_count);
        let destination_rows = ctx.destination.execute_sql(&sql).await?;
        let destination_count = scalar(&destination_rows);
        info!(
            "destination table: {} count: {:?}",
            self.name, destination_count
        );

        if source_count != destination_count {
            return Err(MigrationError::task(
                self.name.clone(),
                format!(
                    "row count not equal, source: {:?}, destination: {:?}",
                    source_count, destination_count
                ),
            ));
        }
        Ok(())
    }

    /// min/max/avg equality for every numeric-typed column.
    async fn check_numeric_statistics(&self, ctx: &TaskContext) -> Result<()> {
        let mapping = ctx.source.type_mapping();
        let (database, table) = split_qualified(&self.name)?;
        let columns = ctx.source.get_table_columns(database, table).await?;

        for column in &columns {
            if !is_numeric_column(column, &mapping) {
                continue;
            }
            let sql = format!(
                "select min({c}) as min_value, max({c}) as max_value, avg({c}) as avg_value from {t}",
                c = column.name,
                t = self.name
            );
            let source_stats = ctx.source.execute_sql(&sql).await?;
            info!(
                "source table: {} column: {} statistics: {:?}",
                self.name,
                column.name,
                source_stats.first()
            );
            let destination_stats = ctx.destination.execute_sql(&sql).await?;
            info!(
                "destination table: {} column: {} statistics: {:?}",
                self.name,
                column.name,
                destination_stats.first()
            );

            if source_stats.first() != destination_stats.first() {
                return Err(MigrationError::task(
                    self.name.clone(),
                    format!("numeric statistics not equal for column {}", column.name),
                ));
            }
        }
        Ok(())
    }
}

/// Split a qualified `db.table` identifier.
pub fn split_qualified(name: &str) -> Result<(&str, &str)> {
    name.split_once('.').ok_or_else(|| {
        MigrationError::profile(format!("table identifier {name:?} is not qualified as db.table"))
    })
}

/// First value of the first row, for single-scalar queries.
fn scalar(rows: &[Vec<SqlValue>]) -> Option<&SqlValue> {
    rows.first().and_then(|row| row.first())
}

/// Whether a column resolves to a numeric canonical type under the
/// source's type mapping. Lookup is case-insensitive and ignores a
/// parenthesized length suffix.
fn is_numeric_column(column: &Column, mapping: &HashMap<String, String>) -> bool {
    let base = column.base_type();
    let resolved = mapping
        .get(base)
        .or_else(|| mapping.get(&base.to_uppercase()))
        .map(String::as_str)
        .unwrap_or(base);
    NUMERIC_TYPES.contains(&resolved.to_uppercase().as_str())
}
