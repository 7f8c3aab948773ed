//! Destination-backed status ledger.
//!
//! Every migration run records the lifecycle of each task in a dedicated
//! table under the [`STATUS_SCHEMA`] schema of the destination. Repeated
//! runs of the same project get fresh tables with strictly increasing
//! integer suffixes (`myproject_0`, `myproject_1`, ...), so earlier run
//! records are never overwritten.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::connector::{Destination, Row};
use crate::error::{MigrationError, Result};
use crate::task::Task;

/// Schema holding all per-project status tables.
pub const STATUS_SCHEMA: &str = "migration_status";

/// Status ledger client for one migration run.
///
/// Row ids come from a counter owned by this instance; callers must route
/// [`init_task_status`](StatusLedger::init_task_status) through
/// single-threaded task generation, while
/// [`update_task_status`](StatusLedger::update_task_status) addresses rows
/// by their stored id and is safe from concurrent task completions.
#[derive(Clone)]
pub struct StatusLedger {
    destination: Arc<dyn Destination>,
    project_id: String,
    next_id: Arc<AtomicI64>,
}

impl StatusLedger {
    /// Create the status table for a new run of `project_name` and return
    /// a ledger handle bound to it.
    pub async fn init(destination: Arc<dyn Destination>, project_name: &str) -> Result<Self> {
        destination.create_database(STATUS_SCHEMA).await?;

        let index = next_table_index(destination.as_ref(), project_name).await?;
        let project_id = format!("{}_{}", project_name, index);
        let table = format!("{}.{}", STATUS_SCHEMA, project_id);

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n\
             \x20   id INT NOT NULL,\n\
             \x20   task_id STRING NOT NULL,\n\
             \x20   task_name STRING NOT NULL,\n\
             \x20   project_id STRING NOT NULL,\n\
             \x20   task_status STRING NOT NULL,\n\
             \x20   task_type STRING NOT NULL,\n\
             \x20   task_start_time TIMESTAMP NOT NULL,\n\
             \x20   task_end_time TIMESTAMP,\n\
             \x20   PRIMARY KEY (id)\n\
             )"
        );
        destination.create_table(&table, &ddl).await?;
        info!("Status ledger table {} initialized", table);

        Ok(Self {
            destination,
            project_id,
            next_id: Arc::new(AtomicI64::new(0)),
        })
    }

    /// The `{project}_{index}` identifier of this run.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Insert the INIT row for a freshly generated task and remember its
    /// row id on the task.
    pub async fn init_task_status(&self, task: &mut Task) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let sql = format!(
            "INSERT INTO {schema}.{project} \
             (id, task_id, task_name, project_id, task_status, task_type, task_start_time, task_end_time) \
             VALUES ({id}, '{task_id}', '{task_name}', '{project}', '{status}', '{task_type}', {start}, null)",
            schema = STATUS_SCHEMA,
            project = self.project_id,
            id = id,
            task_id = task.id,
            task_name = task.name,
            status = task.status,
            task_type = task.task_type,
            start = timestamp_literal(task.start_time),
        );
        self.destination.execute_sql(&sql).await?;
        task.status_id = Some(id);
        debug!("Inited task {} status", task.id);
        Ok(())
    }

    /// Update the task's ledger row with its current status and end time.
    ///
    /// Tasks that were never registered are skipped.
    pub async fn update_task_status(&self, task: &Task) -> Result<()> {
        let Some(status_id) = task.status_id else {
            debug!("task {} has no ledger row, skipping status update", task.id);
            return Ok(());
        };
        let end = match task.end_time {
            Some(t) => timestamp_literal(t),
            None => "null".to_string(),
        };
        let sql = format!(
            "UPDATE {schema}.{project} SET task_status = '{status}', task_end_time = {end} WHERE id = {id}",
            schema = STATUS_SCHEMA,
            project = self.project_id,
            status = task.status,
            end = end,
            id = status_id,
        );
        self.destination.execute_sql(&sql).await?;
        debug!("Updated task {} status to {}", task.id, task.status);
        Ok(())
    }

    /// Read every row of the most recent status table for a project.
    ///
    /// Rendering (tabular or spreadsheet output) is left to the caller.
    pub async fn fetch_latest_status(
        destination: &dyn Destination,
        project_name: &str,
    ) -> Result<Vec<Row>> {
        let indexes = existing_table_indexes(destination, project_name).await?;
        let latest = indexes.last().ok_or_else(|| {
            MigrationError::ledger(format!("no status table found for project {}", project_name))
        })?;
        destination
            .execute_sql(&format!(
                "select * from {}.{}_{}",
                STATUS_SCHEMA, project_name, latest
            ))
            .await
    }
}

/// Next unused integer suffix for a project's status tables.
async fn next_table_index(destination: &dyn Destination, project_name: &str) -> Result<i64> {
    let indexes = existing_table_indexes(destination, project_name).await?;
    Ok(indexes.last().map(|last| last + 1).unwrap_or(0))
}

/// Sorted integer suffixes of the project's existing status tables.
///
/// The destination reports table names through `SHOW TABLES`; the name is
/// expected in the first column of each row.
async fn existing_table_indexes(
    destination: &dyn Destination,
    project_name: &str,
) -> Result<Vec<i64>> {
    let sql = format!(
        "SHOW TABLES IN {} LIKE '{}_%'",
        STATUS_SCHEMA, project_name
    );
    let rows = destination.execute_sql(&sql).await?;

    let mut indexes = Vec::with_capacity(rows.len());
    for row in &rows {
        let name = row.first().and_then(|v| v.as_text()).ok_or_else(|| {
            MigrationError::ledger("SHOW TABLES returned a row without a table name".to_string())
        })?;
        indexes.push(table_suffix(name)?);
    }
    indexes.sort_unstable();
    Ok(indexes)
}

/// Parse the trailing `_N` suffix of a status table name.
fn table_suffix(table: &str) -> Result<i64> {
    let suffix = table.rsplit_once('_').map(|(_, s)| s).unwrap_or_default();
    suffix
        .parse()
        .map_err(|_| MigrationError::ledger(format!("table name {} is not valid", table)))
}

/// SQL literal for a ledger timestamp.
fn timestamp_literal(time: DateTime<Utc>) -> String {
    format!(
        "cast('{}' as timestamp)",
        time.format("%Y-%m-%d %H:%M:%S%.6f")
    )
}
