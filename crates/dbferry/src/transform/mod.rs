//! Migration orchestration: scope resolution, task generation,
//! partitioning across scheduler groups, and phase execution.
//!
//! A [`Transformer`] resolves the declared scope into qualified tables,
//! builds one task per table for the requested phase, splits the tasks
//! round-robin over scheduler groups, and drives every group to
//! completion concurrently. Unified mode chains the schema, data and
//! validation phases strictly one after another.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Profile;
use crate::connector::{ClusterInfo, Destination, Source};
use crate::error::{MigrationError, Result};
use crate::ledger::StatusLedger;
use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerReport};
use crate::task::{split_qualified, Task, TaskContext, TaskPayload};

/// Orchestration phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformPhase {
    Schema,
    Data,
    Validation,
}

impl TransformPhase {
    /// Human-readable phase label used in logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            TransformPhase::Schema => "schema migration",
            TransformPhase::Data => "data migration",
            TransformPhase::Validation => "data validation",
        }
    }
}

/// Orchestrator inputs: scope, remaps and concurrency knobs.
#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Project name; status ledger tables are derived from it.
    pub project_name: String,

    /// Databases to migrate wholesale, lowest-priority scope.
    pub database_list: Vec<String>,

    /// Explicit `db.table` (or `db.*`) entries from the profile.
    pub table_list: Vec<String>,

    /// Entries from an externally supplied table-list file,
    /// highest-priority scope.
    pub external_table_list: Vec<String>,

    /// Destination table remapping for data migration; must match the
    /// resolved table count exactly.
    pub dest_table_list: Option<Vec<String>>,

    /// Per-table partition predicates for unloading.
    pub transform_partitions: Option<HashMap<String, Vec<String>>>,

    /// Number of scheduler groups tasks are partitioned across.
    pub scheduler_concurrency: usize,

    /// Worker-pool size of each scheduler group.
    pub thread_concurrency: usize,

    pub quit_if_failed: bool,

    /// Retry budget handed to every scheduler group.
    pub task_retry: u32,

    /// Per-attempt execution limit handed to every scheduler group.
    pub task_timeout: Option<Duration>,

    /// Completion-queue capacity of each scheduler group.
    pub queue_size: usize,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            project_name: String::new(),
            database_list: Vec::new(),
            table_list: Vec::new(),
            external_table_list: Vec::new(),
            dest_table_list: None,
            transform_partitions: None,
            scheduler_concurrency: 1,
            thread_concurrency: 1,
            quit_if_failed: false,
            task_retry: 3,
            task_timeout: None,
            queue_size: 10,
        }
    }
}

impl TransformOptions {
    /// Build options from a loaded profile, reading the external
    /// table-list file when one is configured.
    pub fn from_profile(profile: &Profile) -> Result<Self> {
        let migration = &profile.migration;
        Ok(Self {
            project_name: profile.project.clone(),
            database_list: migration.database_list.clone(),
            table_list: migration.table_list.clone(),
            external_table_list: migration.load_external_table_list()?,
            dest_table_list: migration.dest_table_list.clone(),
            transform_partitions: migration.transform_partitions.clone(),
            scheduler_concurrency: migration.scheduler_concurrency,
            thread_concurrency: migration.thread_concurrency,
            quit_if_failed: migration.quit_if_failed,
            task_retry: migration.task_retry,
            task_timeout: migration.task_timeout_secs.map(Duration::from_secs),
            queue_size: migration.queue_size,
        })
    }
}

/// Result of one orchestration phase.
#[derive(Debug, Clone, Serialize)]
pub struct TransformReport {
    pub phase: String,
    pub project_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub tasks_total: usize,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
    pub tasks_cancelled: usize,
    pub failed_tasks: Vec<String>,
}

impl TransformReport {
    /// True when every task of the phase succeeded.
    pub fn is_success(&self) -> bool {
        self.tasks_failed == 0 && self.tasks_cancelled == 0
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Result of a unified run: all three phases in order.
#[derive(Debug, Clone, Serialize)]
pub struct UnifiedReport {
    pub schema: TransformReport,
    pub data: TransformReport,
    pub validation: TransformReport,
}

impl UnifiedReport {
    pub fn is_success(&self) -> bool {
        self.schema.is_success() && self.data.is_success() && self.validation.is_success()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Migration orchestrator for one project run.
pub struct Transformer {
    source: Arc<dyn Source>,
    destination: Arc<dyn Destination>,
    options: TransformOptions,
    ctx: Arc<TaskContext>,
}

impl Transformer {
    /// Create an orchestrator and initialize the status ledger for this run.
    pub async fn new(
        source: Arc<dyn Source>,
        destination: Arc<dyn Destination>,
        options: TransformOptions,
    ) -> Result<Self> {
        if options.project_name.is_empty() {
            return Err(MigrationError::profile("project name must not be empty"));
        }
        if options.scheduler_concurrency == 0 || options.thread_concurrency == 0 {
            return Err(MigrationError::profile(
                "scheduler_concurrency and thread_concurrency must be at least 1",
            ));
        }

        let ledger = StatusLedger::init(destination.clone(), &options.project_name).await?;
        let ctx = Arc::new(TaskContext {
            source: source.clone(),
            destination: destination.clone(),
            ledger,
        });
        Ok(Self {
            source,
            destination,
            options,
            ctx,
        })
    }

    /// The `{project}_{index}` ledger identifier of this run.
    pub fn project_id(&self) -> &str {
        self.ctx.ledger.project_id()
    }

    /// Run the schema migration phase.
    pub async fn transform_schema(&self) -> Result<TransformReport> {
        self.transform(TransformPhase::Schema).await
    }

    /// Run the data migration phase.
    pub async fn transform_data(&self) -> Result<TransformReport> {
        self.transform(TransformPhase::Data).await
    }

    /// Run the data validation phase.
    pub async fn validate(&self) -> Result<TransformReport> {
        self.transform(TransformPhase::Validation).await
    }

    /// Unified mode: schema, then data, then validation, each phase fully
    /// drained before the next starts. Closes both connectors at the end.
    pub async fn transform_all(&self) -> Result<UnifiedReport> {
        let schema = self.transform(TransformPhase::Schema).await?;
        let data = self.transform(TransformPhase::Data).await?;
        let validation = self.transform(TransformPhase::Validation).await?;
        self.close().await;
        info!("All tasks are finished");
        Ok(UnifiedReport {
            schema,
            data,
            validation,
        })
    }

    /// Run one phase: generate tasks, partition them, and drive every
    /// scheduler group to completion.
    pub async fn transform(&self, phase: TransformPhase) -> Result<TransformReport> {
        let started_at = Utc::now();
        info!("Start to schedule {} tasks", phase.label());

        let tasks = self.generate_tasks(phase).await?;
        let tasks_total = tasks.len();
        let groups = partition_tasks(tasks, self.options.scheduler_concurrency);
        info!(
            "{}: {} tasks across {} scheduler groups",
            phase.label(),
            tasks_total,
            groups.len()
        );

        let mut handles = Vec::with_capacity(groups.len());
        for group in groups {
            let config = self.scheduler_config();
            let ctx = self.ctx.clone();
            handles.push(tokio::spawn(run_group(config, ctx, group)));
        }

        let mut combined = SchedulerReport::default();
        for joined in join_all(handles).await {
            let report = joined
                .map_err(|e| MigrationError::scheduler(format!("scheduler group failed: {}", e)))??;
            combined.merge(report);
        }

        let completed_at = Utc::now();
        let report = TransformReport {
            phase: phase.label().to_string(),
            project_id: self.project_id().to_string(),
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            tasks_total,
            tasks_succeeded: combined.succeeded.len(),
            tasks_failed: combined.failed.len(),
            tasks_cancelled: combined.cancelled.len(),
            failed_tasks: combined.failed.iter().map(|t| t.name.clone()).collect(),
        };
        info!(
            "{} finished: {}/{} tasks succeeded, {} failed in {:.1}s",
            phase.label(),
            report.tasks_succeeded,
            report.tasks_total,
            report.tasks_failed,
            report.duration_seconds
        );
        Ok(report)
    }

    /// Close both connectors. Failures are logged, not surfaced: the run
    /// outcome is decided by task results.
    pub async fn close(&self) {
        if let Err(e) = self.source.close().await {
            warn!("failed to close source connector: {}", e);
        }
        if let Err(e) = self.destination.close().await {
            warn!("failed to close destination connector: {}", e);
        }
    }

    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_workers: self.options.thread_concurrency,
            queue_size: self.options.queue_size,
            task_timeout: self.options.task_timeout,
            task_retry: self.options.task_retry,
            quit_if_failed: self.options.quit_if_failed,
            ..SchedulerConfig::default()
        }
    }

    /// Resolve the declared scope into qualified `db.table` entries.
    ///
    /// Priority: external table list, then the profile's table list, then
    /// the database list. A scope without any qualified entry is a list
    /// of databases and expands to all of their tables; `db.*` expands a
    /// single database; qualified entries pass through unchanged.
    pub async fn resolve_tables(&self) -> Result<Vec<String>> {
        let scope: &[String] = if !self.options.external_table_list.is_empty() {
            &self.options.external_table_list
        } else if !self.options.table_list.is_empty() {
            &self.options.table_list
        } else if !self.options.database_list.is_empty() {
            &self.options.database_list
        } else {
            return Err(MigrationError::profile(
                "database and table list are both not provided in the migration profile",
            ));
        };

        let mut resolved = Vec::new();
        if scope.iter().all(|entry| !entry.contains('.')) {
            for database in scope {
                self.expand_database(database, &mut resolved).await?;
            }
        } else {
            for entry in scope {
                if entry.contains('*') || !entry.contains('.') {
                    let database = entry.split_once('.').map(|(db, _)| db).unwrap_or(entry);
                    self.expand_database(database, &mut resolved).await?;
                } else {
                    resolved.push(entry.clone());
                }
            }
        }

        if resolved.is_empty() {
            return Err(MigrationError::profile(
                "no table to transform, please check the migration profile",
            ));
        }
        debug!("resolved migration tables: {:?}", resolved);
        Ok(resolved)
    }

    async fn expand_database(&self, database: &str, resolved: &mut Vec<String>) -> Result<()> {
        for table in self.source.get_table_names(database).await? {
            resolved.push(format!("{}.{}", database, table));
        }
        Ok(())
    }

    /// Build the task list of one phase, registering each task in the
    /// status ledger.
    async fn generate_tasks(&self, phase: TransformPhase) -> Result<Vec<Task>> {
        let tables = self.resolve_tables().await?;
        info!("{} tasks count: {}", phase.label(), tables.len());

        let mut tasks = Vec::with_capacity(tables.len());
        match phase {
            TransformPhase::Schema => {
                for table in &tables {
                    tasks.push(self.build_schema_task(table).await?);
                }
            }
            TransformPhase::Data => {
                if let Some(dest_list) = &self.options.dest_table_list {
                    if dest_list.len() != tables.len() {
                        return Err(MigrationError::profile(
                            "dest_table_list length should be equal to the resolved table list length",
                        ));
                    }
                }
                for (index, table) in tables.iter().enumerate() {
                    let payload = TaskPayload::Data {
                        dest_table: self
                            .options
                            .dest_table_list
                            .as_ref()
                            .map(|list| list[index].clone()),
                        partitions: self
                            .options
                            .transform_partitions
                            .as_ref()
                            .and_then(|map| map.get(table).cloned()),
                    };
                    let mut task = Task::new(table.clone(), payload);
                    self.ctx.ledger.init_task_status(&mut task).await?;
                    tasks.push(task);
                }
            }
            TransformPhase::Validation => {
                for table in &tables {
                    let mut task = Task::new(table.clone(), TaskPayload::Validation);
                    self.ctx.ledger.init_task_status(&mut task).await?;
                    tasks.push(task);
                }
            }
        }
        Ok(tasks)
    }

    /// Build one schema migration task: map column types, validate the
    /// key declarations, and render the destination DDL.
    async fn build_schema_task(&self, table_name: &str) -> Result<Task> {
        let (database, table) = split_qualified(table_name)?;

        let mapping = normalize_type_mapping(self.source.type_mapping());
        let primary_keys = self.source.get_primary_key(database, table).await?;
        let cluster_info = self.source.get_table_cluster_info(database, table).await?;
        let partition_columns = self
            .source
            .get_table_partition_columns(database, table)
            .await?;
        let mut columns = self.source.get_table_columns(database, table).await?;
        for column in &mut columns {
            column.data_type = map_column_type(&column.data_type, &mapping);
        }

        check_cluster_key_compatibility(&primary_keys, cluster_info.as_ref())?;

        let ddl = self.destination.gen_destination_ddl(
            database,
            table,
            &columns,
            &primary_keys,
            cluster_info.as_ref(),
            &partition_columns,
        )?;

        let mut task = Task::new(table_name.to_string(), TaskPayload::Schema { ddl });
        self.ctx.ledger.init_task_status(&mut task).await?;
        Ok(task)
    }
}

/// Drive one scheduler group over its tasks until every task is terminal.
async fn run_group(
    config: SchedulerConfig,
    ctx: Arc<TaskContext>,
    tasks: Vec<Task>,
) -> Result<SchedulerReport> {
    let mut scheduler = Scheduler::new(config, ctx);
    scheduler.run(tasks.len());
    for task in tasks {
        scheduler.add_task(task).await?;
    }
    scheduler.finish().await
}

/// Split tasks round-robin across scheduler groups.
///
/// Fewer tasks than `scheduler_concurrency` collapse into a single group;
/// otherwise task `i` goes to group `i % scheduler_concurrency`, so group
/// sizes differ by at most one and the assignment is deterministic in the
/// resolution order.
pub fn partition_tasks(tasks: Vec<Task>, scheduler_concurrency: usize) -> Vec<Vec<Task>> {
    let group_count = if scheduler_concurrency <= 1 || tasks.len() < scheduler_concurrency {
        1
    } else {
        scheduler_concurrency
    };

    let mut groups: Vec<Vec<Task>> = (0..group_count).map(|_| Vec::new()).collect();
    for (index, task) in tasks.into_iter().enumerate() {
        groups[index % group_count].push(task);
    }
    groups
}

/// A declared primary key must be a prefix-compatible subset of the
/// declared cluster key, or the destination cannot render a valid DDL.
pub fn check_cluster_key_compatibility(
    primary_keys: &[String],
    cluster_info: Option<&ClusterInfo>,
) -> Result<()> {
    let Some(info) = cluster_info else {
        return Ok(());
    };
    for (primary_key, cluster_key) in primary_keys.iter().zip(info.cluster_keys.iter()) {
        if primary_key != cluster_key {
            warn!(
                "Primary key {} is not in cluster key {:?}",
                primary_key, info.cluster_keys
            );
            return Err(MigrationError::Grammar(format!(
                "primary key {} is not in cluster key {:?}",
                primary_key, info.cluster_keys
            )));
        }
    }
    Ok(())
}

/// Extend a type mapping with uppercase key/value pairs so lookups work
/// regardless of how the source engine cases its type names.
fn normalize_type_mapping(mut mapping: HashMap<String, String>) -> HashMap<String, String> {
    let upper: Vec<(String, String)> = mapping
        .iter()
        .map(|(k, v)| (k.to_uppercase(), v.to_uppercase()))
        .collect();
    mapping.extend(upper);
    mapping
}

/// Apply the type mapping to one column type, preserving a parenthesized
/// length suffix: `number(10,2)` maps its `number` base only.
fn map_column_type(data_type: &str, mapping: &HashMap<String, String>) -> String {
    let lookup = |base: &str| {
        mapping
            .get(base)
            .or_else(|| mapping.get(&base.to_uppercase()))
            .cloned()
    };
    match data_type.split_once('(') {
        Some((base, suffix)) => match lookup(base) {
            Some(mapped) => format!("{}({}", mapped, suffix),
            None => data_type.to_string(),
        },
        None => lookup(data_type).unwrap_or_else(|| data_type.to_string()),
    }
}
