//! In-memory connector fakes shared by the integration tests.
//!
//! Both fakes default to succeeding with empty results; individual calls
//! are scripted per key (SQL text, `unload:db.table`, `load:location`)
//! with queued replies that are consumed one per call, so "fail twice
//! then succeed" scenarios fall out naturally.

#![allow(dead_code)]

use async_trait::async_trait;
use dbferry::{
    ClusterInfo, Column, Destination, MigrationError, Result, Row, Source, SqlValue, StatusLedger,
    TaskContext, UnloadRequest,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted reply.
pub enum Reply {
    Rows(Vec<Row>),
    Fail(String),
}

/// Keyed reply queues plus per-key artificial latency.
#[derive(Default)]
pub struct Script {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl Script {
    pub fn push(&self, key: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn rows(&self, key: &str, rows: Vec<Row>) {
        self.push(key, Reply::Rows(rows));
    }

    pub fn fail_times(&self, key: &str, times: usize) {
        for _ in 0..times {
            self.push(key, Reply::Fail(format!("scripted failure for {}", key)));
        }
    }

    pub fn delay(&self, key: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(key.to_string(), delay);
    }

    /// Apply the script for one call. `None` means "not scripted".
    async fn apply(&self, key: &str) -> Option<std::result::Result<Vec<Row>, String>> {
        let delay = self.delays.lock().unwrap().get(key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(|queue| queue.pop_front());
        match reply {
            Some(Reply::Rows(rows)) => Some(Ok(rows)),
            Some(Reply::Fail(message)) => Some(Err(message)),
            None => None,
        }
    }
}

/// Single-row single-value result.
pub fn scalar_rows(value: SqlValue) -> Vec<Row> {
    vec![vec![value]]
}

/// In-memory source fake.
pub struct MemorySource {
    pub tables: HashMap<String, Vec<String>>,
    pub columns: HashMap<String, Vec<Column>>,
    pub primary_keys: HashMap<String, Vec<String>>,
    pub cluster_info: HashMap<String, ClusterInfo>,
    pub partition_columns: HashMap<String, Vec<String>>,
    pub type_mapping: HashMap<String, String>,
    pub unload_locations: HashMap<String, Vec<String>>,
    pub unload_requests: Mutex<Vec<UnloadRequest>>,
    pub script: Script,
    pub executed: Mutex<Vec<String>>,
    pub closed: Mutex<bool>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            columns: HashMap::new(),
            primary_keys: HashMap::new(),
            cluster_info: HashMap::new(),
            partition_columns: HashMap::new(),
            type_mapping: HashMap::new(),
            unload_locations: HashMap::new(),
            unload_requests: Mutex::new(Vec::new()),
            script: Script::default(),
            executed: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
        }
    }

    /// Register a database and its tables, with default columns
    /// (`id INT`, `name VARCHAR(32)`) and primary key `id`.
    pub fn with_database(mut self, database: &str, tables: &[&str]) -> Self {
        self.tables.insert(
            database.to_string(),
            tables.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn executed_count(&self, sql: &str) -> usize {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.as_str() == sql)
            .count()
    }

    fn qualified_columns(&self, database: &str, table: &str) -> Vec<Column> {
        self.columns
            .get(&format!("{}.{}", database, table))
            .cloned()
            .unwrap_or_else(|| {
                vec![Column::new("id", "INT"), Column::new("name", "VARCHAR(32)")]
            })
    }
}

#[async_trait]
impl Source for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_database_names(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn get_table_names(&self, database: &str) -> Result<Vec<String>> {
        self.tables
            .get(database)
            .cloned()
            .ok_or_else(|| MigrationError::source(format!("unknown database {}", database)))
    }

    async fn get_table_columns(&self, database: &str, table: &str) -> Result<Vec<Column>> {
        Ok(self.qualified_columns(database, table))
    }

    async fn get_ddl_sql(&self, database: &str, table: &str) -> Result<String> {
        Ok(format!("CREATE TABLE {}.{} (id INT)", database, table))
    }

    async fn get_primary_key(&self, database: &str, table: &str) -> Result<Vec<String>> {
        Ok(self
            .primary_keys
            .get(&format!("{}.{}", database, table))
            .cloned()
            .unwrap_or_else(|| vec!["id".to_string()]))
    }

    async fn get_table_cluster_info(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Option<ClusterInfo>> {
        Ok(self.cluster_info.get(&format!("{}.{}", database, table)).cloned())
    }

    async fn get_table_partition_columns(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<String>> {
        Ok(self
            .partition_columns
            .get(&format!("{}.{}", database, table))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_table_pk_columns(&self, database: &str, table: &str) -> Result<Vec<Column>> {
        let primary = self.get_primary_key(database, table).await?;
        Ok(self
            .qualified_columns(database, table)
            .into_iter()
            .filter(|c| primary.contains(&c.name))
            .collect())
    }

    async fn execute_sql(&self, sql: &str) -> Result<Vec<Row>> {
        self.executed.lock().unwrap().push(sql.to_string());
        match self.script.apply(sql).await {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(message)) => Err(MigrationError::source(message)),
            None => Ok(Vec::new()),
        }
    }

    async fn unload_data(&self, request: &UnloadRequest) -> Result<Vec<String>> {
        let key = format!("unload:{}.{}", request.database, request.table);
        self.executed.lock().unwrap().push(key.clone());
        self.unload_requests.lock().unwrap().push(request.clone());
        match self.script.apply(&key).await {
            Some(Ok(rows)) => Ok(rows
                .iter()
                .filter_map(|row| row.first().and_then(|v| v.as_text()).map(str::to_string))
                .collect()),
            Some(Err(message)) => Err(MigrationError::source(message)),
            None => Ok(self
                .unload_locations
                .get(&format!("{}.{}", request.database, request.table))
                .cloned()
                .unwrap_or_else(|| {
                    vec![format!(
                        "mem://{}/{}/part-0",
                        request.database, request.table
                    )]
                })),
        }
    }

    fn type_mapping(&self) -> HashMap<String, String> {
        self.type_mapping.clone()
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

/// In-memory destination fake.
pub struct MemoryDestination {
    pub executed: Mutex<Vec<String>>,
    pub created_databases: Mutex<Vec<String>>,
    pub created_tables: Mutex<Vec<(String, String)>>,
    pub loads: Mutex<Vec<(String, String, String)>>,
    pub script: Script,
    pub closed: Mutex<bool>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            created_databases: Mutex::new(Vec::new()),
            created_tables: Mutex::new(Vec::new()),
            loads: Mutex::new(Vec::new()),
            script: Script::default(),
            closed: Mutex::new(false),
        }
    }

    pub fn executed_count(&self, sql: &str) -> usize {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.as_str() == sql)
            .count()
    }

    /// Answer `SHOW TABLES IN migration_status LIKE 'prefix%'` from the
    /// recorded `create_table` calls.
    fn show_status_tables(&self, sql: &str) -> Option<Vec<Row>> {
        let prefix = sql
            .strip_prefix(&format!("SHOW TABLES IN {} LIKE '", dbferry::STATUS_SCHEMA))?
            .strip_suffix("%'")?;
        let schema_prefix = format!("{}.", dbferry::STATUS_SCHEMA);
        let rows = self
            .created_tables
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(name, _)| name.strip_prefix(&schema_prefix))
            .filter(|name| name.starts_with(prefix))
            .map(|name| vec![SqlValue::Text(name.to_string())])
            .collect();
        Some(rows)
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    fn name(&self) -> &str {
        "memory"
    }

    async fn execute_sql(&self, sql: &str) -> Result<Vec<Row>> {
        self.executed.lock().unwrap().push(sql.to_string());
        match self.script.apply(sql).await {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(message)) => Err(MigrationError::destination(message)),
            None => Ok(self.show_status_tables(sql).unwrap_or_default()),
        }
    }

    fn gen_destination_ddl(
        &self,
        database: &str,
        table: &str,
        columns: &[Column],
        primary_keys: &[String],
        cluster_info: Option<&ClusterInfo>,
        partition_columns: &[String],
    ) -> Result<String> {
        let mut lines: Vec<String> = columns
            .iter()
            .map(|c| format!("    {} {}", c.name, c.data_type))
            .collect();
        if !primary_keys.is_empty() {
            lines.push(format!("    PRIMARY KEY ({})", primary_keys.join(",")));
        }
        let mut ddl = format!("CREATE TABLE {}.{} (\n{}\n)", database, table, lines.join(",\n"));
        if let Some(info) = cluster_info {
            ddl.push_str(&format!("\nCLUSTERED BY ({})", info.cluster_keys.join(",")));
        }
        if !partition_columns.is_empty() {
            ddl.push_str(&format!("\nPARTITIONED BY ({})", partition_columns.join(",")));
        }
        Ok(ddl)
    }

    async fn create_database(&self, database: &str) -> Result<()> {
        self.created_databases.lock().unwrap().push(database.to_string());
        Ok(())
    }

    async fn create_table(&self, table: &str, ddl: &str) -> Result<()> {
        self.created_tables
            .lock()
            .unwrap()
            .push((table.to_string(), ddl.to_string()));
        Ok(())
    }

    async fn load_external_data(&self, location: &str, schema: &str, table: &str) -> Result<()> {
        self.loads.lock().unwrap().push((
            location.to_string(),
            schema.to_string(),
            table.to_string(),
        ));
        let key = format!("load:{}", location);
        match self.script.apply(&key).await {
            Some(Err(message)) => Err(MigrationError::destination(message)),
            _ => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

/// Build a task context backed by the fakes, initializing a fresh status
/// ledger for `project`.
pub async fn test_context(
    source: Arc<MemorySource>,
    destination: Arc<MemoryDestination>,
    project: &str,
) -> Arc<TaskContext> {
    let ledger = StatusLedger::init(destination.clone(), project)
        .await
        .expect("ledger init");
    Arc::new(TaskContext {
        source,
        destination,
        ledger,
    })
}

/// Scheduler config with short poll intervals so tests settle quickly.
pub fn fast_scheduler_config() -> dbferry::SchedulerConfig {
    dbferry::SchedulerConfig {
        poll_interval: Duration::from_millis(20),
        finish_poll_interval: Duration::from_millis(20),
        ..dbferry::SchedulerConfig::default()
    }
}
