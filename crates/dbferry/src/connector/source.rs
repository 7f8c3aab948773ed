//! Source engine capability set.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;

use super::types::{ClusterInfo, Column, Row, UnloadRequest};

/// Read-side capabilities of a migration source.
///
/// Implementations wrap a concrete engine (MySQL, PostgreSQL, Doris, ...)
/// together with its driver and connection pool. All metadata methods take
/// unqualified database/table names; qualified `db.table` splitting is the
/// caller's concern.
#[async_trait]
pub trait Source: Send + Sync {
    /// Engine identifier (e.g. "mysql", "postgres").
    fn name(&self) -> &str;

    /// List the databases visible to this connection.
    async fn get_database_names(&self) -> Result<Vec<String>>;

    /// List the tables of one database.
    async fn get_table_names(&self, database: &str) -> Result<Vec<String>>;

    /// Fetch the column definitions of one table.
    async fn get_table_columns(&self, database: &str, table: &str) -> Result<Vec<Column>>;

    /// Fetch the source-side CREATE TABLE statement.
    async fn get_ddl_sql(&self, database: &str, table: &str) -> Result<String>;

    /// Fetch the declared primary key column names, outermost first.
    async fn get_primary_key(&self, database: &str, table: &str) -> Result<Vec<String>>;

    /// Fetch the clustering declaration, when the table has one.
    async fn get_table_cluster_info(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Option<ClusterInfo>>;

    /// Fetch the partition column names, empty for unpartitioned tables.
    async fn get_table_partition_columns(&self, database: &str, table: &str)
        -> Result<Vec<String>>;

    /// Fetch the full column definitions of the primary key columns.
    async fn get_table_pk_columns(&self, database: &str, table: &str) -> Result<Vec<Column>>;

    /// Execute a query and return its rows.
    async fn execute_sql(&self, sql: &str) -> Result<Vec<Row>>;

    /// Export one table's contents to interchange files.
    ///
    /// Returns the produced file locations; the destination loads each one
    /// with [`super::Destination::load_external_data`].
    async fn unload_data(&self, request: &UnloadRequest) -> Result<Vec<String>>;

    /// Map from source type names to canonical type names.
    fn type_mapping(&self) -> HashMap<String, String>;

    /// Identifier quote character of the engine's dialect.
    fn quote_character(&self) -> &str {
        "`"
    }

    /// Release the connection pool.
    async fn close(&self) -> Result<()>;
}
