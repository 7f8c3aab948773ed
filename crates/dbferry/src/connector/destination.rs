//! Destination engine capability set.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{ClusterInfo, Column, Row};

/// Write-side capabilities of a migration destination.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Engine identifier (e.g. "clickzetta", "doris").
    fn name(&self) -> &str;

    /// Execute a statement and return its rows (empty for DML/DDL).
    async fn execute_sql(&self, sql: &str) -> Result<Vec<Row>>;

    /// Render the destination CREATE TABLE statement for a source table.
    ///
    /// `columns` arrive with their types already mapped to the canonical
    /// type names of [`super::Source::type_mapping`].
    fn gen_destination_ddl(
        &self,
        database: &str,
        table: &str,
        columns: &[Column],
        primary_keys: &[String],
        cluster_info: Option<&ClusterInfo>,
        partition_columns: &[String],
    ) -> Result<String>;

    /// Create a database/schema if it does not exist.
    async fn create_database(&self, database: &str) -> Result<()>;

    /// Create a table from a prepared DDL statement.
    async fn create_table(&self, table: &str, ddl: &str) -> Result<()>;

    /// Import one interchange file into a destination table.
    async fn load_external_data(&self, location: &str, schema: &str, table: &str) -> Result<()>;

    /// Identifier quote character of the engine's dialect.
    fn quote_character(&self) -> &str {
        "`"
    }

    /// Release the connection pool.
    async fn close(&self) -> Result<()>;
}
