//! [`Warehouse`] backed by Iceberg tables in AWS Athena.
//!
//! Athena has no bulk-load API for Iceberg tables, so rows go in through
//! chunked `INSERT ... VALUES` statements, and a truncating load is a
//! `DELETE FROM` followed by those inserts. MERGE uses the trait's default
//! implementation on top of [`AthenaClient::execute_query`].

use async_trait::async_trait;
use tracing::{debug, info};

use newsflow_core::{ColumnType, Record, Schema};

use crate::client::AthenaClient;
use crate::config::WarehouseConfig;
use crate::error::WarehouseError;
use crate::result::QueryResult;
use crate::sql::{literal, quote_ddl_ident, quote_ident, quote_str};
use crate::table::{TableCreation, TableRef, WriteMode};
use crate::traits::Warehouse;

pub struct AthenaWarehouse {
    client: AthenaClient,
}

impl AthenaWarehouse {
    pub async fn connect(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        Ok(Self {
            client: AthenaClient::new(config).await?,
        })
    }

    fn config(&self) -> &WarehouseConfig {
        self.client.config()
    }
}

/// Athena DDL type name for a column type.
pub fn athena_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::String => "string",
        ColumnType::Int64 => "bigint",
        ColumnType::Float64 => "double",
        ColumnType::Bool => "boolean",
        ColumnType::Timestamp => "timestamp",
        ColumnType::Date => "date",
    }
}

/// `CREATE TABLE IF NOT EXISTS` for an Iceberg table under `location_prefix`.
pub fn create_table_sql(table: &TableRef, schema: &Schema, location_prefix: &str) -> String {
    let columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| format!("  {} {}", quote_ddl_ident(&f.name), athena_type(f.column_type)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {}.{} (\n{}\n)\nLOCATION {}\nTBLPROPERTIES ('table_type'='ICEBERG')",
        quote_ddl_ident(&table.dataset),
        quote_ddl_ident(&table.table),
        columns.join(",\n"),
        quote_str(&format!("{}{}/", location_prefix, table.table)),
    )
}

/// One `INSERT ... VALUES` statement for `rows`, columns in schema order.
pub fn insert_sql(table: &TableRef, schema: &Schema, rows: &[Record]) -> String {
    let names = schema.names();
    let column_list: Vec<String> = names.iter().map(|n| quote_ident(n)).collect();
    let tuples: Vec<String> = rows
        .iter()
        .map(|row| {
            let values: Vec<String> = names
                .iter()
                .map(|n| row.get(n).map(literal).unwrap_or_else(|| "NULL".to_string()))
                .collect();
            format!("({})", values.join(", "))
        })
        .collect();
    format!(
        "INSERT INTO {} ({})\nVALUES\n{}",
        table.quoted(),
        column_list.join(", "),
        tuples.join(",\n")
    )
}

#[async_trait]
impl Warehouse for AthenaWarehouse {
    async fn create_table_if_absent(
        &self,
        table: &TableRef,
        schema: &Schema,
    ) -> Result<TableCreation, WarehouseError> {
        let existing = self.list_tables(&table.dataset).await?;
        if existing.iter().any(|t| t.eq_ignore_ascii_case(&table.table)) {
            debug!(table = %table, "table already exists, not creating again");
            return Ok(TableCreation::AlreadyExists);
        }

        let sql = create_table_sql(table, schema, &self.config().table_location);
        self.client.execute_query(&sql).await?;
        info!(table = %table, "created table");
        Ok(TableCreation::Created)
    }

    async fn load_rows(
        &self,
        table: &TableRef,
        rows: &[Record],
        schema: &Schema,
        mode: WriteMode,
    ) -> Result<u64, WarehouseError> {
        for row in rows {
            schema
                .validate(row)
                .map_err(|e| WarehouseError::SchemaMismatch {
                    table: table.to_string(),
                    reason: e.to_string(),
                })?;
        }

        if mode == WriteMode::Truncate {
            self.client
                .execute_query(&format!("DELETE FROM {}", table.quoted()))
                .await?;
        }

        let mut written = 0u64;
        for chunk in rows.chunks(self.config().insert_chunk_rows) {
            let result = self.client.execute_query(&insert_sql(table, schema, chunk)).await?;
            written += result.metadata.rows_affected.unwrap_or(chunk.len() as u64);
        }

        info!(table = %table, rows = written, mode = ?mode, "loaded rows");
        Ok(written)
    }

    async fn execute_statement(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        self.client.execute_query(sql).await
    }

    async fn list_tables(&self, dataset: &str) -> Result<Vec<String>, WarehouseError> {
        let result = self
            .client
            .execute_query(&format!("SHOW TABLES IN {}", quote_ddl_ident(dataset)))
            .await?;
        Ok(result.first_column())
    }

    async fn wait_idle(&self) -> Result<(), WarehouseError> {
        self.client.wait_idle().await;
        Ok(())
    }
}
