//! Compiled-in table definitions.
//!
//! The registry is built and validated once at startup, then shared behind an
//! `Arc`; nothing mutates it afterwards.

use std::collections::BTreeMap;

use newsflow_core::{ColumnType, Field, Schema};
use newsflow_warehouse::sql::is_plain_identifier;

use crate::error::IngestError;

/// Everything needed to ingest into one logical table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    name: String,
    table: String,
    staging_table: String,
    schema: Schema,
    key_columns: Vec<String>,
    tie_break_columns: Vec<String>,
}

impl TableSpec {
    /// Validate and build a table definition. The target table takes `name`;
    /// staging lives next to it as `<name>_staging`. Key columns are forced
    /// to be required.
    pub fn new(
        name: &str,
        schema: Schema,
        key_columns: &[&str],
        tie_break_columns: &[&str],
    ) -> Result<Self, IngestError> {
        let invalid = |reason: String| IngestError::Config {
            table: name.to_string(),
            reason,
        };

        if !is_plain_identifier(name) {
            return Err(invalid(format!("'{name}' is not a valid table name")));
        }
        if let Some(bad) = schema.names().iter().find(|c| !is_plain_identifier(c)) {
            return Err(invalid(format!("'{bad}' is not a valid column name")));
        }
        if key_columns.is_empty() {
            return Err(invalid("at least one key column is required".into()));
        }
        for column in key_columns.iter().chain(tie_break_columns) {
            if !schema.contains(column) {
                return Err(invalid(format!("column '{column}' is not in the schema")));
            }
        }

        let key_columns: Vec<String> = key_columns.iter().map(|c| c.to_string()).collect();
        Ok(Self {
            name: name.to_string(),
            table: name.to_string(),
            staging_table: format!("{name}_staging"),
            schema: schema.with_required(&key_columns),
            key_columns,
            tie_break_columns: tie_break_columns.iter().map(|c| c.to_string()).collect(),
        })
    }

    /// Logical name used for lookups.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn staging_table(&self) -> &str {
        &self.staging_table
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn tie_break_columns(&self) -> &[String] {
        &self.tie_break_columns
    }
}

#[derive(Debug, Clone)]
pub struct TableRegistry {
    specs: BTreeMap<String, TableSpec>,
}

impl TableRegistry {
    pub fn from_specs(specs: Vec<TableSpec>) -> Result<Self, IngestError> {
        let mut map = BTreeMap::new();
        for spec in specs {
            let name = spec.name().to_string();
            if map.insert(name.clone(), spec).is_some() {
                return Err(IngestError::Config {
                    table: name,
                    reason: "table is registered twice".into(),
                });
            }
        }
        Ok(Self { specs: map })
    }

    /// The news and market tables this pipeline knows how to ingest.
    pub fn builtin() -> Result<Self, IngestError> {
        Self::from_specs(vec![
            TableSpec::new("coindesk", article_schema("published")?, &["id"], &["published"])?,
            TableSpec::new(
                "cointelegraph",
                article_schema("published")?,
                &["id"],
                &["published"],
            )?,
            TableSpec::new("cryptopanic", cryptopanic_schema()?, &["id"], &["published_at"])?,
            TableSpec::new("newsdata", newsdata_schema()?, &["id"], &["pubDate"])?,
            TableSpec::new("reddit", reddit_schema()?, &["id"], &["created_utc"])?,
            TableSpec::new(
                "yfinance_news",
                yfinance_news_schema()?,
                &["id"],
                &["ticker", "published_date"],
            )?,
            TableSpec::new(
                "yfinance_tickers",
                yfinance_tickers_schema()?,
                &["date", "ticker"],
                &["date", "ticker"],
            )?,
        ])
    }

    pub fn lookup(&self, name: &str) -> Result<&TableSpec, IngestError> {
        self.specs
            .get(name)
            .ok_or_else(|| IngestError::unknown_table(name))
    }

    /// Registered logical names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

// ── Built-in schemas ──────────────────────────────────────────────

fn schema(table: &str, fields: Vec<Field>) -> Result<Schema, IngestError> {
    Schema::new(fields).map_err(|e| IngestError::Config {
        table: table.to_string(),
        reason: e.to_string(),
    })
}

/// RSS-style article feed (Coindesk, Cointelegraph).
fn article_schema(published: &str) -> Result<Schema, IngestError> {
    use ColumnType::*;
    schema(
        "article",
        vec![
            Field::nullable("id", String),
            Field::nullable("title", String),
            Field::nullable("link", String),
            Field::nullable("summary", String),
            Field::nullable("author", String),
            Field::nullable(published, Timestamp),
        ],
    )
}

fn cryptopanic_schema() -> Result<Schema, IngestError> {
    use ColumnType::*;
    schema(
        "cryptopanic",
        vec![
            Field::nullable("id", String),
            Field::nullable("title", String),
            Field::nullable("url", String),
            Field::nullable("domain", String),
            Field::nullable("currencies", String),
            Field::nullable("votes_positive", Int64),
            Field::nullable("votes_negative", Int64),
            Field::nullable("published_at", Timestamp),
        ],
    )
}

fn newsdata_schema() -> Result<Schema, IngestError> {
    use ColumnType::*;
    schema(
        "newsdata",
        vec![
            Field::nullable("id", String),
            Field::nullable("title", String),
            Field::nullable("link", String),
            Field::nullable("description", String),
            Field::nullable("source_id", String),
            Field::nullable("language", String),
            Field::nullable("pubDate", Timestamp),
        ],
    )
}

fn reddit_schema() -> Result<Schema, IngestError> {
    use ColumnType::*;
    schema(
        "reddit",
        vec![
            Field::nullable("id", String),
            Field::nullable("title", String),
            Field::nullable("url", String),
            Field::nullable("description", String),
            Field::nullable("created_utc", Float64),
            Field::nullable("subreddit", String),
        ],
    )
}

fn yfinance_news_schema() -> Result<Schema, IngestError> {
    use ColumnType::*;
    schema(
        "yfinance_news",
        vec![
            Field::nullable("id", String),
            Field::nullable("ticker", String),
            Field::nullable("title", String),
            Field::nullable("publisher", String),
            Field::nullable("link", String),
            Field::nullable("published_date", Timestamp),
        ],
    )
}

fn yfinance_tickers_schema() -> Result<Schema, IngestError> {
    use ColumnType::*;
    schema(
        "yfinance_tickers",
        vec![
            Field::nullable("date", Date),
            Field::nullable("ticker", String),
            Field::nullable("open", Float64),
            Field::nullable("high", Float64),
            Field::nullable("low", Float64),
            Field::nullable("close", Float64),
            Field::nullable("volume", Int64),
        ],
    )
}
