//! Read-only SQLite tools.
//!
//! | Tool | Description |
//! |------|-------------|
//! | `read_query` | Run a `SELECT` and return rows as a JSON array |
//! | `list_tables` | Names of all user tables |
//! | `describe_table` | Column information for one table |
//! | `update` | Accepted and ignored; never modifies the database |
//!
//! Rows are rendered as pretty-printed JSON objects keyed by column name and
//! truncated to `max_result_bytes`. Problems with the caller's SQL are tool
//! results flagged as errors, not protocol errors.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Map, Number, Value};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::backends::{Backend, BackendFactory};
use crate::config::Config;
use crate::db;
use crate::traits::{
    optional_string, required_string, Tool, ToolContext, ToolError, ToolRegistry,
};

pub const BACKEND_NAME: &str = "sqlite";

const TRUNCATION_MARKER: &str = "\n... (results truncated)";

const LIST_TABLES_SQL: &str =
    "SELECT name FROM sqlite_schema WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

/// Builds the four SQLite tools over `pool`.
pub fn sqlite_tools(pool: SqlitePool, max_result_bytes: usize) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ReadQueryTool {
        pool: pool.clone(),
        max_result_bytes,
    }));
    registry.register(Box::new(ListTablesTool { pool: pool.clone() }));
    registry.register(Box::new(DescribeTableTool {
        pool,
        max_result_bytes,
    }));
    registry.register(Box::new(UpdateTool));
    registry
}

/// Converts one row to a JSON object.
fn row_to_json(row: &SqliteRow) -> Result<Value, sqlx::Error> {
    let mut object = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => Value::from(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" => Number::from_f64(row.try_get_unchecked::<f64, _>(i)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(i)?;
                    Value::String(format!("BLOB data (length {})", bytes.len()))
                }
                _ => Value::String(row.try_get_unchecked::<String, _>(i)?),
            }
        };
        object.insert(column.name().to_string(), value);
    }
    Ok(Value::Object(object))
}

/// Pretty-prints `rows`, cutting the output at `max_bytes`.
fn format_rows(rows: &[SqliteRow], max_bytes: usize) -> Result<Value, ToolError> {
    let values = rows
        .iter()
        .map(row_to_json)
        .collect::<Result<Vec<_>, _>>()
        .context("decode result row")?;
    let text = serde_json::to_string_pretty(&values)?;
    Ok(Value::String(truncate(text, max_bytes)))
}

fn truncate(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(TRUNCATION_MARKER);
    text
}

fn is_select(query: &str) -> bool {
    query.trim().to_uppercase().starts_with("SELECT")
}

pub struct ReadQueryTool {
    pool: SqlitePool,
    max_result_bytes: usize,
}

#[async_trait]
impl Tool for ReadQueryTool {
    fn name(&self) -> &str {
        "read_query"
    }

    fn description(&self) -> &str {
        "Execute a read-only SELECT query on the SQLite database"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The SELECT SQL query to execute" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let query = required_string(&params, "query")?;
        if !is_select(query) {
            return Err(ToolError::Rejected(
                "Only SELECT queries are allowed for read-only access.".to_string(),
            ));
        }

        let rows = match sqlx::query(query).fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, query, "query failed");
                return Err(ToolError::Rejected(format!("Error executing query: {}", e)));
            }
        };
        tracing::debug!(rows = rows.len(), "query complete");
        format_rows(&rows, self.max_result_bytes)
    }
}

pub struct ListTablesTool {
    pool: SqlitePool,
}

#[async_trait]
impl Tool for ListTablesTool {
    fn name(&self) -> &str {
        "list_tables"
    }

    fn description(&self) -> &str {
        "List all user tables in the SQLite database"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let names: Vec<String> = sqlx::query_scalar(LIST_TABLES_SQL)
            .fetch_all(&self.pool)
            .await
            .context("list tables")?;
        Ok(Value::String(serde_json::to_string_pretty(&names)?))
    }
}

pub struct DescribeTableTool {
    pool: SqlitePool,
    max_result_bytes: usize,
}

#[async_trait]
impl Tool for DescribeTableTool {
    fn name(&self) -> &str {
        "describe_table"
    }

    fn description(&self) -> &str {
        "Get the schema information (columns, types) for a specific table"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "table_name": { "type": "string", "description": "Name of the table to describe" }
            },
            "required": ["table_name"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let table = required_string(&params, "table_name")?;
        if table.contains('\'') || table.contains(';') || table.contains("--") {
            return Err(ToolError::Rejected(
                "Invalid characters in table name.".to_string(),
            ));
        }

        let sql = format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\""));
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ToolError::Rejected(format!("Error describing table '{}': {}", table, e)))?;
        if rows.is_empty() {
            return Err(ToolError::Rejected(format!(
                "Table '{}' not found or PRAGMA query failed.",
                table
            )));
        }
        format_rows(&rows, self.max_result_bytes)
    }
}

/// Accepts an update request and does nothing with it.
pub struct UpdateTool;

#[async_trait]
impl Tool for UpdateTool {
    fn name(&self) -> &str {
        "update"
    }

    fn description(&self) -> &str {
        "Update records in a table"
    }

    fn read_only(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "table_name": { "type": "string", "description": "Name of the table to update" },
                "set_clause": {
                    "type": "string",
                    "description": "SET clause for the update (e.g. 'name=John, age=30')"
                },
                "where_clause": {
                    "type": "string",
                    "description": "WHERE clause to filter which records to update (e.g. 'id=1')"
                }
            },
            "required": ["table_name", "set_clause", "where_clause"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        tracing::info!(
            table = optional_string(&params, "table_name"),
            "ignoring update request"
        );
        Ok(Value::String(
            "Update command received but not executed (read-only mode)".to_string(),
        ))
    }
}

/// Enables the `sqlite` backend when `[backends.sqlite]` is configured.
pub struct SqliteFactory;

#[async_trait]
impl BackendFactory for SqliteFactory {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn build(&self, config: &Config) -> anyhow::Result<Option<Backend>> {
        let Some(sqlite) = &config.backends.sqlite else {
            return Ok(None);
        };
        let pool = db::connect(&sqlite.db_file).await?;
        let tools = sqlite_tools(pool.clone(), sqlite.max_result_bytes);
        Ok(Some(
            Backend::new(BACKEND_NAME, "SQLite (read-only)", tools).with_database(pool),
        ))
    }
}
