use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::db::{ColumnMetadata, SqlConnection};
use crate::error::{AppError, AppResult};

/// Capture state for one in-flight batch. Never shared between requests and
/// dropped when the batch ends, whatever the outcome.
#[derive(Debug, Default)]
pub struct TransactionContext {
    captured: HashMap<String, HashMap<String, Value>>,
    /// Tables in capture order, most recent last.
    capture_order: Vec<String>,
    table_metadata: HashMap<String, Vec<ColumnMetadata>>,
}

impl TransactionContext {
    pub fn new() -> Self { Self::default() }

    /// Record every non-null value of `row` under `table`.
    pub fn capture(&mut self, table: &str, row: &Map<String, Value>) {
        let table = table.to_lowercase();
        let entry = self.captured.entry(table.clone()).or_default();
        for (column, value) in row.iter().filter(|(_, v)| !v.is_null()) {
            entry.insert(column.to_lowercase(), value.clone());
        }
        self.capture_order.retain(|t| t != &table);
        self.capture_order.push(table);
    }

    pub fn captured(&self, table: &str, column: &str) -> Option<&Value> {
        self.captured.get(&table.to_lowercase())?.get(&column.to_lowercase())
    }

    /// Captured table names, most recently captured first.
    pub fn tables_by_recency(&self) -> impl Iterator<Item = &str> {
        self.capture_order.iter().rev().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool { self.captured.is_empty() }

    /// Column metadata for a table, fetched from the catalog once per table
    /// per transaction.
    pub async fn table_metadata<C: SqlConnection>(
        &mut self,
        conn: &mut C,
        schema: Option<&str>,
        table: &str,
    ) -> AppResult<Vec<ColumnMetadata>> {
        let key = match schema {
            Some(s) => format!("{}.{}", s, table),
            None => table.to_string(),
        };
        if let Some(cols) = self.table_metadata.get(&key) {
            return Ok(cols.clone());
        }
        let cols = conn.table_columns(schema, table).await.map_err(AppError::database)?;
        debug!(target: "resolver", table = %key, columns = cols.len(), "catalog metadata loaded");
        self.table_metadata.insert(key, cols.clone());
        Ok(cols)
    }
}
