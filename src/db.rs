//! Database boundary. The coordinator and resolver only see [`SqlConnection`];
//! `postgres` provides the tokio-postgres implementation used by the server.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DbDiagnostic;
use crate::wire::QueryResult;

pub mod params;
pub mod text;
pub mod postgres;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;

pub use postgres::{PgConnection, PgConnector};
#[cfg(any(test, feature = "testing"))]
pub use scripted::ScriptedConnection;

/// Catalog facts about one column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    pub name: String,
    pub is_nullable: bool,
    /// Table referenced through a foreign key on this column, if any.
    pub referenced_table: Option<String>,
    pub referenced_column: Option<String>,
}

impl ColumnMetadata {
    pub fn plain<S: Into<String>>(name: S) -> Self {
        ColumnMetadata { name: name.into(), is_nullable: true, referenced_table: None, referenced_column: None }
    }

    pub fn foreign_key<S: Into<String>>(name: S, table: S, column: S) -> Self {
        ColumnMetadata {
            name: name.into(),
            is_nullable: false,
            referenced_table: Some(table.into()),
            referenced_column: Some(column.into()),
        }
    }
}

/// Leading keyword of a statement, uppercased; stands in for the command tag.
pub fn command_word(sql: &str) -> String {
    sql.split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .find(|w| !w.is_empty())
        .unwrap_or("")
        .to_ascii_uppercase()
}

/// One connection's worth of statement execution. Calls may fail or time out;
/// failures surface as diagnostics and are never retried here.
pub trait SqlConnection: Send {
    /// Run a parameterized statement and collect its rows as text.
    fn execute(&mut self, sql: &str, params: &[Value]) -> impl Future<Output = Result<QueryResult, DbDiagnostic>> + Send;

    /// Run a parameterless command (transaction control).
    fn command(&mut self, sql: &str) -> impl Future<Output = Result<(), DbDiagnostic>> + Send;

    /// Columns of `table` in ordinal order; `schema` None means the search path.
    fn table_columns(
        &mut self,
        schema: Option<&str>,
        table: &str,
    ) -> impl Future<Output = Result<Vec<ColumnMetadata>, DbDiagnostic>> + Send;
}

/// Source of connections; the server opens one per request.
pub trait Connector: Send + Sync + 'static {
    type Conn: SqlConnection;

    fn connect(&self) -> impl Future<Output = Result<Self::Conn, DbDiagnostic>> + Send;
}
