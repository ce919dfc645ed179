//! In-memory [`SqlConnection`] that replays scripted results and records what
//! it was asked to run. Used to exercise the resolver, the coordinator and the
//! HTTP handlers without a database server.
//!
//! Clones share one script, so the same value also serves as a [`Connector`]
//! handing out connections that all read from (and log into) that script.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::{command_word, ColumnMetadata, Connector, SqlConnection};
use crate::error::DbDiagnostic;
use crate::wire::{Column, QueryResult};

#[derive(Debug, Default)]
struct Script {
    executed: Vec<(String, Vec<Value>)>,
    commands: Vec<String>,
    catalog_lookups: Vec<String>,
    connects: usize,
    tables: HashMap<String, Vec<ColumnMetadata>>,
    responses: VecDeque<Result<QueryResult, DbDiagnostic>>,
    failing_commands: HashMap<String, DbDiagnostic>,
    connect_error: Option<DbDiagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedConnection {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnection {
    pub fn new() -> Self { Self::default() }

    pub fn with_table(self, table: &str, columns: Vec<ColumnMetadata>) -> Self {
        self.script.lock().tables.insert(table.to_lowercase(), columns);
        self
    }

    /// Queue the result of the next `execute`. Without a queued response a
    /// statement succeeds with no rows.
    pub fn respond(self, result: QueryResult) -> Self {
        self.script.lock().responses.push_back(Ok(result));
        self
    }

    pub fn fail(self, diagnostic: DbDiagnostic) -> Self {
        self.script.lock().responses.push_back(Err(diagnostic));
        self
    }

    /// Make every `connect` fail with `diagnostic`.
    pub fn refuse_connections(self, diagnostic: DbDiagnostic) -> Self {
        self.script.lock().connect_error = Some(diagnostic);
        self
    }

    /// Make a transaction command (matched case-insensitively by its first word) fail.
    pub fn fail_command(self, keyword: &str, diagnostic: DbDiagnostic) -> Self {
        self.script.lock().failing_commands.insert(keyword.to_ascii_uppercase(), diagnostic);
        self
    }

    /// Statements passed to `execute`, in order, with their parameters.
    pub fn executed(&self) -> Vec<(String, Vec<Value>)> {
        self.script.lock().executed.clone()
    }

    /// Transaction control commands, in order.
    pub fn commands(&self) -> Vec<String> {
        self.script.lock().commands.clone()
    }

    /// Tables whose catalog metadata was requested.
    pub fn catalog_lookups(&self) -> Vec<String> {
        self.script.lock().catalog_lookups.clone()
    }

    pub fn connects(&self) -> usize {
        self.script.lock().connects
    }
}

/// Raw single-row result as a RETURNING clause would produce it.
pub fn returning_row(command: &str, columns: &[(&str, i32)], values: &[Option<&str>]) -> QueryResult {
    QueryResult {
        command: command.to_string(),
        fields: columns
            .iter()
            .enumerate()
            .map(|(i, (name, type_id))| Column { name: name.to_string(), type_id: *type_id, ordinal: i })
            .collect(),
        row_count: 1,
        rows: vec![Value::Array(
            values.iter().map(|v| v.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null)).collect(),
        )],
    }
}

impl SqlConnection for ScriptedConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, DbDiagnostic> {
        let mut script = self.script.lock();
        script.executed.push((sql.to_string(), params.to_vec()));
        match script.responses.pop_front() {
            Some(r) => r,
            None => Ok(QueryResult { command: command_word(sql), ..Default::default() }),
        }
    }

    async fn command(&mut self, sql: &str) -> Result<(), DbDiagnostic> {
        let mut script = self.script.lock();
        script.commands.push(sql.to_string());
        match script.failing_commands.get(&command_word(sql)) {
            Some(d) => Err(d.clone()),
            None => Ok(()),
        }
    }

    async fn table_columns(&mut self, _schema: Option<&str>, table: &str) -> Result<Vec<ColumnMetadata>, DbDiagnostic> {
        let mut script = self.script.lock();
        script.catalog_lookups.push(table.to_string());
        Ok(script.tables.get(&table.to_lowercase()).cloned().unwrap_or_default())
    }
}

impl Connector for ScriptedConnection {
    type Conn = ScriptedConnection;

    async fn connect(&self) -> Result<ScriptedConnection, DbDiagnostic> {
        let mut script = self.script.lock();
        script.connects += 1;
        match &script.connect_error {
            Some(diag) => Err(diag.clone()),
            None => Ok(self.clone()),
        }
    }
}
