//! Transaction coordinator: runs a batch of statements inside one database
//! transaction, resolving omitted references before each statement and
//! capturing RETURNING rows after it.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::db::SqlConnection;
use crate::decode::{project, RowShape, TypeRegistry};
use crate::error::{AppError, AppResult};
use crate::resolver::{self, has_returning, tokenizer::tokenize, write_target, Statement, TransactionContext};
use crate::session::{Session, SessionStore};
use crate::wire::{BatchOptions, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Began,
    Resolving,
    Executing,
    Capturing,
    Committed,
    RolledBack,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Committed | Phase::RolledBack)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Began => "began",
            Phase::Resolving => "resolving",
            Phase::Executing => "executing",
            Phase::Capturing => "capturing",
            Phase::Committed => "committed",
            Phase::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    Serializable,
    RepeatableRead,
    ReadCommitted,
    ReadUncommitted,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::Serializable => "SERIALIZABLE",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = AppError;

    /// Accepts `repeatable read`, `REPEATABLE_READ`, `repeatable-read` and so on.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        match norm.as_str() {
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            "REPEATABLE READ" => Ok(IsolationLevel::RepeatableRead),
            "READ COMMITTED" => Ok(IsolationLevel::ReadCommitted),
            "READ UNCOMMITTED" => Ok(IsolationLevel::ReadUncommitted),
            _ => Err(AppError::user("invalid_isolation_level".to_string(), format!("unsupported isolation level: {}", s))),
        }
    }
}

/// Transaction-start modifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation_level: Option<IsolationLevel>,
    pub read_only: Option<bool>,
    pub deferrable: Option<bool>,
}

impl TxOptions {
    pub fn from_options(options: &BatchOptions) -> AppResult<Self> {
        let isolation_level = match options.isolation_level.as_deref().map(str::trim) {
            Some(level) if !level.is_empty() => Some(level.parse()?),
            _ => None,
        };
        Ok(TxOptions { isolation_level, read_only: options.read_only, deferrable: options.deferrable })
    }

    pub fn begin_command(&self) -> String {
        let mut modes = Vec::new();
        if let Some(level) = self.isolation_level {
            modes.push(format!("ISOLATION LEVEL {}", level.as_sql()));
        }
        match self.read_only {
            Some(true) => modes.push("READ ONLY".to_string()),
            Some(false) => modes.push("READ WRITE".to_string()),
            None => {}
        }
        match self.deferrable {
            Some(true) => modes.push("DEFERRABLE".to_string()),
            Some(false) => modes.push("NOT DEFERRABLE".to_string()),
            None => {}
        }
        if modes.is_empty() {
            "BEGIN".to_string()
        } else {
            format!("BEGIN {}", modes.join(", "))
        }
    }
}

pub struct TransactionCoordinator<'a> {
    sessions: &'a SessionStore,
    registry: &'a TypeRegistry,
}

impl<'a> TransactionCoordinator<'a> {
    pub fn new(sessions: &'a SessionStore, registry: &'a TypeRegistry) -> Self {
        TransactionCoordinator { sessions, registry }
    }

    fn advance(&self, phase: &mut Phase, next: Phase, session: &Session) {
        debug!(target: "tx", session = %session.id, from = %phase, to = %next, "phase");
        *phase = next;
    }

    /// Run every statement in one transaction. Results come back in input
    /// order; the first failure rolls the whole batch back and is returned
    /// annotated with its position.
    pub async fn run_batch<C: SqlConnection>(
        &self,
        conn: &mut C,
        session: &Session,
        statements: &[Statement],
        options: &TxOptions,
    ) -> AppResult<Vec<QueryResult>> {
        let mut phase = Phase::Idle;
        let begin = options.begin_command();
        conn.command(&begin).await.map_err(AppError::database)?;
        self.advance(&mut phase, Phase::Began, session);
        info!(target: "tx", session = %session.id, statements = statements.len(), begin = %begin, "batch started");

        let mut ctx = TransactionContext::new();
        let mut results = Vec::with_capacity(statements.len());
        for (index, statement) in statements.iter().enumerate() {
            match self.step(conn, &mut ctx, session, statement, &mut phase).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    let err = err.at_statement(index, &statement.text);
                    return Err(self.rollback(conn, &mut phase, session, err).await);
                }
            }
        }

        if let Err(diag) = conn.command("COMMIT").await {
            return Err(self.rollback(conn, &mut phase, session, AppError::database(diag)).await);
        }
        self.advance(&mut phase, Phase::Committed, session);
        info!(target: "tx", session = %session.id, statements = results.len(), "batch committed");
        Ok(results)
    }

    /// One statement in autocommit mode with a throwaway transaction context.
    pub async fn run_single<C: SqlConnection>(
        &self,
        conn: &mut C,
        session: &Session,
        statement: &Statement,
    ) -> AppResult<QueryResult> {
        let mut phase = Phase::Idle;
        let mut ctx = TransactionContext::new();
        let result = self.step(conn, &mut ctx, session, statement, &mut phase).await?;
        self.advance(&mut phase, Phase::Idle, session);
        Ok(result)
    }

    async fn step<C: SqlConnection>(
        &self,
        conn: &mut C,
        ctx: &mut TransactionContext,
        session: &Session,
        statement: &Statement,
        phase: &mut Phase,
    ) -> AppResult<QueryResult> {
        self.advance(phase, Phase::Resolving, session);
        let resolved = resolver::resolve(conn, statement, ctx, session).await?;

        self.advance(phase, Phase::Executing, session);
        let result = conn.execute(&resolved.text, &resolved.params).await.map_err(AppError::database)?;

        self.advance(phase, Phase::Capturing, session);
        self.capture(&resolved.text, &result, ctx, session);
        Ok(result)
    }

    /// Keep the first returned row of a write so later statements (and later
    /// requests from the same caller) can refer to it.
    fn capture(&self, sql: &str, result: &QueryResult, ctx: &mut TransactionContext, session: &Session) {
        let toks = tokenize(sql);
        if !has_returning(sql, &toks) {
            return;
        }
        let Some(target) = write_target(sql, &toks) else { return };
        let Some(first) = result.rows.first() else { return };

        let single = QueryResult {
            command: result.command.clone(),
            fields: result.fields.clone(),
            row_count: 1,
            rows: vec![first.clone()],
        };
        let projection = project(&single, self.registry, RowShape::Keyed);
        let Some(Value::Object(row)) = projection.rows.into_iter().next() else { return };

        ctx.capture(&target.table, &row);
        if !self.sessions.capture(&session.id, &target.table, &row) {
            debug!(target: "tx", session = %session.id, table = %target.table, "session gone; capture kept for this batch only");
        }
        info!(target: "tx", session = %session.id, table = %target.table, columns = row.len(), "returned row captured");
    }

    /// Best-effort rollback. A failed rollback is attached to `err` and never replaces it.
    async fn rollback<C: SqlConnection>(&self, conn: &mut C, phase: &mut Phase, session: &Session, err: AppError) -> AppError {
        warn!(target: "tx", session = %session.id, error = %err, "batch failed; rolling back");
        let err = match conn.command("ROLLBACK").await {
            Ok(()) => err,
            Err(diag) => {
                error!(target: "tx", session = %session.id, error = %diag.message, "rollback failed");
                err.with_rollback_error(diag.message)
            }
        };
        self.advance(phase, Phase::RolledBack, session);
        err
    }
}
