//! Unified application error model and mapping helpers.
//! One enum is shared by the HTTP frontend, the transaction coordinator and the
//! decoder, with helpers mapping it onto HTTP statuses and JSON bodies.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Full diagnostic field set reported by the database for a failed statement.
/// Field names follow the conventional camelCase wire spelling so the body can
/// be handed to clients unmodified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbDiagnostic {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_query: Option<String>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routine: Option<String>,
}

impl DbDiagnostic {
    /// Diagnostic for failures that never reached the server (connection loss, encoding).
    pub fn message_only<S: Into<String>>(msg: S) -> Self {
        DbDiagnostic { message: msg.into(), ..Default::default() }
    }
}

impl From<tokio_postgres::Error> for DbDiagnostic {
    fn from(err: tokio_postgres::Error) -> Self {
        let Some(db) = err.as_db_error() else {
            return DbDiagnostic::message_only(err.to_string());
        };
        let (position, internal_position, internal_query) = match db.position() {
            Some(tokio_postgres::error::ErrorPosition::Original(p)) => (Some(*p), None, None),
            Some(tokio_postgres::error::ErrorPosition::Internal { position, query }) => {
                (None, Some(*position), Some(query.clone()))
            }
            None => (None, None, None),
        };
        DbDiagnostic {
            message: db.message().to_string(),
            severity: Some(db.severity().to_string()),
            code: Some(db.code().code().to_string()),
            detail: db.detail().map(str::to_string),
            hint: db.hint().map(str::to_string),
            position,
            internal_position,
            internal_query,
            where_: db.where_().map(str::to_string),
            schema: db.schema().map(str::to_string),
            table: db.table().map(str::to_string),
            column: db.column().map(str::to_string),
            data_type: db.datatype().map(str::to_string),
            constraint: db.constraint().map(str::to_string),
            file: db.file().map(str::to_string),
            line: db.line(),
            routine: db.routine().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    Decode { code: String, message: String },
    Database {
        diagnostic: Box<DbDiagnostic>,
        statement_index: Option<usize>,
        query: Option<String>,
        rollback_error: Option<String>,
    },
    /// The database could not be reached at all.
    Connect { diagnostic: Box<DbDiagnostic> },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Decode { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
            AppError::Database { diagnostic, .. } => diagnostic.code.as_deref().unwrap_or("db_error"),
            AppError::Connect { diagnostic } => diagnostic.code.as_deref().unwrap_or("connection_failed"),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Decode { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
            AppError::Database { diagnostic, .. } | AppError::Connect { diagnostic } => diagnostic.message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn decode<S: Into<String>>(code: S, msg: S) -> Self { AppError::Decode { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    pub fn database(diagnostic: DbDiagnostic) -> Self {
        AppError::Database { diagnostic: Box::new(diagnostic), statement_index: None, query: None, rollback_error: None }
    }

    pub fn connect(diagnostic: DbDiagnostic) -> Self {
        AppError::Connect { diagnostic: Box::new(diagnostic) }
    }

    /// Attach the failing statement's position in a batch and its text.
    pub fn at_statement(self, index: usize, text: &str) -> Self {
        match self {
            AppError::Database { diagnostic, rollback_error, .. } => AppError::Database {
                diagnostic,
                statement_index: Some(index),
                query: Some(text.to_string()),
                rollback_error,
            },
            other => other,
        }
    }

    /// Record a failed rollback as a secondary fact; the primary error is kept.
    pub fn with_rollback_error(self, err: String) -> Self {
        match self {
            AppError::Database { diagnostic, statement_index, query, .. } => AppError::Database {
                diagnostic,
                statement_index,
                query,
                rollback_error: Some(err),
            },
            other => other,
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Decode { .. } => 502,
            AppError::Database { .. } => 400,
            AppError::Connect { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }

    /// JSON error body. Database failures pass their diagnostic fields through
    /// unmodified, annotated with the batch position when known.
    pub fn to_body(&self) -> serde_json::Value {
        match self {
            AppError::Database { diagnostic, statement_index, query, rollback_error } => {
                let mut body = serde_json::to_value(diagnostic.as_ref())
                    .unwrap_or_else(|_| serde_json::json!({ "message": diagnostic.message }));
                if let Some(obj) = body.as_object_mut() {
                    if let Some(i) = statement_index { obj.insert("statementIndex".into(), serde_json::json!(i)); }
                    if let Some(q) = query { obj.insert("query".into(), serde_json::json!(q)); }
                    if let Some(r) = rollback_error { obj.insert("rollbackError".into(), serde_json::json!(r)); }
                }
                body
            }
            AppError::Connect { diagnostic } => {
                let mut body = serde_json::to_value(diagnostic.as_ref())
                    .unwrap_or_else(|_| serde_json::json!({ "message": diagnostic.message }));
                if let Some(obj) = body.as_object_mut() {
                    obj.entry("code").or_insert_with(|| serde_json::json!("connection_failed"));
                }
                body
            }
            other => serde_json::json!({ "code": other.code_str(), "message": other.message() }),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Database { statement_index: Some(i), .. } => {
                write!(f, "{}: {} (statement {})", self.code_str(), self.message(), i)
            }
            _ => write!(f, "{}: {}", self.code_str(), self.message()),
        }
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(err: tokio_postgres::Error) -> Self {
        AppError::database(DbDiagnostic::from(err))
    }
}

impl From<crate::decode::DecodeError> for AppError {
    fn from(err: crate::decode::DecodeError) -> Self {
        AppError::Decode { code: "decode_error".into(), message: err.to_string() }
    }
}
