//! Request and response shapes exchanged between the proxy and its clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result column as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    pub type_id: i32,
    #[serde(default)]
    pub ordinal: usize,
}

/// Raw statement result. `rows` holds one positional array per row whose
/// cells are the database's text output (or null).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub command: String,
    pub fields: Vec<Column>,
    pub row_count: u64,
    pub rows: Vec<Value>,
}

/// `all` returns every row; `single` returns only the first (or null).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    #[default]
    All,
    Single,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub method: FetchMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatement {
    pub query: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferrable: Option<bool>,
}

impl BatchOptions {
    /// Field-wise merge; values set on `self` win over `fallback`.
    pub fn or(self, fallback: BatchOptions) -> BatchOptions {
        BatchOptions {
            isolation_level: self.isolation_level.or(fallback.isolation_level),
            read_only: self.read_only.or(fallback.read_only),
            deferrable: self.deferrable.or(fallback.deferrable),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub queries: Vec<BatchStatement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BatchOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse<T> {
    pub results: Vec<T>,
}

/// Request headers understood by the proxy.
pub mod headers {
    pub const SESSION_ID: &str = "x-session-id";
    pub const ROW_MODE: &str = "x-row-mode";
    pub const RAW_TEXT: &str = "x-raw-text";
    pub const RESULT_MODE: &str = "x-result-mode";
    pub const ISOLATION_LEVEL: &str = "x-isolation-level";
    pub const READ_ONLY: &str = "x-read-only";
    pub const DEFERRABLE: &str = "x-deferrable";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_request_defaults() {
        let req: QueryRequest = serde_json::from_str(r#"{"query":"select 1"}"#).unwrap();
        assert!(req.params.is_empty());
        assert_eq!(req.method, FetchMethod::All);
        let req: QueryRequest = serde_json::from_str(r#"{"query":"select 1","params":[1],"method":"single"}"#).unwrap();
        assert_eq!(req.method, FetchMethod::Single);
    }

    #[test]
    fn batch_options_are_camel_case() {
        let req: BatchRequest = serde_json::from_str(
            r#"{"queries":[{"query":"select 1"}],"options":{"isolationLevel":"serializable","readOnly":true}}"#,
        )
        .unwrap();
        let opts = req.options.unwrap();
        assert_eq!(opts.isolation_level.as_deref(), Some("serializable"));
        assert_eq!(opts.read_only, Some(true));
        assert_eq!(opts.deferrable, None);
    }

    #[test]
    fn body_options_win_over_fallback() {
        let body = BatchOptions { read_only: Some(false), ..Default::default() };
        let headers = BatchOptions { isolation_level: Some("serializable".into()), read_only: Some(true), deferrable: None };
        let merged = body.or(headers);
        assert_eq!(merged.read_only, Some(false));
        assert_eq!(merged.isolation_level.as_deref(), Some("serializable"));
    }
}
