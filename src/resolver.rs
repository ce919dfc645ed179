//! Dependency resolution for statements that leave a reference column to the
//! database (`VALUES (DEFAULT, ...)`) while the caller really means "the row I
//! just created".
//!
//! For each `DEFAULT` marker sitting in a foreign-key-like column of an
//! INSERT, a previously captured value is looked up (transaction scope first,
//! then session scope). A hit is appended to the parameter list and the marker
//! is replaced by a placeholder pointing at it. A miss leaves the statement
//! alone so the database applies its own default or constraint.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use serde_json::Value;
use tracing::{debug, info};

use crate::db::{ColumnMetadata, SqlConnection};
use crate::error::AppResult;
use crate::session::{capture_key, Session};

pub mod tokenizer;
pub mod statement;
pub mod context;

pub use context::TransactionContext;
pub use statement::{has_returning, parse_insert, write_target, InsertShape, TableRef, ValueSlot};

/// Statement text plus positional parameters. Resolution returns a new value
/// and never mutates its input.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new<S: Into<String>>(text: S, params: Vec<Value>) -> Self {
        Statement { text: text.into(), params }
    }
}

impl From<crate::wire::BatchStatement> for Statement {
    fn from(s: crate::wire::BatchStatement) -> Self {
        Statement { text: s.query, params: s.params }
    }
}

/// Where a substituted value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureScope {
    Transaction,
    Session,
}

/// Rewrite `statement` if it omits reference values that were captured
/// earlier. Existing parameters are never removed or reordered.
pub async fn resolve<C: SqlConnection>(
    conn: &mut C,
    statement: &Statement,
    ctx: &mut TransactionContext,
    session: &Session,
) -> AppResult<Statement> {
    let toks = tokenizer::tokenize(&statement.text);
    let Some(shape) = parse_insert(&statement.text, &toks) else {
        return Ok(statement.clone());
    };
    if !shape.has_marker() {
        return Ok(statement.clone());
    }

    let metadata = ctx.table_metadata(conn, shape.target.schema.as_deref(), &shape.target.table).await?;
    let columns: Vec<String> = match &shape.columns {
        Some(cols) => cols.clone(),
        None => metadata.iter().map(|m| m.name.clone()).collect(),
    };

    let mut params = statement.params.clone();
    // column position -> placeholder number, shared by every row of a multi-row VALUES
    let mut assigned: HashMap<usize, usize> = HashMap::new();
    let mut unresolved: HashSet<usize> = HashSet::new();
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();

    for row in &shape.rows {
        for (pos, slot) in row.iter().enumerate() {
            if !slot.is_marker || unresolved.contains(&pos) {
                continue;
            }
            let Some(column) = columns.get(pos) else { continue };
            let meta = metadata.iter().find(|m| m.name.eq_ignore_ascii_case(column));
            if !is_reference_column(column, meta) {
                continue;
            }
            let placeholder = match assigned.get(&pos) {
                Some(n) => *n,
                None => match find_replacement(column, meta, ctx, session) {
                    Some((value, key, scope)) => {
                        params.push(value);
                        let n = params.len();
                        info!(
                            target: "resolver",
                            table = %shape.target.table, column = %column, placeholder = n, source = %key, scope = ?scope,
                            "omitted value resolved"
                        );
                        assigned.insert(pos, n);
                        n
                    }
                    None => {
                        debug!(target: "resolver", table = %shape.target.table, column = %column, "no captured value; left to the database");
                        unresolved.insert(pos);
                        continue;
                    }
                },
            };
            edits.push((slot.span.clone(), format!("${}", placeholder)));
        }
    }

    if edits.is_empty() {
        return Ok(statement.clone());
    }
    Ok(Statement { text: apply_edits(&statement.text, edits), params })
}

fn apply_edits(src: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
    let mut out = src.to_string();
    for (span, text) in edits {
        out.replace_range(span, &text);
    }
    out
}

/// A column is a candidate when the catalog says it references another
/// table, or its name follows the `<thing>_id` / `<thing>Id` convention.
pub fn is_reference_column(column: &str, meta: Option<&ColumnMetadata>) -> bool {
    meta.map(|m| m.referenced_table.is_some()).unwrap_or(false) || split_reference_name(column).is_some()
}

/// `user_id` -> ("user", "id"); `authorId` -> ("author", "id").
pub fn split_reference_name(column: &str) -> Option<(String, String)> {
    if let Some((prefix, suffix)) = column.rsplit_once('_') {
        if !prefix.is_empty() && suffix.eq_ignore_ascii_case("id") {
            return Some((prefix.to_lowercase(), suffix.to_lowercase()));
        }
        return None;
    }
    let prefix = column.strip_suffix("Id")?;
    if prefix.is_empty() || !prefix.chars().last().map(|c| c.is_lowercase() || c.is_ascii_digit()).unwrap_or(false) {
        return None;
    }
    Some((prefix.to_lowercase(), "id".to_string()))
}

/// How well a captured table name matches a reference prefix; lower is better.
fn candidate_rank(table: &str, prefix: &str) -> Option<u8> {
    if table == prefix {
        Some(0)
    } else if table.strip_prefix(prefix).map(|rest| rest == "s" || rest == "es").unwrap_or(false) {
        Some(1)
    } else if table.contains(prefix) {
        Some(2)
    } else {
        None
    }
}

fn find_replacement(
    column: &str,
    meta: Option<&ColumnMetadata>,
    ctx: &TransactionContext,
    session: &Session,
) -> Option<(Value, String, CaptureScope)> {
    let exact = meta.and_then(|m| {
        m.referenced_table.as_ref().map(|t| {
            let c = m.referenced_column.as_deref().unwrap_or("id");
            (t.to_lowercase(), c.to_lowercase())
        })
    });
    let derived = split_reference_name(column);

    if let Some((t, c)) = &exact {
        if let Some(v) = ctx.captured(t, c) {
            return Some((v.clone(), capture_key(t, c), CaptureScope::Transaction));
        }
    }
    if let Some((prefix, c)) = &derived {
        let best = ctx
            .tables_by_recency()
            .filter(|t| ctx.captured(t, c).is_some())
            .filter_map(|t| candidate_rank(t, prefix).map(|r| (r, t)))
            // min_by_key keeps the first of equal ranks, i.e. the most recent
            .min_by_key(|(r, _)| *r);
        if let Some((_, t)) = best {
            if let Some(v) = ctx.captured(t, c) {
                return Some((v.clone(), capture_key(t, c), CaptureScope::Transaction));
            }
        }
    }

    if let Some((t, c)) = &exact {
        let key = capture_key(t, c);
        if let Some(v) = session.captured.get(&key) {
            return Some((v.clone(), key, CaptureScope::Session));
        }
    }
    if let Some((prefix, c)) = &derived {
        let best = session
            .captured
            .iter()
            .filter_map(|(key, v)| {
                let (t, col) = key.rsplit_once('.')?;
                if col != c.as_str() { return None; }
                candidate_rank(t, prefix).map(|r| (r, t.len(), key.clone(), v))
            })
            .min_by(|a, b| (a.0, a.1, &a.2).cmp(&(b.0, b.1, &b.2)));
        if let Some((_, _, key, v)) = best {
            return Some((v.clone(), key, CaptureScope::Session));
        }
    }
    None
}
