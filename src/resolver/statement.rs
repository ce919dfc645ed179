//! Structural facts pulled from statement tokens: the INSERT target, its
//! column list and value-list slots, and the write target of statements with
//! a RETURNING clause.

use std::ops::Range;

use super::tokenizer::{Cursor, TKind, Tok};

/// Target relation; `table` is the unqualified (case-folded unless quoted) name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub table: String,
}

/// One expression position inside a VALUES tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSlot {
    pub span: Range<usize>,
    /// The whole expression is the bare `DEFAULT` keyword.
    pub is_marker: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertShape {
    pub target: TableRef,
    /// None when the statement omits the column list.
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<ValueSlot>>,
}

impl InsertShape {
    pub fn has_marker(&self) -> bool {
        self.rows.iter().flatten().any(|s| s.is_marker)
    }
}

const MARKER: &str = "DEFAULT";

fn table_ref(cur: &mut Cursor<'_>) -> Option<TableRef> {
    let mut parts = vec![cur.ident()?];
    while cur.eat(&TKind::Dot) {
        parts.push(cur.ident()?);
    }
    let table = parts.pop()?;
    // db.schema.table keeps only the schema
    let schema = parts.pop();
    Some(TableRef { schema, table })
}

/// `INSERT INTO [schema.]table [AS alias] [(cols)] [OVERRIDING ... VALUE] VALUES (..)[, (..)]`
pub fn parse_insert(src: &str, toks: &[Tok]) -> Option<InsertShape> {
    let mut cur = Cursor::new(src, toks);
    if !(cur.eat_keyword("INSERT") && cur.eat_keyword("INTO")) {
        return None;
    }
    let target = table_ref(&mut cur)?;
    if cur.eat_keyword("AS") {
        cur.ident()?;
    }
    let columns = if cur.eat(&TKind::LParen) {
        let mut cols = Vec::new();
        loop {
            cols.push(cur.ident()?);
            if cur.eat(&TKind::Comma) { continue; }
            if cur.eat(&TKind::RParen) { break; }
            return None;
        }
        Some(cols)
    } else {
        None
    };
    if cur.eat_keyword("OVERRIDING") {
        // SYSTEM VALUE | USER VALUE
        cur.next()?;
        cur.eat_keyword("VALUE");
    }
    if !cur.eat_keyword("VALUES") {
        return None;
    }
    let mut rows = Vec::new();
    loop {
        if !cur.eat(&TKind::LParen) {
            return None;
        }
        rows.push(value_tuple(src, &mut cur)?);
        if !cur.eat(&TKind::Comma) { break; }
    }
    Some(InsertShape { target, columns, rows })
}

/// Read slots up to the tuple's closing paren (the opening one is consumed).
fn value_tuple(src: &str, cur: &mut Cursor<'_>) -> Option<Vec<ValueSlot>> {
    let mut slots = Vec::new();
    let mut depth = 0usize;
    let mut current: Vec<&Tok> = Vec::new();
    loop {
        let tok = cur.next()?;
        match tok.kind {
            TKind::LParen => depth += 1,
            TKind::RParen if depth == 0 => {
                slots.push(make_slot(src, &current)?);
                return Some(slots);
            }
            TKind::RParen => depth -= 1,
            TKind::Comma if depth == 0 => {
                slots.push(make_slot(src, &current)?);
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(tok);
    }
}

fn make_slot(src: &str, toks: &[&Tok]) -> Option<ValueSlot> {
    let first = toks.first()?;
    let last = toks.last()?;
    Some(ValueSlot {
        span: first.span.start..last.span.end,
        is_marker: toks.len() == 1 && first.is_keyword(src, MARKER),
    })
}

/// Relation written by an INSERT, UPDATE or DELETE statement.
pub fn write_target(src: &str, toks: &[Tok]) -> Option<TableRef> {
    let mut cur = Cursor::new(src, toks);
    if cur.eat_keyword("INSERT") {
        if !cur.eat_keyword("INTO") { return None; }
    } else if cur.eat_keyword("UPDATE") {
        cur.eat_keyword("ONLY");
    } else if cur.eat_keyword("DELETE") {
        if !cur.eat_keyword("FROM") { return None; }
        cur.eat_keyword("ONLY");
    } else {
        return None;
    }
    table_ref(&mut cur)
}

/// True when a RETURNING clause appears outside any parentheses.
pub fn has_returning(src: &str, toks: &[Tok]) -> bool {
    let mut depth = 0i32;
    for t in toks {
        match t.kind {
            TKind::LParen => depth += 1,
            TKind::RParen => depth -= 1,
            _ if depth == 0 && t.is_keyword(src, "RETURNING") => return true,
            _ => {}
        }
    }
    false
}
