//! Parser for the database's bracketed array text output, e.g. `{1,2,3}`,
//! `{{1,2},{3,4}}` or `{a,"b,c",NULL}`.
//!
//! Items are split on top-level commas while tracking brace depth and quote
//! state; nested braces recurse with the same element decoder. Unquoted `NULL`
//! and empty items become JSON null and never reach the element decoder.

use serde_json::Value;

use super::{DecodeError, DecodeResult};

/// Element decoder applied to every non-null leaf.
pub type ElementFn<'a> = dyn Fn(&str) -> DecodeResult<Value> + 'a;

/// Decode array text into a (possibly nested) JSON array.
pub fn parse(text: &str, element: &ElementFn<'_>) -> DecodeResult<Value> {
    let body = strip_dimensions(text.trim());
    if body.len() < 2 || !body.starts_with('{') || !body.ends_with('}') {
        return Err(DecodeError::NotBraced(text.to_string()));
    }
    let items = split_items(&body[1..body.len() - 1], text)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(decode_item(item, element)?);
    }
    Ok(Value::Array(out))
}

/// Skip an optional `[lo:hi]...=` dimension decoration emitted for arrays
/// with non-default lower bounds.
fn strip_dimensions(text: &str) -> &str {
    if text.starts_with('[') {
        if let Some(eq) = text.find('=') {
            return text[eq + 1..].trim_start();
        }
    }
    text
}

fn split_items<'a>(inner: &'a str, source: &str) -> DecodeResult<Vec<&'a str>> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut items = Vec::new();
    let mut depth: i32 = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0usize;
    for (i, ch) in inner.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            '{' if !in_quotes => depth += 1,
            '}' if !in_quotes => {
                depth -= 1;
                if depth < 0 {
                    return Err(DecodeError::Unbalanced(source.to_string()));
                }
            }
            ',' if !in_quotes && depth == 0 => {
                items.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if in_quotes || escaped {
        return Err(DecodeError::UnterminatedQuote(source.to_string()));
    }
    if depth != 0 {
        return Err(DecodeError::Unbalanced(source.to_string()));
    }
    items.push(&inner[start..]);
    Ok(items)
}

fn decode_item(raw: &str, element: &ElementFn<'_>) -> DecodeResult<Value> {
    let item = raw.trim();
    if item.starts_with('{') {
        return parse(item, element);
    }
    if let Some(quoted) = item.strip_prefix('"') {
        let Some(content) = quoted.strip_suffix('"') else {
            return Err(DecodeError::UnterminatedQuote(item.to_string()));
        };
        let unescaped = unescape(content).ok_or_else(|| DecodeError::UnterminatedQuote(item.to_string()))?;
        return element(&unescaped);
    }
    if item.is_empty() || item.eq_ignore_ascii_case("NULL") {
        return Ok(Value::Null);
    }
    element(item)
}

/// Remove backslash escapes from quoted content. Returns None when an
/// unescaped quote appears inside, which means the item was not one token.
fn unescape(content: &str) -> Option<String> {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push(chars.next()?),
            '"' => return None,
            c => out.push(c),
        }
    }
    Some(out)
}
