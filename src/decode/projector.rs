use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::registry::{Decoder, TypeRegistry};
use crate::wire::QueryResult;

/// Output row representation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowShape {
    /// One JSON object per row keyed by column name.
    #[default]
    Keyed,
    /// One JSON array per row in column ordinal order.
    Positional,
}

impl RowShape {
    /// `array` selects positional rows; anything else is keyed.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "array" || v == "positional" => RowShape::Positional,
            _ => RowShape::Keyed,
        }
    }
}

/// A cell whose text could not be decoded; the cell keeps its raw text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellDecodeError {
    pub row: usize,
    pub column: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub rows: Vec<Value>,
    pub decode_errors: Vec<CellDecodeError>,
}

/// Decode every column of a raw result and lay rows out in `shape`.
///
/// Rows that are not positional arrays of the expected width (for instance
/// rows the driver already decoded) are passed through untouched, as are
/// cells that are already structured values.
pub fn project(raw: &QueryResult, registry: &TypeRegistry, shape: RowShape) -> Projection {
    let order = ordinal_order(raw);
    let decoders: Vec<Decoder> = raw.fields.iter().map(|c| registry.descriptor(c.type_id).decoder).collect();

    let mut out = Projection { rows: Vec::with_capacity(raw.rows.len()), decode_errors: Vec::new() };
    for (row_idx, row) in raw.rows.iter().enumerate() {
        let cells = match row {
            Value::Array(cells) if cells.len() == raw.fields.len() => cells,
            other => {
                out.rows.push(other.clone());
                continue;
            }
        };
        let mut decoded: Vec<(usize, Value)> = Vec::with_capacity(cells.len());
        for &i in &order {
            let value = match &cells[i] {
                Value::String(text) => match registry.decode_with(decoders[i], text) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(target: "decode", row = row_idx, column = %raw.fields[i].name, "cell decode failed: {}", e);
                        out.decode_errors.push(CellDecodeError {
                            row: row_idx,
                            column: raw.fields[i].name.clone(),
                            message: e.to_string(),
                        });
                        Value::String(text.clone())
                    }
                },
                other => other.clone(),
            };
            decoded.push((i, value));
        }
        out.rows.push(lay_out(raw, decoded, shape));
    }
    out
}

/// Lay raw text rows out in `shape` without decoding any cell.
pub fn shape_raw(raw: &QueryResult, shape: RowShape) -> Vec<Value> {
    let order = ordinal_order(raw);
    raw.rows
        .iter()
        .map(|row| match row {
            Value::Array(cells) if cells.len() == raw.fields.len() => {
                lay_out(raw, order.iter().map(|&i| (i, cells[i].clone())).collect(), shape)
            }
            other => other.clone(),
        })
        .collect()
}

fn ordinal_order(raw: &QueryResult) -> Vec<usize> {
    let mut order: Vec<usize> = (0..raw.fields.len()).collect();
    order.sort_by_key(|&i| raw.fields[i].ordinal);
    order
}

fn lay_out(raw: &QueryResult, cells: Vec<(usize, Value)>, shape: RowShape) -> Value {
    match shape {
        RowShape::Positional => Value::Array(cells.into_iter().map(|(_, v)| v).collect()),
        RowShape::Keyed => {
            let mut obj = Map::with_capacity(cells.len());
            for (i, v) in cells {
                obj.insert(raw.fields[i].name.clone(), v);
            }
            Value::Object(obj)
        }
    }
}
