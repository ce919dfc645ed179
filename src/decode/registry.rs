use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

use super::oids;
use super::{array_text, DecodeError, DecodeResult};

/// Caller-supplied decoder for one type id.
pub type DecodeFn = fn(&str) -> DecodeResult<Value>;

/// Largest integer a JSON consumer can hold without losing precision (2^53 - 1).
const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// Built-in decoding behaviours. Several type ids share one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Integer,
    BigInt,
    Float,
    Json,
    TimestampTz,
    /// Text-like and precision-sensitive types (numeric, uuid, dates, bytea…) stay as text.
    Text,
}

impl ScalarKind {
    pub fn from_oid(oid: i32) -> Option<Self> {
        let kind = match oid {
            oids::BOOL => ScalarKind::Bool,
            oids::INT2 | oids::INT4 | oids::OID => ScalarKind::Integer,
            oids::INT8 => ScalarKind::BigInt,
            oids::FLOAT4 | oids::FLOAT8 => ScalarKind::Float,
            oids::JSON | oids::JSONB => ScalarKind::Json,
            oids::TIMESTAMPTZ => ScalarKind::TimestampTz,
            oids::TEXT | oids::VARCHAR | oids::BPCHAR | oids::NAME | oids::CHAR | oids::XML | oids::UNKNOWN
            | oids::NUMERIC | oids::UUID | oids::DATE | oids::TIME | oids::TIMESTAMP | oids::INTERVAL
            | oids::BYTEA => ScalarKind::Text,
            _ => return None,
        };
        Some(kind)
    }

    pub fn decode(self, text: &str) -> DecodeResult<Value> {
        match self {
            ScalarKind::Bool => match text {
                "t" | "true" | "TRUE" => Ok(Value::Bool(true)),
                "f" | "false" | "FALSE" => Ok(Value::Bool(false)),
                _ => Err(scalar_err("bool", text)),
            },
            ScalarKind::Integer => text
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| scalar_err("integer", text)),
            ScalarKind::BigInt => {
                let v = text.trim().parse::<i64>().map_err(|_| scalar_err("bigint", text))?;
                if v.abs() <= MAX_SAFE_INTEGER { Ok(Value::from(v)) } else { Ok(Value::String(text.to_string())) }
            }
            ScalarKind::Float => {
                let v = text.trim().parse::<f64>().map_err(|_| scalar_err("float", text))?;
                // NaN and the infinities have no JSON number form
                Ok(Number::from_f64(v).map(Value::Number).unwrap_or_else(|| Value::String(text.to_string())))
            }
            ScalarKind::Json => serde_json::from_str(text).map_err(|_| scalar_err("json", text)),
            ScalarKind::TimestampTz => Ok(Value::String(normalize_timestamptz(text))),
            ScalarKind::Text => Ok(Value::String(text.to_string())),
        }
    }
}

fn scalar_err(type_name: &'static str, text: &str) -> DecodeError {
    DecodeError::Scalar { type_name, text: text.to_string() }
}

/// Database text like `2024-01-02 03:04:05.5+02` becomes RFC 3339 in UTC.
/// Values chrono cannot represent (`infinity`, BC dates) are kept verbatim.
fn normalize_timestamptz(text: &str) -> String {
    DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .unwrap_or_else(|_| text.to_string())
}

/// How values of one type id are decoded.
#[derive(Clone, Copy)]
pub enum Decoder {
    Scalar(ScalarKind),
    Custom(DecodeFn),
    Array { element_oid: i32 },
    /// Unknown type ids return their raw text unchanged.
    Identity,
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decoder::Scalar(k) => write!(f, "Scalar({:?})", k),
            Decoder::Custom(_) => write!(f, "Custom"),
            Decoder::Array { element_oid } => write!(f, "Array({})", element_oid),
            Decoder::Identity => write!(f, "Identity"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TypeDescriptor {
    pub id: i32,
    pub decoder: Decoder,
}

/// Maps type ids to decoders. Built-ins are resolved through [`ScalarKind`];
/// array descriptors are derived on demand from the element mapping.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    overrides: HashMap<i32, DecodeFn>,
}

impl TypeRegistry {
    pub fn new() -> Self { Self::default() }

    /// Replace the decoder for one type id. Overrides win over built-ins and
    /// over array derivation.
    pub fn register(&mut self, oid: i32, decode: DecodeFn) {
        self.overrides.insert(oid, decode);
    }

    pub fn descriptor(&self, oid: i32) -> TypeDescriptor {
        let decoder = if let Some(f) = self.overrides.get(&oid) {
            Decoder::Custom(*f)
        } else if let Some(element_oid) = oids::array_elem_oid(oid) {
            Decoder::Array { element_oid }
        } else if let Some(kind) = ScalarKind::from_oid(oid) {
            Decoder::Scalar(kind)
        } else {
            Decoder::Identity
        };
        TypeDescriptor { id: oid, decoder }
    }

    pub fn decode(&self, oid: i32, raw: &str) -> DecodeResult<Value> {
        self.decode_with(self.descriptor(oid).decoder, raw)
    }

    pub fn decode_with(&self, decoder: Decoder, raw: &str) -> DecodeResult<Value> {
        match decoder {
            Decoder::Scalar(kind) => kind.decode(raw),
            Decoder::Custom(f) => f(raw),
            Decoder::Array { element_oid } => {
                let element = self.descriptor(element_oid).decoder;
                array_text::parse(raw, &|item| self.decode_with(element, item))
            }
            Decoder::Identity => Ok(Value::String(raw.to_string())),
        }
    }
}
