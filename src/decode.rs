//! Client-side reconstruction of typed values from the proxy's raw text rows.
//!
//! - `oids`: type identifiers and the array element mapping
//! - `registry`: type id -> decoder dispatch with an identity fallback
//! - `array_text`: recursive parser for `{...}` array text
//! - `projector`: per-column decoding into positional or keyed rows
//!
//! Everything here is pure and needs no synchronization.

pub mod oids;
pub mod registry;
pub mod array_text;
pub mod projector;

pub use projector::{project, shape_raw, CellDecodeError, Projection, RowShape};
pub use registry::{DecodeFn, Decoder, ScalarKind, TypeDescriptor, TypeRegistry};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("array text must start with '{{' and end with '}}': {0:?}")]
    NotBraced(String),
    #[error("unbalanced braces in array text: {0:?}")]
    Unbalanced(String),
    #[error("unterminated or malformed quoted element in array text: {0:?}")]
    UnterminatedQuote(String),
    #[error("invalid {type_name} text: {text:?}")]
    Scalar { type_name: &'static str, text: String },
}

pub type DecodeResult<T> = Result<T, DecodeError>;
