//! Type identifiers assigned by the database catalog (`pg_type.oid`) and the
//! array-type to element-type mapping.

pub const BOOL: i32 = 16;
pub const BYTEA: i32 = 17;
pub const CHAR: i32 = 18;
pub const NAME: i32 = 19;
pub const INT8: i32 = 20;
pub const INT2: i32 = 21;
pub const INT4: i32 = 23;
pub const TEXT: i32 = 25;
pub const OID: i32 = 26;
pub const JSON: i32 = 114;
pub const XML: i32 = 142;
pub const FLOAT4: i32 = 700;
pub const FLOAT8: i32 = 701;
pub const UNKNOWN: i32 = 705;
pub const BPCHAR: i32 = 1042;
pub const VARCHAR: i32 = 1043;
pub const DATE: i32 = 1082;
pub const TIME: i32 = 1083;
pub const TIMESTAMP: i32 = 1114;
pub const TIMESTAMPTZ: i32 = 1184;
pub const INTERVAL: i32 = 1186;
pub const NUMERIC: i32 = 1700;
pub const UUID: i32 = 2950;
pub const JSONB: i32 = 3802;

/// Array type id -> element type id. Array ids are not contiguous, so the
/// table is the source of truth for "is this an array type".
const ARRAY_ELEMENTS: &[(i32, i32)] = &[
    (199, JSON),
    (143, XML),
    (1000, BOOL),
    (1001, BYTEA),
    (1002, CHAR),
    (1003, NAME),
    (1005, INT2),
    (1007, INT4),
    (1009, TEXT),
    (1014, BPCHAR),
    (1015, VARCHAR),
    (1016, INT8),
    (1021, FLOAT4),
    (1022, FLOAT8),
    (1028, OID),
    (1115, TIMESTAMP),
    (1182, DATE),
    (1183, TIME),
    (1185, TIMESTAMPTZ),
    (1187, INTERVAL),
    (1231, NUMERIC),
    (2951, UUID),
    (3807, JSONB),
];

#[inline]
pub fn is_array_oid(oid: i32) -> bool {
    array_elem_oid(oid).is_some()
}

#[inline]
pub fn array_elem_oid(array_oid: i32) -> Option<i32> {
    ARRAY_ELEMENTS.iter().find(|(a, _)| *a == array_oid).map(|(_, e)| *e)
}
