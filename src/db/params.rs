//! JSON request parameters bound to statement parameters.
//!
//! Parameter types come from the prepared statement, so the JSON value is
//! converted according to what the server expects rather than what JSON
//! happens to carry (`"42"` binds fine to an int4 parameter).

use std::error::Error;
use std::net::IpAddr;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde_json::Value;
use tokio_postgres::types::{to_sql_checked, IsNull, Kind, ToSql, Type};

use crate::db::text::{is_text_like, unsupported};

type BoxError = Box<dyn Error + Sync + Send>;

#[derive(Debug)]
pub struct SqlParam<'a>(pub &'a Value);

impl ToSql for SqlParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        encode(self.0, ty, out)
    }

    fn accepts(_ty: &Type) -> bool { true }

    to_sql_checked!();
}

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot bind {} as {}", value, ty.name()).into()
}

/// Text form of a scalar JSON value; objects and arrays serialize as JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_i64(value: &Value, ty: &Type) -> Result<i64, BoxError> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| mismatch(value, ty)),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| mismatch(value, ty)),
        Value::Bool(b) => Ok(*b as i64),
        _ => Err(mismatch(value, ty)),
    }
}

fn as_f64(value: &Value, ty: &Type) -> Result<f64, BoxError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| mismatch(value, ty)),
        Value::String(s) => match s.trim() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            t => t.parse::<f64>().map_err(|_| mismatch(value, ty)),
        },
        _ => Err(mismatch(value, ty)),
    }
}

fn as_bool(value: &Value, ty: &Type) -> Result<bool, BoxError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
            "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
            _ => Err(mismatch(value, ty)),
        },
        _ => Err(mismatch(value, ty)),
    }
}

fn parse_timestamptz(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_timestamp(s).map(|naive| naive.and_utc()))
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0))
}

fn encode(value: &Value, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if value.is_null() {
        return Ok(IsNull::Yes);
    }
    match ty.kind() {
        Kind::Array(_) => {
            let Value::Array(items) = value else { return Err(mismatch(value, ty)) };
            let items: Vec<SqlParam<'_>> = items.iter().map(SqlParam).collect();
            return items.to_sql(ty, out);
        }
        Kind::Domain(inner) => return encode(value, inner, out),
        _ => {}
    }
    match *ty {
        Type::BOOL => as_bool(value, ty)?.to_sql(ty, out),
        Type::INT2 => i16::try_from(as_i64(value, ty)?)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(as_i64(value, ty)?)?.to_sql(ty, out),
        Type::INT8 => as_i64(value, ty)?.to_sql(ty, out),
        Type::OID => u32::try_from(as_i64(value, ty)?)?.to_sql(ty, out),
        Type::FLOAT4 => (as_f64(value, ty)? as f32).to_sql(ty, out),
        Type::FLOAT8 => as_f64(value, ty)?.to_sql(ty, out),
        Type::NUMERIC => {
            let bytes = numeric_from_str(&value_text(value)).ok_or_else(|| mismatch(value, ty))?;
            out.extend_from_slice(&bytes);
            Ok(IsNull::No)
        }
        // a string is taken as JSON text, anything else as the document itself
        Type::JSON | Type::JSONB => match value {
            Value::String(s) => {
                if *ty == Type::JSONB { out.extend_from_slice(&[1]); }
                out.extend_from_slice(s.as_bytes());
                Ok(IsNull::No)
            }
            other => other.to_sql(ty, out),
        },
        Type::UUID => uuid::Uuid::parse_str(value_text(value).trim())?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(value_text(value).trim(), "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIME => {
            let text = value_text(value);
            let t = NaiveTime::parse_from_str(text.trim(), "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(text.trim(), "%H:%M"))?;
            t.to_sql(ty, out)
        }
        Type::TIMESTAMP => parse_timestamp(value_text(value).trim()).ok_or_else(|| mismatch(value, ty))?.to_sql(ty, out),
        Type::TIMESTAMPTZ => parse_timestamptz(value_text(value).trim()).ok_or_else(|| mismatch(value, ty))?.to_sql(ty, out),
        Type::BYTEA => {
            let text = value_text(value);
            match text.strip_prefix("\\x") {
                Some(hex) => out.extend_from_slice(&hex_decode(hex).ok_or_else(|| mismatch(value, ty))?),
                None => out.extend_from_slice(text.as_bytes()),
            }
            Ok(IsNull::No)
        }
        Type::TIMETZ => {
            let (micros, west) = parse_timetz(value_text(value).trim()).ok_or_else(|| mismatch(value, ty))?;
            out.extend_from_slice(&micros.to_be_bytes());
            out.extend_from_slice(&west.to_be_bytes());
            Ok(IsNull::No)
        }
        Type::INET | Type::CIDR => {
            let bytes = inet_bytes(value_text(value).trim(), *ty == Type::CIDR).ok_or_else(|| mismatch(value, ty))?;
            out.extend_from_slice(&bytes);
            Ok(IsNull::No)
        }
        Type::MACADDR | Type::MACADDR8 => {
            let len = if *ty == Type::MACADDR { 6 } else { 8 };
            let bytes = mac_bytes(value_text(value).trim(), len).ok_or_else(|| mismatch(value, ty))?;
            out.extend_from_slice(&bytes);
            Ok(IsNull::No)
        }
        Type::MONEY => {
            let cents = money_cents(&value_text(value)).ok_or_else(|| mismatch(value, ty))?;
            out.extend_from_slice(&cents.to_be_bytes());
            Ok(IsNull::No)
        }
        Type::BIT | Type::VARBIT => {
            let bytes = bit_bytes(value_text(value).trim()).ok_or_else(|| mismatch(value, ty))?;
            out.extend_from_slice(&bytes);
            Ok(IsNull::No)
        }
        // text-like types (and enums) use their text as the binary form
        _ if is_text_like(ty) => {
            out.extend_from_slice(value_text(value).as_bytes());
            Ok(IsNull::No)
        }
        _ => Err(unsupported(ty)),
    }
}

/// `HH:MM[:SS[.ffffff]]` followed by `±HH[:MM[:SS]]`; returns micros and seconds west of UTC.
fn parse_timetz(s: &str) -> Option<(i64, i32)> {
    let at = s.rfind(['+', '-'])?;
    let (time, zone) = s.split_at(at);
    let t = NaiveTime::parse_from_str(time.trim(), "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M"))
        .ok()?;
    let micros = i64::from(t.num_seconds_from_midnight()) * 1_000_000 + i64::from(t.nanosecond() / 1_000);
    let (sign, zone) = zone.split_at(1);
    let mut parts = zone.split(':').map(|p| p.parse::<i32>().ok().filter(|_| p.len() == 2));
    let h = parts.next()??;
    let m = parts.next().unwrap_or(Some(0))?;
    let sec = parts.next().unwrap_or(Some(0))?;
    if parts.next().is_some() || h > 15 || m > 59 || sec > 59 { return None; }
    let east = h * 3600 + m * 60 + sec;
    Some((micros, if sign == "-" { east } else { -east }))
}

/// inet/cidr binary: family, mask bits, is_cidr, address length, address.
fn inet_bytes(s: &str, cidr: bool) -> Option<Vec<u8>> {
    let (addr, bits) = match s.split_once('/') {
        Some((addr, bits)) => (addr, Some(bits.parse::<u8>().ok()?)),
        None => (s, None),
    };
    let (family, max_bits, octets) = match addr.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => (2u8, 32u8, v4.octets().to_vec()),
        IpAddr::V6(v6) => (3u8, 128u8, v6.octets().to_vec()),
    };
    let bits = bits.unwrap_or(max_bits);
    if bits > max_bits { return None; }
    let mut out = vec![family, bits, u8::from(cidr), octets.len() as u8];
    out.extend_from_slice(&octets);
    Some(out)
}

fn mac_bytes(s: &str, len: usize) -> Option<Vec<u8>> {
    let bytes: Vec<u8> = s
        .split([':', '-'])
        .map(|p| if p.len() == 2 { u8::from_str_radix(p, 16).ok() } else { None })
        .collect::<Option<_>>()?;
    (bytes.len() == len).then_some(bytes)
}

/// `$1,234.56` or `-12.5` to whole cents.
fn money_cents(s: &str) -> Option<i64> {
    let s: String = s.trim().chars().filter(|c| *c != '$' && *c != ',').collect();
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.as_str()),
    };
    let (whole, frac) = body.split_once('.').unwrap_or((body, ""));
    if whole.is_empty() && frac.is_empty() { return None; }
    if frac.len() > 2 || !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) { return None; }
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac: i64 = format!("{:0<2}", frac).parse().ok()?;
    let cents = whole.checked_mul(100)?.checked_add(frac)?;
    Some(if negative { -cents } else { cents })
}

/// `0`/`1` text to bit count plus bits packed most significant first.
fn bit_bytes(s: &str) -> Option<Vec<u8>> {
    let len = i32::try_from(s.len()).ok()?;
    let mut out = len.to_be_bytes().to_vec();
    out.resize(4 + s.len().div_ceil(8), 0);
    for (i, c) in s.bytes().enumerate() {
        match c {
            b'1' => out[4 + i / 8] |= 0x80 >> (i % 8),
            b'0' => {}
            _ => return None,
        }
    }
    Some(out)
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 { return None; }
    (0..hex.len()).step_by(2).map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok()).collect()
}

/// Decimal text to NUMERIC binary: ndigits, weight, sign, dscale, base-10000 digits.
pub fn numeric_from_str(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    let special = |sign: u16| {
        let mut v = Vec::with_capacity(8);
        v.extend_from_slice(&0i16.to_be_bytes());
        v.extend_from_slice(&0i16.to_be_bytes());
        v.extend_from_slice(&sign.to_be_bytes());
        v.extend_from_slice(&0i16.to_be_bytes());
        v
    };
    if s.eq_ignore_ascii_case("nan") { return Some(special(0xC000)); }
    if s.eq_ignore_ascii_case("infinity") { return Some(special(0xD000)); }
    if s.eq_ignore_ascii_case("-infinity") { return Some(special(0xF000)); }

    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    if int_part.is_empty() && frac_part.is_empty() { return None; }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) { return None; }
    let dscale = i16::try_from(frac_part.len()).ok()?;

    // align on the decimal point: int part padded left, fraction padded right
    let int_part = int_part.trim_start_matches('0');
    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;
    let digits: String = "0".repeat(int_pad) + int_part + frac_part + &"0".repeat(frac_pad);
    let int_groups = (int_part.len() + int_pad) / 4;
    let mut groups: Vec<i16> = digits
        .as_bytes()
        .chunks(4)
        .map(|c| c.iter().fold(0i16, |acc, d| acc * 10 + (d - b'0') as i16))
        .collect();
    let mut weight = int_groups as i32 - 1;
    while groups.first() == Some(&0) {
        groups.remove(0);
        weight -= 1;
    }
    while groups.last() == Some(&0) {
        groups.pop();
    }
    let sign: u16 = if negative && !groups.is_empty() { 0x4000 } else { 0 };
    if groups.is_empty() { weight = 0; }

    let mut out = Vec::with_capacity(8 + groups.len() * 2);
    out.extend_from_slice(&(groups.len() as i16).to_be_bytes());
    out.extend_from_slice(&i16::try_from(weight).ok()?.to_be_bytes());
    out.extend_from_slice(&sign.to_be_bytes());
    out.extend_from_slice(&dscale.to_be_bytes());
    for g in groups {
        out.extend_from_slice(&g.to_be_bytes());
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::text::{numeric_to_string, render};
    use serde_json::json;

    fn bind(value: Value, ty: &Type) -> Result<Option<Vec<u8>>, BoxError> {
        let mut buf = BytesMut::new();
        match SqlParam(&value).to_sql(ty, &mut buf)? {
            IsNull::Yes => Ok(None),
            IsNull::No => Ok(Some(buf.to_vec())),
        }
    }

    #[test]
    fn numeric_encoding_survives_rendering() {
        for text in ["12.5", "-12345", "0.0005", "0.000012", "100000000", "0", "3.14159265358979", "0.00"] {
            let raw = numeric_from_str(text).unwrap();
            assert_eq!(numeric_to_string(&raw).unwrap(), text, "{}", text);
        }
        assert_eq!(numeric_to_string(&numeric_from_str("-0.0").unwrap()).unwrap(), "0.0");
        assert_eq!(numeric_to_string(&numeric_from_str("NaN").unwrap()).unwrap(), "NaN");
        assert!(numeric_from_str("1.2.3").is_none());
        assert!(numeric_from_str("abc").is_none());
    }

    #[test]
    fn scalars_follow_the_parameter_type() {
        assert_eq!(bind(json!("42"), &Type::INT4).unwrap().unwrap(), 42i32.to_be_bytes());
        assert_eq!(bind(json!(7), &Type::INT8).unwrap().unwrap(), 7i64.to_be_bytes());
        assert_eq!(bind(json!("yes"), &Type::BOOL).unwrap().unwrap(), vec![1]);
        assert_eq!(bind(json!(12), &Type::TEXT).unwrap().unwrap(), b"12");
        assert_eq!(bind(json!(null), &Type::INT4).unwrap(), None);
        assert!(bind(json!(70000), &Type::INT2).is_err());
        assert!(bind(json!("x"), &Type::INT4).is_err());
    }

    #[test]
    fn temporal_and_json_parameters() {
        let raw = bind(json!("2000-01-02"), &Type::DATE).unwrap().unwrap();
        assert_eq!(render(&Type::DATE, &raw).unwrap(), "2000-01-02");
        let raw = bind(json!("2000-01-01T00:00:01+01:00"), &Type::TIMESTAMPTZ).unwrap().unwrap();
        assert_eq!(render(&Type::TIMESTAMPTZ, &raw).unwrap(), "1999-12-31 23:00:01+00");
        let raw = bind(json!({"a": 1}), &Type::JSONB).unwrap().unwrap();
        assert_eq!(render(&Type::JSONB, &raw).unwrap(), r#"{"a":1}"#);
        let raw = bind(json!("\\xdead"), &Type::BYTEA).unwrap().unwrap();
        assert_eq!(raw, vec![0xde, 0xad]);
    }

    #[test]
    fn network_money_and_bit_parameters() {
        assert_eq!(bind(json!("127.0.0.1"), &Type::INET).unwrap().unwrap(), vec![2, 32, 0, 4, 127, 0, 0, 1]);
        assert_eq!(bind(json!("10.0.0.0/8"), &Type::CIDR).unwrap().unwrap(), vec![2, 8, 1, 4, 10, 0, 0, 0]);
        let raw = bind(json!("fe80::1/64"), &Type::INET).unwrap().unwrap();
        assert_eq!(render(&Type::INET, &raw).unwrap(), "fe80::1/64");
        assert!(bind(json!("10.0.0.0/33"), &Type::CIDR).is_err());
        assert!(bind(json!("not-an-ip"), &Type::INET).is_err());

        assert_eq!(bind(json!("08:00:2b:01:02:03"), &Type::MACADDR).unwrap().unwrap(), vec![0x08, 0x00, 0x2b, 0x01, 0x02, 0x03]);
        let raw = bind(json!("08-00-2B-01-02-03-04-05"), &Type::MACADDR8).unwrap().unwrap();
        assert_eq!(render(&Type::MACADDR8, &raw).unwrap(), "08:00:2b:01:02:03:04:05");
        assert!(bind(json!("08:00:2b"), &Type::MACADDR).is_err());

        assert_eq!(bind(json!("$1,234.56"), &Type::MONEY).unwrap().unwrap(), 123_456i64.to_be_bytes());
        assert_eq!(bind(json!(-0.5), &Type::MONEY).unwrap().unwrap(), (-50i64).to_be_bytes());
        assert!(bind(json!("1.234"), &Type::MONEY).is_err());

        let raw = bind(json!("10100"), &Type::BIT).unwrap().unwrap();
        assert_eq!(raw, vec![0, 0, 0, 5, 0b1010_0000]);
        assert_eq!(render(&Type::VARBIT, &raw).unwrap(), "10100");
        assert!(bind(json!("102"), &Type::VARBIT).is_err());
    }

    #[test]
    fn timetz_keeps_its_offset() {
        let raw = bind(json!("01:00:00+05:30"), &Type::TIMETZ).unwrap().unwrap();
        assert_eq!(raw[8..], (-19_800i32).to_be_bytes());
        assert_eq!(render(&Type::TIMETZ, &raw).unwrap(), "01:00:00+05:30");
        let raw = bind(json!("23:59:59.25-08"), &Type::TIMETZ).unwrap().unwrap();
        assert_eq!(render(&Type::TIMETZ, &raw).unwrap(), "23:59:59.25-08");
        assert!(bind(json!("12:00"), &Type::TIMETZ).is_err());
    }

    #[test]
    fn unknown_types_are_refused() {
        let err = bind(json!("(1,2)"), &Type::POINT).unwrap_err();
        assert!(err.to_string().contains("unsupported type point"), "{}", err);
        assert!(bind(json!("[1,5)"), &Type::INT4_RANGE).is_err());
        assert_eq!(bind(json!("<a/>"), &Type::XML).unwrap().unwrap(), b"<a/>");
    }

    #[test]
    fn arrays_bind_elementwise() {
        let raw = bind(json!([1, null, "3"]), &Type::INT4_ARRAY).unwrap().unwrap();
        assert_eq!(render(&Type::INT4_ARRAY, &raw).unwrap(), "{1,NULL,3}");
        assert!(bind(json!("{1,2}"), &Type::INT4_ARRAY).is_err());
    }
}
