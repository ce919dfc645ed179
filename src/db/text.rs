//! Rendering of binary-protocol cells into the server's text output format.
//!
//! tokio-postgres always fetches results in binary format. Clients of the
//! proxy expect what a text-protocol driver would see (`t`/`f`, `{1,2}`,
//! `2024-01-02 03:04:05+00`), so every cell is rendered back to that form
//! before it reaches the decode layer.

use std::error::Error;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tokio_postgres::types::{FromSql, Kind, Type};

pub type BoxError = Box<dyn Error + Sync + Send>;

/// One result cell in text form; `None` is SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCell(pub Option<String>);

impl<'a> FromSql<'a> for TextCell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        render(ty, raw).map(|s| TextCell(Some(s)))
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(TextCell(None))
    }

    fn accepts(_ty: &Type) -> bool { true }
}

fn malformed(ty: &Type) -> BoxError {
    format!("malformed binary value for type {}", ty.name()).into()
}

fn fixed<const N: usize>(ty: &Type, raw: &[u8]) -> Result<[u8; N], BoxError> {
    raw.try_into().map_err(|_| malformed(ty))
}

/// Render a non-null binary value of type `ty` as the server would print it.
pub fn render(ty: &Type, raw: &[u8]) -> Result<String, BoxError> {
    match ty.kind() {
        Kind::Array(elem) => return render_array(elem, raw),
        Kind::Domain(inner) => return render(inner, raw),
        _ => {}
    }
    let text = match *ty {
        Type::BOOL => if fixed::<1>(ty, raw)?[0] != 0 { "t".to_string() } else { "f".to_string() },
        Type::INT2 => i16::from_be_bytes(fixed(ty, raw)?).to_string(),
        Type::INT4 => i32::from_be_bytes(fixed(ty, raw)?).to_string(),
        Type::INT8 => i64::from_be_bytes(fixed(ty, raw)?).to_string(),
        Type::OID => u32::from_be_bytes(fixed(ty, raw)?).to_string(),
        Type::FLOAT4 => float_text(f32::from_be_bytes(fixed(ty, raw)?) as f64, |f| (f as f32).to_string()),
        Type::FLOAT8 => float_text(f64::from_be_bytes(fixed(ty, raw)?), |f| f.to_string()),
        Type::NUMERIC => numeric_to_string(raw).ok_or_else(|| malformed(ty))?,
        Type::JSONB => {
            // version byte, then the document as text
            let (_, doc) = raw.split_first().ok_or_else(|| malformed(ty))?;
            String::from_utf8(doc.to_vec())?
        }
        Type::UUID => uuid::Uuid::from_slice(raw).map_err(|_| malformed(ty))?.hyphenated().to_string(),
        Type::BYTEA => hex_bytes(raw),
        Type::DATE => date_text(i32::from_be_bytes(fixed(ty, raw)?)).ok_or_else(|| malformed(ty))?,
        Type::TIME => {
            let micros = i64::from_be_bytes(fixed(ty, raw)?);
            time_text(micros).ok_or_else(|| malformed(ty))?
        }
        Type::TIMESTAMP => timestamp_text(i64::from_be_bytes(fixed(ty, raw)?), "").ok_or_else(|| malformed(ty))?,
        Type::TIMESTAMPTZ => timestamp_text(i64::from_be_bytes(fixed(ty, raw)?), "+00").ok_or_else(|| malformed(ty))?,
        Type::INTERVAL => {
            if raw.len() != 16 { return Err(malformed(ty)); }
            let micros = i64::from_be_bytes(fixed(ty, &raw[0..8])?);
            let days = i32::from_be_bytes(fixed(ty, &raw[8..12])?);
            let months = i32::from_be_bytes(fixed(ty, &raw[12..16])?);
            interval_text(micros, days, months)
        }
        Type::TIMETZ => {
            if raw.len() != 12 { return Err(malformed(ty)); }
            let micros = i64::from_be_bytes(fixed(ty, &raw[0..8])?);
            let west = i32::from_be_bytes(fixed(ty, &raw[8..12])?);
            format!("{}{}", time_text(micros).ok_or_else(|| malformed(ty))?, zone_text(west))
        }
        Type::INET | Type::CIDR => inet_text(raw, *ty == Type::CIDR).ok_or_else(|| malformed(ty))?,
        Type::MACADDR => mac_text(&fixed::<6>(ty, raw)?),
        Type::MACADDR8 => mac_text(&fixed::<8>(ty, raw)?),
        Type::MONEY => money_text(i64::from_be_bytes(fixed(ty, raw)?)),
        Type::BIT | Type::VARBIT => bit_text(raw).ok_or_else(|| malformed(ty))?,
        Type::VOID => String::new(),
        _ if is_text_like(ty) => String::from_utf8(raw.to_vec())?,
        _ => return Err(unsupported(ty)),
    };
    Ok(text)
}

/// Types whose binary send format is their text output.
pub fn is_text_like(ty: &Type) -> bool {
    matches!(ty.kind(), Kind::Enum(_))
        || ty.name() == "citext"
        || matches!(
            *ty,
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::CHAR | Type::XML | Type::JSON | Type::UNKNOWN
        )
}

pub fn unsupported(ty: &Type) -> BoxError {
    format!("unsupported type {} (oid {})", ty.name(), ty.oid()).into()
}

/// Stored offset is seconds west of UTC; printed as `+HH[:MM[:SS]]` east.
fn zone_text(west: i32) -> String {
    let east = -(west as i64);
    let abs = east.unsigned_abs();
    let (h, m, s) = (abs / 3600, (abs / 60) % 60, abs % 60);
    let mut out = format!("{}{:02}", if east < 0 { '-' } else { '+' }, h);
    if m != 0 || s != 0 { out.push_str(&format!(":{:02}", m)); }
    if s != 0 { out.push_str(&format!(":{:02}", s)); }
    out
}

/// inet/cidr binary: family (2 = v4, 3 = v6), mask bits, is_cidr, address length, address.
fn inet_text(raw: &[u8], cidr: bool) -> Option<String> {
    let (&[family, bits, _, len], addr) = raw.split_first_chunk::<4>()?;
    if addr.len() != len as usize { return None; }
    let (ip, max_bits) = match family {
        2 => (IpAddr::V4(Ipv4Addr::from(<[u8; 4]>::try_from(addr).ok()?)), 32),
        3 => (IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(addr).ok()?)), 128),
        _ => return None,
    };
    if bits > max_bits { return None; }
    Some(if cidr || bits != max_bits { format!("{}/{}", ip, bits) } else { ip.to_string() })
}

fn mac_text(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(":")
}

/// C-locale money output: `$1,234.56`, `-$0.05`.
pub fn money_text(cents: i64) -> String {
    let abs = cents.unsigned_abs();
    let whole = (abs / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 { grouped.push(','); }
        grouped.push(c);
    }
    format!("{}${}.{:02}", if cents < 0 { "-" } else { "" }, grouped, abs % 100)
}

/// bit/varbit binary: bit count, then the bits packed most significant first.
fn bit_text(raw: &[u8]) -> Option<String> {
    let (len, bytes) = raw.split_first_chunk::<4>()?;
    let len = usize::try_from(i32::from_be_bytes(*len)).ok()?;
    if bytes.len() != len.div_ceil(8) { return None; }
    Some((0..len).map(|i| if bytes[i / 8] & (0x80 >> (i % 8)) != 0 { '1' } else { '0' }).collect())
}

fn float_text(f: f64, finite: impl Fn(f64) -> String) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else {
        finite(f)
    }
}

fn hex_bytes(raw: &[u8]) -> String {
    let mut s = String::with_capacity(2 + raw.len() * 2);
    s.push_str("\\x");
    for b in raw {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// NUMERIC binary: ndigits, weight, sign, dscale (all int16), then base-10000 digits.
pub fn numeric_to_string(raw: &[u8]) -> Option<String> {
    if raw.len() < 8 { return None; }
    let word = |i: usize| [raw[i], raw[i + 1]];
    let ndigits = usize::try_from(i16::from_be_bytes(word(0))).ok()?;
    let weight = i16::from_be_bytes(word(2)) as i32;
    let sign = u16::from_be_bytes(word(4));
    let dscale = i16::from_be_bytes(word(6)).max(0) as usize;
    match sign {
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        _ => {}
    }
    let needed = ndigits.checked_mul(2)?.checked_add(8)?;
    if raw.len() < needed { return None; }
    let groups: Vec<u16> = (0..ndigits).map(|i| u16::from_be_bytes(word(8 + i * 2))).collect();
    let group = |i: i32| if i < 0 { 0 } else { groups.get(i as usize).copied().unwrap_or(0) };

    let mut int_part = String::new();
    for i in 0..=weight {
        let g = group(i);
        if int_part.is_empty() {
            if g != 0 { int_part.push_str(&g.to_string()); }
        } else {
            int_part.push_str(&format!("{:04}", g));
        }
    }
    if int_part.is_empty() { int_part.push('0'); }

    let mut frac = String::new();
    let mut i = weight + 1;
    while frac.len() < dscale {
        frac.push_str(&format!("{:04}", group(i)));
        i += 1;
    }
    frac.truncate(dscale);

    let negative = sign == 0x4000 && (int_part != "0" || frac.chars().any(|c| c != '0'));
    let mut out = String::new();
    if negative { out.push('-'); }
    out.push_str(&int_part);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(&frac);
    }
    Some(out)
}

fn pg_epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(2000, 1, 1)?.and_hms_opt(0, 0, 0)
}

fn fraction(micros: u32) -> String {
    if micros == 0 { return String::new(); }
    let digits = format!("{:06}", micros);
    format!(".{}", digits.trim_end_matches('0'))
}

fn date_text(days: i32) -> Option<String> {
    match days {
        i32::MAX => Some("infinity".to_string()),
        i32::MIN => Some("-infinity".to_string()),
        _ => {
            let date = pg_epoch()?.date().checked_add_signed(Duration::days(days as i64))?;
            Some(date.format("%Y-%m-%d").to_string())
        }
    }
}

fn time_text(micros: i64) -> Option<String> {
    let secs = u32::try_from(micros / 1_000_000).ok()?;
    let sub = (micros % 1_000_000) as u32;
    // 24:00:00 is a valid time value
    if secs == 86_400 && sub == 0 { return Some("24:00:00".to_string()); }
    let t = NaiveTime::from_num_seconds_from_midnight_opt(secs, 0)?;
    Some(format!("{}{}", t.format("%H:%M:%S"), fraction(sub)))
}

fn timestamp_text(micros: i64, zone: &str) -> Option<String> {
    match micros {
        i64::MAX => Some("infinity".to_string()),
        i64::MIN => Some("-infinity".to_string()),
        _ => {
            let ts = pg_epoch()?.checked_add_signed(Duration::microseconds(micros))?;
            let sub = (micros.rem_euclid(1_000_000)) as u32;
            Some(format!("{}{}{}", ts.format("%Y-%m-%d %H:%M:%S"), fraction(sub), zone))
        }
    }
}

/// Default (`postgres`) interval style: `1 year 2 mons 3 days 04:05:06.5`.
pub fn interval_text(micros: i64, days: i32, months: i32) -> String {
    fn unit(n: i32, name: &str) -> String {
        format!("{} {}{}", n, name, if n == 1 { "" } else { "s" })
    }
    let mut parts = Vec::new();
    let (years, mons) = (months / 12, months % 12);
    if years != 0 { parts.push(unit(years, "year")); }
    if mons != 0 { parts.push(unit(mons, "mon")); }
    if days != 0 { parts.push(unit(days, "day")); }
    if micros != 0 || parts.is_empty() {
        let abs = micros.unsigned_abs();
        let secs = abs / 1_000_000;
        parts.push(format!(
            "{}{:02}:{:02}:{:02}{}",
            if micros < 0 { "-" } else { "" },
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            fraction((abs % 1_000_000) as u32)
        ));
    }
    parts.join(" ")
}

struct Reader<'a> {
    raw: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let out = self.raw.get(self.pos..end)?;
        self.pos = end;
        Some(out)
    }

    fn i32(&mut self) -> Option<i32> {
        self.take(4).and_then(|b| b.try_into().ok()).map(i32::from_be_bytes)
    }

    /// Length-prefixed element; `Some(None)` is NULL.
    fn element(&mut self) -> Option<Option<&'a [u8]>> {
        let len = self.i32()?;
        if len < 0 { return Some(None); }
        self.take(len as usize).map(Some)
    }
}

fn render_array(elem: &Type, raw: &[u8]) -> Result<String, BoxError> {
    let bad = || -> BoxError { format!("malformed binary array of {}", elem.name()).into() };
    let mut r = Reader { raw, pos: 0 };
    let ndim = r.i32().ok_or_else(bad)?;
    let _has_null = r.i32().ok_or_else(bad)?;
    let _elem_oid = r.i32().ok_or_else(bad)?;
    if ndim <= 0 {
        return Ok("{}".to_string());
    }
    let mut dims = Vec::with_capacity(ndim as usize);
    for _ in 0..ndim {
        let len = r.i32().ok_or_else(bad)?;
        let lower = r.i32().ok_or_else(bad)?;
        dims.push((len.max(0) as usize, lower));
    }
    let mut out = String::new();
    if dims.iter().any(|(_, lower)| *lower != 1) {
        for (len, lower) in &dims {
            out.push_str(&format!("[{}:{}]", lower, *lower as i64 + *len as i64 - 1));
        }
        out.push('=');
    }
    write_level(elem, &dims, &mut r, &mut out).ok_or_else(bad)??;
    Ok(out)
}

// Outer Option: truncated input. Inner Result: element rendering failure.
fn write_level(elem: &Type, dims: &[(usize, i32)], r: &mut Reader<'_>, out: &mut String) -> Option<Result<(), BoxError>> {
    let (len, _) = *dims.first()?;
    out.push('{');
    for i in 0..len {
        if i > 0 { out.push(','); }
        if dims.len() > 1 {
            if let Err(e) = write_level(elem, &dims[1..], r, out)? {
                return Some(Err(e));
            }
            continue;
        }
        match r.element()? {
            None => out.push_str("NULL"),
            Some(bytes) => match render(elem, bytes) {
                Ok(text) => push_element(out, &text),
                Err(e) => return Some(Err(e)),
            },
        }
    }
    out.push('}');
    Some(Ok(()))
}

fn push_element(out: &mut String, text: &str) {
    let needs_quotes = text.is_empty()
        || text.eq_ignore_ascii_case("NULL")
        || text.chars().any(|c| matches!(c, '{' | '}' | ',' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        out.push_str(text);
        return;
    }
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' { out.push('\\'); }
        out.push(c);
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(weight: i16, sign: u16, dscale: i16, digits: &[u16]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&(digits.len() as i16).to_be_bytes());
        v.extend_from_slice(&weight.to_be_bytes());
        v.extend_from_slice(&sign.to_be_bytes());
        v.extend_from_slice(&dscale.to_be_bytes());
        for d in digits { v.extend_from_slice(&d.to_be_bytes()); }
        v
    }

    fn array(elem_oid: i32, dims: &[(i32, i32)], elems: &[Option<&[u8]>]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&(dims.len() as i32).to_be_bytes());
        v.extend_from_slice(&(elems.iter().any(|e| e.is_none()) as i32).to_be_bytes());
        v.extend_from_slice(&elem_oid.to_be_bytes());
        for (len, lower) in dims {
            v.extend_from_slice(&len.to_be_bytes());
            v.extend_from_slice(&lower.to_be_bytes());
        }
        for e in elems {
            match e {
                None => v.extend_from_slice(&(-1i32).to_be_bytes()),
                Some(b) => {
                    v.extend_from_slice(&(b.len() as i32).to_be_bytes());
                    v.extend_from_slice(b);
                }
            }
        }
        v
    }

    #[test]
    fn numeric_values() {
        assert_eq!(numeric_to_string(&numeric(0, 0, 1, &[12, 5000])).unwrap(), "12.5");
        assert_eq!(numeric_to_string(&numeric(1, 0x4000, 0, &[1, 2345])).unwrap(), "-12345");
        assert_eq!(numeric_to_string(&numeric(-1, 0, 4, &[5])).unwrap(), "0.0005");
        assert_eq!(numeric_to_string(&numeric(-2, 0, 6, &[1200])).unwrap(), "0.000012");
        assert_eq!(numeric_to_string(&numeric(-2, 0, 8, &[12])).unwrap(), "0.00000012");
        assert_eq!(numeric_to_string(&numeric(0, 0, 2, &[])).unwrap(), "0.00");
        assert_eq!(numeric_to_string(&numeric(2, 0, 0, &[1])).unwrap(), "100000000");
        assert_eq!(numeric_to_string(&numeric(0, 0xC000, 0, &[])).unwrap(), "NaN");
        assert!(numeric_to_string(&[0, 1]).is_none());
    }

    #[test]
    fn scalar_rendering() {
        assert_eq!(render(&Type::BOOL, &[1]).unwrap(), "t");
        assert_eq!(render(&Type::INT4, &42i32.to_be_bytes()).unwrap(), "42");
        assert_eq!(render(&Type::INT8, &(-7i64).to_be_bytes()).unwrap(), "-7");
        assert_eq!(render(&Type::FLOAT8, &f64::NAN.to_be_bytes()).unwrap(), "NaN");
        assert_eq!(render(&Type::FLOAT8, &1.5f64.to_be_bytes()).unwrap(), "1.5");
        assert_eq!(render(&Type::TEXT, b"hello").unwrap(), "hello");
        assert_eq!(render(&Type::JSONB, b"\x01{\"a\":1}").unwrap(), "{\"a\":1}");
        assert_eq!(render(&Type::BYTEA, &[0xde, 0xad]).unwrap(), "\\xdead");
        assert!(render(&Type::INT4, &[0, 1]).is_err());
    }

    #[test]
    fn temporal_rendering() {
        assert_eq!(render(&Type::DATE, &0i32.to_be_bytes()).unwrap(), "2000-01-01");
        assert_eq!(render(&Type::DATE, &i32::MAX.to_be_bytes()).unwrap(), "infinity");
        let micros: i64 = (86_400 + 3_600) * 1_000_000 + 500_000;
        assert_eq!(render(&Type::TIMESTAMP, &micros.to_be_bytes()).unwrap(), "2000-01-02 01:00:00.5");
        assert_eq!(render(&Type::TIMESTAMPTZ, &0i64.to_be_bytes()).unwrap(), "2000-01-01 00:00:00+00");
        assert_eq!(render(&Type::TIMESTAMPTZ, &(-1i64).to_be_bytes()).unwrap(), "1999-12-31 23:59:59.999999+00");
        assert_eq!(render(&Type::TIME, &(3_661_000_000i64).to_be_bytes()).unwrap(), "01:01:01");
        assert_eq!(interval_text(4 * 3_600_000_000 + 5 * 60_000_000 + 6_000_000, 3, 14), "1 year 2 mons 3 days 04:05:06");
        assert_eq!(interval_text(0, 0, 0), "00:00:00");
        assert_eq!(interval_text(-1_500_000, 1, 0), "1 day -00:00:01.5");
    }

    #[test]
    fn arrays_render_with_quoting_and_nulls() {
        let one = 1i32.to_be_bytes();
        let two = 2i32.to_be_bytes();
        let raw = array(23, &[(3, 1)], &[Some(&one), None, Some(&two)]);
        assert_eq!(render(&Type::INT4_ARRAY, &raw).unwrap(), "{1,NULL,2}");

        let raw = array(25, &[(4, 1)], &[Some(b"a"), Some(b"b c"), Some(b""), Some(b"NULL")]);
        assert_eq!(render(&Type::TEXT_ARRAY, &raw).unwrap(), r#"{a,"b c","","NULL"}"#);

        let raw = array(25, &[(1, 1)], &[Some(br#"q"u\o"#)]);
        assert_eq!(render(&Type::TEXT_ARRAY, &raw).unwrap(), r#"{"q\"u\\o"}"#);
    }

    #[test]
    fn multidimensional_and_offset_arrays() {
        let v: Vec<[u8; 4]> = (1..=4).map(|i: i32| i.to_be_bytes()).collect();
        let raw = array(23, &[(2, 1), (2, 1)], &[Some(&v[0]), Some(&v[1]), Some(&v[2]), Some(&v[3])]);
        assert_eq!(render(&Type::INT4_ARRAY, &raw).unwrap(), "{{1,2},{3,4}}");

        let raw = array(23, &[(2, 0)], &[Some(&v[0]), Some(&v[1])]);
        assert_eq!(render(&Type::INT4_ARRAY, &raw).unwrap(), "[0:1]={1,2}");

        let raw = array(23, &[], &[]);
        assert_eq!(render(&Type::INT4_ARRAY, &raw).unwrap(), "{}");
    }

    #[test]
    fn network_and_mac_addresses() {
        assert_eq!(render(&Type::INET, &[2, 32, 0, 4, 127, 0, 0, 1]).unwrap(), "127.0.0.1");
        assert_eq!(render(&Type::INET, &[2, 24, 0, 4, 192, 168, 1, 0]).unwrap(), "192.168.1.0/24");
        assert_eq!(render(&Type::CIDR, &[2, 8, 1, 4, 10, 0, 0, 0]).unwrap(), "10.0.0.0/8");
        let mut v6 = vec![3, 128, 0, 16];
        v6.extend_from_slice(&std::net::Ipv6Addr::LOCALHOST.octets());
        assert_eq!(render(&Type::INET, &v6).unwrap(), "::1");
        assert!(render(&Type::INET, &[2, 32, 0, 4, 127, 0]).is_err());
        assert_eq!(render(&Type::MACADDR, &[0x08, 0x00, 0x2b, 0x01, 0x02, 0x03]).unwrap(), "08:00:2b:01:02:03");
        assert_eq!(render(&Type::MACADDR8, &[0x08, 0x00, 0x2b, 0x01, 0x02, 0x03, 0x04, 0x05]).unwrap(), "08:00:2b:01:02:03:04:05");
    }

    #[test]
    fn timetz_money_and_bits() {
        let timetz = |micros: i64, west: i32| [micros.to_be_bytes().as_slice(), &west.to_be_bytes()].concat();
        assert_eq!(render(&Type::TIMETZ, &timetz(3_600_000_000, 0)).unwrap(), "01:00:00+00");
        assert_eq!(render(&Type::TIMETZ, &timetz(3_600_000_000, -19_800)).unwrap(), "01:00:00+05:30");
        assert_eq!(render(&Type::TIMETZ, &timetz(1_500_000, 28_800)).unwrap(), "00:00:01.5-08");

        assert_eq!(render(&Type::MONEY, &123_456i64.to_be_bytes()).unwrap(), "$1,234.56");
        assert_eq!(money_text(-5), "-$0.05");
        assert_eq!(money_text(100_000_000), "$1,000,000.00");

        assert_eq!(render(&Type::BIT, &[0, 0, 0, 5, 0b1010_0000]).unwrap(), "10100");
        assert_eq!(render(&Type::VARBIT, &[0, 0, 0, 0]).unwrap(), "");
        assert!(render(&Type::VARBIT, &[0, 0, 0, 9, 0xff]).is_err());
    }

    #[test]
    fn only_text_like_types_pass_bytes_through() {
        let mood = Type::new("mood".into(), 90_001, Kind::Enum(vec!["happy".into()]), "public".into());
        assert_eq!(render(&mood, b"happy").unwrap(), "happy");
        assert_eq!(render(&Type::XML, b"<a/>").unwrap(), "<a/>");
        assert!(render(&Type::TEXT, &[0xff, 0xfe]).is_err());

        let err = render(&Type::POINT, &[0; 16]).unwrap_err();
        assert!(err.to_string().contains("unsupported type point"), "{}", err);
        assert!(render(&Type::INT4_RANGE, &[1]).is_err());
    }

    #[test]
    fn negative_numeric_digit_count_is_rejected() {
        assert_eq!(numeric_to_string(&numeric(0, 0, 0, &[])).unwrap(), "0");
        assert!(numeric_to_string(&[0xff, 0xff, 0, 0, 0, 0, 0, 0]).is_none());
        assert!(numeric_to_string(&[0x7f, 0xff, 0, 0, 0, 0, 0, 0]).is_none());
    }

    #[test]
    fn truncated_array_is_an_error() {
        let mut raw = array(23, &[(2, 1)], &[Some(&1i32.to_be_bytes()), Some(&2i32.to_be_bytes())]);
        raw.truncate(raw.len() - 2);
        assert!(render(&Type::INT4_ARRAY, &raw).is_err());
    }
}
