//! PostgreSQL binary wire format -> [`Value`].
//!
//! An empty array decodes to `Value::Array(vec![])` irrespective of its
//! declared element OID (spec.md §4.1); composite and enum OIDs are resolved
//! through the already-populated [`TypeCache`] (resolution itself happens
//! ahead of time against `RowDescription`, see `connection/type_cache.rs`).

use std::collections::HashMap;

use bytes::{Buf, Bytes};
use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};

use crate::error::Error;

use super::geometric::{PgBox, PgCircle, PgLSeg, PgLine, PgPath, PgPoint, PgPolygon};
use super::interval::PgInterval;
use super::oid;
use super::type_info::{TypeInfo, TypeKind};
use super::value::Value;

const PGSQL_EPOCH_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2000, 1, 1) {
    Some(d) => d,
    None => unreachable!(),
};

pub trait TypeResolver {
    fn lookup(&self, oid: u32) -> Option<&TypeInfo>;
}

impl TypeResolver for HashMap<u32, TypeInfo> {
    fn lookup(&self, oid: u32) -> Option<&TypeInfo> {
        self.get(&oid)
    }
}

fn err(column: &str, reason: impl Into<String>) -> Error {
    Error::ValueDecode {
        column: column.to_owned(),
        reason: reason.into(),
    }
}

pub fn decode(column: &str, type_oid: u32, bytes: Option<&Bytes>, cache: &impl TypeResolver) -> Result<Value, Error> {
    let Some(bytes) = bytes else {
        return Ok(Value::Null);
    };

    if let Some(element_oid) = oid::array_element(type_oid) {
        return decode_array(column, element_oid, bytes, cache);
    }

    match type_oid {
        oid::BOOL => Ok(Value::Bool(bytes[0] != 0)),
        oid::BYTEA => Ok(Value::Bytes(bytes.clone())),
        oid::INT2 => Ok(Value::Int2(bytes.clone().get_i16())),
        oid::INT4 => Ok(Value::Int4(bytes.clone().get_i32())),
        oid::INT8 => Ok(Value::Int8(bytes.clone().get_i64())),
        oid::FLOAT4 => Ok(Value::Float4(bytes.clone().get_f32())),
        oid::FLOAT8 => Ok(Value::Float8(bytes.clone().get_f64())),
        oid::NUMERIC => decode_numeric(column, bytes),
        oid::MONEY => Ok(Value::Money(bytes.clone().get_i64())),
        oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::CHAR | oid::NAME | oid::XML => {
            std::str::from_utf8(bytes)
                .map(|s| Value::Text(s.to_owned()))
                .map_err(|e| err(column, format!("invalid UTF-8: {e}")))
        }
        oid::UUID => decode_uuid(column, bytes),
        oid::DATE => {
            let days = bytes.clone().get_i32();
            Ok(Value::Date(PGSQL_EPOCH_DATE + ChronoDuration::days(days as i64)))
        }
        oid::TIME => {
            let micros = bytes.clone().get_i64();
            Ok(Value::Time(micros_to_time(micros)))
        }
        oid::TIMESTAMP => {
            let micros = bytes.clone().get_i64();
            Ok(Value::Timestamp(micros_to_timestamp(micros)))
        }
        oid::TIMESTAMPTZ => {
            let micros = bytes.clone().get_i64();
            let naive = micros_to_timestamp(micros);
            Ok(Value::TimestampTz(Utc.from_utc_datetime(&naive)))
        }
        oid::INTERVAL => {
            let mut b = bytes.clone();
            let microseconds = b.get_i64();
            let days = b.get_i32();
            let months = b.get_i32();
            Ok(Value::Interval(PgInterval {
                months,
                days,
                microseconds,
            }))
        }
        oid::INET => decode_inet(bytes).map(Value::Inet),
        oid::CIDR => decode_inet(bytes).map(Value::Cidr),
        oid::MACADDR => {
            if bytes.len() != 6 {
                return Err(err(column, "macaddr must be 6 bytes"));
            }
            let mut octets = [0u8; 6];
            octets.copy_from_slice(bytes);
            mac_address::MacAddress::new(octets)
                .map(Value::MacAddr)
                .map_err(|e| Error::MacAddrConversion(e.to_string()))
        }
        oid::MACADDR8 => {
            if bytes.len() != 8 {
                return Err(err(column, "macaddr8 must be 8 bytes"));
            }
            let mut octets = [0u8; 8];
            octets.copy_from_slice(bytes);
            Ok(Value::MacAddr8(octets))
        }
        oid::JSON => decode_json(column, bytes, false),
        oid::JSONB => decode_json(column, bytes, true),
        oid::POINT => decode_point(bytes).map(Value::Point),
        oid::LINE => {
            let mut b = bytes.clone();
            Ok(Value::Line(super::geometric::PgLine {
                a: b.get_f64(),
                b: b.get_f64(),
                c: b.get_f64(),
            }))
        }
        oid::LSEG => {
            let mut b = bytes.clone();
            let start = PgPoint { x: b.get_f64(), y: b.get_f64() };
            let end = PgPoint { x: b.get_f64(), y: b.get_f64() };
            Ok(Value::LSeg(PgLSeg { start, end }))
        }
        oid::BOX => {
            let mut b = bytes.clone();
            let high = PgPoint { x: b.get_f64(), y: b.get_f64() };
            let low = PgPoint { x: b.get_f64(), y: b.get_f64() };
            Ok(Value::Box(PgBox { high, low }))
        }
        oid::PATH => decode_path(bytes).map(Value::Path),
        oid::POLYGON => decode_polygon(bytes).map(Value::Polygon),
        oid::CIRCLE => {
            let mut b = bytes.clone();
            let center = PgPoint { x: b.get_f64(), y: b.get_f64() };
            Ok(Value::Circle(PgCircle { center, radius: b.get_f64() }))
        }
        other => decode_catalog_type(column, other, bytes, cache),
    }
}

fn decode_catalog_type(
    column: &str,
    type_oid: u32,
    bytes: &Bytes,
    cache: &impl TypeResolver,
) -> Result<Value, Error> {
    let Some(info) = cache.lookup(type_oid) else {
        return Ok(Value::Custom {
            oid: type_oid,
            bytes: bytes.clone(),
        });
    };

    match &info.kind {
        TypeKind::Enum => std::str::from_utf8(bytes)
            .map(|s| Value::Enum(s.to_owned()))
            .map_err(|e| err(column, format!("invalid UTF-8 enum label: {e}"))),
        TypeKind::Composite { fields } => decode_composite(column, fields, bytes, cache),
        TypeKind::Base { base_oid } => decode(column, *base_oid, Some(bytes), cache),
    }
}

fn decode_composite(
    column: &str,
    fields: &[(String, u32)],
    bytes: &Bytes,
    cache: &impl TypeResolver,
) -> Result<Value, Error> {
    let mut b = bytes.clone();
    let field_count = b.get_i32();
    let mut values = Vec::with_capacity(field_count as usize);

    for (name, _declared_oid) in fields.iter().take(field_count.max(0) as usize) {
        let field_oid = b.get_u32();
        let len = b.get_i32();
        let field_bytes = if len < 0 {
            None
        } else {
            Some(b.copy_to_bytes(len as usize))
        };
        let value = decode(name, field_oid, field_bytes.as_ref(), cache)?;
        values.push((name.clone(), value));
    }

    Ok(Value::Composite(values))
}

fn decode_array(column: &str, element_oid: u32, bytes: &Bytes, cache: &impl TypeResolver) -> Result<Value, Error> {
    let mut b = bytes.clone();
    let ndim = b.get_i32();
    let _has_null = b.get_i32();
    let _declared_element_oid = b.get_u32();

    if ndim == 0 {
        return Ok(Value::Array(Vec::new()));
    }

    let mut dims = Vec::with_capacity(ndim as usize);
    for _ in 0..ndim {
        let len = b.get_i32();
        let _lower_bound = b.get_i32();
        dims.push(len as usize);
    }

    decode_array_dim(column, &dims, element_oid, &mut b, cache)
}

fn decode_array_dim(
    column: &str,
    dims: &[usize],
    element_oid: u32,
    b: &mut Bytes,
    cache: &impl TypeResolver,
) -> Result<Value, Error> {
    let (&len, rest) = dims.split_first().expect("checked non-empty by caller");

    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        if rest.is_empty() {
            let item_len = b.get_i32();
            let value = if item_len < 0 {
                Value::Null
            } else {
                let item_bytes = b.copy_to_bytes(item_len as usize);
                decode(column, element_oid, Some(&item_bytes), cache)?
            };
            items.push(value);
        } else {
            items.push(decode_array_dim(column, rest, element_oid, b, cache)?);
        }
    }
    Ok(Value::Array(items))
}

fn decode_numeric(column: &str, bytes: &Bytes) -> Result<Value, Error> {
    let mut b = bytes.clone();
    let ndigits = b.get_u16();
    let weight = b.get_i16();
    let sign = b.get_u16();
    let scale = b.get_u16();

    let mut digits = Vec::with_capacity(ndigits as usize);
    for _ in 0..ndigits {
        digits.push(b.get_u16());
    }

    if sign == 0xC000 {
        return Err(err(column, "NaN numeric values are not representable"));
    }

    let mut unscaled = String::new();
    for d in &digits {
        unscaled.push_str(&format!("{d:04}"));
    }
    if unscaled.is_empty() {
        unscaled.push('0');
    }

    // `weight` counts base-10000 digits before the decimal point, minus one.
    let integer_digit_groups = (weight + 1).max(0) as usize;
    let point_pos = integer_digit_groups * 4;
    let point_pos = point_pos.min(unscaled.len());

    let mut full = unscaled.clone();
    if point_pos > full.len() {
        full.push_str(&"0".repeat(point_pos - full.len()));
    }
    full.insert(point_pos.min(full.len()), '.');
    if sign == 0x4000 {
        full.insert(0, '-');
    }

    let mut decimal = rust_decimal::Decimal::from_str_exact(&full)
        .map_err(|e| err(column, format!("invalid numeric value: {e}")))?;
    decimal.rescale(scale as u32);

    Ok(Value::Numeric(decimal))
}

fn decode_uuid(column: &str, bytes: &Bytes) -> Result<Value, Error> {
    if bytes.len() != 16 {
        return Err(Error::UuidValueConvert(format!(
            "expected 16 bytes, got {} (column {column})",
            bytes.len()
        )));
    }
    let mut b = [0u8; 16];
    b.copy_from_slice(bytes);
    Ok(Value::Uuid(uuid::Uuid::from_bytes(b).to_string()))
}

fn decode_inet(bytes: &Bytes) -> Result<ipnetwork::IpNetwork, Error> {
    let mut b = bytes.clone();
    let family = b.get_u8();
    let prefix = b.get_u8();
    let _is_cidr = b.get_u8();
    let len = b.get_u8();
    let addr_bytes = b.copy_to_bytes(len as usize);

    let ip = match family {
        2 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&addr_bytes);
            std::net::IpAddr::from(octets)
        }
        3 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&addr_bytes);
            std::net::IpAddr::from(octets)
        }
        other => {
            return Err(Error::ValueDecode {
                column: "inet".into(),
                reason: format!("unknown address family: {other}"),
            })
        }
    };

    ipnetwork::IpNetwork::new(ip, prefix).map_err(|e| Error::ValueDecode {
        column: "inet".into(),
        reason: e.to_string(),
    })
}

fn decode_json(column: &str, bytes: &Bytes, is_jsonb: bool) -> Result<Value, Error> {
    let body = if is_jsonb { &bytes[1..] } else { &bytes[..] };
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| err(column, format!("invalid JSON: {e}")))?;
    Ok(if is_jsonb { Value::Jsonb(value) } else { Value::Json(value) })
}

fn decode_point(bytes: &Bytes) -> Result<PgPoint, Error> {
    let mut b = bytes.clone();
    Ok(PgPoint { x: b.get_f64(), y: b.get_f64() })
}

fn decode_path(bytes: &Bytes) -> Result<PgPath, Error> {
    let mut b = bytes.clone();
    let closed = b.get_u8() != 0;
    let n = b.get_i32();
    let mut points = Vec::with_capacity(n.max(0) as usize);
    for _ in 0..n {
        points.push(PgPoint { x: b.get_f64(), y: b.get_f64() });
    }
    Ok(PgPath { closed, points })
}

fn decode_polygon(bytes: &Bytes) -> Result<PgPolygon, Error> {
    let mut b = bytes.clone();
    let n = b.get_i32();
    let mut points = Vec::with_capacity(n.max(0) as usize);
    for _ in 0..n {
        points.push(PgPoint { x: b.get_f64(), y: b.get_f64() });
    }
    Ok(PgPolygon { points })
}

fn micros_to_time(micros: i64) -> chrono::NaiveTime {
    let secs = micros.div_euclid(1_000_000);
    let nanos = micros.rem_euclid(1_000_000) * 1000;
    chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, nanos as u32)
        .unwrap_or_default()
}

fn micros_to_timestamp(micros: i64) -> chrono::NaiveDateTime {
    let epoch = PGSQL_EPOCH_DATE.and_hms_opt(0, 0, 0).unwrap();
    epoch + ChronoDuration::microseconds(micros)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn empty_cache() -> HashMap<u32, TypeInfo> {
        HashMap::new()
    }

    #[test]
    fn decodes_null() {
        let v = decode("col", oid::INT4, None, &empty_cache()).unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn decodes_int4() {
        let bytes = Bytes::copy_from_slice(&42i32.to_be_bytes());
        let v = decode("col", oid::INT4, Some(&bytes), &empty_cache()).unwrap();
        assert_eq!(v, Value::Int4(42));
    }

    #[test]
    fn decodes_empty_array_regardless_of_element_oid() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0i32.to_be_bytes()); // ndim = 0
        buf.extend_from_slice(&0i32.to_be_bytes()); // has_null
        buf.extend_from_slice(&oid::INT4.to_be_bytes()); // declared element oid
        let bytes = Bytes::from(buf);
        let v = decode("col", oid::INT4_ARRAY, Some(&bytes), &empty_cache()).unwrap();
        assert_eq!(v, Value::Array(vec![]));
    }

    #[test]
    fn decodes_bytea_to_opaque_buffer() {
        let bytes = Bytes::from_static(b"\x01\x02\x03");
        let v = decode("col", oid::BYTEA, Some(&bytes), &empty_cache()).unwrap();
        assert_eq!(v, Value::Bytes(Bytes::from_static(b"\x01\x02\x03")));
    }
}
