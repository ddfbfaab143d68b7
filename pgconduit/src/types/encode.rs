//! `ParamValue` -> PostgreSQL binary wire format.
//!
//! Each supported OID accepts the value's own canonical variant plus the
//! wrapper variants that disambiguate width (spec.md §4.1). Multidimensional
//! arrays require every sub-list at a given depth to share one length; a
//! ragged array is a [`Error::ValueEncode`].

use bytes::BufMut;
use ipnetwork::IpNetwork;

use crate::error::Error;

use super::oid;
use super::value::ParamValue;

const PGSQL_EPOCH_DATE: chrono::NaiveDate = match chrono::NaiveDate::from_ymd_opt(2000, 1, 1) {
    Some(d) => d,
    None => unreachable!(),
};

/// Encodes `value` as the binary representation of `oid`, or infers the OID
/// from the value's own tag when `oid` is `None` (used for untyped
/// parameters sent to an unnamed/implicit statement).
pub fn encode(value: &ParamValue, oid: Option<u32>, index: usize) -> Result<Option<Vec<u8>>, Error> {
    if matches!(value, ParamValue::Null) {
        return Ok(None);
    }

    let mut buf = Vec::new();
    encode_into(&mut buf, value, oid, index)?;
    Ok(Some(buf))
}

fn err(index: usize, reason: impl Into<String>) -> Error {
    Error::ValueEncode {
        index,
        reason: reason.into(),
    }
}

fn encode_into(
    buf: &mut Vec<u8>,
    value: &ParamValue,
    oid: Option<u32>,
    index: usize,
) -> Result<(), Error> {
    match value {
        ParamValue::Null => {}
        ParamValue::Bool(b) => buf.put_u8(*b as u8),
        ParamValue::Int2(v) => buf.put_i16(*v),
        ParamValue::Int4(v) => buf.put_i32(*v),
        ParamValue::Int8(v) => buf.put_i64(*v),
        ParamValue::Float4(v) => buf.put_f32(*v),
        ParamValue::Float8(v) => buf.put_f64(*v),
        ParamValue::Numeric(v) => encode_numeric(buf, v, index)?,
        ParamValue::Money(cents) => buf.put_i64(*cents),
        ParamValue::Text(s) => buf.put_slice(s.as_bytes()),
        ParamValue::Bytes(bytes) => buf.put_slice(bytes),
        ParamValue::Uuid(uuid) => buf.put_slice(uuid.as_bytes()),
        ParamValue::Date(d) => {
            let days = (*d - PGSQL_EPOCH_DATE).num_days();
            buf.put_i32(days as i32);
        }
        ParamValue::Time(t) => {
            let micros = time_to_micros(*t);
            buf.put_i64(micros);
        }
        ParamValue::Timestamp(ts) => {
            let micros = timestamp_to_micros(*ts);
            buf.put_i64(micros);
        }
        ParamValue::TimestampTz(ts) => {
            let micros = timestamp_to_micros(ts.naive_utc());
            buf.put_i64(micros);
        }
        ParamValue::Interval(iv) => {
            buf.put_i64(iv.microseconds);
            buf.put_i32(iv.days);
            buf.put_i32(iv.months);
        }
        ParamValue::Inet(net) => encode_inet(buf, net),
        ParamValue::MacAddr(mac) => buf.put_slice(&mac.bytes()),
        ParamValue::MacAddr8(mac) => buf.put_slice(mac),
        ParamValue::Json(json) => {
            let text = serde_json::to_vec(json)
                .map_err(|e| err(index, format!("failed to serialize JSON: {e}")))?;
            buf.put_slice(&text);
        }
        ParamValue::Jsonb(json) => {
            buf.put_u8(1); // JSONB version byte
            let text = serde_json::to_vec(json)
                .map_err(|e| err(index, format!("failed to serialize JSONB: {e}")))?;
            buf.put_slice(&text);
        }
        ParamValue::Array(items) => encode_array(buf, items, oid, index)?,
        ParamValue::Custom { bytes, .. } => buf.put_slice(bytes),
    }
    Ok(())
}

fn time_to_micros(t: chrono::NaiveTime) -> i64 {
    use chrono::Timelike;
    let secs = t.num_seconds_from_midnight() as i64;
    secs * 1_000_000 + (t.nanosecond() as i64 / 1000)
}

fn timestamp_to_micros(ts: chrono::NaiveDateTime) -> i64 {
    let epoch = PGSQL_EPOCH_DATE.and_hms_opt(0, 0, 0).unwrap();
    let delta = ts - epoch;
    delta.num_microseconds().unwrap_or(0)
}

fn encode_inet(buf: &mut Vec<u8>, net: &IpNetwork) {
    let (family, addr_bytes): (u8, Vec<u8>) = match net.ip() {
        std::net::IpAddr::V4(v4) => (2, v4.octets().to_vec()),
        std::net::IpAddr::V6(v6) => (3, v6.octets().to_vec()),
    };
    buf.put_u8(family);
    buf.put_u8(net.prefix());
    buf.put_u8(0); // is_cidr, always 0 for a plain address sent as inet
    buf.put_u8(addr_bytes.len() as u8);
    buf.put_slice(&addr_bytes);
}

fn encode_numeric(buf: &mut Vec<u8>, value: &rust_decimal::Decimal, index: usize) -> Result<(), Error> {
    // NUMERIC wire format groups decimal digits into base-10000 "digits".
    let sign = if value.is_sign_negative() { 0x4000u16 } else { 0x0000 };
    let scale = value.scale() as u16;
    let mantissa = value.mantissa().unsigned_abs();
    if mantissa > u128::from(u64::MAX) {
        return Err(err(index, "numeric value exceeds supported precision"));
    }
    let unscaled = mantissa.to_string();

    let digits = to_base10000_digits(&unscaled, scale);
    let weight = digits.len() as i16 - (scale as i16 + 3) / 4 - 1;

    buf.put_u16(digits.len() as u16);
    buf.put_i16(weight);
    buf.put_u16(sign);
    buf.put_u16(scale);
    for d in &digits {
        buf.put_u16(*d);
    }
    Ok(())
}

fn to_base10000_digits(digits: &str, scale: u16) -> Vec<u16> {
    // Pad so the fractional part aligns on 4-digit (base-10000) groups.
    let pad = (4 - (scale % 4)) % 4;
    let mut padded = digits.to_owned();
    for _ in 0..pad {
        padded.push('0');
    }
    let lead_pad = (4 - (padded.len() % 4)) % 4;
    let mut full = "0".repeat(lead_pad);
    full.push_str(&padded);

    full.as_bytes()
        .chunks(4)
        .map(|chunk| std::str::from_utf8(chunk).unwrap().parse::<u16>().unwrap())
        .collect()
}

fn encode_array(
    buf: &mut Vec<u8>,
    items: &[ParamValue],
    oid: Option<u32>,
    index: usize,
) -> Result<(), Error> {
    let element_oid = oid
        .and_then(oid::array_element)
        .or_else(|| infer_element_oid(items))
        .ok_or_else(|| err(index, "could not determine array element OID"))?;

    let dims = array_shape(items, index)?;

    buf.put_i32(dims.len() as i32);
    buf.put_i32(0); // has-null flag is computed by the server from -1 lengths
    buf.put_u32(element_oid);
    for &len in &dims {
        buf.put_i32(len as i32);
        buf.put_i32(1); // lower bound
    }

    encode_array_elements(buf, items, element_oid, index)
}

fn infer_element_oid(items: &[ParamValue]) -> Option<u32> {
    items.iter().find_map(|v| match v {
        ParamValue::Bool(_) => Some(oid::BOOL),
        ParamValue::Int2(_) => Some(oid::INT2),
        ParamValue::Int4(_) => Some(oid::INT4),
        ParamValue::Int8(_) => Some(oid::INT8),
        ParamValue::Float4(_) => Some(oid::FLOAT4),
        ParamValue::Float8(_) => Some(oid::FLOAT8),
        ParamValue::Text(_) => Some(oid::TEXT),
        ParamValue::Uuid(_) => Some(oid::UUID),
        ParamValue::Array(inner) => infer_element_oid(inner),
        _ => None,
    })
}

/// Validates that every sub-list at a given depth shares one length,
/// returning the per-dimension lengths. An empty top-level array is a single
/// zero-length dimension.
fn array_shape(items: &[ParamValue], index: usize) -> Result<Vec<usize>, Error> {
    let mut dims = vec![items.len()];
    if let Some(ParamValue::Array(first)) = items.first() {
        let sub_len = first.len();
        let mut sub_dims = None;
        for item in items {
            let ParamValue::Array(sub) = item else {
                return Err(err(index, "ragged array: mixed array and scalar elements"));
            };
            if sub.len() != sub_len {
                return Err(err(
                    index,
                    format!(
                        "ragged array: expected sub-list length {sub_len}, got {}",
                        sub.len()
                    ),
                ));
            }
            // Every sibling must agree on its own nested shape too, not just
            // its immediate length: a ragged sub-list below the first branch
            // (e.g. `[[[1],[2]],[[3],[4,5]]]`) would otherwise pass the
            // length check above while still being invalid at depth 3.
            let shape = array_shape(sub, index)?;
            match &sub_dims {
                None => sub_dims = Some(shape),
                Some(expected) if *expected != shape => {
                    return Err(err(
                        index,
                        format!(
                            "ragged array: expected sub-list shape {expected:?}, got {shape:?}"
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
        dims.extend(sub_dims.unwrap_or_default());
    }
    Ok(dims)
}

fn encode_array_elements(
    buf: &mut Vec<u8>,
    items: &[ParamValue],
    element_oid: u32,
    index: usize,
) -> Result<(), Error> {
    for item in items {
        match item {
            ParamValue::Array(sub) => encode_array_elements(buf, sub, element_oid, index)?,
            ParamValue::Null => buf.put_i32(-1),
            other => {
                let mut element_buf = Vec::new();
                encode_into(&mut element_buf, other, Some(element_oid), index)?;
                buf.put_i32(element_buf.len() as i32);
                buf.put_slice(&element_buf);
            }
        }
    }
    Ok(())
}
