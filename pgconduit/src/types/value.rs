//! `Value`: the decoded, host-level representation of a column. `ParamValue`:
//! the tagged sum type callers bind as query parameters.
//!
//! `ParamValue` is a tagged sum type: each variant carries both the host
//! value and enough shape to let the codec pick an OID and encode without
//! the caller specifying one directly. BYTEA decodes to an opaque byte
//! buffer rather than an integer list, UUID decodes to its canonical string
//! form, and enums decode to their label.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use ipnetwork::IpNetwork;
use mac_address::MacAddress;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::geometric::{PgBox, PgCircle, PgLSeg, PgLine, PgPath, PgPoint, PgPolygon};
use super::interval::PgInterval;

/// A decoded column value. Produced by the codec's decode path and handed
/// back to the caller through [`crate::query_result::QueryResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// BYTEA: always an opaque byte buffer, never a list of integers.
    Bytes(Bytes),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(Decimal),
    /// MONEY, stored as the integer number of cents the wire carries.
    Money(i64),
    Text(String),
    /// Canonical lowercase-hyphenated string form, per the decode contract.
    Uuid(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Interval(PgInterval),
    Inet(IpNetwork),
    Cidr(IpNetwork),
    MacAddr(MacAddress),
    MacAddr8([u8; 8]),
    Json(serde_json::Value),
    Jsonb(serde_json::Value),
    Point(PgPoint),
    Line(PgLine),
    LSeg(PgLSeg),
    Box(PgBox),
    Path(PgPath),
    Polygon(PgPolygon),
    Circle(PgCircle),
    /// The label of an enum value.
    Enum(String),
    /// An ordered name->value mapping, recursively decoded.
    Composite(Vec<(String, Value)>),
    /// Array of any of the above; an empty array decodes to `Array(vec![])`
    /// irrespective of its declared element OID.
    Array(Vec<Value>),
    /// Raw bytes for an OID with no registered decoder and no custom decoder
    /// supplied at materialization time.
    Custom { oid: u32, bytes: Bytes },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int2(v) => Some(*v as i64),
            Value::Int4(v) => Some(*v as i64),
            Value::Int8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float4(v) => Some(*v as f64),
            Value::Float8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Enum(s) | Value::Uuid(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// A query parameter. Width-disambiguating alternatives (`Int2`/`Int4`/`Int8`,
/// `Float4`/`Float8`, `Money` as integer cents) and the `Custom` raw-bytes
/// escape hatch are variants here rather than separate wrapper structs, so
/// the codec can dispatch on one tag instead of a type map.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(Decimal),
    Money(i64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Interval(PgInterval),
    Inet(IpNetwork),
    MacAddr(MacAddress),
    MacAddr8([u8; 8]),
    /// Forces the JSON encode path even when the top-level value is a list,
    /// so `[1, 2]` is unambiguous with an array column.
    Json(serde_json::Value),
    Jsonb(serde_json::Value),
    Array(Vec<ParamValue>),
    /// Escape hatch carrying raw bytes destined for a caller-chosen OID.
    Custom { oid: u32, bytes: Vec<u8> },
}

macro_rules! from_impl {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for ParamValue {
            fn from(value: $ty) -> Self {
                ParamValue::$variant(value.into())
            }
        }
    };
}

from_impl!(bool, Bool);
from_impl!(i16, Int2);
from_impl!(i32, Int4);
from_impl!(i64, Int8);
from_impl!(f32, Float4);
from_impl!(f64, Float8);
from_impl!(String, Text);
from_impl!(Decimal, Numeric);
from_impl!(Uuid, Uuid);
from_impl!(NaiveDate, Date);
from_impl!(NaiveTime, Time);
from_impl!(NaiveDateTime, Timestamp);
from_impl!(DateTime<Utc>, TimestampTz);
from_impl!(IpNetwork, Inet);
from_impl!(MacAddress, MacAddr);

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(value: Vec<u8>) -> Self {
        ParamValue::Bytes(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => ParamValue::Null,
        }
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(value: Vec<T>) -> Self {
        ParamValue::Array(value.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(value: serde_json::Value) -> Self {
        ParamValue::Jsonb(value)
    }
}

/// Thin wrapper types for picking a width or encoding that the inference
/// from a plain `i64`/`serde_json::Value` wouldn't land on by default.
pub mod extra {
    use super::ParamValue;

    /// Binds as `int2` instead of the default `int4`/`int8` inference.
    pub struct SmallInt(pub i16);
    /// Binds as `int4`.
    pub struct Integer(pub i32);
    /// Binds as `int8`.
    pub struct BigInt(pub i64);
    /// Forces the `json` encode path (see [`ParamValue::Json`]) instead of
    /// the default `jsonb`.
    pub struct Json(pub serde_json::Value);

    impl From<SmallInt> for ParamValue {
        fn from(v: SmallInt) -> Self {
            ParamValue::Int2(v.0)
        }
    }
    impl From<Integer> for ParamValue {
        fn from(v: Integer) -> Self {
            ParamValue::Int4(v.0)
        }
    }
    impl From<BigInt> for ParamValue {
        fn from(v: BigInt) -> Self {
            ParamValue::Int8(v.0)
        }
    }
    impl From<Json> for ParamValue {
        fn from(v: Json) -> Self {
            ParamValue::Json(v.0)
        }
    }
}
