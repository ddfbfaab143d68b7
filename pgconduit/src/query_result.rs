//! Row/column materialization handed back from `execute`/`fetch`.
//!
//! Columns decode to a typed [`Value`] keyed by name or position, with an
//! optional per-column override (see [`CustomDecoders`]) for callers that
//! need to bypass the OID-based default. Row factories (`as_class`) build a
//! caller's own type from a whole row rather than column-by-column.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;
use crate::message::backend::{CommandComplete, FieldDescription};
use crate::types::Value;

/// A caller-supplied override for decoding one column, receiving the raw
/// wire bytes (`None` for SQL `NULL`) instead of going through the built-in
/// OID-keyed decode path. Registered per column name on a [`CustomDecoders`]
/// passed to `execute`/`fetch`.
pub type ColumnDecoder = Arc<dyn Fn(Option<&[u8]>) -> Result<Value, Error> + Send + Sync>;

/// A set of per-column decode overrides for one query. Columns with no
/// registered override fall back to the default OID-based decode.
#[derive(Clone, Default)]
pub struct CustomDecoders {
    by_column: HashMap<String, ColumnDecoder>,
}

impl CustomDecoders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `decoder` for `column`, replacing any prior override for
    /// the same name.
    pub fn with(
        mut self,
        column: impl Into<String>,
        decoder: impl Fn(Option<&[u8]>) -> Result<Value, Error> + Send + Sync + 'static,
    ) -> Self {
        self.by_column.insert(column.into(), Arc::new(decoder));
        self
    }

    pub(crate) fn get(&self, column: &str) -> Option<&ColumnDecoder> {
        self.by_column.get(column)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_column.is_empty()
    }
}

#[derive(Debug)]
pub(crate) struct Columns {
    pub names: Vec<String>,
    pub oids: Vec<u32>,
    index_by_name: HashMap<String, usize>,
}

impl Columns {
    pub fn from_fields(fields: &[FieldDescription]) -> Self {
        let names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
        let oids: Vec<u32> = fields.iter().map(|f| f.type_oid).collect();
        let index_by_name = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Columns { names, oids, index_by_name }
    }
}

/// One decoded row. Column values are addressable by position or by name.
#[derive(Debug, Clone)]
pub struct Row {
    pub(crate) columns: Arc<Columns>,
    pub(crate) values: Vec<Value>,
}

impl Row {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns.names
    }

    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.columns.index_by_name.get(name).and_then(|&i| self.values.get(i))
    }

    /// Decodes column `name` as `T`, failing if the column is missing or the
    /// stored `Value` doesn't convert.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, Error> {
        let value = self
            .value(name)
            .ok_or_else(|| Error::Interface(format!("no such column: {name}")))?;
        T::from_value(value).map_err(|reason| Error::ValueDecode {
            column: name.to_owned(),
            reason,
        })
    }

    pub fn get_by_index<T: FromValue>(&self, index: usize) -> Result<T, Error> {
        let name = self
            .columns
            .names
            .get(index)
            .cloned()
            .unwrap_or_else(|| index.to_string());
        let value = self
            .value_at(index)
            .ok_or_else(|| Error::Interface(format!("column index {index} out of range")))?;
        T::from_value(value).map_err(|reason| Error::ValueDecode { column: name, reason })
    }

    /// Builds `T` from the whole row via a caller-supplied row factory.
    pub fn as_class<T>(&self, factory: impl FnOnce(&Row) -> Result<T, Error>) -> Result<T, Error> {
        factory(self)
    }
}

/// Converts a decoded [`Value`] into a host type. Implemented for the common
/// scalar types; composite/enum/array columns are read via [`Value`]
/// directly or a custom row factory.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, String>;
}

macro_rules! from_value_scalar {
    ($ty:ty, $variant:ident) => {
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self, String> {
                match value {
                    Value::$variant(v) => Ok(v.clone().into()),
                    other => Err(format!("expected {}, got {other:?}", stringify!($variant))),
                }
            }
        }
    };
}

from_value_scalar!(bool, Bool);
from_value_scalar!(i16, Int2);
from_value_scalar!(i32, Int4);
from_value_scalar!(i64, Int8);
from_value_scalar!(f32, Float4);
from_value_scalar!(f64, Float8);
from_value_scalar!(String, Text);
from_value_scalar!(rust_decimal::Decimal, Numeric);

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// The outcome of `execute`/`fetch`: every row plus the server's reported
/// row count.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub(crate) rows: Vec<Row>,
    pub(crate) rows_affected: u64,
}

impl QueryResult {
    pub(crate) fn empty() -> Self {
        QueryResult { rows: Vec::new(), rows_affected: 0 }
    }

    pub(crate) fn from_command_complete(rows: Vec<Row>, complete: &CommandComplete) -> Self {
        QueryResult { rows_affected: complete.rows_affected(), rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Applies a row factory to every row, the bulk-decode counterpart of
    /// [`Row::as_class`].
    pub fn map_rows<T>(&self, factory: impl Fn(&Row) -> Result<T, Error>) -> Result<Vec<T>, Error> {
        self.rows.iter().map(factory).collect()
    }
}

/// A single-row result, returned by `fetch_row`/`fetch_val`. Zero rows or
/// more than one row is an interface error, not a silent truncation.
#[derive(Debug, Clone)]
pub struct SingleQueryResult(pub(crate) Row);

impl SingleQueryResult {
    pub fn row(&self) -> &Row {
        &self.0
    }

    pub fn into_row(self) -> Row {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<(&str, Value)>) -> Row {
        let names: Vec<String> = values.iter().map(|(n, _)| n.to_string()).collect();
        let oids = vec![0u32; names.len()];
        let index_by_name = names.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect();
        Row {
            columns: Arc::new(Columns { names, oids, index_by_name }),
            values: values.into_iter().map(|(_, v)| v).collect(),
        }
    }

    #[test]
    fn reads_typed_column_by_name() {
        let r = row(vec![("id", Value::Int4(42))]);
        let id: i32 = r.get("id").unwrap();
        assert_eq!(id, 42);
    }

    #[test]
    fn missing_column_is_an_interface_error() {
        let r = row(vec![("id", Value::Int4(42))]);
        let err = r.get::<i32>("missing").unwrap_err();
        assert!(matches!(err, Error::Interface(_)));
    }

    #[test]
    fn null_decodes_to_none() {
        let r = row(vec![("name", Value::Null)]);
        let name: Option<String> = r.get("name").unwrap();
        assert_eq!(name, None);
    }
}
