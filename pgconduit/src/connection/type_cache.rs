//! Per-connection cache of catalog-derived [`TypeInfo`], resolved lazily the
//! first time a `RowDescription` mentions an OID with no built-in decode
//! path (spec.md §9, "Composite / enum decoding").
//!
//! Resolution happens eagerly right after `RowDescription` arrives rather
//! than from inside `decode`, so the per-row decode path stays synchronous
//! against an already-populated cache.

use std::collections::HashMap;

use crate::error::{err_protocol, Error};
use crate::message::backend::BackendMessage;
use crate::message::frontend;
use crate::types::oid;
use crate::types::{TypeInfo, TypeKind};

use super::stream::PgStream;

#[derive(Default)]
pub struct TypeCache {
    entries: HashMap<u32, TypeInfo>,
}

impl TypeCache {
    pub fn new() -> Self {
        TypeCache::default()
    }

    pub fn get(&self, oid: u32) -> Option<&TypeInfo> {
        self.entries.get(&oid)
    }

    /// Resolves every OID in `oids` that isn't a built-in and isn't already
    /// cached, via one `pg_type`/`pg_attribute` round-trip per missing OID
    /// and its composite fields.
    pub async fn ensure_resolved(&mut self, stream: &mut PgStream, oids: &[u32]) -> Result<(), Error> {
        let mut pending: Vec<u32> = oids
            .iter()
            .copied()
            .filter(|o| !oid::is_builtin(*o) && !self.entries.contains_key(o))
            .collect();
        pending.sort_unstable();
        pending.dedup();

        for type_oid in pending {
            self.resolve_one(stream, type_oid).await?;
        }
        Ok(())
    }

    async fn resolve_one(&mut self, stream: &mut PgStream, type_oid: u32) -> Result<(), Error> {
        let sql = format!(
            "SELECT typname, typtype, typbasetype FROM pg_catalog.pg_type WHERE oid = {type_oid}"
        );
        let row = simple_query_single_row(stream, &sql).await?;
        let Some(row) = row else {
            return Err(err_protocol!("pg_type has no row for oid {type_oid}"));
        };

        let name = row[0].clone().unwrap_or_default();
        let typtype = row[1].clone().unwrap_or_default();
        let typbasetype: u32 = row[2]
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let kind = match typtype.as_str() {
            "e" => TypeKind::Enum,
            "c" => {
                let fields = self.resolve_composite_fields(stream, type_oid).await?;
                TypeKind::Composite { fields }
            }
            _ => TypeKind::Base { base_oid: typbasetype },
        };

        self.entries.insert(type_oid, TypeInfo { oid: type_oid, name, kind });
        Ok(())
    }

    async fn resolve_composite_fields(
        &self,
        stream: &mut PgStream,
        type_oid: u32,
    ) -> Result<Vec<(String, u32)>, Error> {
        let sql = format!(
            "SELECT a.attname, a.atttypid FROM pg_catalog.pg_attribute a \
             JOIN pg_catalog.pg_type t ON t.typrelid = a.attrelid \
             WHERE t.oid = {type_oid} AND a.attnum > 0 AND NOT a.attisdropped \
             ORDER BY a.attnum"
        );
        let rows = simple_query_rows(stream, &sql).await?;
        rows.into_iter()
            .map(|row| {
                let name = row[0].clone().unwrap_or_default();
                let oid: u32 = row[1]
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| err_protocol!("malformed atttypid for composite {type_oid}"))?;
                Ok((name, oid))
            })
            .collect()
    }
}

async fn simple_query_single_row(
    stream: &mut PgStream,
    sql: &str,
) -> Result<Option<Vec<Option<String>>>, Error> {
    let rows = simple_query_rows(stream, sql).await?;
    Ok(rows.into_iter().next())
}

/// Runs `sql` over the simple query protocol (text-format results) and
/// collects every data row as `Option<String>` columns.
async fn simple_query_rows(stream: &mut PgStream, sql: &str) -> Result<Vec<Vec<Option<String>>>, Error> {
    frontend::write_query(stream.buffer(), sql);
    stream.flush().await?;

    let mut rows = Vec::new();
    loop {
        match stream.recv().await? {
            BackendMessage::RowDescription(_) => {}
            BackendMessage::DataRow(row) => {
                let cols = row
                    .values
                    .into_iter()
                    .map(|v| v.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
                    .collect();
                rows.push(cols);
            }
            BackendMessage::CommandComplete(_) | BackendMessage::EmptyQueryResponse => {}
            BackendMessage::ErrorResponse(info) => {
                return Err(Error::Database {
                    code: info.code,
                    message: info.message,
                    detail: info.detail,
                    connection_discarded: false,
                });
            }
            BackendMessage::ReadyForQuery(_) => break,
            _ => {}
        }
    }
    Ok(rows)
}
