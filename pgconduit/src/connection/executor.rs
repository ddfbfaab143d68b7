//! The extended-query and simple-query execution paths shared by
//! `PgConnection`, `Transaction`, and `Cursor`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;
use crate::message::backend::BackendMessage;
use crate::message::frontend;
use crate::query_result::{Columns, QueryResult, Row, SingleQueryResult};
use crate::types::{encode, ParamValue};

use super::kwargs;
use super::stmt_cache::PreparedStatement;
use super::PgConnection;

impl PgConnection {
    /// Parses and describes `sql` if it hasn't been seen on this connection
    /// before, caching the result keyed by the SQL text. Shorthand for
    /// [`Self::prepare_with`]`(sql, true)`.
    pub(crate) async fn prepare(&mut self, sql: &str) -> Result<PreparedStatement, Error> {
        self.prepare_with(sql, true).await
    }

    /// `prepared=true` parses once per distinct SQL text and reuses the
    /// server-side named statement across calls, as `prepare` does.
    /// `prepared=false` re-`Parse`s into the unnamed statement on every
    /// call and never touches the cache, per spec.md §4.2/§9: "on a cache
    /// miss when `prepared=False` is requested, the engine uses an unnamed
    /// statement (implicit re-Parse each call)".
    pub(crate) async fn prepare_with(&mut self, sql: &str, prepared: bool) -> Result<PreparedStatement, Error> {
        if prepared {
            if let Some(stmt) = self.statements.get(sql) {
                return Ok(stmt.clone());
            }
        }

        let name = if prepared { self.statements.next_statement_name() } else { String::new() };
        frontend::write_parse(self.stream.buffer(), &name, sql, &[]);
        frontend::write_describe(
            self.stream.buffer(),
            frontend::DescribeTarget::Statement,
            &name,
        );
        frontend::write_sync(self.stream.buffer());
        self.stream.flush().await?;

        let mut param_oids = Vec::new();
        let mut fields = Vec::new();

        loop {
            match self.stream.recv().await? {
                BackendMessage::ParseComplete => {}
                BackendMessage::ParameterDescription(d) => param_oids = d.oids,
                BackendMessage::RowDescription(d) => fields = d.fields,
                BackendMessage::NoData => {}
                BackendMessage::ErrorResponse(info) => {
                    self.drain_until_ready().await?;
                    return Err(crate::error::Error::ConnectionExecute(info.message));
                }
                BackendMessage::ReadyForQuery(status) => {
                    self.state = super::status_to_state(status);
                    break;
                }
                other => {
                    return Err(crate::error::err_protocol!(
                        "unexpected message while preparing statement: {other:?}"
                    ))
                }
            }
        }

        if prepared {
            self.statements.insert(
                sql.to_owned(),
                name.clone(),
                param_oids.clone(),
                None,
                fields.clone(),
            );
        }
        Ok(PreparedStatement { name, param_oids, fields })
    }

    /// Drains messages until `ReadyForQuery`, used to resynchronize after an
    /// error mid-pipeline.
    pub(crate) async fn drain_until_ready(&mut self) -> Result<(), Error> {
        loop {
            match self.stream.recv().await? {
                BackendMessage::ReadyForQuery(status) => {
                    self.state = super::status_to_state(status);
                    return Ok(());
                }
                _ => continue,
            }
        }
    }

    /// Runs one statement with the default `prepared=true` behavior (spec.md
    /// §9: fixed default, explicit override exposed via [`Self::execute_with`]).
    pub async fn execute(&mut self, sql: &str, params: &[ParamValue]) -> Result<QueryResult, Error> {
        self.run_extended(sql, params, true).await
    }

    /// Like [`Self::execute`], but with an explicit override of whether the
    /// statement goes through the named-statement cache (`prepared=true`) or
    /// is re-`Parse`d into the unnamed statement on every call
    /// (`prepared=false`) — spec.md §4.2: "on a cache miss when
    /// `prepared=False` is requested, the engine uses an unnamed statement".
    pub async fn execute_with(
        &mut self,
        sql: &str,
        params: &[ParamValue],
        prepared: bool,
    ) -> Result<QueryResult, Error> {
        self.run_extended(sql, params, prepared).await
    }

    pub async fn execute_kwargs(
        &mut self,
        sql: &str,
        values: HashMap<String, ParamValue>,
    ) -> Result<QueryResult, Error> {
        let (rewritten, params) = kwargs::rewrite(sql, values)?;
        self.run_extended(&rewritten, &params, true).await
    }

    pub async fn fetch(&mut self, sql: &str, params: &[ParamValue]) -> Result<QueryResult, Error> {
        self.run_extended(sql, params, true).await
    }

    /// Like [`Self::fetch`], with the same explicit `prepared` override as
    /// [`Self::execute_with`].
    pub async fn fetch_with(
        &mut self,
        sql: &str,
        params: &[ParamValue],
        prepared: bool,
    ) -> Result<QueryResult, Error> {
        self.run_extended(sql, params, prepared).await
    }

    /// Like [`Self::fetch`], but decodes columns named in `decoders` through
    /// the caller-supplied override instead of the default OID-based path.
    pub async fn fetch_with_decoders(
        &mut self,
        sql: &str,
        params: &[ParamValue],
        decoders: &crate::query_result::CustomDecoders,
    ) -> Result<QueryResult, Error> {
        self.run_extended_with(sql, params, true, Some(decoders)).await
    }

    pub async fn fetch_row(&mut self, sql: &str, params: &[ParamValue]) -> Result<SingleQueryResult, Error> {
        let result = self.run_extended(sql, params, true).await?;
        let mut rows = result.into_rows();
        match rows.len() {
            1 => Ok(SingleQueryResult(rows.pop().expect("checked len == 1"))),
            0 => Err(Error::Interface("fetch_row: query returned no rows".into())),
            n => Err(Error::Interface(format!("fetch_row: query returned {n} rows"))),
        }
    }

    pub async fn fetch_val<T: crate::query_result::FromValue>(
        &mut self,
        sql: &str,
        params: &[ParamValue],
    ) -> Result<T, Error> {
        let single = self.fetch_row(sql, params).await?;
        let row = single.into_row();
        let name = row
            .column_names()
            .first()
            .cloned()
            .ok_or_else(|| Error::Interface("fetch_val: query returned no columns".into()))?;
        row.get(&name)
    }

    /// Executes the same SQL once per parameter set inside an implicit
    /// transaction, reusing one prepared statement across every bind. A
    /// failure in any bind rolls the whole batch back; an empty batch is
    /// refused outright rather than silently doing nothing.
    pub async fn execute_many(&mut self, sql: &str, batches: &[Vec<ParamValue>]) -> Result<(), Error> {
        if batches.is_empty() {
            return Err(Error::TransactionExecute("execute_many called with an empty batch".into()));
        }

        self.execute_batch("BEGIN")
            .await
            .map_err(|e| Error::TransactionBegin(e.to_string()))?;

        if let Err(e) = self.run_many(sql, batches).await {
            let rollback = self.execute_batch("ROLLBACK").await;
            if let Err(rollback_err) = rollback {
                return Err(Error::TransactionExecute(format!(
                    "{e}; additionally failed to roll back: {rollback_err}"
                )));
            }
            return Err(e);
        }

        self.execute_batch("COMMIT")
            .await
            .map_err(|e| Error::TransactionExecute(e.to_string()))
    }

    async fn run_many(&mut self, sql: &str, batches: &[Vec<ParamValue>]) -> Result<(), Error> {
        let stmt = self.prepare(sql).await?;

        for params in batches {
            bind_execute(&mut self.stream, &stmt, params, false)?;
        }
        frontend::write_sync(self.stream.buffer());
        self.stream.flush().await?;

        loop {
            match self.stream.recv().await? {
                BackendMessage::ErrorResponse(info) => {
                    self.drain_until_ready().await?;
                    return Err(Error::TransactionExecute(info.message));
                }
                BackendMessage::ReadyForQuery(status) => {
                    self.state = super::status_to_state(status);
                    return Ok(());
                }
                _ => continue,
            }
        }
    }

    /// Runs `sql` over the simple query protocol, permitting multiple
    /// semicolon-separated statements in one round trip.
    pub async fn execute_batch(&mut self, sql: &str) -> Result<(), Error> {
        frontend::write_query(self.stream.buffer(), sql);
        self.stream.flush().await?;

        let mut first_err = None;
        loop {
            match self.stream.recv().await? {
                BackendMessage::ErrorResponse(info) if first_err.is_none() => {
                    first_err = Some(Error::ConnectionExecute(info.message));
                }
                BackendMessage::ReadyForQuery(status) => {
                    self.state = super::status_to_state(status);
                    break;
                }
                _ => continue,
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn run_extended(
        &mut self,
        sql: &str,
        params: &[ParamValue],
        prepared: bool,
    ) -> Result<QueryResult, Error> {
        self.run_extended_with(sql, params, prepared, None).await
    }

    async fn run_extended_with(
        &mut self,
        sql: &str,
        params: &[ParamValue],
        prepared: bool,
        decoders: Option<&crate::query_result::CustomDecoders>,
    ) -> Result<QueryResult, Error> {
        let stmt = self.prepare_with(sql, prepared).await?;

        let columns = Arc::new(Columns::from_fields(&stmt.fields));
        if !stmt.fields.is_empty() {
            self.type_cache.ensure_resolved(&mut self.stream, &columns.oids).await?;
        }

        bind_execute(&mut self.stream, &stmt, params, true)?;
        frontend::write_sync(self.stream.buffer());
        self.stream.flush().await?;

        let mut rows = Vec::new();
        loop {
            match self.stream.recv().await? {
                BackendMessage::BindComplete => {}
                BackendMessage::RowDescription(_) | BackendMessage::NoData => {}
                BackendMessage::DataRow(row) => {
                    rows.push(decode_row(&columns, row, &self.type_cache, decoders)?);
                }
                BackendMessage::CommandComplete(complete) => {
                    self.state = super::status_to_state(drain_sync(&mut self.stream).await?);
                    return Ok(QueryResult::from_command_complete(rows, &complete));
                }
                BackendMessage::EmptyQueryResponse => {
                    self.state = super::status_to_state(drain_sync(&mut self.stream).await?);
                    return Ok(QueryResult::empty());
                }
                BackendMessage::PortalSuspended => continue,
                BackendMessage::ErrorResponse(info) => {
                    self.drain_until_ready().await?;
                    return Err(Error::ConnectionExecute(info.message));
                }
                other => {
                    return Err(crate::error::err_protocol!(
                        "unexpected message during execute: {other:?}"
                    ))
                }
            }
        }
    }
}

fn bind_execute(
    stream: &mut super::stream::PgStream,
    stmt: &PreparedStatement,
    params: &[ParamValue],
    result_binary: bool,
) -> Result<(), Error> {
    let mut encoded = Vec::with_capacity(params.len());
    for (index, value) in params.iter().enumerate() {
        let oid = stmt.param_oids.get(index).copied();
        encoded.push(encode::encode(value, oid, index)?);
    }

    frontend::write_bind(stream.buffer(), "", &stmt.name, &encoded, result_binary);
    frontend::write_execute(stream.buffer(), "", 0);
    Ok(())
}

/// Consumes the `ReadyForQuery` that follows a `Sync`, returning the
/// reported transaction status; used once the row stream for a single
/// statement has ended.
async fn drain_sync(
    stream: &mut super::stream::PgStream,
) -> Result<crate::message::backend::TransactionStatus, Error> {
    match stream.recv().await? {
        BackendMessage::ReadyForQuery(status) => Ok(status),
        other => Err(crate::error::err_protocol!(
            "expected ReadyForQuery after Sync, got {other:?}"
        )),
    }
}

fn decode_row(
    columns: &Arc<Columns>,
    data: crate::message::backend::DataRow,
    type_cache: &super::type_cache::TypeCache,
    decoders: Option<&crate::query_result::CustomDecoders>,
) -> Result<Row, Error> {
    let mut values = Vec::with_capacity(data.values.len());
    for (i, raw) in data.values.into_iter().enumerate() {
        let name = &columns.names[i];
        let override_fn = decoders.and_then(|d| d.get(name));
        let value = match override_fn {
            Some(decode) => decode(raw.as_ref().map(|b| b.as_ref()))?,
            None => {
                let oid = columns.oids[i];
                crate::types::decode(name, oid, raw.as_ref(), type_cache)?
            }
        };
        values.push(value);
    }
    Ok(Row { columns: columns.clone(), values })
}

impl crate::types::TypeResolver for super::type_cache::TypeCache {
    fn lookup(&self, oid: u32) -> Option<&crate::types::TypeInfo> {
        self.get(oid)
    }
}
