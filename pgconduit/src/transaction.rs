//! Transaction and savepoint lifecycle.
//!
//! A nested `begin()` creates a savepoint instead of a second `BEGIN`
//! (Postgres itself would just warn and keep the outer transaction); the
//! savepoint stack unwinds in LIFO order as each level commits or rolls
//! back.

use crate::connection::PgConnection;
use crate::error::Error;
use crate::query_result::QueryResult;
use crate::types::ParamValue;

/// `BEGIN ISOLATION LEVEL ...` (spec.md §3 Data Model, `Transaction`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
    ReadUncommitted,
}

impl IsolationLevel {
    fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
        }
    }
}

/// `READ ONLY` / `READ WRITE` transaction variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadVariant {
    #[default]
    ReadWrite,
    ReadOnly,
}

impl ReadVariant {
    fn as_sql(self) -> &'static str {
        match self {
            ReadVariant::ReadWrite => "READ WRITE",
            ReadVariant::ReadOnly => "READ ONLY",
        }
    }
}

/// A transaction (or savepoint) owning exclusive access to its connection
/// for its lifetime. Dropping it without calling `commit`/`rollback` leaves
/// the transaction open; the next use of the connection will simply operate
/// inside it, matching how a raw `BEGIN` with no matching `COMMIT` behaves.
pub struct Transaction<'a> {
    conn: &'a mut PgConnection,
    savepoint_name: Option<String>,
    /// Names pushed by `create_savepoint`, popped by `release_savepoint`/
    /// `rollback_savepoint` (spec.md §4.4).
    savepoints: Vec<String>,
    depth: usize,
    closed: bool,
}

impl PgConnection {
    /// Plain `BEGIN` with the server's default isolation level, read-write,
    /// not deferrable. Shorthand for [`PgConnection::transaction`] with every
    /// argument defaulted.
    pub async fn begin(&mut self) -> Result<Transaction<'_>, Error> {
        self.transaction(IsolationLevel::default(), ReadVariant::default(), false).await
    }

    /// `BEGIN ISOLATION LEVEL ... [READ ONLY|READ WRITE] [DEFERRABLE]`
    /// (spec.md §4.4). `deferrable` is only meaningful combined with
    /// `Serializable` + `ReadOnly`; Postgres silently ignores it otherwise.
    pub async fn transaction(
        &mut self,
        isolation: IsolationLevel,
        read_variant: ReadVariant,
        deferrable: bool,
    ) -> Result<Transaction<'_>, Error> {
        let mut sql = format!(
            "BEGIN ISOLATION LEVEL {} {}",
            isolation.as_sql(),
            read_variant.as_sql()
        );
        if deferrable {
            sql.push_str(" DEFERRABLE");
        }
        self.execute_batch(&sql)
            .await
            .map_err(|e| Error::TransactionBegin(e.to_string()))?;
        self.generation += 1;
        Ok(Transaction {
            conn: self,
            savepoint_name: None,
            savepoints: Vec::new(),
            depth: 0,
            closed: false,
        })
    }
}

impl<'a> Transaction<'a> {
    /// Starts a nested transaction as a savepoint named after its depth
    /// (`pgconduit_sp_1`, `pgconduit_sp_2`, ...), unique within one top-level
    /// transaction.
    pub async fn begin(&mut self) -> Result<Transaction<'_>, Error> {
        self.check_open()?;
        let depth = self.depth + 1;
        let name = format!("pgconduit_sp_{depth}");
        self.create_savepoint(&name).await?;
        Ok(Transaction {
            conn: &mut *self.conn,
            savepoint_name: Some(name),
            savepoints: Vec::new(),
            depth,
            closed: false,
        })
    }

    /// Issues `SAVEPOINT name` and pushes it onto this transaction's
    /// savepoint stack. Re-issuing an already-current name is idempotent:
    /// Postgres itself just moves the savepoint to the new position, so this
    /// releases and re-declares it under the hood rather than erroring
    /// (spec.md §9, picking the "implicit release+recreate" reading of the
    /// open question over "raise").
    pub async fn create_savepoint(&mut self, name: &str) -> Result<(), Error> {
        self.check_open()?;
        self.conn
            .execute_batch(&format!("SAVEPOINT {name}"))
            .await
            .map_err(|e| Error::TransactionSavepoint(e.to_string()))?;
        self.conn.generation += 1;
        if let Some(pos) = self.savepoints.iter().position(|n| n == name) {
            self.savepoints.truncate(pos);
        }
        self.savepoints.push(name.to_owned());
        Ok(())
    }

    /// `ROLLBACK TO SAVEPOINT name`. Fails with `TransactionSavepoint` if
    /// `name` isn't on this transaction's savepoint stack; pops it and every
    /// savepoint declared after it, matching Postgres discarding them too.
    pub async fn rollback_savepoint(&mut self, name: &str) -> Result<(), Error> {
        self.check_open()?;
        let pos = self
            .savepoints
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::TransactionSavepoint(format!("no such savepoint: {name}")))?;
        self.conn
            .execute_batch(&format!("ROLLBACK TO SAVEPOINT {name}"))
            .await
            .map_err(|e| Error::TransactionSavepoint(e.to_string()))?;
        self.conn.generation += 1;
        self.savepoints.truncate(pos + 1);
        Ok(())
    }

    /// `RELEASE SAVEPOINT name`, popping it (and any more-nested savepoint
    /// declared after it, which `RELEASE` also discards) off the stack.
    pub async fn release_savepoint(&mut self, name: &str) -> Result<(), Error> {
        self.check_open()?;
        let pos = self
            .savepoints
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::TransactionSavepoint(format!("no such savepoint: {name}")))?;
        self.conn
            .execute_batch(&format!("RELEASE SAVEPOINT {name}"))
            .await
            .map_err(|e| Error::TransactionSavepoint(e.to_string()))?;
        self.conn.generation += 1;
        self.savepoints.truncate(pos);
        Ok(())
    }

    pub async fn commit(mut self) -> Result<(), Error> {
        let sql = match &self.savepoint_name {
            Some(name) => format!("RELEASE SAVEPOINT {name}"),
            None => "COMMIT".to_owned(),
        };
        self.conn
            .execute_batch(&sql)
            .await
            .map_err(|e| Error::TransactionExecute(e.to_string()))?;
        self.conn.generation += 1;
        self.closed = true;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), Error> {
        let sql = match &self.savepoint_name {
            Some(name) => format!("ROLLBACK TO SAVEPOINT {name}"),
            None => "ROLLBACK".to_owned(),
        };
        self.conn
            .execute_batch(&sql)
            .await
            .map_err(|e| Error::TransactionExecute(e.to_string()))?;
        self.conn.generation += 1;
        self.closed = true;
        Ok(())
    }

    pub async fn execute(&mut self, sql: &str, params: &[ParamValue]) -> Result<QueryResult, Error> {
        self.check_open()?;
        self.conn.execute(sql, params).await
    }

    /// Like [`Self::execute`], with the same explicit `prepared` override as
    /// [`PgConnection::execute_with`].
    pub async fn execute_with(
        &mut self,
        sql: &str,
        params: &[ParamValue],
        prepared: bool,
    ) -> Result<QueryResult, Error> {
        self.check_open()?;
        self.conn.execute_with(sql, params, prepared).await
    }

    pub async fn fetch(&mut self, sql: &str, params: &[ParamValue]) -> Result<QueryResult, Error> {
        self.check_open()?;
        self.conn.fetch(sql, params).await
    }

    /// Like [`Self::fetch`], with the same explicit `prepared` override as
    /// [`PgConnection::fetch_with`].
    pub async fn fetch_with(
        &mut self,
        sql: &str,
        params: &[ParamValue],
        prepared: bool,
    ) -> Result<QueryResult, Error> {
        self.check_open()?;
        self.conn.fetch_with(sql, params, prepared).await
    }

    pub async fn fetch_with_decoders(
        &mut self,
        sql: &str,
        params: &[ParamValue],
        decoders: &crate::query_result::CustomDecoders,
    ) -> Result<QueryResult, Error> {
        self.check_open()?;
        self.conn.fetch_with_decoders(sql, params, decoders).await
    }

    pub async fn fetch_row(
        &mut self,
        sql: &str,
        params: &[ParamValue],
    ) -> Result<crate::query_result::SingleQueryResult, Error> {
        self.check_open()?;
        self.conn.fetch_row(sql, params).await
    }

    pub(crate) fn connection_mut(&mut self) -> &mut PgConnection {
        self.conn
    }

    pub(crate) fn generation(&self) -> u64 {
        self.conn.generation
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.closed {
            Err(Error::TransactionClosed)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_level_sql_matches_postgres_grammar() {
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
        assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::RepeatableRead.as_sql(), "REPEATABLE READ");
        assert_eq!(IsolationLevel::ReadUncommitted.as_sql(), "READ UNCOMMITTED");
    }

    #[test]
    fn read_variant_sql_matches_postgres_grammar() {
        assert_eq!(ReadVariant::ReadOnly.as_sql(), "READ ONLY");
        assert_eq!(ReadVariant::ReadWrite.as_sql(), "READ WRITE");
    }

    #[test]
    fn defaults_are_read_committed_read_write() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
        assert_eq!(ReadVariant::default(), ReadVariant::ReadWrite);
    }
}
