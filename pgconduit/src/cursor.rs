//! Server-side cursors (spec.md §4.7): `DECLARE`, `FETCH` in its several
//! directions, `MOVE`, and `CLOSE`.
//!
//! A `Cursor` checks a generation counter snapshotted at `DECLARE` time
//! against its connection's current generation before every operation,
//! rather than holding a raw pointer back to the transaction that declared
//! it (spec.md §9, "Cursor lifetime"): once the owning transaction commits,
//! rolls back, or declares another cursor, the generation advances and any
//! further use of a stale `Cursor` fails fast with `CursorClosed` instead of
//! sending a doomed `FETCH` to the server.

use crate::connection::PgConnection;
use crate::error::Error;
use crate::query_result::QueryResult;
use crate::transaction::Transaction;

pub struct Cursor<'a> {
    conn: &'a mut PgConnection,
    name: String,
    generation: u64,
    closed: bool,
}

impl<'a> Transaction<'a> {
    /// Declares a cursor for `sql` within this transaction. The cursor is
    /// only valid until the transaction ends (no `WITH HOLD`).
    pub async fn declare_cursor(&mut self, name: &str, sql: &str) -> Result<Cursor<'_>, Error> {
        let declare = format!("DECLARE {name} CURSOR FOR {sql}");
        self.execute(&declare, &[])
            .await
            .map_err(|e| Error::Cursor(e.to_string()))?;

        let conn = self.connection_mut();
        conn.generation += 1;
        let generation = conn.generation;

        Ok(Cursor { conn, name: name.to_owned(), generation, closed: false })
    }
}

impl<'a> Cursor<'a> {
    fn check_open(&self) -> Result<(), Error> {
        if self.closed {
            return Err(Error::CursorClosed);
        }
        if self.conn.generation != self.generation {
            return Err(Error::CursorClosed);
        }
        Ok(())
    }

    async fn fetch_direction(&mut self, direction: &str) -> Result<QueryResult, Error> {
        self.check_open()?;
        let sql = format!("FETCH {direction} FROM {}", self.name);
        self.conn.fetch(&sql, &[]).await.map_err(|e| Error::Cursor(e.to_string()))
    }

    async fn move_direction(&mut self, direction: &str) -> Result<(), Error> {
        self.check_open()?;
        let sql = format!("MOVE {direction} FROM {}", self.name);
        self.conn
            .execute(&sql, &[])
            .await
            .map(|_| ())
            .map_err(|e| Error::Cursor(e.to_string()))
    }

    pub async fn fetch(&mut self, count: i64) -> Result<QueryResult, Error> {
        self.fetch_direction(&count.to_string()).await
    }

    pub async fn fetch_next(&mut self) -> Result<QueryResult, Error> {
        self.fetch_direction("NEXT").await
    }

    pub async fn fetch_prior(&mut self) -> Result<QueryResult, Error> {
        self.fetch_direction("PRIOR").await
    }

    pub async fn fetch_first(&mut self) -> Result<QueryResult, Error> {
        self.fetch_direction("FIRST").await
    }

    pub async fn fetch_last(&mut self) -> Result<QueryResult, Error> {
        self.fetch_direction("LAST").await
    }

    pub async fn fetch_absolute(&mut self, position: i64) -> Result<QueryResult, Error> {
        self.fetch_direction(&format!("ABSOLUTE {position}")).await
    }

    pub async fn fetch_relative(&mut self, offset: i64) -> Result<QueryResult, Error> {
        self.fetch_direction(&format!("RELATIVE {offset}")).await
    }

    pub async fn fetch_forward_all(&mut self) -> Result<QueryResult, Error> {
        self.fetch_direction("FORWARD ALL").await
    }

    pub async fn fetch_backward(&mut self, count: i64) -> Result<QueryResult, Error> {
        self.fetch_direction(&format!("BACKWARD {count}")).await
    }

    pub async fn fetch_backward_all(&mut self) -> Result<QueryResult, Error> {
        self.fetch_direction("BACKWARD ALL").await
    }

    pub async fn move_next(&mut self) -> Result<(), Error> {
        self.move_direction("NEXT").await
    }

    pub async fn move_forward(&mut self, count: i64) -> Result<(), Error> {
        self.move_direction(&count.to_string()).await
    }

    pub async fn close(mut self) -> Result<(), Error> {
        self.check_open()?;
        let sql = format!("CLOSE {}", self.name);
        self.conn
            .execute_batch(&sql)
            .await
            .map_err(|e| Error::Cursor(e.to_string()))?;
        self.conn.generation += 1;
        self.closed = true;
        Ok(())
    }
}
