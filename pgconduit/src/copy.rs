//! Binary `COPY ... FROM STDIN` ingestion.
//!
//! [`binary_copy_to_table`] is the literal contract: the caller hands over
//! a byte source that already begins with the 19-byte binary-COPY header
//! (signature, flags, header-extension length) and the library streams it
//! verbatim as `CopyData` frames — it never parses or re-encodes what's on
//! the wire. [`copy_rows_to_table`] is the row-at-a-time convenience built
//! on top: it writes the header itself and encodes each `ParamValue` row
//! through the codec, for callers who'd rather not hand-assemble the binary
//! format.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::connection::{status_to_state, PgConnection};
use crate::error::{err_protocol, Error};
use crate::message::backend::BackendMessage;
use crate::message::frontend;
use crate::types::{encode, ParamValue};

const COPY_SIGNATURE: &[u8] = b"PGCOPY\n\xff\r\n\0";
const COPY_HEADER_LEN: usize = 19;
const READ_CHUNK: usize = 64 * 1024;

async fn begin_copy_in(conn: &mut PgConnection, sql: &str) -> Result<(), Error> {
    frontend::write_query(conn.stream.buffer(), sql);
    conn.stream.flush().await?;

    match conn.stream.recv().await? {
        BackendMessage::CopyInResponse { binary: true } => Ok(()),
        BackendMessage::CopyInResponse { binary: false } => {
            Err(err_protocol!("server offered text-format COPY, binary was requested"))
        }
        BackendMessage::ErrorResponse(info) => {
            conn.drain_until_ready().await?;
            Err(Error::ConnectionExecute(info.message))
        }
        other => Err(err_protocol!("expected CopyInResponse, got {other:?}")),
    }
}

async fn finish_copy_in(conn: &mut PgConnection) -> Result<u64, Error> {
    frontend::write_copy_done(conn.stream.buffer());
    conn.stream.flush().await?;

    let mut rows_affected = 0;
    loop {
        match conn.stream.recv().await? {
            BackendMessage::CommandComplete(complete) => {
                rows_affected = complete.rows_affected();
            }
            BackendMessage::ReadyForQuery(status) => {
                conn.state = status_to_state(status);
                return Ok(rows_affected);
            }
            BackendMessage::ErrorResponse(info) => {
                conn.drain_until_ready().await?;
                return Err(Error::ConnectionExecute(info.message));
            }
            _ => {}
        }
    }
}

async fn abort_copy_in(conn: &mut PgConnection, reason: &str) -> Result<(), Error> {
    frontend::write_copy_fail(conn.stream.buffer(), reason);
    conn.stream.flush().await?;
    conn.drain_until_ready().await
}

/// Streams `source` — a byte stream that already begins with the binary
/// COPY header — into `table` verbatim, returning the row count the server
/// reports having received. The caller is responsible for producing a
/// well-formed binary COPY payload; this function neither validates nor
/// re-encodes it, only relays it in `CopyData` chunks.
pub async fn binary_copy_to_table(
    conn: &mut PgConnection,
    table: &str,
    columns: &[&str],
    mut source: impl AsyncRead + Unpin,
) -> Result<u64, Error> {
    let column_list = if columns.is_empty() {
        String::new()
    } else {
        format!(" ({})", columns.join(", "))
    };
    let sql = format!("COPY {table}{column_list} FROM STDIN (FORMAT binary)");

    begin_copy_in(conn, &sql).await?;

    let mut header = [0u8; COPY_HEADER_LEN];
    let mut filled = 0;
    while filled < header.len() {
        let n = source.read(&mut header[filled..]).await.map_err(Error::Io)?;
        if n == 0 {
            abort_copy_in(conn, "copy source ended before the binary header").await?;
            return Err(err_protocol!(
                "binary COPY source shorter than the {COPY_HEADER_LEN}-byte header"
            ));
        }
        filled += n;
    }
    if header[..COPY_SIGNATURE.len()] != *COPY_SIGNATURE {
        abort_copy_in(conn, "bad binary COPY signature").await?;
        return Err(err_protocol!("binary COPY source does not start with the PGCOPY signature"));
    }

    frontend::write_copy_data(conn.stream.buffer(), &header);
    conn.stream.flush().await?;

    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = source.read(&mut chunk).await.map_err(Error::Io)?;
        if n == 0 {
            break;
        }
        frontend::write_copy_data(conn.stream.buffer(), &chunk[..n]);
        conn.stream.flush().await?;
    }

    finish_copy_in(conn).await
}

/// A row-at-a-time binary COPY writer: assembles the header itself and
/// encodes each row through the codec. Use [`copy_rows_to_table`] unless a
/// pre-built binary COPY payload already exists.
pub struct CopyWriter<'a> {
    conn: &'a mut PgConnection,
    column_oids: Vec<u32>,
    buffer: Vec<u8>,
    rows_written: u64,
}

impl<'a> CopyWriter<'a> {
    async fn begin(conn: &'a mut PgConnection, sql: &str, column_oids: Vec<u32>) -> Result<Self, Error> {
        begin_copy_in(conn, sql).await?;

        let mut buffer = Vec::with_capacity(READ_CHUNK);
        buffer.extend_from_slice(COPY_SIGNATURE);
        buffer.extend_from_slice(&0i32.to_be_bytes()); // flags
        buffer.extend_from_slice(&0i32.to_be_bytes()); // header extension length

        Ok(CopyWriter { conn, column_oids, buffer, rows_written: 0 })
    }

    pub async fn write_row(&mut self, values: &[ParamValue]) -> Result<(), Error> {
        self.buffer.extend_from_slice(&(values.len() as i16).to_be_bytes());
        for (index, value) in values.iter().enumerate() {
            let oid = self.column_oids.get(index).copied();
            match encode::encode(value, oid, index)? {
                Some(bytes) => {
                    self.buffer.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                    self.buffer.extend_from_slice(&bytes);
                }
                None => self.buffer.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        self.rows_written += 1;

        if self.buffer.len() >= READ_CHUNK {
            self.flush_chunk().await?;
        }
        Ok(())
    }

    async fn flush_chunk(&mut self) -> Result<(), Error> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::take(&mut self.buffer);
        frontend::write_copy_data(self.conn.stream.buffer(), &chunk);
        self.conn.stream.flush().await
    }

    /// Sends the trailer and `CopyDone`, returning the number of rows
    /// written once the server confirms completion.
    pub async fn finish(mut self) -> Result<u64, Error> {
        self.buffer.extend_from_slice(&(-1i16).to_be_bytes());
        self.flush_chunk().await?;
        finish_copy_in(self.conn).await?;
        Ok(self.rows_written)
    }

    /// Aborts the copy with `CopyFail`, e.g. because an upstream producer
    /// failed partway through.
    pub async fn abort(mut self, reason: &str) -> Result<(), Error> {
        abort_copy_in(self.conn, reason).await
    }
}

/// Encodes `rows` as binary COPY rows and streams them into `table`'s named
/// columns, returning the number of rows the server reports having
/// received.
pub async fn copy_rows_to_table(
    conn: &mut PgConnection,
    table: &str,
    columns: &[&str],
    column_oids: &[u32],
    rows: impl IntoIterator<Item = Vec<ParamValue>>,
) -> Result<u64, Error> {
    let column_list = columns.join(", ");
    let sql = format!("COPY {table} ({column_list}) FROM STDIN (FORMAT binary)");

    let mut writer = CopyWriter::begin(conn, &sql, column_oids.to_vec()).await?;
    for row in rows {
        writer.write_row(&row).await?;
    }
    writer.finish().await
}
