//! The framed socket a [`super::PgConnection`] reads and writes through.
//!
//! Grounded on the teacher's `PgStream`, simplified to own its socket
//! directly rather than going through a background worker actor: frontend
//! messages are buffered into one `Vec<u8>` per flush and backend messages
//! come back through a `tokio_util::codec::Framed` built on [`PgCodec`].

use futures_util::StreamExt;
use tokio_util::codec::Framed;

use pgconduit_core::net::Socket;

use crate::error::{err_protocol, Error};
use crate::message::backend::{self, BackendMessage};
use crate::message::codec::{PgCodec, RawMessage};

pub struct PgStream {
    inner: Framed<Socket, PgCodec>,
    write_buf: Vec<u8>,
}

impl PgStream {
    pub fn new(socket: Socket) -> Self {
        PgStream {
            inner: Framed::new(socket, PgCodec),
            write_buf: Vec::with_capacity(1024),
        }
    }

    /// Appends to the pending write buffer; call [`Self::flush`] to send it.
    pub fn buffer(&mut self) -> &mut Vec<u8> {
        &mut self.write_buf
    }

    pub async fn flush(&mut self) -> Result<(), Error> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        let bytes = bytes::Bytes::from(std::mem::take(&mut self.write_buf));
        self.inner
            .get_mut()
            .write_all_buf_then_flush(bytes)
            .await
    }

    pub async fn recv(&mut self) -> Result<BackendMessage, Error> {
        let raw = self.recv_raw().await?;
        backend::decode(raw)
    }

    pub async fn recv_raw(&mut self) -> Result<RawMessage, Error> {
        match self.inner.next().await {
            Some(Ok(raw)) => Ok(raw),
            Some(Err(e)) => Err(e),
            None => Err(err_protocol!("server closed the connection unexpectedly")),
        }
    }

    pub fn into_socket(self) -> Socket {
        self.inner.into_inner()
    }

    pub fn socket_mut(&mut self) -> &mut Socket {
        self.inner.get_mut()
    }
}

/// Small helper trait so `flush` reads as one call instead of importing
/// `AsyncWriteExt` at every call site.
trait WriteAllThenFlush {
    async fn write_all_buf_then_flush(&mut self, buf: bytes::Bytes) -> Result<(), Error>;
}

impl<S: tokio::io::AsyncWrite + Unpin> WriteAllThenFlush for S {
    async fn write_all_buf_then_flush(&mut self, buf: bytes::Bytes) -> Result<(), Error> {
        use tokio::io::AsyncWriteExt;
        self.write_all(&buf).await.map_err(Error::Io)?;
        self.flush().await.map_err(Error::Io)?;
        Ok(())
    }
}
