//! Query cancellation: PostgreSQL requires a brand new TCP connection
//! carrying the target backend's process id and secret key, sent once and
//! then dropped, rather than anything over the connection's own socket.
//!
//! A [`CancelToken`] captures what that side-channel needs and nothing else,
//! so it can outlive (and be cloned away from) the [`super::PgConnection`]
//! it was cut from — the natural shape for a future spawned off to race a
//! slow statement.

use pgconduit_core::net::Socket;

use crate::error::Error;
use crate::message::frontend;

use super::PgConnection;

/// Everything needed to cancel a query running on one backend, independent
/// of the connection that's running it.
#[derive(Debug, Clone)]
pub struct CancelToken {
    host: String,
    port: u16,
    process_id: u32,
    secret_key: u32,
}

impl PgConnection {
    /// Captures a [`CancelToken`] for the query currently (or about to be)
    /// running on this connection.
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            host: self.host.clone(),
            port: self.port,
            process_id: self.process_id,
            secret_key: self.secret_key,
        }
    }
}

impl CancelToken {
    /// Dials a fresh connection to the backend and sends `CancelRequest`.
    /// PostgreSQL does not acknowledge this message, so a successful send is
    /// all there is to observe; the in-flight statement still has to run to
    /// `ReadyForQuery` before the connection it was running on is usable
    /// again.
    pub async fn cancel(&self) -> Result<(), Error> {
        use tokio::io::AsyncWriteExt;

        let mut socket = Socket::connect_tcp(&self.host, self.port)
            .await
            .map_err(Error::Io)?;

        let mut buf = Vec::with_capacity(16);
        frontend::write_cancel_request(&mut buf, self.process_id, self.secret_key);
        socket.write_all(&buf).await.map_err(Error::Io)?;
        socket.flush().await.map_err(Error::Io)?;
        Ok(())
    }
}
