//! A single, non-pooled connection to a PostgreSQL backend (spec.md §3).

mod cancel;
mod establish;
mod executor;
pub(crate) mod kwargs;
mod stmt_cache;
pub(crate) mod stream;
pub(crate) mod type_cache;

pub use cancel::CancelToken;

use std::collections::HashMap;

use crate::error::Error;
use crate::message::backend::TransactionStatus;
use crate::message::frontend;
use crate::options::ConnectConfig;

use stmt_cache::StatementCache;
use stream::PgStream;
use type_cache::TypeCache;

/// Mirrors the server's reported transaction status plus the two states
/// that are purely client-side (spec.md §3: "Busy while a request is
/// in-flight; Closed once Terminate has been sent or the socket failed").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    InTransaction,
    InFailedTransaction,
    Busy,
    Closed,
}

pub(crate) fn status_to_state(status: TransactionStatus) -> ConnectionState {
    match status {
        TransactionStatus::Idle => ConnectionState::Idle,
        TransactionStatus::InTransaction => ConnectionState::InTransaction,
        TransactionStatus::InFailedTransaction => ConnectionState::InFailedTransaction,
    }
}

pub struct PgConnection {
    pub(crate) stream: PgStream,
    pub(crate) state: ConnectionState,
    pub(crate) process_id: u32,
    pub(crate) secret_key: u32,
    pub(crate) parameters: HashMap<String, String>,
    pub(crate) statements: StatementCache,
    pub(crate) type_cache: TypeCache,
    pub(crate) host: String,
    pub(crate) port: u16,
    /// Bumped whenever a transaction ends or a cursor is declared, so a
    /// [`crate::cursor::Cursor`] can tell whether the connection has moved
    /// past the point where it was declared without keeping a raw pointer
    /// back to itself (spec.md §9, "Cursor lifetime").
    pub(crate) generation: u64,
}

impl PgConnection {
    pub async fn connect(config: &ConnectConfig) -> Result<Self, Error> {
        establish::connect(config).await
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn backend_process_id(&self) -> u32 {
        self.process_id
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Issues `Terminate` and marks the connection unusable. Never fails:
    /// a write error on the way out is immaterial, the socket is being
    /// dropped regardless.
    pub async fn close(mut self) {
        frontend::write_terminate(self.stream.buffer());
        let _ = self.stream.flush().await;
        self.state = ConnectionState::Closed;
    }

    /// A lightweight round trip used by the pool's `Verified` recycling
    /// method (spec.md §4.6).
    pub(crate) async fn ping(&mut self) -> Result<(), Error> {
        self.execute_batch("").await
    }
}
