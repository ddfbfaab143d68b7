//! The crate's single error taxonomy.
//!
//! One `thiserror`-derived enum grouped along three axes: configuration
//! (bad pool/connect options, caught eagerly before any I/O happens),
//! connectivity (dial, TLS, auth, mid-session drops), and operation
//! (a failed query, transaction, cursor, or listener action).

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // -- configuration axis --------------------------------------------------
    #[error("invalid pool configuration: {0}")]
    ConnectionPoolConfiguration(String),

    // -- connectivity axis ----------------------------------------------------
    #[error("connection pool error: {0}")]
    ConnectionPool(String),

    #[error("failed to connect to postgres: {0}")]
    Connection(String),

    #[error("connection is closed")]
    ConnectionClosed,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Tls(#[from] pgconduit_core::CoreError),

    #[error("authentication failed: {0}")]
    Authentication(String),

    // -- operation axis -------------------------------------------------------
    #[error("server error {code}: {message}")]
    Database {
        code: String,
        message: String,
        detail: Option<String>,
        /// Whether the underlying connection was discarded as a result.
        connection_discarded: bool,
    },

    #[error("error executing statement: {0}")]
    ConnectionExecute(String),

    #[error("transaction failed to begin: {0}")]
    TransactionBegin(String),

    #[error("error executing statement inside transaction: {0}")]
    TransactionExecute(String),

    #[error("transaction is already closed")]
    TransactionClosed,

    #[error("savepoint error: {0}")]
    TransactionSavepoint(String),

    #[error("cursor error: {0}")]
    Cursor(String),

    #[error("cursor is closed")]
    CursorClosed,

    #[error("listener failed to start: {0}")]
    ListenerStart(String),

    #[error("listener is closed")]
    ListenerClosed,

    #[error("could not encode value for parameter {index}: {reason}")]
    ValueEncode { index: usize, reason: String },

    #[error("could not decode column {column}: {reason}")]
    ValueDecode { column: String, reason: String },

    #[error("no decoder registered for OID {0} and no custom decoder was supplied")]
    UnknownOid(u32),

    #[error("interface misuse: {0}")]
    Interface(String),

    #[error("invalid UUID value: {0}")]
    UuidValueConvert(String),

    #[error("invalid MAC address value: {0}")]
    MacAddrConversion(String),

    #[error("{0}")]
    Base(String),
}

impl Error {
    /// Whether this error left the backing connection broken and unfit for
    /// reuse. Used by the Pool to decide whether to discard a handle instead
    /// of returning it to the idle deque.
    pub fn connection_is_broken(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Tls(_)
                | Error::Connection(_)
                | Error::ConnectionClosed
                | Error::Authentication(_)
        ) || matches!(self, Error::Database { connection_discarded: true, .. })
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Connection(msg.into())
    }
}

/// Shorthand used throughout the message layer: `err_protocol!("{}", ...)`
/// builds an [`Error::Connection`] describing a wire-protocol violation,
/// mirroring `sqlx_core`'s `err_protocol!` macro.
macro_rules! err_protocol {
    ($($fmt:tt)*) => {
        $crate::error::Error::protocol(format!($($fmt)*))
    };
}
pub(crate) use err_protocol;
