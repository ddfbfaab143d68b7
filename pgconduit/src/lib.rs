//! An async PostgreSQL client: wire protocol, connection pooling,
//! transactions, server-side cursors, `LISTEN`/`NOTIFY`, and binary `COPY`.
//!
//! See [`Pool`] and [`PgConnection`] for the two entry points: pooled use
//! through [`Pool::acquire`], or a single unpooled connection through
//! [`PgConnection::connect`].

pub mod connection;
pub mod copy;
pub mod cursor;
pub mod error;
pub mod listener;
pub(crate) mod message;
pub mod options;
pub mod pool;
pub mod query_result;
pub mod transaction;
pub mod types;

pub use connection::{CancelToken, ConnectionState, PgConnection};
pub use cursor::Cursor;
pub use error::{Error, Result};
pub use listener::{Listener, Notification};
pub use options::{ConnectConfig, PgConnectOptions, SslMode, TargetSessionAttrs};
pub use pool::{Pool, PoolConnection, PoolOptions};
pub use query_result::{ColumnDecoder, CustomDecoders, QueryResult, Row, SingleQueryResult};
pub use transaction::{IsolationLevel, ReadVariant, Transaction};
pub use types::{extra, ParamValue, Value};
