//! Runtime networking and byte-level IO primitives shared by `pgconduit`.
//!
//! This crate is the `-core` half of the `sqlx`-style split: it knows nothing
//! about the PostgreSQL wire protocol, only how to dial a socket, optionally
//! upgrade it to TLS, and frame a byte stream into length-prefixed messages.

pub mod error;
pub mod io;
pub mod net;

pub use error::CoreError;
