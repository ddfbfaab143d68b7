use std::io;

/// Low-level failures that can occur below the protocol layer.
///
/// `pgconduit::Error` wraps this with `#[from]` rather than duplicating the
/// IO/TLS taxonomy at every layer.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[cfg(feature = "tls")]
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid server certificate: {0}")]
    InvalidCertificate(String),
}
