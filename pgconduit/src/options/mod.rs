mod config;
mod dsn;

pub use config::{
    ConnectConfig, LoadBalanceHosts, PgConnectOptions, RecyclingMethod, SslMode,
    SynchronousCommit, TargetSessionAttrs,
};
