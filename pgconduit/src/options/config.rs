//! `ConnectConfig` and its fluent builder, `PgConnectOptions`.
//!
//! Grounded on the teacher's `connection/establish.rs` conventions (an
//! options struct built with `&mut self -> &mut Self` setters) and spec.md
//! §3/§4.8: every setter validates eagerly and a bad value is reported
//! synchronously as [`Error::ConnectionPoolConfiguration`], never deferred to
//! connect time.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub(crate) fn requires_tls(self) -> bool {
        !matches!(self, SslMode::Disable)
    }

    pub(crate) fn verify_hostname(self) -> bool {
        matches!(self, SslMode::VerifyFull)
    }

    pub(crate) fn verify_ca(self) -> bool {
        matches!(self, SslMode::VerifyCa | SslMode::VerifyFull)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSessionAttrs {
    Any,
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalanceHosts {
    Disable,
    Random,
}

/// Policy applied to a connection before it is re-admitted to the pool's
/// idle deque (spec.md §3 invariant (c), §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecyclingMethod {
    /// Do nothing; assume the connection is healthy.
    Fast,
    /// Issue a lightweight round-trip (an empty Sync) before returning it.
    Verified,
    /// Issue `DISCARD ALL` before returning it.
    Clean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynchronousCommit {
    On,
    Off,
    Local,
    RemoteWrite,
    RemoteApply,
}

impl SynchronousCommit {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            SynchronousCommit::On => "on",
            SynchronousCommit::Off => "off",
            SynchronousCommit::Local => "local",
            SynchronousCommit::RemoteWrite => "remote_write",
            SynchronousCommit::RemoteApply => "remote_apply",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct KeepaliveConfig {
    pub enabled: bool,
    pub idle: Duration,
    pub interval: Duration,
    pub retries: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        KeepaliveConfig {
            enabled: true,
            idle: Duration::from_secs(2 * 60 * 60),
            interval: Duration::from_secs(15),
            retries: 9,
        }
    }
}

/// Immutable connection configuration, produced by [`PgConnectOptions`].
///
/// See spec.md §3: "Immutable after construction."
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub(crate) hosts: Vec<String>,
    pub(crate) ports: Vec<u16>,
    pub(crate) user: String,
    pub(crate) password: Option<String>,
    pub(crate) database: String,
    pub(crate) application_name: Option<String>,
    pub(crate) options: Option<String>,
    pub(crate) ssl_mode: SslMode,
    pub(crate) ssl_root_cert: Option<PathBuf>,
    pub(crate) target_session_attrs: TargetSessionAttrs,
    pub(crate) load_balance_hosts: LoadBalanceHosts,
    pub(crate) connect_timeout: Duration,
    pub(crate) keepalive: KeepaliveConfig,
    pub(crate) tcp_user_timeout: Option<Duration>,
    pub(crate) synchronous_commit: Option<SynchronousCommit>,
    pub(crate) recycling_method: RecyclingMethod,
    pub(crate) max_pool_size: usize,
    pub(crate) min_pool_size: usize,
}

const MIN_DURATION: Duration = Duration::from_micros(1);

fn check_duration(field: &'static str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Ok(());
    }
    if value < MIN_DURATION {
        return Err(Error::ConnectionPoolConfiguration(format!(
            "{field} must be at least 1 microsecond, got {value:?}"
        )));
    }
    Ok(())
}

/// Fluent builder for [`ConnectConfig`]. Every setter validates immediately.
#[derive(Debug, Clone)]
pub struct PgConnectOptions {
    hosts: Vec<String>,
    ports: Vec<u16>,
    user: String,
    password: Option<String>,
    database: String,
    application_name: Option<String>,
    options: Option<String>,
    ssl_mode: SslMode,
    ssl_root_cert: Option<PathBuf>,
    target_session_attrs: TargetSessionAttrs,
    load_balance_hosts: LoadBalanceHosts,
    connect_timeout: Duration,
    keepalive: KeepaliveConfig,
    tcp_user_timeout: Option<Duration>,
    synchronous_commit: Option<SynchronousCommit>,
    recycling_method: RecyclingMethod,
    max_pool_size: usize,
    min_pool_size: usize,
}

impl Default for PgConnectOptions {
    fn default() -> Self {
        PgConnectOptions {
            hosts: vec!["localhost".into()],
            ports: vec![5432],
            user: whoami::username(),
            password: None,
            database: whoami::username(),
            application_name: None,
            options: None,
            ssl_mode: SslMode::Prefer,
            ssl_root_cert: None,
            target_session_attrs: TargetSessionAttrs::Any,
            load_balance_hosts: LoadBalanceHosts::Disable,
            connect_timeout: Duration::from_secs(30),
            keepalive: KeepaliveConfig::default(),
            tcp_user_timeout: None,
            synchronous_commit: None,
            recycling_method: RecyclingMethod::Fast,
            max_pool_size: 10,
            min_pool_size: 0,
        }
    }
}

impl PgConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(dsn: &str) -> Result<Self> {
        super::dsn::parse(dsn)
    }

    pub fn host(&mut self, host: impl Into<String>) -> &mut Self {
        self.hosts = vec![host.into()];
        self
    }

    pub fn hosts(&mut self, hosts: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn port(&mut self, port: u16) -> &mut Self {
        self.ports = vec![port];
        self
    }

    pub fn ports(&mut self, ports: impl IntoIterator<Item = u16>) -> &mut Self {
        self.ports = ports.into_iter().collect();
        self
    }

    pub fn username(&mut self, user: impl Into<String>) -> &mut Self {
        self.user = user.into();
        self
    }

    pub fn password(&mut self, password: impl Into<String>) -> &mut Self {
        self.password = Some(password.into());
        self
    }

    pub fn database(&mut self, database: impl Into<String>) -> &mut Self {
        self.database = database.into();
        self
    }

    pub fn application_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn options(&mut self, options: impl Into<String>) -> &mut Self {
        self.options = Some(options.into());
        self
    }

    pub fn ssl_mode(&mut self, mode: SslMode) -> &mut Self {
        self.ssl_mode = mode;
        self
    }

    pub fn ssl_root_cert(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.ssl_root_cert = Some(path.into());
        self
    }

    pub fn target_session_attrs(&mut self, attrs: TargetSessionAttrs) -> &mut Self {
        self.target_session_attrs = attrs;
        self
    }

    pub fn load_balance_hosts(&mut self, mode: LoadBalanceHosts) -> &mut Self {
        self.load_balance_hosts = mode;
        self
    }

    pub fn connect_timeout(&mut self, timeout: Duration) -> Result<&mut Self> {
        check_duration("connect_timeout", timeout)?;
        self.connect_timeout = timeout;
        Ok(self)
    }

    pub fn keepalives(&mut self, enabled: bool) -> &mut Self {
        self.keepalive.enabled = enabled;
        self
    }

    pub fn keepalives_idle(&mut self, idle: Duration) -> Result<&mut Self> {
        check_duration("keepalives_idle", idle)?;
        self.keepalive.idle = idle;
        Ok(self)
    }

    pub fn keepalives_interval(&mut self, interval: Duration) -> Result<&mut Self> {
        check_duration("keepalives_interval", interval)?;
        self.keepalive.interval = interval;
        Ok(self)
    }

    pub fn keepalives_retries(&mut self, retries: u32) -> &mut Self {
        self.keepalive.retries = retries;
        self
    }

    pub fn tcp_user_timeout(&mut self, timeout: Duration) -> Result<&mut Self> {
        check_duration("tcp_user_timeout", timeout)?;
        self.tcp_user_timeout = Some(timeout);
        Ok(self)
    }

    pub fn synchronous_commit(&mut self, mode: SynchronousCommit) -> &mut Self {
        self.synchronous_commit = Some(mode);
        self
    }

    pub fn conn_recycling_method(&mut self, method: RecyclingMethod) -> &mut Self {
        self.recycling_method = method;
        self
    }

    pub fn max_pool_size(&mut self, size: usize) -> Result<&mut Self> {
        if size < 1 {
            return Err(Error::ConnectionPoolConfiguration(
                "max_pool_size must be >= 1".into(),
            ));
        }
        self.max_pool_size = size;
        Ok(self)
    }

    pub fn min_pool_size(&mut self, size: usize) -> &mut Self {
        self.min_pool_size = size;
        self
    }

    /// Validates host/port arity (spec.md §3: "host/port arity must match or
    /// one is singular") and freezes the builder into a [`ConnectConfig`].
    pub fn build(&self) -> Result<ConnectConfig> {
        if self.ssl_mode.verify_ca() && self.ssl_root_cert.is_none() {
            return Err(Error::ConnectionPoolConfiguration(
                "sslrootcert is required for verify-ca and verify-full sslmode".into(),
            ));
        }

        let (hosts, ports) = match (self.hosts.len(), self.ports.len()) {
            (h, p) if h == p => (self.hosts.clone(), self.ports.clone()),
            (h, 1) => (self.hosts.clone(), vec![self.ports[0]; h]),
            (1, p) => (vec![self.hosts[0].clone(); p], self.ports.clone()),
            (h, p) => {
                return Err(Error::ConnectionPoolConfiguration(format!(
                    "host list ({h}) and port list ({p}) arity mismatch"
                )))
            }
        };

        if self.min_pool_size > self.max_pool_size {
            return Err(Error::ConnectionPoolConfiguration(
                "min_pool_size must be <= max_pool_size".into(),
            ));
        }

        Ok(ConnectConfig {
            hosts,
            ports,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            application_name: self.application_name.clone(),
            options: self.options.clone(),
            ssl_mode: self.ssl_mode,
            ssl_root_cert: self.ssl_root_cert.clone(),
            target_session_attrs: self.target_session_attrs,
            load_balance_hosts: self.load_balance_hosts,
            connect_timeout: self.connect_timeout,
            keepalive: self.keepalive.clone(),
            tcp_user_timeout: self.tcp_user_timeout,
            synchronous_commit: self.synchronous_commit,
            recycling_method: self.recycling_method,
            max_pool_size: self.max_pool_size,
            min_pool_size: self.min_pool_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_sub_microsecond_durations() {
        let mut opts = PgConnectOptions::new();
        let err = opts.keepalives_idle(Duration::from_nanos(500)).unwrap_err();
        assert!(matches!(err, Error::ConnectionPoolConfiguration(_)));
    }

    #[test]
    fn pairs_singular_port_with_host_list() {
        let mut opts = PgConnectOptions::new();
        opts.hosts(["a", "b", "c"]);
        opts.port(5433);
        let cfg = opts.build().unwrap();
        assert_eq!(cfg.hosts, vec!["a", "b", "c"]);
        assert_eq!(cfg.ports, vec![5433, 5433, 5433]);
    }

    #[test]
    fn rejects_mismatched_host_port_arity() {
        let mut opts = PgConnectOptions::new();
        opts.hosts(["a", "b"]);
        opts.ports([1, 2, 3]);
        assert!(opts.build().is_err());
    }

    #[test]
    fn verify_ca_requires_root_cert() {
        let mut opts = PgConnectOptions::new();
        opts.ssl_mode(SslMode::VerifyFull);
        assert!(opts.build().is_err());
    }
}
