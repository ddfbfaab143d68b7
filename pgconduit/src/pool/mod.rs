//! A bounded pool of [`PgConnection`]s (spec.md §4.6).
//!
//! Acquiring blocks on a counting semaphore sized to `max_pool_size`; an
//! idle connection is popped off the front of a deque (oldest-first, so
//! `idle_timeout`/`max_lifetime` eviction sees the most stale entries
//! first) and recycled per the configured [`RecyclingMethod`] before it's
//! handed back. Returning a connection never blocks: it's pushed straight
//! onto the idle deque, or a background task is spawned to `Terminate` it
//! if the connection came back broken.

pub mod options;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::connection::PgConnection;
use crate::error::Error;
use crate::options::{ConnectConfig, RecyclingMethod};

pub use options::PoolOptions;

struct IdleConnection {
    conn: PgConnection,
    established_at: Instant,
    idle_since: Instant,
}

struct PoolInner {
    config: ConnectConfig,
    options: PoolOptions,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConnection>>,
    size: AtomicUsize,
    closed: std::sync::atomic::AtomicBool,
}

/// Cheaply `Clone`-able handle to the shared pool state.
#[derive(Clone)]
pub struct Pool(Arc<PoolInner>);

impl Pool {
    pub async fn connect(config: ConnectConfig) -> Result<Self, Error> {
        Self::connect_with(config, PoolOptions::default()).await
    }

    pub async fn connect_with(config: ConnectConfig, options: PoolOptions) -> Result<Self, Error> {
        let max_size = config.max_pool_size;
        let min_size = config.min_pool_size;

        let inner = Arc::new(PoolInner {
            config,
            options,
            semaphore: Arc::new(Semaphore::new(max_size)),
            idle: Mutex::new(VecDeque::new()),
            size: AtomicUsize::new(0),
            closed: std::sync::atomic::AtomicBool::new(false),
        });
        let pool = Pool(inner);

        for _ in 0..min_size {
            let conn = PgConnection::connect(&pool.0.config)
                .await
                .map_err(|e| Error::ConnectionPool(e.to_string()))?;
            pool.0.size.fetch_add(1, Ordering::SeqCst);
            let now = Instant::now();
            pool.0.idle.lock().unwrap().push_back(IdleConnection {
                conn,
                established_at: now,
                idle_since: now,
            });
        }

        Ok(pool)
    }

    pub async fn acquire(&self) -> Result<PoolConnection, Error> {
        if self.0.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionPool("pool is closed".into()));
        }

        let permit = tokio::time::timeout(
            self.0.options.acquire_timeout,
            self.0.semaphore.clone().acquire_owned(),
        )
        .await
        .map_err(|_| Error::ConnectionPool("timed out waiting for a connection".into()))?
        .expect("semaphore is never closed while the pool is alive");

        loop {
            let popped = self.0.idle.lock().unwrap().pop_front();
            let Some(idle) = popped else {
                let conn = PgConnection::connect(&self.0.config)
                    .await
                    .map_err(|e| Error::ConnectionPool(e.to_string()))?;
                self.0.size.fetch_add(1, Ordering::SeqCst);
                return Ok(PoolConnection {
                    pool: self.clone(),
                    conn: Some(conn),
                    permit: Some(permit),
                    established_at: Instant::now(),
                });
            };

            if self.is_expired(&idle) {
                self.0.size.fetch_sub(1, Ordering::SeqCst);
                tokio::spawn(idle.conn.close());
                continue;
            }

            let IdleConnection { mut conn, established_at, .. } = idle;
            if let Err(e) = self.recycle(&mut conn).await {
                self.0.size.fetch_sub(1, Ordering::SeqCst);
                tokio::spawn(conn.close());
                return Err(e);
            }

            return Ok(PoolConnection {
                pool: self.clone(),
                conn: Some(conn),
                permit: Some(permit),
                established_at,
            });
        }
    }

    fn is_expired(&self, idle: &IdleConnection) -> bool {
        let now = Instant::now();
        if let Some(idle_timeout) = self.0.options.idle_timeout {
            if now.duration_since(idle.idle_since) > idle_timeout {
                return true;
            }
        }
        if let Some(max_lifetime) = self.0.options.max_lifetime {
            if now.duration_since(idle.established_at) > max_lifetime {
                return true;
            }
        }
        false
    }

    async fn recycle(&self, conn: &mut PgConnection) -> Result<(), Error> {
        match self.0.config.recycling_method {
            RecyclingMethod::Fast => Ok(()),
            RecyclingMethod::Verified => conn.ping().await,
            RecyclingMethod::Clean => conn.execute_batch("DISCARD ALL").await,
        }
    }

    pub fn size(&self) -> usize {
        self.0.size.load(Ordering::SeqCst)
    }

    pub fn idle_count(&self) -> usize {
        self.0.idle.lock().unwrap().len()
    }

    /// Opens a dedicated, unpooled connection for `LISTEN`/`NOTIFY`. The
    /// listener's connection is never drawn from or returned to the idle
    /// deque: it sits outside `max_pool_size` and lives for as long as the
    /// caller holds the `Listener`.
    pub async fn listener(&self) -> Result<crate::listener::Listener, Error> {
        crate::listener::Listener::connect(&self.0.config).await
    }

    /// Marks the pool closed and terminates every idle connection. In-use
    /// connections are closed as they're returned.
    pub async fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
        let idle: Vec<IdleConnection> = self.0.idle.lock().unwrap().drain(..).collect();
        for entry in idle {
            entry.conn.close().await;
            self.0.size.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn release(&self, mut conn: PgConnection, established_at: Instant) {
        if self.0.closed.load(Ordering::SeqCst) || conn.is_closed() {
            self.0.size.fetch_sub(1, Ordering::SeqCst);
            tokio::spawn(async move { conn.close().await });
            return;
        }

        // A connection left mid-transaction by a dropped `Transaction` is
        // still structurally usable but semantically surprising to hand out
        // next. Spec.md §4.6: a connection left `InFailedTransaction` (or
        // still `InTransaction`) gets an automatic `ROLLBACK` before the
        // configured recycling method runs; if either step fails, the
        // connection is discarded rather than returned to the idle deque.
        if conn.state() != crate::connection::ConnectionState::Idle {
            let pool = self.clone();
            tokio::spawn(async move {
                let recycled = match conn.execute_batch("ROLLBACK").await {
                    Ok(()) => pool.recycle(&mut conn).await.is_ok(),
                    Err(_) => false,
                };
                if recycled {
                    pool.0.idle.lock().unwrap().push_back(IdleConnection {
                        established_at,
                        idle_since: Instant::now(),
                        conn,
                    });
                } else {
                    pool.0.size.fetch_sub(1, Ordering::SeqCst);
                    conn.close().await;
                }
            });
            return;
        }

        self.0.idle.lock().unwrap().push_back(IdleConnection {
            conn,
            established_at,
            idle_since: Instant::now(),
        });
    }
}

/// A connection checked out of a [`Pool`]. Returned to the idle deque when
/// dropped.
pub struct PoolConnection {
    pool: Pool,
    conn: Option<PgConnection>,
    permit: Option<OwnedSemaphorePermit>,
    established_at: Instant,
}

impl std::ops::Deref for PoolConnection {
    type Target = PgConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("conn is only taken in Drop")
    }
}

impl std::ops::DerefMut for PoolConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("conn is only taken in Drop")
    }
}

impl Drop for PoolConnection {
    fn drop(&mut self) {
        // Dropping the permit releases the semaphore slot regardless of
        // which branch below runs.
        let _permit = self.permit.take();
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.established_at);
        }
    }
}

