//! `LISTEN`/`NOTIFY` support: a dedicated connection, channel subscriptions,
//! and callback dispatch through a bounded channel drained by a small
//! worker pool so a slow callback never stalls the socket read (spec.md
//! §4.9 Design Notes).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::connection::PgConnection;
use crate::error::Error;
use crate::message::backend::BackendMessage;
use crate::options::ConnectConfig;

#[derive(Debug, Clone)]
pub struct Notification {
    pub process_id: u32,
    pub channel: String,
    pub payload: String,
}

type Callback = Arc<dyn Fn(Notification) + Send + Sync>;

pub struct Listener {
    conn: PgConnection,
    callbacks: Arc<Mutex<HashMap<String, Vec<Callback>>>>,
    /// One queue per worker, sharded by channel name so every notification
    /// for a given channel always lands on the same worker and is processed
    /// in the order `drive` sent it (spec.md §4.7/§5: per-channel ordering).
    worker_txs: Vec<mpsc::Sender<Notification>>,
    workers: Vec<tokio::task::JoinHandle<()>>,
    shutdown: Arc<tokio::sync::Notify>,
}

impl Listener {
    pub async fn connect(config: &ConnectConfig) -> Result<Self, Error> {
        let conn = PgConnection::connect(config)
            .await
            .map_err(|e| Error::ListenerStart(e.to_string()))?;
        Ok(Listener {
            conn,
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            worker_txs: Vec::new(),
            workers: Vec::new(),
            shutdown: Arc::new(tokio::sync::Notify::new()),
        })
    }

    pub async fn listen(&mut self, channel: &str) -> Result<(), Error> {
        self.conn
            .execute_batch(&format!("LISTEN {}", quote_ident(channel)))
            .await
            .map_err(|e| Error::ListenerStart(e.to_string()))
    }

    pub async fn abort_listen(&mut self, channel: &str) -> Result<(), Error> {
        self.conn
            .execute_batch(&format!("UNLISTEN {}", quote_ident(channel)))
            .await
            .map_err(|e| Error::ListenerStart(e.to_string()))
    }

    pub fn add_callback(&self, channel: &str, callback: impl Fn(Notification) + Send + Sync + 'static) {
        self.callbacks
            .lock()
            .unwrap()
            .entry(channel.to_owned())
            .or_default()
            .push(Arc::new(callback));
    }

    pub fn clear_channel_callbacks(&self, channel: &str) {
        self.callbacks.lock().unwrap().remove(channel);
    }

    pub fn clear_all_channels(&self) {
        self.callbacks.lock().unwrap().clear();
    }

    /// Spins up `worker_count` tasks, each draining its own bounded queue of
    /// dispatched notifications. Call once before `drive`; a second call
    /// fails with `ListenerStart` rather than silently leaking a second
    /// worker pool (spec.md §4.7: "double startup fails with
    /// `ListenerStartError`").
    ///
    /// Notifications are sharded across workers by hashing the channel
    /// name, not round-robined: two workers draining one shared queue could
    /// pick up same-channel notifications concurrently and dispatch them
    /// out of order, violating the "sequentially, in arrival order"
    /// per-channel guarantee (spec.md §4.7/§5). Pinning every channel to one
    /// worker's queue means its notifications are always delivered in the
    /// order `drive` observed them on the wire.
    pub fn startup(&mut self, worker_count: usize) -> Result<(), Error> {
        if !self.worker_txs.is_empty() {
            return Err(Error::ListenerStart("startup() called more than once".into()));
        }

        for _ in 0..worker_count.max(1) {
            let (tx, mut rx) = mpsc::channel::<Notification>(256);
            self.worker_txs.push(tx);
            let callbacks = self.callbacks.clone();
            self.workers.push(tokio::spawn(async move {
                while let Some(notification) = rx.recv().await {
                    dispatch(&callbacks, notification);
                }
            }));
        }
        Ok(())
    }

    /// Reads from the wire until `shutdown()` is called or the connection
    /// fails, dispatching every `NotificationResponse` to the worker pool.
    pub async fn drive(&mut self) -> Result<(), Error> {
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => return Ok(()),
                message = self.conn.stream.recv() => {
                    if let BackendMessage::NotificationResponse(n) = message? {
                        let notification = Notification {
                            process_id: n.process_id,
                            channel: n.channel,
                            payload: n.payload,
                        };
                        if !self.worker_txs.is_empty() {
                            let shard = channel_shard(&notification.channel, self.worker_txs.len());
                            let _ = self.worker_txs[shard].send(notification).await;
                        }
                    }
                }
            }
        }
    }

    /// Reads and returns the next notification directly, bypassing
    /// callback dispatch, for callers that want to iterate manually.
    pub async fn next_notification(&mut self) -> Result<Notification, Error> {
        loop {
            if let BackendMessage::NotificationResponse(n) = self.conn.stream.recv().await? {
                return Ok(Notification { process_id: n.process_id, channel: n.channel, payload: n.payload });
            }
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
        for worker in &self.workers {
            worker.abort();
        }
    }
}

fn dispatch(callbacks: &Arc<Mutex<HashMap<String, Vec<Callback>>>>, notification: Notification) {
    let callbacks = callbacks.lock().unwrap();
    if let Some(cbs) = callbacks.get(&notification.channel) {
        for cb in cbs {
            cb(notification.clone());
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Deterministic channel -> worker index mapping so every notification for
/// `channel` always routes to the same worker's queue.
fn channel_shard(channel: &str, worker_count: usize) -> usize {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    channel.hash(&mut hasher);
    (hasher.finish() % worker_count as u64) as usize
}
