//! Relay pool
//!
//! Owns one connection per endpoint in the current relay set, fans
//! outbound messages out to every live connection, and merges every
//! inbound frame into one shared multi-consumer stream tagged with its
//! relay of origin.
//!
//! Partial failure is the normal case: some relays connect, some refuse,
//! some time out. The pool never fails a whole operation because a subset
//! of relays did.

use crate::config::PoolConfig;
use crate::connection::RelayConnection;
use memely_nostr::wire::RelayMessage;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A parsed inbound frame together with the relay that delivered it.
#[derive(Debug, Clone)]
pub struct PoolFrame {
    pub relay: String,
    pub message: RelayMessage,
}

struct ConnectionEntry {
    conn: RelayConnection,
    forwarder: JoinHandle<()>,
}

/// A pool of relay connections with a merged inbound stream.
pub struct RelayPool {
    relays: RwLock<Vec<String>>,
    connections: RwLock<HashMap<String, ConnectionEntry>>,
    connected: Arc<AtomicUsize>,
    frames_tx: broadcast::Sender<PoolFrame>,
    config: PoolConfig,
}

impl RelayPool {
    /// Create a pool for the given relay set (does not connect).
    pub fn new(relays: Vec<String>, config: PoolConfig) -> Self {
        let (frames_tx, _) = broadcast::channel(config.frame_buffer);
        Self {
            relays: RwLock::new(normalize_relay_set(relays)),
            connections: RwLock::new(HashMap::new()),
            connected: Arc::new(AtomicUsize::new(0)),
            frames_tx,
            config,
        }
    }

    /// Subscribe to the merged inbound stream. Every subscriber receives
    /// every frame; a subscriber that falls behind loses the oldest frames
    /// and resumes from the oldest retained one.
    pub fn frames(&self) -> broadcast::Receiver<PoolFrame> {
        self.frames_tx.subscribe()
    }

    /// Number of connections that connected successfully and have not been
    /// torn down by a set replacement. Not continuously health-checked.
    pub fn connected_count(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    /// Current relay set, in order.
    pub async fn current_relays(&self) -> Vec<String> {
        self.relays.read().await.clone()
    }

    /// Endpoints with a currently open connection.
    pub async fn live_relays(&self) -> Vec<String> {
        self.connections
            .read()
            .await
            .values()
            .filter(|entry| entry.conn.is_open())
            .map(|entry| entry.conn.url().to_string())
            .collect()
    }

    /// Open a connection for every endpoint in the set that lacks a live
    /// one. Attempts run concurrently, each bounded by the configured
    /// connect timeout; failures and stragglers are discarded.
    pub async fn connect_all(&self) {
        let targets: Vec<String> = {
            let relays = self.relays.read().await;
            let conns = self.connections.read().await;
            relays
                .iter()
                .filter(|url| {
                    conns
                        .get(url.as_str())
                        .map_or(true, |entry| !entry.conn.is_open())
                })
                .cloned()
                .collect()
        };
        if targets.is_empty() {
            return;
        }

        // Drop entries whose connection died since the last fill.
        {
            let mut conns = self.connections.write().await;
            for url in &targets {
                if let Some(entry) = conns.remove(url) {
                    entry.forwarder.abort();
                    entry.conn.close().await;
                }
            }
        }

        debug!("connecting to {} relays", targets.len());
        let attempted = targets.len();
        let attempts = targets.into_iter().map(|url| {
            let connect_timeout = self.config.connect_timeout;
            async move {
                let conn = RelayConnection::new(url, connect_timeout);
                let ok = conn.connect().await;
                (conn, ok)
            }
        });
        let results = futures::future::join_all(attempts).await;

        let mut opened = 0;
        let mut conns = self.connections.write().await;
        for (conn, ok) in results {
            if !ok {
                debug!("discarding failed connection to {}", conn.url());
                continue;
            }
            let Some(inbound) = conn.take_inbound().await else {
                continue;
            };
            let forwarder = self.spawn_forwarder(conn.url().to_string(), inbound);
            conns.insert(conn.url().to_string(), ConnectionEntry { conn, forwarder });
            self.connected.fetch_add(1, Ordering::SeqCst);
            opened += 1;
        }
        info!("relay pool opened {}/{} connections", opened, attempted);
    }

    /// Replace the relay set. Order-insensitive no-op when the set is
    /// unchanged; otherwise tears every connection down, swaps the set,
    /// and reconnects. This is the sole migration path.
    pub async fn update_relays(&self, new_relays: Vec<String>) -> bool {
        let normalized = normalize_relay_set(new_relays);
        {
            let current = self.relays.read().await;
            if same_relay_set(&current, &normalized) {
                debug!("relay set unchanged, skipping reconnect");
                return false;
            }
        }

        info!("replacing relay set with {} relays", normalized.len());
        self.close_connections().await;
        *self.relays.write().await = normalized;
        self.connect_all().await;
        true
    }

    /// Fire-and-forget send to every live connection. Dropped silently
    /// when nothing is connected; per-connection failures are swallowed
    /// and observed only through missing responses.
    pub async fn broadcast(&self, message: &str) {
        if self.connected_count() == 0 {
            debug!("no connected relays, dropping outbound message");
            return;
        }

        let targets = self.open_connections().await;
        for conn in targets {
            let message = message.to_string();
            tokio::spawn(async move {
                if !conn.send(&message).await {
                    debug!("send to {} failed", conn.url());
                }
            });
        }
    }

    /// Stronger delivery for critical publishes: awaits every send and
    /// retries the connections that refused, with a fixed backoff between
    /// rounds.
    pub async fn broadcast_with_retry(&self, message: &str, max_retries: u32) {
        let mut targets = self.open_connections().await;
        if targets.is_empty() {
            debug!("no connected relays, dropping outbound message");
            return;
        }

        let mut attempt = 0;
        loop {
            let sends = targets.iter().map(|conn| conn.send(message));
            let results = futures::future::join_all(sends).await;

            let failed: Vec<RelayConnection> = targets
                .iter()
                .zip(results)
                .filter(|(_, delivered)| !delivered)
                .map(|(conn, _)| conn.clone())
                .collect();

            if failed.is_empty() {
                return;
            }
            if attempt >= max_retries {
                warn!(
                    "{} relays did not accept the send after {} retries",
                    failed.len(),
                    max_retries
                );
                return;
            }

            attempt += 1;
            debug!("retrying send to {} relays (attempt {})", failed.len(), attempt);
            tokio::time::sleep(self.config.send_retry_backoff).await;
            targets = failed;
        }
    }

    /// Tear down every connection and close the pool.
    pub async fn close(&self) {
        self.close_connections().await;
        info!("relay pool closed");
    }

    async fn open_connections(&self) -> Vec<RelayConnection> {
        self.connections
            .read()
            .await
            .values()
            .filter(|entry| entry.conn.is_open())
            .map(|entry| entry.conn.clone())
            .collect()
    }

    async fn close_connections(&self) {
        let entries: Vec<ConnectionEntry> = {
            let mut conns = self.connections.write().await;
            conns.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.forwarder.abort();
            entry.conn.close().await;
        }
        self.connected.store(0, Ordering::SeqCst);
    }

    fn spawn_forwarder(
        &self,
        relay: String,
        mut inbound: mpsc::UnboundedReceiver<String>,
    ) -> JoinHandle<()> {
        let frames_tx = self.frames_tx.clone();
        let connected = Arc::clone(&self.connected);
        tokio::spawn(async move {
            while let Some(text) = inbound.recv().await {
                match RelayMessage::from_json(&text) {
                    Ok(message) => {
                        let _ = frames_tx.send(PoolFrame {
                            relay: relay.clone(),
                            message,
                        });
                    }
                    Err(e) => debug!("discarding frame from {}: {}", relay, e),
                }
            }
            let _ = connected.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(count.saturating_sub(1))
            });
            debug!("inbound stream from {} ended", relay);
        })
    }
}

fn normalize_relay_set(relays: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    relays
        .into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn same_relay_set(a: &[String], b: &[String]) -> bool {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(relays: &[&str]) -> RelayPool {
        RelayPool::new(
            relays.iter().map(|r| r.to_string()).collect(),
            PoolConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_new_pool_dedups_relay_set() {
        let pool = pool_with(&["ws://127.0.0.1:1", "ws://127.0.0.1:2", "ws://127.0.0.1:1"]);
        assert_eq!(
            pool.current_relays().await,
            vec!["ws://127.0.0.1:1", "ws://127.0.0.1:2"]
        );
        assert_eq!(pool.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_update_relays_same_set_is_noop() {
        let pool = pool_with(&["ws://127.0.0.1:1", "ws://127.0.0.1:2"]);

        // Order-insensitive equality: no teardown, no reconnect attempt.
        let changed = pool
            .update_relays(vec![
                "ws://127.0.0.1:2".to_string(),
                "ws://127.0.0.1:1".to_string(),
            ])
            .await;
        assert!(!changed);
        assert_eq!(
            pool.current_relays().await,
            vec!["ws://127.0.0.1:1", "ws://127.0.0.1:2"]
        );
    }

    #[tokio::test]
    async fn test_update_relays_new_set_swaps() {
        let pool = pool_with(&["ws://127.0.0.1:1"]);

        let changed = pool.update_relays(vec!["ws://127.0.0.1:9".to_string()]).await;
        assert!(changed);
        assert_eq!(pool.current_relays().await, vec!["ws://127.0.0.1:9"]);
        // The endpoint refuses connections, so nothing is live.
        assert_eq!(pool.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_with_no_connections_is_noop() {
        let pool = pool_with(&["ws://127.0.0.1:1"]);
        pool.broadcast(r#"["CLOSE","sub1"]"#).await;
        pool.broadcast_with_retry(r#"["CLOSE","sub1"]"#, 2).await;
    }

    #[tokio::test]
    async fn test_connect_all_discards_failures() {
        let pool = pool_with(&["ws://127.0.0.1:1"]);
        pool.connect_all().await;
        assert_eq!(pool.connected_count(), 0);
        assert!(pool.live_relays().await.is_empty());
    }

    #[test]
    fn test_same_relay_set() {
        let a = vec!["x".to_string(), "y".to_string()];
        let b = vec!["y".to_string(), "x".to_string()];
        let c = vec!["x".to_string()];
        assert!(same_relay_set(&a, &b));
        assert!(!same_relay_set(&a, &c));
    }
}
