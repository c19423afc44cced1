//! Connection lifecycle manager
//!
//! The pool's lifetime belongs to the application, not to any one screen:
//! the feed, profile, and editor views all lean on the same connections
//! concurrently. Screens express interest through reference-counted
//! guards, and two supervisory tasks run under the manager's own scope: a
//! relay-sync task that applies effective-list changes to the pool, and a
//! periodic health check that refills dropped connections while anyone is
//! interested.

use crate::config::KeepaliveConfig;
use crate::pool::RelayPool;
use crate::selection::RelaySelector;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Reference-counted keep-alive wrapper around the pool.
pub struct PoolKeepalive {
    pool: Arc<RelayPool>,
    selector: Arc<RelaySelector>,
    interest: Arc<AtomicUsize>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    config: KeepaliveConfig,
}

impl PoolKeepalive {
    pub fn new(
        pool: Arc<RelayPool>,
        selector: Arc<RelaySelector>,
        config: KeepaliveConfig,
    ) -> Self {
        Self {
            pool,
            selector,
            interest: Arc::new(AtomicUsize::new(0)),
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Adopt the effective relay set, open connections, and start the
    /// supervisory tasks. Safe to call once; later calls are no-ops.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        self.pool.update_relays(self.selector.effective_relays()).await;
        self.pool.connect_all().await;

        let sync_task = {
            let pool = Arc::clone(&self.pool);
            let mut effective = self.selector.watch_effective();
            tokio::spawn(async move {
                while effective.changed().await.is_ok() {
                    let relays = effective.borrow_and_update().clone();
                    pool.update_relays(relays).await;
                }
            })
        };

        let health_task = {
            let pool = Arc::clone(&self.pool);
            let interest = Arc::clone(&self.interest);
            let period = self.config.health_check_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if interest.load(Ordering::SeqCst) == 0 {
                        continue;
                    }
                    debug!("keepalive health check");
                    pool.connect_all().await;
                }
            })
        };

        let mut tasks = self.tasks.lock().expect("keepalive lock poisoned");
        tasks.push(sync_task);
        tasks.push(health_task);
        info!("keepalive started");
    }

    /// Register interest in live connections. The returned guard releases
    /// it on drop.
    pub fn acquire(&self) -> KeepaliveGuard {
        self.interest.fetch_add(1, Ordering::SeqCst);
        KeepaliveGuard {
            interest: Arc::clone(&self.interest),
        }
    }

    /// Number of outstanding guards.
    pub fn interest_count(&self) -> usize {
        self.interest.load(Ordering::SeqCst)
    }

    /// Stop the supervisory tasks and close the pool.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().expect("keepalive lock poisoned");
            tasks.drain(..).collect()
        };
        for handle in handles {
            handle.abort();
        }
        self.pool.close().await;
        self.started.store(false, Ordering::SeqCst);
        info!("keepalive stopped");
    }
}

/// RAII interest token handed to screens and background workers.
pub struct KeepaliveGuard {
    interest: Arc<AtomicUsize>,
}

impl Drop for KeepaliveGuard {
    fn drop(&mut self) {
        self.interest.fetch_sub(1, Ordering::SeqCst);
    }
}
