//! Relay selection
//!
//! The effective relay set comes from two sources: the fallback list
//! shipped with the client and the relay list a user has declared via
//! discovery. The user list, when non-empty, supersedes the fallback.
//! Changes are published on a watch channel so the pool migration driver
//! reacts exactly once per real change.

use memely_nostr::is_valid_relay_url;
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

/// Source of truth for the effective relay set. Single writer; the pool
/// migration driver is the only consumer of the watch stream.
pub struct RelaySelector {
    fallback: Vec<String>,
    user: Mutex<Vec<String>>,
    effective_tx: watch::Sender<Vec<String>>,
}

impl RelaySelector {
    /// Create a selector with the given fallback list.
    pub fn new(fallback: Vec<String>) -> Self {
        let fallback = sanitize(fallback);
        let (effective_tx, _) = watch::channel(fallback.clone());
        Self {
            fallback,
            user: Mutex::new(Vec::new()),
            effective_tx,
        }
    }

    /// Replace the user-declared relay list. Entries without a `ws`/`wss`
    /// scheme are dropped; the accepted set is returned. An empty accepted
    /// set falls back to the shipped list.
    pub fn update_user_relays(&self, urls: &[String]) -> Vec<String> {
        let accepted = sanitize(urls.to_vec());

        {
            let mut user = self.user.lock().expect("selector lock poisoned");
            if *user == accepted {
                return accepted;
            }
            *user = accepted.clone();
        }

        let effective = if accepted.is_empty() {
            self.fallback.clone()
        } else {
            accepted.clone()
        };
        let effective_len = effective.len();

        let changed = self.effective_tx.send_if_modified(|current| {
            if *current != effective {
                *current = effective;
                true
            } else {
                false
            }
        });
        if changed {
            info!("effective relay list changed ({} relays)", effective_len);
        }

        accepted
    }

    /// Drop the user list and fall back to the shipped relays.
    pub fn clear_user_relays(&self) {
        self.update_user_relays(&[]);
    }

    /// The effective relay list right now.
    pub fn effective_relays(&self) -> Vec<String> {
        self.effective_tx.borrow().clone()
    }

    /// The current user-declared list (possibly empty).
    pub fn user_relays(&self) -> Vec<String> {
        self.user.lock().expect("selector lock poisoned").clone()
    }

    /// Subscribe to effective-list changes.
    pub fn watch_effective(&self) -> watch::Receiver<Vec<String>> {
        self.effective_tx.subscribe()
    }
}

fn sanitize(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| {
            if !is_valid_relay_url(url) {
                debug!("dropping invalid relay url: {}", url);
                return false;
            }
            seen.insert(url.clone())
        })
        .collect()
}
