//! Configuration for the relay layer

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fallback relays shipped with the client, used until a user-declared
/// relay list is discovered.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.nostr.band",
];

/// Fallback relay list as owned strings.
pub fn default_relay_urls() -> Vec<String> {
    DEFAULT_RELAYS.iter().map(|url| url.to_string()).collect()
}

// ----------------------------------------------------------------------------
// Pool Configuration
// ----------------------------------------------------------------------------

/// Configuration for the relay pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Per-attempt connect timeout. Attempts run concurrently, so this also
    /// bounds a whole `connect_all` fill.
    pub connect_timeout: Duration,
    /// Backoff between rounds of `broadcast_with_retry`.
    pub send_retry_backoff: Duration,
    /// Capacity of the merged inbound frame stream. On overflow the oldest
    /// frames are dropped and lagging consumers resume from the oldest
    /// retained frame.
    pub frame_buffer: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            send_retry_backoff: Duration::from_millis(500),
            frame_buffer: 1024,
        }
    }
}

// ----------------------------------------------------------------------------
// Repository Configuration
// ----------------------------------------------------------------------------

/// Configuration for the event repository: bounded waits, publish policy,
/// and the reaction conventions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Bound for the combined metadata + relay-list discovery fetch.
    pub combined_fetch_timeout: Duration,
    /// Bound for a metadata-only fetch.
    pub metadata_timeout: Duration,
    /// Grace window for interaction aggregation responses.
    pub interaction_window: Duration,
    /// Bound for feed collection.
    pub feed_window: Duration,
    /// Window in which publish acknowledgements are collected.
    pub publish_window: Duration,
    /// Retry rounds for publish sends that a connection refused.
    pub max_send_retries: u32,
    /// Fraction of relays that must accept a publish for it to count as
    /// successful. Protocol convention, kept configurable.
    pub acceptance_threshold: f64,
    /// Publish results retained for diagnostics, most recent first.
    pub history_capacity: usize,
    /// Result limit requested for interaction subscriptions.
    pub interaction_limit: u64,
    /// Reaction content counted as a like. Protocol convention.
    pub like_content: String,
    /// Reaction content counted as a dislike. Protocol convention.
    pub dislike_content: String,
    /// Hashtag under which memes are published and browsed.
    pub feed_hashtag: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            combined_fetch_timeout: Duration::from_secs(30),
            metadata_timeout: Duration::from_secs(15),
            interaction_window: Duration::from_secs(3),
            feed_window: Duration::from_secs(3),
            publish_window: Duration::from_secs(5),
            max_send_retries: 3,
            acceptance_threshold: 0.5,
            history_capacity: 50,
            interaction_limit: 100,
            like_content: "+".to_string(),
            dislike_content: "-".to_string(),
            feed_hashtag: "memely".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Keepalive Configuration
// ----------------------------------------------------------------------------

/// Configuration for the connection lifecycle manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepaliveConfig {
    /// Period of the connection health check.
    pub health_check_interval: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
        }
    }
}
