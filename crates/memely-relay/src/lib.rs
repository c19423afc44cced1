//! Relay connectivity for the Memely client
//!
//! This crate maintains concurrent WebSocket connections to multiple
//! independent, unreliable relays and turns their interleaved frame
//! streams into consistent domain views. It covers the relay pool and its
//! merged inbound stream, relay selection and discovery, the event
//! repository, per-relay publish acceptance tracking, and the
//! reference-counted connection keepalive.
//!
//! Services are constructed explicitly and wired together by the
//! embedding application:
//!
//! ```no_run
//! use std::sync::Arc;
//! use memely_relay::config::{default_relay_urls, KeepaliveConfig, PoolConfig, RepositoryConfig};
//! use memely_relay::{EventRepository, PoolKeepalive, RelayPool, RelaySelector};
//!
//! # async fn wire(signer: Arc<dyn memely_nostr::EventSigner>) {
//! let selector = Arc::new(RelaySelector::new(default_relay_urls()));
//! let pool = Arc::new(RelayPool::new(
//!     selector.effective_relays(),
//!     PoolConfig::default(),
//! ));
//! let keepalive = PoolKeepalive::new(
//!     Arc::clone(&pool),
//!     Arc::clone(&selector),
//!     KeepaliveConfig::default(),
//! );
//! keepalive.start().await;
//!
//! let repository = EventRepository::new(pool, selector, signer, RepositoryConfig::default());
//! let _guard = keepalive.acquire();
//! let feed = repository.fetch_default_feed().await;
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod connection;
pub mod error;
pub mod keepalive;
pub mod pool;
pub mod publish;
pub mod repository;
pub mod selection;
pub mod subscription;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use connection::RelayConnection;
pub use error::PublishError;
pub use keepalive::{KeepaliveGuard, PoolKeepalive};
pub use pool::{PoolFrame, RelayPool};
pub use publish::{PublishHistory, PublishResult, PublishTracker, RelayPublishStatus};
pub use repository::{
    classify_interactions, EventRepository, FeedQuery, InteractionSummary, ProfileSource,
    UserProfile,
};
pub use selection::RelaySelector;
pub use subscription::{generate_subscription_id, Subscription};
