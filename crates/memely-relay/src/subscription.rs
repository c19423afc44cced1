//! Subscription handles
//!
//! A subscription correlates a `REQ` with the stream of matching events.
//! The pool does no subscription-keyed routing; every consumer filters
//! the merged stream by its own id, so ids only need to be unique within
//! this client.

use crate::pool::RelayPool;
use memely_nostr::wire::{ClientMessage, WireError};
use memely_nostr::Filter;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Generate a client-unique subscription id.
pub fn generate_subscription_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

/// An open subscription on the pool's relays.
pub struct Subscription {
    id: String,
    pool: Arc<RelayPool>,
}

impl Subscription {
    /// Send a `REQ` for the filter to every connected relay.
    pub async fn open(pool: &Arc<RelayPool>, filter: Filter) -> Result<Self, WireError> {
        let id = generate_subscription_id();
        let message = ClientMessage::Req {
            subscription_id: id.clone(),
            filter,
        }
        .to_json()?;
        pool.broadcast(&message).await;
        debug!("opened subscription {}", id);

        Ok(Self {
            id,
            pool: Arc::clone(pool),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Send `CLOSE` and drop the handle.
    pub async fn close(self) {
        if let Ok(message) = (ClientMessage::Close {
            subscription_id: self.id.clone(),
        })
        .to_json()
        {
            self.pool.broadcast(&message).await;
        }
        debug!("closed subscription {}", self.id);
    }
}
