//! Error types for the relay layer
//!
//! Transport and protocol failures are absorbed close to the socket and
//! surface as state (connection counts, publish statuses, placeholder
//! results). Only signer and encoding failures propagate as errors,
//! because in those cases nothing was broadcast.

use memely_nostr::signer::SignerError;
use memely_nostr::wire::WireError;
use memely_nostr::EventError;
use thiserror::Error;

/// Errors from publish operations.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("event error: {0}")]
    Event(#[from] EventError),

    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}
