//! Signed event envelope and canonical identity
//!
//! Events are identified by the SHA-256 of a canonical serialization of
//! their fields. Two events with the same id received from different relays
//! are the same logical event; the id is the deduplication key everywhere
//! in the client.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

// ----------------------------------------------------------------------------
// Event Kinds
// ----------------------------------------------------------------------------

/// Profile metadata (replaceable).
pub const KIND_PROFILE_METADATA: u16 = 0;
/// Short text note; memes and replies are published as this kind.
pub const KIND_TEXT_NOTE: u16 = 1;
/// Repost of another note.
pub const KIND_REPOST: u16 = 6;
/// Reaction to another note.
pub const KIND_REACTION: u16 = 7;
/// Declared relay list used for discovery.
pub const KIND_RELAY_LIST: u16 = 10002;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors from event construction and serialization.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Event Types
// ----------------------------------------------------------------------------

/// A signed event as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// 32-byte lowercase hex SHA-256 of the canonical serialization
    pub id: String,
    /// 32-byte lowercase hex public key of the author
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Kind discriminator
    pub kind: u16,
    /// Ordered sequence of ordered string tuples
    pub tags: Vec<Vec<String>>,
    /// Arbitrary string content
    pub content: String,
    /// 64-byte lowercase hex signature
    pub sig: String,
}

impl Event {
    /// Whether any `e` tag of this event references `event_id`.
    pub fn references_event(&self, event_id: &str) -> bool {
        self.tags
            .iter()
            .any(|tag| tag.len() >= 2 && tag[0] == "e" && tag[1] == event_id)
    }
}

/// An event before signing; the id and signature are derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl UnsignedEvent {
    /// Build an unsigned event from a template and the signing key's pubkey.
    pub fn from_template(template: EventTemplate, pubkey: String) -> Self {
        Self {
            pubkey,
            created_at: template.created_at,
            kind: template.kind,
            tags: template.tags,
            content: template.content,
        }
    }
}

/// Everything the application chooses about an event; the pubkey comes from
/// the signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTemplate {
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

// ----------------------------------------------------------------------------
// Canonical Serialization and Identity
// ----------------------------------------------------------------------------

/// Serialize an unsigned event into the canonical form hashed for the id.
///
/// Format: compact JSON array `[0, pubkey, created_at, kind, tags, content]`
/// with string escaping per JSON rules. This form must be byte-exact for
/// interop; the id of the same logical event must match on every client.
pub fn serialize_for_id(event: &UnsignedEvent) -> Result<String, EventError> {
    if !validate_unsigned_event(event) {
        return Err(EventError::InvalidEvent(
            "pubkey must be 64 lowercase hex characters".to_string(),
        ));
    }

    serde_json::to_string(&(
        0,
        &event.pubkey,
        event.created_at,
        event.kind,
        &event.tags,
        &event.content,
    ))
    .map_err(|e| EventError::Serialization(e.to_string()))
}

/// Compute the event id: lowercase hex SHA-256 of the canonical form.
pub fn event_id(event: &UnsignedEvent) -> Result<String, EventError> {
    let serialized = serialize_for_id(event)?;
    let digest = Sha256::digest(serialized.as_bytes());
    Ok(hex::encode(digest))
}

// ----------------------------------------------------------------------------
// Structural Validation
// ----------------------------------------------------------------------------

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len
        && s.chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Validate the structure of an unsigned event.
pub fn validate_unsigned_event(event: &UnsignedEvent) -> bool {
    is_lower_hex(&event.pubkey, 64)
}

/// Validate the structure of a signed event (does not verify the signature).
pub fn validate_event(event: &Event) -> bool {
    is_lower_hex(&event.id, 64)
        && is_lower_hex(&event.pubkey, 64)
        && event.sig.len() == 128
        && event.sig.chars().all(|c| c.is_ascii_hexdigit())
}

// ----------------------------------------------------------------------------
// Ordering
// ----------------------------------------------------------------------------

/// Sort events reverse-chronologically, breaking ties by id.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| match b.created_at.cmp(&a.created_at) {
        std::cmp::Ordering::Equal => a.id.cmp(&b.id),
        other => other,
    });
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
