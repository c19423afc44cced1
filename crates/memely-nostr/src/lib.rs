//! Nostr protocol core for the Memely client
//!
//! This crate provides the protocol-level building blocks used by the relay
//! layer: the signed event envelope with its canonical serialization and id
//! computation, subscription filters, client/relay wire framing with
//! defense-in-depth parse limits, the profile-metadata and relay-list
//! codecs, and the external-signer boundary. It performs no I/O.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod event;
pub mod filter;
pub mod profile;
pub mod relay_list;
pub mod signer;
pub mod wire;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use event::{
    event_id, serialize_for_id, sort_events, Event, EventError, EventTemplate, UnsignedEvent,
    KIND_PROFILE_METADATA, KIND_REACTION, KIND_RELAY_LIST, KIND_REPOST, KIND_TEXT_NOTE,
};
pub use filter::Filter;
pub use profile::{ProfileError, ProfileMetadata, PLACEHOLDER_NAME};
pub use relay_list::{build_relay_list, is_valid_relay_url, relay_urls_from_event, RelayListError};
pub use signer::{complete_event, EventSigner, SignerError, SignerResponse};
pub use wire::{ClientMessage, FrameLimits, RelayMessage, WireError};
