//! Relay list codec
//!
//! A kind-10002 event declares the relays a user wants their client to use.
//! The canonical encoding is one `["r", url]` tag per relay. Older clients
//! put the list in the content instead, either as a relay-URL-keyed JSON
//! object or as loose delimited text, so parsing falls back to those forms
//! when no `r` tags are present.

use crate::event::{Event, EventTemplate, KIND_RELAY_LIST};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Tag name for relay entries.
pub const RELAY_TAG: &str = "r";

/// Errors from relay list parsing.
#[derive(Debug, Error)]
pub enum RelayListError {
    #[error("event is not a relay list (kind {0})")]
    WrongKind(u16),
}

/// Whether a URL is usable as a relay endpoint (`ws://` or `wss://`).
pub fn is_valid_relay_url(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => matches!(url.scheme(), "ws" | "wss"),
        Err(_) => false,
    }
}

/// Extract the declared relay URLs from a kind-10002 event.
///
/// Invalid URLs are dropped; duplicates keep their first position.
pub fn relay_urls_from_event(event: &Event) -> Result<Vec<String>, RelayListError> {
    if event.kind != KIND_RELAY_LIST {
        return Err(RelayListError::WrongKind(event.kind));
    }

    let mut urls = urls_from_tags(&event.tags);
    if urls.is_empty() && !event.content.is_empty() {
        urls = urls_from_content(&event.content);
        if !urls.is_empty() {
            debug!("parsed {} relay urls from legacy content form", urls.len());
        }
    }
    Ok(urls)
}

/// Build a kind-10002 template advertising the given relays (tag form).
pub fn build_relay_list(urls: &[String], created_at: u64) -> EventTemplate {
    let mut seen = HashSet::new();
    let tags = urls
        .iter()
        .filter(|url| is_valid_relay_url(url) && seen.insert(url.as_str()))
        .map(|url| vec![RELAY_TAG.to_string(), url.clone()])
        .collect();

    EventTemplate {
        created_at,
        kind: KIND_RELAY_LIST,
        tags,
        content: String::new(),
    }
}

fn urls_from_tags(tags: &[Vec<String>]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .filter(|tag| tag.len() >= 2 && tag[0] == RELAY_TAG)
        .map(|tag| tag[1].clone())
        .filter(|url| is_valid_relay_url(url) && seen.insert(url.clone()))
        .collect()
}

fn urls_from_content(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();

    // Relay-URL-keyed JSON object, e.g. {"wss://relay": {"read": true}}
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(content) {
        return map
            .keys()
            .filter(|key| is_valid_relay_url(key) && seen.insert(key.to_string()))
            .cloned()
            .collect();
    }

    // Loose newline/comma-delimited text containing relay URLs.
    content
        .split(['\n', ','])
        .map(str::trim)
        .filter(|token| is_valid_relay_url(token) && seen.insert(token.to_string()))
        .map(str::to_string)
        .collect()
}
