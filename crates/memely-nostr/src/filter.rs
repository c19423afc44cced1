//! Subscription filters
//!
//! A filter describes the subset of events a relay should return for a
//! subscription: kinds, authors, ids, tag references, a time range, and a
//! result limit. Unset fields are omitted from the serialized form.

use serde::Serialize;
use std::collections::BTreeMap;

/// A server-side query descriptor sent inside a `REQ` frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Tag queries keyed by `#<letter>`, e.g. `#e` or `#t`.
    #[serde(flatten)]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    pub fn kinds(mut self, kinds: Vec<u16>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn since(mut self, timestamp: u64) -> Self {
        self.since = Some(timestamp);
        self
    }

    pub fn until(mut self, timestamp: u64) -> Self {
        self.until = Some(timestamp);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Add a tag query; `key` is the tag letter without the `#`.
    pub fn tag(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.tags.insert(format!("#{}", key.into()), values);
        self
    }

    /// Query events referencing the given event ids (`#e`).
    pub fn event_refs(self, event_ids: Vec<String>) -> Self {
        self.tag("e", event_ids)
    }

    /// Query events mentioning the given pubkeys (`#p`).
    pub fn pubkey_refs(self, pubkeys: Vec<String>) -> Self {
        self.tag("p", pubkeys)
    }

    /// Query events carrying the given hashtag (`#t`).
    pub fn hashtag(self, tag: impl Into<String>) -> Self {
        self.tag("t", vec![tag.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builder() {
        let filter = Filter::new()
            .kinds(vec![1, 6, 7])
            .authors(vec!["a".repeat(64)])
            .since(1000)
            .until(2000)
            .limit(100)
            .event_refs(vec!["target".to_string()]);

        assert_eq!(filter.kinds, Some(vec![1, 6, 7]));
        assert_eq!(filter.since, Some(1000));
        assert_eq!(filter.until, Some(2000));
        assert_eq!(filter.limit, Some(100));
        assert_eq!(
            filter.tags.get("#e"),
            Some(&vec!["target".to_string()])
        );
    }

    #[test]
    fn test_filter_serialization_omits_unset() {
        let filter = Filter::new().kinds(vec![0]).limit(1);
        let json = serde_json::to_string(&filter).unwrap();

        assert!(json.contains("\"kinds\":[0]"));
        assert!(json.contains("\"limit\":1"));
        assert!(!json.contains("authors"));
        assert!(!json.contains("since"));
    }

    #[test]
    fn test_filter_serializes_tag_queries() {
        let filter = Filter::new().kinds(vec![1]).hashtag("memely");
        let json = serde_json::to_string(&filter).unwrap();

        assert!(json.contains("\"#t\":[\"memely\"]"));
    }
}
