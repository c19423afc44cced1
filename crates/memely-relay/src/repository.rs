//! Event repository
//!
//! The repository turns the pool's merged frame stream into typed domain
//! views: profiles, relay lists, the meme feed, interaction summaries, and
//! publish results. Every operation issues its own subscription, filters
//! the shared stream by its subscription id, and stops at a bounded
//! deadline. A timeout is not an error; callers get the best available
//! data and may retry later.
//!
//! Frames from different relays interleave in any order, and the same
//! event can arrive from several relays. Deduplication by event id makes
//! that safe.

use crate::config::RepositoryConfig;
use crate::error::PublishError;
use crate::pool::{PoolFrame, RelayPool};
use crate::publish::{PublishHistory, PublishResult, PublishTracker};
use crate::selection::RelaySelector;
use crate::subscription::Subscription;
use dashmap::DashMap;
use memely_nostr::event::{
    event_id, sort_events, Event, EventTemplate, UnsignedEvent, KIND_PROFILE_METADATA,
    KIND_REACTION, KIND_RELAY_LIST, KIND_REPOST, KIND_TEXT_NOTE,
};
use memely_nostr::signer::{complete_event, EventSigner};
use memely_nostr::wire::{ClientMessage, RelayMessage};
use memely_nostr::{build_relay_list, relay_urls_from_event, Filter, ProfileMetadata};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tracing::{debug, warn};

// ----------------------------------------------------------------------------
// Domain Views
// ----------------------------------------------------------------------------

/// Where a returned profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    /// Parsed from a kind-0 event delivered by a relay.
    Relay,
    /// Synthesized because nothing arrived within the bounded wait.
    Placeholder,
}

/// A profile as surfaced to the UI.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub pubkey: String,
    pub metadata: ProfileMetadata,
    pub source: ProfileSource,
}

#[derive(Debug, Clone)]
struct ProfileRecord {
    metadata: ProfileMetadata,
    fetched_at: Instant,
}

/// Aggregated replies, reposts, and reactions for one target event.
#[derive(Debug, Clone)]
pub struct InteractionSummary {
    pub target_id: String,
    pub replies: Vec<Event>,
    pub reposts: usize,
    pub likes: usize,
    pub dislikes: usize,
    /// Tally of reaction contents other than the like/dislike symbols.
    pub other_reactions: HashMap<String, usize>,
}

impl InteractionSummary {
    fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            replies: Vec::new(),
            reposts: 0,
            likes: 0,
            dislikes: 0,
            other_reactions: HashMap::new(),
        }
    }

    pub fn reply_count(&self) -> usize {
        self.replies.len()
    }
}

#[derive(Debug, Clone)]
struct InteractionRecord {
    summary: InteractionSummary,
    fetched_at: Instant,
}

/// Query for the meme feed.
#[derive(Debug, Clone)]
pub struct FeedQuery {
    pub hashtag: String,
    pub authors: Option<Vec<String>>,
    pub since: Option<u64>,
    pub limit: u64,
}

impl FeedQuery {
    pub fn hashtag(tag: impl Into<String>) -> Self {
        Self {
            hashtag: tag.into(),
            authors: None,
            since: None,
            limit: 50,
        }
    }
}

// ----------------------------------------------------------------------------
// Repository
// ----------------------------------------------------------------------------

/// Typed access to the relay network. Constructed explicitly and passed to
/// consumers; holds no process-global state.
pub struct EventRepository {
    pool: Arc<RelayPool>,
    selector: Arc<RelaySelector>,
    signer: Arc<dyn EventSigner>,
    config: RepositoryConfig,
    profiles: DashMap<String, ProfileRecord>,
    interactions: DashMap<String, InteractionRecord>,
    history: PublishHistory,
}

impl EventRepository {
    pub fn new(
        pool: Arc<RelayPool>,
        selector: Arc<RelaySelector>,
        signer: Arc<dyn EventSigner>,
        config: RepositoryConfig,
    ) -> Self {
        let history = PublishHistory::new(config.history_capacity);
        Self {
            pool,
            selector,
            signer,
            config,
            profiles: DashMap::new(),
            interactions: DashMap::new(),
            history,
        }
    }

    pub fn pool(&self) -> &Arc<RelayPool> {
        &self.pool
    }

    pub fn selector(&self) -> &Arc<RelaySelector> {
        &self.selector
    }

    // ------------------------------------------------------------------------
    // Profile and Relay Discovery
    // ------------------------------------------------------------------------

    /// Fetch profile metadata for one author, bounded by the metadata
    /// timeout. The most recently observed kind-0 event wins within this
    /// fetch; each parse is cached immediately so a cancelled wait keeps
    /// what it saw.
    pub async fn fetch_profile_metadata(&self, pubkey: &str) -> UserProfile {
        let mut frames = self.pool.frames();
        let filter = Filter::new()
            .kinds(vec![KIND_PROFILE_METADATA])
            .authors(vec![pubkey.to_string()]);
        let Some(sub) = self.open_subscription(filter).await else {
            return self.profile_from_cache(pubkey);
        };

        let deadline = tokio::time::Instant::now() + self.config.metadata_timeout;
        let mut found = false;
        while let Some(frame) = next_frame(&mut frames, deadline).await {
            match frame.message {
                RelayMessage::Event {
                    ref subscription_id,
                    ref event,
                } if subscription_id == sub.id() => {
                    if self.absorb_metadata_event(pubkey, event) {
                        found = true;
                    }
                }
                RelayMessage::Eose {
                    ref subscription_id,
                } if subscription_id == sub.id() && found => break,
                _ => {}
            }
        }
        sub.close().await;

        self.profile_from_cache(pubkey)
    }

    /// The login/profile-view handshake: fetch profile metadata and the
    /// declared relay list concurrently under one combined bound. A
    /// non-empty relay list is pushed into the selector, which triggers
    /// pool migration through the keepalive driver.
    pub async fn fetch_user_profile(&self, pubkey: &str) -> UserProfile {
        let mut frames = self.pool.frames();

        let metadata_filter = Filter::new()
            .kinds(vec![KIND_PROFILE_METADATA])
            .authors(vec![pubkey.to_string()]);
        let relay_filter = Filter::new()
            .kinds(vec![KIND_RELAY_LIST])
            .authors(vec![pubkey.to_string()]);

        let Some(metadata_sub) = self.open_subscription(metadata_filter).await else {
            return self.profile_from_cache(pubkey);
        };
        let Some(relay_sub) = self.open_subscription(relay_filter).await else {
            metadata_sub.close().await;
            return self.profile_from_cache(pubkey);
        };

        let deadline = tokio::time::Instant::now() + self.config.combined_fetch_timeout;
        let mut metadata_found = false;
        let mut relays_found = false;
        let mut eose: HashSet<String> = HashSet::new();

        while let Some(frame) = next_frame(&mut frames, deadline).await {
            match frame.message {
                RelayMessage::Event {
                    ref subscription_id,
                    ref event,
                } => {
                    if subscription_id == metadata_sub.id()
                        && self.absorb_metadata_event(pubkey, event)
                    {
                        metadata_found = true;
                    } else if subscription_id == relay_sub.id()
                        && event.kind == KIND_RELAY_LIST
                        && event.pubkey == pubkey
                    {
                        match relay_urls_from_event(event) {
                            Ok(urls) if !urls.is_empty() => {
                                debug!("discovered {} relays for {}", urls.len(), pubkey);
                                self.selector.update_user_relays(&urls);
                                relays_found = true;
                            }
                            Ok(_) => {}
                            Err(e) => debug!("ignoring relay list from {}: {}", frame.relay, e),
                        }
                    }
                }
                RelayMessage::Eose {
                    ref subscription_id,
                } => {
                    eose.insert(subscription_id.clone());
                }
                _ => {}
            }

            if metadata_found && relays_found {
                break;
            }
            // Both subscriptions drained their stored events and the
            // metadata is in hand; a missing relay list will not appear.
            if metadata_found
                && eose.contains(metadata_sub.id())
                && eose.contains(relay_sub.id())
            {
                break;
            }
        }

        metadata_sub.close().await;
        relay_sub.close().await;

        self.profile_from_cache(pubkey)
    }

    /// Invalidate the cached profile for one author.
    pub fn invalidate_profile(&self, pubkey: &str) {
        self.profiles.remove(pubkey);
    }

    /// Age of the cached profile, if one exists.
    pub fn profile_age(&self, pubkey: &str) -> Option<Duration> {
        self.profiles
            .get(pubkey)
            .map(|record| record.fetched_at.elapsed())
    }

    fn absorb_metadata_event(&self, pubkey: &str, event: &Event) -> bool {
        if event.kind != KIND_PROFILE_METADATA || event.pubkey != pubkey {
            return false;
        }
        match ProfileMetadata::from_content(&event.content) {
            Ok(metadata) => {
                self.profiles.insert(
                    pubkey.to_string(),
                    ProfileRecord {
                        metadata,
                        fetched_at: Instant::now(),
                    },
                );
                true
            }
            Err(e) => {
                debug!("discarding unparseable metadata for {}: {}", pubkey, e);
                false
            }
        }
    }

    fn profile_from_cache(&self, pubkey: &str) -> UserProfile {
        match self.profiles.get(pubkey) {
            Some(record) => UserProfile {
                pubkey: pubkey.to_string(),
                metadata: record.metadata.clone(),
                source: ProfileSource::Relay,
            },
            None => UserProfile {
                pubkey: pubkey.to_string(),
                metadata: ProfileMetadata::placeholder(),
                source: ProfileSource::Placeholder,
            },
        }
    }

    // ------------------------------------------------------------------------
    // Feed
    // ------------------------------------------------------------------------

    /// Collect feed notes for a hashtag, deduplicated by event id and
    /// sorted newest first.
    pub async fn fetch_feed(&self, query: FeedQuery) -> Vec<Event> {
        let mut frames = self.pool.frames();
        let mut filter = Filter::new()
            .kinds(vec![KIND_TEXT_NOTE])
            .hashtag(query.hashtag.clone())
            .limit(query.limit);
        if let Some(authors) = query.authors.clone() {
            filter = filter.authors(authors);
        }
        if let Some(since) = query.since {
            filter = filter.since(since);
        }

        let Some(sub) = self.open_subscription(filter).await else {
            return Vec::new();
        };

        let expected_eose = self.pool.connected_count();
        let deadline = tokio::time::Instant::now() + self.config.feed_window;
        let mut seen: HashSet<String> = HashSet::new();
        let mut events: Vec<Event> = Vec::new();
        let mut eose_count = 0;

        while let Some(frame) = next_frame(&mut frames, deadline).await {
            match frame.message {
                RelayMessage::Event {
                    ref subscription_id,
                    event,
                } if subscription_id == sub.id() => {
                    if event.kind == KIND_TEXT_NOTE && seen.insert(event.id.clone()) {
                        events.push(event);
                    }
                }
                RelayMessage::Eose {
                    ref subscription_id,
                } if subscription_id == sub.id() => {
                    eose_count += 1;
                    if expected_eose > 0 && eose_count >= expected_eose {
                        break;
                    }
                }
                _ => {}
            }
        }
        sub.close().await;

        sort_events(&mut events);
        events.truncate(query.limit as usize);
        events
    }

    /// Feed for the configured default hashtag.
    pub async fn fetch_default_feed(&self) -> Vec<Event> {
        self.fetch_feed(FeedQuery::hashtag(self.config.feed_hashtag.clone()))
            .await
    }

    // ------------------------------------------------------------------------
    // Interactions
    // ------------------------------------------------------------------------

    /// Aggregate replies, reposts, and reactions for a target event.
    /// Served from cache until invalidated; a fresh fetch waits the fixed
    /// grace window, then classifies whatever arrived.
    pub async fn fetch_interactions(&self, target_id: &str) -> InteractionSummary {
        if let Some(record) = self.interactions.get(target_id) {
            return record.summary.clone();
        }

        let mut frames = self.pool.frames();
        let filter = Filter::new()
            .kinds(vec![KIND_TEXT_NOTE, KIND_REPOST, KIND_REACTION])
            .event_refs(vec![target_id.to_string()])
            .limit(self.config.interaction_limit);
        let Some(sub) = self.open_subscription(filter).await else {
            return InteractionSummary::new(target_id);
        };

        let deadline = tokio::time::Instant::now() + self.config.interaction_window;
        let mut seen: HashSet<String> = HashSet::new();
        let mut events: Vec<Event> = Vec::new();

        while let Some(frame) = next_frame(&mut frames, deadline).await {
            if let RelayMessage::Event {
                ref subscription_id,
                event,
            } = frame.message
            {
                if subscription_id == sub.id() && seen.insert(event.id.clone()) {
                    events.push(event);
                }
            }
        }
        sub.close().await;

        let summary = classify_interactions(target_id, events, &self.config);
        self.interactions.insert(
            target_id.to_string(),
            InteractionRecord {
                summary: summary.clone(),
                fetched_at: Instant::now(),
            },
        );
        summary
    }

    /// Drop the cached summary for one target, forcing a fresh read.
    pub fn invalidate_interactions(&self, target_id: &str) {
        self.interactions.remove(target_id);
    }

    /// Age of the cached interaction summary, if one exists.
    pub fn interactions_age(&self, target_id: &str) -> Option<Duration> {
        self.interactions
            .get(target_id)
            .map(|record| record.fetched_at.elapsed())
    }

    // ------------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------------

    /// Sign and broadcast an event, then track per-relay acceptance for
    /// the publish window. Signer failures abort before anything is sent.
    pub async fn publish(&self, template: EventTemplate) -> Result<PublishResult, PublishError> {
        let unsigned = UnsignedEvent::from_template(template, self.signer.public_key());
        let id = event_id(&unsigned)?;
        let response = self.signer.sign(&unsigned, &id).await?;
        let event = complete_event(&unsigned, response)?;

        let relays = self.pool.current_relays().await;
        let live = self.pool.live_relays().await;
        let tracker = PublishTracker::new(
            event.id.clone(),
            &relays,
            &live,
            self.config.acceptance_threshold,
        );

        // Subscribe before sending so no acknowledgement is missed.
        let mut frames = self.pool.frames();
        let message = ClientMessage::Event(event.clone()).to_json()?;
        self.pool
            .broadcast_with_retry(&message, self.config.max_send_retries)
            .await;

        let deadline = tokio::time::Instant::now() + self.config.publish_window;
        while !tracker.is_complete() {
            let Some(frame) = next_frame(&mut frames, deadline).await else {
                break;
            };
            if let RelayMessage::Ok {
                ref event_id,
                success,
                ref message,
            } = frame.message
            {
                if event_id == &event.id {
                    tracker.record_ok(&frame.relay, success, message);
                }
            }
        }

        let result = tracker.finalize();
        debug!(
            "publish {} finished: {}/{} accepted",
            result.event_id,
            result.accepted,
            result.total()
        );
        self.history.record(result.clone());
        Ok(result)
    }

    /// Publish a meme: a text note carrying the image URL, tagged with the
    /// configured feed hashtag plus any extra hashtags.
    pub async fn publish_meme(
        &self,
        caption: &str,
        image_url: &str,
        extra_hashtags: &[String],
    ) -> Result<PublishResult, PublishError> {
        let mut tags = vec![vec!["t".to_string(), self.config.feed_hashtag.clone()]];
        for tag in extra_hashtags {
            tags.push(vec!["t".to_string(), tag.clone()]);
        }

        let content = if caption.is_empty() {
            image_url.to_string()
        } else {
            format!("{}\n{}", caption, image_url)
        };

        self.publish(EventTemplate {
            created_at: now_timestamp(),
            kind: KIND_TEXT_NOTE,
            tags,
            content,
        })
        .await
    }

    /// Publish a reply to a target note and invalidate its cached
    /// interactions so the next read is fresh.
    pub async fn publish_reply(
        &self,
        target: &Event,
        content: &str,
    ) -> Result<PublishResult, PublishError> {
        let result = self
            .publish(EventTemplate {
                created_at: now_timestamp(),
                kind: KIND_TEXT_NOTE,
                tags: reference_tags(target),
                content: content.to_string(),
            })
            .await?;
        self.invalidate_interactions(&target.id);
        Ok(result)
    }

    /// Publish a reaction to a target note ("+" and "-" carry the
    /// like/dislike convention; anything else is a free-form emoji).
    pub async fn publish_reaction(
        &self,
        target: &Event,
        content: &str,
    ) -> Result<PublishResult, PublishError> {
        let result = self
            .publish(EventTemplate {
                created_at: now_timestamp(),
                kind: KIND_REACTION,
                tags: reference_tags(target),
                content: content.to_string(),
            })
            .await?;
        self.invalidate_interactions(&target.id);
        Ok(result)
    }

    /// React with the configured like symbol.
    pub async fn publish_like(&self, target: &Event) -> Result<PublishResult, PublishError> {
        let content = self.config.like_content.clone();
        self.publish_reaction(target, &content).await
    }

    /// Publish a repost of a target note.
    pub async fn publish_repost(&self, target: &Event) -> Result<PublishResult, PublishError> {
        let result = self
            .publish(EventTemplate {
                created_at: now_timestamp(),
                kind: KIND_REPOST,
                tags: reference_tags(target),
                content: String::new(),
            })
            .await?;
        self.invalidate_interactions(&target.id);
        Ok(result)
    }

    /// Publish the user's declared relay list and adopt it locally.
    pub async fn publish_relay_list(
        &self,
        urls: &[String],
    ) -> Result<PublishResult, PublishError> {
        let template = build_relay_list(urls, now_timestamp());
        let result = self.publish(template).await?;
        self.selector.update_user_relays(urls);
        Ok(result)
    }

    /// Completed publish results, most recent first.
    pub fn publish_history(&self) -> Vec<PublishResult> {
        self.history.recent()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn open_subscription(&self, filter: Filter) -> Option<Subscription> {
        match Subscription::open(&self.pool, filter).await {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!("failed to open subscription: {}", e);
                None
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Classification
// ----------------------------------------------------------------------------

/// Classify deduplicated interaction events for one target.
///
/// Relays may return thematically related notes for an `#e` query, so a
/// kind-1 note only counts as a reply when one of its `e` tags equals the
/// target id.
pub fn classify_interactions(
    target_id: &str,
    events: Vec<Event>,
    config: &RepositoryConfig,
) -> InteractionSummary {
    let mut summary = InteractionSummary::new(target_id);

    for event in events {
        match event.kind {
            KIND_TEXT_NOTE => {
                if event.references_event(target_id) {
                    summary.replies.push(event);
                }
            }
            KIND_REPOST => summary.reposts += 1,
            KIND_REACTION => {
                if event.content == config.like_content {
                    summary.likes += 1;
                } else if event.content == config.dislike_content {
                    summary.dislikes += 1;
                } else {
                    *summary
                        .other_reactions
                        .entry(event.content.clone())
                        .or_insert(0) += 1;
                }
            }
            other => debug!("ignoring interaction with kind {}", other),
        }
    }

    sort_events(&mut summary.replies);
    summary
}

fn reference_tags(target: &Event) -> Vec<Vec<String>> {
    vec![
        vec!["e".to_string(), target.id.clone()],
        vec!["p".to_string(), target.pubkey.clone()],
    ]
}

fn now_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Receive the next merged frame before the deadline. A lagging receiver
/// skips the dropped frames and keeps going; `None` means the deadline
/// passed or the stream closed.
async fn next_frame(
    frames: &mut broadcast::Receiver<PoolFrame>,
    deadline: tokio::time::Instant,
) -> Option<PoolFrame> {
    loop {
        match tokio::time::timeout_at(deadline, frames.recv()).await {
            Ok(Ok(frame)) => return Some(frame),
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                warn!("merged stream lagged, skipped {} frames", skipped);
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => return None,
            Err(_) => return None,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
