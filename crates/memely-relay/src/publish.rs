//! Publish acceptance tracking
//!
//! A publish goes to every relay in the current set; no single relay is
//! authoritative. Each (event, relay) pair moves from `Pending` to exactly
//! one terminal state, and the aggregate is judged against an acceptance
//! threshold rather than requiring unanimity.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

// ----------------------------------------------------------------------------
// Per-Relay Status
// ----------------------------------------------------------------------------

/// Terminal-state machine for one relay's view of one published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayPublishStatus {
    /// Awaiting an acknowledgement within the publish window.
    Pending,
    /// Relay acknowledged with success.
    Accepted,
    /// Relay acknowledged with failure.
    Rejected { message: String },
    /// No acknowledgement arrived within the publish window.
    TimedOut,
    /// No open connection to this relay at publish time.
    ConnectionError,
}

impl RelayPublishStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayPublishStatus::Pending)
    }
}

// ----------------------------------------------------------------------------
// Tracker
// ----------------------------------------------------------------------------

/// Tracks acknowledgements for one published event across the relay set.
pub struct PublishTracker {
    event_id: String,
    statuses: DashMap<String, RelayPublishStatus>,
    threshold: f64,
}

impl PublishTracker {
    /// Start tracking a publish to `relays`. Relays without an open
    /// connection go straight to `ConnectionError`.
    pub fn new(event_id: impl Into<String>, relays: &[String], live: &[String], threshold: f64) -> Self {
        let live: HashSet<&str> = live.iter().map(String::as_str).collect();
        let statuses = DashMap::new();
        for relay in relays {
            let initial = if live.contains(relay.as_str()) {
                RelayPublishStatus::Pending
            } else {
                RelayPublishStatus::ConnectionError
            };
            statuses.insert(relay.clone(), initial);
        }

        Self {
            event_id: event_id.into(),
            statuses,
            threshold,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Record an `OK` acknowledgement from a relay. Only pending entries
    /// transition; terminal states and unknown relays are left alone.
    pub fn record_ok(&self, relay: &str, success: bool, message: &str) -> bool {
        let Some(mut entry) = self.statuses.get_mut(relay) else {
            return false;
        };
        if entry.is_terminal() {
            return false;
        }

        *entry = if success {
            RelayPublishStatus::Accepted
        } else {
            RelayPublishStatus::Rejected {
                message: message.to_string(),
            }
        };
        true
    }

    /// Whether every relay has reached a terminal state.
    pub fn is_complete(&self) -> bool {
        self.statuses.iter().all(|entry| entry.value().is_terminal())
    }

    /// Convert remaining pending entries to `TimedOut` and produce the
    /// aggregate result.
    pub fn finalize(&self) -> PublishResult {
        for mut entry in self.statuses.iter_mut() {
            if !entry.value().is_terminal() {
                *entry.value_mut() = RelayPublishStatus::TimedOut;
            }
        }

        let statuses: HashMap<String, RelayPublishStatus> = self
            .statuses
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        PublishResult::new(self.event_id.clone(), statuses, self.threshold)
    }
}

// ----------------------------------------------------------------------------
// Aggregate Result
// ----------------------------------------------------------------------------

/// Aggregate outcome of one publish across the relay set.
#[derive(Debug, Clone)]
pub struct PublishResult {
    pub event_id: String,
    pub statuses: HashMap<String, RelayPublishStatus>,
    pub accepted: usize,
    pub rejected: usize,
    pub timed_out: usize,
    pub connection_errors: usize,
    threshold: f64,
}

impl PublishResult {
    fn new(event_id: String, statuses: HashMap<String, RelayPublishStatus>, threshold: f64) -> Self {
        let mut accepted = 0;
        let mut rejected = 0;
        let mut timed_out = 0;
        let mut connection_errors = 0;
        for status in statuses.values() {
            match status {
                RelayPublishStatus::Accepted => accepted += 1,
                RelayPublishStatus::Rejected { .. } => rejected += 1,
                RelayPublishStatus::TimedOut => timed_out += 1,
                RelayPublishStatus::ConnectionError => connection_errors += 1,
                RelayPublishStatus::Pending => {}
            }
        }

        Self {
            event_id,
            statuses,
            accepted,
            rejected,
            timed_out,
            connection_errors,
            threshold,
        }
    }

    /// Number of relays the publish was tracked against.
    pub fn total(&self) -> usize {
        self.statuses.len()
    }

    /// Fraction of relays that accepted the event.
    pub fn acceptance_rate(&self) -> f64 {
        if self.statuses.is_empty() {
            0.0
        } else {
            self.accepted as f64 / self.statuses.len() as f64
        }
    }

    /// Whether the acceptance rate reached the configured threshold.
    pub fn is_successful(&self) -> bool {
        !self.statuses.is_empty() && self.acceptance_rate() >= self.threshold
    }

    /// Whether every relay accepted.
    pub fn all_accepted(&self) -> bool {
        !self.statuses.is_empty() && self.accepted == self.statuses.len()
    }
}

// ----------------------------------------------------------------------------
// History
// ----------------------------------------------------------------------------

/// Completed publish results, most recent first, bounded.
pub struct PublishHistory {
    entries: Mutex<VecDeque<PublishResult>>,
    capacity: usize,
}

impl PublishHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn record(&self, result: PublishResult) {
        let mut entries = self.entries.lock().expect("history lock poisoned");
        entries.push_front(result);
        entries.truncate(self.capacity);
    }

    pub fn recent(&self) -> Vec<PublishResult> {
        self.entries
            .lock()
            .expect("history lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("history lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn relays(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("wss://relay{}.example", i)).collect()
    }

    #[test]
    fn test_offline_relays_start_as_connection_error() {
        let all = relays(3);
        let live = all[..2].to_vec();
        let tracker = PublishTracker::new("e1", &all, &live, 0.5);

        let result = tracker.finalize();
        assert_eq!(result.connection_errors, 1);
        assert_eq!(result.timed_out, 2);
    }

    #[test]
    fn test_record_ok_transitions_once() {
        let all = relays(1);
        let tracker = PublishTracker::new("e1", &all, &all, 0.5);

        assert!(tracker.record_ok(&all[0], false, "blocked"));
        // Terminal states never transition again.
        assert!(!tracker.record_ok(&all[0], true, ""));
        assert!(!tracker.record_ok("wss://unknown.example", true, ""));

        let result = tracker.finalize();
        assert_eq!(result.rejected, 1);
        assert_eq!(
            result.statuses.get(&all[0]),
            Some(&RelayPublishStatus::Rejected {
                message: "blocked".to_string()
            })
        );
    }

    #[test]
    fn test_aggregate_three_accepted_one_timeout() {
        let all = relays(4);
        let tracker = PublishTracker::new("e1", &all, &all, 0.5);
        tracker.record_ok(&all[0], true, "");
        tracker.record_ok(&all[1], true, "");
        tracker.record_ok(&all[2], true, "");

        let result = tracker.finalize();
        assert_eq!(result.accepted, 3);
        assert_eq!(result.timed_out, 1);
        assert_eq!(result.total(), 4);
        assert_eq!(result.acceptance_rate(), 0.75);
        assert!(result.is_successful());
        assert!(!result.all_accepted());
    }

    #[test]
    fn test_aggregate_below_threshold_fails() {
        let all = relays(4);
        let tracker = PublishTracker::new("e1", &all, &all, 0.5);
        tracker.record_ok(&all[0], true, "");
        tracker.record_ok(&all[1], false, "spam");

        let result = tracker.finalize();
        assert_eq!(result.acceptance_rate(), 0.25);
        assert!(!result.is_successful());
    }

    #[test]
    fn test_exact_threshold_counts_as_success() {
        let all = relays(2);
        let tracker = PublishTracker::new("e1", &all, &all, 0.5);
        tracker.record_ok(&all[0], true, "");

        let result = tracker.finalize();
        assert_eq!(result.acceptance_rate(), 0.5);
        assert!(result.is_successful());
    }

    #[test]
    fn test_all_accepted() {
        let all = relays(2);
        let tracker = PublishTracker::new("e1", &all, &all, 0.5);
        tracker.record_ok(&all[0], true, "");
        tracker.record_ok(&all[1], true, "");

        assert!(tracker.is_complete());
        let result = tracker.finalize();
        assert!(result.all_accepted());
        assert_eq!(result.acceptance_rate(), 1.0);
    }

    #[test]
    fn test_empty_relay_set_is_never_successful() {
        let tracker = PublishTracker::new("e1", &[], &[], 0.5);
        let result = tracker.finalize();
        assert_eq!(result.acceptance_rate(), 0.0);
        assert!(!result.is_successful());
        assert!(!result.all_accepted());
    }

    #[test]
    fn test_history_is_bounded_and_most_recent_first() {
        let history = PublishHistory::new(50);
        for i in 0..60 {
            let tracker = PublishTracker::new(format!("event{}", i), &[], &[], 0.5);
            history.record(tracker.finalize());
        }

        let recent = history.recent();
        assert_eq!(recent.len(), 50);
        assert_eq!(recent[0].event_id, "event59");
        assert_eq!(recent[49].event_id, "event10");
    }
}
