//! Duplicate-request detection.
//!
//! Remembers request keys (`user_id_session_id_identifier`) for a TTL.
//! A repeat within the window is reported as a duplicate; callers log it and
//! still process the request. Expired entries are pruned on every check.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Concurrent map of recently seen request keys.
#[derive(Debug)]
pub struct DuplicateTracker {
    seen: DashMap<String, Instant>,
    ttl: Duration,
}

impl DuplicateTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
        }
    }

    /// Record `key` and report whether it was already seen within the TTL.
    ///
    /// A duplicate does not refresh the original timestamp.
    pub fn check_and_record(&self, key: &str) -> bool {
        self.check_and_record_at(key, Instant::now())
    }

    fn check_and_record_at(&self, key: &str, now: Instant) -> bool {
        self.seen
            .retain(|_, first_seen| now.saturating_duration_since(*first_seen) <= self.ttl);

        match self.seen.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => true,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(now);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
