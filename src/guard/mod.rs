//! Cooldown-based duplicate suppression keyed by content fingerprint.
//!
//! OCR-driven polling sees the same screen over and over. The guard remembers
//! each fingerprint's first sighting and lets it through at most
//! `max_same_content` times per cooldown window, so unchanged content cannot
//! trigger oscillating re-interventions.

use std::collections::HashMap;
use std::time::{Duration, Instant};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DuplicateVerdict {
    Allowed,
    /// Remaining cooldown before the content may act again.
    Suppressed(Duration),
}

impl DuplicateVerdict {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, DuplicateVerdict::Suppressed(_))
    }
}

#[derive(Debug, Clone, Copy)]
struct SeenEntry {
    first_seen: Instant,
    occurrences: u32,
    last_seen: Instant,
}

#[derive(Debug)]
pub struct DuplicateGuard {
    cooldown: Duration,
    max_same_content: u32,
    retention: Duration,
    seen: HashMap<String, SeenEntry>,
}

impl DuplicateGuard {
    pub fn new(cooldown: Duration, max_same_content: u32, retention: Duration) -> Self {
        Self {
            cooldown,
            max_same_content: max_same_content.max(1),
            retention,
            seen: HashMap::new(),
        }
    }

    pub fn check_and_register(&mut self, fingerprint: &str, now: Instant) -> DuplicateVerdict {
        self.purge_expired(now);

        let Some(entry) = self.seen.get_mut(fingerprint) else {
            self.seen.insert(fingerprint.to_string(), SeenEntry::fresh(now));
            return DuplicateVerdict::Allowed;
        };

        let elapsed = now.saturating_duration_since(entry.first_seen);
        if elapsed >= self.cooldown {
            *entry = SeenEntry::fresh(now);
            return DuplicateVerdict::Allowed;
        }

        if entry.occurrences + 1 > self.max_same_content {
            entry.last_seen = now;
            let remaining = self.cooldown - elapsed;
            log_debug!(
                "suppressing {} ({} sightings, {:.1}s cooldown left)",
                short(fingerprint),
                entry.occurrences,
                remaining.as_secs_f64()
            );
            return DuplicateVerdict::Suppressed(remaining);
        }

        entry.occurrences += 1;
        entry.last_seen = now;
        DuplicateVerdict::Allowed
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn purge_expired(&mut self, now: Instant) {
        let retention = self.retention;
        let before = self.seen.len();
        self.seen
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) < retention);
        let purged = before - self.seen.len();
        if purged > 0 {
            log_debug!("purged {} stale fingerprints", purged);
        }
    }
}

impl SeenEntry {
    fn fresh(now: Instant) -> Self {
        Self {
            first_seen: now,
            occurrences: 1,
            last_seen: now,
        }
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..8).unwrap_or(fingerprint)
}
