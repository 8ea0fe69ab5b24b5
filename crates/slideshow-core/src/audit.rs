//! Audit trail sink.
//!
//! Mutating device actions (sign-in, playback changes, source edits, player
//! commands) are reported to an [`AuditSink`]. Sinks are write-only from the
//! point of view of request handling.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default capacity of [`MemoryAuditSink`].
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

/// One recorded action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Random entry id.
    pub id: String,
    /// Who performed the action, when known.
    pub user: Option<String>,
    /// Device the action targeted.
    pub device_id: String,
    /// Short action name, e.g. `player.start`.
    pub action: String,
    /// SHA-256 of the forwarded payload, hex encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_hash: Option<String>,
    /// When the entry was created.
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(device_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user: None,
            device_id: device_id.into(),
            action: action.into(),
            payload_hash: None,
            timestamp: Utc::now(),
        }
    }

    /// Sets the acting user.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Records a hash of the payload instead of the payload itself.
    pub fn with_payload(mut self, payload: &[u8]) -> Self {
        self.payload_hash = Some(hash_payload(payload));
        self
    }
}

/// Hex-encoded SHA-256 of a payload.
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    /// Records one entry. Must not block for long.
    fn record(&self, entry: AuditEntry);
}

/// Writes entries to the `slideshow::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        tracing::info!(
            target: "slideshow::audit",
            id = %entry.id,
            user = ?entry.user,
            device_id = %entry.device_id,
            action = %entry.action,
            payload_hash = ?entry.payload_hash,
            "audit"
        );
    }
}

/// Bounded in-memory sink. Oldest entries are evicted first.
#[derive(Debug)]
pub struct MemoryAuditSink {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl MemoryAuditSink {
    /// Creates a sink holding [`DEFAULT_AUDIT_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    /// Creates a sink with a custom capacity (at least one entry).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_is_newest_first() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditEntry::new("lobby", "player.start"));
        sink.record(AuditEntry::new("lobby", "player.stop"));

        let recent = sink.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, "player.stop");
        assert_eq!(recent[1].action, "player.start");
    }

    #[test]
    fn capacity_evicts_oldest() {
        let sink = MemoryAuditSink::with_capacity(2);
        for action in ["a", "b", "c"] {
            sink.record(AuditEntry::new("lobby", action));
        }

        assert_eq!(sink.len(), 2);
        let actions: Vec<_> = sink.recent(5).into_iter().map(|e| e.action).collect();
        assert_eq!(actions, vec!["c", "b"]);
    }

    #[test]
    fn payload_is_hashed_not_stored() {
        let entry = AuditEntry::new("lobby", "playback.update")
            .with_user("admin")
            .with_payload(b"{\"image_duration\":5}");

        let hash = entry.payload_hash.unwrap();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(entry.user.as_deref(), Some("admin"));
    }

    #[test]
    fn known_digest() {
        assert_eq!(
            hash_payload(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn entries_get_distinct_ids() {
        let a = AuditEntry::new("lobby", "x");
        let b = AuditEntry::new("lobby", "x");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn tracing_sink_accepts_entries() {
        TracingAuditSink.record(AuditEntry::new("lobby", "login"));
    }
}
