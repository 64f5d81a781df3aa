//! Status snapshot export: the only interface by which the rekey
//! coordinator observes proxy state (spec section 4.6/5). Written
//! periodically by the proxy loop via atomic tempfile-then-rename, read
//! only by the coordinator.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ProxyError;

/// Drop counters broken out by reason, per spec section 4.6/7.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DropCounters {
    /// Outbound datagram dropped: no Session established yet.
    pub no_session: u64,
    /// Outbound datagram dropped: token-bucket rate limit exceeded.
    pub rate_limit: u64,
    /// Inbound datagram dropped: source address did not match the pin.
    pub peer: u64,
    /// Inbound datagram dropped: frame header malformed.
    pub header: u64,
    /// Inbound datagram dropped: epoch outside current/grace window.
    pub epoch: u64,
    /// Inbound datagram dropped: replay or too-old sequence.
    pub replay: u64,
    /// Inbound datagram dropped: AEAD authentication failed.
    pub auth: u64,
}

impl DropCounters {
    /// Sum of every drop reason.
    pub fn total(&self) -> u64 {
        self.no_session
            + self.rate_limit
            + self.peer
            + self.header
            + self.epoch
            + self.replay
            + self.auth
    }
}

/// A point-in-time snapshot of proxy state, written atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Current Session epoch, or 0 if no Session is established.
    pub epoch: u32,
    /// Suite id of the current Session, if any.
    pub suite_id: Option<String>,
    /// Inbound frames successfully delivered.
    pub frames_in: u64,
    /// Outbound frames successfully sent.
    pub frames_out: u64,
    /// Inbound payload bytes delivered.
    pub bytes_in: u64,
    /// Outbound payload bytes sent.
    pub bytes_out: u64,
    /// Drop counters by reason, cumulative since process start.
    pub drops: DropCounters,
    /// Wall-clock time the current Session's handshake completed.
    pub last_handshake_at: Option<DateTime<Utc>>,
    /// How long the most recent handshake took to complete.
    pub last_handshake_duration_ms: Option<u64>,
    /// Measured blackout duration of the most recent rekey, if any.
    pub last_rekey_blackout_ms: Option<u64>,
    /// When this snapshot was produced.
    pub generated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// An empty snapshot for a process that has not yet established a
    /// Session.
    pub fn initial() -> Self {
        Self {
            epoch: 0,
            suite_id: None,
            frames_in: 0,
            frames_out: 0,
            bytes_in: 0,
            bytes_out: 0,
            drops: DropCounters::default(),
            last_handshake_at: None,
            last_handshake_duration_ms: None,
            last_rekey_blackout_ms: None,
            generated_at: Utc::now(),
        }
    }

    /// Write this snapshot to `path` atomically: serialize to a tempfile in
    /// the same directory, then rename over `path`. A reader (the
    /// coordinator) never observes a partially written file.
    pub fn write_atomic(&self, path: &Path) -> Result<(), ProxyError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(ProxyError::StatusExport)?;
        serde_json::to_writer_pretty(&mut tmp, self)
            .map_err(|e| ProxyError::StatusExport(e.into()))?;
        tmp.persist(path)
            .map_err(|e| ProxyError::StatusExport(e.error))?;
        Ok(())
    }

    /// Load a previously written snapshot, e.g. for diffing into a
    /// [`crate::rekey::SuiteRunRecord`].
    pub fn read(path: &Path) -> Result<Self, ProxyError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| ProxyError::StatusExport(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        let mut snapshot = StatusSnapshot::initial();
        snapshot.epoch = 3;
        snapshot.suite_id = Some("ML-KEM-768+ML-DSA-65+AES-256-GCM".into());
        snapshot.frames_in = 42;
        snapshot.drops.replay = 5;

        snapshot.write_atomic(&path).unwrap();
        let loaded = StatusSnapshot::read(&path).unwrap();

        assert_eq!(loaded.epoch, 3);
        assert_eq!(loaded.frames_in, 42);
        assert_eq!(loaded.drops.replay, 5);
    }

    #[test]
    fn overwrite_is_atomic_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        StatusSnapshot::initial().write_atomic(&path).unwrap();
        let mut second = StatusSnapshot::initial();
        second.frames_out = 7;
        second.write_atomic(&path).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(StatusSnapshot::read(&path).unwrap().frames_out, 7);
    }

    #[test]
    fn drop_counters_total_sums_every_reason() {
        let counters = DropCounters {
            no_session: 1,
            rate_limit: 2,
            peer: 3,
            header: 4,
            epoch: 5,
            replay: 6,
            auth: 7,
        };
        assert_eq!(counters.total(), 28);
    }
}
