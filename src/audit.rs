//! Immutable audit logging.
//!
//! Records every authentication outcome and key lifecycle event. The
//! in-memory log is append-only and keeps the most recent records. Pluggable
//! sinks forward every record to files, channels, etc.
//!
//! Records carry only event kinds and counters. They never contain key
//! material, plaintext, or the platform's reason for a biometric failure.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::session::AuthMethod;

/// A sink that receives audit records. Implement this to forward records
/// to a file, database, UI observer, or other consumer.
pub trait AuditSink: Send {
    /// Append a record. Called for every audited event.
    fn append(&mut self, record: AuditRecord);
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    AuthSucceeded { method: AuthMethod },
    AuthFailed { failed_attempts: u32 },
    /// The failure threshold was crossed and a lockout window opened.
    LockedOut { failed_attempts: u32, lockout_secs: i64 },
    /// An attempt arrived during a lockout window and was rejected unseen.
    AuthRejectedLocked,
    LockoutExpired,
    GateUnavailable,
    SessionRefreshed,
    SessionExpired,
    LoggedOut,
    KeyCreated { key_id: String },
    KeyRotated { key_id: String, reencrypted: usize },
    KeyWiped,
    /// A ciphertext failed tag verification.
    TamperDetected,
}

/// A permanent record of a security event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event: AuditEvent,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
}

/// Records kept in memory. Older records are dropped; durable history is
/// the job of the forward sinks.
pub const MAX_RETAINED_RECORDS: usize = 1024;

/// An append-only log of security events.
/// Can forward records to additional sinks via `add_forward_sink`.
///
/// Holds at most [`MAX_RETAINED_RECORDS`]; every record still reaches every
/// sink.
#[derive(Default, Serialize, Deserialize)]
pub struct AuditLog {
    records: VecDeque<AuditRecord>,
    #[serde(skip)]
    forward_sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("records", &self.records)
            .field("forward_sinks", &self.forward_sinks.len())
            .finish()
    }
}

impl Clone for AuditLog {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            forward_sinks: Vec::new(), // Forward sinks are not cloned
        }
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink to receive a copy of every record.
    pub fn add_forward_sink(&mut self, sink: Box<dyn AuditSink>) {
        self.forward_sinks.push(sink);
    }

    /// Append a new record to the log and forward to any attached sinks.
    pub fn append(&mut self, record: AuditRecord) {
        for sink in self.forward_sinks.iter_mut() {
            sink.append(record.clone());
        }
        while self.records.len() >= MAX_RETAINED_RECORDS {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, AuditRecord> {
        self.records.iter()
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// A cloneable, thread-safe handle to one `AuditLog`, stamping records with
/// the injected clock. Every component that audits holds a clone.
#[derive(Clone)]
pub struct AuditTrail {
    log: Arc<Mutex<AuditLog>>,
    clock: Arc<dyn Clock>,
}

impl AuditTrail {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            log: Arc::new(Mutex::new(AuditLog::new())),
            clock,
        }
    }

    /// Stamp and append an event.
    pub fn record(&self, event: AuditEvent) {
        let record = AuditRecord {
            event,
            timestamp: self.clock.now(),
        };
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .append(record);
    }

    pub fn add_sink(&self, sink: Box<dyn AuditSink>) {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .add_forward_sink(sink);
    }

    /// Copy of the records appended so far, without forward sinks.
    pub fn snapshot(&self) -> AuditLog {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail").field("len", &self.len()).finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: file
// ---------------------------------------------------------------------------

/// Writes audit records as JSON lines (one per record) to a file.
/// Creates the file if it doesn't exist; appends if it does.
pub struct FileAuditSink {
    file: std::fs::File,
}

impl FileAuditSink {
    /// Open or create a file for append-only audit logging.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl AuditSink for FileAuditSink {
    fn append(&mut self, record: AuditRecord) {
        if let Ok(line) = serde_json::to_string(&record) {
            let _ = writeln!(self.file, "{line}");
            let _ = self.file.flush();
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: channel
// ---------------------------------------------------------------------------

/// Forwards records over an mpsc channel. This is how a UI observes lock
/// state changes without polling. A dropped receiver is ignored.
pub struct ChannelAuditSink {
    tx: Sender<AuditRecord>,
}

impl ChannelAuditSink {
    pub fn new(tx: Sender<AuditRecord>) -> Self {
        Self { tx }
    }
}

impl AuditSink for ChannelAuditSink {
    fn append(&mut self, record: AuditRecord) {
        let _ = self.tx.send(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::mpsc;

    #[test]
    fn test_trail_stamps_with_clock() {
        let clock = Arc::new(ManualClock::starting_now());
        let trail = AuditTrail::new(clock.clone());

        trail.record(AuditEvent::LoggedOut);
        clock.advance(chrono::Duration::seconds(5));
        trail.record(AuditEvent::KeyWiped);

        let log = trail.snapshot();
        let records: Vec<_> = log.iter().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1].timestamp - records[0].timestamp,
            chrono::Duration::seconds(5)
        );
    }

    #[test]
    fn test_retention_is_capped() {
        let trail = AuditTrail::new(Arc::new(ManualClock::starting_now()));
        let (tx, rx) = mpsc::channel();
        trail.add_sink(Box::new(ChannelAuditSink::new(tx)));

        trail.record(AuditEvent::KeyWiped);
        for _ in 0..MAX_RETAINED_RECORDS + 10 {
            trail.record(AuditEvent::SessionRefreshed);
        }

        // Oldest records are dropped from memory.
        assert_eq!(trail.len(), MAX_RETAINED_RECORDS);
        assert!(trail.snapshot().iter().all(|r| r.event == AuditEvent::SessionRefreshed));

        // Sinks still saw everything.
        assert_eq!(rx.try_iter().count(), MAX_RETAINED_RECORDS + 11);
    }

    #[test]
    fn test_channel_sink_forwards() {
        let trail = AuditTrail::new(Arc::new(ManualClock::starting_now()));
        let (tx, rx) = mpsc::channel();
        trail.add_sink(Box::new(ChannelAuditSink::new(tx)));

        trail.record(AuditEvent::AuthFailed { failed_attempts: 1 });
        assert_eq!(
            rx.try_recv().unwrap().event,
            AuditEvent::AuthFailed { failed_attempts: 1 }
        );
    }

    #[test]
    fn test_record_serializes_tagged() {
        let record = AuditRecord {
            event: AuditEvent::AuthSucceeded {
                method: AuthMethod::Biometric,
            },
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"kind\":\"auth_succeeded\""));
        assert!(json.contains("\"method\":\"biometric\""));
    }
}
