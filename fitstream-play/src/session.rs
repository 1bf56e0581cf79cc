//! Cross-remount session store
//!
//! The host's component lifecycle can discard and recreate the player
//! controller on unrelated renders. Resume state therefore lives in a
//! store with its own lifecycle: created once at application start,
//! injected into each engine, keyed by media identity, last-writer-wins.
//!
//! Access is defensive throughout: a poisoned lock behaves as a cache
//! miss on read and a dropped write, never a panic in the playback loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing::warn;

use fitstream_common::MediaId;

/// Per-identity resume state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResumeRecord {
    /// Last observed playhead position, seconds
    pub last_known_seconds: Option<f64>,

    /// Last position the user explicitly asked for, seconds
    pub last_seek_intent_seconds: Option<f64>,

    /// Whether the declared start has already been applied for this
    /// identity. Set on the first metadata-ready; later reattachments take
    /// the sticky path instead.
    pub start_applied: bool,
}

/// Identity-keyed resume/seek-intent cache
///
/// Single event-loop discipline means the mutex is uncontended in
/// practice; it exists so the store can be shared process-wide. Identity
/// collisions between unrelated items corrupt resume state, so hosts must
/// key by content, not by mount.
pub struct SessionStore {
    records: Mutex<HashMap<MediaId, ResumeRecord>>,
}

static PROCESS_STORE: Lazy<Arc<SessionStore>> = Lazy::new(|| Arc::new(SessionStore::new()));

impl SessionStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide store most hosts inject into every engine
    pub fn process_wide() -> Arc<SessionStore> {
        Arc::clone(&PROCESS_STORE)
    }

    /// Snapshot the record for an identity. Missing or unreadable entries
    /// come back as the default record.
    pub fn get(&self, id: &MediaId) -> ResumeRecord {
        match self.records.lock() {
            Ok(records) => records.get(id).copied().unwrap_or_default(),
            Err(_) => {
                warn!("Session store unreadable; treating as cache miss for {id}");
                ResumeRecord::default()
            }
        }
    }

    /// Mutate the record for an identity, creating it if absent
    pub fn update(&self, id: &MediaId, apply: impl FnOnce(&mut ResumeRecord)) {
        match self.records.lock() {
            Ok(mut records) => apply(records.entry(id.clone()).or_default()),
            Err(_) => warn!("Session store unwritable; dropping update for {id}"),
        }
    }

    /// Drop all cached state for an identity
    ///
    /// Used by the restart-from-beginning decision: stale near-end resume
    /// points must not survive into the next session.
    pub fn clear(&self, id: &MediaId) {
        match self.records.lock() {
            Ok(mut records) => {
                records.remove(id);
            }
            Err(_) => warn!("Session store unwritable; clear skipped for {id}"),
        }
    }

    /// Number of identities with cached state
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
