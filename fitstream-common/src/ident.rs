//! Media identity
//!
//! A `MediaId` is the stable key for one logical piece of content,
//! independent of how many times the host mounts and unmounts a player
//! for it. Resume and seek-intent caches are keyed by this value, so an
//! identity that churns between mounts silently corrupts resume state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable key for a logical piece of content.
///
/// Hosts should derive this from something content-stable (catalog id,
/// canonical URL), never from mount-scoped data like component instance ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Random identity for content with no stable key.
    ///
    /// Sticky resume degrades to session-only behavior for these: the key
    /// never repeats, so nothing persists across a remount.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MediaId {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for MediaId {
    fn from(key: String) -> Self {
        Self(key)
    }
}
