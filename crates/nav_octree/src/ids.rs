//! Process-unique identities for collaborators and navigation worlds.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// OwnerId - identity of a navigation-relevant collaborator
// =============================================================================

/// Atomic counter for generating unique OwnerIds.
static OWNER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a collaborator that contributes navigation data.
///
/// Used as the key for the pending-update queue, the parent→children map and
/// the owner→handle map. The driver never dereferences an owner through its
/// id; a stale id simply misses every lookup.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Generate a new unique OwnerId.
    pub fn new() -> Self {
        Self(OWNER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap an id allocated elsewhere (an engine entity index, for instance).
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

// =============================================================================
// WorldId - identity of a navigation system instance
// =============================================================================

/// Atomic counter for generating unique WorldIds.
static WORLD_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque world identifier.
///
/// Generated atomically - guaranteed unique within process lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct WorldId(u64);

impl WorldId {
    /// Generate a new unique WorldId.
    pub fn new() -> Self {
        Self(WORLD_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for WorldId {
    fn default() -> Self {
        Self::new()
    }
}
