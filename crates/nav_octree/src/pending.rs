//! Pending-update queue: registration intents staged between flushes.
//!
//! ```text
//!   register ──► Staged ──────────── flush ──► Applied (element in octree)
//!                  │  ▲
//!       unregister │  │ register again (coalesced, same IntentId)
//!                  ▼  │
//!               Invalidated ──────── flush ──► Applied (previous bounds dirtied)
//! ```
//!
//! At most one intent exists per owner. A flush takes the whole queue as a
//! [`FlushBatch`]; the driver resolves each intent against the octree and the
//! parent→children map.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::ids::OwnerId;
use crate::octree::NavBounds;
use crate::relevant::NavRelevant;
use crate::types::DirtyFlags;

/// Identity of a pending intent. Coalesced re-registration keeps the id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntentId(u64);

impl IntentId {
  pub fn raw(&self) -> u64 {
    self.0
  }
}

/// Bounds and flags an owner had in the octree before an update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PreviousState {
  pub bounds: NavBounds,
  pub flags: DirtyFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntentState {
  Staged,
  Invalidated,
}

/// A deferred registration.
#[derive(Clone, Debug)]
pub struct PendingIntent {
  pub id: IntentId,
  pub owner: OwnerId,
  /// Weak so a queued intent never keeps a collaborator alive.
  pub source: Weak<dyn NavRelevant>,
  /// Used instead of the element's own dirty flags when non-empty.
  pub flags_override: DirtyFlags,
  /// Set by an unregister before the flush.
  pub invalid: bool,
  pub prev: Option<PreviousState>,
}

impl PendingIntent {
  pub fn state(&self) -> IntentState {
    if self.invalid {
      IntentState::Invalidated
    } else {
      IntentState::Staged
    }
  }

  pub fn source(&self) -> Option<Arc<dyn NavRelevant>> {
    self.source.upgrade()
  }
}

/// Queue of registration intents keyed by owner.
#[derive(Debug, Default)]
pub struct PendingUpdateQueue {
  intents: Vec<PendingIntent>,
  index: HashMap<OwnerId, usize>,
  next_id: u64,
  locked: bool,
}

impl PendingUpdateQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// While locked, stage calls are rejected.
  pub fn is_locked(&self) -> bool {
    self.locked
  }

  pub fn set_locked(&mut self, locked: bool) {
    self.locked = locked;
  }

  pub fn len(&self) -> usize {
    self.intents.len()
  }

  pub fn is_empty(&self) -> bool {
    self.intents.is_empty()
  }

  pub fn contains(&self, owner: OwnerId) -> bool {
    self.index.contains_key(&owner)
  }

  pub fn find(&self, owner: OwnerId) -> Option<&PendingIntent> {
    self.index.get(&owner).map(|&slot| &self.intents[slot])
  }

  pub fn find_mut(&mut self, owner: OwnerId) -> Option<&mut PendingIntent> {
    self.index.get(&owner).map(|&slot| &mut self.intents[slot])
  }

  pub fn iter(&self) -> impl Iterator<Item = &PendingIntent> {
    self.intents.iter()
  }

  /// Stage a registration, or refresh the owner's existing intent in place.
  ///
  /// A refreshed intent is valid again, points at `source` and keeps the
  /// union of both flag overrides. Returns `None` while locked.
  pub fn stage_register(
    &mut self,
    owner: OwnerId,
    source: &Arc<dyn NavRelevant>,
    flags_override: DirtyFlags,
  ) -> Option<IntentId> {
    if self.locked {
      tracing::warn!(%owner, "registration rejected, octree is locked");
      return None;
    }

    if let Some(intent) = self.find_mut(owner) {
      intent.source = Arc::downgrade(source);
      intent.flags_override |= flags_override;
      intent.invalid = false;
      tracing::trace!(%owner, id = intent.id.0, "coalesced pending registration");
      return Some(intent.id);
    }

    let id = IntentId(self.next_id);
    self.next_id += 1;
    self.index.insert(owner, self.intents.len());
    self.intents.push(PendingIntent {
      id,
      owner,
      source: Arc::downgrade(source),
      flags_override,
      invalid: false,
      prev: None,
    });
    Some(id)
  }

  /// Invalidate the owner's intent, if any. Returns whether one was found.
  pub fn stage_unregister(&mut self, owner: OwnerId) -> bool {
    if self.locked {
      tracing::warn!(%owner, "unregistration rejected, octree is locked");
      return false;
    }
    match self.find_mut(owner) {
      Some(intent) => {
        intent.invalid = true;
        true
      }
      None => false,
    }
  }

  /// Remember what the owner looked like in the octree. Merged with any
  /// snapshot already recorded in this window.
  pub fn record_previous_state(&mut self, owner: OwnerId, prev: PreviousState) -> bool {
    let Some(intent) = self.find_mut(owner) else {
      return false;
    };
    intent.prev = Some(match intent.prev {
      Some(existing) => PreviousState {
        bounds: existing.bounds.union(&prev.bounds),
        flags: existing.flags | prev.flags,
      },
      None => prev,
    });
    true
  }

  /// Take every intent for a flush. The queue is empty afterwards.
  pub fn begin_flush(&mut self) -> FlushBatch {
    let intents = std::mem::take(&mut self.intents);
    let index = std::mem::take(&mut self.index);
    let applied = vec![false; intents.len()];
    FlushBatch {
      intents,
      index,
      applied,
    }
  }

  pub fn clear(&mut self) {
    self.intents.clear();
    self.index.clear();
  }
}

/// Intents taken from the queue for one flush.
///
/// Each intent is applied at most once; applying a parent early marks it so
/// the main pass skips it.
#[derive(Debug)]
pub struct FlushBatch {
  intents: Vec<PendingIntent>,
  index: HashMap<OwnerId, usize>,
  applied: Vec<bool>,
}

impl FlushBatch {
  pub fn len(&self) -> usize {
    self.intents.len()
  }

  pub fn is_empty(&self) -> bool {
    self.intents.is_empty()
  }

  pub fn intent(&self, slot: usize) -> &PendingIntent {
    &self.intents[slot]
  }

  pub fn position(&self, owner: OwnerId) -> Option<usize> {
    self.index.get(&owner).copied()
  }

  pub fn is_applied(&self, slot: usize) -> bool {
    self.applied[slot]
  }

  /// Mark an intent applied. False if it already was.
  pub fn mark_applied(&mut self, slot: usize) -> bool {
    !std::mem::replace(&mut self.applied[slot], true)
  }
}

#[cfg(test)]
#[path = "pending_test.rs"]
mod pending_test;
