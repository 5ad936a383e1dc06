//! Build lock: a bitmask of reasons the navigation build is held.

use crate::types::BuildLockFlags;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildLock {
  flags: BuildLockFlags,
}

impl BuildLock {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn flags(&self) -> BuildLockFlags {
    self.flags
  }

  pub fn is_locked(&self) -> bool {
    !self.flags.is_empty()
  }

  /// Set bits. Returns true if this locked a previously unlocked build.
  pub fn add(&mut self, flags: BuildLockFlags) -> bool {
    let was_locked = self.is_locked();
    self.flags |= flags;
    let locked_now = !was_locked && self.is_locked();
    if locked_now {
      tracing::debug!(?flags, "navigation build locked");
    }
    locked_now
  }

  /// Clear bits. Returns true if this released the last bit.
  pub fn remove(&mut self, flags: BuildLockFlags) -> bool {
    let was_locked = self.is_locked();
    self.flags.remove(flags);
    let unlocked_now = was_locked && !self.is_locked();
    if unlocked_now {
      tracing::debug!(?flags, "navigation build unlocked");
    }
    unlocked_now
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unlock_reports_last_bit_only() {
    let mut lock = BuildLock::new();
    assert!(lock.add(BuildLockFlags::INITIAL_LOCK));
    assert!(!lock.add(BuildLockFlags::CUSTOM));

    assert!(!lock.remove(BuildLockFlags::INITIAL_LOCK));
    assert!(lock.is_locked());
    assert!(lock.remove(BuildLockFlags::CUSTOM));
    assert!(!lock.remove(BuildLockFlags::CUSTOM), "already unlocked");
  }
}
