//! Flag sets and small value types shared by the octree, the pending queue,
//! the dirty-area accumulator and the driver.

use bitflags::bitflags;

use crate::octree::NavBounds;

bitflags! {
  /// What kind of navigation data a dirty area invalidates.
  #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
  pub struct DirtyFlags: u8 {
    /// Collision geometry changed.
    const GEOMETRY = 1 << 0;
    /// Area modifiers or links changed.
    const DYNAMIC_MODIFIER = 1 << 1;
    /// Modifier bounds depend on agent height.
    const USE_AGENT_HEIGHT = 1 << 2;
    /// Navigation bounds volumes moved.
    const NAVIGATION_BOUNDS = 1 << 3;
    /// Geometry and modifiers.
    const ALL = Self::GEOMETRY.bits() | Self::DYNAMIC_MODIFIER.bits();
  }
}

bitflags! {
  /// Modifiers for register / unregister / update calls.
  #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
  pub struct OctreeUpdateFlags: u8 {
    /// Treat the change as a geometry change: dirty with [`DirtyFlags::ALL`].
    const GEOMETRY = 1 << 0;
    /// Treat the change as a modifier change: dirty with
    /// [`DirtyFlags::DYNAMIC_MODIFIER`].
    const MODIFIERS = 1 << 1;
    /// Part of an unregister+register refresh; a queued intent survives.
    const REFRESH = 1 << 2;
    /// Part of a parent-chain rebuild.
    const PARENT_CHAIN = 1 << 3;
  }
}

impl OctreeUpdateFlags {
  /// No special handling.
  pub const DEFAULT: Self = Self::empty();

  /// Dirty flags implied by these update flags, or `default` when they imply
  /// nothing.
  #[inline]
  pub fn dirty_flags_or(self, default: DirtyFlags) -> DirtyFlags {
    if self.contains(Self::GEOMETRY) {
      DirtyFlags::ALL
    } else if self.contains(Self::MODIFIERS) {
      DirtyFlags::DYNAMIC_MODIFIER
    } else {
      default
    }
  }
}

bitflags! {
  /// Reasons the navigation build is held. The build is locked while any bit
  /// is set.
  #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
  pub struct BuildLockFlags: u8 {
    const NO_UPDATE_IN_EDITOR = 1 << 1;
    const NO_UPDATE_IN_PIE = 1 << 2;
    const INITIAL_LOCK = 1 << 3;
    const CUSTOM = 1 << 4;
    const CUSTOM_5 = 1 << 5;
    const CUSTOM_6 = 1 << 6;
    const CUSTOM_7 = 1 << 7;
  }
}

bitflags! {
  /// Query filter over element contents. The empty filter matches everything.
  #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
  pub struct ElementFilter: u8 {
    const GEOMETRY = 1 << 0;
    const AREAS = 1 << 1;
    const LINKS = 1 << 2;
    const META_AREAS = 1 << 3;
  }
}

/// How a collaborator wants its geometry gathered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GatheringMode {
  /// Use the octree's configured [`DataGatheringMode`].
  #[default]
  Default,
  Instant,
  Lazy,
}

/// Octree-wide gathering policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DataGatheringMode {
  /// Export geometry and modifiers when the element is inserted.
  #[default]
  Instant,
  /// Mark the element and export on first demand.
  Lazy,
}

/// A region whose navigation data must be rebuilt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirtyArea {
  pub bounds: NavBounds,
  pub flags: DirtyFlags,
}

impl DirtyArea {
  pub fn new(bounds: NavBounds, flags: DirtyFlags) -> Self {
    Self { bounds, flags }
  }

  /// Non-empty flags and a non-degenerate box.
  pub fn is_valid(&self) -> bool {
    !self.flags.is_empty() && !self.bounds.is_degenerate()
  }
}

#[cfg(test)]
mod tests {
  use glam::DVec3;

  use super::*;

  #[test]
  fn test_dirty_flag_values() {
    assert_eq!(DirtyFlags::GEOMETRY.bits(), 1);
    assert_eq!(DirtyFlags::DYNAMIC_MODIFIER.bits(), 2);
    assert_eq!(DirtyFlags::USE_AGENT_HEIGHT.bits(), 4);
    assert_eq!(DirtyFlags::NAVIGATION_BOUNDS.bits(), 8);
    assert_eq!(DirtyFlags::ALL.bits(), 3);
  }

  #[test]
  fn test_update_flags_map_to_dirty_flags() {
    let fallback = DirtyFlags::USE_AGENT_HEIGHT;
    assert_eq!(
      OctreeUpdateFlags::GEOMETRY.dirty_flags_or(fallback),
      DirtyFlags::ALL
    );
    assert_eq!(
      OctreeUpdateFlags::MODIFIERS.dirty_flags_or(fallback),
      DirtyFlags::DYNAMIC_MODIFIER
    );
    // GEOMETRY wins over MODIFIERS
    assert_eq!(
      (OctreeUpdateFlags::GEOMETRY | OctreeUpdateFlags::MODIFIERS).dirty_flags_or(fallback),
      DirtyFlags::ALL
    );
    assert_eq!(OctreeUpdateFlags::REFRESH.dirty_flags_or(fallback), fallback);
    assert_eq!(OctreeUpdateFlags::DEFAULT.dirty_flags_or(fallback), fallback);
  }

  #[test]
  fn test_build_lock_values() {
    assert_eq!(BuildLockFlags::NO_UPDATE_IN_EDITOR.bits(), 2);
    assert_eq!(BuildLockFlags::NO_UPDATE_IN_PIE.bits(), 4);
    assert_eq!(BuildLockFlags::INITIAL_LOCK.bits(), 8);
    assert_eq!(BuildLockFlags::CUSTOM.bits(), 16);
  }

  #[test]
  fn test_dirty_area_validity() {
    let good = DirtyArea::new(NavBounds::new(DVec3::ZERO, DVec3::ONE), DirtyFlags::ALL);
    assert!(good.is_valid());
    let no_flags = DirtyArea::new(good.bounds, DirtyFlags::empty());
    assert!(!no_flags.is_valid());
    let point = DirtyArea::new(NavBounds::new(DVec3::ONE, DVec3::ONE), DirtyFlags::ALL);
    assert!(!point.is_valid());
  }
}
