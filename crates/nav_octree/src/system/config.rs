//! NavSystemConfig - driver-level configuration and presets.

use crate::constants::DEFAULT_INVOKERS_UPDATE_INTERVAL;
use crate::dirty_areas::DirtyAreaConfig;
use crate::octree::OctreeConfig;

/// Configuration for a [`NavigationSystem`](super::NavigationSystem).
#[derive(Clone, Debug, PartialEq)]
pub struct NavSystemConfig {
  pub octree: OctreeConfig,

  pub dirty_areas: DirtyAreaConfig,

  /// Hold the build with `BuildLockFlags::INITIAL_LOCK` from setup until
  /// the caller releases it.
  pub initial_build_lock: bool,

  /// Realtime drains are capped at the dirty-area frequency. Otherwise
  /// every tick drains.
  pub realtime: bool,

  /// Starting value of the auto-update toggle.
  pub auto_update_enabled: bool,

  /// Seconds between active-region recomputes.
  pub invokers_update_interval: f32,

  /// Never rebuild everything when the last build lock is released.
  pub skip_rebuild_on_unlock: bool,
}

impl NavSystemConfig {
  /// Capped drains, initial lock.
  pub const GAME: Self = Self {
    octree: OctreeConfig::DEFAULT,
    dirty_areas: DirtyAreaConfig::DEFAULT,
    initial_build_lock: true,
    realtime: true,
    auto_update_enabled: true,
    invokers_update_interval: DEFAULT_INVOKERS_UPDATE_INTERVAL,
    skip_rebuild_on_unlock: false,
  };

  /// Every tick drains.
  pub const EDITOR: Self = Self {
    realtime: false,
    ..Self::GAME
  };
}

impl Default for NavSystemConfig {
  fn default() -> Self {
    Self::GAME
  }
}
