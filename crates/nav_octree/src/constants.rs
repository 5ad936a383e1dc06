//! Default tuning constants for the navigation octree and the build cadence.
//!
//! # Octree shape
//!
//! ```text
//!                 root (depth 0)
//!                /              \
//!         branch (1)          leaf (1)   <- <= MAX_ELEMENTS_PER_LEAF elements
//!        /         \
//!    leaf (2)    leaf (2)
//!
//!  split:    a leaf holding more than MAX_ELEMENTS_PER_LEAF elements is split
//!            in two at the median element centre, unless it sits at
//!            MAX_NODE_DEPTH.
//!  collapse: a branch whose subtree holds fewer than
//!            MIN_INCLUSIVE_ELEMENTS_PER_NODE elements becomes a leaf again.
//! ```

/// Elements a leaf may hold before it is split.
pub const DEFAULT_MAX_ELEMENTS_PER_LEAF: usize = 16;

/// A branch holding fewer elements than this collapses back into a leaf.
pub const DEFAULT_MIN_INCLUSIVE_ELEMENTS_PER_NODE: usize = 7;

/// Maximum tree depth. Leaves at this depth grow without splitting.
pub const DEFAULT_MAX_NODE_DEPTH: u32 = 12;

/// How often queued dirty areas are handed to the generators in realtime mode.
pub const DEFAULT_DIRTY_AREAS_UPDATE_FREQ_HZ: f32 = 60.0;

/// Seconds between active-region recomputations from registered invokers.
pub const DEFAULT_INVOKERS_UPDATE_INTERVAL: f32 = 1.0;

/// Default navigation tile footprint in world units.
pub const DEFAULT_TILE_SIZE: f64 = 1000.0;

/// Tiles built per asynchronous job.
pub const DEFAULT_MAX_TILES_PER_JOB: usize = 64;

/// Attempts a failing tile gets before it is parked as failed.
pub const DEFAULT_MAX_TILE_ATTEMPTS: u32 = 3;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_collapse_threshold_below_split_threshold() {
    // Otherwise a freshly split leaf could collapse immediately.
    assert!(DEFAULT_MIN_INCLUSIVE_ELEMENTS_PER_NODE < DEFAULT_MAX_ELEMENTS_PER_LEAF);
    assert!(DEFAULT_MIN_INCLUSIVE_ELEMENTS_PER_NODE * 2 <= DEFAULT_MAX_ELEMENTS_PER_LEAF + 1);
  }
}
