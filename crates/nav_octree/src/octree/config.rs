//! OctreeConfig - node capacity, depth limit and data gathering policy.

use crate::constants::{
  DEFAULT_MAX_ELEMENTS_PER_LEAF, DEFAULT_MAX_NODE_DEPTH, DEFAULT_MIN_INCLUSIVE_ELEMENTS_PER_NODE,
};
use crate::types::{DataGatheringMode, GatheringMode};

/// Configuration for the navigation octree.
#[derive(Clone, Debug, PartialEq)]
pub struct OctreeConfig {
  /// Leaf capacity before a split.
  pub max_elements_per_leaf: usize,

  /// Branches holding fewer elements than this collapse into a leaf.
  pub min_inclusive_elements_per_node: usize,

  /// Deepest level a split may create.
  pub max_node_depth: u32,

  /// Gathering policy for collaborators that ask for
  /// [`GatheringMode::Default`].
  pub gathering_mode: DataGatheringMode,

  /// When false, collision geometry is never exported into elements
  /// (modifiers still are).
  pub store_geometry: bool,
}

impl OctreeConfig {
  /// Default shape, instant gathering.
  pub const DEFAULT: Self = Self {
    max_elements_per_leaf: DEFAULT_MAX_ELEMENTS_PER_LEAF,
    min_inclusive_elements_per_node: DEFAULT_MIN_INCLUSIVE_ELEMENTS_PER_NODE,
    max_node_depth: DEFAULT_MAX_NODE_DEPTH,
    gathering_mode: DataGatheringMode::Instant,
    store_geometry: true,
  };

  /// Default shape, geometry exported on first demand.
  pub const LAZY: Self = Self {
    gathering_mode: DataGatheringMode::Lazy,
    ..Self::DEFAULT
  };

  /// Modifiers only; for generators that rasterize from their own source.
  pub const MODIFIERS_ONLY: Self = Self {
    store_geometry: false,
    ..Self::DEFAULT
  };

  /// Whether a leaf holding `count` elements at `depth` must split.
  #[inline]
  pub fn should_split(&self, count: usize, depth: u32) -> bool {
    count > self.max_elements_per_leaf && depth < self.max_node_depth
  }

  /// Whether a branch holding `count` elements must collapse into a leaf.
  #[inline]
  pub fn should_collapse(&self, count: usize) -> bool {
    count < self.min_inclusive_elements_per_node
  }

  /// Effective gathering mode for a collaborator's request.
  #[inline]
  pub fn resolve_gathering(&self, requested: GatheringMode) -> DataGatheringMode {
    match requested {
      GatheringMode::Default => self.gathering_mode,
      GatheringMode::Instant => DataGatheringMode::Instant,
      GatheringMode::Lazy => DataGatheringMode::Lazy,
    }
  }
}

impl Default for OctreeConfig {
  fn default() -> Self {
    Self::DEFAULT
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
