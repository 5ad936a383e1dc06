//! Element payload stored in the navigation octree.

use crate::ids::OwnerId;
use crate::modifier::CompositeModifier;
use crate::types::{DirtyFlags, ElementFilter};

use super::NavBounds;

/// Box and enclosing-sphere bounds of an element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElementBounds {
  pub aabb: NavBounds,
  pub sphere_radius: f64,
}

impl ElementBounds {
  pub fn new(aabb: NavBounds) -> Self {
    let sphere_radius = if aabb.is_valid() {
      aabb.bounding_sphere_radius()
    } else {
      0.0
    };
    Self { aabb, sphere_radius }
  }
}

/// Navigation payload exported from a collaborator (or merged from a parent
/// and its children).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NavRelevantData {
  /// Exported collision geometry, see [`crate::exporter`].
  pub collision_data: Vec<u8>,
  /// Cached voxelization, opaque to the octree.
  pub voxel_data: Vec<u8>,
  pub modifiers: CompositeModifier,
  /// Bounds of the exported geometry and modifiers.
  pub bounds: NavBounds,
  /// Geometry export deferred until first demand.
  pub pending_lazy_geometry: bool,
  /// Modifier gathering deferred until first demand.
  pub pending_lazy_modifiers: bool,
  pub supports_sliced_gathering: bool,
}

impl NavRelevantData {
  pub fn has_geometry(&self) -> bool {
    !self.collision_data.is_empty()
  }

  pub fn has_pending_lazy_gathering(&self) -> bool {
    self.pending_lazy_geometry || self.pending_lazy_modifiers
  }

  /// Nothing to contribute: no geometry, no voxel cache, no modifiers,
  /// nothing pending and degenerate bounds.
  pub fn is_empty(&self) -> bool {
    !self.has_geometry()
      && self.voxel_data.is_empty()
      && self.modifiers.is_empty()
      && !self.has_pending_lazy_gathering()
      && self.bounds.is_degenerate()
  }

  /// Dirty flags an area covering this data must carry.
  pub fn dirty_flags(&self) -> DirtyFlags {
    let mut flags = DirtyFlags::empty();
    if self.has_geometry() || self.pending_lazy_geometry {
      flags |= DirtyFlags::GEOMETRY;
    }
    if !self.modifiers.is_empty() || self.pending_lazy_modifiers {
      flags |= DirtyFlags::DYNAMIC_MODIFIER;
    }
    if self.modifiers.has_agent_height_adjust() {
      flags |= DirtyFlags::USE_AGENT_HEIGHT;
    }
    flags
  }

  /// Merge `other` into `self`.
  pub fn append(&mut self, other: NavRelevantData) {
    let NavRelevantData {
      collision_data,
      voxel_data,
      modifiers,
      bounds,
      pending_lazy_geometry,
      pending_lazy_modifiers,
      supports_sliced_gathering,
    } = other;

    self.collision_data.extend_from_slice(&collision_data);
    self.voxel_data.extend_from_slice(&voxel_data);
    self.modifiers.append(modifiers);
    self.bounds = self.bounds.union(&bounds);
    self.pending_lazy_geometry |= pending_lazy_geometry;
    self.pending_lazy_modifiers |= pending_lazy_modifiers;
    self.supports_sliced_gathering &= supports_sliced_gathering;
  }

  /// Empty filter matches everything; otherwise any requested bit must be present.
  pub fn matches(&self, filter: ElementFilter) -> bool {
    if filter.is_empty() {
      return true;
    }
    (filter.contains(ElementFilter::GEOMETRY) && (self.has_geometry() || self.pending_lazy_geometry))
      || self.modifiers.matches(filter)
  }

  /// Heap bytes held by this payload.
  pub fn allocated_size(&self) -> usize {
    self.collision_data.capacity() + self.voxel_data.capacity() + self.modifiers.allocated_size()
  }
}

/// One entry of the navigation octree.
#[derive(Clone, Debug, PartialEq)]
pub struct OctreeElement {
  pub owner: OwnerId,
  pub bounds: ElementBounds,
  pub data: NavRelevantData,
}

impl OctreeElement {
  pub fn new(owner: OwnerId, bounds: NavBounds, data: NavRelevantData) -> Self {
    Self {
      owner,
      bounds: ElementBounds::new(bounds),
      data,
    }
  }

  /// Payload empty and element bounds degenerate.
  pub fn is_empty(&self) -> bool {
    self.data.is_empty() && self.bounds.aabb.is_degenerate()
  }

  pub fn matches(&self, filter: ElementFilter) -> bool {
    self.data.matches(filter)
  }

  /// Dirty flags for this element, unless `override_flags` is set.
  pub fn dirty_flags_or_override(&self, override_flags: DirtyFlags) -> DirtyFlags {
    if override_flags.is_empty() {
      self.data.dirty_flags()
    } else {
      override_flags
    }
  }
}
