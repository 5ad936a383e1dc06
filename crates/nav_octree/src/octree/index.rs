//! NavigationOctree - spatial index of navigation-relevant elements.

use std::collections::HashMap;

use glam::DVec3;

use super::element::{ElementBounds, NavRelevantData, OctreeElement};
use super::handle::{ElementArena, ElementHandle, StoredElement};
use super::node::{plan_split, LeafElements, NodeArena, NodeId, NodeKind, TreeNode, ROOT};
use super::query::BoxQuery;
use super::{NavBounds, OctreeConfig};
use crate::error::OctreeError;
use crate::exporter::GeometryExporter;
use crate::ids::OwnerId;
use crate::modifier::CompositeModifier;
use crate::relevant::NavRelevant;
use crate::types::{DataGatheringMode, ElementFilter};

/// Spatial index over navigation elements.
///
/// Elements with degenerate bounds and no geometry are kept for bookkeeping
/// (owner lookup, lazy gathering) but never enter the spatial tree and are
/// never returned by queries.
#[derive(Clone, Debug)]
pub struct NavigationOctree {
  config: OctreeConfig,
  nodes: NodeArena,
  elements: ElementArena,
  owners: HashMap<OwnerId, ElementHandle>,
}

impl NavigationOctree {
  pub fn new(config: OctreeConfig) -> Self {
    Self {
      config,
      nodes: NodeArena::new(),
      elements: ElementArena::default(),
      owners: HashMap::new(),
    }
  }

  pub fn config(&self) -> &OctreeConfig {
    &self.config
  }

  // ===========================================================================
  // Lookup
  // ===========================================================================

  /// Live elements, spatial and bookkeeping-only.
  pub fn len(&self) -> usize {
    self.elements.len()
  }

  pub fn is_empty(&self) -> bool {
    self.elements.len() == 0
  }

  pub fn node_count(&self) -> usize {
    self.nodes.len()
  }

  pub fn depth(&self) -> u32 {
    self.nodes.max_depth()
  }

  /// Bounds of everything in the spatial tree.
  pub fn root_bounds(&self) -> Option<NavBounds> {
    let bounds = self.nodes.node(ROOT).bounds;
    bounds.is_valid().then_some(bounds)
  }

  pub fn is_valid_handle(&self, handle: ElementHandle) -> bool {
    self.elements.contains(handle)
  }

  pub fn get(&self, handle: ElementHandle) -> Result<&OctreeElement, OctreeError> {
    self
      .elements
      .get(handle)
      .map(|stored| &stored.element)
      .ok_or(OctreeError::InvalidHandle(handle))
  }

  /// True if the element takes part in spatial queries.
  pub fn is_spatial(&self, handle: ElementHandle) -> bool {
    self
      .elements
      .get(handle)
      .is_some_and(|stored| stored.leaf.is_some())
  }

  pub fn handle_for_owner(&self, owner: OwnerId) -> Option<ElementHandle> {
    self.owners.get(&owner).copied()
  }

  pub fn element_for_owner(&self, owner: OwnerId) -> Option<&OctreeElement> {
    self
      .handle_for_owner(owner)
      .and_then(|handle| self.get(handle).ok())
  }

  pub fn iter(&self) -> impl Iterator<Item = (ElementHandle, &OctreeElement)> {
    self
      .elements
      .iter()
      .map(|(handle, stored)| (handle, &stored.element))
  }

  /// Lazily visit every spatial element overlapping `bounds` that matches
  /// `filter`.
  ///
  /// The iterator borrows the octree, so no mutation can happen while it is
  /// alive. An invalid query box yields nothing.
  pub fn query_box(&self, bounds: NavBounds, filter: ElementFilter) -> BoxQuery<'_> {
    BoxQuery::new(&self.nodes, &self.elements, bounds, filter)
  }

  /// Heap bytes held by element payloads.
  pub fn memory_usage(&self) -> usize {
    self
      .elements
      .iter()
      .map(|(_, stored)| stored.element.data.allocated_size())
      .sum()
  }

  // ===========================================================================
  // Mutation
  // ===========================================================================

  /// Add an element for `owner`.
  ///
  /// Returns `Ok(None)` without touching the tree when the element carries
  /// nothing. Degenerate bounds are accepted only for elements without
  /// geometry, which are then kept out of the spatial tree.
  #[cfg_attr(feature = "profiling", tracing::instrument(skip_all, name = "octree::insert"))]
  pub fn insert(
    &mut self,
    owner: OwnerId,
    bounds: NavBounds,
    data: NavRelevantData,
  ) -> Result<Option<ElementHandle>, OctreeError> {
    check_bounds(&bounds, &data)?;

    let element = OctreeElement::new(owner, bounds, data);
    if element.is_empty() {
      tracing::trace!(%owner, "skipping empty navigation element");
      return Ok(None);
    }
    if self.owners.contains_key(&owner) {
      return Err(OctreeError::DuplicateOwner(owner));
    }

    let handle = self.elements.insert(StoredElement {
      element,
      leaf: None,
    });
    self.owners.insert(owner, handle);
    if !bounds.is_degenerate() {
      self.attach(handle, bounds);
    }
    Ok(Some(handle))
  }

  /// Merge `data` into an existing element, widening its bounds by `bounds`.
  ///
  /// The handle stays valid; ancestors are refit in place.
  pub fn append_to_node(
    &mut self,
    handle: ElementHandle,
    bounds: NavBounds,
    data: NavRelevantData,
  ) -> Result<(), OctreeError> {
    let current = self.get(handle)?.bounds.aabb;
    if !bounds.is_valid() && data.has_geometry() {
      return Err(OctreeError::InvalidBounds(bounds));
    }

    let merged = match (current.is_valid(), bounds.is_valid()) {
      (true, true) => current.union(&bounds),
      (false, true) => bounds,
      _ => current,
    };

    if let Some(stored) = self.elements.get_mut(handle) {
      stored.element.data.append(data);
    }
    self.set_bounds(handle, merged);
    Ok(())
  }

  /// Change an element's bounds in place.
  pub fn update_node(&mut self, handle: ElementHandle, bounds: NavBounds) -> Result<(), OctreeError> {
    let element = self.get(handle)?;
    check_bounds(&bounds, &element.data)?;
    self.set_bounds(handle, bounds);
    Ok(())
  }

  /// Remove an element. The handle is invalid afterwards.
  pub fn remove(&mut self, handle: ElementHandle) -> Result<OctreeElement, OctreeError> {
    if !self.elements.contains(handle) {
      return Err(OctreeError::InvalidHandle(handle));
    }
    self.detach(handle);

    let stored = self
      .elements
      .remove(handle)
      .ok_or(OctreeError::InvalidHandle(handle))?;
    if self.owners.get(&stored.element.owner) == Some(&handle) {
      self.owners.remove(&stored.element.owner);
    }
    Ok(stored.element)
  }

  pub fn store_voxel_cache(&mut self, handle: ElementHandle, voxels: Vec<u8>) -> Result<(), OctreeError> {
    let stored = self
      .elements
      .get_mut(handle)
      .ok_or(OctreeError::InvalidHandle(handle))?;
    stored.element.data.voxel_data = voxels;
    Ok(())
  }

  /// Drop every element and node. All handles become invalid.
  pub fn clear(&mut self) {
    self.elements.clear();
    self.nodes.reset();
    self.owners.clear();
  }

  // ===========================================================================
  // Gathering
  // ===========================================================================

  /// Export a collaborator's data according to the gathering policy.
  ///
  /// Lazy gathering only marks the data; see
  /// [`demand_lazy_data_gathering`](Self::demand_lazy_data_gathering).
  pub fn gather_data(&self, source: &dyn NavRelevant) -> NavRelevantData {
    let mut data = NavRelevantData {
      supports_sliced_gathering: source.supports_gathering_geometry_slices(),
      ..Default::default()
    };

    match self.config.resolve_gathering(source.geometry_gathering_mode()) {
      DataGatheringMode::Instant => {
        if self.config.store_geometry {
          let mut exporter = GeometryExporter::new();
          source.export_geometry(&mut exporter);
          data.bounds = exporter.bounds();
          data.collision_data = exporter.into_data();
        }
        source.navigation_modifiers(&mut data.modifiers);
        if let Some(modifier_bounds) = data.modifiers.bounds() {
          data.bounds = data.bounds.union(&modifier_bounds);
        }
      }
      DataGatheringMode::Lazy => {
        data.pending_lazy_geometry = self.config.store_geometry;
        data.pending_lazy_modifiers = true;
      }
    }
    data
  }

  /// Run deferred gathering for an element. Returns whether anything was
  /// pending.
  pub fn demand_lazy_data_gathering(
    &mut self,
    handle: ElementHandle,
    source: &dyn NavRelevant,
  ) -> Result<bool, OctreeError> {
    let store_geometry = self.config.store_geometry;
    let stored = self
      .elements
      .get_mut(handle)
      .ok_or(OctreeError::InvalidHandle(handle))?;
    let data = &mut stored.element.data;
    if !data.has_pending_lazy_gathering() {
      return Ok(false);
    }

    if data.pending_lazy_geometry {
      if store_geometry {
        let mut exporter = GeometryExporter::new();
        source.export_geometry(&mut exporter);
        data.bounds = data.bounds.union(&exporter.bounds());
        data.collision_data.extend_from_slice(exporter.data());
      }
      data.pending_lazy_geometry = false;
    }

    if data.pending_lazy_modifiers {
      let mut modifiers = CompositeModifier::new();
      source.navigation_modifiers(&mut modifiers);
      if let Some(modifier_bounds) = modifiers.bounds() {
        data.bounds = data.bounds.union(&modifier_bounds);
      }
      data.modifiers.append(modifiers);
      data.pending_lazy_modifiers = false;
    }
    Ok(true)
  }

  /// Export the part of an element's geometry inside `slice` without storing
  /// it. Collaborators that cannot slice export everything.
  pub fn gather_geometry_slice(
    &self,
    handle: ElementHandle,
    source: &dyn NavRelevant,
    slice: &NavBounds,
  ) -> Result<GeometryExporter, OctreeError> {
    let element = self.get(handle)?;
    let mut exporter = GeometryExporter::new();
    if element.data.supports_sliced_gathering {
      source.gather_geometry_slice(&mut exporter, slice);
    } else {
      source.export_geometry(&mut exporter);
    }
    Ok(exporter)
  }

  // ===========================================================================
  // Tree maintenance
  // ===========================================================================

  /// Route an element into a leaf by its centre and split if the leaf overflows.
  fn attach(&mut self, handle: ElementHandle, aabb: NavBounds) {
    let center = aabb.center();
    let mut id = ROOT;
    loop {
      let node = self.nodes.node_mut(id);
      node.bounds = node.bounds.union(&aabb);
      node.element_count += 1;
      match &mut node.kind {
        NodeKind::Branch {
          axis,
          split,
          children,
        } => {
          id = if center[*axis] < *split {
            children[0]
          } else {
            children[1]
          };
        }
        NodeKind::Leaf(list) => {
          list.push(handle);
          break;
        }
      }
    }

    if let Some(stored) = self.elements.get_mut(handle) {
      stored.leaf = Some(id);
    }
    self.split_if_needed(id);
  }

  fn split_if_needed(&mut self, leaf: NodeId) {
    let node = self.nodes.node(leaf);
    if !self.config.should_split(node.element_count, node.depth) {
      return;
    }
    let NodeKind::Leaf(list) = &node.kind else {
      return;
    };
    let depth = node.depth;

    let entries: Vec<(ElementHandle, NavBounds)> = list
      .iter()
      .filter_map(|h| self.elements.get(*h).map(|s| (*h, s.element.bounds.aabb)))
      .collect();
    let centers: Vec<DVec3> = entries.iter().map(|(_, b)| b.center()).collect();
    let Some(plan) = plan_split(&centers) else {
      return;
    };

    let mut children = [0; 2];
    for (slot, indices) in [&plan.left, &plan.right].into_iter().enumerate() {
      let mut child = TreeNode::leaf(depth + 1, Some(leaf));
      let mut list = LeafElements::with_capacity(indices.len());
      for &i in indices {
        let (handle, aabb) = entries[i];
        child.bounds = child.bounds.union(&aabb);
        list.push(handle);
      }
      child.element_count = list.len();
      child.kind = NodeKind::Leaf(list);
      children[slot] = self.nodes.alloc(child);
    }

    for (slot, indices) in [&plan.left, &plan.right].into_iter().enumerate() {
      for &i in indices {
        if let Some(stored) = self.elements.get_mut(entries[i].0) {
          stored.leaf = Some(children[slot]);
        }
      }
    }

    self.nodes.node_mut(leaf).kind = NodeKind::Branch {
      axis: plan.axis,
      split: plan.split,
      children,
    };
    tracing::trace!(leaf, axis = plan.axis, split = plan.split, "split octree leaf");

    self.split_if_needed(children[0]);
    self.split_if_needed(children[1]);
  }

  /// Take an element out of the spatial tree (it stays in the arena).
  fn detach(&mut self, handle: ElementHandle) {
    let Some(leaf) = self.elements.get_mut(handle).and_then(|s| s.leaf.take()) else {
      return;
    };

    if let NodeKind::Leaf(list) = &mut self.nodes.node_mut(leaf).kind {
      if let Some(pos) = list.iter().position(|h| *h == handle) {
        list.swap_remove(pos);
      }
    }

    let mut cursor = Some(leaf);
    while let Some(id) = cursor {
      let node = self.nodes.node_mut(id);
      node.element_count = node.element_count.saturating_sub(1);
      cursor = node.parent;
    }

    self.refit_upwards(leaf);
    self.collapse_from(leaf);
  }

  /// Set an element's bounds, moving it in or out of the spatial tree when
  /// its degeneracy changes. Stays in its current leaf otherwise.
  fn set_bounds(&mut self, handle: ElementHandle, aabb: NavBounds) {
    let Some(stored) = self.elements.get_mut(handle) else {
      return;
    };
    stored.element.bounds = ElementBounds::new(aabb);
    let leaf = stored.leaf;

    match (leaf, aabb.is_degenerate()) {
      (Some(leaf), false) => self.refit_upwards(leaf),
      (Some(_), true) => self.detach(handle),
      (None, false) => self.attach(handle, aabb),
      (None, true) => {}
    }
  }

  /// Recompute node bounds from `id` to the root.
  fn refit_upwards(&mut self, id: NodeId) {
    let mut cursor = Some(id);
    while let Some(id) = cursor {
      let node = self.nodes.node(id);
      let bounds = match &node.kind {
        NodeKind::Leaf(list) => list
          .iter()
          .filter_map(|h| self.elements.get(*h))
          .fold(NavBounds::EMPTY, |acc, s| acc.union(&s.element.bounds.aabb)),
        NodeKind::Branch { children, .. } => self
          .nodes
          .node(children[0])
          .bounds
          .union(&self.nodes.node(children[1]).bounds),
      };
      let parent = node.parent;
      self.nodes.node_mut(id).bounds = bounds;
      cursor = parent;
    }
  }

  /// Collapse the highest ancestor of `leaf` that fell below the minimum.
  fn collapse_from(&mut self, leaf: NodeId) {
    let mut target = None;
    let mut cursor = self.nodes.node(leaf).parent;
    while let Some(id) = cursor {
      let node = self.nodes.node(id);
      if !self.config.should_collapse(node.element_count) {
        break;
      }
      target = Some(id);
      cursor = node.parent;
    }
    if let Some(target) = target {
      self.collapse(target);
    }
  }

  fn collapse(&mut self, target: NodeId) {
    let mut gathered = LeafElements::new();
    let mut stack = match &self.nodes.node(target).kind {
      NodeKind::Branch { children, .. } => children.to_vec(),
      NodeKind::Leaf(_) => return,
    };

    while let Some(id) = stack.pop() {
      match &self.nodes.node(id).kind {
        NodeKind::Leaf(list) => gathered.extend_from_slice(list),
        NodeKind::Branch { children, .. } => stack.extend_from_slice(children),
      }
      self.nodes.release(id);
    }

    for handle in &gathered {
      if let Some(stored) = self.elements.get_mut(*handle) {
        stored.leaf = Some(target);
      }
    }
    tracing::trace!(node = target, elements = gathered.len(), "collapsed octree subtree");
    self.nodes.node_mut(target).kind = NodeKind::Leaf(gathered);
  }

  /// Structural self-check: counts, bounds containment and leaf back-links.
  #[cfg(test)]
  pub(crate) fn check_invariants(&self) -> Result<(), String> {
    let mut spatial = 0;
    let mut stack = vec![ROOT];
    while let Some(id) = stack.pop() {
      let node = self.nodes.node(id);
      match &node.kind {
        NodeKind::Leaf(list) => {
          if list.len() != node.element_count {
            return Err(format!("leaf {id} count {} != {}", list.len(), node.element_count));
          }
          if list.len() > self.config.max_elements_per_leaf && node.depth < self.config.max_node_depth {
            // Only allowed when the centres cannot be separated.
            let centers: Vec<DVec3> = list
              .iter()
              .filter_map(|h| self.elements.get(*h))
              .map(|s| s.element.bounds.aabb.center())
              .collect();
            if plan_split(&centers).is_some() {
              return Err(format!("leaf {id} overfull ({})", list.len()));
            }
          }
          for h in list {
            let stored = self.elements.get(*h).ok_or(format!("dead handle in leaf {id}"))?;
            if stored.leaf != Some(id) {
              return Err(format!("element back-link mismatch in leaf {id}"));
            }
            if !node.bounds.contains(&stored.element.bounds.aabb) {
              return Err(format!("leaf {id} bounds do not contain element"));
            }
          }
          spatial += list.len();
        }
        NodeKind::Branch { children, .. } => {
          let sum: usize = children.iter().map(|c| self.nodes.node(*c).element_count).sum();
          if sum != node.element_count {
            return Err(format!("branch {id} count {} != children {sum}", node.element_count));
          }
          for c in children {
            let child = self.nodes.node(*c);
            if child.parent != Some(id) || child.depth != node.depth + 1 {
              return Err(format!("branch {id} child {c} linkage broken"));
            }
            if child.element_count > 0 && !node.bounds.contains(&child.bounds) {
              return Err(format!("branch {id} bounds do not contain child {c}"));
            }
          }
          if self.config.should_collapse(node.element_count) {
            return Err(format!("branch {id} should have collapsed"));
          }
          stack.extend_from_slice(children);
        }
      }
    }

    let expected = self.elements.iter().filter(|(_, s)| s.leaf.is_some()).count();
    if spatial != expected {
      return Err(format!("tree holds {spatial} elements, arena says {expected}"));
    }
    Ok(())
  }
}

impl Default for NavigationOctree {
  fn default() -> Self {
    Self::new(OctreeConfig::default())
  }
}

/// Non-finite bounds are always rejected; degenerate bounds only when the
/// element carries geometry.
pub(crate) fn check_bounds(bounds: &NavBounds, data: &NavRelevantData) -> Result<(), OctreeError> {
  if !bounds.is_finite() || (bounds.is_degenerate() && data.has_geometry()) {
    tracing::warn!(?bounds, "rejecting navigation element with invalid bounds");
    return Err(OctreeError::InvalidBounds(*bounds));
  }
  Ok(())
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
