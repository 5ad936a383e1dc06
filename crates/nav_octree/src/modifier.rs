//! Navigation modifiers: area overrides and off-mesh links carried by octree
//! elements.

use std::borrow::Cow;

use glam::DVec3;

use crate::octree::NavBounds;
use crate::types::ElementFilter;

/// Opaque navigation area class (walkable, water, obstacle...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AreaClassId(pub u32);

/// Opaque agent type index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AgentId(pub u32);

/// Identity of a navigation link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u32);

/// Overrides the area class of navigation data inside `bounds`.
#[derive(Clone, Debug, PartialEq)]
pub struct AreaModifier {
  pub bounds: NavBounds,
  pub area: AreaClassId,
  /// Meta areas are placeholders resolved per agent before use.
  pub is_meta: bool,
  /// Bounds are grown by the agent height when the tile is built.
  pub include_agent_height: bool,
}

impl AreaModifier {
  pub fn new(bounds: NavBounds, area: AreaClassId) -> Self {
    Self {
      bounds,
      area,
      is_meta: false,
      include_agent_height: false,
    }
  }

  pub fn meta(mut self) -> Self {
    self.is_meta = true;
    self
  }

  pub fn with_agent_height(mut self) -> Self {
    self.include_agent_height = true;
    self
  }
}

/// Traversal direction of a link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkDirection {
  #[default]
  BothWays,
  LeftToRight,
  RightToLeft,
}

/// Off-mesh connection between two points.
#[derive(Clone, Debug, PartialEq)]
pub struct NavLink {
  pub id: LinkId,
  pub left: DVec3,
  pub right: DVec3,
  pub direction: LinkDirection,
  pub area: AreaClassId,
  /// How far each end may snap onto the surface.
  pub snap_radius: f64,
}

impl NavLink {
  pub fn new(id: LinkId, left: DVec3, right: DVec3, area: AreaClassId) -> Self {
    Self {
      id,
      left,
      right,
      direction: LinkDirection::BothWays,
      area,
      snap_radius: 0.0,
    }
  }

  /// Box around both endpoints, grown by the snap radius.
  pub fn bounds(&self) -> NavBounds {
    NavBounds::new(self.left.min(self.right), self.left.max(self.right))
      .expand_by(self.snap_radius.max(0.0))
  }
}

/// Maps meta area classes to concrete ones for a given agent.
pub trait MetaAreaResolver {
  fn resolve(&self, meta: AreaClassId, agent: AgentId) -> AreaClassId;
}

/// All modifiers contributed by one element (or one parent+children aggregate).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompositeModifier {
  areas: Vec<AreaModifier>,
  links: Vec<NavLink>,
}

impl CompositeModifier {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_area(&mut self, area: AreaModifier) {
    self.areas.push(area);
  }

  pub fn add_link(&mut self, link: NavLink) {
    self.links.push(link);
  }

  pub fn areas(&self) -> &[AreaModifier] {
    &self.areas
  }

  pub fn links(&self) -> &[NavLink] {
    &self.links
  }

  pub fn is_empty(&self) -> bool {
    self.areas.is_empty() && self.links.is_empty()
  }

  pub fn has_areas(&self) -> bool {
    !self.areas.is_empty()
  }

  pub fn has_links(&self) -> bool {
    !self.links.is_empty()
  }

  pub fn has_meta_areas(&self) -> bool {
    self.areas.iter().any(|a| a.is_meta)
  }

  pub fn has_agent_height_adjust(&self) -> bool {
    self.areas.iter().any(|a| a.include_agent_height)
  }

  /// True if the modifiers satisfy any bit of `filter` (modifier bits only).
  pub fn matches(&self, filter: ElementFilter) -> bool {
    (filter.contains(ElementFilter::AREAS) && self.has_areas())
      || (filter.contains(ElementFilter::LINKS) && self.has_links())
      || (filter.contains(ElementFilter::META_AREAS) && self.has_meta_areas())
  }

  /// Move every modifier of `other` into `self`.
  pub fn append(&mut self, mut other: CompositeModifier) {
    self.areas.append(&mut other.areas);
    self.links.append(&mut other.links);
  }

  /// Union of all area and link bounds.
  pub fn bounds(&self) -> Option<NavBounds> {
    let area_bounds = self.areas.iter().map(|a| a.bounds);
    let link_bounds = self.links.iter().map(NavLink::bounds);
    let all: Vec<NavBounds> = area_bounds.chain(link_bounds).collect();
    NavBounds::union_all(&all)
  }

  pub fn clear(&mut self) {
    self.areas.clear();
    self.links.clear();
  }

  /// Bytes held on the heap.
  pub fn allocated_size(&self) -> usize {
    self.areas.capacity() * std::mem::size_of::<AreaModifier>()
      + self.links.capacity() * std::mem::size_of::<NavLink>()
  }

  /// Modifiers with meta areas replaced for `agent`.
  ///
  /// Resolved on every call and never cached. Borrows `self` unchanged when
  /// there is nothing to resolve.
  pub fn resolve_for_agent(
    &self,
    agent: AgentId,
    resolver: &dyn MetaAreaResolver,
  ) -> Cow<'_, CompositeModifier> {
    if !self.has_meta_areas() {
      return Cow::Borrowed(self);
    }

    let mut resolved = self.clone();
    for area in resolved.areas.iter_mut().filter(|a| a.is_meta) {
      area.area = resolver.resolve(area.area, agent);
      area.is_meta = false;
    }
    Cow::Owned(resolved)
  }
}
