//! Lazy box queries over the navigation octree.

use smallvec::SmallVec;

use super::element::OctreeElement;
use super::handle::{ElementArena, ElementHandle};
use super::node::{NodeArena, NodeId, NodeKind, ROOT};
use super::NavBounds;
use crate::types::ElementFilter;

/// Iterator over elements overlapping a box.
///
/// Visits nodes depth first, skipping any subtree whose bounds miss the
/// query. Holding the iterator keeps the octree immutably borrowed.
#[derive(Clone, Debug)]
pub struct BoxQuery<'a> {
  nodes: &'a NodeArena,
  elements: &'a ElementArena,
  bounds: NavBounds,
  filter: ElementFilter,
  stack: SmallVec<[NodeId; 32]>,
  leaf: Option<(&'a [ElementHandle], usize)>,
}

impl<'a> BoxQuery<'a> {
  pub(crate) fn new(
    nodes: &'a NodeArena,
    elements: &'a ElementArena,
    bounds: NavBounds,
    filter: ElementFilter,
  ) -> Self {
    let mut query = Self {
      nodes,
      elements,
      bounds,
      filter,
      stack: SmallVec::new(),
      leaf: None,
    };
    query.restart();
    query
  }

  /// Start over from the root.
  pub fn restart(&mut self) {
    self.stack.clear();
    self.leaf = None;
    if self.bounds.is_valid() {
      self.stack.push(ROOT);
    }
  }

  pub fn bounds(&self) -> &NavBounds {
    &self.bounds
  }
}

impl<'a> Iterator for BoxQuery<'a> {
  type Item = (ElementHandle, &'a OctreeElement);

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some((handles, cursor)) = &mut self.leaf {
        while let Some(&handle) = handles.get(*cursor) {
          *cursor += 1;
          let Some(stored) = self.elements.get(handle) else {
            continue;
          };
          let element = &stored.element;
          if element.bounds.aabb.overlaps(&self.bounds) && element.matches(self.filter) {
            return Some((handle, element));
          }
        }
        self.leaf = None;
      }

      let id = self.stack.pop()?;
      let node = self.nodes.node(id);
      if node.element_count == 0 || !node.bounds.overlaps(&self.bounds) {
        continue;
      }
      match &node.kind {
        NodeKind::Leaf(list) => self.leaf = Some((list.as_slice(), 0)),
        NodeKind::Branch { children, .. } => {
          self.stack.push(children[1]);
          self.stack.push(children[0]);
        }
      }
    }
  }
}
