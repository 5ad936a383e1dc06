//! Tree nodes and the median split used when a leaf overflows.
//!
//! ```text
//! Split of an overflowing leaf (axis = greatest spread of element centres):
//!
//!   centres on axis:   a   b   c   d | e   f   g   h   i
//!                                    ^
//!                      split plane = midpoint of d and e
//!
//!   odd count: the middle element joins the side whose neighbour is closer.
//! ```
//!
//! Elements are routed by centre, but node bounds are the union of the
//! contained element bounds, so a query never depends on where an element
//! was routed.

use glam::DVec3;
use smallvec::SmallVec;

use super::bounds::{NavBounds, NEARLY_ZERO_SIZE};
use super::handle::ElementHandle;

/// Index of a node in the [`NodeArena`].
pub(crate) type NodeId = u32;

/// The root node always lives at index 0.
pub(crate) const ROOT: NodeId = 0;

/// Leaf element list. Inline up to the default leaf capacity.
pub(crate) type LeafElements = SmallVec<[ElementHandle; 16]>;

#[derive(Clone, Debug)]
pub(crate) enum NodeKind {
  Leaf(LeafElements),
  Branch {
    axis: usize,
    split: f64,
    /// `[below split, at or above split]`
    children: [NodeId; 2],
  },
}

#[derive(Clone, Debug)]
pub(crate) struct TreeNode {
  /// Union of all element bounds in the subtree ([`NavBounds::EMPTY`] if none).
  pub bounds: NavBounds,
  pub depth: u32,
  pub parent: Option<NodeId>,
  /// Spatial elements in the subtree.
  pub element_count: usize,
  pub kind: NodeKind,
}

impl TreeNode {
  pub fn leaf(depth: u32, parent: Option<NodeId>) -> Self {
    Self {
      bounds: NavBounds::EMPTY,
      depth,
      parent,
      element_count: 0,
      kind: NodeKind::Leaf(LeafElements::new()),
    }
  }

  pub fn is_leaf(&self) -> bool {
    matches!(self.kind, NodeKind::Leaf(_))
  }
}

/// Node storage with a free list. Index 0 is always the root.
#[derive(Clone, Debug)]
pub(crate) struct NodeArena {
  nodes: Vec<TreeNode>,
  free: Vec<NodeId>,
}

impl NodeArena {
  pub fn new() -> Self {
    Self {
      nodes: vec![TreeNode::leaf(0, None)],
      free: Vec::new(),
    }
  }

  #[inline]
  pub fn node(&self, id: NodeId) -> &TreeNode {
    &self.nodes[id as usize]
  }

  #[inline]
  pub fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
    &mut self.nodes[id as usize]
  }

  pub fn alloc(&mut self, node: TreeNode) -> NodeId {
    if let Some(id) = self.free.pop() {
      self.nodes[id as usize] = node;
      return id;
    }
    self.nodes.push(node);
    (self.nodes.len() - 1) as NodeId
  }

  pub fn release(&mut self, id: NodeId) {
    debug_assert_ne!(id, ROOT, "root node is never released");
    self.nodes[id as usize] = TreeNode::leaf(0, None);
    self.free.push(id);
  }

  /// Live node count.
  pub fn len(&self) -> usize {
    self.nodes.len() - self.free.len()
  }

  /// Deepest live node, walking from the root.
  pub fn max_depth(&self) -> u32 {
    let mut deepest = 0;
    let mut stack = vec![ROOT];
    while let Some(id) = stack.pop() {
      let node = self.node(id);
      deepest = deepest.max(node.depth);
      if let NodeKind::Branch { children, .. } = &node.kind {
        stack.extend_from_slice(children);
      }
    }
    deepest
  }

  pub fn reset(&mut self) {
    self.nodes.clear();
    self.free.clear();
    self.nodes.push(TreeNode::leaf(0, None));
  }
}

/// How to divide an overflowing leaf.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SplitPlan {
  pub axis: usize,
  pub split: f64,
  /// Indices into the centre slice, below the plane.
  pub left: Vec<usize>,
  /// Indices into the centre slice, at or above the plane.
  pub right: Vec<usize>,
}

/// Median split on the axis of greatest centre spread.
///
/// Spread ties go to the lowest axis index. Returns `None` when all centres
/// coincide (nothing can separate them).
pub(crate) fn plan_split(centers: &[DVec3]) -> Option<SplitPlan> {
  if centers.len() < 2 {
    return None;
  }

  let lo = centers.iter().fold(DVec3::INFINITY, |acc, c| acc.min(*c));
  let hi = centers.iter().fold(DVec3::NEG_INFINITY, |acc, c| acc.max(*c));
  let spread = hi - lo;

  let mut axis = 0;
  for candidate in 1..3 {
    if spread[candidate] > spread[axis] {
      axis = candidate;
    }
  }
  if spread[axis] <= NEARLY_ZERO_SIZE {
    return None;
  }

  let mut order: Vec<usize> = (0..centers.len()).collect();
  order.sort_by(|&a, &b| centers[a][axis].total_cmp(&centers[b][axis]));
  let value = |rank: usize| centers[order[rank]][axis];

  let n = order.len();
  let mut left_len = n / 2;
  if n % 2 == 1 {
    let mid = n / 2;
    let gap_below = value(mid) - value(mid - 1);
    let gap_above = value(mid + 1) - value(mid);
    if gap_below <= gap_above {
      left_len = mid + 1;
    }
  }

  let split = (value(left_len - 1) + value(left_len)) * 0.5;
  let right = order.split_off(left_len);
  Some(SplitPlan {
    axis,
    split,
    left: order,
    right,
  })
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
