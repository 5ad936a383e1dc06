//! Parent → children map for collaborators attached to another owner.
//!
//! A child never gets an octree element of its own; its data is appended to
//! its parent's element. This map only records who to gather.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::ids::OwnerId;

pub type ChildList = SmallVec<[OwnerId; 4]>;

#[derive(Debug, Default)]
pub struct ParentChildMap {
  children: HashMap<OwnerId, ChildList>,
}

impl ParentChildMap {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record `child` under `parent`. Returns false if already present.
  pub fn add_unique(&mut self, parent: OwnerId, child: OwnerId) -> bool {
    let list = self.children.entry(parent).or_default();
    if list.contains(&child) {
      return false;
    }
    list.push(child);
    true
  }

  /// Remove one occurrence of `child`. Empty lists are dropped.
  pub fn remove_single(&mut self, parent: OwnerId, child: OwnerId) -> bool {
    let Some(list) = self.children.get_mut(&parent) else {
      return false;
    };
    let Some(pos) = list.iter().position(|&c| c == child) else {
      return false;
    };
    list.remove(pos);
    if list.is_empty() {
      self.children.remove(&parent);
    }
    true
  }

  pub fn children(&self, parent: OwnerId) -> &[OwnerId] {
    self.children.get(&parent).map_or(&[], |list| list.as_slice())
  }

  pub fn has_children(&self, parent: OwnerId) -> bool {
    self.children.contains_key(&parent)
  }

  /// Parents with at least one child.
  pub fn len(&self) -> usize {
    self.children.len()
  }

  pub fn is_empty(&self) -> bool {
    self.children.is_empty()
  }

  pub fn clear(&mut self) {
    self.children.clear();
  }
}
