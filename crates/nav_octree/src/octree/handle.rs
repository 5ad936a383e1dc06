//! Generation-checked element handles and the slot arena behind them.

use super::element::OctreeElement;
use super::node::NodeId;

/// Opaque, revocable reference to an octree element.
///
/// A handle stays valid until its element is removed; after that every use
/// fails with [`OctreeError::InvalidHandle`](crate::OctreeError::InvalidHandle)
/// even if the slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementHandle {
  index: u32,
  generation: u32,
}

impl ElementHandle {
  /// Never refers to an element.
  pub const INVALID: Self = Self {
    index: u32::MAX,
    generation: 0,
  };

  pub fn index(&self) -> u32 {
    self.index
  }

  pub fn generation(&self) -> u32 {
    self.generation
  }

  /// False only for [`ElementHandle::INVALID`]. Says nothing about liveness.
  pub fn is_set(&self) -> bool {
    *self != Self::INVALID
  }
}

/// An element plus the leaf currently holding it.
#[derive(Clone, Debug)]
pub(crate) struct StoredElement {
  pub element: OctreeElement,
  /// `None` for bookkeeping-only elements kept out of the spatial tree.
  pub leaf: Option<NodeId>,
}

#[derive(Clone, Debug)]
struct Slot {
  generation: u32,
  entry: Option<StoredElement>,
}

/// Slot arena with a free list. Removing bumps the slot generation.
#[derive(Clone, Debug, Default)]
pub(crate) struct ElementArena {
  slots: Vec<Slot>,
  free: Vec<u32>,
  len: usize,
}

impl ElementArena {
  pub fn insert(&mut self, stored: StoredElement) -> ElementHandle {
    self.len += 1;
    if let Some(index) = self.free.pop() {
      let slot = &mut self.slots[index as usize];
      slot.entry = Some(stored);
      return ElementHandle {
        index,
        generation: slot.generation,
      };
    }

    let index = self.slots.len() as u32;
    self.slots.push(Slot {
      generation: 0,
      entry: Some(stored),
    });
    ElementHandle {
      index,
      generation: 0,
    }
  }

  pub fn get(&self, handle: ElementHandle) -> Option<&StoredElement> {
    self
      .slots
      .get(handle.index as usize)
      .filter(|slot| slot.generation == handle.generation)
      .and_then(|slot| slot.entry.as_ref())
  }

  pub fn get_mut(&mut self, handle: ElementHandle) -> Option<&mut StoredElement> {
    self
      .slots
      .get_mut(handle.index as usize)
      .filter(|slot| slot.generation == handle.generation)
      .and_then(|slot| slot.entry.as_mut())
  }

  pub fn contains(&self, handle: ElementHandle) -> bool {
    self.get(handle).is_some()
  }

  pub fn remove(&mut self, handle: ElementHandle) -> Option<StoredElement> {
    let slot = self
      .slots
      .get_mut(handle.index as usize)
      .filter(|slot| slot.generation == handle.generation)?;
    let stored = slot.entry.take()?;
    slot.generation = slot.generation.wrapping_add(1);
    self.free.push(handle.index);
    self.len -= 1;
    Some(stored)
  }

  pub fn iter(&self) -> impl Iterator<Item = (ElementHandle, &StoredElement)> {
    self.slots.iter().enumerate().filter_map(|(index, slot)| {
      slot.entry.as_ref().map(|stored| {
        (
          ElementHandle {
            index: index as u32,
            generation: slot.generation,
          },
          stored,
        )
      })
    })
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// Drop every element. Outstanding handles become invalid.
  pub fn clear(&mut self) {
    self.free.clear();
    for (index, slot) in self.slots.iter_mut().enumerate() {
      if slot.entry.take().is_some() {
        slot.generation = slot.generation.wrapping_add(1);
      }
      self.free.push(index as u32);
    }
    self.len = 0;
  }
}
