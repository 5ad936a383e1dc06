//! Custom navigation links registered outside the octree.
//!
//! Links can be staged from any thread through a [`CustomLinkQueue`]; the
//! driver applies staged requests at the start of its tick and dirties the
//! affected bounds so generators pick them up.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::dirty_areas::DirtyAreaAccumulator;
use crate::ids::OwnerId;
use crate::modifier::{LinkId, NavLink};
use crate::octree::NavBounds;
use crate::types::DirtyFlags;

/// A link and the owner that registered it.
#[derive(Clone, Debug, PartialEq)]
pub struct CustomNavLink {
  pub id: LinkId,
  pub owner: OwnerId,
  pub link: NavLink,
  pub bounds: NavBounds,
}

impl CustomNavLink {
  pub fn new(owner: OwnerId, link: NavLink) -> Self {
    Self {
      id: link.id,
      owner,
      bounds: link.bounds(),
      link,
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LinkRequest {
  Register(CustomNavLink),
  Unregister(LinkId),
}

/// Cloneable staging queue, usable from any thread.
#[derive(Clone, Debug, Default)]
pub struct CustomLinkQueue {
  requests: Arc<Mutex<Vec<LinkRequest>>>,
}

impl CustomLinkQueue {
  fn lock(&self) -> MutexGuard<'_, Vec<LinkRequest>> {
    self.requests.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn register(&self, owner: OwnerId, link: NavLink) {
    self.lock().push(LinkRequest::Register(CustomNavLink::new(owner, link)));
  }

  pub fn unregister(&self, id: LinkId) {
    self.lock().push(LinkRequest::Unregister(id));
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  fn take(&self) -> Vec<LinkRequest> {
    std::mem::take(&mut *self.lock())
  }
}

/// Registered links keyed by id, fed from a [`CustomLinkQueue`].
#[derive(Debug, Default)]
pub struct CustomLinkRegistry {
  queue: CustomLinkQueue,
  links: BTreeMap<LinkId, CustomNavLink>,
}

impl CustomLinkRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Handle for staging requests from other threads.
  pub fn queue(&self) -> CustomLinkQueue {
    self.queue.clone()
  }

  pub fn len(&self) -> usize {
    self.links.len()
  }

  pub fn is_empty(&self) -> bool {
    self.links.is_empty()
  }

  pub fn get(&self, id: LinkId) -> Option<&CustomNavLink> {
    self.links.get(&id)
  }

  pub fn iter(&self) -> impl Iterator<Item = &CustomNavLink> {
    self.links.values()
  }

  /// Links whose bounds overlap `bounds`.
  pub fn links_in<'a>(&'a self, bounds: &'a NavBounds) -> impl Iterator<Item = &'a CustomNavLink> + 'a {
    self.links.values().filter(move |link| link.bounds.overlaps(bounds))
  }

  /// Apply staged requests in order. Every registered, replaced or removed
  /// link dirties its bounds. Returns the number of requests applied.
  pub fn process_pending(&mut self, dirty_areas: &DirtyAreaAccumulator) -> usize {
    let requests = self.queue.take();
    let count = requests.len();
    for request in requests {
      match request {
        LinkRequest::Register(link) => {
          dirty_areas.add_area(link.bounds, DirtyFlags::DYNAMIC_MODIFIER);
          if let Some(old) = self.links.insert(link.id, link) {
            if !old.bounds.is_degenerate() {
              dirty_areas.add_area(old.bounds, DirtyFlags::DYNAMIC_MODIFIER);
            }
          }
        }
        LinkRequest::Unregister(id) => match self.links.remove(&id) {
          Some(old) => {
            dirty_areas.add_area(old.bounds, DirtyFlags::DYNAMIC_MODIFIER);
          }
          None => tracing::debug!(?id, "unregistering unknown custom link"),
        },
      }
    }
    if count > 0 {
      tracing::trace!(count, links = self.links.len(), "custom link requests applied");
    }
    count
  }

  /// Remove every link owned by `owner`, dirtying their bounds.
  pub fn remove_owner(&mut self, owner: OwnerId, dirty_areas: &DirtyAreaAccumulator) -> usize {
    let before = self.links.len();
    self.links.retain(|_, link| {
      if link.owner != owner {
        return true;
      }
      dirty_areas.add_area(link.bounds, DirtyFlags::DYNAMIC_MODIFIER);
      false
    });
    before - self.links.len()
  }

  pub fn clear(&mut self) {
    self.queue.take();
    self.links.clear();
  }
}
