//! Navigation invokers: owners around which navigation data must exist.
//!
//! Each invoker contributes an [`ActiveRegion`]. The registry recomputes the
//! region list at a capped interval and only reports it when something
//! changed, so generators are not flooded with identical updates.

use std::collections::BTreeMap;

use glam::DVec3;

use crate::constants::DEFAULT_INVOKERS_UPDATE_INTERVAL;
use crate::ids::OwnerId;
use crate::octree::NavBounds;

/// Sphere-shaped region where generators should build (and outside
/// `removal_radius`, may drop) navigation data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveRegion {
  pub center: DVec3,
  pub generation_radius: f64,
  pub removal_radius: f64,
}

impl ActiveRegion {
  /// Box enclosing the generation sphere.
  pub fn generation_bounds(&self) -> NavBounds {
    NavBounds::from_center_half_extents(self.center, DVec3::splat(self.generation_radius))
  }

  pub fn overlaps(&self, bounds: &NavBounds) -> bool {
    self.generation_bounds().overlaps(bounds)
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NavigationInvoker {
  pub location: DVec3,
  pub generation_radius: f64,
  /// Never smaller than `generation_radius`.
  pub removal_radius: f64,
}

impl NavigationInvoker {
  fn region(&self) -> ActiveRegion {
    ActiveRegion {
      center: self.location,
      generation_radius: self.generation_radius,
      removal_radius: self.removal_radius,
    }
  }
}

/// Registered invokers, ordered by owner so region lists are stable.
#[derive(Debug)]
pub struct InvokerRegistry {
  invokers: BTreeMap<OwnerId, NavigationInvoker>,
  update_interval: f32,
  timer: f32,
  dirty: bool,
}

impl InvokerRegistry {
  pub fn new(update_interval: f32) -> Self {
    Self {
      invokers: BTreeMap::new(),
      update_interval: update_interval.max(0.0),
      timer: 0.0,
      dirty: false,
    }
  }

  pub fn len(&self) -> usize {
    self.invokers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.invokers.is_empty()
  }

  pub fn get(&self, owner: OwnerId) -> Option<&NavigationInvoker> {
    self.invokers.get(&owner)
  }

  /// Register or replace an invoker. Returns false for negative or
  /// non-finite radii.
  pub fn register(&mut self, owner: OwnerId, location: DVec3, generation_radius: f64, removal_radius: f64) -> bool {
    if !location.is_finite() || !generation_radius.is_finite() || generation_radius < 0.0 {
      tracing::warn!(%owner, generation_radius, "rejecting invoker with invalid location or radius");
      return false;
    }
    let removal_radius = if removal_radius.is_finite() {
      removal_radius.max(generation_radius)
    } else {
      generation_radius
    };
    self.invokers.insert(
      owner,
      NavigationInvoker {
        location,
        generation_radius,
        removal_radius,
      },
    );
    self.dirty = true;
    true
  }

  pub fn unregister(&mut self, owner: OwnerId) -> bool {
    let removed = self.invokers.remove(&owner).is_some();
    self.dirty |= removed;
    removed
  }

  pub fn update_location(&mut self, owner: OwnerId, location: DVec3) -> bool {
    if !location.is_finite() {
      return false;
    }
    match self.invokers.get_mut(&owner) {
      Some(invoker) if invoker.location != location => {
        invoker.location = location;
        self.dirty = true;
        true
      }
      Some(_) => true,
      None => false,
    }
  }

  /// Current regions, in owner order.
  pub fn regions(&self) -> Vec<ActiveRegion> {
    self.invokers.values().map(NavigationInvoker::region).collect()
  }

  /// Advance the cadence timer. Returns the region list when the interval
  /// elapsed and invokers changed since the last report.
  pub fn tick(&mut self, delta_seconds: f32) -> Option<Vec<ActiveRegion>> {
    self.timer += delta_seconds.max(0.0);
    if self.timer < self.update_interval || !self.dirty {
      return None;
    }
    self.timer = 0.0;
    self.dirty = false;
    let regions = self.regions();
    tracing::trace!(count = regions.len(), "active regions updated");
    Some(regions)
  }

  pub fn clear(&mut self) {
    self.dirty |= !self.invokers.is_empty();
    self.invokers.clear();
  }
}

impl Default for InvokerRegistry {
  fn default() -> Self {
    Self::new(DEFAULT_INVOKERS_UPDATE_INTERVAL)
  }
}
