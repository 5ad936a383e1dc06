//! Test utilities: mock collaborators and a recording build generator.
//!
//! Shared by the unit tests and the benches.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use glam::DVec3;

use crate::error::GeneratorError;
use crate::exporter::GeometryExporter;
use crate::generator::NavDataGenerator;
use crate::ids::OwnerId;
use crate::invokers::ActiveRegion;
use crate::modifier::{AreaClassId, AreaModifier, CompositeModifier};
use crate::octree::NavBounds;
use crate::relevant::NavRelevant;
use crate::types::{DirtyArea, GatheringMode};

/// Box from two corner arrays.
pub fn nav_box(min: [f64; 3], max: [f64; 3]) -> NavBounds {
  NavBounds::new(DVec3::from_array(min), DVec3::from_array(max))
}

// =============================================================================
// Mock Collaborator
// =============================================================================

/// Configurable navigation-relevant collaborator.
///
/// Exports its bounds as a box of collision geometry unless built
/// `without_geometry`, and optionally an area modifier covering the same box.
pub struct TestActor {
  owner: OwnerId,
  bounds: Mutex<NavBounds>,
  parent: Option<OwnerId>,
  relevant: AtomicBool,
  geometry: bool,
  area: Option<AreaClassId>,
  agent_height: bool,
  gathering: GatheringMode,
  sliced: bool,
  exports: AtomicUsize,
}

impl TestActor {
  pub fn new(bounds: NavBounds) -> Self {
    Self {
      owner: OwnerId::new(),
      bounds: Mutex::new(bounds),
      parent: None,
      relevant: AtomicBool::new(true),
      geometry: true,
      area: None,
      agent_height: false,
      gathering: GatheringMode::Default,
      sliced: false,
      exports: AtomicUsize::new(0),
    }
  }

  pub fn with_parent(mut self, parent: OwnerId) -> Self {
    self.parent = Some(parent);
    self
  }

  pub fn with_area(mut self, area: AreaClassId) -> Self {
    self.area = Some(area);
    self
  }

  pub fn with_agent_height(mut self) -> Self {
    self.agent_height = true;
    self
  }

  pub fn without_geometry(mut self) -> Self {
    self.geometry = false;
    self
  }

  pub fn lazy(mut self) -> Self {
    self.gathering = GatheringMode::Lazy;
    self
  }

  pub fn sliced(mut self) -> Self {
    self.sliced = true;
    self
  }

  pub fn shared(self) -> Arc<Self> {
    Arc::new(self)
  }

  pub fn owner(&self) -> OwnerId {
    self.owner
  }

  pub fn set_bounds(&self, bounds: NavBounds) {
    *self.bounds.lock().unwrap_or_else(PoisonError::into_inner) = bounds;
  }

  pub fn set_relevant(&self, relevant: bool) {
    self.relevant.store(relevant, Ordering::Relaxed);
  }

  /// Number of full geometry exports performed.
  pub fn export_count(&self) -> usize {
    self.exports.load(Ordering::Relaxed)
  }
}

impl NavRelevant for TestActor {
  fn is_navigation_relevant(&self) -> bool {
    self.relevant.load(Ordering::Relaxed)
  }

  fn navigation_bounds(&self) -> NavBounds {
    *self.bounds.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn navigation_parent(&self) -> Option<OwnerId> {
    self.parent
  }

  fn geometry_gathering_mode(&self) -> GatheringMode {
    self.gathering
  }

  fn export_geometry(&self, exporter: &mut GeometryExporter) {
    self.exports.fetch_add(1, Ordering::Relaxed);
    if self.geometry {
      exporter.add_box(&self.navigation_bounds());
    }
  }

  fn navigation_modifiers(&self, modifiers: &mut CompositeModifier) {
    if let Some(area) = self.area {
      let mut modifier = AreaModifier::new(self.navigation_bounds(), area);
      modifier.include_agent_height = self.agent_height;
      modifiers.add_area(modifier);
    }
  }

  fn supports_gathering_geometry_slices(&self) -> bool {
    self.sliced
  }

  fn gather_geometry_slice(&self, exporter: &mut GeometryExporter, slice: &NavBounds) {
    let bounds = self.navigation_bounds();
    let clipped = NavBounds::new(bounds.min.max(slice.min), bounds.max.min(slice.max));
    if self.geometry && clipped.is_valid() {
      exporter.add_box(&clipped);
    }
  }
}

// =============================================================================
// Recording Generator
// =============================================================================

/// Everything a [`RecordingGenerator`] observed.
#[derive(Debug, Default)]
pub struct GeneratorLog {
  pub batches: Vec<Vec<DirtyArea>>,
  pub cancels: usize,
  pub ticks: usize,
  pub completions: usize,
  pub regions: Vec<Vec<ActiveRegion>>,
  /// Remaining rebuild calls to fail.
  pub fail_next: usize,
}

/// Generator that records calls. Clones share one log, so a test can keep a
/// clone after handing the generator to the driver.
#[derive(Clone, Debug, Default)]
pub struct RecordingGenerator {
  log: Arc<Mutex<GeneratorLog>>,
}

impl RecordingGenerator {
  pub fn new() -> Self {
    Self::default()
  }

  fn with_log<R>(&self, f: impl FnOnce(&mut GeneratorLog) -> R) -> R {
    let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut log)
  }

  pub fn batches(&self) -> Vec<Vec<DirtyArea>> {
    self.with_log(|log| log.batches.clone())
  }

  pub fn batch_count(&self) -> usize {
    self.with_log(|log| log.batches.len())
  }

  /// All areas received so far, flattened.
  pub fn all_areas(&self) -> Vec<DirtyArea> {
    self.with_log(|log| log.batches.iter().flatten().copied().collect())
  }

  pub fn cancels(&self) -> usize {
    self.with_log(|log| log.cancels)
  }

  pub fn ticks(&self) -> usize {
    self.with_log(|log| log.ticks)
  }

  pub fn completions(&self) -> usize {
    self.with_log(|log| log.completions)
  }

  pub fn regions(&self) -> Vec<Vec<ActiveRegion>> {
    self.with_log(|log| log.regions.clone())
  }

  /// Fail the next `count` rebuild calls.
  pub fn fail_next(&self, count: usize) {
    self.with_log(|log| log.fail_next = count);
  }

  pub fn clear(&self) {
    self.with_log(|log| {
      log.batches.clear();
      log.cancels = 0;
      log.ticks = 0;
      log.completions = 0;
      log.regions.clear();
    });
  }
}

impl NavDataGenerator for RecordingGenerator {
  fn rebuild_dirty_areas(&mut self, areas: &[DirtyArea]) -> Result<(), GeneratorError> {
    self.with_log(|log| {
      if log.fail_next > 0 {
        log.fail_next -= 1;
        return Err(GeneratorError::Rejected("recording generator told to fail".into()));
      }
      log.batches.push(areas.to_vec());
      Ok(())
    })
  }

  fn cancel_build(&mut self) {
    self.with_log(|log| log.cancels += 1);
  }

  fn is_build_in_progress(&self, _check_dirty_too: bool) -> bool {
    false
  }

  fn tick_async_build(&mut self, _delta_seconds: f32) {
    self.with_log(|log| log.ticks += 1);
  }

  fn ensure_build_completion(&mut self) {
    self.with_log(|log| log.completions += 1);
  }

  fn update_active_regions(&mut self, regions: &[ActiveRegion]) {
    self.with_log(|log| log.regions.push(regions.to_vec()));
  }
}
