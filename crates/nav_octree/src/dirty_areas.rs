//! Dirty-area accumulator: regions waiting to be rebuilt, drained into the
//! generators at a capped rate.
//!
//! ```text
//!   any thread ── DirtyAreaSink::add_area ──┐
//!                                           ▼
//!   driver ──── add_area ──────────► [ Arc<Mutex<Vec<DirtyArea>>> ]
//!                                           │
//!   driver tick ── drain_and_rebuild ───────┘  (every 1/freq s, or forced)
//!                       │
//!                       ├─ Ok  → drained areas removed
//!                       └─ Err → areas kept, retried next tick
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::constants::DEFAULT_DIRTY_AREAS_UPDATE_FREQ_HZ;
use crate::error::GeneratorError;
use crate::octree::NavBounds;
use crate::types::{DirtyArea, DirtyFlags};

/// Configuration for dirty-area accumulation and drain cadence.
#[derive(Clone, Debug, PartialEq)]
pub struct DirtyAreaConfig {
  /// Drains per second in realtime mode. Zero never drains unless forced.
  pub update_frequency_hz: f32,
  /// Areas larger than this on any axis are logged as suspicious.
  pub oversized_area_threshold: Option<f64>,
  /// Whether areas are accumulated at all.
  pub can_accumulate: bool,
}

impl DirtyAreaConfig {
  pub const DEFAULT: Self = Self {
    update_frequency_hz: DEFAULT_DIRTY_AREAS_UPDATE_FREQ_HZ,
    oversized_area_threshold: None,
    can_accumulate: true,
  };
}

impl Default for DirtyAreaConfig {
  fn default() -> Self {
    Self::DEFAULT
  }
}

/// Result of one drain attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
  /// Cadence not elapsed yet.
  Waiting,
  /// Nothing queued.
  Idle,
  Drained { areas: usize },
  /// The rebuild callback failed; the areas stay queued.
  Failed { areas: usize, consecutive_failures: u32 },
}

#[derive(Debug)]
struct AccumulatorState {
  areas: Vec<DirtyArea>,
  can_accumulate: bool,
  dropped_while_suppressed: bool,
  oversized_area_threshold: Option<f64>,
}

fn lock_state(state: &Mutex<AccumulatorState>) -> MutexGuard<'_, AccumulatorState> {
  state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Validate and append an area. Shared by the sink and the accumulator.
fn push_area(state: &Mutex<AccumulatorState>, bounds: NavBounds, flags: DirtyFlags) -> bool {
  if flags.is_empty() {
    return false;
  }
  if bounds.is_degenerate() {
    tracing::warn!(?bounds, ?flags, "rejecting dirty area with invalid bounds");
    return false;
  }

  let mut state = lock_state(state);
  if !state.can_accumulate {
    state.dropped_while_suppressed = true;
    return false;
  }
  if let Some(threshold) = state.oversized_area_threshold {
    let largest = bounds.size().max_element();
    if largest > threshold {
      tracing::warn!(?bounds, largest, threshold, "oversized dirty area");
    }
  }
  state.areas.push(DirtyArea::new(bounds, flags));
  true
}

/// Cloneable handle for adding dirty areas from any thread.
#[derive(Clone, Debug)]
pub struct DirtyAreaSink {
  state: Arc<Mutex<AccumulatorState>>,
}

impl DirtyAreaSink {
  /// Queue an area. Returns false when rejected or dropped.
  pub fn add_area(&self, bounds: NavBounds, flags: DirtyFlags) -> bool {
    push_area(&self.state, bounds, flags)
  }
}

/// Owner-side view of the dirty-area list.
#[derive(Debug)]
pub struct DirtyAreaAccumulator {
  state: Arc<Mutex<AccumulatorState>>,
  update_frequency_hz: f32,
  time_since_drain: f32,
  consecutive_failures: u32,
}

impl DirtyAreaAccumulator {
  pub fn new(config: &DirtyAreaConfig) -> Self {
    Self {
      state: Arc::new(Mutex::new(AccumulatorState {
        areas: Vec::new(),
        can_accumulate: config.can_accumulate,
        dropped_while_suppressed: false,
        oversized_area_threshold: config.oversized_area_threshold,
      })),
      update_frequency_hz: config.update_frequency_hz,
      time_since_drain: 0.0,
      consecutive_failures: 0,
    }
  }

  pub fn sink(&self) -> DirtyAreaSink {
    DirtyAreaSink {
      state: Arc::clone(&self.state),
    }
  }

  /// Queue an area.
  ///
  /// Zero flags and degenerate boxes are rejected. While accumulation is
  /// suppressed the area is dropped and a full rebuild becomes owed.
  pub fn add_area(&self, bounds: NavBounds, flags: DirtyFlags) -> bool {
    push_area(&self.state, bounds, flags)
  }

  /// Put areas back regardless of suppression (failed full rebuilds).
  pub(crate) fn requeue(&self, areas: &[DirtyArea]) {
    let mut state = lock_state(&self.state);
    state
      .areas
      .extend(areas.iter().filter(|area| area.is_valid()).copied());
  }

  pub fn can_accumulate(&self) -> bool {
    lock_state(&self.state).can_accumulate
  }

  /// Toggle accumulation. Returns true when re-enabling after areas were
  /// dropped, meaning the caller owes a full rebuild.
  pub fn set_can_accumulate(&self, can_accumulate: bool) -> bool {
    let mut state = lock_state(&self.state);
    state.can_accumulate = can_accumulate;
    if can_accumulate && state.dropped_while_suppressed {
      state.dropped_while_suppressed = false;
      return true;
    }
    false
  }

  pub fn dropped_while_suppressed(&self) -> bool {
    lock_state(&self.state).dropped_while_suppressed
  }

  pub fn has_dirty_areas_queued(&self) -> bool {
    !lock_state(&self.state).areas.is_empty()
  }

  pub fn len(&self) -> usize {
    lock_state(&self.state).areas.len()
  }

  pub fn is_empty(&self) -> bool {
    !self.has_dirty_areas_queued()
  }

  /// Queued areas, or a failure streak still waiting for a successful drain.
  pub fn is_dirty(&self) -> bool {
    self.has_dirty_areas_queued() || self.consecutive_failures > 0
  }

  pub fn consecutive_failures(&self) -> u32 {
    self.consecutive_failures
  }

  pub fn update_frequency_hz(&self) -> f32 {
    self.update_frequency_hz
  }

  pub fn set_update_frequency_hz(&mut self, hz: f32) {
    self.update_frequency_hz = hz.max(0.0);
  }

  pub fn snapshot(&self) -> Vec<DirtyArea> {
    lock_state(&self.state).areas.clone()
  }

  /// Union of every queued box.
  pub fn queued_bounds(&self) -> Option<NavBounds> {
    let state = lock_state(&self.state);
    NavBounds::union_all(state.areas.iter().map(|area| &area.bounds))
  }

  /// Remove and return everything queued.
  pub fn take_all(&self) -> Vec<DirtyArea> {
    std::mem::take(&mut lock_state(&self.state).areas)
  }

  /// Drop all queued areas and restart the cadence timer.
  pub fn reset(&mut self) {
    lock_state(&self.state).areas.clear();
    self.time_since_drain = 0.0;
    self.consecutive_failures = 0;
  }

  /// Hand queued areas to `rebuild` if the cadence allows.
  ///
  /// The batch is a snapshot; areas added while `rebuild` runs stay queued.
  /// On success the drained prefix is removed and the timer restarts. On
  /// failure nothing is removed and the next tick tries again.
  #[cfg_attr(feature = "profiling", tracing::instrument(skip_all, name = "dirty_areas::drain"))]
  pub fn drain_and_rebuild<F>(&mut self, delta_seconds: f32, force: bool, mut rebuild: F) -> DrainOutcome
  where
    F: FnMut(&[DirtyArea]) -> Result<(), GeneratorError>,
  {
    self.time_since_drain += delta_seconds.max(0.0);
    let interval_elapsed =
      self.update_frequency_hz > 0.0 && self.time_since_drain >= 1.0 / self.update_frequency_hz;
    if !force && !interval_elapsed {
      return DrainOutcome::Waiting;
    }

    let batch = {
      let state = lock_state(&self.state);
      if state.areas.is_empty() {
        return DrainOutcome::Idle;
      }
      state.areas.clone()
    };

    match rebuild(&batch) {
      Ok(()) => {
        let mut state = lock_state(&self.state);
        let drained = batch.len().min(state.areas.len());
        state.areas.drain(..drained);
        self.time_since_drain = 0.0;
        self.consecutive_failures = 0;
        tracing::debug!(areas = batch.len(), "drained dirty areas");
        DrainOutcome::Drained { areas: batch.len() }
      }
      Err(err) => {
        self.consecutive_failures += 1;
        tracing::warn!(
          %err,
          areas = batch.len(),
          failures = self.consecutive_failures,
          "navigation rebuild failed, dirty areas kept"
        );
        DrainOutcome::Failed {
          areas: batch.len(),
          consecutive_failures: self.consecutive_failures,
        }
      }
    }
  }
}

impl Default for DirtyAreaAccumulator {
  fn default() -> Self {
    Self::new(&DirtyAreaConfig::default())
  }
}

#[cfg(test)]
#[path = "dirty_areas_test.rs"]
mod dirty_areas_test;
