//! Asynchronous tile generator.
//!
//! Dirty areas are mapped to tiles once per batch, then built on rayon's
//! pool by a user supplied [`TileBuilder`]. One job runs at a time; results
//! come back over a crossbeam channel and are polled from `tick_async_build`.
//!
//! # Flow
//!
//! ```text
//! Owning thread                         Async (rayon)
//! ┌─────────────────────┐
//! │ rebuild_dirty_areas │ areas → tiles (union, flags OR'd) → pending
//! └──────────┬──────────┘
//!            │ dispatch (≤ max_tiles_per_job)
//!            ▼
//!                                       ┌──────────────────┐
//!                                       │ par_iter tiles   │
//!                                       │  cancelled? skip │
//!                                       │  build_tile()    │
//!                                       └────────┬─────────┘
//! ┌─────────────────────┐                        │
//! │ tick_async_build    │◄───────────────────────┘
//! │  ok     → completed │
//! │  error  → retry /   │
//! │           failed    │
//! │  skipped→ pending   │
//! └─────────────────────┘
//! ```
//!
//! Cancellation is best effort: the job's flag is raised, its tiles go back
//! to pending and any result it still produces is discarded.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{self as channel, Receiver, TryRecvError};
use glam::DVec2;
use rayon::prelude::*;

use super::tiles::{TileCoord, TileGrid};
use super::NavDataGenerator;
use crate::constants::{DEFAULT_MAX_TILES_PER_JOB, DEFAULT_MAX_TILE_ATTEMPTS};
use crate::error::GeneratorError;
use crate::invokers::ActiveRegion;
use crate::types::{DirtyArea, DirtyFlags};

/// Builds the navigation data of one tile. Called on worker threads.
pub trait TileBuilder: Send + Sync + 'static {
  type Output: Send + 'static;

  fn build_tile(&self, tile: TileCoord, flags: DirtyFlags) -> Result<Self::Output, String>;
}

/// Counters over the generator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileBuildStats {
  pub jobs_started: usize,
  pub tiles_built: usize,
  /// Failed attempts that were queued again.
  pub tiles_retried: usize,
  /// Tiles given up on after the last attempt.
  pub tiles_failed: usize,
  /// Tiles skipped by a cancelled job.
  pub tiles_cancelled: usize,
  pub cancels: usize,
}

/// Per-tile result sent back by a job. `None` means skipped by cancellation.
struct TileOutcome<T> {
  tile: TileCoord,
  flags: DirtyFlags,
  result: Option<Result<T, String>>,
}

struct InFlightJob<T> {
  tiles: Vec<(TileCoord, DirtyFlags)>,
  cancel: Arc<AtomicBool>,
  receiver: Receiver<Vec<TileOutcome<T>>>,
}

/// Reference [`NavDataGenerator`] building tiles on rayon.
pub struct AsyncTileGenerator<B: TileBuilder> {
  builder: Arc<B>,
  grid: TileGrid,
  pending: BTreeMap<TileCoord, DirtyFlags>,
  in_flight: Option<InFlightJob<B::Output>>,
  completed: HashMap<TileCoord, B::Output>,
  failed: HashMap<TileCoord, String>,
  attempts: HashMap<TileCoord, u32>,
  active_regions: Vec<ActiveRegion>,
  max_tiles_per_job: usize,
  max_attempts: u32,
  max_pending_tiles: Option<usize>,
  stats: TileBuildStats,
}

impl<B: TileBuilder> AsyncTileGenerator<B> {
  pub fn new(grid: TileGrid, builder: B) -> Self {
    Self {
      builder: Arc::new(builder),
      grid,
      pending: BTreeMap::new(),
      in_flight: None,
      completed: HashMap::new(),
      failed: HashMap::new(),
      attempts: HashMap::new(),
      active_regions: Vec::new(),
      max_tiles_per_job: DEFAULT_MAX_TILES_PER_JOB,
      max_attempts: DEFAULT_MAX_TILE_ATTEMPTS,
      max_pending_tiles: None,
      stats: TileBuildStats::default(),
    }
  }

  pub fn with_max_tiles_per_job(mut self, max: usize) -> Self {
    self.max_tiles_per_job = max.max(1);
    self
  }

  pub fn with_max_attempts(mut self, max: u32) -> Self {
    self.max_attempts = max.max(1);
    self
  }

  /// Reject batches that would grow the pending set beyond `max`.
  pub fn with_max_pending_tiles(mut self, max: usize) -> Self {
    self.max_pending_tiles = Some(max);
    self
  }

  pub fn grid(&self) -> &TileGrid {
    &self.grid
  }

  pub fn builder(&self) -> &B {
    &self.builder
  }

  pub fn stats(&self) -> TileBuildStats {
    self.stats
  }

  pub fn pending_len(&self) -> usize {
    self.pending.len()
  }

  pub fn is_pending(&self, tile: TileCoord) -> bool {
    self.pending.contains_key(&tile)
  }

  pub fn tile(&self, tile: TileCoord) -> Option<&B::Output> {
    self.completed.get(&tile)
  }

  pub fn completed(&self) -> &HashMap<TileCoord, B::Output> {
    &self.completed
  }

  pub fn take_completed(&mut self) -> HashMap<TileCoord, B::Output> {
    std::mem::take(&mut self.completed)
  }

  /// Tiles given up on, with the last failure reason.
  pub fn failed(&self) -> &HashMap<TileCoord, String> {
    &self.failed
  }

  pub fn active_regions(&self) -> &[ActiveRegion] {
    &self.active_regions
  }

  /// Squared XY distance from `point` to the tile's rectangle.
  fn tile_distance_sq(&self, tile: TileCoord, point: DVec2) -> f64 {
    let bounds = self.grid.tile_bounds(tile, 0.0, 0.0);
    let min = bounds.min.truncate();
    let max = bounds.max.truncate();
    let closest = point.clamp(min, max);
    closest.distance_squared(point)
  }

  /// With no regions every tile is active.
  fn is_tile_active(&self, tile: TileCoord) -> bool {
    self.active_regions.is_empty()
      || self.active_regions.iter().any(|region| {
        self.tile_distance_sq(tile, region.center.truncate()) <= region.generation_radius * region.generation_radius
      })
  }

  fn requeue(&mut self, tile: TileCoord, flags: DirtyFlags) {
    *self.pending.entry(tile).or_insert_with(DirtyFlags::empty) |= flags;
  }

  /// Start a job for the next pending tiles if none is running.
  fn dispatch(&mut self) {
    if self.in_flight.is_some() || self.pending.is_empty() {
      return;
    }

    let mut tiles = Vec::with_capacity(self.max_tiles_per_job.min(self.pending.len()));
    while tiles.len() < self.max_tiles_per_job {
      match self.pending.pop_first() {
        Some(entry) => tiles.push(entry),
        None => break,
      }
    }

    let (sender, receiver) = channel::bounded(1);
    let cancel = Arc::new(AtomicBool::new(false));
    let job_tiles = tiles.clone();
    let job_cancel = Arc::clone(&cancel);
    let builder = Arc::clone(&self.builder);

    rayon::spawn(move || {
      let outcomes = run_tile_job(&*builder, &job_tiles, &job_cancel);
      // Receiver dropped = cancelled.
      let _ = sender.send(outcomes);
    });

    self.stats.jobs_started += 1;
    tracing::debug!(tiles = tiles.len(), pending = self.pending.len(), "tile job started");
    self.in_flight = Some(InFlightJob {
      tiles,
      cancel,
      receiver,
    });
  }

  fn apply_outcomes(&mut self, outcomes: Vec<TileOutcome<B::Output>>) {
    for outcome in outcomes {
      match outcome.result {
        None => {
          self.stats.tiles_cancelled += 1;
          self.requeue(outcome.tile, outcome.flags);
        }
        Some(Ok(output)) => {
          self.stats.tiles_built += 1;
          self.attempts.remove(&outcome.tile);
          self.failed.remove(&outcome.tile);
          self.completed.insert(outcome.tile, output);
        }
        Some(Err(reason)) => self.record_failure(outcome.tile, outcome.flags, reason),
      }
    }
  }

  fn record_failure(&mut self, tile: TileCoord, flags: DirtyFlags, reason: String) {
    let attempts = self.attempts.entry(tile).or_insert(0);
    *attempts += 1;
    let attempts = *attempts;
    let err = GeneratorError::TileBuild { tile, reason };

    if attempts < self.max_attempts {
      tracing::warn!(%err, attempts, "tile build failed, retrying");
      self.stats.tiles_retried += 1;
      self.requeue(tile, flags);
    } else {
      tracing::warn!(%err, attempts, "tile build failed, giving up");
      self.stats.tiles_failed += 1;
      self.attempts.remove(&tile);
      if let GeneratorError::TileBuild { reason, .. } = err {
        self.failed.insert(tile, reason);
      }
    }
  }

  /// A job whose worker vanished counts as one failed attempt per tile.
  fn fail_job(&mut self, job: InFlightJob<B::Output>) {
    for (tile, flags) in job.tiles {
      self.record_failure(tile, flags, "worker disconnected".to_string());
    }
  }

  /// Non-blocking check of the running job.
  fn poll(&mut self) {
    let Some(job) = self.in_flight.as_ref() else {
      return;
    };
    match job.receiver.try_recv() {
      Ok(outcomes) => {
        self.in_flight = None;
        self.apply_outcomes(outcomes);
      }
      Err(TryRecvError::Empty) => {}
      Err(TryRecvError::Disconnected) => {
        if let Some(job) = self.in_flight.take() {
          self.fail_job(job);
        }
      }
    }
  }
}

#[cfg_attr(feature = "profiling", tracing::instrument(skip_all, name = "generator::run_tile_job"))]
fn run_tile_job<B: TileBuilder>(
  builder: &B,
  tiles: &[(TileCoord, DirtyFlags)],
  cancel: &AtomicBool,
) -> Vec<TileOutcome<B::Output>> {
  tiles
    .par_iter()
    .map(|&(tile, flags)| {
      let result = if cancel.load(Ordering::Relaxed) {
        None
      } else {
        Some(builder.build_tile(tile, flags))
      };
      TileOutcome { tile, flags, result }
    })
    .collect()
}

impl<B: TileBuilder> NavDataGenerator for AsyncTileGenerator<B> {
  fn rebuild_dirty_areas(&mut self, areas: &[DirtyArea]) -> Result<(), GeneratorError> {
    let mut tiles = self.grid.tiles_for_areas(areas);
    tiles.retain(|&tile, _| self.is_tile_active(tile));

    if let Some(limit) = self.max_pending_tiles {
      let new_tiles = tiles.keys().filter(|tile| !self.pending.contains_key(tile)).count();
      if self.pending.len() + new_tiles > limit {
        return Err(GeneratorError::Rejected(format!(
          "{} pending tiles plus {new_tiles} new exceeds limit {limit}",
          self.pending.len()
        )));
      }
    }

    for (tile, flags) in tiles {
      // Fresh dirt earns fresh attempts.
      self.attempts.remove(&tile);
      self.failed.remove(&tile);
      self.requeue(tile, flags);
    }
    self.dispatch();
    Ok(())
  }

  fn cancel_build(&mut self) {
    let Some(job) = self.in_flight.take() else {
      return;
    };
    job.cancel.store(true, Ordering::Relaxed);
    self.stats.cancels += 1;
    tracing::debug!(tiles = job.tiles.len(), "tile job cancelled, tiles re-queued");
    for (tile, flags) in job.tiles {
      self.requeue(tile, flags);
    }
  }

  fn is_build_in_progress(&self, check_dirty_too: bool) -> bool {
    self.in_flight.is_some() || (check_dirty_too && !self.pending.is_empty())
  }

  fn tick_async_build(&mut self, _delta_seconds: f32) {
    self.poll();
    self.dispatch();
  }

  fn ensure_build_completion(&mut self) {
    loop {
      self.dispatch();
      let Some(job) = self.in_flight.take() else {
        break;
      };
      match job.receiver.recv() {
        Ok(outcomes) => self.apply_outcomes(outcomes),
        Err(_) => self.fail_job(job),
      }
    }
  }

  /// Keep the regions for filtering and drop completed tiles outside every
  /// removal radius.
  fn update_active_regions(&mut self, regions: &[ActiveRegion]) {
    self.active_regions = regions.to_vec();
    if regions.is_empty() {
      return;
    }
    let before = self.completed.len();
    let keep: Vec<TileCoord> = self
      .completed
      .keys()
      .copied()
      .filter(|&tile| {
        regions.iter().any(|region| {
          self.tile_distance_sq(tile, region.center.truncate()) <= region.removal_radius * region.removal_radius
        })
      })
      .collect();
    self.completed.retain(|tile, _| keep.contains(tile));
    if self.completed.len() != before {
      tracing::debug!(dropped = before - self.completed.len(), "dropped tiles outside active regions");
    }
  }
}

#[cfg(test)]
#[path = "async_tiles_test.rs"]
mod async_tiles_test;
