//! Build generators: consumers of drained dirty areas.
//!
//! The driver owns a list of boxed [`NavDataGenerator`]s. Each drain hands
//! every generator the same batch; a generator that returns an error leaves
//! the areas queued for the next tick.
//!
//! # Module Structure
//!
//! - [`tiles`]: `TileGrid` / `TileCoord` - dirty areas to affected tiles
//! - [`async_tiles`]: `AsyncTileGenerator` - tile builds on rayon

pub mod async_tiles;
pub mod tiles;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::GeneratorError;
use crate::invokers::ActiveRegion;
use crate::types::DirtyArea;

pub use async_tiles::{AsyncTileGenerator, TileBuildStats, TileBuilder};
pub use tiles::{TileCoord, TileGrid};

/// Handle returned by `register_generator`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeneratorId(u64);

impl GeneratorId {
  pub(crate) fn next() -> Self {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    Self(COUNTER.fetch_add(1, Ordering::Relaxed))
  }

  pub fn raw(&self) -> u64 {
    self.0
  }
}

/// Something that turns dirty areas into navigation data.
pub trait NavDataGenerator: Send {
  /// Accept one drained batch. An error keeps the batch queued.
  fn rebuild_dirty_areas(&mut self, areas: &[DirtyArea]) -> Result<(), GeneratorError>;

  /// Abort in-flight work, best effort.
  fn cancel_build(&mut self);

  /// `check_dirty_too` also counts work accepted but not started.
  fn is_build_in_progress(&self, check_dirty_too: bool) -> bool;

  /// Poll asynchronous work. Called once per driver tick.
  fn tick_async_build(&mut self, delta_seconds: f32);

  /// Block until everything accepted so far is built.
  fn ensure_build_completion(&mut self) {}

  fn update_active_regions(&mut self, _regions: &[ActiveRegion]) {}
}
