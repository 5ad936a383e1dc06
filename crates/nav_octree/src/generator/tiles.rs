//! Tile grid on the XY plane.
//!
//! ```text
//!        y
//!        ▲   ┌─────┬─────┬─────┐
//!        │   │-1,1 │ 0,1 │ 1,1 │
//!        │   ├─────┼─────┼─────┤
//!        │   │-1,0 │ 0,0 │ 1,0 │   tile (x, y) covers
//!        │   ├─────┼─────┼─────┤   [origin + x*size, origin + (x+1)*size)
//!        │   │-1,-1│ 0,-1│ 1,-1│
//!        │   └─────┴─────┴─────┘
//!        └──────────────────────► x
//! ```
//!
//! Tiles extend infinitely along Z; dirty areas only select columns.

use std::collections::BTreeMap;

use glam::{DVec2, DVec3};

use crate::constants::DEFAULT_TILE_SIZE;
use crate::octree::NavBounds;
use crate::types::{DirtyArea, DirtyFlags};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
  pub x: i32,
  pub y: i32,
}

impl TileCoord {
  pub const fn new(x: i32, y: i32) -> Self {
    Self { x, y }
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileGrid {
  pub origin: DVec2,
  pub tile_size: f64,
}

impl TileGrid {
  /// Grid anchored at `origin`. Non-positive sizes fall back to the default.
  pub fn new(origin: DVec2, tile_size: f64) -> Self {
    let tile_size = if tile_size.is_finite() && tile_size > 0.0 {
      tile_size
    } else {
      DEFAULT_TILE_SIZE
    };
    Self { origin, tile_size }
  }

  #[inline]
  fn cell(&self, value: f64, origin: f64) -> i32 {
    ((value - origin) / self.tile_size)
      .floor()
      .clamp(i32::MIN as f64, i32::MAX as f64) as i32
  }

  pub fn tile_at(&self, point: DVec3) -> TileCoord {
    TileCoord::new(self.cell(point.x, self.origin.x), self.cell(point.y, self.origin.y))
  }

  /// World box of a tile, spanning `[z_min, z_max]` vertically.
  pub fn tile_bounds(&self, tile: TileCoord, z_min: f64, z_max: f64) -> NavBounds {
    let min = self.origin + DVec2::new(tile.x as f64, tile.y as f64) * self.tile_size;
    let max = min + DVec2::splat(self.tile_size);
    NavBounds::new(min.extend(z_min), max.extend(z_max))
  }

  /// Every tile whose column touches `bounds`, in row-major order.
  pub fn tiles_overlapping(&self, bounds: &NavBounds) -> Vec<TileCoord> {
    if !bounds.is_valid() {
      return Vec::new();
    }
    let lo = self.tile_at(bounds.min);
    let hi = self.tile_at(bounds.max);
    let mut tiles = Vec::with_capacity(((hi.x - lo.x + 1) * (hi.y - lo.y + 1)).max(0) as usize);
    for y in lo.y..=hi.y {
      for x in lo.x..=hi.x {
        tiles.push(TileCoord::new(x, y));
      }
    }
    tiles
  }

  /// Union of tiles touched by a batch, each with the OR of the flags of
  /// the areas touching it.
  pub fn tiles_for_areas(&self, areas: &[DirtyArea]) -> BTreeMap<TileCoord, DirtyFlags> {
    let mut tiles = BTreeMap::new();
    for area in areas.iter().filter(|area| area.is_valid()) {
      for tile in self.tiles_overlapping(&area.bounds) {
        *tiles.entry(tile).or_insert_with(DirtyFlags::empty) |= area.flags;
      }
    }
    tiles
  }
}

impl Default for TileGrid {
  fn default() -> Self {
    Self::new(DVec2::ZERO, DEFAULT_TILE_SIZE)
  }
}
