//! Error types, one enum per layer.

use thiserror::Error;

use crate::generator::TileCoord;
use crate::ids::{OwnerId, WorldId};
use crate::octree::{ElementHandle, NavBounds};

/// Errors from the spatial index. The octree is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OctreeError {
  #[error("invalid element bounds {0:?}")]
  InvalidBounds(NavBounds),

  #[error("element handle {0:?} does not refer to a live element")]
  InvalidHandle(ElementHandle),

  #[error("{0} already has an element in the octree")]
  DuplicateOwner(OwnerId),
}

/// Errors from the registration driver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NavSystemError {
  #[error(transparent)]
  Octree(#[from] OctreeError),

  #[error("navigation system has not been set up")]
  NotInitialized,

  #[error("navigation system {0:?} has been torn down")]
  Destroyed(WorldId),

  #[error("navigation octree is locked for registration")]
  RegistrationLocked,
}

/// Errors reported by build generators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeneratorError {
  #[error("generator rejected dirty areas: {0}")]
  Rejected(String),

  #[error("tile ({}, {}) failed to build: {reason}", .tile.x, .tile.y)]
  TileBuild { tile: TileCoord, reason: String },
}
