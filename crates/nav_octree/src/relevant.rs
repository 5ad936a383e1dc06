//! The capability a collaborator implements to take part in navigation.

use crate::exporter::GeometryExporter;
use crate::ids::OwnerId;
use crate::modifier::CompositeModifier;
use crate::octree::NavBounds;
use crate::types::GatheringMode;

/// Something that contributes collision geometry and/or modifiers to the
/// navigation data.
///
/// The driver holds collaborators weakly and only calls into them while
/// flushing or gathering, so implementations must be cheap to query and must
/// not call back into the driver.
///
/// Static geometry providers override [`export_geometry`](Self::export_geometry),
/// dynamic modifier providers override
/// [`navigation_modifiers`](Self::navigation_modifiers), and some do both.
pub trait NavRelevant: Send + Sync {
  /// Whether the collaborator currently contributes anything.
  fn is_navigation_relevant(&self) -> bool;

  /// World-space bounds of the contribution.
  fn navigation_bounds(&self) -> NavBounds;

  /// Owner whose element this collaborator's data is merged into.
  fn navigation_parent(&self) -> Option<OwnerId> {
    None
  }

  fn geometry_gathering_mode(&self) -> GatheringMode {
    GatheringMode::Default
  }

  fn export_geometry(&self, _exporter: &mut GeometryExporter) {}

  fn navigation_modifiers(&self, _modifiers: &mut CompositeModifier) {}

  fn supports_gathering_geometry_slices(&self) -> bool {
    false
  }

  /// Export only the geometry overlapping `slice`.
  fn gather_geometry_slice(&self, _exporter: &mut GeometryExporter, _slice: &NavBounds) {}
}
