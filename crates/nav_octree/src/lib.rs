//! nav_octree - Navigation octree with dirty-area tracking
//!
//! This crate keeps a spatial index of everything that contributes to
//! navigation data (collision geometry, area modifiers, off-mesh links) and
//! tells navigation data generators which regions went stale.
//!
//! # Features
//!
//! - **Navigation Octree**: Adaptive subdivision with generation-checked
//!   element handles, box queries and in-place bounds updates
//! - **Pending Queue**: Register / unregister / update calls are staged and
//!   coalesced, then applied in one flush per tick
//! - **Parent Chains**: Children contribute to their parent's element instead
//!   of their own
//! - **Dirty Areas**: Thread-safe accumulation with a capped drain cadence and
//!   build locks
//! - **Generators**: Pluggable consumers, including a rayon-backed tile builder
//!
//! # Example
//!
//! ```ignore
//! use nav_octree::{NavigationSystem, NavSystemConfig, OctreeUpdateFlags};
//!
//! let mut system = NavigationSystem::new(NavSystemConfig::EDITOR);
//! system.initial_setup()?;
//! system.conditional_populate_octree(world_collaborators)?;
//! system.register_generator(Box::new(my_generator));
//!
//! // Per frame
//! system.register_element(owner, &actor, OctreeUpdateFlags::DEFAULT)?;
//! system.tick(delta_seconds);
//! ```

pub mod constants;
pub mod error;
pub mod ids;
pub mod types;

// Re-export commonly used items
pub use error::{GeneratorError, NavSystemError, OctreeError};
pub use ids::{OwnerId, WorldId};
pub use types::{
  BuildLockFlags, DataGatheringMode, DirtyArea, DirtyFlags, ElementFilter, GatheringMode,
  OctreeUpdateFlags,
};

// Spatial index
pub mod octree;
pub use octree::{
  BoxQuery, ElementHandle, NavBounds, NavRelevantData, NavigationOctree, OctreeConfig,
  OctreeElement,
};

// Collaborator capability and exported payload
pub mod exporter;
pub mod modifier;
pub mod relevant;
pub use exporter::GeometryExporter;
pub use modifier::{AgentId, AreaClassId, AreaModifier, CompositeModifier, LinkId, NavLink};
pub use relevant::NavRelevant;

// Staged registration and dirty tracking
pub mod dirty_areas;
pub mod parent_chain;
pub mod pending;
pub use dirty_areas::{DirtyAreaAccumulator, DirtyAreaConfig, DirtyAreaSink, DrainOutcome};
pub use pending::{IntentId, PendingUpdateQueue};

// Generators and their inputs
pub mod generator;
pub mod invokers;
pub mod links;
pub use generator::{AsyncTileGenerator, GeneratorId, NavDataGenerator, TileBuilder, TileCoord, TileGrid};
pub use invokers::ActiveRegion;
pub use links::{CustomLinkQueue, CustomNavLink};

// Driver
pub mod system;
pub use system::{NavSystemConfig, NavSystemState, NavigationSystem};

// Engine-agnostic metrics
pub mod metrics;
pub use metrics::NavMetrics;

// Mock collaborators and generators for tests and benches
pub mod test_utils;
