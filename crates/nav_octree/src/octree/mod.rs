//! Navigation octree: spatial index of navigation-relevant elements.
//!
//! The tree is an adaptive binary subdivision. Leaves split at the median
//! element centre when they overflow and subtrees collapse back into a leaf
//! when removals leave them sparse. Node bounds are fitted to their contents.
//!
//! # Module Structure
//!
//! - [`bounds`]: `NavBounds` - double precision box with validity checks
//! - [`config`]: `OctreeConfig` - capacity, depth and gathering policy
//! - [`element`]: `OctreeElement` / `NavRelevantData` - stored payload
//! - [`handle`]: `ElementHandle` - generation-checked element references
//! - [`index`]: `NavigationOctree` - insert / append / update / remove
//! - [`query`]: `BoxQuery` - lazy box query iterator

pub mod bounds;
pub mod config;
pub mod element;
pub mod handle;
pub mod index;
pub(crate) mod node;
pub mod query;

// Re-exports
pub use bounds::{NavBounds, NEARLY_ZERO_SIZE};
pub use config::OctreeConfig;
pub use element::{ElementBounds, NavRelevantData, OctreeElement};
pub use handle::ElementHandle;
pub use index::NavigationOctree;
pub use query::BoxQuery;
