//! Navigation system driver: registration, flush, locks and the tick loop.
//!
//! # Lifecycle
//!
//! ```text
//!   Uninitialized ── initial_setup ──► AwaitingOctreePopulation
//!                                            │ conditional_populate_octree
//!                                            ▼
//!                                        Populated ◄──┐ tick / register / ...
//!                                            │ ───────┘
//!                                            │ teardown
//!                                            ▼
//!                                        Destroyed (octree dropped, queues cleared)
//! ```
//!
//! # Tick
//!
//! ```text
//!   (0) custom links staged from other threads → registry, dirty areas
//!   (1) pending intents → octree (flush), dirty areas
//!   (2) invokers → active regions → generators        (capped cadence)
//!   (3) dirty areas → generators, one batch           (unless build locked)
//!   (4) generators advance async work
//! ```
//!
//! Registration never touches the octree directly. Intents are staged and
//! applied by the flush, which also resolves parent/child aggregation: a
//! child's data lives inside its parent's element, never in its own.

mod config;
mod lock;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use glam::DVec3;
use smallvec::SmallVec;

use crate::dirty_areas::{DirtyAreaAccumulator, DirtyAreaConfig, DirtyAreaSink, DrainOutcome};
use crate::error::NavSystemError;
use crate::exporter::GeometryExporter;
use crate::generator::{GeneratorId, NavDataGenerator};
use crate::ids::{OwnerId, WorldId};
use crate::invokers::{ActiveRegion, InvokerRegistry};
use crate::links::{CustomLinkQueue, CustomLinkRegistry};
use crate::metrics::NavMetrics;
use crate::octree::index::check_bounds;
use crate::octree::{BoxQuery, ElementHandle, NavBounds, NavigationOctree, OctreeElement};
use crate::parent_chain::ParentChildMap;
use crate::pending::{FlushBatch, IntentId, PendingIntent, PendingUpdateQueue, PreviousState};
use crate::relevant::NavRelevant;
use crate::types::{BuildLockFlags, DirtyArea, DirtyFlags, ElementFilter, OctreeUpdateFlags};

pub use config::NavSystemConfig;
pub use lock::BuildLock;

type Result<T> = std::result::Result<T, NavSystemError>;

/// World readiness of a [`NavigationSystem`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NavSystemState {
  #[default]
  Uninitialized,
  AwaitingOctreePopulation,
  Populated,
  Destroyed,
}

/// Flags used for the unregister/register pairs of a parent-chain rebuild.
const CHAIN_UPDATE: OctreeUpdateFlags = OctreeUpdateFlags::PARENT_CHAIN.union(OctreeUpdateFlags::REFRESH);

/// Per-world navigation driver.
///
/// Owns the octree, the pending queue, the dirty-area accumulator and the
/// registered generators. All methods run on the owning thread; only
/// [`DirtyAreaSink`] and [`CustomLinkQueue`] handles cross threads.
pub struct NavigationSystem {
  world_id: WorldId,
  config: NavSystemConfig,
  state: NavSystemState,
  octree: Option<NavigationOctree>,
  pending: PendingUpdateQueue,
  parent_chain: ParentChildMap,
  /// Every registered collaborator, held weakly.
  collaborators: HashMap<OwnerId, Weak<dyn NavRelevant>>,
  /// Child → parent for children whose data is inside the parent's element.
  attached: HashMap<OwnerId, OwnerId>,
  dirty_areas: DirtyAreaAccumulator,
  build_lock: BuildLock,
  generators: Vec<(GeneratorId, Box<dyn NavDataGenerator>)>,
  invokers: InvokerRegistry,
  custom_links: CustomLinkRegistry,
  auto_update_enabled: bool,
  metrics: NavMetrics,
}

impl NavigationSystem {
  pub fn new(config: NavSystemConfig) -> Self {
    let dirty_config = DirtyAreaConfig {
      can_accumulate: config.dirty_areas.can_accumulate && config.auto_update_enabled,
      ..config.dirty_areas.clone()
    };
    Self {
      world_id: WorldId::new(),
      state: NavSystemState::Uninitialized,
      octree: None,
      pending: PendingUpdateQueue::new(),
      parent_chain: ParentChildMap::new(),
      collaborators: HashMap::new(),
      attached: HashMap::new(),
      dirty_areas: DirtyAreaAccumulator::new(&dirty_config),
      build_lock: BuildLock::new(),
      generators: Vec::new(),
      invokers: InvokerRegistry::new(config.invokers_update_interval),
      custom_links: CustomLinkRegistry::new(),
      auto_update_enabled: config.auto_update_enabled,
      metrics: NavMetrics::new(),
      config,
    }
  }

  // ===========================================================================
  // Lifecycle
  // ===========================================================================

  pub fn world_id(&self) -> WorldId {
    self.world_id
  }

  pub fn config(&self) -> &NavSystemConfig {
    &self.config
  }

  pub fn state(&self) -> NavSystemState {
    self.state
  }

  /// False before setup and after teardown. Collaborators holding on to a
  /// driver must check this before calling in.
  pub fn is_valid(&self) -> bool {
    self.octree.is_some()
  }

  /// Create the octree and take the initial build lock if configured.
  pub fn initial_setup(&mut self) -> Result<()> {
    match self.state {
      NavSystemState::Destroyed => return Err(NavSystemError::Destroyed(self.world_id)),
      NavSystemState::Uninitialized => {}
      _ => return Ok(()),
    }
    self.octree = Some(NavigationOctree::new(self.config.octree.clone()));
    if self.config.initial_build_lock {
      self.build_lock.add(BuildLockFlags::INITIAL_LOCK);
    }
    self.state = NavSystemState::AwaitingOctreePopulation;
    tracing::debug!(world = self.world_id.raw(), "navigation system set up");
    Ok(())
  }

  /// Register every currently relevant collaborator and flush them into the
  /// octree. Returns the number of staged registrations.
  pub fn conditional_populate_octree<I>(&mut self, collaborators: I) -> Result<usize>
  where
    I: IntoIterator<Item = (OwnerId, Arc<dyn NavRelevant>)>,
  {
    self.ensure_valid()?;
    let mut staged = 0;
    for (owner, source) in collaborators {
      match self.register_element(owner, &source, OctreeUpdateFlags::DEFAULT) {
        Ok(Some(_)) => staged += 1,
        Ok(None) => {}
        Err(err) => tracing::warn!(%owner, %err, "skipping collaborator during octree population"),
      }
    }
    self.flush_pending_updates()?;
    self.state = NavSystemState::Populated;
    tracing::debug!(staged, elements = self.octree.as_ref().map_or(0, NavigationOctree::len), "octree populated");
    Ok(staged)
  }

  /// Cancel builds, drop the octree and clear every queue. Terminal.
  pub fn teardown(&mut self) {
    if self.state == NavSystemState::Destroyed {
      return;
    }
    for (_, generator) in &mut self.generators {
      generator.cancel_build();
    }
    self.generators.clear();
    self.octree = None;
    self.pending.clear();
    self.parent_chain.clear();
    self.collaborators.clear();
    self.attached.clear();
    self.dirty_areas.reset();
    self.invokers.clear();
    self.custom_links.clear();
    self.metrics.reset();
    self.state = NavSystemState::Destroyed;
    tracing::debug!(world = self.world_id.raw(), "navigation system torn down");
  }

  fn ensure_valid(&self) -> Result<()> {
    match self.state {
      NavSystemState::Uninitialized => Err(NavSystemError::NotInitialized),
      NavSystemState::Destroyed => Err(NavSystemError::Destroyed(self.world_id)),
      _ if self.octree.is_none() => Err(NavSystemError::NotInitialized),
      _ => Ok(()),
    }
  }

  fn ensure_octree(&self) -> Result<&NavigationOctree> {
    self.ensure_valid()?;
    self.octree.as_ref().ok_or(NavSystemError::NotInitialized)
  }

  fn ensure_octree_mut(&mut self) -> Result<&mut NavigationOctree> {
    self.ensure_valid()?;
    self.octree.as_mut().ok_or(NavSystemError::NotInitialized)
  }

  fn ensure_unlocked(&self) -> Result<()> {
    self.ensure_valid()?;
    if self.pending.is_locked() {
      return Err(NavSystemError::RegistrationLocked);
    }
    Ok(())
  }

  fn collaborator(&self, owner: OwnerId) -> Option<Arc<dyn NavRelevant>> {
    self.collaborators.get(&owner).and_then(Weak::upgrade)
  }

  // ===========================================================================
  // Registration
  // ===========================================================================

  /// Stage `source` for insertion on the next flush.
  ///
  /// Irrelevant collaborators are ignored (`Ok(None)`). A collaborator with
  /// a navigation parent is recorded under that parent and merged into the
  /// parent's element when flushed. A top-level owner already in the octree
  /// is not staged again; use [`update_element`](Self::update_element).
  pub fn register_element(
    &mut self,
    owner: OwnerId,
    source: &Arc<dyn NavRelevant>,
    flags: OctreeUpdateFlags,
  ) -> Result<Option<IntentId>> {
    self.ensure_valid()?;
    if !source.is_navigation_relevant() {
      return Ok(None);
    }
    self.ensure_unlocked()?;

    match source.navigation_parent() {
      Some(parent) => {
        self.parent_chain.add_unique(parent, owner);
      }
      None => {
        if self.ensure_octree()?.handle_for_owner(owner).is_some() {
          tracing::debug!(%owner, "already in the octree, registration ignored");
          return Ok(None);
        }
      }
    }

    self.collaborators.insert(owner, Arc::downgrade(source));
    Ok(
      self
        .pending
        .stage_register(owner, source, flags.dirty_flags_or(DirtyFlags::empty())),
    )
  }

  /// Remove `owner` from the octree and from the pending queue.
  ///
  /// A removed element dirties its bounds with its own flags, or with
  /// [`DirtyFlags::ALL`] when `flags` carries `OctreeUpdateFlags::GEOMETRY`.
  /// A child is detached from its parent, which is rebuilt without it.
  /// Returns whether anything was found.
  pub fn unregister_element(
    &mut self,
    owner: OwnerId,
    source: &dyn NavRelevant,
    flags: OctreeUpdateFlags,
  ) -> Result<bool> {
    self.ensure_unlocked()?;
    let Some(octree) = self.octree.as_mut() else {
      return Err(NavSystemError::NotInitialized);
    };

    let mut found = false;
    let in_octree = match octree.handle_for_owner(owner) {
      Some(handle) => {
        let element = octree.remove(handle)?;
        found = true;
        self.attached.retain(|_, parent| *parent != owner);
        if !flags.contains(OctreeUpdateFlags::REFRESH) {
          let area_flags = flags.dirty_flags_or(element.data.dirty_flags());
          self.dirty_areas.add_area(element.bounds.aabb, area_flags);
        }
        true
      }
      None => false,
    };

    if !in_octree && !flags.contains(OctreeUpdateFlags::PARENT_CHAIN) {
      if let Some(parent) = source.navigation_parent() {
        if self.parent_chain.remove_single(parent, owner) {
          found = true;
          // Only a child already merged into the parent's element needs the
          // parent rebuilt.
          if self.attached.remove(&owner).is_some() {
            self.update_parent_chain(parent, false)?;
          }
        }
      }

      // A parent leaving before its first flush takes its queued children's
      // intents with it.
      if self.pending.contains(owner) {
        let children: SmallVec<[OwnerId; 4]> = self.parent_chain.children(owner).iter().copied().collect();
        for child in children {
          self.pending.stage_unregister(child);
        }
      }
    }

    if !flags.contains(OctreeUpdateFlags::REFRESH) {
      found |= self.pending.stage_unregister(owner);
    }
    if !flags.intersects(OctreeUpdateFlags::REFRESH | OctreeUpdateFlags::PARENT_CHAIN) {
      self.collaborators.remove(&owner);
      self.custom_links.remove_owner(owner, &self.dirty_areas);
    }
    Ok(found)
  }

  /// Unregister + register with `REFRESH`, carrying the element's previous
  /// bounds into the new intent so the flush dirties both.
  fn refresh_owner(&mut self, owner: OwnerId, source: &Arc<dyn NavRelevant>, flags: OctreeUpdateFlags) -> Result<()> {
    let prev = self.ensure_octree()?.element_for_owner(owner).map(|element| PreviousState {
      bounds: element.bounds.aabb,
      flags: flags.dirty_flags_or(element.data.dirty_flags()),
    });

    self.unregister_element(owner, source.as_ref(), flags | OctreeUpdateFlags::REFRESH)?;
    self.register_element(owner, source, flags)?;

    if let Some(prev) = prev {
      if !self.pending.record_previous_state(owner, prev) {
        // Not re-staged (no longer relevant): dirty the old bounds now.
        self.dirty_areas.add_area(prev.bounds, prev.flags);
      }
    }
    Ok(())
  }

  /// Re-gather `owner` (and its children) on the next flush.
  pub fn update_element(
    &mut self,
    owner: OwnerId,
    source: &Arc<dyn NavRelevant>,
    flags: OctreeUpdateFlags,
  ) -> Result<()> {
    self.ensure_unlocked()?;
    self.refresh_owner(owner, source, flags)?;
    self.update_parent_chain(owner, true)
  }

  /// Re-register `owner`'s children, and `owner` itself unless
  /// `skip_owner_update`.
  pub fn update_parent_chain(&mut self, owner: OwnerId, skip_owner_update: bool) -> Result<()> {
    self.ensure_unlocked()?;
    let children: Vec<(OwnerId, Arc<dyn NavRelevant>)> = self
      .parent_chain
      .children(owner)
      .iter()
      .filter_map(|&child| self.collaborator(child).map(|source| (child, source)))
      .collect();

    for (child, source) in &children {
      self.unregister_element(*child, source.as_ref(), CHAIN_UPDATE)?;
    }

    if !skip_owner_update {
      if let Some(source) = self.collaborator(owner) {
        self.refresh_owner(owner, &source, CHAIN_UPDATE)?;
      }
    }

    let owner_registered =
      self.pending.contains(owner) || self.ensure_octree()?.handle_for_owner(owner).is_some();
    if owner_registered {
      for (child, source) in &children {
        self.register_element(*child, source, CHAIN_UPDATE)?;
      }
    }
    Ok(())
  }

  /// Move an element's bounds in place and dirty the old and new boxes plus
  /// `dirty_area`. Returns false when the owner has no element yet.
  pub fn update_element_bounds(&mut self, owner: OwnerId, new_bounds: NavBounds, dirty_area: NavBounds) -> Result<bool> {
    let octree = self.ensure_octree_mut()?;
    let Some(handle) = octree.handle_for_owner(owner) else {
      return Ok(false);
    };
    let old_bounds = octree.get(handle)?.bounds.aabb;
    octree.update_node(handle, new_bounds)?;

    let mut area = NavBounds::union_all([&old_bounds, &new_bounds].into_iter().filter(|b| b.is_valid()))
      .unwrap_or(new_bounds);
    if dirty_area.is_valid() {
      area = area.union(&dirty_area);
    }
    self
      .dirty_areas
      .add_area(area, DirtyFlags::ALL | DirtyFlags::NAVIGATION_BOUNDS);
    Ok(true)
  }

  /// While locked, every register/unregister call fails.
  pub fn set_octree_lock(&mut self, locked: bool) {
    self.pending.set_locked(locked);
  }

  pub fn is_octree_locked(&self) -> bool {
    self.pending.is_locked()
  }

  pub fn has_pending_updates(&self) -> bool {
    !self.pending.is_empty()
  }

  // ===========================================================================
  // Flush
  // ===========================================================================

  /// Apply every staged intent to the octree, in staging order.
  #[cfg_attr(feature = "profiling", tracing::instrument(skip_all, name = "system::flush"))]
  pub fn flush_pending_updates(&mut self) -> Result<()> {
    self.ensure_valid()?;
    let Some(octree) = self.octree.as_mut() else {
      return Err(NavSystemError::NotInitialized);
    };
    if self.pending.is_empty() {
      return Ok(());
    }

    let start = web_time::Instant::now();
    let mut batch = self.pending.begin_flush();
    let intents = batch.len();
    let mut flusher = Flusher {
      octree,
      batch: &mut batch,
      parent_chain: &self.parent_chain,
      collaborators: &self.collaborators,
      attached: &mut self.attached,
      attached_now: HashSet::new(),
      dirty_areas: &self.dirty_areas,
    };
    for slot in 0..intents {
      flusher.apply(slot, true);
    }

    let elapsed_us = start.elapsed().as_micros() as u64;
    self.metrics.record_flush(elapsed_us, intents);
    self
      .metrics
      .record_octree(octree_len(&self.octree), octree_nodes(&self.octree), octree_memory(&self.octree));
    tracing::debug!(intents, elapsed_us, "flushed pending updates");
    Ok(())
  }

  // ===========================================================================
  // Dirty areas
  // ===========================================================================

  pub fn add_dirty_area(&self, bounds: NavBounds, flags: DirtyFlags) -> bool {
    self.dirty_areas.add_area(bounds, flags)
  }

  /// Handle for adding dirty areas from other threads.
  pub fn dirty_area_sink(&self) -> DirtyAreaSink {
    self.dirty_areas.sink()
  }

  pub fn has_dirty_areas_queued(&self) -> bool {
    self.dirty_areas.has_dirty_areas_queued()
  }

  pub fn dirty_areas(&self) -> &DirtyAreaAccumulator {
    &self.dirty_areas
  }

  pub fn is_auto_update_enabled(&self) -> bool {
    self.auto_update_enabled
  }

  /// Toggle dirty-area accumulation. Re-enabling after areas were dropped
  /// rebuilds everything.
  pub fn set_auto_update_enabled(&mut self, enabled: bool) {
    self.auto_update_enabled = enabled;
    if self.dirty_areas.set_can_accumulate(enabled) {
      tracing::debug!("auto update re-enabled after dropped areas, rebuilding all");
      self.rebuild_all();
    }
  }

  // ===========================================================================
  // Queries
  // ===========================================================================

  pub fn octree(&self) -> Option<&NavigationOctree> {
    self.octree.as_ref()
  }

  pub fn query_box(&self, bounds: NavBounds, filter: ElementFilter) -> Result<BoxQuery<'_>> {
    Ok(self.ensure_octree()?.query_box(bounds, filter))
  }

  pub fn element_handle(&self, owner: OwnerId) -> Option<ElementHandle> {
    self.octree.as_ref()?.handle_for_owner(owner)
  }

  pub fn element(&self, owner: OwnerId) -> Option<&OctreeElement> {
    self.octree.as_ref()?.element_for_owner(owner)
  }

  /// Parent whose element holds `child`'s data, if attached.
  pub fn attached_parent(&self, child: OwnerId) -> Option<OwnerId> {
    self.attached.get(&child).copied()
  }

  pub fn children_of(&self, parent: OwnerId) -> &[OwnerId] {
    self.parent_chain.children(parent)
  }

  /// Run deferred gathering for `owner`'s element.
  pub fn demand_lazy_data_gathering(&mut self, owner: OwnerId) -> Result<bool> {
    let Some(source) = self.collaborator(owner) else {
      return Ok(false);
    };
    let octree = self.ensure_octree_mut()?;
    let Some(handle) = octree.handle_for_owner(owner) else {
      return Ok(false);
    };
    Ok(octree.demand_lazy_data_gathering(handle, source.as_ref())?)
  }

  /// Export `owner`'s geometry inside `slice`.
  pub fn gather_geometry_slice(&self, owner: OwnerId, slice: &NavBounds) -> Result<Option<GeometryExporter>> {
    let octree = self.ensure_octree()?;
    let (Some(handle), Some(source)) = (octree.handle_for_owner(owner), self.collaborator(owner)) else {
      return Ok(None);
    };
    Ok(Some(octree.gather_geometry_slice(handle, source.as_ref(), slice)?))
  }

  pub fn store_voxel_cache(&mut self, owner: OwnerId, voxels: Vec<u8>) -> Result<bool> {
    let octree = self.ensure_octree_mut()?;
    let Some(handle) = octree.handle_for_owner(owner) else {
      return Ok(false);
    };
    octree.store_voxel_cache(handle, voxels)?;
    Ok(true)
  }

  pub fn metrics(&self) -> &NavMetrics {
    &self.metrics
  }

  // ===========================================================================
  // Build locks and rebuilds
  // ===========================================================================

  pub fn add_build_lock(&mut self, flags: BuildLockFlags) {
    self.build_lock.add(flags);
  }

  /// Clear lock bits. Releasing the last one rebuilds everything unless
  /// `skip_rebuild` or the config says otherwise.
  pub fn remove_build_lock(&mut self, flags: BuildLockFlags, skip_rebuild: bool) {
    if self.build_lock.remove(flags) && !skip_rebuild && !self.config.skip_rebuild_on_unlock {
      self.rebuild_all();
    }
  }

  pub fn is_build_locked(&self) -> bool {
    self.build_lock.is_locked()
  }

  pub fn build_lock_flags(&self) -> BuildLockFlags {
    self.build_lock.flags()
  }

  /// Cancel in-flight builds and hand every generator one batch covering
  /// the octree and everything queued.
  ///
  /// While the build is locked the covering area is queued instead.
  pub fn rebuild_all(&mut self) {
    let Some(octree) = self.octree.as_ref() else {
      return;
    };
    let root_bounds = octree.root_bounds();

    if self.build_lock.is_locked() {
      if let Some(bounds) = root_bounds {
        self.dirty_areas.add_area(bounds, DirtyFlags::ALL);
      }
      return;
    }

    for (_, generator) in &mut self.generators {
      generator.cancel_build();
    }

    let queued = self.dirty_areas.take_all();
    self.dirty_areas.reset();
    let covering = NavBounds::union_all(queued.iter().map(|area| &area.bounds).chain(root_bounds.as_ref()));
    let Some(bounds) = covering else {
      tracing::debug!("nothing to rebuild");
      return;
    };

    let batch = [DirtyArea::new(bounds, DirtyFlags::ALL)];
    let mut failed = false;
    for (id, generator) in &mut self.generators {
      if let Err(err) = generator.rebuild_dirty_areas(&batch) {
        tracing::warn!(generator = id.raw(), %err, "full rebuild failed, area re-queued");
        self.metrics.record_generator_failure();
        failed = true;
      }
    }
    if failed {
      self.dirty_areas.requeue(&batch);
    }
    tracing::debug!(?bounds, generators = self.generators.len(), "rebuilt all navigation");
  }

  // ===========================================================================
  // Generators
  // ===========================================================================

  pub fn register_generator(&mut self, mut generator: Box<dyn NavDataGenerator>) -> GeneratorId {
    let regions = self.invokers.regions();
    if !regions.is_empty() {
      generator.update_active_regions(&regions);
    }
    let id = GeneratorId::next();
    self.generators.push((id, generator));
    id
  }

  /// Cancel and hand back a generator.
  pub fn unregister_generator(&mut self, id: GeneratorId) -> Option<Box<dyn NavDataGenerator>> {
    let index = self.generators.iter().position(|(gid, _)| *gid == id)?;
    let (_, mut generator) = self.generators.remove(index);
    generator.cancel_build();
    Some(generator)
  }

  pub fn generator_count(&self) -> usize {
    self.generators.len()
  }

  /// Block until every generator finished its accepted work.
  pub fn ensure_build_completion(&mut self) {
    for (_, generator) in &mut self.generators {
      generator.ensure_build_completion();
    }
  }

  /// Any generator building. With `check_dirty_too`, queued areas and
  /// pending intents count as well.
  pub fn is_navigation_build_in_progress(&self, check_dirty_too: bool) -> bool {
    self
      .generators
      .iter()
      .any(|(_, generator)| generator.is_build_in_progress(check_dirty_too))
      || (check_dirty_too && (self.dirty_areas.is_dirty() || !self.pending.is_empty()))
  }

  // ===========================================================================
  // Invokers and custom links
  // ===========================================================================

  pub fn register_invoker(
    &mut self,
    owner: OwnerId,
    location: DVec3,
    generation_radius: f64,
    removal_radius: f64,
  ) -> bool {
    self
      .invokers
      .register(owner, location, generation_radius, removal_radius)
  }

  pub fn unregister_invoker(&mut self, owner: OwnerId) -> bool {
    self.invokers.unregister(owner)
  }

  pub fn update_invoker_location(&mut self, owner: OwnerId, location: DVec3) -> bool {
    self.invokers.update_location(owner, location)
  }

  pub fn active_regions(&self) -> Vec<ActiveRegion> {
    self.invokers.regions()
  }

  /// Handle for staging custom links from any thread.
  pub fn custom_link_queue(&self) -> CustomLinkQueue {
    self.custom_links.queue()
  }

  pub fn custom_links(&self) -> &CustomLinkRegistry {
    &self.custom_links
  }

  // ===========================================================================
  // Tick
  // ===========================================================================

  /// Advance the driver by `delta_seconds`. Does nothing unless set up.
  #[cfg_attr(feature = "profiling", tracing::instrument(skip_all, name = "system::tick"))]
  pub fn tick(&mut self, delta_seconds: f32) {
    if self.octree.is_none() {
      return;
    }

    self.custom_links.process_pending(&self.dirty_areas);

    if !self.pending.is_empty() {
      if let Err(err) = self.flush_pending_updates() {
        tracing::warn!(%err, "flush failed");
      }
    }

    if let Some(regions) = self.invokers.tick(delta_seconds) {
      for (_, generator) in &mut self.generators {
        generator.update_active_regions(&regions);
      }
    }

    if !self.build_lock.is_locked() && self.auto_update_enabled {
      let generators = &mut self.generators;
      let outcome = self
        .dirty_areas
        .drain_and_rebuild(delta_seconds, !self.config.realtime, |areas| {
          let mut first_error = None;
          for (_, generator) in generators.iter_mut() {
            if let Err(err) = generator.rebuild_dirty_areas(areas) {
              first_error.get_or_insert(err);
            }
          }
          first_error.map_or(Ok(()), Err)
        });
      match outcome {
        DrainOutcome::Drained { areas } => self.metrics.record_drain(areas),
        DrainOutcome::Failed { .. } => self.metrics.record_generator_failure(),
        DrainOutcome::Waiting | DrainOutcome::Idle => {}
      }
    }

    for (_, generator) in &mut self.generators {
      generator.tick_async_build(delta_seconds);
    }
  }
}

impl Default for NavigationSystem {
  fn default() -> Self {
    Self::new(NavSystemConfig::default())
  }
}

fn octree_len(octree: &Option<NavigationOctree>) -> usize {
  octree.as_ref().map_or(0, NavigationOctree::len)
}

fn octree_nodes(octree: &Option<NavigationOctree>) -> usize {
  octree.as_ref().map_or(0, NavigationOctree::node_count)
}

fn octree_memory(octree: &Option<NavigationOctree>) -> usize {
  octree.as_ref().map_or(0, NavigationOctree::memory_usage)
}

// =============================================================================
// Flush resolution
// =============================================================================

/// Borrowed driver state for applying one [`FlushBatch`].
struct Flusher<'a> {
  octree: &'a mut NavigationOctree,
  batch: &'a mut FlushBatch,
  parent_chain: &'a ParentChildMap,
  collaborators: &'a HashMap<OwnerId, Weak<dyn NavRelevant>>,
  attached: &'a mut HashMap<OwnerId, OwnerId>,
  /// Children merged into a parent during this flush.
  attached_now: HashSet<OwnerId>,
  dirty_areas: &'a DirtyAreaAccumulator,
}

impl Flusher<'_> {
  fn emit_prev(&self, intent: &PendingIntent) {
    if let Some(prev) = intent.prev {
      self.dirty_areas.add_area(prev.bounds, prev.flags);
    }
  }

  /// Apply one intent. Parents queued in the same batch are applied first,
  /// one level deep only.
  fn apply(&mut self, slot: usize, resolve_parent: bool) {
    if !self.batch.mark_applied(slot) {
      return;
    }
    let intent = self.batch.intent(slot).clone();
    self.emit_prev(&intent);
    if intent.invalid {
      return;
    }
    let Some(source) = intent.source() else {
      tracing::trace!(owner = %intent.owner, "collaborator dropped before flush");
      return;
    };
    if !source.is_navigation_relevant() {
      return;
    }

    match source.navigation_parent() {
      Some(parent) => self.apply_child(&intent, parent, source.as_ref(), resolve_parent),
      None => self.materialize(intent.owner, source.as_ref(), intent.flags_override),
    }
  }

  fn apply_child(&mut self, intent: &PendingIntent, parent: OwnerId, source: &dyn NavRelevant, resolve_parent: bool) {
    let owner = intent.owner;
    if resolve_parent && self.octree.handle_for_owner(parent).is_none() {
      if let Some(parent_slot) = self.batch.position(parent) {
        if !self.batch.is_applied(parent_slot) {
          self.apply(parent_slot, false);
        }
      }
    }
    if self.attached_now.contains(&owner) {
      return;
    }

    let Some(handle) = self.octree.handle_for_owner(parent) else {
      tracing::warn!(%owner, %parent, "navigation parent not in the octree, child kept until it is");
      return;
    };

    if self.attached.get(&owner) == Some(&parent) {
      // Already merged once: rebuild the aggregate so the old copy goes.
      match self.collaborators.get(&parent).and_then(Weak::upgrade) {
        Some(parent_source) => self.materialize(parent, parent_source.as_ref(), DirtyFlags::empty()),
        None => tracing::warn!(%owner, %parent, "navigation parent dropped"),
      }
      return;
    }

    let bounds = source.navigation_bounds();
    let data = self.octree.gather_data(source);
    let flags = if intent.flags_override.is_empty() {
      data.dirty_flags()
    } else {
      intent.flags_override
    };
    match self.octree.append_to_node(handle, bounds, data) {
      Ok(()) => {
        self.attached.insert(owner, parent);
        self.attached_now.insert(owner);
        self.dirty_areas.add_area(bounds, flags);
      }
      Err(err) => tracing::warn!(%owner, %parent, %err, "failed to append child to parent element"),
    }
  }

  /// (Re)build `owner`'s element from its own data and every live child.
  fn materialize(&mut self, owner: OwnerId, source: &dyn NavRelevant, flags_override: DirtyFlags) {
    let mut bounds = source.navigation_bounds();
    let mut data = self.octree.gather_data(source);
    let mut gathered: SmallVec<[OwnerId; 4]> = SmallVec::new();
    for &child in self.parent_chain.children(owner) {
      let Some(child_source) = self.collaborators.get(&child).and_then(Weak::upgrade) else {
        continue;
      };
      if !child_source.is_navigation_relevant() {
        continue;
      }
      let child_bounds = child_source.navigation_bounds();
      if child_bounds.is_valid() {
        bounds = bounds.union(&child_bounds);
      }
      data.append(self.octree.gather_data(child_source.as_ref()));
      gathered.push(child);
    }

    // A rejected rebuild leaves the previous element in place.
    if let Err(err) = check_bounds(&bounds, &data) {
      tracing::warn!(%owner, %err, "failed to rebuild navigation element, previous element kept");
      return;
    }
    if let Some(old) = self.octree.handle_for_owner(owner) {
      if let Ok(element) = self.octree.remove(old) {
        self
          .dirty_areas
          .add_area(element.bounds.aabb, element.data.dirty_flags());
      }
      self.attached.retain(|_, parent| *parent != owner);
    }

    let flags = if flags_override.is_empty() {
      data.dirty_flags()
    } else {
      flags_override
    };
    match self.octree.insert(owner, bounds, data) {
      Ok(Some(_)) => {
        for child in gathered {
          self.attached.insert(child, owner);
          self.attached_now.insert(child);
          if let Some(child_slot) = self.batch.position(child) {
            if self.batch.mark_applied(child_slot) {
              let child_intent = self.batch.intent(child_slot).clone();
              self.emit_prev(&child_intent);
            }
          }
        }
        self.dirty_areas.add_area(bounds, flags);
      }
      Ok(None) => tracing::trace!(%owner, "nothing to insert"),
      Err(err) => tracing::warn!(%owner, %err, "failed to insert navigation element"),
    }
  }
}

#[cfg(test)]
#[path = "system_test.rs"]
mod system_test;
