use std::sync::atomic::{AtomicUsize, Ordering};

use glam::DVec2;

use super::*;
use crate::exporter::triangle_count_of;
use crate::generator::{AsyncTileGenerator, TileBuilder, TileCoord, TileGrid};
use crate::modifier::{AreaClassId, LinkId, NavLink};
use crate::test_utils::{nav_box, RecordingGenerator, TestActor};

const BOX_TRIANGLES: usize = 12;

fn editor_config() -> NavSystemConfig {
  NavSystemConfig {
    initial_build_lock: false,
    ..NavSystemConfig::EDITOR
  }
}

/// Populated system with one recording generator.
fn setup_with(config: NavSystemConfig) -> (NavigationSystem, RecordingGenerator) {
  let mut system = NavigationSystem::new(config);
  system.initial_setup().unwrap();
  system.conditional_populate_octree(std::iter::empty()).unwrap();
  let generator = RecordingGenerator::new();
  system.register_generator(Box::new(generator.clone()));
  (system, generator)
}

fn setup() -> (NavigationSystem, RecordingGenerator) {
  setup_with(editor_config())
}

fn shared(actor: TestActor) -> (OwnerId, Arc<TestActor>, Arc<dyn NavRelevant>) {
  let actor = actor.shared();
  let source: Arc<dyn NavRelevant> = actor.clone();
  (actor.owner(), actor, source)
}

fn boxed(min: [f64; 3], max: [f64; 3]) -> (OwnerId, Arc<TestActor>, Arc<dyn NavRelevant>) {
  shared(TestActor::new(nav_box(min, max)))
}

fn query_owners(system: &NavigationSystem, bounds: NavBounds) -> Vec<OwnerId> {
  system
    .query_box(bounds, ElementFilter::empty())
    .unwrap()
    .map(|(_, element)| element.owner)
    .collect()
}

fn covering(areas: &[DirtyArea]) -> Option<NavBounds> {
  NavBounds::union_all(areas.iter().map(|area| &area.bounds))
}

// =========================================================================
// Batch 1: Lifecycle Tests
// =========================================================================

/// Nothing works before setup, and nothing after teardown.
#[test]
fn test_lifecycle_guards() {
  let mut system = NavigationSystem::new(editor_config());
  let (owner, _actor, source) = boxed([0.0; 3], [1.0; 3]);
  assert_eq!(
    system.register_element(owner, &source, OctreeUpdateFlags::DEFAULT),
    Err(NavSystemError::NotInitialized)
  );
  assert!(!system.is_valid());

  system.initial_setup().unwrap();
  assert_eq!(system.state(), NavSystemState::AwaitingOctreePopulation);
  system.conditional_populate_octree([(owner, source.clone())]).unwrap();
  assert_eq!(system.state(), NavSystemState::Populated);
  assert!(system.element_handle(owner).is_some());

  system.teardown();
  assert_eq!(system.state(), NavSystemState::Destroyed);
  assert!(!system.is_valid());
  assert_eq!(
    system.register_element(owner, &source, OctreeUpdateFlags::DEFAULT),
    Err(NavSystemError::Destroyed(system.world_id()))
  );
  assert_eq!(system.initial_setup(), Err(NavSystemError::Destroyed(system.world_id())));
  system.tick(1.0);
}

/// Game preset holds the build until the initial lock is released.
#[test]
fn test_initial_build_lock() {
  let mut system = NavigationSystem::new(NavSystemConfig::GAME);
  system.initial_setup().unwrap();
  assert!(system.is_build_locked());
  assert_eq!(system.build_lock_flags(), BuildLockFlags::INITIAL_LOCK);

  system.remove_build_lock(BuildLockFlags::INITIAL_LOCK, true);
  assert!(!system.is_build_locked());
}

/// Teardown cancels and drops generators.
#[test]
fn test_teardown_cancels_generators() {
  let (mut system, generator) = setup();
  system.teardown();
  assert_eq!(generator.cancels(), 1);
  assert_eq!(system.generator_count(), 0);
  assert!(system.octree().is_none());
}

// =========================================================================
// Batch 2: Scenario Tests
// =========================================================================

/// A registered owner is found by overlapping queries only.
#[test]
fn test_scenario_register_and_query() {
  let (mut system, _generator) = setup();
  let (a, _actor, source) = boxed([0.0; 3], [10.0; 3]);
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  assert!(query_owners(&system, nav_box([5.0; 3], [15.0; 3])).is_empty(), "not flushed yet");

  system.flush_pending_updates().unwrap();
  assert_eq!(query_owners(&system, nav_box([5.0; 3], [15.0; 3])), vec![a]);
  assert!(query_owners(&system, nav_box([100.0; 3], [200.0; 3])).is_empty());
}

/// Parent and child staged together produce one aggregate element.
#[test]
fn test_scenario_parent_child_aggregate() {
  let (mut system, _generator) = setup();
  let (p, _parent, parent_source) = boxed([0.0; 3], [1.0; 3]);
  let (c, _child, child_source) = shared(TestActor::new(nav_box([2.0; 3], [3.0; 3])).with_parent(p));

  system.register_element(p, &parent_source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.register_element(c, &child_source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();

  let octree = system.octree().unwrap();
  assert_eq!(octree.len(), 1);
  assert!(system.element_handle(c).is_none(), "child has no element of its own");
  let element = system.element(p).unwrap();
  assert_eq!(element.bounds.aabb, nav_box([0.0; 3], [3.0; 3]));
  assert_eq!(triangle_count_of(&element.data.collision_data), 2 * BOX_TRIANGLES);
  assert_eq!(system.attached_parent(c), Some(p));
}

/// Staging order does not matter: the parent is materialized first.
#[test]
fn test_child_staged_before_parent() {
  let (mut system, _generator) = setup();
  let (p, _parent, parent_source) = boxed([0.0; 3], [1.0; 3]);
  let (c, _child, child_source) = shared(TestActor::new(nav_box([2.0; 3], [3.0; 3])).with_parent(p));

  system.register_element(c, &child_source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.register_element(p, &parent_source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();

  assert_eq!(system.octree().unwrap().len(), 1);
  let element = system.element(p).unwrap();
  assert_eq!(triangle_count_of(&element.data.collision_data), 2 * BOX_TRIANGLES);
}

/// Unregistering an owner with geometry and modifiers empties the region and
/// dirties it with its own flags, ALL.
#[test]
fn test_scenario_unregister_dirties_old_bounds() {
  let (mut system, _generator) = setup();
  let bounds = nav_box([0.0; 3], [10.0; 3]);
  let (a, actor, source) = shared(TestActor::new(bounds).with_area(AreaClassId(1)));
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();
  system.dirty_areas().take_all();

  assert!(system
    .unregister_element(a, actor.as_ref(), OctreeUpdateFlags::DEFAULT)
    .unwrap());
  assert!(query_owners(&system, bounds).is_empty());
  let areas = system.dirty_areas().snapshot();
  assert_eq!(areas, vec![DirtyArea::new(bounds, DirtyFlags::ALL)]);
}

/// Geometry-only owners dirty with GEOMETRY unless the caller asks for ALL.
#[test]
fn test_unregister_flags_override() {
  let (mut system, _generator) = setup();
  let bounds = nav_box([0.0; 3], [10.0; 3]);
  let (a, actor, source) = boxed([0.0; 3], [10.0; 3]);
  let (b, actor_b, source_b) = boxed([20.0; 3], [30.0; 3]);
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.register_element(b, &source_b, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();
  system.dirty_areas().take_all();

  system
    .unregister_element(a, actor.as_ref(), OctreeUpdateFlags::DEFAULT)
    .unwrap();
  system
    .unregister_element(b, actor_b.as_ref(), OctreeUpdateFlags::GEOMETRY)
    .unwrap();
  assert_eq!(
    system.dirty_areas().snapshot(),
    vec![
      DirtyArea::new(bounds, DirtyFlags::GEOMETRY),
      DirtyArea::new(nav_box([20.0; 3], [30.0; 3]), DirtyFlags::ALL),
    ]
  );
}

/// Areas accumulated under a lock arrive as one batch on unlock.
#[test]
fn test_scenario_unlock_rebuilds_once() {
  let (mut system, generator) = setup();
  system.add_build_lock(BuildLockFlags::INITIAL_LOCK);

  let actors: Vec<_> = (0..5)
    .map(|i| {
      let x = i as f64 * 10.0;
      boxed([x, 0.0, 0.0], [x + 1.0, 1.0, 1.0])
    })
    .collect();
  for (owner, _, source) in &actors {
    system.register_element(*owner, source, OctreeUpdateFlags::DEFAULT).unwrap();
  }
  system.tick(0.1);
  assert_eq!(generator.batch_count(), 0, "locked build never rebuilds");
  assert_eq!(system.octree().unwrap().len(), 5, "but still flushes");

  system.remove_build_lock(BuildLockFlags::INITIAL_LOCK, false);
  let batches = generator.batches();
  assert_eq!(batches.len(), 1);
  assert_eq!(batches[0].len(), 1);
  assert_eq!(batches[0][0].flags, DirtyFlags::ALL);
  for (_, actor, _) in &actors {
    assert!(batches[0][0].bounds.contains(&actor.navigation_bounds()));
  }

  system.tick(0.1);
  assert_eq!(generator.batch_count(), 1, "nothing left after the full rebuild");
}

// =========================================================================
// Batch 3: Property Tests
// =========================================================================

/// Register then unregister in one window: no octree change, no area.
#[test]
fn test_register_unregister_coalesces() {
  let (mut system, _generator) = setup();
  let (a, actor, source) = boxed([0.0; 3], [1.0; 3]);
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  assert!(system
    .unregister_element(a, actor.as_ref(), OctreeUpdateFlags::DEFAULT)
    .unwrap());
  system.flush_pending_updates().unwrap();

  assert!(system.octree().unwrap().is_empty());
  assert!(!system.has_dirty_areas_queued());
}

/// An update superseded by an unregister only dirties the previous bounds.
#[test]
fn test_superseded_update_emits_previous_bounds() {
  let (mut system, _generator) = setup();
  let (a, actor, source) = boxed([0.0; 3], [1.0; 3]);
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();
  system.dirty_areas().take_all();

  actor.set_bounds(nav_box([5.0; 3], [6.0; 3]));
  system.update_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  system
    .unregister_element(a, actor.as_ref(), OctreeUpdateFlags::DEFAULT)
    .unwrap();
  assert!(!system.has_dirty_areas_queued(), "emission deferred to the flush");

  system.flush_pending_updates().unwrap();
  assert!(system.octree().unwrap().is_empty());
  assert_eq!(
    system.dirty_areas().snapshot(),
    vec![DirtyArea::new(nav_box([0.0; 3], [1.0; 3]), DirtyFlags::GEOMETRY)]
  );
}

/// Handles die with their element.
#[test]
fn test_handle_invalidated_on_unregister() {
  let (mut system, _generator) = setup();
  let (a, actor, source) = boxed([0.0; 3], [1.0; 3]);
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();
  let handle = system.element_handle(a).unwrap();

  system
    .unregister_element(a, actor.as_ref(), OctreeUpdateFlags::DEFAULT)
    .unwrap();
  let octree = system.octree().unwrap();
  assert!(!octree.is_valid_handle(handle));
  assert!(matches!(octree.get(handle), Err(crate::error::OctreeError::InvalidHandle(_))));
}

/// Moving an element dirties both where it was and where it is.
#[test]
fn test_update_dirties_old_and_new_bounds() {
  let (mut system, _generator) = setup();
  let old = nav_box([0.0; 3], [1.0; 3]);
  let new = nav_box([5.0; 3], [6.0; 3]);
  let (a, actor, source) = boxed([0.0; 3], [1.0; 3]);
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();
  system.dirty_areas().take_all();

  actor.set_bounds(new);
  system.update_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();

  let areas = system.dirty_areas().snapshot();
  assert!(areas.iter().any(|area| area.bounds.contains(&old)));
  assert!(areas.iter().any(|area| area.bounds.contains(&new)));
  assert_eq!(system.element(a).unwrap().bounds.aabb, new);
}

/// In-place bounds updates keep the handle and cover both boxes.
#[test]
fn test_update_element_bounds_in_place() {
  let (mut system, _generator) = setup();
  let (a, _actor, source) = boxed([0.0; 3], [1.0; 3]);
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();
  let handle = system.element_handle(a).unwrap();
  system.dirty_areas().take_all();

  let new = nav_box([0.0; 3], [4.0; 3]);
  assert!(system.update_element_bounds(a, new, NavBounds::EMPTY).unwrap());
  assert_eq!(system.element_handle(a), Some(handle));
  assert_eq!(system.element(a).unwrap().bounds.aabb, new);

  let areas = system.dirty_areas().snapshot();
  assert_eq!(areas.len(), 1);
  assert!(areas[0].bounds.contains(&new));
  assert_eq!(areas[0].flags, DirtyFlags::ALL | DirtyFlags::NAVIGATION_BOUNDS);

  assert!(!system.update_element_bounds(OwnerId::new(), new, NavBounds::EMPTY).unwrap());
}

/// Randomized moves: dirty areas always cover old and new bounds.
#[test]
fn test_dirty_areas_conservative_under_random_moves() {
  use rand::rngs::StdRng;
  use rand::{Rng, SeedableRng};

  let mut rng = StdRng::seed_from_u64(0x6e61_765f);
  let (mut system, _generator) = setup();
  let actors: Vec<_> = (0..20).map(|_| boxed([0.0; 3], [1.0; 3])).collect();
  for (owner, _, source) in &actors {
    system.register_element(*owner, source, OctreeUpdateFlags::DEFAULT).unwrap();
  }
  system.flush_pending_updates().unwrap();

  for _ in 0..50 {
    system.dirty_areas().take_all();
    let (owner, actor, source) = &actors[rng.random_range(0..actors.len())];
    let old = system.element(*owner).unwrap().bounds.aabb;
    let min = [
      rng.random_range(-50.0..50.0),
      rng.random_range(-50.0..50.0),
      rng.random_range(-50.0..50.0),
    ];
    let size = rng.random_range(0.5..5.0);
    let new = nav_box(min, [min[0] + size, min[1] + size, min[2] + size]);
    actor.set_bounds(new);

    system.update_element(*owner, source, OctreeUpdateFlags::DEFAULT).unwrap();
    system.flush_pending_updates().unwrap();

    let covered = covering(&system.dirty_areas().snapshot()).unwrap();
    assert!(covered.contains(&old), "old bounds {old:?} not covered by {covered:?}");
    assert!(covered.contains(&new), "new bounds {new:?} not covered by {covered:?}");
  }
  assert_eq!(system.octree().unwrap().len(), actors.len());
}

/// A successful drain leaves nothing queued.
#[test]
fn test_drain_clears_on_success() {
  let (mut system, generator) = setup();
  let (a, _actor, source) = boxed([0.0; 3], [1.0; 3]);
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.tick(0.016);

  assert_eq!(generator.batch_count(), 1);
  assert_eq!(generator.all_areas()[0].bounds, nav_box([0.0; 3], [1.0; 3]));
  assert!(!system.has_dirty_areas_queued());
}

/// Locked ticks flush and accumulate; the next unlocked tick drains.
#[test]
fn test_lock_gates_rebuild_only() {
  let (mut system, generator) = setup();
  system.add_build_lock(BuildLockFlags::CUSTOM);
  let (a, _actor, source) = boxed([0.0; 3], [1.0; 3]);
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();

  system.tick(0.016);
  assert!(system.element_handle(a).is_some());
  assert!(system.has_dirty_areas_queued());
  assert_eq!(generator.batch_count(), 0);

  system.remove_build_lock(BuildLockFlags::CUSTOM, true);
  assert_eq!(generator.batch_count(), 0, "rebuild skipped on request");
  system.tick(0.016);
  assert_eq!(generator.batch_count(), 1);
  assert!(!system.has_dirty_areas_queued());
}

// =========================================================================
// Batch 4: Parent Chain Tests
// =========================================================================

fn parent_and_child(
  system: &mut NavigationSystem,
) -> (
  (OwnerId, Arc<TestActor>, Arc<dyn NavRelevant>),
  (OwnerId, Arc<TestActor>, Arc<dyn NavRelevant>),
) {
  let parent = boxed([0.0; 3], [1.0; 3]);
  let child = shared(TestActor::new(nav_box([2.0; 3], [3.0; 3])).with_parent(parent.0));
  system.register_element(parent.0, &parent.2, OctreeUpdateFlags::DEFAULT).unwrap();
  system.register_element(child.0, &child.2, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();
  (parent, child)
}

/// Removing a child rebuilds the parent without it.
#[test]
fn test_child_unregister_rebuilds_parent() {
  let (mut system, _generator) = setup();
  let ((p, _parent, _parent_source), (c, child, _child_source)) = parent_and_child(&mut system);

  system
    .unregister_element(c, child.as_ref(), OctreeUpdateFlags::DEFAULT)
    .unwrap();
  system.flush_pending_updates().unwrap();

  let element = system.element(p).unwrap();
  assert_eq!(element.bounds.aabb, nav_box([0.0; 3], [1.0; 3]));
  assert_eq!(triangle_count_of(&element.data.collision_data), BOX_TRIANGLES);
  assert!(system.children_of(p).is_empty());
  assert_eq!(system.attached_parent(c), None);
}

/// Children survive their parent leaving and rejoin when it comes back.
#[test]
fn test_parent_reregister_regathers_children() {
  let (mut system, _generator) = setup();
  let ((p, parent, parent_source), (c, _child, _child_source)) = parent_and_child(&mut system);

  system
    .unregister_element(p, parent.as_ref(), OctreeUpdateFlags::DEFAULT)
    .unwrap();
  assert!(system.octree().unwrap().is_empty());
  assert_eq!(system.attached_parent(c), None);

  system.register_element(p, &parent_source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();
  assert_eq!(system.element(p).unwrap().bounds.aabb, nav_box([0.0; 3], [3.0; 3]));
  assert_eq!(system.attached_parent(c), Some(p));
}

/// A child arriving after its parent is appended in place.
#[test]
fn test_late_child_appended_in_place() {
  let (mut system, _generator) = setup();
  let (p, _parent, parent_source) = boxed([0.0; 3], [1.0; 3]);
  system.register_element(p, &parent_source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();
  let handle = system.element_handle(p).unwrap();

  let (c, _child, child_source) = shared(TestActor::new(nav_box([2.0; 3], [3.0; 3])).with_parent(p));
  system.register_element(c, &child_source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();

  assert_eq!(system.element_handle(p), Some(handle));
  assert_eq!(system.element(p).unwrap().bounds.aabb, nav_box([0.0; 3], [3.0; 3]));
  assert_eq!(system.attached_parent(c), Some(p));
}

/// Updating a parent re-gathers its children exactly once.
#[test]
fn test_parent_update_does_not_duplicate_children() {
  let (mut system, _generator) = setup();
  let ((p, _parent, parent_source), (c, _child, _child_source)) = parent_and_child(&mut system);

  system.update_element(p, &parent_source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();

  assert_eq!(system.octree().unwrap().len(), 1);
  let element = system.element(p).unwrap();
  assert_eq!(triangle_count_of(&element.data.collision_data), 2 * BOX_TRIANGLES);
  assert_eq!(system.attached_parent(c), Some(p));
}

/// Updating an attached child rebuilds the aggregate with its new bounds.
#[test]
fn test_child_update_rebuilds_aggregate() {
  let (mut system, _generator) = setup();
  let ((p, _parent, _parent_source), (c, child, child_source)) = parent_and_child(&mut system);

  child.set_bounds(nav_box([2.0; 3], [8.0; 3]));
  system.update_element(c, &child_source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();

  let element = system.element(p).unwrap();
  assert_eq!(element.bounds.aabb, nav_box([0.0; 3], [8.0; 3]));
  assert_eq!(triangle_count_of(&element.data.collision_data), 2 * BOX_TRIANGLES);
}

/// A child whose parent never registered waits in the map.
#[test]
fn test_orphan_child_waits_for_parent() {
  let (mut system, _generator) = setup();
  let (p, _parent, parent_source) = boxed([0.0; 3], [1.0; 3]);
  let (c, _child, child_source) = shared(TestActor::new(nav_box([2.0; 3], [3.0; 3])).with_parent(p));

  system.register_element(c, &child_source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();
  assert!(system.octree().unwrap().is_empty());
  assert_eq!(system.children_of(p), &[c]);

  system.register_element(p, &parent_source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();
  assert_eq!(system.element(p).unwrap().bounds.aabb, nav_box([0.0; 3], [3.0; 3]));
}

/// A child registered and unregistered in one window leaves its flushed
/// parent alone.
#[test]
fn test_unmerged_child_unregister_keeps_parent() {
  let (mut system, _generator) = setup();
  let (p, _parent, parent_source) = boxed([0.0; 3], [1.0; 3]);
  system.register_element(p, &parent_source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();
  let handle = system.element_handle(p).unwrap();
  system.dirty_areas().take_all();

  let (c, child, child_source) = shared(TestActor::new(nav_box([2.0; 3], [3.0; 3])).with_parent(p));
  system.register_element(c, &child_source, OctreeUpdateFlags::DEFAULT).unwrap();
  assert!(system
    .unregister_element(c, child.as_ref(), OctreeUpdateFlags::DEFAULT)
    .unwrap());
  system.flush_pending_updates().unwrap();

  assert_eq!(system.element_handle(p), Some(handle), "parent not rebuilt");
  assert!(system.octree().unwrap().is_valid_handle(handle));
  assert_eq!(system.element(p).unwrap().bounds.aabb, nav_box([0.0; 3], [1.0; 3]));
  assert!(system.children_of(p).is_empty());
  assert_eq!(system.attached_parent(c), None);
  assert!(!system.has_dirty_areas_queued());
}

/// A parent leaving before its first flush takes its queued children along.
#[test]
fn test_pending_parent_unregister_drops_children() {
  let (mut system, _generator) = setup();
  let (p, parent, parent_source) = boxed([0.0; 3], [1.0; 3]);
  let (c, _child, child_source) = shared(TestActor::new(nav_box([2.0; 3], [3.0; 3])).with_parent(p));

  system.register_element(p, &parent_source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.register_element(c, &child_source, OctreeUpdateFlags::DEFAULT).unwrap();
  assert!(system
    .unregister_element(p, parent.as_ref(), OctreeUpdateFlags::DEFAULT)
    .unwrap());
  system.flush_pending_updates().unwrap();

  assert!(system.octree().unwrap().is_empty());
  assert!(!system.has_dirty_areas_queued());
  assert_eq!(system.attached_parent(c), None);
  assert_eq!(system.children_of(p), &[c], "child still waits for its parent");

  // The parent coming back gathers the child again.
  system.register_element(p, &parent_source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();
  let element = system.element(p).unwrap();
  assert_eq!(element.bounds.aabb, nav_box([0.0; 3], [3.0; 3]));
  assert_eq!(triangle_count_of(&element.data.collision_data), 2 * BOX_TRIANGLES);
  assert_eq!(system.attached_parent(c), Some(p));
}

/// A parent rebuild with invalid bounds keeps the previous aggregate.
#[test]
fn test_rejected_parent_rebuild_keeps_element() {
  let (mut system, _generator) = setup();
  let ((p, parent, _parent_source), (c, _child, _child_source)) = parent_and_child(&mut system);
  let handle = system.element_handle(p).unwrap();
  system.dirty_areas().take_all();

  parent.set_bounds(nav_box([0.0; 3], [f64::INFINITY; 3]));
  system.update_parent_chain(p, true).unwrap();
  system.flush_pending_updates().unwrap();

  assert_eq!(system.element_handle(p), Some(handle));
  let element = system.element(p).unwrap();
  assert_eq!(element.bounds.aabb, nav_box([0.0; 3], [3.0; 3]));
  assert_eq!(triangle_count_of(&element.data.collision_data), 2 * BOX_TRIANGLES);
  assert_eq!(system.attached_parent(c), Some(p));
  assert!(!system.has_dirty_areas_queued());
}

// =========================================================================
// Batch 5: Driver Tests
// =========================================================================

/// Irrelevant collaborators are ignored; a locked octree rejects changes.
#[test]
fn test_relevance_gate_and_registration_lock() {
  let (mut system, _generator) = setup();
  let (a, actor, source) = boxed([0.0; 3], [1.0; 3]);

  actor.set_relevant(false);
  assert_eq!(system.register_element(a, &source, OctreeUpdateFlags::DEFAULT), Ok(None));
  assert!(!system.has_pending_updates());

  actor.set_relevant(true);
  system.set_octree_lock(true);
  assert_eq!(
    system.register_element(a, &source, OctreeUpdateFlags::DEFAULT),
    Err(NavSystemError::RegistrationLocked)
  );
  assert_eq!(
    system.unregister_element(a, actor.as_ref(), OctreeUpdateFlags::DEFAULT),
    Err(NavSystemError::RegistrationLocked)
  );

  system.set_octree_lock(false);
  assert!(system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap().is_some());
  system.flush_pending_updates().unwrap();
  assert_eq!(
    system.register_element(a, &source, OctreeUpdateFlags::DEFAULT),
    Ok(None),
    "already in the octree"
  );
}

/// A failing generator sees the same areas again next tick.
#[test]
fn test_generator_failure_retried() {
  let (mut system, generator) = setup();
  let (a, _actor, source) = boxed([0.0; 3], [1.0; 3]);
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();

  generator.fail_next(1);
  system.tick(0.016);
  assert_eq!(generator.batch_count(), 0);
  assert!(system.has_dirty_areas_queued());
  assert!(system.is_navigation_build_in_progress(true));

  system.tick(0.016);
  assert_eq!(generator.batch_count(), 1);
  assert!(!system.is_navigation_build_in_progress(true));
}

/// Realtime drains respect the update frequency.
#[test]
fn test_realtime_drain_cadence() {
  let (mut system, generator) = setup_with(NavSystemConfig {
    initial_build_lock: false,
    ..NavSystemConfig::GAME
  });
  let (a, _actor, source) = boxed([0.0; 3], [1.0; 3]);
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();

  system.tick(0.001);
  assert_eq!(generator.batch_count(), 0);
  system.tick(0.02);
  assert_eq!(generator.batch_count(), 1);
}

/// Areas dropped while auto update is off force a full rebuild later.
#[test]
fn test_auto_update_reenable_rebuilds_all() {
  let (mut system, generator) = setup();
  system.set_auto_update_enabled(false);
  let (a, _actor, source) = boxed([0.0; 3], [1.0; 3]);
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.tick(0.016);
  assert!(!system.has_dirty_areas_queued(), "dropped while suppressed");
  assert_eq!(generator.batch_count(), 0);

  system.set_auto_update_enabled(true);
  let batches = generator.batches();
  assert_eq!(batches.len(), 1);
  assert_eq!(batches[0], vec![DirtyArea::new(nav_box([0.0; 3], [1.0; 3]), DirtyFlags::ALL)]);
  assert!(generator.cancels() >= 1, "in-flight work cancelled first");
}

/// Invoker regions reach generators at the configured interval.
#[test]
fn test_invokers_forwarded_to_generators() {
  let (mut system, generator) = setup();
  let owner = OwnerId::new();
  assert!(system.register_invoker(owner, DVec3::ZERO, 50.0, 60.0));

  system.tick(0.5);
  assert!(generator.regions().is_empty());
  system.tick(0.5);
  let regions = generator.regions();
  assert_eq!(regions.len(), 1);
  assert_eq!(regions[0][0].generation_radius, 50.0);

  // Late generators start with the current regions.
  let late = RecordingGenerator::new();
  system.register_generator(Box::new(late.clone()));
  assert_eq!(late.regions().len(), 1);
}

/// Links staged on another thread are registered and dirtied on tick.
#[test]
fn test_custom_links_from_other_thread() {
  let (mut system, generator) = setup();
  let queue = system.custom_link_queue();
  let owner = OwnerId::new();
  std::thread::spawn(move || {
    queue.register(owner, NavLink::new(LinkId(7), DVec3::ZERO, DVec3::ONE, AreaClassId(1)));
  })
  .join()
  .unwrap();

  system.tick(0.016);
  assert_eq!(system.custom_links().len(), 1);
  assert!(generator
    .all_areas()
    .iter()
    .any(|area| area.flags == DirtyFlags::DYNAMIC_MODIFIER));
}

/// Dirty areas from other threads are drained like local ones.
#[test]
fn test_dirty_area_sink() {
  let (mut system, generator) = setup();
  let sink = system.dirty_area_sink();
  std::thread::spawn(move || {
    sink.add_area(nav_box([0.0; 3], [2.0; 3]), DirtyFlags::GEOMETRY);
  })
  .join()
  .unwrap();
  system.tick(0.016);
  assert_eq!(generator.all_areas().len(), 1);
}

/// Lazy collaborators are exported on demand only.
#[test]
fn test_lazy_gathering_on_demand() {
  let (mut system, _generator) = setup();
  let (a, actor, source) = shared(TestActor::new(nav_box([0.0; 3], [1.0; 3])).lazy());
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();

  assert_eq!(actor.export_count(), 0);
  assert!(system.element(a).unwrap().data.has_pending_lazy_gathering());

  assert!(system.demand_lazy_data_gathering(a).unwrap());
  assert_eq!(actor.export_count(), 1);
  assert!(system.element(a).unwrap().data.has_geometry());
  assert!(!system.demand_lazy_data_gathering(a).unwrap(), "nothing left to gather");
}

/// Geometry slices and voxel caches go through the owner's element.
#[test]
fn test_slice_and_voxel_cache() {
  let (mut system, _generator) = setup();
  let (a, _actor, source) = shared(TestActor::new(nav_box([0.0; 3], [4.0; 3])).sliced());
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.flush_pending_updates().unwrap();

  let slice = system
    .gather_geometry_slice(a, &nav_box([0.0; 3], [1.0; 3]))
    .unwrap()
    .unwrap();
  assert_eq!(slice.bounds(), nav_box([0.0; 3], [1.0; 3]));

  assert!(system.store_voxel_cache(a, vec![1, 2, 3]).unwrap());
  assert_eq!(system.element(a).unwrap().data.voxel_data, vec![1, 2, 3]);
  assert!(!system.store_voxel_cache(OwnerId::new(), vec![]).unwrap());
}

/// Generators can be removed and are cancelled on the way out.
#[test]
fn test_unregister_generator_and_completion() {
  let (mut system, generator) = setup();
  system.ensure_build_completion();
  assert_eq!(generator.completions(), 1);

  let id = system.register_generator(Box::new(RecordingGenerator::new()));
  assert_eq!(system.generator_count(), 2);
  assert!(system.unregister_generator(id).is_some());
  assert!(system.unregister_generator(id).is_none());
  assert_eq!(system.generator_count(), 1);
}

struct CountingTiles(Arc<AtomicUsize>);

impl TileBuilder for CountingTiles {
  type Output = ();

  fn build_tile(&self, _tile: TileCoord, _flags: DirtyFlags) -> std::result::Result<(), String> {
    self.0.fetch_add(1, Ordering::Relaxed);
    Ok(())
  }
}

/// End to end: registration → flush → drain → async tile build.
#[test]
fn test_async_tile_generator_end_to_end() {
  let mut system = NavigationSystem::new(editor_config());
  system.initial_setup().unwrap();
  system.conditional_populate_octree(std::iter::empty()).unwrap();
  let built = Arc::new(AtomicUsize::new(0));
  system.register_generator(Box::new(AsyncTileGenerator::new(
    TileGrid::new(DVec2::ZERO, 10.0),
    CountingTiles(Arc::clone(&built)),
  )));

  let (a, _actor, source) = boxed([1.0; 3], [2.0; 3]);
  let (b, _actor_b, source_b) = boxed([3.0; 3], [15.0, 4.0, 4.0]);
  system.register_element(a, &source, OctreeUpdateFlags::DEFAULT).unwrap();
  system.register_element(b, &source_b, OctreeUpdateFlags::DEFAULT).unwrap();
  system.tick(0.016);
  system.ensure_build_completion();

  assert_eq!(built.load(Ordering::Relaxed), 2, "tiles (0,0) and (1,0), once each");
  assert!(!system.is_navigation_build_in_progress(true));
}
