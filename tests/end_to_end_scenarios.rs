use archetype_ecs::World;

#[derive(Default, Clone, Copy, PartialEq, Debug)]
struct Int(i32);
#[derive(Default, Clone, Copy, PartialEq, Debug)]
struct Float(f32);

#[test]
fn create_entity_with_a_component_and_a_fresh_default_sibling() {
    let world = World::new();
    let e = world.create_entity();
    e.set(Int(13));
    assert!(e.has::<Int>());

    let arch = e.archetype().unwrap();
    let e2 = arch.create_entity();
    assert_eq!(e2.get::<Int, Int>(|v| *v).unwrap(), Int(0));

    world.destroy();
}

#[test]
fn migrating_an_entity_with_a_heap_backed_component_does_not_corrupt_it() {
    #[derive(Default, Clone, PartialEq, Debug)]
    struct Name(String);

    let world = World::new();
    let e = world.create_entity();
    e.set(Name("alice".to_string()));

    // Set-upgrade migration: Name's String must survive the move intact.
    e.set(Int(1));
    assert_eq!(e.get::<Name, Name>(|v| v.clone()).unwrap(), Name("alice".to_string()));

    // Remove migration: the surviving Name column must still read back
    // correctly after Int is dropped out from under it.
    e.remove::<Int>();
    assert_eq!(e.get::<Name, Name>(|v| v.clone()).unwrap(), Name("alice".to_string()));

    world.destroy();
}

#[test]
fn setting_a_new_component_migrates_the_entity_to_a_wider_archetype() {
    let world = World::new();
    let e = world.create_entity();
    e.set(Int(13));

    e.set(Float(0.5));

    assert_eq!(e.get::<Int, Int>(|v| *v).unwrap(), Int(13));
    assert_eq!(e.get::<Float, Float>(|v| *v).unwrap(), Float(0.5));

    world.destroy();
}

#[test]
fn set_inside_a_query_loop_is_deferred_until_the_loop_exits() {
    let world = World::new();
    let e = world.create_entity();
    e.set(Float(0.0));

    let mut q = world.query();
    q.has::<Float>();

    q.for_each::<Float>(|entity, v| {
        assert_eq!(*v, Float(0.0));
        entity.set(Float(4.0));
    });

    assert_eq!(e.get::<Float, Float>(|v| *v).unwrap(), Float(4.0));

    world.destroy();
}

#[test]
fn remove_listener_fires_exactly_once_with_the_removed_value() {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    use archetype_ecs::RemoveListener;

    let world = World::new();
    let seen = Arc::new(AtomicI32::new(0));
    let fires = Arc::new(AtomicI32::new(0));

    let seen_clone = seen.clone();
    let fires_clone = fires.clone();
    world.on_remove::<Int>(RemoveListener::ComponentOnly(Box::new(move |v: &Int| {
        seen_clone.store(v.0, Ordering::SeqCst);
        fires_clone.fetch_add(1, Ordering::SeqCst);
    })));

    let e = world.create_entity();
    e.set(Int(2));
    e.remove::<Int>();

    assert_eq!(fires.load(Ordering::SeqCst), 1);
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    world.destroy();
}

#[test]
fn query_sums_a_bound_column_across_a_hundred_entities() {
    let world = World::new();
    for i in 0..100 {
        let e = world.create_entity();
        e.set(Int(i));
        e.set(Float(i as f32 / 2.0));
    }

    let mut q = world.query();
    q.has::<Int>().has::<Float>();

    let mut sum = 0i32;
    q.for_each::<Int>(|_, v| sum += v.0);

    assert_eq!(sum, (0..100).sum::<i32>());

    world.destroy();
}

#[test]
fn destroying_the_world_invalidates_every_handle_and_zeroes_the_count() {
    let world = World::new();
    let e = world.create_entity();
    e.set(Int(1));
    assert_eq!(world.entity_count(), 1);

    world.destroy();

    assert!(!e.is_valid());
    assert_eq!(world.entity_count(), 0);

    // Post-destroy operations on a stale handle no-op rather than panic.
    e.set(Int(2));
    e.remove::<Int>();
}
