// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Query engine: filtered view over archetypes with incremental,
//! structure-counter-driven cache invalidation (§4.6).
//!
//! Grounded on the teacher's `QuerySignature`/`CachedQueryResult::update`
//! (append-only incremental rescan keyed on `seen_archetypes`), but
//! generalized: this crate's archetype slots can be destroyed and reused
//! for an unrelated signature (the teacher's never are), so a structure
//! change can invalidate slots that were already scanned, not just add
//! new ones past the end. `check_query_changes` therefore resets and
//! rescans from zero whenever `structure_counter` has moved at all, and
//! only trusts the cheap incremental path when it hasn't moved.
//!
//! Generated arity-N convenience (`Foreach<C1..Cn>` over many bound
//! columns at once) is out of scope per the spec's §1 non-goals; this
//! module implements the one primitive the generated variants would all
//! be wrappers over: bind exactly one typed column per iteration step.

use crate::component::Component;
use crate::entity::{ArchetypeRef, Entity};
use crate::signature::Signature;
use crate::world::World;

/// A filtered, incrementally-matched view over a world's archetypes.
///
/// Any call to [`Query::has`], [`Query::not`], or [`Query::clear`]
/// invalidates the match cache: the next materialization rescans from
/// scratch.
pub struct Query {
    world: World,
    include: Signature,
    exclude: Signature,
    matching_archetypes: Vec<u32>,
    last_scanned_index: usize,
    /// `u64::MAX` is never a real counter value reachable in one process
    /// lifetime's worth of structural edits in practice, but is used
    /// here only as an initial sentinel guaranteed to differ from the
    /// world's actual counter (which starts at 0), forcing the first
    /// materialization to do a full scan.
    observed_structure_counter: u64,
}

impl Query {
    pub fn new(world: World) -> Self {
        Self {
            world,
            include: Signature::new(),
            exclude: Signature::new(),
            matching_archetypes: Vec::new(),
            last_scanned_index: 0,
            observed_structure_counter: u64::MAX,
        }
    }

    fn reset_cache(&mut self) {
        self.matching_archetypes.clear();
        self.last_scanned_index = 0;
        self.observed_structure_counter = u64::MAX;
    }

    /// Require archetypes to carry component `C`.
    pub fn has<C: Component>(&mut self) -> &mut Self {
        let type_id = self.world.with_inner(|w| w.intern::<C>()).unwrap_or(0);
        self.include.add(type_id);
        self.reset_cache();
        self
    }

    /// Exclude archetypes that carry component `C`.
    pub fn not<C: Component>(&mut self) -> &mut Self {
        let type_id = self.world.with_inner(|w| w.intern::<C>()).unwrap_or(0);
        self.exclude.add(type_id);
        self.reset_cache();
        self
    }

    /// Reset both filters to match every archetype.
    pub fn clear(&mut self) -> &mut Self {
        self.include.clear();
        self.exclude.clear();
        self.reset_cache();
        self
    }

    /// Bring `matching_archetypes` up to date with the world's current
    /// structure (§4.6). Full rescan if the structure counter moved at
    /// all since the last check (an archetype slot may have been freed
    /// and reused for an unrelated signature, invalidating any cached
    /// index, not just appending past the end); otherwise resume from
    /// `last_scanned_index` through the current slot-count terminator.
    fn check_query_changes(&mut self) {
        let include = self.include.clone();
        let exclude = self.exclude.clone();
        let observed = self.observed_structure_counter;
        let last_scanned = self.last_scanned_index;

        let (current_counter, terminator, newly_matched) = self
            .world
            .with_inner(|w| {
                let current = w.structure_counter();
                let terminator = w.archetype_slot_count();
                let full_rescan = current != observed;
                #[cfg(feature = "profiling")]
                let _span = tracing::info_span!("query.check_query_changes", full_rescan).entered();
                let scan_from = if full_rescan { 0 } else { last_scanned };
                let mut matched = Vec::new();
                for idx in scan_from..terminator {
                    if let Some(sig) = w.archetype_signature(idx as u32) {
                        if sig.has_all(&include) && !sig.has_any(&exclude) {
                            matched.push(idx as u32);
                        }
                    }
                }
                (current, terminator, matched)
            })
            .unwrap_or((observed, last_scanned, Vec::new()));

        if current_counter != observed {
            self.matching_archetypes = newly_matched;
        } else {
            self.matching_archetypes.extend(newly_matched);
        }
        self.last_scanned_index = terminator;
        self.observed_structure_counter = current_counter;
    }

    /// Sum of `count()` over every currently matched archetype.
    pub fn entity_count(&mut self) -> usize {
        self.check_query_changes();
        let archetypes = self.matching_archetypes.clone();
        self.world
            .with_inner(|w| archetypes.iter().map(|&idx| w.archetype_row_count(idx)).sum())
            .unwrap_or(0)
    }

    /// Visit every entity in every matched archetype with no bound
    /// component — just the handle. Mutations performed inside `f` are
    /// deferred exactly like [`Query::for_each`] (§6 "iteration safety").
    pub fn for_each_entities(&mut self, mut f: impl FnMut(Entity)) {
        self.check_query_changes();
        let archetypes = self.matching_archetypes.clone();

        self.world.cache_structural_events(true);
        for &arch_index in &archetypes {
            let entities = self.world.with_inner(|w| w.archetype_entities_snapshot(arch_index)).flatten();
            if let Some(entities) = entities {
                for entity in entities {
                    f(entity);
                }
            }
        }
        self.world.cache_structural_events(false);
    }

    /// Bind exactly one typed column and visit every `(Entity, &mut C)`
    /// pair across every matched archetype. The column's base pointer is
    /// resolved once per archetype (§4.6); structural mutations performed
    /// inside `f` are deferred for the span of the whole call, so the
    /// pointer stays valid for every row of that archetype.
    pub fn for_each<C: Component>(&mut self, mut f: impl FnMut(Entity, &mut C)) {
        self.check_query_changes();
        let archetypes = self.matching_archetypes.clone();
        let type_id = self.world.with_inner(|w| w.intern::<C>()).unwrap_or(0);

        self.world.cache_structural_events(true);
        for &arch_index in &archetypes {
            let resolved = self.world.with_inner(|w| w.archetype_iter_column::<C>(arch_index, type_id));
            if let Some(Some((entities, ptr, len))) = resolved {
                debug_assert_eq!(entities.len(), len, "entity snapshot and column length must match: FrameworkInvariant");
                for (row, entity) in entities.into_iter().enumerate() {
                    // SAFETY: `ptr` was resolved for this archetype's
                    // current column buffer and `row < len`; no
                    // structural mutation can reallocate it while
                    // deferral is active for the span of this call.
                    let value = unsafe { &mut *ptr.add(row) };
                    f(entity, value);
                }
            }
        }
        self.world.cache_structural_events(false);
    }

    /// Destroy every entity in every matched archetype by destroying the
    /// archetypes themselves (§4.6) — structural, and itself subject to
    /// deferral if called from inside another deferred region.
    pub fn destroy_matching(&mut self) {
        self.check_query_changes();
        let archetypes = self.matching_archetypes.clone();
        let world_id = self.world.id();
        for arch_index in archetypes {
            let version = self.world.with_inner(|w| w.archetype_version(arch_index)).flatten();
            if let Some(version) = version {
                ArchetypeRef::new(world_id, arch_index, version).destroy();
            }
        }
        self.reset_cache();
    }
}

impl World {
    /// Build a fresh, unfiltered [`Query`] over this world.
    pub fn query(&self) -> Query {
        Query::new(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Clone, Copy, PartialEq, Debug)]
    struct Int(i32);
    #[derive(Default, Clone, Copy, PartialEq, Debug)]
    struct Float(f32);

    #[test]
    fn query_matches_only_archetypes_with_every_included_type() {
        let world = World::new();
        let with_both = world.create_entity();
        with_both.set(Int(1));
        with_both.set(Float(1.0));
        let int_only = world.create_entity();
        int_only.set(Int(2));

        let mut q = world.query();
        q.has::<Int>().has::<Float>();

        let mut seen = Vec::new();
        q.for_each::<Int>(|e, v| seen.push((e, v.0)));
        assert_eq!(seen, vec![(with_both, 1)]);
        let _ = int_only;
        world.destroy();
    }

    #[test]
    fn sum_of_bound_column_across_many_entities() {
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
    fn set_inside_for_each_is_deferred_until_the_loop_exits() {
        let world = World::new();
        let e = world.create_entity();
        e.set(Float(0.0));

        let mut q = world.query();
        q.has::<Float>();

        q.for_each::<Float>(|entity, v| {
            assert_eq!(v.0, 0.0);
            entity.set(Float(4.0));
        });

        assert_eq!(e.get::<Float, Float>(|v| *v).unwrap(), Float(4.0));
        world.destroy();
    }

    #[test]
    fn query_rescans_after_an_archetype_is_destroyed_and_its_slot_reused() {
        let world = World::new();
        let e1 = world.create_entity();
        e1.set(Int(1));
        let arch = e1.archetype().unwrap();

        let mut q = world.query();
        q.has::<Int>();
        assert_eq!(q.entity_count(), 1);

        e1.destroy();
        arch.destroy();

        let e2 = world.create_entity();
        e2.set(Float(9.0));

        assert_eq!(q.entity_count(), 0);
        world.destroy();
    }

    #[test]
    fn destroy_matching_removes_every_entity_in_every_matched_archetype() {
        let world = World::new();
        for i in 0..5 {
            let e = world.create_entity();
            e.set(Int(i));
        }
        assert_eq!(world.entity_count(), 5);

        let mut q = world.query();
        q.has::<Int>();
        q.destroy_matching();

        assert_eq!(world.entity_count(), 0);
        world.destroy();
    }

    #[test]
    fn clear_resets_the_filter_to_match_everything() {
        let world = World::new();
        let e = world.create_entity();
        e.set(Int(7));

        let mut q = world.query();
        q.has::<Float>();
        assert_eq!(q.entity_count(), 0);

        q.clear();
        assert_eq!(q.entity_count(), 1);
        let _ = e;
        world.destroy();
    }
}
