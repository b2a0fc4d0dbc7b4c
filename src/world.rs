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

//! World: entity/archetype storage and the structural-mutation engine.
//!
//! `World` itself is a thin `{ id }` handle, same shape as `Entity` and
//! `ArchetypeRef`: the real storage (`WorldInner`) lives behind the
//! process-level directory in `id_pool`, so the handle stays `Copy` and
//! cheap while the storage is resolved per call.

use std::any::Any;

use rustc_hash::FxHashMap;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::{Archetype, ArchetypeDirectory};
use crate::callbacks::{ListenerTable, RemoveListener, SetListener};
use crate::column::ErasedColumn;
use crate::component::Component;
use crate::entity::{ArchetypeRef, Entity, EntityDirectory, EntityLocation};
use crate::error::{EcsError, Result};
use crate::events::{EventQueue, StructuralEvent};
use crate::id_pool;
use crate::signature::Signature;
use crate::type_registry::TypeRegistry;

#[derive(Default)]
struct PerTypeState {
    listeners: ListenerTable,
    data: Option<Box<dyn Any + Send>>,
}

/// A world's actual storage. Lives behind `Arc<parking_lot::Mutex<_>>`
/// in the process-level directory (`id_pool`); never touched directly
/// except while that mutex is held.
pub(crate) struct WorldInner {
    id: u32,
    entities: EntityDirectory,
    archetypes: ArchetypeDirectory,
    signature_to_arch: FxHashMap<Signature, u32>,
    structure_counter: u64,
    type_registry: TypeRegistry,
    per_type: Vec<PerTypeState>,
    events: EventQueue,
    deferral_depth: u32,
    entity_count: usize,
    scratch_signature: Signature,
    dropped_deferred_events: u64,
}

impl WorldInner {
    fn new() -> Self {
        Self {
            id: 0,
            entities: EntityDirectory::new(),
            archetypes: ArchetypeDirectory::new(),
            signature_to_arch: FxHashMap::default(),
            structure_counter: 0,
            type_registry: TypeRegistry::new(),
            per_type: Vec::new(),
            events: EventQueue::new(),
            deferral_depth: 0,
            entity_count: 0,
            scratch_signature: Signature::new(),
            dropped_deferred_events: 0,
        }
    }

    fn ensure_per_type(&mut self, type_id: u32) {
        let idx = type_id as usize - 1;
        if idx >= self.per_type.len() {
            self.per_type.resize_with(idx + 1, PerTypeState::default);
        }
    }

    fn listeners_mut(&mut self, type_id: u32) -> &mut ListenerTable {
        self.ensure_per_type(type_id);
        &mut self.per_type[type_id as usize - 1].listeners
    }

    /// Resolve `signature` to a live archetype index, building a fresh
    /// table (with a freshly owned copy of the signature) on miss.
    fn ensure_archetype(&mut self, signature: &Signature) -> u32 {
        if let Some(&idx) = self.signature_to_arch.get(signature) {
            return idx;
        }
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.create_archetype", components = signature.len()).entered();
        let owned_sig = signature.clone();
        let mut columns = Vec::with_capacity(owned_sig.len());
        for type_id in owned_sig.iter() {
            let desc = self
                .type_registry
                .type_of(type_id)
                .expect("signature references an interned type: FrameworkInvariant");
            columns.push(ErasedColumn::from_descriptor(desc.layout.size(), desc.drop_fn));
        }
        let table = Archetype::new(owned_sig.clone(), columns);
        let (idx, _version) = self.archetypes.insert(table);
        self.signature_to_arch.insert(owned_sig, idx);
        self.structure_counter = self.structure_counter.wrapping_add(1);
        idx
    }

    fn empty_archetype(&mut self) -> u32 {
        let empty = Signature::new();
        self.ensure_archetype(&empty)
    }

    /// Attach a pre-allocated entity index to `archetype_index`'s table,
    /// default-initializing every one of its columns.
    fn attach_entity(&mut self, index: u32, archetype_index: u32) {
        let row = {
            let arch = self
                .archetypes
                .get_mut(archetype_index)
                .expect("target archetype must be live: FrameworkInvariant");
            arch.allocate_row(index)
        };
        let col_ids: Vec<u32> = self
            .archetypes
            .get(archetype_index)
            .expect("target archetype must be live: FrameworkInvariant")
            .column_ids()
            .to_vec();
        for type_id in col_ids {
            let default_fn = self
                .type_registry
                .type_of(type_id)
                .expect("interned type: FrameworkInvariant")
                .default_fn;
            let arch = self.archetypes.get_mut(archetype_index).unwrap();
            let col = arch.column_for_mut(type_id).expect("column must exist: FrameworkInvariant");
            unsafe { col.write_default(row, default_fn) };
        }
        self.entities.set_location(
            index,
            EntityLocation {
                archetype_index,
                row: row as u32,
            },
        );
        self.entity_count += 1;
    }

    fn create_entity_in(&mut self, archetype_index: u32) -> Entity {
        let (index, version) = self.entities.allocate();
        let entity = Entity::new(self.id, index, version);
        if self.deferral_depth > 0 {
            let arch_version = self.archetypes.version_of(archetype_index).unwrap_or(0);
            self.events.push(StructuralEvent::Create {
                entity,
                archetype: ArchetypeRef::new(self.id, archetype_index, arch_version),
            });
        } else {
            self.attach_entity(index, archetype_index);
        }
        entity
    }

    /// Move a row from one archetype to another, fixing up both
    /// directories. Mirrors the teacher's `split_at_mut`-based
    /// `move_entity`. Uses `swap_remove_row_migrated`, not
    /// `swap_remove_row`, to remove the source row: a column shared
    /// with `new_arch` already holds a bitwise copy of this row's value
    /// after `copy_row_into`, so dropping it in the source too would
    /// double-free/use-after-free any component with drop glue (e.g.
    /// `String`) — only a column the destination does not carry (a
    /// Remove migration's removed component) is actually dropped here.
    fn migrate_row(&mut self, index: u32, old_arch_index: u32, old_row: usize, new_arch_index: u32) -> usize {
        let (old_arch, new_arch) = self.archetypes.get2_mut(old_arch_index, new_arch_index);
        let new_row = old_arch.copy_row_into(old_row, index, new_arch);
        if let Some(swapped_index) = old_arch.swap_remove_row_migrated(old_row, new_arch) {
            self.entities.set_row(swapped_index, old_row as u32);
        }
        self.entities.set_location(
            index,
            EntityLocation {
                archetype_index: new_arch_index,
                row: new_row as u32,
            },
        );
        new_row
    }

    pub(crate) fn set<C: Component>(&mut self, entity: Entity, value: C) {
        if !self.entities.is_valid(entity.index(), entity.version()) {
            return;
        }
        let type_id = self.type_registry.id_of::<C>();
        if self.deferral_depth > 0 {
            self.events.push_set_value(type_id, value);
            self.events.push(StructuralEvent::Set { entity, type_id });
            return;
        }
        self.set_immediate(entity, type_id, value);
    }

    pub(crate) fn set_immediate<C: Component>(&mut self, entity: Entity, type_id: u32, value: C) {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.set", type_id).entered();
        let loc = self
            .entities
            .location(entity.index())
            .expect("valid entity must have a location: FrameworkInvariant");
        let has_type = self.archetypes.get(loc.archetype_index).unwrap().has(type_id);

        if has_type {
            let row = loc.row as usize;
            let old = {
                let arch = self.archetypes.get_mut(loc.archetype_index).unwrap();
                let col = arch.column_for_mut(type_id).unwrap();
                std::mem::replace(col.get_mut::<C>(row).unwrap(), value)
            };
            if self.listeners_mut(type_id).has_set_listener() {
                let new_ptr = {
                    let arch = self.archetypes.get_mut(loc.archetype_index).unwrap();
                    arch.column_for_mut(type_id).unwrap().get_mut::<C>(row).unwrap() as *mut C as *mut u8
                };
                unsafe {
                    self.listeners_mut(type_id)
                        .invoke_set(entity, &old as *const C as *const u8, new_ptr);
                }
            }
            return;
        }

        let old_arch_index = loc.archetype_index;
        let old_row = loc.row as usize;
        self.scratch_signature
            .copy_from(self.archetypes.get(old_arch_index).unwrap().signature());
        self.scratch_signature.add(type_id);
        let new_signature = self.scratch_signature.clone();
        let new_arch_index = self.ensure_archetype(&new_signature);

        let new_row = self.migrate_row(entity.index(), old_arch_index, old_row, new_arch_index);
        {
            let arch = self.archetypes.get_mut(new_arch_index).unwrap();
            unsafe { arch.column_for_mut(type_id).unwrap().write(new_row, value) };
        }

        if self.listeners_mut(type_id).has_set_listener() {
            let old_default = C::default();
            let new_ptr = {
                let arch = self.archetypes.get_mut(new_arch_index).unwrap();
                arch.column_for_mut(type_id).unwrap().get_mut::<C>(new_row).unwrap() as *mut C as *mut u8
            };
            unsafe {
                self.listeners_mut(type_id)
                    .invoke_set(entity, &old_default as *const C as *const u8, new_ptr);
            }
        }
    }

    pub(crate) fn take_pending_set_value<C: Component>(&mut self, type_id: u32) -> Option<C> {
        self.events.pop_set_value::<C>(type_id)
    }

    pub(crate) fn remove<C: Component>(&mut self, entity: Entity) {
        if !self.entities.is_valid(entity.index(), entity.version()) {
            return;
        }
        let type_id = match self.type_registry.id_of_type_id(std::any::TypeId::of::<C>()) {
            Some(id) => id,
            None => return,
        };
        if self.deferral_depth > 0 {
            self.events.push(StructuralEvent::Remove { entity, type_id });
            return;
        }
        self.remove_immediate::<C>(entity, type_id);
    }

    pub(crate) fn remove_immediate<C: Component>(&mut self, entity: Entity, type_id: u32) {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.remove", type_id).entered();
        let loc = self
            .entities
            .location(entity.index())
            .expect("valid entity must have a location: FrameworkInvariant");
        let old_arch_index = loc.archetype_index;
        if !self.archetypes.get(old_arch_index).unwrap().has(type_id) {
            return;
        }
        let old_row = loc.row as usize;

        if self.listeners_mut(type_id).has_remove_listener() {
            let old_ptr = {
                let arch = self.archetypes.get(old_arch_index).unwrap();
                arch.column_for(type_id).unwrap().get::<C>(old_row).unwrap() as *const C as *const u8
            };
            unsafe {
                self.listeners_mut(type_id).invoke_remove(entity, old_ptr);
            }
        }

        self.scratch_signature
            .copy_from(self.archetypes.get(old_arch_index).unwrap().signature());
        self.scratch_signature.remove(type_id);
        let new_signature = self.scratch_signature.clone();
        let new_arch_index = self.ensure_archetype(&new_signature);

        self.migrate_row(entity.index(), old_arch_index, old_row, new_arch_index);
    }

    pub(crate) fn destroy(&mut self, entity: Entity) {
        if !self.entities.is_valid(entity.index(), entity.version()) {
            return;
        }
        if self.deferral_depth > 0 {
            self.events.push(StructuralEvent::Destroy { entity });
            return;
        }
        self.destroy_immediate(entity);
    }

    fn destroy_immediate(&mut self, entity: Entity) {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.destroy").entered();
        let loc = match self.entities.location(entity.index()) {
            Some(l) => l,
            None => return,
        };
        let arch_index = loc.archetype_index;
        let row = loc.row as usize;

        let col_ids: Vec<u32> = self.archetypes.get(arch_index).unwrap().column_ids().to_vec();
        for type_id in col_ids {
            if self.listeners_mut(type_id).has_remove_listener() {
                let ptr = {
                    let arch = self.archetypes.get(arch_index).unwrap();
                    arch.column_for(type_id).unwrap().raw_ptr(row)
                };
                unsafe {
                    self.listeners_mut(type_id).invoke_remove(entity, ptr);
                }
            }
        }

        let swapped = self.archetypes.get_mut(arch_index).unwrap().swap_remove_row(row);
        if let Some(swapped_index) = swapped {
            self.entities.set_row(swapped_index, row as u32);
        }
        self.entities.clear_location(entity.index());
        self.entities.free(entity.index());
        self.entity_count -= 1;
    }

    pub(crate) fn destroy_archetype(&mut self, archetype: ArchetypeRef) {
        if self.archetypes.version_of(archetype.index()) != Some(archetype.version()) {
            return;
        }
        if self.deferral_depth > 0 {
            self.events.push(StructuralEvent::DestroyArchetype { archetype });
            return;
        }
        self.destroy_archetype_immediate(archetype.index());
    }

    fn destroy_archetype_immediate(&mut self, archetype_index: u32) {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.destroy_archetype", archetype_index).entered();
        let (signature, entity_indices, col_ids) = {
            let arch = self.archetypes.get(archetype_index).unwrap();
            (arch.signature().clone(), arch.entities().to_vec(), arch.column_ids().to_vec())
        };

        for type_id in &col_ids {
            if self.listeners_mut(*type_id).has_remove_listener() {
                for (row, &entity_index) in entity_indices.iter().enumerate() {
                    let version = self.entities.version_of(entity_index).unwrap_or(0);
                    let entity = Entity::new(self.id, entity_index, version);
                    let ptr = {
                        let arch = self.archetypes.get(archetype_index).unwrap();
                        arch.column_for(*type_id).unwrap().raw_ptr(row)
                    };
                    unsafe {
                        self.listeners_mut(*type_id).invoke_remove(entity, ptr);
                    }
                }
            }
        }

        self.entity_count -= entity_indices.len();
        self.signature_to_arch.remove(&signature);
        for entity_index in entity_indices {
            self.entities.clear_location(entity_index);
            self.entities.free(entity_index);
        }
        self.archetypes.remove(archetype_index);
        self.structure_counter = self.structure_counter.wrapping_add(1);
    }

    pub(crate) fn resize_backing(&mut self, archetype: ArchetypeRef) {
        if self.archetypes.version_of(archetype.index()) != Some(archetype.version()) {
            return;
        }
        if self.deferral_depth > 0 {
            self.events.push(StructuralEvent::ResizeBacking { archetype });
            return;
        }
        if let Some(arch) = self.archetypes.get_mut(archetype.index()) {
            arch.resize_backing();
        }
    }

    pub(crate) fn structure_counter(&self) -> u64 {
        self.structure_counter
    }

    /// Upper bound for a full archetype scan (`arch_terminator` in §4.6):
    /// every slot index in `0..archetype_slot_count()` is either a live
    /// table or a freed (skippable) slot.
    pub(crate) fn archetype_slot_count(&self) -> usize {
        self.archetypes.len()
    }

    pub(crate) fn archetype_signature(&self, index: u32) -> Option<&Signature> {
        self.archetypes.get(index).map(|a| a.signature())
    }

    pub(crate) fn archetype_row_count(&self, index: u32) -> usize {
        self.archetypes.get(index).map(|a| a.count()).unwrap_or(0)
    }

    pub(crate) fn archetype_version(&self, index: u32) -> Option<u32> {
        self.archetypes.version_of(index)
    }

    pub(crate) fn intern<C: Component>(&mut self) -> u32 {
        self.type_registry.id_of::<C>()
    }

    /// Snapshot of an archetype's entity handles, row-aligned, for
    /// component-free iteration ([`crate::query::Query::for_each_entities`]).
    pub(crate) fn archetype_entities_snapshot(&self, index: u32) -> Option<Vec<Entity>> {
        let indices: Vec<u32> = self.archetypes.get(index)?.entities().to_vec();
        Some(
            indices
                .into_iter()
                .map(|idx| Entity::new(self.id, idx, self.entities.version_of(idx).unwrap_or(0)))
                .collect(),
        )
    }

    /// Resolve a column for iteration: a snapshot of the archetype's
    /// entity ids (row-aligned) plus a raw pointer/len into the typed
    /// component array. Grabbed once per archetype per the query engine's
    /// column-binding contract (§4.6); the pointer stays valid for the
    /// rest of the query's iteration step because no structural mutation
    /// can land on this archetype while deferral is active.
    pub(crate) fn archetype_iter_column<C: Component>(&mut self, index: u32, type_id: u32) -> Option<(Vec<Entity>, *mut C, usize)> {
        let version_entities: Vec<u32> = self.archetypes.get(index)?.entities().to_vec();
        let entities: Vec<Entity> = version_entities
            .iter()
            .map(|&idx| Entity::new(self.id, idx, self.entities.version_of(idx).unwrap_or(0)))
            .collect();
        let arch = self.archetypes.get_mut(index)?;
        let len = arch.count();
        let col = arch.column_for_mut(type_id)?;
        let ptr = col.as_mut_slice::<C>().as_mut_ptr();
        Some((entities, ptr, len))
    }

    fn begin_defer(&mut self) {
        self.deferral_depth += 1;
    }

    fn end_defer(&mut self) {
        debug_assert!(self.deferral_depth > 0, "unbalanced deferral toggle: FrameworkInvariant");
        self.deferral_depth -= 1;
        if self.deferral_depth == 0 {
            self.drain_events();
        }
    }

    fn drain_events(&mut self) {
        let events = self.events.drain();
        for event in events {
            match event {
                StructuralEvent::Create { entity, archetype } => {
                    if self.archetypes.version_of(archetype.index()) == Some(archetype.version()) {
                        self.attach_entity(entity.index(), archetype.index());
                    } else {
                        self.entities.free(entity.index());
                        self.dropped_deferred_events += 1;
                    }
                }
                StructuralEvent::Set { entity, type_id } => {
                    if self.entities.is_valid(entity.index(), entity.version()) {
                        let replay = self
                            .type_registry
                            .type_of(type_id)
                            .expect("interned type: FrameworkInvariant")
                            .replay_set;
                        replay(self, entity, type_id);
                    } else {
                        // Drop the paired pending value so a later Set for
                        // the same type doesn't read a stale one.
                        let _ = self.events.pop_set_value::<DroppedPlaceholder>(type_id);
                        self.dropped_deferred_events += 1;
                    }
                }
                StructuralEvent::Remove { entity, type_id } => {
                    let replay = self
                        .type_registry
                        .type_of(type_id)
                        .expect("interned type: FrameworkInvariant")
                        .replay_remove;
                    replay(self, entity, type_id);
                }
                StructuralEvent::Destroy { entity } => {
                    self.destroy_immediate(entity);
                }
                StructuralEvent::DestroyArchetype { archetype } => {
                    if self.archetypes.version_of(archetype.index()) == Some(archetype.version()) {
                        self.destroy_archetype_immediate(archetype.index());
                    }
                }
                StructuralEvent::ResizeBacking { archetype } => {
                    if self.archetypes.version_of(archetype.index()) == Some(archetype.version()) {
                        if let Some(arch) = self.archetypes.get_mut(archetype.index()) {
                            arch.resize_backing();
                        }
                    }
                }
            }
        }
    }
}

/// Never constructed; only used to satisfy `pop_set_value`'s generic
/// parameter when discarding a stale pending value whose real type we
/// deliberately aren't naming. `pop_set_value` only downcasts the boxed
/// value, it never reads through this type, so its layout is irrelevant
/// as long as the call is reached only on the discard path.
struct DroppedPlaceholder;
impl Default for DroppedPlaceholder {
    fn default() -> Self {
        DroppedPlaceholder
    }
}

/// Opaque, cheap-to-copy handle to a world's storage. Mirrors `Entity`
/// and `ArchetypeRef`: the real state lives in the process-level
/// directory (`id_pool`), resolved by `id` on every call.
#[derive(Debug, Clone, Copy)]
pub struct World {
    id: u32,
}

impl World {
    pub fn new() -> Self {
        let inner = WorldInner::new();
        let (id, arc) = id_pool::register_world(inner);
        arc.lock().id = id;
        World { id }
    }

    /// Resolve this world's shared state and run `f` against it while
    /// holding its `parking_lot::Mutex` guard. The guard is non-reentrant:
    /// `f` (and anything it calls, including a set/remove listener invoked
    /// from inside a structural operation) must not call back into this
    /// same world through a captured `Entity`/`World` handle, or the lock
    /// attempt deadlocks rather than panics.
    pub(crate) fn with_inner<R>(&self, f: impl FnOnce(&mut WorldInner) -> R) -> Option<R> {
        let arc = id_pool::resolve_world(self.id)?;
        let mut guard = arc.lock();
        Some(f(&mut guard))
    }

    pub fn is_alive(&self) -> bool {
        id_pool::resolve_world(self.id).is_some()
    }

    pub fn entity_count(&self) -> usize {
        self.with_inner(|w| w.entity_count).unwrap_or(0)
    }

    pub fn dropped_deferred_events(&self) -> u64 {
        self.with_inner(|w| w.dropped_deferred_events).unwrap_or(0)
    }

    /// Create an entity with no components, in the world's empty
    /// archetype. Use `.set::<C>(value)` to attach components.
    pub fn create_entity(&self) -> Entity {
        self.with_inner(|w| {
            #[cfg(feature = "profiling")]
            let _span = info_span!("world.create_entity").entered();
            let archetype_index = w.empty_archetype();
            w.create_entity_in(archetype_index)
        })
        .unwrap_or_else(Entity::invalid)
    }

    /// Reference-counted deferral toggle (§6): structural operations
    /// performed while any toggle is active are queued and replayed in
    /// order once the last toggle is released.
    pub fn cache_structural_events(&self, enabled: bool) {
        self.with_inner(|w| {
            if enabled {
                w.begin_defer();
            } else {
                w.end_defer();
            }
        });
    }

    /// Register a listener invoked every time a `C` value is set (both the
    /// overwrite-existing and the Set-upgrade-migration cases).
    ///
    /// The listener runs while this world's mutex guard is held (see
    /// [`World::with_inner`]): it must not perform another structural
    /// operation (`set`/`remove`/`destroy`/query iteration, ...) through a
    /// captured `Entity` or `World` handle on this same world, since the
    /// guard is non-reentrant and such a call would deadlock rather than
    /// panic or queue.
    pub fn on_set<C: Component>(&self, listener: SetListener<C>) {
        self.with_inner(|w| {
            let type_id = w.type_registry.id_of::<C>();
            w.listeners_mut(type_id).add_set(listener);
        });
    }

    /// Register a listener invoked every time a `C` value is removed (by
    /// `remove`, by `destroy`, or by an archetype/world teardown).
    ///
    /// Same re-entrancy restriction as [`World::on_set`]: the listener runs
    /// under this world's mutex guard and must not call back into this
    /// world via a captured handle.
    pub fn on_remove<C: Component>(&self, listener: RemoveListener<C>) {
        self.with_inner(|w| {
            let type_id = w.type_registry.id_of::<C>();
            w.listeners_mut(type_id).add_remove(listener);
        });
    }

    /// Store a world-scoped singleton value of type `C` (the optional
    /// `data` slot of the per-type world state).
    pub fn set_resource<C: Component>(&self, value: C) {
        self.with_inner(|w| {
            let type_id = w.type_registry.id_of::<C>();
            w.ensure_per_type(type_id);
            w.per_type[type_id as usize - 1].data = Some(Box::new(value));
        });
    }

    pub fn resource<C: Component, R>(&self, f: impl FnOnce(&C) -> R) -> Option<R> {
        self.with_inner(|w| {
            let type_id = w.type_registry.id_of::<C>();
            w.ensure_per_type(type_id);
            w.per_type[type_id as usize - 1]
                .data
                .as_ref()
                .and_then(|b| b.downcast_ref::<C>())
                .map(f)
        })
        .flatten()
    }

    pub fn resource_mut<C: Component, R>(&self, f: impl FnOnce(&mut C) -> R) -> Option<R> {
        self.with_inner(|w| {
            let type_id = w.type_registry.id_of::<C>();
            w.ensure_per_type(type_id);
            w.per_type[type_id as usize - 1]
                .data
                .as_mut()
                .and_then(|b| b.downcast_mut::<C>())
                .map(f)
        })
        .flatten()
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    /// Tear the world down: every entity is invalidated and every
    /// archetype dropped (remove listeners fire in row order first),
    /// then the world id is released back to the process pool. Any
    /// handle still carrying this `id` becomes permanently unresolvable.
    pub fn destroy(&self) {
        let arc = match id_pool::resolve_world(self.id) {
            Some(arc) => arc,
            None => return,
        };
        {
            let mut inner = arc.lock();
            let archetype_indices: Vec<u32> = inner.archetypes.iter().map(|(idx, _)| idx).collect();
            for idx in archetype_indices {
                inner.destroy_archetype_immediate(idx);
            }
        }
        id_pool::release_world(self.id);
    }
}

impl Default for World {
    fn default() -> Self {
        World::new()
    }
}

impl Entity {
    pub fn is_valid(&self) -> bool {
        World { id: self.world_id() }
            .with_inner(|w| w.entities.is_valid(self.index(), self.version()))
            .unwrap_or(false)
    }

    pub fn has<C: Component>(&self) -> bool {
        World { id: self.world_id() }
            .with_inner(|w| {
                let loc = match w.entities.location(self.index()) {
                    Some(l) if w.entities.is_valid(self.index(), self.version()) => l,
                    _ => return false,
                };
                let type_id = match w.type_registry.id_of_type_id(std::any::TypeId::of::<C>()) {
                    Some(id) => id,
                    None => return false,
                };
                w.archetypes.get(loc.archetype_index).map(|a| a.has(type_id)).unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Run `f` against a mutable reference to this entity's component,
    /// entirely inside the world's lock (handles cannot hand out
    /// references that outlive the lock guard). Fails with
    /// `InvalidHandle`/`MissingComponent` per §6.
    pub fn get<C: Component, R>(&self, f: impl FnOnce(&mut C) -> R) -> Result<R> {
        World { id: self.world_id() }
            .with_inner(|w| {
                if !w.entities.is_valid(self.index(), self.version()) {
                    return Err(EcsError::InvalidHandle);
                }
                let loc = w.entities.location(self.index()).expect("valid entity must have a location: FrameworkInvariant");
                let type_id = w
                    .type_registry
                    .id_of_type_id(std::any::TypeId::of::<C>())
                    .ok_or(EcsError::MissingComponent)?;
                let arch = w.archetypes.get_mut(loc.archetype_index).expect("archetype must be live: FrameworkInvariant");
                let col = arch.column_for_mut(type_id).ok_or(EcsError::MissingComponent)?;
                let value = col.get_mut::<C>(loc.row as usize).ok_or(EcsError::MissingComponent)?;
                Ok(f(value))
            })
            .unwrap_or(Err(EcsError::WorldNotFound))
    }

    /// Non-failing snapshot read: `(true, clone)` if present, else
    /// `(false, C::default())`.
    pub fn try_get<C: Component + Clone>(&self) -> (bool, C) {
        match self.get::<C, C>(|c| c.clone()) {
            Ok(v) => (true, v),
            Err(_) => (false, C::default()),
        }
    }

    pub fn set<C: Component>(&self, value: C) {
        World { id: self.world_id() }.with_inner(|w| w.set(*self, value));
    }

    pub fn remove<C: Component>(&self) {
        World { id: self.world_id() }.with_inner(|w| w.remove::<C>(*self));
    }

    pub fn destroy(&self) {
        World { id: self.world_id() }.with_inner(|w| w.destroy(*self));
    }

    pub fn archetype(&self) -> Result<ArchetypeRef> {
        World { id: self.world_id() }
            .with_inner(|w| {
                if !w.entities.is_valid(self.index(), self.version()) {
                    return Err(EcsError::InvalidHandle);
                }
                let loc = w.entities.location(self.index()).expect("valid entity must have a location: FrameworkInvariant");
                let version = w.archetypes.version_of(loc.archetype_index).unwrap_or(0);
                Ok(ArchetypeRef::new(self.world_id(), loc.archetype_index, version))
            })
            .unwrap_or(Err(EcsError::WorldNotFound))
    }

    pub fn component_count(&self) -> usize {
        World { id: self.world_id() }
            .with_inner(|w| {
                let loc = match w.entities.location(self.index()) {
                    Some(l) => l,
                    None => return 0,
                };
                w.archetypes.get(loc.archetype_index).map(|a| a.column_ids().len()).unwrap_or(0)
            })
            .unwrap_or(0)
    }
}

impl ArchetypeRef {
    pub fn is_valid(&self) -> bool {
        World { id: self.world_id() }
            .with_inner(|w| w.archetypes.version_of(self.index()) == Some(self.version()))
            .unwrap_or(false)
    }

    pub fn entity_count(&self) -> usize {
        self.with_table(|a| a.count()).unwrap_or(0)
    }

    fn with_table<R>(&self, f: impl FnOnce(&Archetype) -> R) -> Option<R> {
        World { id: self.world_id() }.with_inner(|w| {
            if w.archetypes.version_of(self.index()) != Some(self.version()) {
                return None;
            }
            w.archetypes.get(self.index()).map(f)
        })?
    }

    pub fn create_entity(&self) -> Entity {
        World { id: self.world_id() }
            .with_inner(|w| {
                if w.archetypes.version_of(self.index()) != Some(self.version()) {
                    return Entity::invalid();
                }
                w.create_entity_in(self.index())
            })
            .unwrap_or_else(Entity::invalid)
    }

    pub fn destroy(&self) {
        World { id: self.world_id() }.with_inner(|w| w.destroy_archetype(*self));
    }

    pub fn get_types(&self) -> Vec<u32> {
        self.with_table(|a| a.column_ids().to_vec()).unwrap_or_default()
    }

    pub fn get_entities(&self) -> Vec<Entity> {
        let world_id = self.world_id();
        World { id: world_id }
            .with_inner(|w| {
                if w.archetypes.version_of(self.index()) != Some(self.version()) {
                    return Vec::new();
                }
                let arch = w.archetypes.get(self.index()).unwrap();
                arch.entities()
                    .iter()
                    .map(|&idx| Entity::new(world_id, idx, w.entities.version_of(idx).unwrap_or(0)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn try_get_entity_buffer(&self) -> Option<Vec<Entity>> {
        let buf = self.get_entities();
        if buf.is_empty() && !self.is_valid() {
            None
        } else {
            Some(buf)
        }
    }

    pub fn try_get_component_buffer<C: Component + Clone>(&self) -> Option<Vec<C>> {
        World { id: self.world_id() }.with_inner(|w| {
            if w.archetypes.version_of(self.index()) != Some(self.version()) {
                return None;
            }
            let type_id = w.type_registry.id_of_type_id(std::any::TypeId::of::<C>())?;
            let arch = w.archetypes.get(self.index())?;
            let col = arch.column_for(type_id)?;
            Some(col.as_slice::<C>().to_vec())
        })?
    }

    pub fn resize_backing_arrays(&self) {
        World { id: self.world_id() }.with_inner(|w| w.resize_backing(*self));
    }
}
