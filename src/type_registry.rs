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

//! Dynamic component type-id registry.
//!
//! Assigns a small, dense, monotonically increasing `u32` id to every
//! distinct `TypeId` observed at runtime. Id `0` is reserved so that an
//! unset column-index slot (`0`) is unambiguous; real ids start at 1.

use std::any::TypeId;

use rustc_hash::FxHashMap;

use crate::component::Component;
use crate::entity::Entity;
use crate::world::WorldInner;

/// Describes one interned component type.
pub struct TypeDescriptor {
    pub type_id: TypeId,
    pub name: &'static str,
    pub layout: std::alloc::Layout,
    pub drop_fn: Option<unsafe fn(*mut u8)>,
    /// Writes `T::default()` into an allocated-but-uninitialized slot.
    /// Every archetype row is default-initialized on allocation (§4.5),
    /// so this is never optional the way `drop_fn` is.
    pub default_fn: unsafe fn(*mut u8),
    /// Replays a deferred `Set` for this type: pops the matching boxed
    /// value from the world's pending-value FIFO and applies it. The
    /// event queue only ever records a type id for a deferred Set, so
    /// draining needs this per-type trampoline to recover the concrete
    /// type without the drain loop itself being generic.
    pub replay_set: fn(&mut WorldInner, Entity, u32),
    /// Replays a deferred `Remove` for this type.
    pub replay_remove: fn(&mut WorldInner, Entity, u32),
}

fn replay_set<T: Component>(world: &mut WorldInner, entity: Entity, type_id: u32) {
    if let Some(value) = world.take_pending_set_value::<T>(type_id) {
        world.set_immediate(entity, type_id, value);
    }
}

fn replay_remove<T: Component>(world: &mut WorldInner, entity: Entity, type_id: u32) {
    world.remove_immediate::<T>(entity, type_id);
}

/// Bidirectional `TypeId <-> u32` interning table.
///
/// Never shrinks; `id_of` is idempotent. One registry is owned per
/// [`World`](crate::world::World), matching the "per world is acceptable"
/// clause of the spec.
#[derive(Default)]
pub struct TypeRegistry {
    ids: FxHashMap<TypeId, u32>,
    descriptors: Vec<TypeDescriptor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            ids: FxHashMap::default(),
            descriptors: Vec::new(),
        }
    }

    /// Intern `T`, returning its stable id (allocated starting at 1).
    pub fn id_of<T: Component>(&mut self) -> u32 {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.ids.get(&type_id) {
            return id;
        }

        let id = (self.descriptors.len() + 1) as u32;
        self.descriptors.push(TypeDescriptor {
            type_id,
            name: std::any::type_name::<T>(),
            layout: std::alloc::Layout::new::<T>(),
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(|ptr| unsafe { std::ptr::drop_in_place(ptr as *mut T) })
            } else {
                None
            },
            default_fn: |ptr| unsafe { std::ptr::write(ptr as *mut T, T::default()) },
            replay_set: replay_set::<T>,
            replay_remove: replay_remove::<T>,
        });
        self.ids.insert(type_id, id);
        id
    }

    /// Look up an already-interned id without interning a new type.
    pub fn id_of_type_id(&self, type_id: TypeId) -> Option<u32> {
        self.ids.get(&type_id).copied()
    }

    /// Resolve an id back to its descriptor.
    pub fn type_of(&self, id: u32) -> Option<&TypeDescriptor> {
        if id == 0 {
            return None;
        }
        self.descriptors.get(id as usize - 1)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
