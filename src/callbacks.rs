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

//! Per-component-type `on_set`/`on_remove` listener lists.
//!
//! Grounded on the teacher's `ObserverRegistry` (one registry, a `Vec`
//! of boxed handlers, `register`/event-broadcast shape), narrowed to
//! component-type granularity and to the two structural events this
//! crate actually fires. Listener closures accept three shapes for
//! `on_set` and two for `on_remove`; every shape is adapted to one
//! canonical closure at registration time, so the per-type storage
//! itself only ever deals with one signature per event kind and the
//! hot path never boxes or dispatches through a shape enum.

use std::any::Any;

use crate::component::Component;
use crate::entity::Entity;

/// The three shapes `World::on_set` accepts.
pub enum SetListener<C: Component> {
    /// `|new| { .. }`
    ComponentOnly(Box<dyn FnMut(&mut C) + Send>),
    /// `|entity, new| { .. }`
    EntityAndComponent(Box<dyn FnMut(Entity, &mut C) + Send>),
    /// `|entity, old, new| { .. }`
    Full(Box<dyn FnMut(Entity, &C, &mut C) + Send>),
}

/// The two shapes `World::on_remove` accepts.
pub enum RemoveListener<C: Component> {
    /// `|old| { .. }`
    ComponentOnly(Box<dyn FnMut(&C) + Send>),
    /// `|entity, old| { .. }`
    EntityAndComponent(Box<dyn FnMut(Entity, &C) + Send>),
}

type CanonicalSet<C> = Box<dyn FnMut(Entity, &C, &mut C) + Send>;
type CanonicalRemove<C> = Box<dyn FnMut(Entity, &C) + Send>;

fn canonicalize_set<C: Component>(listener: SetListener<C>) -> CanonicalSet<C> {
    match listener {
        SetListener::ComponentOnly(mut f) => Box::new(move |_entity, _old, new| f(new)),
        SetListener::EntityAndComponent(mut f) => Box::new(move |entity, _old, new| f(entity, new)),
        SetListener::Full(f) => f,
    }
}

fn canonicalize_remove<C: Component>(listener: RemoveListener<C>) -> CanonicalRemove<C> {
    match listener {
        RemoveListener::ComponentOnly(mut f) => Box::new(move |_entity, old| f(old)),
        RemoveListener::EntityAndComponent(f) => f,
    }
}

struct SetEntry {
    handler: Box<dyn Any + Send>,
    call: unsafe fn(&mut (dyn Any + Send), Entity, *const u8, *mut u8),
}

struct RemoveEntry {
    handler: Box<dyn Any + Send>,
    call: unsafe fn(&mut (dyn Any + Send), Entity, *const u8),
}

unsafe fn call_set<C: Component>(handler: &mut (dyn Any + Send), entity: Entity, old: *const u8, new: *mut u8) {
    let f = handler
        .downcast_mut::<CanonicalSet<C>>()
        .expect("set listener type mismatch: FrameworkInvariant");
    f(entity, &*(old as *const C), &mut *(new as *mut C));
}

unsafe fn call_remove<C: Component>(handler: &mut (dyn Any + Send), entity: Entity, old: *const u8) {
    let f = handler
        .downcast_mut::<CanonicalRemove<C>>()
        .expect("remove listener type mismatch: FrameworkInvariant");
    f(entity, &*(old as *const C));
}

/// Listener lists for one component type. Stored inside the world's
/// per-type state (one `ListenerTable` per interned type id), never
/// generic itself so it can live in a flat `Vec` indexed by type id.
#[derive(Default)]
pub(crate) struct ListenerTable {
    set: Vec<SetEntry>,
    remove: Vec<RemoveEntry>,
}

impl ListenerTable {
    pub fn has_set_listener(&self) -> bool {
        !self.set.is_empty()
    }

    pub fn has_remove_listener(&self) -> bool {
        !self.remove.is_empty()
    }

    pub fn add_set<C: Component>(&mut self, listener: SetListener<C>) {
        self.set.push(SetEntry {
            handler: Box::new(canonicalize_set(listener)),
            call: call_set::<C>,
        });
    }

    pub fn add_remove<C: Component>(&mut self, listener: RemoveListener<C>) {
        self.remove.push(RemoveEntry {
            handler: Box::new(canonicalize_remove(listener)),
            call: call_remove::<C>,
        });
    }

    pub fn clear_set(&mut self) {
        self.set.clear();
    }

    pub fn clear_remove(&mut self) {
        self.remove.clear();
    }

    /// Invoke every set listener with the post-mutation column slot.
    /// `old` points at a value of the same type (either the previous
    /// cell, or a scratch default for an upgrade); `new` points at the
    /// live column cell.
    ///
    /// # Safety
    /// `old` and `new` must point at initialized values of the
    /// component type this table was registered for.
    pub unsafe fn invoke_set(&mut self, entity: Entity, old: *const u8, new: *mut u8) {
        for entry in &mut self.set {
            (entry.call)(entry.handler.as_mut(), entity, old, new);
        }
    }

    /// Invoke every remove listener with the pre-mutation value.
    ///
    /// # Safety
    /// `old` must point at an initialized value of the component type
    /// this table was registered for.
    pub unsafe fn invoke_remove(&mut self, entity: Entity, old: *const u8) {
        for entry in &mut self.remove {
            (entry.call)(entry.handler.as_mut(), entity, old);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Health(i32);

    #[test]
    fn empty_table_reports_no_listener() {
        let table = ListenerTable::default();
        assert!(!table.has_set_listener());
        assert!(!table.has_remove_listener());
    }

    #[test]
    fn set_listener_shapes_all_observe_the_new_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut table = ListenerTable::default();
        let s = seen.clone();
        table.add_set::<Health>(SetListener::ComponentOnly(Box::new(move |new: &mut Health| {
            s.lock().unwrap().push(new.0);
        })));

        let mut old = Health(0);
        let mut new = Health(7);
        unsafe {
            table.invoke_set(
                Entity::invalid(),
                &old as *const Health as *const u8,
                &mut new as *mut Health as *mut u8,
            );
        }
        let _ = &mut old;
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn remove_listener_observes_old_value() {
        let seen = Arc::new(Mutex::new(None));
        let mut table = ListenerTable::default();
        let s = seen.clone();
        table.add_remove::<Health>(RemoveListener::ComponentOnly(Box::new(move |old: &Health| {
            *s.lock().unwrap() = Some(old.0);
        })));

        let old = Health(42);
        unsafe {
            table.invoke_remove(Entity::invalid(), &old as *const Health as *const u8);
        }
        assert_eq!(*seen.lock().unwrap(), Some(42));
    }
}
