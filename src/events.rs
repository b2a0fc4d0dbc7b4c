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

//! Deferred structural-event FIFO.
//!
//! Grounded on the teacher's `EventQueue`/`EntityEvent` (`event.rs`)
//! and `CommandBuffer` (`command.rs`), merged into the single
//! type-erased-at-the-boundary queue the structural-mutation engine
//! needs: the queue itself only ever carries a type id for a deferred
//! `Set`, with the actual component value boxed into a per-type FIFO
//! so the queue stays homogeneous regardless of how many component
//! types are in play.

use std::any::Any;
use std::collections::VecDeque;

use crate::component::Component;
use crate::entity::{ArchetypeRef, Entity};

pub(crate) enum StructuralEvent {
    Create { entity: Entity, archetype: ArchetypeRef },
    Set { entity: Entity, type_id: u32 },
    Remove { entity: Entity, type_id: u32 },
    Destroy { entity: Entity },
    DestroyArchetype { archetype: ArchetypeRef },
    ResizeBacking { archetype: ArchetypeRef },
}

#[derive(Default)]
pub(crate) struct EventQueue {
    events: VecDeque<StructuralEvent>,
    /// Indexed by `type_id - 1`. Each entry is a FIFO of boxed values
    /// awaiting a deferred `Set` for that type.
    pending_set_values: Vec<VecDeque<Box<dyn Any + Send>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: StructuralEvent) {
        self.events.push_back(event);
    }

    pub fn push_set_value<C: Component>(&mut self, type_id: u32, value: C) {
        let idx = type_id as usize - 1;
        if idx >= self.pending_set_values.len() {
            self.pending_set_values.resize_with(idx + 1, VecDeque::new);
        }
        self.pending_set_values[idx].push_back(Box::new(value));
    }

    /// Pop the next pending value for `type_id`. `None` only if the
    /// queue and the event it was paired with have gotten out of sync
    /// (a `FrameworkInvariant` condition the caller should treat as a
    /// bug, not a user error).
    pub fn pop_set_value<C: Component>(&mut self, type_id: u32) -> Option<C> {
        let idx = type_id as usize - 1;
        let boxed = self.pending_set_values.get_mut(idx)?.pop_front()?;
        boxed.downcast::<C>().ok().map(|b| *b)
    }

    /// Drain every queued event in FIFO order. Pending set values are
    /// consumed lazily by `pop_set_value` as each `Set` event is
    /// replayed, not eagerly here.
    pub fn drain(&mut self) -> VecDeque<StructuralEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, PartialEq, Debug)]
    struct Health(i32);

    #[test]
    fn events_drain_in_fifo_order() {
        let mut q = EventQueue::new();
        let e1 = Entity::new(1, 1, 1);
        let e2 = Entity::new(1, 2, 1);
        q.push(StructuralEvent::Destroy { entity: e1 });
        q.push(StructuralEvent::Destroy { entity: e2 });

        let drained = q.drain();
        assert_eq!(drained.len(), 2);
        assert!(q.is_empty());
    }

    #[test]
    fn pending_set_values_round_trip_per_type() {
        let mut q = EventQueue::new();
        q.push_set_value::<Health>(3, Health(10));
        q.push_set_value::<Health>(3, Health(20));

        assert_eq!(q.pop_set_value::<Health>(3), Some(Health(10)));
        assert_eq!(q.pop_set_value::<Health>(3), Some(Health(20)));
        assert_eq!(q.pop_set_value::<Health>(3), None);
    }
}
