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

//! Entity handles and the generational slot arena backing both the
//! entity and archetype directories.

use std::hash::{Hash, Hasher};

/// Opaque `(world, index, version)` triple identifying an entity.
///
/// Copying is free. Equality compares the full triple; `Hash` is keyed
/// on `index` alone, so stale and current handles for the same slot
/// land in the same bucket and `eq` disambiguates them.
#[derive(Debug, Clone, Copy)]
pub struct Entity {
    pub(crate) world_id: u32,
    pub(crate) index: u32,
    pub(crate) version: u32,
}

impl Entity {
    pub(crate) fn new(world_id: u32, index: u32, version: u32) -> Self {
        Self {
            world_id,
            index,
            version,
        }
    }

    /// A handle that can never resolve: world id 0 is never assigned to
    /// a live world.
    pub fn invalid() -> Self {
        Self {
            world_id: 0,
            index: 0,
            version: 0,
        }
    }

    pub fn world_id(&self) -> u32 {
        self.world_id
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.world_id == other.world_id && self.index == other.index && self.version == other.version
    }
}
impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.index);
    }
}

/// Opaque `(world, index, version)` triple identifying an archetype.
#[derive(Debug, Clone, Copy)]
pub struct ArchetypeRef {
    pub(crate) world_id: u32,
    pub(crate) index: u32,
    pub(crate) version: u32,
}

impl ArchetypeRef {
    pub(crate) fn new(world_id: u32, index: u32, version: u32) -> Self {
        Self {
            world_id,
            index,
            version,
        }
    }

    pub fn world_id(&self) -> u32 {
        self.world_id
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl PartialEq for ArchetypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.world_id == other.world_id && self.index == other.index && self.version == other.version
    }
}
impl Eq for ArchetypeRef {}

impl Hash for ArchetypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.index);
    }
}

/// Where an entity's components currently live.
#[derive(Debug, Clone, Copy)]
pub struct EntityLocation {
    pub archetype_index: u32,
    pub row: u32,
}

/// One slot of the entity directory.
struct EntityRecord {
    version: u32,
    /// `None` for a free slot, or for an entity pre-allocated by a
    /// deferred Create that hasn't landed in an archetype yet.
    location: Option<EntityLocation>,
    alive: bool,
}

const INITIAL_CAPACITY: usize = 1024;

/// Generational entity directory: doubling growth from an initial
/// capacity, FIFO reuse of freed indices, index 0 permanently reserved
/// so the default (invalid) handle never resolves.
pub(crate) struct EntityDirectory {
    records: Vec<EntityRecord>,
    free: std::collections::VecDeque<u32>,
}

impl EntityDirectory {
    pub fn new() -> Self {
        let mut records = Vec::with_capacity(INITIAL_CAPACITY);
        records.push(EntityRecord {
            version: 1,
            location: None,
            alive: false,
        });
        Self {
            records,
            free: std::collections::VecDeque::new(),
        }
    }

    pub fn len_alive(&self) -> usize {
        self.records.iter().filter(|r| r.alive).count()
    }

    /// Allocate a fresh index (reusing a freed one via FIFO if
    /// available), marking it alive with no location yet. Returns
    /// `(index, version)`.
    pub fn allocate(&mut self) -> (u32, u32) {
        if let Some(index) = self.free.pop_front() {
            let rec = &mut self.records[index as usize];
            rec.alive = true;
            rec.location = None;
            (index, rec.version)
        } else {
            let index = self.records.len() as u32;
            self.records.push(EntityRecord {
                version: 1,
                location: None,
                alive: true,
            });
            (index, 1)
        }
    }

    pub fn is_valid(&self, index: u32, version: u32) -> bool {
        match self.records.get(index as usize) {
            Some(rec) => rec.alive && rec.version == version,
            None => false,
        }
    }

    pub fn location(&self, index: u32) -> Option<EntityLocation> {
        self.records.get(index as usize).and_then(|r| r.location)
    }

    pub fn set_location(&mut self, index: u32, location: EntityLocation) {
        if let Some(rec) = self.records.get_mut(index as usize) {
            rec.location = Some(location);
        }
    }

    pub fn clear_location(&mut self, index: u32) {
        if let Some(rec) = self.records.get_mut(index as usize) {
            rec.location = None;
        }
    }

    pub fn set_row(&mut self, index: u32, row: u32) {
        if let Some(rec) = self.records.get_mut(index as usize) {
            if let Some(loc) = rec.location.as_mut() {
                loc.row = row;
            }
        }
    }

    /// Bump the slot's version, mark it dead, and return its index to
    /// the free FIFO.
    pub fn free(&mut self, index: u32) {
        if let Some(rec) = self.records.get_mut(index as usize) {
            if !rec.alive {
                return;
            }
            rec.alive = false;
            rec.location = None;
            rec.version = rec.version.wrapping_add(1).max(1);
            self.free.push_back(index);
        }
    }

    pub fn version_of(&self, index: u32) -> Option<u32> {
        self.records.get(index as usize).map(|r| r.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_zero_is_reserved_and_invalid() {
        let dir = EntityDirectory::new();
        assert!(!dir.is_valid(0, 1));
    }

    #[test]
    fn allocate_then_free_then_reuse_bumps_version() {
        let mut dir = EntityDirectory::new();
        let (idx, v1) = dir.allocate();
        assert!(dir.is_valid(idx, v1));

        dir.free(idx);
        assert!(!dir.is_valid(idx, v1));

        let (idx2, v2) = dir.allocate();
        assert_eq!(idx2, idx, "freed index should be reused via FIFO");
        assert_ne!(v2, v1, "version must change on reuse");
        assert!(dir.is_valid(idx2, v2));
    }

    #[test]
    fn free_list_is_fifo() {
        let mut dir = EntityDirectory::new();
        let (a, _) = dir.allocate();
        let (b, _) = dir.allocate();
        dir.free(a);
        dir.free(b);
        let (first_reused, _) = dir.allocate();
        assert_eq!(first_reused, a);
        let (second_reused, _) = dir.allocate();
        assert_eq!(second_reused, b);
    }

    #[test]
    fn location_round_trips() {
        let mut dir = EntityDirectory::new();
        let (idx, _) = dir.allocate();
        assert!(dir.location(idx).is_none());
        dir.set_location(
            idx,
            EntityLocation {
                archetype_index: 3,
                row: 7,
            },
        );
        let loc = dir.location(idx).unwrap();
        assert_eq!(loc.archetype_index, 3);
        assert_eq!(loc.row, 7);
        dir.set_row(idx, 9);
        assert_eq!(dir.location(idx).unwrap().row, 9);
    }
}
