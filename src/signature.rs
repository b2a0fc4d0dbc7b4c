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

//! Canonical, order-insensitive set of component type ids: the identity
//! of an archetype.

use smallvec::SmallVec;
use std::hash::{Hash, Hasher};

/// Inline capacity before a signature spills to the heap. Most
/// archetypes carry a handful of components.
const INLINE_IDS: usize = 8;

/// A sorted-descending set of component type ids.
///
/// Order only matters for canonicalizing the hash; `Signature` has set
/// semantics everywhere else (`contains`, `has_all`, `has_any`,
/// equality).
#[derive(Debug, Clone, Default, Eq)]
pub struct Signature {
    ids: SmallVec<[u32; INLINE_IDS]>,
}

impl Signature {
    pub fn new() -> Self {
        Self { ids: SmallVec::new() }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ids.iter().copied()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    /// Insert `id`, keeping the array sorted descending. Duplicates
    /// collapse (idempotent): walk the array carrying the larger of
    /// (incoming, current) forward, inserting the final carried value
    /// only if it wasn't already present.
    pub fn add(&mut self, id: u32) {
        if self.contains(id) {
            return;
        }

        let mut carry = id;
        for slot in self.ids.iter_mut() {
            if carry > *slot {
                std::mem::swap(&mut carry, slot);
            }
        }
        self.ids.push(carry);
    }

    /// Remove `id` if present, shifting left from the first match.
    pub fn remove(&mut self, id: u32) {
        if let Some(pos) = self.ids.iter().position(|&x| x == id) {
            self.ids.remove(pos);
        }
    }

    /// True iff `self` contains every id in `other`.
    pub fn has_all(&self, other: &Signature) -> bool {
        other.ids.iter().all(|id| self.contains(*id))
    }

    /// True iff `self` contains any id in `other`.
    pub fn has_any(&self, other: &Signature) -> bool {
        other.ids.iter().any(|id| self.contains(*id))
    }

    /// Overwrite `self` with a copy of `other`'s contents (used to reset
    /// the per-world scratch signature without allocating).
    pub fn copy_from(&mut self, other: &Signature) {
        self.ids.clear();
        self.ids.extend_from_slice(&other.ids);
    }

    /// Build an owned signature from an id slice (order-independent).
    pub fn from_ids(ids: &[u32]) -> Self {
        let mut sig = Signature::new();
        for &id in ids {
            sig.add(id);
        }
        sig
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.ids.len() == other.ids.len() && self.ids == other.ids
    }
}

impl Hash for Signature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // h = sum(id[i] * 53^(i+1)), wrapping, per spec 3.
        let mut pow: u64 = 53;
        let mut h: u64 = 0;
        for &id in &self.ids {
            h = h.wrapping_add((id as u64).wrapping_mul(pow));
            pow = pow.wrapping_mul(53);
        }
        state.write_u64(h);
    }
}
