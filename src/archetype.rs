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

//! Archetype storage: one columnar table per distinct component
//! signature, with an in-table open-addressed hash for O(1) expected
//! column lookup by type id.

use crate::column::ErasedColumn;
use crate::signature::Signature;

/// One slot of the archetype's column-index hash table.
#[derive(Clone, Copy)]
struct ColumnSlot {
    /// `0` means empty (type ids are allocated starting at 1).
    type_id: u32,
    /// Index of the next slot in this id's collision chain, or `-1`.
    next: i32,
    /// Index into `Archetype::columns`.
    col_idx: usize,
}

const EMPTY_SLOT: ColumnSlot = ColumnSlot {
    type_id: 0,
    next: -1,
    col_idx: 0,
};

/// Closed-address hash table mapping `type_id -> column index`, built
/// once per archetype (§4.3): a two-pass fill places each id at
/// `id mod size` where possible, then threads the rest onto collision
/// chains inside the same fixed-size array.
struct ColumnIndex {
    slots: Vec<ColumnSlot>,
}

impl ColumnIndex {
    fn build(ids: &[u32]) -> Self {
        let size = ids.len().max(1);
        let mut slots = vec![EMPTY_SLOT; size];
        let mut placed = vec![false; ids.len()];

        // Pass 1: direct placement at the home slot, skipping collisions.
        for (i, &id) in ids.iter().enumerate() {
            let home = (id as usize) % size;
            if slots[home].type_id == 0 {
                slots[home] = ColumnSlot {
                    type_id: id,
                    next: -1,
                    col_idx: i,
                };
                placed[i] = true;
            }
        }

        // Pass 2: thread everything left over onto its home's chain.
        for (i, &id) in ids.iter().enumerate() {
            if placed[i] {
                continue;
            }
            let home = (id as usize) % size;
            debug_assert_ne!(slots[home].type_id, 0, "home slot must be occupied by pass 1");

            let mut tail = home;
            while slots[tail].next != -1 {
                tail = slots[tail].next as usize;
            }

            let mut empty_idx = None;
            for offset in 1..=size {
                let candidate = (home + offset) % size;
                if slots[candidate].type_id == 0 {
                    empty_idx = Some(candidate);
                    break;
                }
            }
            let empty_idx =
                empty_idx.expect("archetype column-index table exhausted: FrameworkInvariant");

            slots[empty_idx] = ColumnSlot {
                type_id: id,
                next: -1,
                col_idx: i,
            };
            slots[tail].next = empty_idx as i32;
        }

        Self { slots }
    }

    fn lookup(&self, type_id: u32) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        let size = self.slots.len();
        let mut idx = (type_id as usize) % size;
        loop {
            let slot = &self.slots[idx];
            if slot.type_id == type_id {
                return Some(slot.col_idx);
            }
            if slot.next == -1 {
                return None;
            }
            idx = slot.next as usize;
        }
    }
}

const MIN_CAPACITY: usize = 8;

/// A columnar table for every entity sharing one component [`Signature`].
pub struct Archetype {
    signature: Signature,
    /// Row -> owning entity's directory index. Kept dense in lockstep
    /// with every column.
    entities: Vec<u32>,
    columns: Vec<ErasedColumn>,
    column_ids: Vec<u32>,
    index: ColumnIndex,
    capacity: usize,
}

impl Archetype {
    /// Build a table for `signature`. `columns` must be given in the
    /// same order as `signature.as_slice()` and already carry the right
    /// item layout/drop behavior for each id (the caller — typically
    /// `World`, which owns the type registry — is responsible for that
    /// pairing).
    pub fn new(signature: Signature, columns: Vec<ErasedColumn>) -> Self {
        debug_assert_eq!(signature.len(), columns.len());
        let column_ids: Vec<u32> = signature.as_slice().to_vec();
        let index = ColumnIndex::build(&column_ids);
        Self {
            signature,
            entities: Vec::new(),
            columns,
            column_ids,
            index,
            capacity: 0,
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn has(&self, type_id: u32) -> bool {
        self.index.lookup(type_id).is_some()
    }

    pub fn column_for(&self, type_id: u32) -> Option<&ErasedColumn> {
        self.index.lookup(type_id).map(|i| &self.columns[i])
    }

    pub fn column_for_mut(&mut self, type_id: u32) -> Option<&mut ErasedColumn> {
        let idx = self.index.lookup(type_id)?;
        Some(&mut self.columns[idx])
    }

    pub fn entities(&self) -> &[u32] {
        &self.entities
    }

    pub fn column_ids(&self) -> &[u32] {
        &self.column_ids
    }

    fn grow_to(&mut self, new_cap: usize) {
        let new_cap = new_cap.next_power_of_two().max(MIN_CAPACITY);
        if new_cap <= self.capacity {
            return;
        }
        self.capacity = new_cap;
    }

    /// Append `entity_index` as a new row, growing every column if
    /// necessary. Every column gets an uninitialized slot at the
    /// returned row; the caller must write (or default-init) each one
    /// before it is read.
    pub fn allocate_row(&mut self, entity_index: u32) -> usize {
        let row = self.entities.len();
        if row >= self.capacity {
            self.grow_to(row + 1);
        }
        self.entities.push(entity_index);
        for column in &mut self.columns {
            let pushed = column.push_uninit();
            debug_assert_eq!(pushed, row);
        }
        row
    }

    pub fn reserve_rows(&mut self, additional: usize) {
        let needed = self.entities.len() + additional;
        if needed > self.capacity {
            self.grow_to(needed);
        }
        for column in &mut self.columns {
            column.reserve(additional);
        }
    }

    /// Swap-remove `row` from the entity column and every component
    /// column, dropping the removed component values. Use only when the
    /// row's values are truly being destroyed (entity/archetype
    /// teardown) — for a migration where a sibling archetype already
    /// holds copies of some of these columns, use
    /// `swap_remove_row_migrated` instead so shared columns aren't
    /// double-dropped. Returns the entity index that was swapped into
    /// `row`, if any.
    pub fn swap_remove_row(&mut self, row: usize) -> Option<u32> {
        if row >= self.entities.len() {
            return None;
        }
        for column in &mut self.columns {
            column.swap_remove_drop(row);
        }
        self.entities.swap_remove(row);
        if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Swap-remove `row` after its values have already been migrated
    /// into `dst` via `copy_row_into`. A column `dst` also carries had
    /// its value moved there bitwise, so it is removed here with
    /// `swap_remove_forget` (no drop glue — the bytes are now owned by
    /// `dst`); a column `dst` does not carry (only a Remove migration's
    /// dropped component) never had its value copied anywhere, so it is
    /// removed with `swap_remove_drop` as usual. Returns the entity
    /// index that was swapped into `row`, if any.
    pub fn swap_remove_row_migrated(&mut self, row: usize, dst: &Archetype) -> Option<u32> {
        if row >= self.entities.len() {
            return None;
        }
        for (column, &type_id) in self.columns.iter_mut().zip(self.column_ids.iter()) {
            if dst.has(type_id) {
                column.swap_remove_forget(row);
            } else {
                column.swap_remove_drop(row);
            }
        }
        self.entities.swap_remove(row);
        if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Copy row `src_row`'s component values into a freshly appended row
    /// of `dst`, and append `entity_index` to `dst`'s entity column.
    /// Walks `dst`'s columns (not `self`'s): a column `dst` shares with
    /// `self` is copied over; a column only `dst` has (the component a
    /// Set migration is adding) gets an uninitialized slot the caller
    /// must write immediately after this call. Returns the destination
    /// row. The source row is left intact — the caller is expected to
    /// remove it afterward with `swap_remove_row_migrated` (not
    /// `swap_remove_row`) so a column shared with `dst` moves ownership
    /// exactly once instead of being dropped out from under `dst`.
    pub fn copy_row_into(&self, src_row: usize, entity_index: u32, dst: &mut Archetype) -> usize {
        let dst_row = dst.entities.len();
        dst.entities.push(entity_index);
        if dst_row >= dst.capacity {
            dst.grow_to(dst_row + 1);
        }
        for (dst_col_idx, &dst_type_id) in dst.column_ids.iter().enumerate() {
            let dst_col = &mut dst.columns[dst_col_idx];
            if let Some(src_idx) = self.index.lookup(dst_type_id) {
                self.columns[src_idx].copy_row_to(src_row, dst_col);
            } else {
                let pushed = dst_col.push_uninit();
                debug_assert_eq!(pushed, dst_row);
            }
        }
        dst_row
    }

    /// Shrink every column (and the notion of table capacity) down to
    /// the minimum power of two that still holds `count()` rows.
    pub fn resize_backing(&mut self) {
        let new_cap = self.entities.len().max(MIN_CAPACITY).next_power_of_two();
        self.capacity = new_cap;
        for column in &mut self.columns {
            column.shrink_to_fit();
        }
    }

    /// Drop every remaining row's component values without compacting,
    /// used when the whole table is being torn down.
    pub fn clear_dropping_all(&mut self) {
        for row in (0..self.entities.len()).rev() {
            for column in &mut self.columns {
                column.drop_row_in_place(row);
            }
        }
        self.entities.clear();
        for column in &mut self.columns {
            // Values already dropped above; clear `len` without a second drop pass.
            while column.len() > 0 {
                column.forget_last_row();
            }
        }
    }
}

struct ArchetypeSlot {
    version: u32,
    table: Option<Archetype>,
}

/// Generational directory of archetype tables: same FIFO-reuse,
/// version-bump-on-free shape as [`crate::entity::EntityDirectory`],
/// specialized to own the (non-`Copy`) `Archetype` tables themselves
/// rather than a small location record.
pub(crate) struct ArchetypeDirectory {
    slots: Vec<ArchetypeSlot>,
    free: std::collections::VecDeque<u32>,
}

impl ArchetypeDirectory {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: std::collections::VecDeque::new(),
        }
    }

    /// Insert a freshly built table into a free slot (or extend),
    /// returning `(index, version)`.
    pub fn insert(&mut self, table: Archetype) -> (u32, u32) {
        if let Some(index) = self.free.pop_front() {
            let slot = &mut self.slots[index as usize];
            slot.table = Some(table);
            (index, slot.version)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(ArchetypeSlot {
                version: 1,
                table: Some(table),
            });
            (index, 1)
        }
    }

    pub fn get(&self, index: u32) -> Option<&Archetype> {
        self.slots.get(index as usize).and_then(|s| s.table.as_ref())
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut Archetype> {
        self.slots.get_mut(index as usize).and_then(|s| s.table.as_mut())
    }

    /// Borrow two distinct slots' tables mutably at once, for moving a
    /// row from one archetype to another during a Set/Remove migration.
    /// Mirrors the teacher's `split_at_mut`-based `move_entity`.
    ///
    /// Panics if `a == b` or either slot is not live.
    pub fn get2_mut(&mut self, a: u32, b: u32) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(a, b, "get2_mut requires distinct archetype indices: FrameworkInvariant");
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (left, right) = self.slots.split_at_mut(hi as usize);
        let lo_table = left[lo as usize]
            .table
            .as_mut()
            .expect("archetype slot must be live: FrameworkInvariant");
        let hi_table = right[0]
            .table
            .as_mut()
            .expect("archetype slot must be live: FrameworkInvariant");
        if a < b {
            (lo_table, hi_table)
        } else {
            (hi_table, lo_table)
        }
    }

    pub fn version_of(&self, index: u32) -> Option<u32> {
        self.slots.get(index as usize).map(|s| s.version)
    }

    /// Remove and return the table at `index`, bumping the slot's
    /// version and returning it to the free FIFO.
    pub fn remove(&mut self, index: u32) -> Option<Archetype> {
        let slot = self.slots.get_mut(index as usize)?;
        let table = slot.table.take()?;
        slot.version = slot.version.wrapping_add(1).max(1);
        self.free.push_back(index);
        Some(table)
    }

    /// Upper bound for a full scan (`arch_terminator`): every index in
    /// `0..len()` is either a live table or a freed slot.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Archetype)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.table.as_ref().map(|t| (i as u32, t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(ids: &[u32]) -> Signature {
        Signature::from_ids(ids)
    }

    #[test]
    fn column_index_resolves_every_id_after_collisions() {
        // size will be 4 (len == 4); pick ids that collide mod 4.
        let ids = vec![1u32, 5, 9, 13];
        let index = ColumnIndex::build(&ids);
        for (i, &id) in ids.iter().enumerate() {
            assert_eq!(index.lookup(id), Some(i));
        }
        assert_eq!(index.lookup(999), None);
    }

    #[test]
    fn allocate_and_swap_remove_row() {
        let columns = vec![ErasedColumn::new::<i32>()];
        let mut arch = Archetype::new(sig(&[1]), columns);

        let r0 = arch.allocate_row(100);
        unsafe { arch.column_for_mut(1).unwrap().write(r0, 10i32) };
        let r1 = arch.allocate_row(200);
        unsafe { arch.column_for_mut(1).unwrap().write(r1, 20i32) };

        assert_eq!(arch.count(), 2);
        let swapped = arch.swap_remove_row(0);
        assert_eq!(swapped, Some(200));
        assert_eq!(arch.column_for(1).unwrap().get::<i32>(0), Some(&20));
    }

    #[test]
    fn capacity_grows_as_power_of_two_floor_eight() {
        let columns = vec![ErasedColumn::new::<u8>()];
        let mut arch = Archetype::new(sig(&[1]), columns);
        for i in 0..9 {
            arch.allocate_row(i);
        }
        assert!(arch.capacity().is_power_of_two());
        assert!(arch.capacity() >= 9);
    }

    #[test]
    fn copy_row_into_writes_uninit_slot_for_a_column_only_the_destination_has() {
        let mut dir = ArchetypeDirectory::new();
        let (src_idx, _) = dir.insert(Archetype::new(sig(&[1]), vec![ErasedColumn::new::<i32>()]));
        let (dst_idx, _) = dir.insert(Archetype::new(
            sig(&[1, 2]),
            vec![ErasedColumn::new::<i32>(), ErasedColumn::new::<u8>()],
        ));

        {
            let src = dir.get_mut(src_idx).unwrap();
            let row = src.allocate_row(7);
            unsafe { src.column_for_mut(1).unwrap().write(row, 55i32) };
        }

        let (src, dst) = dir.get2_mut(src_idx, dst_idx);
        let dst_row = src.copy_row_into(0, 7, dst);
        assert_eq!(dst.column_for(1).unwrap().get::<i32>(dst_row), Some(&55));
        // Column 2 only exists on dst: copy_row_into must still have
        // allocated its slot so lengths stay in lockstep, even though
        // no value was written yet.
        assert_eq!(dst.column_for(2).unwrap().len(), dst_row + 1);
    }

    #[test]
    fn migrated_swap_remove_forgets_shared_columns_but_drops_columns_only_the_source_has() {
        // A component with real drop glue (owned heap buffer) is the
        // case a bitwise-copy-then-drop-both would double-free.
        let mut dir = ArchetypeDirectory::new();
        let (src_idx, _) = dir.insert(Archetype::new(
            sig(&[1, 2]),
            vec![ErasedColumn::new::<String>(), ErasedColumn::new::<i32>()],
        ));
        let (dst_idx, _) = dir.insert(Archetype::new(sig(&[1]), vec![ErasedColumn::new::<String>()]));

        {
            let src = dir.get_mut(src_idx).unwrap();
            let row0 = src.allocate_row(7);
            unsafe {
                src.column_for_mut(1).unwrap().write(row0, String::from("kept"));
                src.column_for_mut(2).unwrap().write(row0, 11i32);
            }
            // A second row, so swap_remove_row_migrated exercises the
            // swapped-last-row-into-the-hole path, not just truncation.
            let row1 = src.allocate_row(8);
            unsafe {
                src.column_for_mut(1).unwrap().write(row1, String::from("swapped-in"));
                src.column_for_mut(2).unwrap().write(row1, 22i32);
            }
        }

        // Emulate a Remove migration: column 1 (String) is shared with
        // dst and moves; column 2 (i32) exists only in src and must
        // still be genuinely dropped.
        let (src, dst) = dir.get2_mut(src_idx, dst_idx);
        let dst_row = src.copy_row_into(0, 7, dst);
        assert_eq!(dst.column_for(1).unwrap().get::<String>(dst_row).unwrap(), "kept");

        let swapped = src.swap_remove_row_migrated(0, dst);
        assert_eq!(swapped, Some(8));
        // Row 0 now holds what was row 1's data — bytes moved, not
        // re-dropped (no double free if this value is read or dropped).
        assert_eq!(src.column_for(1).unwrap().get::<String>(0).unwrap(), "swapped-in");
        assert_eq!(src.column_for(2).unwrap().get::<i32>(0), Some(&22));
        assert_eq!(src.count(), 1);

        // dst's copy is independently valid and droppable.
        assert_eq!(dst.column_for(1).unwrap().get::<String>(dst_row).unwrap(), "kept");
    }

    #[test]
    fn archetype_directory_reuses_freed_slots_with_bumped_version() {
        let mut dir = ArchetypeDirectory::new();
        let (idx, v1) = dir.insert(Archetype::new(sig(&[1]), vec![ErasedColumn::new::<i32>()]));
        assert_eq!(dir.version_of(idx), Some(v1));
        assert!(dir.remove(idx).is_some());

        let (idx2, v2) = dir.insert(Archetype::new(sig(&[2]), vec![ErasedColumn::new::<u8>()]));
        assert_eq!(idx2, idx);
        assert_ne!(v2, v1);
    }
}
