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

//! Process-level world directory.
//!
//! `Entity`/`Archetype` handles carry only a `world_id`; this module is
//! how they resolve back to the world's storage without the caller
//! threading a `&World` through every call. The directory and the
//! world-id allocator share one `parking_lot::Mutex`, taken only while
//! a world is created, resolved, or torn down (§4.8) — normal
//! structural operations lock it once per call to clone out the
//! world's `Arc`, then release it before doing any work.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::world::WorldInner;

/// World id 0 is never handed out, so the default (invalid) handle
/// never resolves.
struct IdPool {
    next: u32,
    free: VecDeque<u32>,
}

impl IdPool {
    fn new() -> Self {
        Self {
            next: 1,
            free: VecDeque::new(),
        }
    }

    fn acquire(&mut self) -> u32 {
        if let Some(id) = self.free.pop_front() {
            id
        } else {
            let id = self.next;
            self.next += 1;
            id
        }
    }

    fn release(&mut self, id: u32) {
        self.free.push_back(id);
    }
}

struct Directory {
    pool: IdPool,
    worlds: Vec<Option<Arc<Mutex<WorldInner>>>>,
}

static DIRECTORY: OnceLock<Mutex<Directory>> = OnceLock::new();

fn directory() -> &'static Mutex<Directory> {
    DIRECTORY.get_or_init(|| {
        Mutex::new(Directory {
            pool: IdPool::new(),
            worlds: Vec::new(),
        })
    })
}

/// Allocate a world id and install `inner` as that world's storage.
pub(crate) fn register_world(inner: WorldInner) -> (u32, Arc<Mutex<WorldInner>>) {
    let mut dir = directory().lock();
    let id = dir.pool.acquire();
    let handle = Arc::new(Mutex::new(inner));
    let idx = id as usize;
    if idx >= dir.worlds.len() {
        dir.worlds.resize(idx + 1, None);
    }
    dir.worlds[idx] = Some(handle.clone());
    (id, handle)
}

/// Resolve a world id to its storage, if the world is still alive.
pub(crate) fn resolve_world(id: u32) -> Option<Arc<Mutex<WorldInner>>> {
    let dir = directory().lock();
    dir.worlds.get(id as usize).and_then(|slot| slot.clone())
}

/// Remove a world from the directory and return its id to the pool.
pub(crate) fn release_world(id: u32) {
    let mut dir = directory().lock();
    if let Some(slot) = dir.worlds.get_mut(id as usize) {
        *slot = None;
    }
    dir.pool.release(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_pool_reuses_released_ids_fifo() {
        let mut pool = IdPool::new();
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.acquire(), a);
        assert_eq!(pool.acquire(), b);
    }

    #[test]
    fn id_pool_never_hands_out_zero() {
        let mut pool = IdPool::new();
        assert_ne!(pool.acquire(), 0);
    }
}
