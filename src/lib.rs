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

//! Archetype ECS - a columnar, archetype-based entity/component store.
//!
//! Entities are opaque generational handles; components are plain
//! `Default` value types; archetypes are columnar tables keyed by the
//! canonical set of component types an entity carries. Structural
//! mutations (`set`/`remove`/`destroy`) either apply immediately or, if
//! the world is inside a deferred region (for instance while a query is
//! iterating), queue onto a FIFO replayed once the region ends.

pub mod archetype;
pub mod callbacks;
pub mod column;
pub mod component;
pub mod entity;
pub mod error;
pub mod events;
pub mod id_pool;
pub mod query;
pub mod signature;
pub mod type_registry;
pub mod world;

pub use archetype::Archetype;
pub use callbacks::{RemoveListener, SetListener};
pub use component::Component;
pub use entity::{ArchetypeRef, Entity};
pub use error::{EcsError, Result};
pub use query::Query;
pub use world::World;

pub mod prelude {
    //! Convenient re-exports of commonly used types.
    //!
    //! ```
    //! use archetype_ecs::prelude::*;
    //! ```
    pub use crate::component::Component;
    pub use crate::entity::{ArchetypeRef, Entity};
    pub use crate::error::{EcsError, Result};
    pub use crate::query::Query;
    pub use crate::world::World;
}
