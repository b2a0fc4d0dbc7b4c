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

//! The `Component` trait: a marker for data attached to entities.
//!
//! Generated arity-N convenience constructors (`CreateEntity<C1..Cn>`,
//! multi-column `Foreach`) are boilerplate over the primitive `get`/
//! `set`/column-iteration surface and are not part of this crate; only
//! the primitive contract below is.

/// Marker trait for component types.
///
/// Components must be `'static` (no borrowed data) and `Send + Sync`
/// since a world's storage may outlive any particular borrow of it.
/// `Default` is required because a freshly allocated archetype row is
/// always default-initialized before it is ever read (component
/// columns are never left uninitialized from the caller's point of
/// view).
pub trait Component: 'static + Send + Sync + Default {}

impl<T: 'static + Send + Sync + Default> Component for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_default_send_sync_static_type_is_a_component() {
        #[derive(Default)]
        struct Position {
            #[allow(dead_code)]
            x: f32,
        }
        fn assert_component<T: Component>() {}
        assert_component::<Position>();
        assert_component::<i32>();
    }
}
