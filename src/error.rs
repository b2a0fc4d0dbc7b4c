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

//! Error types

use std::fmt;

/// ECS error type
#[derive(Debug, Clone)]
pub enum EcsError {
    /// `get`/`try_get` used a handle whose version did not match its slot.
    InvalidHandle,

    /// `get<C>` on an entity whose archetype does not carry `C`.
    MissingComponent,

    /// Directory or column growth failed.
    CapacityOverflow,

    /// Internal consistency violation. Indicates a bug; callers should
    /// treat this as fatal.
    FrameworkInvariant(String),

    /// A handle's `world_id` no longer names a live world. Defensive:
    /// ordinary validity checks already catch this via the version
    /// check on the (now released) slot.
    WorldNotFound,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::InvalidHandle => write!(f, "invalid handle"),
            EcsError::MissingComponent => write!(f, "missing component"),
            EcsError::CapacityOverflow => write!(f, "capacity overflow"),
            EcsError::FrameworkInvariant(msg) => write!(f, "framework invariant violated: {msg}"),
            EcsError::WorldNotFound => write!(f, "world not found"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EcsError>;
