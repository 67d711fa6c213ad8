// Copyright 2025 eraflo
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

use thiserror::Error;

/// Errors raised by [`SceneGraph`](super::SceneGraph) mutations.
///
/// A failed mutation leaves the scene unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The named mesh is not in the registry.
    #[error("Mesh '{0}' is not registered")]
    MeshNotRegistered(String),
    /// A node would join a batch whose established mesh differs from its own.
    #[error("Node '{node}' cannot join batch '{key}': its mesh differs from the batch's mesh")]
    HeterogeneousBatch {
        /// The batch key.
        key: String,
        /// The rejected node.
        node: String,
    },
    /// Another node already has that name.
    #[error("A node named '{0}' already exists")]
    DuplicateName(String),
    /// Reparenting would make a node its own ancestor.
    #[error("Parenting '{node}' under '{parent}' would create a cycle")]
    CycleDetected {
        /// The node being reparented.
        node: String,
        /// The requested parent.
        parent: String,
    },
    /// The node id is stale or was never issued by this scene.
    #[error("Node not found")]
    NodeNotFound,
    /// The light id is stale or was never issued by this scene.
    #[error("Light not found")]
    LightNotFound,
    /// A material override targets a slot the node's mesh does not have.
    #[error("Node '{node}' has no material slot {slot} on submesh {submesh}")]
    InvalidMaterialSlot {
        /// The node name.
        node: String,
        /// The submesh index.
        submesh: usize,
        /// The material slot index.
        slot: usize,
    },
}
