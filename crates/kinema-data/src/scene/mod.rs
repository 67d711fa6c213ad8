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

//! The caller-owned scene: nodes in a transform hierarchy, lights and one camera.
//!
//! Nodes live in a [`slotmap`] arena and refer to each other by [`NodeId`]. The arena
//! owns every node; parent and child links are plain indices, so reparenting never
//! creates ownership cycles. World transforms are computed on demand from the parent
//! chain and are never cached across a mutation.

mod camera;
mod error;
mod graph;
mod light;
mod node;

#[cfg(test)]
mod tests;

pub use self::camera::Camera;
pub use self::error::SceneError;
pub use self::graph::{LightId, NodeId, SceneGraph};
pub use self::light::{Light, LightKind};
pub use self::node::{MaterialOverride, MaterialSlot, Node, NodeDescriptor};
