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

//! The immutable, render-ready view of a scene for one frame.

use kinema_core::math::{Mat4, Vec3};
use kinema_core::renderer::{FrameConstants, LightConstants};
use kinema_data::assets::{Material, Mesh};
use kinema_data::scene::NodeId;
use std::sync::Arc;

/// A node with its world transform and resolved materials.
#[derive(Debug, Clone)]
pub struct ExtractedNode {
    /// The source node.
    pub id: NodeId,
    /// The shared mesh.
    pub mesh: Arc<Mesh>,
    /// The batch key, if any.
    pub batch_key: Option<String>,
    /// The resolved world transform.
    pub world: Mat4,
    /// Materials with overrides applied, indexed `[submesh][slot]`.
    pub materials: Vec<Vec<Material>>,
}

/// The camera, reduced to the matrices the frame constants need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractedCamera {
    /// World to view.
    pub view: Mat4,
    /// View to clip, aspect ratio of the output applied.
    pub projection: Mat4,
    /// Eye position in world space.
    pub position: Vec3,
}

impl Default for ExtractedCamera {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            position: Vec3::ZERO,
        }
    }
}

/// Everything a frame needs from the scene, decoupled from the live [`SceneGraph`].
///
/// [`SceneGraph`]: kinema_data::scene::SceneGraph
#[derive(Debug, Clone, Default)]
pub struct SceneSnapshot {
    /// Nodes in scene insertion order.
    pub nodes: Vec<ExtractedNode>,
    /// Packed lights in scene insertion order.
    pub lights: Vec<LightConstants>,
    /// The point of view.
    pub camera: ExtractedCamera,
}

impl SceneSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the snapshot for reuse, keeping allocations.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.lights.clear();
        self.camera = ExtractedCamera::default();
    }

    /// Packs the frame-wide constants.
    pub fn frame_constants(&self) -> FrameConstants {
        FrameConstants::new(
            self.camera.view,
            self.camera.projection,
            self.camera.position,
            self.lights.len() as u32,
        )
    }
}
