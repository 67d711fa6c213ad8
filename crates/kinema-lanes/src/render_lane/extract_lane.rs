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

use super::{ExtractedCamera, ExtractedNode, SceneSnapshot};
use kinema_core::math::Extent2D;
use kinema_data::scene::{MaterialSlot, SceneGraph};

/// Copies the render-relevant state of a [`SceneGraph`] into a [`SceneSnapshot`].
///
/// The scene is only read. World transforms are resolved once per frame here, so the
/// planner and the render pass never walk parent chains.
#[derive(Debug, Default)]
pub struct ExtractLane;

impl ExtractLane {
    /// Creates a new `ExtractLane`.
    pub fn new() -> Self {
        Self
    }

    /// Executes the extraction for one frame rendered at `extent`.
    pub fn run(&self, scene: &SceneGraph, extent: Extent2D, snapshot: &mut SceneSnapshot) {
        snapshot.clear();

        let worlds = scene.world_transforms();
        for (id, node) in scene.nodes() {
            let mesh = node.mesh();
            let materials = mesh
                .submeshes()
                .iter()
                .enumerate()
                .map(|(submesh, s)| {
                    (0..s.materials.len())
                        .filter_map(|slot| node.resolved_material(MaterialSlot::new(submesh, slot)))
                        .collect::<Vec<_>>()
                })
                .collect();

            snapshot.nodes.push(ExtractedNode {
                id,
                mesh: mesh.clone(),
                batch_key: node.batch_key().map(str::to_owned),
                world: worlds.get(id).copied().unwrap_or(node.transform()),
                materials,
            });
        }

        snapshot
            .lights
            .extend(scene.lights().map(|(_, light)| light.to_constants()));

        let camera = scene.camera();
        snapshot.camera = ExtractedCamera {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(extent.aspect_ratio()),
            position: camera.eye,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kinema_core::math::{LinearRgba, Mat4, Vec3};
    use kinema_data::assets::{primitives, Material, MeshRegistry};
    use kinema_data::scene::{Light, MaterialOverride, NodeDescriptor};

    #[test]
    fn test_extract_empty_scene() {
        let mut snapshot = SceneSnapshot::new();
        ExtractLane::new().run(&SceneGraph::new(), Extent2D::new(4, 4), &mut snapshot);
        assert!(snapshot.nodes.is_empty());
        assert!(snapshot.lights.is_empty());
        assert_eq!(snapshot.frame_constants().light_count, 0);
    }

    #[test]
    fn test_extract_resolves_hierarchy_and_overrides() {
        let mut registry = MeshRegistry::new();
        registry
            .register(primitives::cube("cube", Material::default()).unwrap())
            .unwrap();
        let mut scene = SceneGraph::new();
        let parent = scene
            .add_node(
                &registry,
                NodeDescriptor::new("parent", "cube")
                    .with_transform(Mat4::from_translation(Vec3::X)),
            )
            .unwrap();
        scene
            .add_node(
                &registry,
                NodeDescriptor::new("child", "cube")
                    .with_parent(parent)
                    .with_batch_key("k")
                    .with_transform(Mat4::from_translation(Vec3::Y))
                    .with_override(
                        MaterialSlot::new(0, 0),
                        MaterialOverride::base_color(LinearRgba::GREEN),
                    ),
            )
            .unwrap();
        scene.add_light(Light::default());

        let mut snapshot = SceneSnapshot::new();
        ExtractLane::new().run(&scene, Extent2D::new(8, 4), &mut snapshot);

        assert_eq!(snapshot.nodes.len(), 2);
        let child = &snapshot.nodes[1];
        let origin = child.world.transform_point3(Vec3::ZERO);
        assert_relative_eq!(origin.x, 1.0);
        assert_relative_eq!(origin.y, 1.0);
        assert_relative_eq!(origin.z, 0.0);
        assert_eq!(child.batch_key.as_deref(), Some("k"));
        assert_eq!(child.materials[0][0].base_color, LinearRgba::GREEN);
        assert_eq!(snapshot.nodes[0].materials[0][0].base_color, LinearRgba::WHITE);
        assert_eq!(snapshot.frame_constants().light_count, 1);
    }
}
