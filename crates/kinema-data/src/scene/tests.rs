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

use super::*;
use crate::assets::{primitives, Material, MeshRegistry};
use approx::assert_relative_eq;
use kinema_core::math::{LinearRgba, Mat4, Vec3};

fn registry() -> MeshRegistry {
    let mut registry = MeshRegistry::new();
    registry
        .register(primitives::cube("cube", Material::default()).unwrap())
        .unwrap();
    registry
        .register(primitives::quad("quad", Material::default()).unwrap())
        .unwrap();
    registry
}

#[test]
fn test_add_node_with_unregistered_mesh_is_an_error() {
    let registry = registry();
    let mut scene = SceneGraph::new();
    let err = scene
        .add_node(&registry, NodeDescriptor::new("a", "teapot"))
        .unwrap_err();
    assert_eq!(err, SceneError::MeshNotRegistered("teapot".into()));
    assert_eq!(scene.node_count(), 0);
}

#[test]
fn test_duplicate_names_are_rejected() {
    let registry = registry();
    let mut scene = SceneGraph::new();
    scene.add_node(&registry, NodeDescriptor::new("a", "cube")).unwrap();
    let err = scene
        .add_node(&registry, NodeDescriptor::new("a", "quad"))
        .unwrap_err();
    assert_eq!(err, SceneError::DuplicateName("a".into()));
}

#[test]
fn test_world_transform_composes_parent_chain() {
    let registry = registry();
    let mut scene = SceneGraph::new();
    let root = scene
        .add_node(
            &registry,
            NodeDescriptor::new("root", "cube")
                .with_transform(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0))),
        )
        .unwrap();
    let child = scene
        .add_node(
            &registry,
            NodeDescriptor::new("child", "cube")
                .with_parent(root)
                .with_transform(Mat4::from_scale(Vec3::splat(2.0))),
        )
        .unwrap();
    let grandchild = scene
        .add_node(
            &registry,
            NodeDescriptor::new("grandchild", "cube")
                .with_parent(child)
                .with_transform(Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0))),
        )
        .unwrap();

    let p = scene.world_transform(grandchild).unwrap().transform_point3(Vec3::ZERO);
    assert_relative_eq!(p.x, 1.0);
    assert_relative_eq!(p.y, 2.0);

    // No stale cache: moving the root moves the grandchild.
    scene
        .set_transform(root, Mat4::from_translation(Vec3::new(-1.0, 0.0, 0.0)))
        .unwrap();
    let p = scene.world_transform(grandchild).unwrap().transform_point3(Vec3::ZERO);
    assert_relative_eq!(p.x, -1.0);

    let all = scene.world_transforms();
    assert_eq!(all.len(), 3);
    assert_eq!(all[grandchild], scene.world_transform(grandchild).unwrap());
    assert_eq!(all[child], scene.world_transform(child).unwrap());
}

#[test]
fn test_reparenting_under_a_descendant_is_a_cycle() {
    let registry = registry();
    let mut scene = SceneGraph::new();
    let a = scene.add_node(&registry, NodeDescriptor::new("a", "cube")).unwrap();
    let b = scene
        .add_node(&registry, NodeDescriptor::new("b", "cube").with_parent(a))
        .unwrap();
    let c = scene
        .add_node(&registry, NodeDescriptor::new("c", "cube").with_parent(b))
        .unwrap();

    assert!(matches!(
        scene.set_parent(a, Some(c)),
        Err(SceneError::CycleDetected { .. })
    ));
    assert!(matches!(
        scene.set_parent(a, Some(a)),
        Err(SceneError::CycleDetected { .. })
    ));

    scene.set_parent(c, None).unwrap();
    assert!(scene.node(b).unwrap().children().is_empty());
    scene.set_parent(a, Some(c)).unwrap();
    assert_eq!(scene.node(c).unwrap().children(), &[a]);
}

#[test]
fn test_remove_node_removes_the_subtree() {
    let registry = registry();
    let mut scene = SceneGraph::new();
    let a = scene.add_node(&registry, NodeDescriptor::new("a", "cube")).unwrap();
    let b = scene
        .add_node(&registry, NodeDescriptor::new("b", "cube").with_parent(a))
        .unwrap();
    scene
        .add_node(&registry, NodeDescriptor::new("c", "cube").with_parent(b))
        .unwrap();
    let d = scene.add_node(&registry, NodeDescriptor::new("d", "quad")).unwrap();

    assert_eq!(scene.remove_node(b), Ok(2));
    assert_eq!(scene.node_count(), 2);
    assert!(scene.find("c").is_none());
    assert!(scene.node(a).unwrap().children().is_empty());
    let order: Vec<_> = scene.nodes().map(|(id, _)| id).collect();
    assert_eq!(order, vec![a, d]);
    assert_eq!(scene.remove_node(b), Err(SceneError::NodeNotFound));
}

#[test]
fn test_batches_must_share_one_mesh() {
    let registry = registry();
    let mut scene = SceneGraph::new();
    scene
        .add_node(&registry, NodeDescriptor::new("a", "cube").with_batch_key("boxes"))
        .unwrap();
    scene
        .add_node(&registry, NodeDescriptor::new("b", "cube").with_batch_key("boxes"))
        .unwrap();
    let err = scene
        .add_node(&registry, NodeDescriptor::new("c", "quad").with_batch_key("boxes"))
        .unwrap_err();
    assert!(matches!(err, SceneError::HeterogeneousBatch { .. }));
    assert!(scene.find("c").is_none());

    let c = scene.add_node(&registry, NodeDescriptor::new("c", "quad")).unwrap();
    assert!(scene.set_batch_key(c, Some("boxes".into())).is_err());
    scene.set_batch_key(c, Some("quads".into())).unwrap();
    assert_eq!(scene.node(c).unwrap().batch_key(), Some("quads"));
}

#[test]
fn test_empty_batch_can_be_reused_with_another_mesh() {
    let registry = registry();
    let mut scene = SceneGraph::new();
    let a = scene
        .add_node(&registry, NodeDescriptor::new("a", "cube").with_batch_key("k"))
        .unwrap();
    scene.remove_node(a).unwrap();
    scene
        .add_node(&registry, NodeDescriptor::new("b", "quad").with_batch_key("k"))
        .unwrap();
}

#[test]
fn test_set_mesh_respects_batch_homogeneity() {
    let registry = registry();
    let mut scene = SceneGraph::new();
    let a = scene
        .add_node(&registry, NodeDescriptor::new("a", "cube").with_batch_key("k"))
        .unwrap();
    // Sole member: the batch follows the node.
    scene.set_mesh(&registry, a, "quad").unwrap();
    scene
        .add_node(&registry, NodeDescriptor::new("b", "quad").with_batch_key("k"))
        .unwrap();
    assert!(matches!(
        scene.set_mesh(&registry, a, "cube"),
        Err(SceneError::HeterogeneousBatch { .. })
    ));
    assert_eq!(
        scene.set_mesh(&registry, a, "nope"),
        Err(SceneError::MeshNotRegistered("nope".into()))
    );
}

#[test]
fn test_material_overrides_resolve_on_top_of_the_mesh() {
    let registry = registry();
    let mut scene = SceneGraph::new();
    let slot = MaterialSlot::new(0, 0);
    let a = scene
        .add_node(
            &registry,
            NodeDescriptor::new("a", "cube").with_override(slot, MaterialOverride::base_color(LinearRgba::RED)),
        )
        .unwrap();
    let material = scene.node(a).unwrap().resolved_material(slot).unwrap();
    assert_eq!(material.base_color, LinearRgba::RED);
    assert_eq!(material.roughness, Material::default().roughness);

    let bad = MaterialSlot::new(1, 0);
    assert!(matches!(
        scene.set_material_override(a, bad, MaterialOverride::default()),
        Err(SceneError::InvalidMaterialSlot { submesh: 1, .. })
    ));
    assert!(scene.clear_material_override(a, slot).unwrap().is_some());
    assert_eq!(
        scene.node(a).unwrap().resolved_material(slot).unwrap().base_color,
        LinearRgba::WHITE
    );
}

#[test]
fn test_lights_keep_insertion_order() {
    let mut scene = SceneGraph::new();
    let sun = scene.add_light(Light::default());
    let lamp = scene.add_light(Light::point(Vec3::Y, LinearRgba::WHITE, 3.0));
    let order: Vec<_> = scene.lights().map(|(id, _)| id).collect();
    assert_eq!(order, vec![sun, lamp]);

    scene.light_mut(lamp).unwrap().intensity = 5.0;
    assert_eq!(scene.light(lamp).unwrap().intensity, 5.0);
    scene.remove_light(sun).unwrap();
    assert_eq!(scene.lights().count(), 1);
    assert_eq!(scene.remove_light(sun), Err(SceneError::LightNotFound));
}
