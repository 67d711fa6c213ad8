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
//! Renders small scenes end to end on the software device.

use kinema_core::math::{Extent2D, LinearRgba, Mat4, Vec3};
use kinema_core::renderer::{FrameConstantBuffer, GraphicsDevice, RenderError};
use kinema_core::sink::FrameImage;
use kinema_data::assets::{primitives, Material, MeshRegistry};
use kinema_data::scene::{Light, MaterialOverride, MaterialSlot, NodeDescriptor, SceneGraph};
use kinema_infra::SoftwareDevice;
use kinema_lanes::render_lane::{
    ExtractLane, LaneError, PlanError, SceneLaneConfig, SceneRenderLane, SceneSnapshot,
};
use std::sync::{Arc, Mutex};

const EXTENT: Extent2D = Extent2D::new(48, 32);

fn config(sample_count: u32, max_instances_per_draw: u32) -> SceneLaneConfig {
    SceneLaneConfig {
        extent: EXTENT,
        sample_count,
        max_instances_per_draw,
        max_lights: 4,
        clear_color: LinearRgba::BLACK,
        readback_slots: 1,
    }
}

fn cube_row(batch_key: Option<&str>) -> SceneGraph {
    tinted_cube_row(batch_key, &[])
}

/// A row of five cubes where the cubes at `tinted` carry a red base color override.
fn tinted_cube_row(batch_key: Option<&str>, tinted: &[usize]) -> SceneGraph {
    let mut registry = MeshRegistry::new();
    registry
        .register(primitives::cube("cube", Material::default()).unwrap())
        .unwrap();
    let mut scene = SceneGraph::new();
    for i in 0..5 {
        let mut descriptor = NodeDescriptor::new(format!("cube {i}"), "cube").with_transform(
            Mat4::from_translation(Vec3::new(i as f32 * 1.2 - 2.4, 0.0, -(i as f32) * 0.5))
                * Mat4::from_rotation_y(0.4 * i as f32)
                * Mat4::from_scale(Vec3::splat(0.5)),
        );
        if let Some(key) = batch_key {
            descriptor = descriptor.with_batch_key(key);
        }
        if tinted.contains(&i) {
            descriptor = descriptor.with_override(
                MaterialSlot::new(0, 0),
                MaterialOverride::base_color(LinearRgba::rgb(1.0, 0.0, 0.0)),
            );
        }
        scene.add_node(&registry, descriptor).unwrap();
    }
    scene.add_light(Light::directional(
        Vec3::new(-0.3, -1.0, -0.5),
        LinearRgba::WHITE,
        1.0,
    ));
    scene
}

struct Renderer {
    device: SoftwareDevice,
    constants: FrameConstantBuffer,
    lane: SceneRenderLane,
    snapshot: SceneSnapshot,
}

impl Renderer {
    fn new(config: SceneLaneConfig, capacity: u64) -> Self {
        let device = SoftwareDevice::default();
        let constants =
            FrameConstantBuffer::new(&device, capacity, 1, config.binding_slack(), "Test").unwrap();
        let lane = SceneRenderLane::new(&device, &constants, config).unwrap();
        Self {
            device,
            constants,
            lane,
            snapshot: SceneSnapshot::new(),
        }
    }

    fn render(&mut self, scene: &SceneGraph) -> Result<FrameImage, LaneError> {
        ExtractLane::new().run(scene, EXTENT, &mut self.snapshot);
        let prepared = self
            .lane
            .prepare(&self.device, &self.snapshot, &mut self.constants, 0)?;
        let (commands, readback) = self.lane.encode(&self.device, &prepared);

        let result: Arc<Mutex<Option<Result<Vec<u8>, RenderError>>>> = Arc::default();
        let slot = result.clone();
        self.device
            .submit(
                commands,
                Some(readback),
                Box::new(move |r| {
                    *slot.lock().unwrap() = Some(r.map(|c| c.readback.unwrap_or_default()));
                }),
            )
            .unwrap();
        self.device.wait_idle().unwrap();

        let bytes = result.lock().unwrap().take().unwrap().unwrap();
        let mut image = FrameImage::new(EXTENT, vec![0; EXTENT.area() as usize * 4]).unwrap();
        self.lane.readback_layout().copy_to(&bytes, &mut image).unwrap();
        Ok(image)
    }
}

fn lit_pixels(image: &FrameImage) -> usize {
    image
        .pixels()
        .chunks_exact(4)
        .filter(|p| p[0] > 0 || p[1] > 0 || p[2] > 0)
        .count()
}

#[test]
fn batched_and_unbatched_scenes_render_identically() {
    for sample_count in [1, 4] {
        let mut renderer = Renderer::new(config(sample_count, 2), 64 * 1024);
        let unbatched = renderer.render(&cube_row(None)).unwrap();
        let batched = renderer.render(&cube_row(Some("row"))).unwrap();

        assert!(lit_pixels(&unbatched) > 0, "the cubes cover part of the image");
        assert_eq!(unbatched.pixels(), batched.pixels());
    }
}

#[test]
fn batched_draws_use_the_representative_materials_for_every_instance() {
    let mut renderer = Renderer::new(config(1, 8), 64 * 1024);
    // Only the first member, the batch representative, is tinted.
    let batched = renderer.render(&tinted_cube_row(Some("row"), &[0])).unwrap();
    let all_tinted = renderer.render(&tinted_cube_row(None, &[0, 1, 2, 3, 4])).unwrap();
    let untinted = renderer.render(&tinted_cube_row(None, &[])).unwrap();
    assert_eq!(batched.pixels(), all_tinted.pixels());
    assert_ne!(batched.pixels(), untinted.pixels());

    // An override on a later member does not reach the batched draw.
    let later_tinted = renderer.render(&tinted_cube_row(Some("row"), &[3])).unwrap();
    assert_eq!(later_tinted.pixels(), untinted.pixels());
}

#[test]
fn batches_are_split_by_the_instance_limit() {
    let device = SoftwareDevice::default();
    let config = config(1, 2);
    let mut constants =
        FrameConstantBuffer::new(&device, 64 * 1024, 1, config.binding_slack(), "Plan").unwrap();
    let mut lane = SceneRenderLane::new(&device, &constants, config).unwrap();
    let mut snapshot = SceneSnapshot::new();
    ExtractLane::new().run(&cube_row(Some("row")), EXTENT, &mut snapshot);

    let prepared = lane.prepare(&device, &snapshot, &mut constants, 0).unwrap();
    assert_eq!(prepared.plan.batch_count, 1);
    assert_eq!(prepared.plan.batched_instances, 5);
    assert_eq!(prepared.plan.batched_draw_count(), 3);
    assert_eq!(prepared.plan.unbatched_draw_count(), 0);
    assert!(!prepared.constant_range.is_empty());
}

#[test]
fn too_many_lights_abort_the_frame() {
    let mut renderer = Renderer::new(config(1, 8), 64 * 1024);
    let mut scene = cube_row(None);
    for _ in 0..4 {
        scene.add_light(Light::default());
    }
    let err = renderer.render(&scene).unwrap_err();
    assert!(matches!(
        err,
        LaneError::Plan(PlanError::TooManyLights { count: 5, max: 4 })
    ));
    assert!(!renderer.constants.allocator().in_frame());

    // The lane recovers once the scene fits again.
    assert!(renderer.render(&cube_row(None)).is_ok());
}

#[test]
fn exhausted_frame_budget_is_a_capacity_error() {
    // One frame of 1 KiB holds the frame constants and little else.
    let mut renderer = Renderer::new(config(1, 8), 1024);
    let err = renderer.render(&cube_row(None)).unwrap_err();
    assert!(matches!(err, LaneError::Plan(PlanError::Capacity(_))));
    assert!(!renderer.constants.allocator().in_frame());
}

#[test]
fn frames_in_distinct_slots_use_distinct_constants_and_readback() {
    let device = SoftwareDevice::default();
    let config = SceneLaneConfig {
        readback_slots: 2,
        ..config(1, 8)
    };
    let mut constants =
        FrameConstantBuffer::new(&device, 2 * 64 * 1024, 2, config.binding_slack(), "Slots")
            .unwrap();
    let mut lane = SceneRenderLane::new(&device, &constants, config).unwrap();
    let mut snapshot = SceneSnapshot::new();
    ExtractLane::new().run(&cube_row(None), EXTENT, &mut snapshot);

    let first = lane.prepare(&device, &snapshot, &mut constants, 0).unwrap();
    let second = lane.prepare(&device, &snapshot, &mut constants, 1).unwrap();
    // Slot 1 is handed out again while the frame in slot 0 is still live.
    let third = lane.prepare(&device, &snapshot, &mut constants, 1).unwrap();
    assert_eq!(third.slot, 1);
    assert_eq!(third.constant_range, second.constant_range);
    assert!(!third.constant_range.overlaps(&first.constant_range));

    let (_, first_readback) = lane.encode(&device, &first);
    let (_, third_readback) = lane.encode(&device, &third);
    assert_ne!(first_readback.buffer, third_readback.buffer);
}
