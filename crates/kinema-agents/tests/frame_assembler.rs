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
//! End-to-end behaviour of the frame assembler on the software device.

use kinema_agents::{FrameAssembler, FrameAssemblerConfig, FrameError, FrameReceipt};
use kinema_core::math::{Extent2D, LinearRgba, Mat4, Vec3};
use kinema_core::sink::{FrameRate, PresentationTime};
use kinema_data::assets::{primitives, Material, MeshRegistry};
use kinema_data::scene::{Light, NodeDescriptor, SceneGraph};
use kinema_infra::{CompletionController, InMemorySink, SoftwareDevice};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);

fn config(frames_in_flight: usize) -> FrameAssemblerConfig {
    FrameAssemblerConfig {
        extent: Extent2D::new(32, 24),
        sample_count: 1,
        frames_in_flight,
        constant_capacity: frames_in_flight as u64 * 64 * 1024,
        max_instances_per_draw: 16,
        max_lights: 4,
        clear_color: LinearRgba::rgb(0.1, 0.1, 0.2),
        image_pool_size: frames_in_flight + 2,
        frame_rate: FrameRate::fps(30),
        start_time: PresentationTime::new(10, 1),
        readiness_poll_interval: Duration::from_millis(2),
    }
}

/// A batch of three cubes and one loose cube whose position depends on `frame`.
fn scene(frame: usize) -> SceneGraph {
    let mut registry = MeshRegistry::new();
    registry
        .register(primitives::cube("cube", Material::default()).unwrap())
        .unwrap();
    let mut scene = SceneGraph::new();
    for i in 0..3 {
        scene
            .add_node(
                &registry,
                NodeDescriptor::new(format!("row {i}"), "cube")
                    .with_batch_key("row")
                    .with_transform(
                        Mat4::from_translation(Vec3::new(i as f32 - 1.0, -1.0, 0.0))
                            * Mat4::from_scale(Vec3::splat(0.4)),
                    ),
            )
            .unwrap();
    }
    let x = -1.5 + 0.25 * frame as f32;
    scene
        .add_node(
            &registry,
            NodeDescriptor::new("mover", "cube").with_transform(
                Mat4::from_translation(Vec3::new(x, 0.8, 0.0)) * Mat4::from_scale(Vec3::splat(0.3)),
            ),
        )
        .unwrap();
    scene.add_light(Light::default());
    scene
}

fn assembler(
    controller: CompletionController,
    sink: &InMemorySink,
    config: FrameAssemblerConfig,
) -> FrameAssembler {
    let device = Arc::new(SoftwareDevice::new(controller));
    FrameAssembler::new(device, Box::new(sink.clone()), config).unwrap()
}

/// Produces a frame, retrying while every output image is in use.
fn produce(assembler: &mut FrameAssembler, scene: &SceneGraph) -> FrameReceipt {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        match assembler.produce_frame(scene) {
            Ok(receipt) => return receipt,
            Err(e) if e.is_recoverable() && Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(1));
            }
            Err(e) => panic!("frame production failed: {e}"),
        }
    }
}

fn expected_times(count: usize) -> Vec<PresentationTime> {
    (0..count as i64)
        .map(|k| PresentationTime::new(300 + k, 30))
        .collect()
}

#[test]
fn frames_reach_the_sink_in_production_order() {
    const FRAMES: usize = 12;

    let reference_sink = InMemorySink::new();
    let mut reference = assembler(CompletionController::inline(), &reference_sink, config(3));
    for frame in 0..FRAMES {
        produce(&mut reference, &scene(frame));
    }
    reference.finish().unwrap();

    let sink = InMemorySink::new();
    let controller = CompletionController::threaded(4, Duration::from_millis(4), 7);
    let mut shuffled = assembler(controller, &sink, config(3));
    let receipts: Vec<_> = (0..FRAMES)
        .map(|frame| produce(&mut shuffled, &scene(frame)))
        .collect();
    let stats = shuffled.finish().unwrap();

    assert_eq!(stats.produced, FRAMES as u64);
    assert_eq!(stats.delivered, FRAMES as u64);
    assert!(stats.throttle_high_water_mark <= 3);
    assert!(sink.is_finished());
    assert_eq!(sink.times(), expected_times(FRAMES));
    for (k, receipt) in receipts.iter().enumerate() {
        let delivered = receipt.wait().unwrap();
        assert_eq!(delivered.sequence, k as u64);
        assert_eq!(delivered.time, expected_times(FRAMES)[k]);
    }

    let expected = reference_sink.frames();
    let actual = sink.frames();
    assert_eq!(actual.len(), FRAMES);
    assert_ne!(expected[0].pixels, expected[FRAMES - 1].pixels);
    for (k, (actual, expected)) in actual.iter().zip(&expected).enumerate() {
        assert!(actual.pixels == expected.pixels, "frame {k} is out of order");
    }
}

#[test]
fn throttle_blocks_until_any_frame_completes() {
    let controller = CompletionController::manual();
    let sink = InMemorySink::new();
    let mut assembler = assembler(controller.clone(), &sink, config(2));
    let throttle = assembler.throttle().clone();

    let first = produce(&mut assembler, &scene(0));
    let second = produce(&mut assembler, &scene(1));
    assert_eq!(throttle.outstanding(), 2);
    assert_eq!(controller.pending(), 2);

    let (done_tx, done_rx) = mpsc::channel();
    let producer = thread::spawn(move || {
        let third = produce(&mut assembler, &scene(2));
        done_tx.send(()).unwrap();
        (assembler, third)
    });

    assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(sink.frame_count(), 0);

    // The newer frame completes first; the producer unblocks but the sink waits.
    assert!(controller.release_latest());
    done_rx.recv_timeout(TIMEOUT).unwrap();
    assert!(second.wait_timeout(Duration::from_millis(50)).is_none());
    assert_eq!(sink.frame_count(), 0);

    assert!(controller.release_next());
    assert_eq!(first.wait().unwrap().sequence, 0);
    assert_eq!(second.wait().unwrap().sequence, 1);

    let (mut assembler, third) = producer.join().unwrap();
    assert!(controller.wait_for_pending(1, TIMEOUT));
    controller.release_all();
    assert_eq!(third.wait().unwrap().sequence, 2);

    let stats = assembler.finish().unwrap();
    assert_eq!(stats.throttle_high_water_mark, 2);
    assert_eq!(sink.times(), expected_times(3));
}

#[test]
fn newest_frame_completing_first_does_not_overlap_live_constants() {
    let controller = CompletionController::manual();
    let sink = InMemorySink::new();
    let mut assembler = assembler(controller.clone(), &sink, config(2));

    let first = produce(&mut assembler, &scene(0));
    let second = produce(&mut assembler, &scene(1));
    assert_ne!(first.slot(), second.slot());
    assert!(controller.wait_for_pending(2, TIMEOUT));

    // Frame 1 retires while frame 0 is still on the device.
    assert!(controller.release_latest());
    let third = produce(&mut assembler, &scene(2));
    assert_eq!(third.slot(), second.slot());
    assert!(
        !third.constant_range().overlaps(&first.constant_range()),
        "frame 2 at {:?} overlaps live frame 0 at {:?}",
        third.constant_range(),
        first.constant_range()
    );

    assert_eq!(controller.release_all(), 2);
    assert_eq!(third.wait().unwrap().sequence, 2);
    assembler.finish().unwrap();
    assert_eq!(sink.times(), expected_times(3));
}

#[test]
fn capacity_error_aborts_before_any_submission() {
    let controller = CompletionController::manual();
    let sink = InMemorySink::new();
    let mut tight = config(1);
    tight.constant_capacity = 1024;
    tight.max_instances_per_draw = 1;
    let mut assembler = assembler(controller.clone(), &sink, tight);

    let err = assembler.produce_frame(&scene(0)).unwrap_err();
    assert!(matches!(err, FrameError::Capacity(_)), "{err}");
    assert!(!err.is_recoverable());
    assert_eq!(controller.pending(), 0);
    assert_eq!(controller.in_flight(), 0);
    assert_eq!(assembler.throttle().outstanding(), 0);

    let again = assembler.produce_frame(&scene(1)).unwrap_err();
    assert!(matches!(again, FrameError::Capacity(_)));
    assert!(matches!(assembler.finish(), Err(FrameError::Capacity(_))));
    assert_eq!(sink.frame_count(), 0);
}

#[test]
fn delivery_waits_for_sink_readiness() {
    let sink = InMemorySink::not_ready();
    let mut assembler = assembler(CompletionController::inline(), &sink, config(3));

    let receipt = produce(&mut assembler, &scene(0));
    thread::sleep(Duration::from_millis(80));
    assert_eq!(sink.frame_count(), 0);
    assert!(receipt.try_outcome().is_none());

    let ready_at = Instant::now();
    sink.set_ready(true);
    receipt.wait().unwrap();

    let frames = sink.frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].appended_at >= ready_at);
    assert_eq!(sink.appended_while_not_ready(), 0);
    assembler.finish().unwrap();
}

#[test]
fn exhausted_image_pool_is_a_recoverable_error() {
    let sink = InMemorySink::not_ready();
    let mut small = config(3);
    small.image_pool_size = 1;
    let mut assembler = assembler(CompletionController::inline(), &sink, small);

    let first = assembler.produce_frame(&scene(0)).unwrap();
    let err = assembler.produce_frame(&scene(1)).unwrap_err();
    assert!(matches!(err, FrameError::ResourceUnavailable(_)));
    assert!(err.is_recoverable());
    assert_eq!(assembler.throttle().outstanding(), 0);

    sink.set_ready(true);
    first.wait().unwrap();
    let retried = produce(&mut assembler, &scene(1));
    assert_eq!(retried.wait().unwrap().sequence, 1);

    let stats = assembler.finish().unwrap();
    assert_eq!(stats.produced, 2);
    assert_eq!(sink.times(), expected_times(2));
}

#[test]
fn completion_failure_poisons_the_pipeline() {
    let controller = CompletionController::inline();
    let sink = InMemorySink::new();
    let mut assembler = assembler(controller.clone(), &sink, config(3));

    let good = produce(&mut assembler, &scene(0));
    good.wait().unwrap();

    controller.fail_next(1);
    let bad = assembler.produce_frame(&scene(1)).unwrap();
    assert!(matches!(bad.wait(), Err(FrameError::Completion(_))));

    assert!(matches!(
        assembler.produce_frame(&scene(2)),
        Err(FrameError::Completion(_))
    ));
    assert!(matches!(assembler.finish(), Err(FrameError::Completion(_))));
    assert_eq!(sink.frame_count(), 1);
    assert_eq!(assembler.stats().failed, 1);
}

#[test]
fn dropping_without_finish_releases_the_gate() {
    let controller = CompletionController::manual();
    let sink = InMemorySink::new();
    let mut assembler = assembler(controller.clone(), &sink, config(2));
    let receipt = produce(&mut assembler, &scene(0));

    drop(assembler);
    assert_eq!(controller.release_all(), 1);
    assert!(matches!(receipt.wait_timeout(TIMEOUT), Some(Err(_))));
    assert!(!sink.is_finished());
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let sink = InMemorySink::new();
    let device = Arc::new(SoftwareDevice::default());

    let mut zero_depth = config(3);
    zero_depth.frames_in_flight = 0;
    let err = FrameAssembler::new(device.clone(), Box::new(sink.clone()), zero_depth).unwrap_err();
    assert!(matches!(err, FrameError::Configuration(_)));

    let mut msaa8 = config(3);
    msaa8.sample_count = 8;
    let err = FrameAssembler::new(device, Box::new(sink), msaa8).unwrap_err();
    assert!(matches!(err, FrameError::Configuration(_)));
}
