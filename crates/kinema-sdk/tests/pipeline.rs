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
use kinema_sdk::prelude::*;
use kinema_sdk::ConfigError;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

fn small_config() -> PipelineConfig {
    PipelineConfig {
        width: 24,
        height: 16,
        sample_count: 1,
        constant_capacity_bytes: 3 * 64 * 1024,
        start_time: PresentationTime::new(0, 24),
        frame_rate: FrameRate::fps(24),
        readiness_poll_interval_ms: 1,
        ..PipelineConfig::default()
    }
}

fn spinning_cube(angle: f32) -> SceneGraph {
    let mut registry = MeshRegistry::new();
    registry
        .register(primitives::cube("cube", Material::default()).unwrap())
        .unwrap();
    let mut scene = SceneGraph::new();
    scene
        .add_node(
            &registry,
            NodeDescriptor::new("cube", "cube")
                .with_transform(Mat4::from_quat(Quat::from_rotation_y(angle))),
        )
        .unwrap();
    scene.add_light(Light::default());
    scene
}

/// Retries while every output image is still held by frames awaiting delivery.
fn produce(pipeline: &mut FramePipeline, scene: &SceneGraph) -> FrameReceipt {
    loop {
        match pipeline.produce_frame(scene) {
            Ok(receipt) => return receipt,
            Err(err) if err.is_recoverable() => std::thread::sleep(Duration::from_millis(1)),
            Err(err) => panic!("frame production failed: {err}"),
        }
    }
}

#[test]
fn test_builds_on_the_software_device_by_default() {
    let sink = InMemorySink::new();
    let mut pipeline = FramePipeline::builder()
        .config(small_config())
        .sink(sink.clone())
        .build()
        .unwrap();

    let mut receipts = Vec::new();
    for frame in 0..6 {
        receipts.push(produce(&mut pipeline, &spinning_cube(frame as f32 * 0.3)));
    }
    let stats = pipeline.finish().unwrap();

    assert_eq!(stats.produced, 6);
    assert_eq!(stats.delivered, 6);
    assert!(sink.is_finished());
    let expected: Vec<_> = (0..6).map(|k| PresentationTime::new(k, 24)).collect();
    assert_eq!(sink.times(), expected);
    for (k, receipt) in receipts.iter().enumerate() {
        let delivered = receipt.wait().unwrap();
        assert_eq!(delivered.sequence, k as u64);
        assert_eq!(delivered.time, PresentationTime::new(k as i64, 24));
    }
}

#[test]
fn test_explicit_device_is_used() {
    let controller = kinema_infra::CompletionController::inline();
    let device = Arc::new(kinema_infra::SoftwareDevice::new(controller.clone()));
    let sink = InMemorySink::new();
    let mut pipeline = FramePipeline::builder()
        .config(small_config())
        .device(device)
        .sink(sink.clone())
        .build()
        .unwrap();

    pipeline.produce_frame(&spinning_cube(0.0)).unwrap();
    assert_eq!(controller.in_flight(), 0);
    pipeline.finish().unwrap();
    assert_eq!(sink.frame_count(), 1);
}

#[test]
fn test_build_requires_a_sink() {
    let err = FramePipeline::builder()
        .config(small_config())
        .build()
        .err()
        .unwrap();
    assert!(err.to_string().contains("sink"));
}

#[test]
fn test_build_rejects_invalid_config() {
    let err = FramePipeline::builder()
        .config(PipelineConfig {
            frames_in_flight: 0,
            ..small_config()
        })
        .sink(InMemorySink::new())
        .build()
        .err()
        .unwrap();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::FramesInFlight(0))
    ));
}

#[test]
fn test_config_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let config = small_config();
    file.write_all(config.to_json().unwrap().as_bytes()).unwrap();
    assert_eq!(PipelineConfig::load(file.path()).unwrap(), config);

    let missing = file.path().with_extension("missing");
    assert!(matches!(
        PipelineConfig::load(&missing),
        Err(ConfigError::Io { .. })
    ));
}
