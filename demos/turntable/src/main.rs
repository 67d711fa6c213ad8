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
//! Renders a turntable of batched and unbatched cubes to `frame_#####.png` files.
//!
//! ```text
//! turntable [--frames N] [--out DIR] [--config FILE] [--gpu]
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use kinema_sdk::prelude::*;
use kinema_sdk::FramePipelineBuilder;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const RING_CUBES: usize = 8;

/// Renders a turntable of batched and unbatched cubes to a PNG sequence.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Options {
    /// Number of frames to render.
    #[arg(long, default_value_t = 90)]
    frames: usize,
    /// Directory the `frame_#####.png` files are written to.
    #[arg(long, default_value = "turntable-frames")]
    out: PathBuf,
    /// Pipeline configuration file (JSON).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Render on the GPU instead of the software device.
    #[arg(long)]
    gpu: bool,
}

/// The turntable scene and the node spun every frame.
struct Turntable {
    scene: SceneGraph,
    table: NodeId,
}

impl Turntable {
    fn new() -> Result<Self> {
        let mut registry = MeshRegistry::new();
        registry.register(primitives::cube(
            "cube",
            Material::from_color(LinearRgba::rgb(0.8, 0.8, 0.8)),
        )?)?;

        let mut scene = SceneGraph::new();
        let table = scene.add_node(
            &registry,
            NodeDescriptor::new("table", "cube")
                .with_transform(Mat4::from_scale(Vec3::new(3.0, 0.1, 3.0))),
        )?;
        // The table's scale is undone so the cubes keep their shape.
        let unscale = Mat4::from_scale(Vec3::new(1.0 / 3.0, 10.0, 1.0 / 3.0));
        for i in 0..RING_CUBES {
            let angle = i as f32 * std::f32::consts::TAU / RING_CUBES as f32;
            let position = Vec3::new(1.1 * angle.cos(), 0.3, 1.1 * angle.sin());
            scene.add_node(
                &registry,
                NodeDescriptor::new(format!("ring {i}"), "cube")
                    .with_parent(table)
                    .with_batch_key("ring")
                    .with_transform(
                        unscale
                            * Mat4::from_translation(position)
                            * Mat4::from_scale(Vec3::splat(0.3)),
                    ),
            )?;
        }
        scene.add_node(
            &registry,
            NodeDescriptor::new("centerpiece", "cube")
                .with_parent(table)
                .with_transform(unscale * Mat4::from_translation(Vec3::new(0.0, 0.55, 0.0)))
                .with_override(
                    MaterialSlot::new(0, 0),
                    MaterialOverride::base_color(LinearRgba::rgb(0.9, 0.3, 0.1)),
                ),
        )?;

        scene.add_light(Light::default());
        scene.add_light(Light::point(
            Vec3::new(0.0, 2.5, 2.0),
            LinearRgba::rgb(0.4, 0.5, 1.0),
            3.0,
        ));
        scene
            .camera_mut()
            .look_at(Vec3::new(0.0, 2.5, 5.0), Vec3::ZERO, Vec3::Y);
        Ok(Self { scene, table })
    }

    fn spin_to(&mut self, angle: f32) -> Result<()> {
        self.scene.set_transform(
            self.table,
            Mat4::from_rotation_y(angle) * Mat4::from_scale(Vec3::new(3.0, 0.1, 3.0)),
        )?;
        Ok(())
    }
}

fn builder(options: &Options) -> Result<FramePipelineBuilder> {
    let builder = FramePipeline::builder();
    if options.gpu {
        gpu(builder)
    } else {
        Ok(builder.software())
    }
}

#[cfg(feature = "gpu")]
fn gpu(builder: FramePipelineBuilder) -> Result<FramePipelineBuilder> {
    builder.gpu()
}

#[cfg(not(feature = "gpu"))]
fn gpu(_builder: FramePipelineBuilder) -> Result<FramePipelineBuilder> {
    anyhow::bail!("This build of the turntable has no GPU support")
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("wgpu_core", log::LevelFilter::Warn)
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .init();

    let options = Options::parse();
    let config = match &options.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let sink = PngSequenceSink::new(&options.out, "frame")
        .with_context(|| format!("Failed to open output directory {:?}", options.out))?;

    let mut pipeline = builder(&options)?.config(config).sink(sink).build()?;
    let mut turntable = Turntable::new()?;

    let started = Instant::now();
    let step = std::f32::consts::TAU / options.frames.max(1) as f32;
    for frame in 0..options.frames {
        turntable.spin_to(frame as f32 * step)?;
        loop {
            match pipeline.produce_frame(&turntable.scene) {
                Ok(_) => break,
                Err(err) if err.is_recoverable() => {
                    log::debug!("Frame {frame} postponed: {err}");
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(err) => return Err(err).context(format!("Failed to produce frame {frame}")),
            }
        }
    }

    let stats = pipeline.finish()?;
    log::info!(
        "Wrote {} frames to {:?} in {:.2?} (peak constant usage {} bytes)",
        stats.delivered,
        options.out,
        started.elapsed(),
        stats.peak_constant_bytes,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_line_is_well_formed() {
        Options::command().debug_assert();
    }

    #[test]
    fn defaults_and_flags_parse() {
        let options = Options::try_parse_from(["turntable"]).unwrap();
        assert_eq!(options.frames, 90);
        assert_eq!(options.out, PathBuf::from("turntable-frames"));
        assert!(options.config.is_none());
        assert!(!options.gpu);

        let options = Options::try_parse_from([
            "turntable", "--frames", "12", "--out", "shots", "--config", "kinema.json", "--gpu",
        ])
        .unwrap();
        assert_eq!(options.frames, 12);
        assert_eq!(options.out, PathBuf::from("shots"));
        assert_eq!(options.config, Some(PathBuf::from("kinema.json")));
        assert!(options.gpu);

        assert!(Options::try_parse_from(["turntable", "--frames", "many"]).is_err());
    }
}
