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
use crate::config::PipelineConfig;
use anyhow::{anyhow, Context, Result};
use kinema_agents::{FrameAssembler, FrameError, FrameReceipt, FrameStats};
use kinema_core::renderer::GraphicsDevice;
use kinema_core::sink::FrameSink;
use kinema_data::scene::SceneGraph;
use kinema_infra::{CompletionController, SoftwareDevice};
use std::sync::Arc;
use std::time::Duration;

/// Number of completion workers of the default software device.
const SOFTWARE_COMPLETION_WORKERS: usize = 2;

/// How often the headless wgpu device polls for finished submissions.
#[cfg(feature = "gpu")]
const GPU_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Assembles a [`FramePipeline`] from a configuration, a device and a sink.
#[derive(Default)]
pub struct FramePipelineBuilder {
    config: PipelineConfig,
    device: Option<Arc<dyn GraphicsDevice>>,
    sink: Option<Box<dyn FrameSink>>,
}

impl FramePipelineBuilder {
    /// Replaces the whole configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Renders on `device`.
    pub fn device(mut self, device: Arc<dyn GraphicsDevice>) -> Self {
        self.device = Some(device);
        self
    }

    /// Renders on the CPU software rasterizer.
    ///
    /// This is also what [`build`](Self::build) picks when no device was given.
    pub fn software(self) -> Self {
        self.device(software_device())
    }

    /// Renders on a headless wgpu adapter.
    #[cfg(feature = "gpu")]
    pub fn gpu(self) -> Result<Self> {
        let device = kinema_infra::WgpuDevice::headless(
            kinema_infra::graphics::wgpu::PowerPreference::HighPerformance,
            GPU_POLL_INTERVAL,
        )
        .context("Failed to create the headless wgpu device")?;
        Ok(self.device(Arc::new(device)))
    }

    /// Delivers frames to `sink`.
    pub fn sink(mut self, sink: impl FrameSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Validates the configuration and starts the pipeline.
    pub fn build(self) -> Result<FramePipeline> {
        let Self {
            config,
            device,
            sink,
        } = self;
        config.validate().context("Invalid pipeline configuration")?;
        let sink = sink.ok_or_else(|| anyhow!("A frame pipeline needs a sink"))?;
        let device = match device {
            Some(device) => device,
            None => {
                log::info!("No device given, rendering on the software rasterizer");
                software_device()
            }
        };

        let assembler = FrameAssembler::new(device, sink, config.assembler_config())
            .context("Failed to set up the frame assembler")?;
        log::info!(
            "Frame pipeline ready: {}x{}, {}x MSAA, {} frames in flight at {}/{} fps",
            config.width,
            config.height,
            config.sample_count,
            config.frames_in_flight,
            config.frame_rate.numerator,
            config.frame_rate.denominator,
        );
        Ok(FramePipeline { config, assembler })
    }
}

fn software_device() -> Arc<dyn GraphicsDevice> {
    let completions =
        CompletionController::threaded(SOFTWARE_COMPLETION_WORKERS, Duration::ZERO, 0);
    Arc::new(SoftwareDevice::new(completions))
}

/// A running frame-production pipeline.
///
/// Each [`produce_frame`](Self::produce_frame) renders one snapshot of the scene and
/// hands it to the sink in production order, timestamped on the configured frame grid.
/// [`finish`](Self::finish) must be called to flush the frames still in flight.
pub struct FramePipeline {
    config: PipelineConfig,
    assembler: FrameAssembler,
}

impl FramePipeline {
    /// Starts building a pipeline.
    pub fn builder() -> FramePipelineBuilder {
        FramePipelineBuilder::default()
    }

    /// The configuration the pipeline was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Renders the current state of `scene` into the next frame.
    ///
    /// Blocks while the configured number of frames are in flight. Errors for which
    /// [`FrameError::is_recoverable`] holds may be retried.
    pub fn produce_frame(&mut self, scene: &SceneGraph) -> Result<FrameReceipt, FrameError> {
        self.assembler.produce_frame(scene)
    }

    /// Counters of the frames produced so far.
    pub fn stats(&self) -> FrameStats {
        self.assembler.stats()
    }

    /// Waits for every frame in flight, delivers it and finalizes the sink.
    pub fn finish(mut self) -> Result<FrameStats, FrameError> {
        let stats = self.assembler.finish()?;
        log::info!(
            "Frame pipeline finished: {} produced, {} delivered",
            stats.produced,
            stats.delivered
        );
        Ok(stats)
    }
}
