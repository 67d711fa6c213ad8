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
//! The frame assembler: one call per produced frame, from throttle acquisition to
//! asynchronous, ordered delivery.

use super::gate::{CompletedFrame, GateMessage, OrderingGate};
use super::health::PipelineHealth;
use super::sink_adapter::DEFAULT_READINESS_POLL_INTERVAL;
use super::{FrameError, FrameReceipt, FrameThrottle, SinkAdapter, ThrottlePermit};
use kinema_core::math::{Extent2D, LinearRgba};
use kinema_core::renderer::{
    CompletedSubmission, CompletionCallback, FrameConstantBuffer, GraphicsDevice, RenderError,
    MAX_FRAMES_IN_FLIGHT,
};
use kinema_core::sink::{
    FrameImage, FrameRate, FrameSink, ImagePool, PresentationTime, ReadinessSignal,
};
use kinema_data::scene::SceneGraph;
use kinema_lanes::render_lane::{
    ExtractLane, LaneError, PlanError, ReadbackLayout, SceneLaneConfig, SceneRenderLane,
    SceneSnapshot,
};
use std::sync::Arc;
use std::time::Duration;

/// Largest supported number of frames in flight.
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 8;

/// Everything the assembler needs to know up front.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAssemblerConfig {
    /// Output size.
    pub extent: Extent2D,
    /// MSAA sample count of the scene pass, 1 or 4.
    pub sample_count: u32,
    /// Depth of the in-flight throttle.
    pub frames_in_flight: usize,
    /// Bytes of the shared constant ring, split evenly between in-flight frames.
    pub constant_capacity: u64,
    /// Largest instance count of one batched draw.
    pub max_instances_per_draw: u32,
    /// Largest light count of one frame.
    pub max_lights: u32,
    /// Clear color of the scene pass.
    pub clear_color: LinearRgba,
    /// Number of output images that may be alive at once.
    pub image_pool_size: usize,
    /// Output frame rate.
    pub frame_rate: FrameRate,
    /// Presentation time of the first frame.
    pub start_time: PresentationTime,
    /// How often sink readiness is re-polled while waiting without a notification.
    pub readiness_poll_interval: Duration,
}

impl Default for FrameAssemblerConfig {
    fn default() -> Self {
        Self {
            extent: Extent2D::new(640, 360),
            sample_count: 4,
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            constant_capacity: 4 << 20,
            max_instances_per_draw: 1024,
            max_lights: 16,
            clear_color: LinearRgba::BLACK,
            image_pool_size: MAX_FRAMES_IN_FLIGHT + 2,
            frame_rate: FrameRate::default(),
            start_time: PresentationTime::default(),
            readiness_poll_interval: DEFAULT_READINESS_POLL_INTERVAL,
        }
    }
}

impl FrameAssemblerConfig {
    fn check(&self) -> Result<(), FrameError> {
        let fail = |reason: String| Err(FrameError::Configuration(reason));
        if self.extent.width == 0 || self.extent.height == 0 {
            return fail(format!("zero output extent {:?}", self.extent));
        }
        if !(1..=MAX_FRAMES_IN_FLIGHT_LIMIT).contains(&self.frames_in_flight) {
            return fail(format!(
                "{} frames in flight, expected 1..={MAX_FRAMES_IN_FLIGHT_LIMIT}",
                self.frames_in_flight
            ));
        }
        if self.image_pool_size == 0 {
            return fail("the output image pool is empty".into());
        }
        if !self.frame_rate.is_valid() {
            return fail(format!("invalid frame rate {:?}", self.frame_rate));
        }
        Ok(())
    }

    fn lane_config(&self) -> SceneLaneConfig {
        SceneLaneConfig {
            extent: self.extent,
            sample_count: self.sample_count,
            max_instances_per_draw: self.max_instances_per_draw,
            max_lights: self.max_lights,
            clear_color: self.clear_color,
            readback_slots: self.frames_in_flight,
        }
    }
}

/// Counters of an assembler's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames submitted to the device.
    pub produced: u64,
    /// Frames appended to the sink.
    pub delivered: u64,
    /// Submitted frames that never reached the sink.
    pub failed: u64,
    /// The largest number of frames that were in flight at once.
    pub throttle_high_water_mark: usize,
    /// The largest constant footprint of a single frame, in bytes.
    pub peak_constant_bytes: u64,
}

/// Produces frames from a [`SceneGraph`] and delivers them, in order, to a sink.
///
/// `produce_frame` runs on the caller's thread up to submission; completion, readback
/// and delivery happen asynchronously. Call [`finish`](Self::finish) to wait for every
/// frame and finalize the sink.
pub struct FrameAssembler {
    config: FrameAssemblerConfig,
    device: Arc<dyn GraphicsDevice>,
    constants: FrameConstantBuffer,
    lane: SceneRenderLane,
    extract: ExtractLane,
    snapshot: SceneSnapshot,
    throttle: FrameThrottle,
    pool: ImagePool,
    readiness: ReadinessSignal,
    health: Arc<PipelineHealth>,
    gate: Option<OrderingGate>,
    next_sequence: u64,
    produced: u64,
}

impl std::fmt::Debug for FrameAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAssembler")
            .field("config", &self.config)
            .field("throttle", &self.throttle)
            .field("next_sequence", &self.next_sequence)
            .field("finished", &self.gate.is_none())
            .finish()
    }
}

impl FrameAssembler {
    /// Builds the scene pass on `device` and starts the ordering gate feeding `sink`.
    ///
    /// # Errors
    /// [`FrameError::Configuration`] for an invalid configuration or any failure to
    /// create the device resources.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        sink: Box<dyn FrameSink>,
        config: FrameAssemblerConfig,
    ) -> Result<Self, FrameError> {
        config.check()?;
        let lane_config = config.lane_config();
        let constants = FrameConstantBuffer::new(
            device.as_ref(),
            config.constant_capacity,
            config.frames_in_flight,
            lane_config.binding_slack(),
            "Scene",
        )
        .map_err(|e| FrameError::Configuration(format!("frame constant buffer: {e}")))?;
        let lane = match SceneRenderLane::new(device.as_ref(), &constants, lane_config) {
            Ok(lane) => lane,
            Err(e) => {
                constants.destroy(device.as_ref());
                return Err(FrameError::Configuration(format!("scene pass: {e}")));
            }
        };

        let throttle = FrameThrottle::new(config.frames_in_flight);
        let adapter = SinkAdapter::new(
            sink,
            config.start_time,
            config.frame_rate,
            config.readiness_poll_interval,
        );
        let readiness = adapter.readiness();
        let health = Arc::new(PipelineHealth::new(throttle.clone(), readiness.clone()));
        let gate = OrderingGate::spawn(adapter, health.clone())
            .map_err(|e| FrameError::Configuration(format!("ordering gate thread: {e}")))?;

        log::info!(
            "Frame assembler ready: {}x{} at {:.3} fps, {} frames in flight, {} pooled images",
            config.extent.width,
            config.extent.height,
            config.frame_rate.as_f64(),
            config.frames_in_flight,
            config.image_pool_size
        );

        Ok(Self {
            pool: ImagePool::new(config.extent, config.image_pool_size),
            config,
            device,
            constants,
            lane,
            extract: ExtractLane::new(),
            snapshot: SceneSnapshot::new(),
            throttle,
            readiness,
            health,
            gate: Some(gate),
            next_sequence: 0,
            produced: 0,
        })
    }

    /// The configuration the assembler was built with.
    pub fn config(&self) -> &FrameAssemblerConfig {
        &self.config
    }

    /// The in-flight throttle.
    pub fn throttle(&self) -> &FrameThrottle {
        &self.throttle
    }

    /// The pool output images are drawn from.
    pub fn image_pool(&self) -> &ImagePool {
        &self.pool
    }

    /// A snapshot of the counters.
    pub fn stats(&self) -> FrameStats {
        FrameStats {
            produced: self.produced,
            delivered: self.health.delivered(),
            failed: self.health.failed(),
            throttle_high_water_mark: self.throttle.high_water_mark(),
            peak_constant_bytes: self.constants.peak_frame_bytes(),
        }
    }

    /// Renders the current state of `scene` and schedules its delivery.
    ///
    /// Blocks while `frames_in_flight` frames are outstanding. Returns once the frame
    /// is submitted; the receipt settles when the image reached the sink.
    ///
    /// # Errors
    /// * [`FrameError::ResourceUnavailable`] if every pooled image is in use. Nothing
    ///   was submitted and the call may be retried.
    /// * [`FrameError::Capacity`] if the frame's constants exceed the per-frame budget.
    ///   Nothing was submitted; the assembler is poisoned.
    /// * [`FrameError::Configuration`] if the scene has more lights than configured or
    ///   its geometry cannot be uploaded.
    /// * The pipeline's fatal error, once any frame failed.
    pub fn produce_frame(&mut self, scene: &SceneGraph) -> Result<FrameReceipt, FrameError> {
        self.health.check()?;
        let Some(gate) = self.gate.as_ref() else {
            return Err(FrameError::Poisoned("the frame assembler is finished".into()));
        };

        let permit = self
            .throttle
            .acquire()
            .map_err(|e| self.health.fatal().unwrap_or_else(|| e.into()))?;
        let Some(image) = self.pool.try_acquire() else {
            log::warn!(
                "All {} output images are in use; frame not produced",
                self.pool.capacity()
            );
            return Err(FrameError::ResourceUnavailable(format!(
                "all {} output images are in use",
                self.pool.capacity()
            )));
        };

        self.extract
            .run(scene, self.config.extent, &mut self.snapshot);
        let prepared = match self
            .lane
            .prepare(
                self.device.as_ref(),
                &self.snapshot,
                &mut self.constants,
                permit.slot(),
            ) {
            Ok(prepared) => prepared,
            Err(LaneError::Plan(PlanError::Capacity(e))) => {
                return Err(self.health.fail(FrameError::Capacity(e)));
            }
            Err(LaneError::Plan(e @ PlanError::TooManyLights { .. })) => {
                return Err(FrameError::Configuration(e.to_string()));
            }
            Err(LaneError::Resource(e)) => {
                return Err(self
                    .health
                    .fail(FrameError::Configuration(format!("scene upload: {e}"))));
            }
        };

        let (commands, readback) = self.lane.encode(self.device.as_ref(), &prepared);
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let receipt = FrameReceipt::new(sequence, prepared.slot, prepared.constant_range);

        let in_flight = InFlightFrame {
            sequence,
            permit,
            image,
            layout: self.lane.readback_layout(),
            gate: gate.sender(),
            receipt: receipt.clone(),
            health: self.health.clone(),
        };
        let on_complete: CompletionCallback = Box::new(move |result| in_flight.complete(result));

        if let Err(e) = self.device.submit(commands, Some(readback), on_complete) {
            // The callback, and the permit it held, are gone; the gate still needs
            // this sequence number to move past it.
            let err = self.health.fail(e.into());
            post(
                &gate.sender(),
                CompletedFrame {
                    sequence,
                    outcome: Err(err.clone()),
                    receipt,
                },
            );
            return Err(err);
        }

        self.produced += 1;
        log::debug!(
            "Frame {sequence} submitted: {} draws, {} bytes of constants",
            prepared.plan.draws.len(),
            prepared.constant_range.len()
        );
        Ok(receipt)
    }

    /// Waits for every in-flight frame, finalizes the sink and releases the device
    /// resources.
    ///
    /// # Errors
    /// The pipeline's fatal error if any frame failed, otherwise the sink's `finish`
    /// error.
    pub fn finish(&mut self) -> Result<FrameStats, FrameError> {
        let Some(gate) = self.gate.take() else {
            return Err(FrameError::Poisoned("the frame assembler is finished".into()));
        };

        log::info!(
            "Finishing: draining {} frames in flight",
            self.throttle.outstanding()
        );
        let drained = self.throttle.drain();
        let finished = gate.finish();

        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device did not go idle before teardown: {e}");
        }
        self.lane.destroy(self.device.as_ref());
        self.constants.destroy(self.device.as_ref());
        drop(drained);
        self.throttle.poison("the frame assembler is finished");

        let stats = self.stats();
        if let Some(fatal) = self.health.fatal() {
            return Err(fatal);
        }
        finished?;
        log::info!(
            "Finished: {} frames delivered, {} failed, peak {} constant bytes per frame",
            stats.delivered,
            stats.failed,
            stats.peak_constant_bytes
        );
        Ok(stats)
    }
}

impl Drop for FrameAssembler {
    fn drop(&mut self) {
        if self.gate.is_some() {
            log::warn!(
                "Frame assembler dropped without finish; {} frames in flight are abandoned",
                self.throttle.outstanding()
            );
            self.throttle.poison("the frame assembler was dropped");
            self.readiness.close();
        }
    }
}

/// Everything a frame's completion callback owns.
struct InFlightFrame {
    sequence: u64,
    permit: ThrottlePermit,
    image: FrameImage,
    layout: ReadbackLayout,
    gate: flume::Sender<GateMessage>,
    receipt: FrameReceipt,
    health: Arc<PipelineHealth>,
}

impl InFlightFrame {
    fn complete(self, result: Result<CompletedSubmission, RenderError>) {
        let Self {
            sequence,
            permit,
            mut image,
            layout,
            gate,
            receipt,
            health,
        } = self;

        let outcome = result
            .and_then(|done| {
                done.readback.ok_or_else(|| {
                    RenderError::ReadbackFailed("the submission returned no readback".into())
                })
            })
            .and_then(|bytes| layout.copy_to(&bytes, &mut image))
            .map(|()| image)
            .map_err(|e| health.fail(e.into()));
        log::trace!("Frame {sequence} completed (ok: {})", outcome.is_ok());

        post(
            &gate,
            CompletedFrame {
                sequence,
                outcome,
                receipt,
            },
        );
        // Released only after the gate has the frame, so a drain observes every frame.
        drop(permit);
    }
}

fn post(gate: &flume::Sender<GateMessage>, frame: CompletedFrame) {
    if let Err(flume::SendError(GateMessage::Completed(frame))) =
        gate.send(GateMessage::Completed(frame))
    {
        frame
            .receipt
            .settle(Err(FrameError::Poisoned("the ordering gate is gone".into())));
    }
}
