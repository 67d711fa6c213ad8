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
//! # Kinema SDK
//!
//! The application-facing entry point of Kinema. It wires a configuration, a graphics
//! device and a frame sink into a [`FramePipeline`] that turns successive states of a
//! [`SceneGraph`](kinema_data::scene::SceneGraph) into an ordered, timestamped frame stream.
//!
//! ```no_run
//! use kinema_sdk::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let sink = PngSequenceSink::new("frames", "frame")?;
//! let mut pipeline = FramePipeline::builder()
//!     .config(PipelineConfig::default())
//!     .sink(sink)
//!     .build()?;
//! let scene = SceneGraph::new();
//! pipeline.produce_frame(&scene)?;
//! pipeline.finish()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod config;
mod pipeline;

pub use config::{ConfigError, PipelineConfig};
pub use pipeline::{FramePipeline, FramePipelineBuilder};

/// The types most applications need.
pub mod prelude {
    pub use crate::{FramePipeline, PipelineConfig};
    pub use kinema_agents::{FrameError, FrameReceipt, FrameStats};
    pub use kinema_core::math::{Extent2D, LinearRgba, Mat4, Quat, Vec3};
    pub use kinema_core::sink::{FrameRate, FrameSink, PresentationTime};
    pub use kinema_data::assets::{primitives, Material, MeshRegistry};
    pub use kinema_data::scene::{
        Light, MaterialOverride, MaterialSlot, NodeDescriptor, NodeId, SceneGraph,
    };
    pub use kinema_infra::{InMemorySink, PngSequenceSink};
}
