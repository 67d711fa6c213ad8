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
//! Pipeline configuration, loadable from JSON.

use kinema_agents::{FrameAssemblerConfig, FrameError, MAX_FRAMES_IN_FLIGHT_LIMIT};
use kinema_core::math::{Extent2D, LinearRgba};
use kinema_core::renderer::{DeviceLimits, MAX_FRAMES_IN_FLIGHT};
use kinema_core::sink::{FrameRate, PresentationTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors of loading or validating a [`PipelineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read pipeline config {path:?}: {source}")]
    Io {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The JSON is malformed or has fields of the wrong type.
    #[error("Failed to parse pipeline config: {0}")]
    Parse(#[from] serde_json::Error),
    /// Width or height is zero.
    #[error("Output extent {width}x{height} is empty")]
    ZeroExtent {
        /// Configured width.
        width: u32,
        /// Configured height.
        height: u32,
    },
    /// The sample count is neither 1 nor 4.
    #[error("Sample count {0} is not supported, use 1 or 4")]
    UnsupportedSampleCount(u32),
    /// The number of frames in flight is outside `1..=8`.
    #[error("{0} frames in flight is outside 1..={max}", max = MAX_FRAMES_IN_FLIGHT_LIMIT)]
    FramesInFlight(usize),
    /// A term of the frame rate is zero.
    #[error("Frame rate {}/{} is invalid", .0.numerator, .0.denominator)]
    FrameRate(FrameRate),
    /// The constant ring cannot give every in-flight frame at least one aligned block.
    #[error(
        "Constant capacity of {capacity} bytes cannot hold {frames_in_flight} frames of at least {alignment} bytes"
    )]
    ConstantCapacity {
        /// Configured capacity.
        capacity: u64,
        /// Configured frames in flight.
        frames_in_flight: usize,
        /// The smallest per-frame block.
        alignment: u64,
    },
    /// The output image pool holds no image.
    #[error("The output image pool is empty")]
    EmptyImagePool,
}

impl From<ConfigError> for FrameError {
    fn from(err: ConfigError) -> Self {
        FrameError::Configuration(err.to_string())
    }
}

/// Everything needed to set up a [`FramePipeline`](crate::FramePipeline).
///
/// Missing JSON fields take their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// MSAA sample count, 1 or 4.
    pub sample_count: u32,
    /// Maximum number of frames in flight.
    pub frames_in_flight: usize,
    /// Output frame rate.
    pub frame_rate: FrameRate,
    /// Presentation time of the first frame.
    pub start_time: PresentationTime,
    /// Size of the shared constant ring in bytes.
    pub constant_capacity_bytes: u64,
    /// Largest instance count of one batched draw.
    pub max_instances_per_draw: u32,
    /// Largest light count of one frame.
    pub max_lights: u32,
    /// Number of output images alive at once.
    pub image_pool_size: usize,
    /// Clear color of the scene pass.
    pub clear_color: LinearRgba,
    /// Sink readiness re-poll interval, in milliseconds.
    pub readiness_poll_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            sample_count: 4,
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            frame_rate: FrameRate::fps(30),
            start_time: PresentationTime::zero(600),
            constant_capacity_bytes: 4 << 20,
            max_instances_per_draw: 1024,
            max_lights: 16,
            image_pool_size: MAX_FRAMES_IN_FLIGHT + 2,
            clear_color: LinearRgba::BLACK,
            readiness_poll_interval_ms: 10,
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded pipeline config from {path:?}");
        Ok(config)
    }

    /// Serializes the configuration as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The output extent.
    pub fn extent(&self) -> Extent2D {
        Extent2D::new(self.width, self.height)
    }

    /// Checks every field against the limits the pipeline supports.
    ///
    /// The constant capacity is checked against the WebGPU default offset alignment;
    /// a device with coarser alignment may still reject it at setup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ZeroExtent {
                width: self.width,
                height: self.height,
            });
        }
        if !matches!(self.sample_count, 1 | 4) {
            return Err(ConfigError::UnsupportedSampleCount(self.sample_count));
        }
        if !(1..=MAX_FRAMES_IN_FLIGHT_LIMIT).contains(&self.frames_in_flight) {
            return Err(ConfigError::FramesInFlight(self.frames_in_flight));
        }
        if !self.frame_rate.is_valid() {
            return Err(ConfigError::FrameRate(self.frame_rate));
        }
        let alignment = DeviceLimits::default().constant_offset_alignment();
        if self.constant_capacity_bytes / (self.frames_in_flight as u64) < alignment
            || self.constant_capacity_bytes > u32::MAX as u64
        {
            return Err(ConfigError::ConstantCapacity {
                capacity: self.constant_capacity_bytes,
                frames_in_flight: self.frames_in_flight,
                alignment,
            });
        }
        if self.image_pool_size == 0 {
            return Err(ConfigError::EmptyImagePool);
        }
        Ok(())
    }

    /// The assembler configuration this pipeline configuration describes.
    pub fn assembler_config(&self) -> FrameAssemblerConfig {
        FrameAssemblerConfig {
            extent: self.extent(),
            sample_count: self.sample_count,
            frames_in_flight: self.frames_in_flight,
            constant_capacity: self.constant_capacity_bytes,
            max_instances_per_draw: self.max_instances_per_draw,
            max_lights: self.max_lights,
            clear_color: self.clear_color,
            image_pool_size: self.image_pool_size,
            frame_rate: self.frame_rate,
            start_time: self.start_time,
            readiness_poll_interval: Duration::from_millis(self.readiness_poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.image_pool_size, config.frames_in_flight + 2);
        assert_eq!(config.assembler_config().extent, Extent2D::new(640, 360));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config =
            PipelineConfig::from_json(r#"{ "width": 320, "frame_rate": { "numerator": 24000, "denominator": 1001 } }"#)
                .unwrap();
        assert_eq!(config.width, 320);
        assert_eq!(config.height, 360);
        assert_eq!(config.frame_rate.numerator, 24000);
        assert_eq!(config.frames_in_flight, 3);
    }

    #[test]
    fn test_rejections() {
        let cases = [
            (r#"{ "width": 0 }"#, "empty"),
            (r#"{ "sample_count": 2 }"#, "Sample count 2"),
            (r#"{ "frames_in_flight": 9 }"#, "9 frames in flight"),
            (r#"{ "frame_rate": { "numerator": 0, "denominator": 1 } }"#, "0/1"),
            (r#"{ "constant_capacity_bytes": 512 }"#, "512 bytes"),
            (r#"{ "image_pool_size": 0 }"#, "pool is empty"),
        ];
        for (json, message) in cases {
            let err = PipelineConfig::from_json(json).unwrap_err();
            assert!(err.to_string().contains(message), "{json}: {err}");
        }
        assert!(matches!(
            PipelineConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_config_errors_are_configuration_frame_errors() {
        let err: FrameError = ConfigError::EmptyImagePool.into();
        assert!(matches!(err, FrameError::Configuration(_)));
    }
}
