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
use super::ThrottleError;
use kinema_core::renderer::{CapacityError, RenderError};
use kinema_core::sink::SinkError;
use std::sync::Arc;
use thiserror::Error;

/// Errors of frame production.
///
/// Only [`ResourceUnavailable`](FrameError::ResourceUnavailable) is recoverable; every
/// other variant leaves the pipeline poisoned, and later calls report the same error.
#[derive(Debug, Error, Clone)]
pub enum FrameError {
    /// Setup failed: device, pipeline or resource creation, or an invalid configuration.
    #[error("Frame pipeline configuration error: {0}")]
    Configuration(String),
    /// The frame's constants exceed the per-frame budget of the allocator.
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    /// No output image was available from the pool. The frame may be retried.
    #[error("No output image available: {0}")]
    ResourceUnavailable(String),
    /// The GPU work of a frame failed asynchronously.
    #[error("GPU work of a frame failed: {0}")]
    Completion(Arc<RenderError>),
    /// The sink refused a frame or failed to finish.
    #[error("The frame sink failed: {0}")]
    Sink(#[from] SinkError),
    /// The pipeline was shut down before the frame could be delivered.
    #[error("The frame pipeline is shut down: {0}")]
    Poisoned(String),
}

impl FrameError {
    /// Whether the caller may retry the frame that failed with this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::ResourceUnavailable(_))
    }
}

impl From<RenderError> for FrameError {
    fn from(err: RenderError) -> Self {
        FrameError::Completion(Arc::new(err))
    }
}

impl From<ThrottleError> for FrameError {
    fn from(err: ThrottleError) -> Self {
        match err {
            ThrottleError::Poisoned(reason) => FrameError::Poisoned(reason),
        }
    }
}
