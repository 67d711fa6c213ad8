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

//! Provides the public, backend-agnostic rendering contracts.
//!
//! This module defines the "common language" for all rendering operations: the
//! abstract `traits` (like [`GraphicsDevice`]), the descriptors and opaque handles
//! used to talk to a device, and the error types shared by every backend.
//!
//! Concrete backends (the CPU software rasterizer and the wgpu device) live in
//! `kinema-infra`. The lanes and agents only ever see these traits.

pub mod api;
pub mod error;
pub mod traits;

pub use self::api::*;
pub use self::error::{CapacityError, PipelineError, RenderError, ResourceError, ShaderError};
pub use self::traits::{CommandEncoder, GraphicsDevice, RenderPass};

/// Default number of frames that may be in flight (submitted but not completed) at once.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;
