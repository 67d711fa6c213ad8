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
//! A deterministic CPU backend.
//!
//! The [`SoftwareDevice`] rasterizes the scene program on the submitting thread and
//! reports completion through a [`CompletionController`]. It is the reference backend of
//! the test suite and the default of the turntable demo.

mod command;
mod completion;
mod device;
mod executor;
mod raster;

pub use self::command::{SoftwareCommandEncoder, SoftwareRenderPass};
pub use self::completion::{CompletionController, CompletionMode};
pub use self::device::SoftwareDevice;
