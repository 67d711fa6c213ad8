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
//! # Kinema Infra
//!
//! Concrete implementations of the contracts defined in `kinema-core`: a CPU software
//! rasterizer, a headless wgpu device (behind the `gpu` feature), and frame sinks.

#![warn(missing_docs)]

pub mod graphics;
pub mod sink;

pub use graphics::software::{CompletionController, CompletionMode, SoftwareDevice};
#[cfg(feature = "gpu")]
pub use graphics::wgpu::WgpuDevice;
pub use sink::{InMemorySink, PngSequenceSink, RecordedFrame};
