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

//! # Kinema Core
//!
//! Foundational crate containing the traits, core types and interface contracts
//! shared by every stage of the frame-production pipeline: the backend-agnostic
//! rendering API, the frame constant allocator, and the contract an external
//! frame sink must honour.

#![warn(missing_docs)]

pub mod math;
pub mod renderer;
pub mod sink;

pub use renderer::MAX_FRAMES_IN_FLIGHT;
