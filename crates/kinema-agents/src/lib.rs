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
//! Cross-frame policy of the pipeline.
//!
//! Agents decide *when* the lanes run and what happens to their results: how many
//! frames may be in flight, in which order finished images reach the sink, and how a
//! failure anywhere shuts the pipeline down without leaving a thread blocked.

#![warn(missing_docs)]

pub mod frame_agent;

pub use frame_agent::{
    DeliveredFrame, FrameAssembler, FrameAssemblerConfig, FrameError, FrameReceipt, FrameStats,
    FrameThrottle, SinkAdapter, ThrottleError, ThrottlePermit, DEFAULT_READINESS_POLL_INTERVAL,
    MAX_FRAMES_IN_FLIGHT_LIMIT,
};
