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
//! The frame agent: turns "produce next frame" requests into an ordered, throttled
//! stream of images delivered to a [`FrameSink`](kinema_core::sink::FrameSink).
//!
//! The producing thread runs [`FrameAssembler::produce_frame`]. Completion callbacks
//! of the device post their results to an ordering gate thread, which owns the
//! [`SinkAdapter`] and appends images strictly in production order.

mod assembler;
mod error;
mod gate;
mod health;
mod receipt;
mod sink_adapter;
mod throttle;

pub use self::assembler::{
    FrameAssembler, FrameAssemblerConfig, FrameStats, MAX_FRAMES_IN_FLIGHT_LIMIT,
};
pub use self::error::FrameError;
pub use self::receipt::{DeliveredFrame, FrameReceipt};
pub use self::sink_adapter::{SinkAdapter, DEFAULT_READINESS_POLL_INTERVAL};
pub use self::throttle::{FrameThrottle, ThrottleError, ThrottlePermit};
