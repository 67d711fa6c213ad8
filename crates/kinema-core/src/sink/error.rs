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

use std::fmt;

/// Errors reported by a [`FrameSink`](super::FrameSink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink was closed and accepts no more frames.
    Closed,
    /// The sink refused a frame, e.g. because its extent does not match.
    Rejected(String),
    /// Writing a frame failed.
    AppendFailed(String),
    /// Finalizing the output failed.
    FinishFailed(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Closed => write!(f, "The frame sink is closed"),
            SinkError::Rejected(reason) => write!(f, "The frame sink rejected a frame: {reason}"),
            SinkError::AppendFailed(details) => write!(f, "Failed to append frame: {details}"),
            SinkError::FinishFailed(details) => write!(f, "Failed to finish output: {details}"),
        }
    }
}

impl std::error::Error for SinkError {}
