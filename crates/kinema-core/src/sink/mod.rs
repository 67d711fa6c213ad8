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

//! The output side of the pipeline: finished images, their timestamps and the
//! contract every frame consumer implements.

mod error;
mod image;
mod readiness;
mod time;

pub use self::error::SinkError;
pub use self::image::{FrameImage, ImagePool, FRAME_IMAGE_BYTES_PER_PIXEL};
pub use self::readiness::ReadinessSignal;
pub use self::time::{FrameRate, PresentationTime};

/// A consumer of finished frames, such as a video encoder or an image sequence writer.
///
/// Frames are appended strictly in production order, one at a time, from a single
/// thread. The feeder never appends while `is_ready_for_more_data` is false.
pub trait FrameSink: Send + 'static {
    /// Whether the sink can accept another frame right now.
    fn is_ready_for_more_data(&self) -> bool;

    /// Hands the sink a signal to raise when its readiness may have changed.
    ///
    /// A sink that can flip from not-ready to ready on its own should keep the
    /// signal and call [`ReadinessSignal::notify`] when it does, without holding any
    /// lock that `is_ready_for_more_data` also takes. Sinks that are always ready can
    /// ignore it.
    fn bind_readiness(&mut self, _signal: ReadinessSignal) {}

    /// Appends one frame presented at `time`.
    fn append(&mut self, image: FrameImage, time: PresentationTime) -> Result<(), SinkError>;

    /// Flushes and finalizes the output. Blocks until the output is complete.
    fn finish(&mut self) -> Result<(), SinkError>;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn is_ready_for_more_data(&self) -> bool {
        (**self).is_ready_for_more_data()
    }

    fn bind_readiness(&mut self, signal: ReadinessSignal) {
        (**self).bind_readiness(signal)
    }

    fn append(&mut self, image: FrameImage, time: PresentationTime) -> Result<(), SinkError> {
        (**self).append(image, time)
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        (**self).finish()
    }
}
