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
//! Feeds finished images to a [`FrameSink`] under its backpressure, stamping each with
//! the next presentation time.

use kinema_core::sink::{
    FrameImage, FrameRate, FrameSink, PresentationTime, ReadinessSignal, SinkError,
};
use std::time::Duration;

/// Default interval at which sink readiness is re-polled without a notification.
pub const DEFAULT_READINESS_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Wraps a [`FrameSink`] with the frame clock and the readiness wait.
///
/// Timestamps follow `start, start + d, start + 2d, ...` with `d = 1 / frame_rate`,
/// computed exactly. A frame whose append fails does not consume a timestamp.
pub struct SinkAdapter {
    sink: Box<dyn FrameSink>,
    readiness: ReadinessSignal,
    next_time: PresentationTime,
    frame_duration: PresentationTime,
    poll_interval: Duration,
    appended: u64,
}

impl std::fmt::Debug for SinkAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkAdapter")
            .field("next_time", &self.next_time)
            .field("frame_duration", &self.frame_duration)
            .field("appended", &self.appended)
            .finish()
    }
}

impl SinkAdapter {
    /// Wraps `sink` and binds it to a fresh readiness signal.
    pub fn new(
        mut sink: Box<dyn FrameSink>,
        start_time: PresentationTime,
        frame_rate: FrameRate,
        poll_interval: Duration,
    ) -> Self {
        let readiness = ReadinessSignal::new();
        sink.bind_readiness(readiness.clone());
        Self {
            sink,
            readiness,
            next_time: start_time,
            frame_duration: frame_rate.frame_duration(),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            appended: 0,
        }
    }

    /// The signal shared with the sink. Closing it aborts any readiness wait.
    pub fn readiness(&self) -> ReadinessSignal {
        self.readiness.clone()
    }

    /// The timestamp the next appended frame will get.
    pub fn next_time(&self) -> PresentationTime {
        self.next_time
    }

    /// Number of frames appended so far.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Waits until the sink is ready, then appends `image` at the next timestamp.
    ///
    /// # Errors
    /// [`SinkError::Closed`] if the readiness signal is closed while waiting, and any
    /// error of the sink's `append`.
    pub fn deliver(&mut self, image: FrameImage) -> Result<PresentationTime, SinkError> {
        let sink = &self.sink;
        self.readiness
            .wait_until(|| sink.is_ready_for_more_data(), self.poll_interval)?;

        let time = self.next_time;
        self.sink.append(image, time)?;
        self.next_time = self.next_time + self.frame_duration;
        self.appended += 1;
        Ok(time)
    }

    /// Finalizes the sink.
    pub fn finish(&mut self) -> Result<(), SinkError> {
        self.sink.finish()?;
        log::info!(
            "Sink finished after {} frames, ending at {}",
            self.appended,
            self.next_time
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinema_core::math::Extent2D;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        times: Arc<Mutex<Vec<PresentationTime>>>,
        finished: bool,
    }

    impl FrameSink for Recorder {
        fn is_ready_for_more_data(&self) -> bool {
            true
        }

        fn append(&mut self, _image: FrameImage, time: PresentationTime) -> Result<(), SinkError> {
            if self.finished {
                return Err(SinkError::Closed);
            }
            self.times.lock().unwrap().push(time);
            Ok(())
        }

        fn finish(&mut self) -> Result<(), SinkError> {
            self.finished = true;
            Ok(())
        }
    }

    fn image() -> FrameImage {
        FrameImage::new(Extent2D::new(1, 1), vec![0; 4]).unwrap()
    }

    #[test]
    fn test_timestamps_advance_by_the_frame_duration() {
        let recorder = Recorder::default();
        let times = recorder.times.clone();
        let rate = FrameRate {
            numerator: 24_000,
            denominator: 1001,
        };
        let mut adapter = SinkAdapter::new(
            Box::new(recorder),
            PresentationTime::new(5, 1),
            rate,
            DEFAULT_READINESS_POLL_INTERVAL,
        );
        for _ in 0..3 {
            adapter.deliver(image()).unwrap();
        }
        let expected: Vec<_> = (0..3)
            .map(|k| PresentationTime::new(5 * 24_000 + k * 1001, 24_000))
            .collect();
        assert_eq!(*times.lock().unwrap(), expected);
        assert_eq!(adapter.appended(), 3);
    }

    #[test]
    fn test_closed_readiness_aborts_delivery() {
        let mut adapter = SinkAdapter::new(
            Box::new(Recorder::default()),
            PresentationTime::zero(600),
            FrameRate::fps(30),
            DEFAULT_READINESS_POLL_INTERVAL,
        );
        adapter.readiness().close();
        assert_eq!(adapter.deliver(image()), Err(SinkError::Closed));
        assert_eq!(adapter.next_time(), PresentationTime::zero(600));
    }

    #[test]
    fn test_failed_append_keeps_the_timestamp() {
        let mut adapter = SinkAdapter::new(
            Box::new(Recorder::default()),
            PresentationTime::zero(30),
            FrameRate::fps(30),
            DEFAULT_READINESS_POLL_INTERVAL,
        );
        adapter.finish().unwrap();
        assert!(adapter.deliver(image()).is_err());
        assert_eq!(adapter.next_time(), PresentationTime::zero(30));
    }
}
