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
use kinema_core::math::Extent2D;
use kinema_core::sink::{FrameImage, FrameSink, PresentationTime, ReadinessSignal, SinkError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A frame received by an [`InMemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    /// Presentation timestamp passed to `append`.
    pub time: PresentationTime,
    /// Size of the image.
    pub extent: Extent2D,
    /// A copy of the RGBA8 pixels.
    pub pixels: Vec<u8>,
    /// When the frame arrived.
    pub appended_at: Instant,
}

#[derive(Debug, Default)]
struct MemoryState {
    frames: Vec<RecordedFrame>,
    ready: bool,
    finished: bool,
    rejection: Option<String>,
    appended_while_not_ready: usize,
    signal: Option<ReadinessSignal>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MemoryState>,
    appended: Condvar,
}

/// A sink that keeps every frame in memory.
///
/// Clones share the same recording, so a test keeps one handle while the pipeline owns
/// another. Readiness is under the test's control through [`set_ready`](Self::set_ready).
#[derive(Debug, Clone)]
pub struct InMemorySink {
    shared: Arc<Shared>,
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySink {
    /// Creates a sink that is ready for data.
    pub fn new() -> Self {
        let sink = Self {
            shared: Arc::new(Shared::default()),
        };
        sink.state().ready = true;
        sink
    }

    /// Creates a sink that refuses data until [`set_ready`](Self::set_ready) is called.
    pub fn not_ready() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread leaves the recording itself intact.
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes readiness and wakes a producer waiting on it.
    pub fn set_ready(&self, ready: bool) {
        let signal = {
            let mut state = self.state();
            state.ready = ready;
            state.signal.clone()
        };
        if let Some(signal) = signal {
            signal.notify();
        }
    }

    /// Makes every later `append` fail with [`SinkError::Rejected`].
    pub fn reject_appends(&self, reason: impl Into<String>) {
        self.state().rejection = Some(reason.into());
    }

    /// A copy of the frames received so far, in arrival order.
    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.state().frames.clone()
    }

    /// Number of frames received so far.
    pub fn frame_count(&self) -> usize {
        self.state().frames.len()
    }

    /// The timestamps received so far.
    pub fn times(&self) -> Vec<PresentationTime> {
        self.state().frames.iter().map(|f| f.time).collect()
    }

    /// Number of frames that arrived while the sink reported not-ready.
    pub fn appended_while_not_ready(&self) -> usize {
        self.state().appended_while_not_ready
    }

    /// Whether `finish` was called.
    pub fn is_finished(&self) -> bool {
        self.state().finished
    }

    /// Blocks until at least `count` frames arrived. Returns `false` on timeout.
    pub fn wait_for_frames(&self, count: usize, timeout: Duration) -> bool {
        let state = self.state();
        let (state, _) = self
            .shared
            .appended
            .wait_timeout_while(state, timeout, |s| s.frames.len() < count)
            .unwrap_or_else(PoisonError::into_inner);
        state.frames.len() >= count
    }
}

impl FrameSink for InMemorySink {
    fn is_ready_for_more_data(&self) -> bool {
        let state = self.state();
        state.ready && !state.finished
    }

    fn bind_readiness(&mut self, signal: ReadinessSignal) {
        self.state().signal = Some(signal);
    }

    fn append(&mut self, image: FrameImage, time: PresentationTime) -> Result<(), SinkError> {
        let mut state = self.state();
        if state.finished {
            return Err(SinkError::Closed);
        }
        if let Some(reason) = &state.rejection {
            return Err(SinkError::Rejected(reason.clone()));
        }
        if !state.ready {
            state.appended_while_not_ready += 1;
        }
        state.frames.push(RecordedFrame {
            time,
            extent: image.extent(),
            pixels: image.pixels().to_vec(),
            appended_at: Instant::now(),
        });
        log::trace!("InMemorySink: recorded frame {} at {time}", state.frames.len());
        drop(state);
        self.shared.appended.notify_all();
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        let mut state = self.state();
        state.finished = true;
        log::info!("InMemorySink finished with {} frames", state.frames.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn image(value: u8) -> FrameImage {
        FrameImage::new(Extent2D::new(2, 1), vec![value; 8]).unwrap()
    }

    #[test]
    fn records_frames_in_arrival_order() {
        let sink = InMemorySink::new();
        let mut handle = sink.clone();
        handle.append(image(1), PresentationTime::new(0, 30)).unwrap();
        handle.append(image(2), PresentationTime::new(1, 30)).unwrap();

        let frames = sink.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].pixels, vec![2; 8]);
        assert_eq!(sink.times()[1], PresentationTime::new(1, 30));
    }

    #[test]
    fn readiness_change_notifies_the_bound_signal() {
        let mut sink = InMemorySink::not_ready();
        let signal = ReadinessSignal::new();
        sink.bind_readiness(signal.clone());
        assert!(!sink.is_ready_for_more_data());

        let watched = sink.clone();
        let waiter = thread::spawn(move || {
            signal.wait_until(|| watched.is_ready_for_more_data(), Duration::from_secs(30))
        });
        thread::sleep(Duration::from_millis(20));
        sink.set_ready(true);
        assert_eq!(waiter.join().unwrap(), Ok(()));
    }

    #[test]
    fn finished_sink_refuses_frames() {
        let mut sink = InMemorySink::new();
        sink.finish().unwrap();
        assert!(sink.is_finished());
        assert!(!sink.is_ready_for_more_data());
        assert_eq!(
            sink.append(image(0), PresentationTime::new(0, 1)),
            Err(SinkError::Closed)
        );
    }

    #[test]
    fn rejection_is_reported() {
        let mut sink = InMemorySink::new();
        sink.reject_appends("disk full");
        assert!(matches!(
            sink.append(image(0), PresentationTime::new(0, 1)),
            Err(SinkError::Rejected(_))
        ));
        assert_eq!(sink.frame_count(), 0);
    }

    #[test]
    fn wait_for_frames_times_out() {
        let sink = InMemorySink::new();
        assert!(!sink.wait_for_frames(1, Duration::from_millis(10)));
    }
}
