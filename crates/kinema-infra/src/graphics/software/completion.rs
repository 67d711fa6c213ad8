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

//! Scheduling of software completion notifications.
//!
//! The software device renders at submission time; only the *notification* is deferred.
//! The [`CompletionController`] decides when, and on which thread, each callback runs:
//! inline, on a pool of workers with random delays, or when a test releases it.

use kinema_core::renderer::{CompletedSubmission, CompletionCallback, RenderError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// When and where completion callbacks run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionMode {
    /// The callback runs on the submitting thread, before `submit` returns.
    Inline,
    /// Callbacks run on `workers` threads after a random delay of up to `max_jitter`.
    ///
    /// With more than one worker, completions routinely arrive out of submission order.
    Threaded {
        /// Number of worker threads.
        workers: usize,
        /// Upper bound of the per-completion delay.
        max_jitter: Duration,
        /// Seed of the delay generator.
        seed: u64,
    },
    /// Callbacks are held until released through the controller.
    Manual,
}

struct PendingCompletion {
    submission: u64,
    result: Result<CompletedSubmission, RenderError>,
    callback: CompletionCallback,
}

impl PendingCompletion {
    fn run(self) {
        (self.callback)(self.result);
    }
}

#[derive(Default)]
struct ControllerState {
    held: VecDeque<PendingCompletion>,
    scheduled: u64,
    completed: u64,
    fail_next: usize,
}

struct ControllerInner {
    mode: CompletionMode,
    state: Mutex<ControllerState>,
    changed: Condvar,
    jobs: Option<flume::Sender<PendingCompletion>>,
    workers: Vec<JoinHandle<()>>,
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        // Closing the channel lets the workers run out their queue and exit.
        self.jobs.take();
        let current = std::thread::current().id();
        for worker in self.workers.drain(..) {
            if worker.thread().id() != current && worker.join().is_err() {
                log::warn!("A completion worker panicked");
            }
        }
    }
}

/// Decides when the software device's completion callbacks run.
///
/// Cloning yields another handle to the same scheduler, so a test can keep one while the
/// device owns another.
#[derive(Clone)]
pub struct CompletionController {
    inner: Arc<ControllerInner>,
}

impl std::fmt::Debug for CompletionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionController")
            .field("mode", &self.inner.mode)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl Default for CompletionController {
    fn default() -> Self {
        Self::inline()
    }
}

impl CompletionController {
    /// Completes every submission on the submitting thread.
    pub fn inline() -> Self {
        Self::new(CompletionMode::Inline)
    }

    /// Completes submissions on `workers` threads after random delays.
    pub fn threaded(workers: usize, max_jitter: Duration, seed: u64) -> Self {
        Self::new(CompletionMode::Threaded {
            workers,
            max_jitter,
            seed,
        })
    }

    /// Holds completions until [`release_next`](Self::release_next) and friends.
    pub fn manual() -> Self {
        Self::new(CompletionMode::Manual)
    }

    /// Creates a controller for `mode`, spawning workers if needed.
    pub fn new(mode: CompletionMode) -> Self {
        let (jobs, workers) = match &mode {
            CompletionMode::Threaded {
                workers,
                max_jitter,
                seed,
            } => {
                let (tx, rx) = flume::unbounded::<PendingCompletion>();
                let handles = (0..(*workers).max(1))
                    .filter_map(|index| {
                        let rx = rx.clone();
                        let max_jitter = *max_jitter;
                        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
                        std::thread::Builder::new()
                            .name(format!("kinema-completion-{index}"))
                            .spawn(move || {
                                while let Ok(pending) = rx.recv() {
                                    if !max_jitter.is_zero() {
                                        let nanos = rng.gen_range(0..=max_jitter.as_nanos() as u64);
                                        std::thread::sleep(Duration::from_nanos(nanos));
                                    }
                                    pending.run();
                                }
                            })
                            .map_err(|e| log::error!("Failed to spawn completion worker: {e}"))
                            .ok()
                    })
                    .collect();
                (Some(tx), handles)
            }
            _ => (None, Vec::new()),
        };

        Self {
            inner: Arc::new(ControllerInner {
                mode,
                state: Mutex::new(ControllerState::default()),
                changed: Condvar::new(),
                jobs,
                workers,
            }),
        }
    }

    /// The scheduling mode.
    pub fn mode(&self) -> &CompletionMode {
        &self.inner.mode
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        // The state only holds counters and a queue; both stay valid after a panic.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes the next `count` submissions complete with an error.
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next += count;
    }

    /// Number of submissions scheduled but not yet notified.
    pub fn in_flight(&self) -> u64 {
        let state = self.lock();
        state.scheduled - state.completed
    }

    /// Number of completions currently held for manual release.
    pub fn pending(&self) -> usize {
        self.lock().held.len()
    }

    /// Blocks until at least `count` completions are held, or `timeout` elapses.
    pub fn wait_for_pending(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.held.len() < count {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            state = match self.inner.changed.wait_timeout(state, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Runs the oldest held completion. Returns `false` if none is held.
    pub fn release_next(&self) -> bool {
        let pending = self.lock().held.pop_front();
        self.run_released(pending)
    }

    /// Runs the newest held completion. Returns `false` if none is held.
    pub fn release_latest(&self) -> bool {
        let pending = self.lock().held.pop_back();
        self.run_released(pending)
    }

    /// Runs every held completion, oldest first. Returns how many ran.
    pub fn release_all(&self) -> usize {
        let mut released = 0;
        while self.release_next() {
            released += 1;
        }
        released
    }

    /// Runs every held completion, newest first. Returns how many ran.
    pub fn release_all_reversed(&self) -> usize {
        let mut released = 0;
        while self.release_latest() {
            released += 1;
        }
        released
    }

    fn run_released(&self, pending: Option<PendingCompletion>) -> bool {
        match pending {
            Some(pending) => {
                log::trace!("Releasing completion of submission {}", pending.submission);
                self.notify(pending);
                true
            }
            None => false,
        }
    }

    /// Blocks until every scheduled completion has been notified.
    ///
    /// In manual mode this only returns once the held completions are released.
    pub fn wait_idle(&self) {
        let mut state = self.lock();
        while state.scheduled != state.completed {
            state = self
                .inner
                .changed
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Hands a finished submission over for notification.
    pub(crate) fn schedule(
        &self,
        result: Result<CompletedSubmission, RenderError>,
        callback: CompletionCallback,
    ) {
        let pending = {
            let mut state = self.lock();
            let submission = state.scheduled;
            state.scheduled += 1;
            let result = if state.fail_next > 0 {
                state.fail_next -= 1;
                Err(RenderError::SubmissionFailed(format!(
                    "injected failure of submission {submission}"
                )))
            } else {
                result
            };
            PendingCompletion {
                submission,
                result,
                callback,
            }
        };

        match (&self.inner.mode, &self.inner.jobs) {
            (CompletionMode::Manual, _) => {
                self.lock().held.push_back(pending);
                self.inner.changed.notify_all();
            }
            (CompletionMode::Threaded { .. }, Some(jobs)) => {
                let controller = self.clone();
                let job = PendingCompletion {
                    submission: pending.submission,
                    result: pending.result,
                    callback: Box::new(move |result| {
                        (pending.callback)(result);
                        controller.mark_completed();
                    }),
                };
                if let Err(flume::SendError(job)) = jobs.send(job) {
                    log::warn!("Completion workers are gone; completing inline");
                    job.run();
                }
            }
            _ => self.notify(pending),
        }
    }

    fn notify(&self, pending: PendingCompletion) {
        pending.run();
        self.mark_completed();
    }

    fn mark_completed(&self) {
        self.lock().completed += 1;
        self.inner.changed.notify_all();
    }
}
