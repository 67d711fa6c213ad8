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

//! A condition-variable signal a sink raises when it becomes ready for more data.

use super::SinkError;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct ReadinessState {
    generation: u64,
    closed: bool,
}

/// Shared wake-up signal between a sink and the thread feeding it.
///
/// The sink calls [`notify`](Self::notify) whenever its readiness may have changed.
/// The feeder blocks in [`wait_until`](Self::wait_until), which re-evaluates the
/// readiness predicate on every wake-up and at least once per poll interval, so a
/// sink that never notifies still makes progress.
#[derive(Debug, Clone, Default)]
pub struct ReadinessSignal {
    shared: Arc<(Mutex<ReadinessState>, Condvar)>,
}

impl ReadinessSignal {
    /// Creates a new, open signal.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ReadinessState> {
        self.shared.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wakes every waiter so it re-checks readiness.
    pub fn notify(&self) {
        let mut state = self.state();
        state.generation = state.generation.wrapping_add(1);
        drop(state);
        self.shared.1.notify_all();
    }

    /// Closes the signal. Current and future waiters return [`SinkError::Closed`].
    pub fn close(&self) {
        self.state().closed = true;
        self.shared.1.notify_all();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Blocks until `ready()` returns true.
    ///
    /// `ready` is evaluated while the signal's lock is held, so a `notify` issued
    /// between the check and the wait cannot be lost.
    ///
    /// # Errors
    /// [`SinkError::Closed`] if the signal is closed before readiness is reached.
    pub fn wait_until<F>(&self, mut ready: F, poll_interval: Duration) -> Result<(), SinkError>
    where
        F: FnMut() -> bool,
    {
        let mut state = self.state();
        loop {
            if state.closed {
                return Err(SinkError::Closed);
            }
            if ready() {
                return Ok(());
            }
            let generation = state.generation;
            let (guard, _timeout) = self
                .shared
                .1
                .wait_timeout_while(state, poll_interval, |s| {
                    s.generation == generation && !s.closed
                })
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn returns_immediately_when_ready() {
        let signal = ReadinessSignal::new();
        signal
            .wait_until(|| true, Duration::from_secs(10))
            .unwrap();
    }

    #[test]
    fn notify_wakes_a_blocked_waiter() {
        let signal = ReadinessSignal::new();
        let ready = Arc::new(AtomicBool::new(false));

        let waiter = {
            let signal = signal.clone();
            let ready = ready.clone();
            thread::spawn(move || {
                signal.wait_until(|| ready.load(Ordering::SeqCst), Duration::from_secs(30))
            })
        };

        thread::sleep(Duration::from_millis(20));
        ready.store(true, Ordering::SeqCst);
        signal.notify();
        assert_eq!(waiter.join().unwrap(), Ok(()));
    }

    #[test]
    fn close_releases_waiters_with_an_error() {
        let signal = ReadinessSignal::new();
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait_until(|| false, Duration::from_secs(30)))
        };
        thread::sleep(Duration::from_millis(20));
        signal.close();
        assert_eq!(waiter.join().unwrap(), Err(SinkError::Closed));
    }

    #[test]
    fn polling_recovers_from_a_missing_notification() {
        let signal = ReadinessSignal::new();
        let ready = Arc::new(AtomicBool::new(false));
        let flag = ready.clone();
        let setter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            flag.store(true, Ordering::SeqCst);
        });
        signal
            .wait_until(|| ready.load(Ordering::SeqCst), Duration::from_millis(5))
            .unwrap();
        setter.join().unwrap();
    }
}
