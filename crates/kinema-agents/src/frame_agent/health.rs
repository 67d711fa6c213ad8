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
//! The fatal-failure state shared by the producer, the completion callbacks and the
//! ordering gate.

use super::{FrameError, FrameThrottle};
use kinema_core::sink::ReadinessSignal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
pub(crate) struct PipelineHealth {
    fatal: Mutex<Option<FrameError>>,
    throttle: FrameThrottle,
    readiness: ReadinessSignal,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl PipelineHealth {
    pub(crate) fn new(throttle: FrameThrottle, readiness: ReadinessSignal) -> Self {
        Self {
            fatal: Mutex::new(None),
            throttle,
            readiness,
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// The first fatal error, if any.
    pub(crate) fn fatal(&self) -> Option<FrameError> {
        self.fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn check(&self) -> Result<(), FrameError> {
        self.fatal().map_or(Ok(()), Err)
    }

    /// Records a fatal error and releases everything that could block on it.
    ///
    /// Returns the error the pipeline is now poisoned with, which is `err` unless an
    /// earlier failure was already recorded.
    pub(crate) fn fail(&self, err: FrameError) -> FrameError {
        let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(first) = fatal.as_ref() {
            return first.clone();
        }
        log::error!("Frame pipeline failed: {err}");
        *fatal = Some(err.clone());
        drop(fatal);

        self.throttle.poison(err.to_string());
        // Wakes the gate if it is blocked on sink readiness.
        if matches!(err, FrameError::Completion(_)) {
            self.readiness.close();
        }
        err
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
