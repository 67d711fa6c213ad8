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
//! Per-frame delivery receipts.

use super::FrameError;
use kinema_core::renderer::FrameRange;
use kinema_core::sink::PresentationTime;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A frame that reached the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveredFrame {
    /// The frame's sequence number, in production order from 0.
    pub sequence: u64,
    /// The presentation time it was appended with.
    pub time: PresentationTime,
}

type Outcome = Result<DeliveredFrame, FrameError>;

#[derive(Debug, Default)]
struct ReceiptState {
    outcome: Mutex<Option<Outcome>>,
    settled: Condvar,
}

impl ReceiptState {
    fn outcome(&self) -> MutexGuard<'_, Option<Outcome>> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the eventual outcome of one produced frame.
///
/// The outcome is settled exactly once, by the ordering gate after the frame was
/// appended to the sink, or with the error that prevented it.
#[derive(Debug, Clone)]
pub struct FrameReceipt {
    sequence: u64,
    slot: usize,
    constant_range: FrameRange,
    shared: Arc<ReceiptState>,
}

impl FrameReceipt {
    pub(crate) fn new(sequence: u64, slot: usize, constant_range: FrameRange) -> Self {
        Self {
            sequence,
            slot,
            constant_range,
            shared: Arc::default(),
        }
    }

    /// The frame's sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The in-flight slot the frame held.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// The range of the shared constant buffer the frame's constants occupied.
    pub fn constant_range(&self) -> FrameRange {
        self.constant_range
    }

    /// The outcome, if already settled.
    pub fn try_outcome(&self) -> Option<Outcome> {
        self.shared.outcome().clone()
    }

    /// Blocks until the frame was delivered or failed.
    pub fn wait(&self) -> Outcome {
        let mut outcome = self.shared.outcome();
        loop {
            if let Some(outcome) = outcome.as_ref() {
                return outcome.clone();
            }
            outcome = self
                .shared
                .settled
                .wait(outcome)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait`](Self::wait), but returns `None` if nothing settled within `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        let outcome = self.shared.outcome();
        let (outcome, _) = self
            .shared
            .settled
            .wait_timeout_while(outcome, timeout, |o| o.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        outcome.clone()
    }

    /// Settles the receipt. Later calls are ignored.
    pub(crate) fn settle(&self, result: Outcome) {
        let mut outcome = self.shared.outcome();
        if outcome.is_some() {
            log::warn!("Frame {} was settled twice", self.sequence);
            return;
        }
        *outcome = Some(result);
        drop(outcome);
        self.shared.settled.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_sees_the_first_settlement() {
        let receipt = FrameReceipt::new(4, 1, FrameRange { start: 256, end: 512 });
        assert_eq!(receipt.slot(), 1);
        assert_eq!(receipt.constant_range().len(), 256);
        assert!(receipt.try_outcome().is_none());
        assert!(receipt.wait_timeout(Duration::from_millis(5)).is_none());

        let settler = {
            let receipt = receipt.clone();
            thread::spawn(move || {
                receipt.settle(Ok(DeliveredFrame {
                    sequence: 4,
                    time: PresentationTime::new(4, 30),
                }));
                receipt.settle(Err(FrameError::Poisoned("late".into())));
            })
        };
        let delivered = receipt.wait().unwrap();
        settler.join().unwrap();
        assert_eq!(delivered.time, PresentationTime::new(4, 30));
        assert!(receipt.try_outcome().unwrap().is_ok());
    }
}
