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
//! The in-flight frame throttle: a counting semaphore of depth F.
//!
//! Every permit also names a slot in `0..F` that no other outstanding permit holds.
//! Per-frame resources indexed by that slot (a constant ring range, a readback buffer)
//! are therefore never shared by two live frames, whichever order frames complete in.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors of [`FrameThrottle`] acquisition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ThrottleError {
    /// The throttle was poisoned by a fatal pipeline failure.
    #[error("The frame throttle is poisoned: {0}")]
    Poisoned(String),
}

#[derive(Debug)]
struct ThrottleState {
    /// `true` for every slot held by an outstanding permit.
    taken: Vec<bool>,
    outstanding: usize,
    high_water_mark: usize,
    poison: Option<String>,
}

impl ThrottleState {
    fn new(depth: usize) -> Self {
        Self {
            taken: vec![false; depth],
            outstanding: 0,
            high_water_mark: 0,
            poison: None,
        }
    }

    fn take_free_slot(&mut self) -> Option<usize> {
        let slot = self.taken.iter().position(|taken| !taken)?;
        self.taken[slot] = true;
        self.outstanding += 1;
        self.high_water_mark = self.high_water_mark.max(self.outstanding);
        Some(slot)
    }
}

#[derive(Debug)]
struct ThrottleInner {
    depth: usize,
    state: Mutex<ThrottleState>,
    released: Condvar,
}

impl ThrottleInner {
    fn state(&self) -> MutexGuard<'_, ThrottleState> {
        // Counters only; a panic while holding the lock cannot leave them half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, slot: usize) {
        let mut state = self.state();
        if let Some(taken) = state.taken.get_mut(slot) {
            *taken = false;
        }
        state.outstanding = state.outstanding.saturating_sub(1);
        drop(state);
        self.released.notify_all();
    }
}

/// Bounds the number of frames between "construction started" and "GPU work completed".
///
/// Each frame holds one [`ThrottlePermit`]. Acquiring blocks while `depth` permits are
/// out; dropping a permit, on whichever thread, frees its unit. Cloning yields another
/// handle to the same throttle.
#[derive(Clone)]
pub struct FrameThrottle {
    inner: Arc<ThrottleInner>,
}

impl fmt::Debug for FrameThrottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("FrameThrottle")
            .field("depth", &self.inner.depth)
            .field("outstanding", &state.outstanding)
            .field("poisoned", &state.poison.is_some())
            .finish()
    }
}

impl FrameThrottle {
    /// Creates a throttle of depth `depth` (at least 1).
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            inner: Arc::new(ThrottleInner {
                depth,
                state: Mutex::new(ThrottleState::new(depth)),
                released: Condvar::new(),
            }),
        }
    }

    /// The maximum number of permits out at once.
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Number of permits currently out.
    pub fn outstanding(&self) -> usize {
        self.inner.state().outstanding
    }

    /// The largest number of permits that were ever out at once.
    pub fn high_water_mark(&self) -> usize {
        self.inner.state().high_water_mark
    }

    /// Blocks until a unit is free and takes it.
    ///
    /// # Errors
    /// [`ThrottleError::Poisoned`] if the throttle is or becomes poisoned while waiting.
    pub fn acquire(&self) -> Result<ThrottlePermit, ThrottleError> {
        match self.acquire_until(None, false)? {
            Some(permit) => Ok(permit),
            None => Err(ThrottleError::Poisoned(
                "blocking acquisition returned without a permit".into(),
            )),
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up after `timeout` and returns `None`.
    pub fn acquire_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<ThrottlePermit>, ThrottleError> {
        self.acquire_until(Some(Instant::now() + timeout), false)
    }

    /// Takes a unit if one is free right now.
    pub fn try_acquire(&self) -> Result<Option<ThrottlePermit>, ThrottleError> {
        self.acquire_until(Some(Instant::now()), false)
    }

    /// Acquires every unit, waiting for all outstanding frames to release theirs.
    ///
    /// Poisoning does not interrupt the drain, so teardown after a failure still
    /// observes every in-flight completion. The throttle is blocked for as long as
    /// the returned permits live.
    pub fn drain(&self) -> Vec<ThrottlePermit> {
        (0..self.inner.depth)
            .filter_map(|_| self.acquire_until(None, true).ok().flatten())
            .collect()
    }

    /// Poisons the throttle. Every current and future acquisition fails with `reason`;
    /// the first reason is kept.
    pub fn poison(&self, reason: impl Into<String>) {
        let mut state = self.inner.state();
        if state.poison.is_none() {
            let reason = reason.into();
            log::debug!("Frame throttle poisoned: {reason}");
            state.poison = Some(reason);
        }
        drop(state);
        self.inner.released.notify_all();
    }

    /// Whether the throttle is poisoned.
    pub fn is_poisoned(&self) -> bool {
        self.inner.state().poison.is_some()
    }

    fn acquire_until(
        &self,
        deadline: Option<Instant>,
        ignore_poison: bool,
    ) -> Result<Option<ThrottlePermit>, ThrottleError> {
        let mut state = self.inner.state();
        loop {
            if let (Some(reason), false) = (&state.poison, ignore_poison) {
                return Err(ThrottleError::Poisoned(reason.clone()));
            }
            if let Some(slot) = state.take_free_slot() {
                return Ok(Some(ThrottlePermit {
                    inner: self.inner.clone(),
                    slot,
                }));
            }
            state = match deadline {
                None => self
                    .inner
                    .released
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                        return Ok(None);
                    };
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                    self.inner
                        .released
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

/// One acquired unit of a [`FrameThrottle`]. Dropping it releases the unit.
#[must_use = "dropping a permit releases its throttle unit immediately"]
pub struct ThrottlePermit {
    inner: Arc<ThrottleInner>,
    slot: usize,
}

impl ThrottlePermit {
    /// The slot in `0..depth` this permit holds exclusively until it is dropped.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl fmt::Debug for ThrottlePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottlePermit")
            .field("depth", &self.inner.depth)
            .field("slot", &self.slot)
            .finish()
    }
}

impl Drop for ThrottlePermit {
    fn drop(&mut self) {
        self.inner.release(self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_blocks_at_depth() {
        let throttle = FrameThrottle::new(2);
        let a = throttle.acquire().unwrap();
        let _b = throttle.acquire().unwrap();
        assert!(throttle.try_acquire().unwrap().is_none());
        assert_eq!(throttle.outstanding(), 2);

        drop(a);
        let c = throttle.try_acquire().unwrap();
        assert!(c.is_some());
        assert_eq!(throttle.high_water_mark(), 2);
    }

    #[test]
    fn test_out_of_order_release_hands_out_the_freed_slot() {
        let throttle = FrameThrottle::new(3);
        let first = throttle.acquire().unwrap();
        let second = throttle.acquire().unwrap();
        let third = throttle.acquire().unwrap();
        assert_eq!([first.slot(), second.slot(), third.slot()], [0, 1, 2]);

        // The newest frame completes first; the oldest one is still live.
        drop(third);
        let fourth = throttle.acquire().unwrap();
        assert_eq!(fourth.slot(), 2);
        drop(second);
        let fifth = throttle.acquire().unwrap();
        assert_eq!(fifth.slot(), 1);
        assert_ne!(fifth.slot(), first.slot());
        assert_ne!(fifth.slot(), fourth.slot());
    }

    #[test]
    fn test_release_from_another_thread_wakes_the_producer() {
        let throttle = FrameThrottle::new(1);
        let permit = throttle.acquire().unwrap();
        let released = Arc::new(AtomicBool::new(false));

        let releaser = {
            let released = released.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                released.store(true, Ordering::SeqCst);
                drop(permit);
            })
        };
        let _next = throttle.acquire().unwrap();
        assert!(released.load(Ordering::SeqCst));
        releaser.join().unwrap();
    }

    #[test]
    fn test_poison_wakes_waiters() {
        let throttle = FrameThrottle::new(1);
        let _held = throttle.acquire().unwrap();
        let waiter = {
            let throttle = throttle.clone();
            thread::spawn(move || throttle.acquire().map(|_| ()))
        };
        thread::sleep(Duration::from_millis(20));
        throttle.poison("device lost");
        throttle.poison("ignored");
        assert_eq!(
            waiter.join().unwrap(),
            Err(ThrottleError::Poisoned("device lost".into()))
        );
    }

    #[test]
    fn test_drain_waits_for_every_permit_even_when_poisoned() {
        let throttle = FrameThrottle::new(3);
        let held: Vec<_> = (0..2).map(|_| throttle.acquire().unwrap()).collect();
        throttle.poison("failure");

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(held);
        });
        let drained = throttle.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(throttle.outstanding(), 3);
        releaser.join().unwrap();
        drop(drained);
        assert_eq!(throttle.outstanding(), 0);
    }

    #[test]
    fn test_acquire_timeout_gives_up() {
        let throttle = FrameThrottle::new(1);
        let _held = throttle.acquire().unwrap();
        let started = Instant::now();
        assert!(throttle
            .acquire_timeout(Duration::from_millis(15))
            .unwrap()
            .is_none());
        assert!(started.elapsed() >= Duration::from_millis(15));
    }
}
