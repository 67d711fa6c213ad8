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

//! Exact rational presentation timestamps.
//!
//! Timestamps are `value / timescale` seconds. Adding two timestamps rescales both to
//! the least common multiple of their timescales, so `t0 + k * (1 / rate)` is exact
//! for any rational frame rate and no drift accumulates over long recordings.

use crate::math::lcm;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Add;

/// A point on the output timeline, `value / timescale` seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PresentationTime {
    /// Number of ticks.
    pub value: i64,
    /// Ticks per second. Never zero.
    pub timescale: u32,
}

impl PresentationTime {
    /// Creates a timestamp. A zero timescale is treated as 1.
    pub const fn new(value: i64, timescale: u32) -> Self {
        Self {
            value,
            timescale: if timescale == 0 { 1 } else { timescale },
        }
    }

    /// Time zero expressed in `timescale` ticks.
    pub const fn zero(timescale: u32) -> Self {
        Self::new(0, timescale)
    }

    /// The timestamp in seconds, for display.
    pub fn as_secs_f64(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    /// Expresses the timestamp in a different timescale, if that can be done exactly.
    pub fn rescaled(&self, timescale: u32) -> Option<Self> {
        let numerator = self.value as i128 * timescale as i128;
        if timescale == 0 || numerator % self.timescale as i128 != 0 {
            return None;
        }
        i64::try_from(numerator / self.timescale as i128)
            .ok()
            .map(|value| Self { value, timescale })
    }

    fn cross(&self, other: &Self) -> (i128, i128) {
        (
            self.value as i128 * other.timescale as i128,
            other.value as i128 * self.timescale as i128,
        )
    }
}

impl Default for PresentationTime {
    fn default() -> Self {
        Self::zero(600)
    }
}

impl PartialEq for PresentationTime {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = self.cross(other);
        a == b
    }
}

impl Eq for PresentationTime {}

impl PartialOrd for PresentationTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PresentationTime {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = self.cross(other);
        a.cmp(&b)
    }
}

impl Add for PresentationTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let timescale = lcm(self.timescale as u64, rhs.timescale as u64);
        let timescale = u32::try_from(timescale).unwrap_or(u32::MAX);
        let lhs_value = self.value * (timescale / self.timescale) as i64;
        let rhs_value = rhs.value * (timescale / rhs.timescale) as i64;
        Self {
            value: lhs_value + rhs_value,
            timescale,
        }
    }
}

impl fmt::Display for PresentationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({:.4}s)", self.value, self.timescale, self.as_secs_f64())
    }
}

/// A rational frame rate, `numerator / denominator` frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    /// Frames per `denominator` seconds.
    pub numerator: u32,
    /// Seconds per `numerator` frames.
    pub denominator: u32,
}

impl FrameRate {
    /// An integral frame rate.
    pub const fn fps(fps: u32) -> Self {
        Self {
            numerator: fps,
            denominator: 1,
        }
    }

    /// Whether both terms are non-zero.
    pub fn is_valid(&self) -> bool {
        self.numerator != 0 && self.denominator != 0
    }

    /// The fixed duration of one frame, `1 / rate`.
    pub fn frame_duration(&self) -> PresentationTime {
        PresentationTime::new(self.denominator as i64, self.numerator)
    }

    /// The rate as a float, for display.
    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator.max(1) as f64
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::fps(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulated_durations_stay_exact() {
        let rate = FrameRate {
            numerator: 30_000,
            denominator: 1001,
        };
        let mut t = PresentationTime::zero(600);
        for _ in 0..30_000 {
            t = t + rate.frame_duration();
        }
        assert_eq!(t, PresentationTime::new(1001, 1));
    }

    #[test]
    fn equality_is_by_value_not_representation() {
        assert_eq!(PresentationTime::new(20, 600), PresentationTime::new(1, 30));
        assert!(PresentationTime::new(21, 600) > PresentationTime::new(1, 30));
    }

    #[test]
    fn rescale_only_when_exact() {
        let t = PresentationTime::new(1, 30);
        assert_eq!(t.rescaled(600).map(|t| t.value), Some(20));
        assert!(t.rescaled(7).is_none());
    }

    #[test]
    fn frame_rate_validity() {
        assert!(FrameRate::fps(24).is_valid());
        assert!(!FrameRate::fps(0).is_valid());
    }
}
