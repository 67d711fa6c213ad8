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

//! Mathematics primitives used across the pipeline.
//!
//! Linear algebra comes from [`glam`]; this module re-exports the types the rest
//! of the workspace uses and adds the few domain types glam does not provide:
//! a linear color, an axis-aligned bounding box and a 2D extent.
//!
//! All angles are in **radians**.

pub mod color;
pub mod geometry;

pub use glam::{Affine3A, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

pub use self::color::LinearRgba;
pub use self::geometry::{Aabb, Extent2D};

/// A small constant for floating-point comparisons.
pub const EPSILON: f32 = 1e-5;

/// Returns the greatest common divisor of two integers.
#[inline]
pub const fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Returns the least common multiple of two integers.
///
/// `lcm(0, n)` is defined as `n` so that a zero "natural" alignment collapses to
/// the other operand.
#[inline]
pub const fn lcm(a: u64, b: u64) -> u64 {
    if a == 0 {
        return b;
    }
    if b == 0 {
        return a;
    }
    a / gcd(a, b) * b
}

/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` does not need to be a power of two.
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Rounds `value` down to the previous multiple of `alignment`.
#[inline]
pub const fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value / alignment * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lcm_of_natural_and_hardware_alignment() {
        assert_eq!(lcm(16, 256), 256);
        assert_eq!(lcm(48, 256), 768);
        assert_eq!(lcm(0, 256), 256);
        assert_eq!(lcm(12, 8), 24);
    }

    #[test]
    fn align_helpers_handle_non_power_of_two() {
        assert_eq!(align_up(0, 768), 0);
        assert_eq!(align_up(1, 768), 768);
        assert_eq!(align_up(768, 768), 768);
        assert_eq!(align_down(1535, 768), 768);
        assert_eq!(align_up(17, 1), 17);
    }
}
