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

//! Geometric primitives: bounding boxes and extents.

use crate::math::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// The minimum corner.
    pub min: Vec3,
    /// The maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Creates a bounding box from its two corners.
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    /// Computes the tightest box enclosing a set of points.
    ///
    /// Returns `None` when the iterator is empty.
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    /// The size of the box along each axis.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// The center of the box.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// The largest dimension of the box.
    pub fn largest_dimension(&self) -> f32 {
        self.size().max_element()
    }

    /// A uniform scale transform normalising the largest dimension to 1.
    ///
    /// Degenerate boxes (largest dimension of zero) yield the identity.
    pub fn unit_scale(&self) -> Mat4 {
        let largest = self.largest_dimension();
        if largest <= f32::EPSILON {
            Mat4::IDENTITY
        } else {
            Mat4::from_scale(Vec3::splat(1.0 / largest))
        }
    }
}

/// A two-dimensional size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent2D {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent2D {
    /// Creates a new extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height. Returns `1.0` for a zero height.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Number of pixels.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn unit_scale_normalises_largest_dimension() {
        let aabb = Aabb::from_min_max(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(3.0, 2.0, 1.0));
        let scaled = aabb.unit_scale().transform_point3(Vec3::new(4.0, 0.0, 0.0));
        assert_relative_eq!(scaled.x, 1.0);
    }

    #[test]
    fn degenerate_box_has_identity_unit_scale() {
        let aabb = Aabb::from_min_max(Vec3::ONE, Vec3::ONE);
        assert_eq!(aabb.unit_scale(), Mat4::IDENTITY);
    }

    #[test]
    fn from_points_encloses_all() {
        let aabb = Aabb::from_points([Vec3::ZERO, Vec3::new(1.0, -2.0, 0.5)]).unwrap();
        assert_eq!(aabb.min, Vec3::new(0.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 0.0, 0.5));
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }
}
