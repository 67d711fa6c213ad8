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

use kinema_core::math::{LinearRgba, Mat4, Vec3};
use kinema_core::renderer::LightConstants;

/// The kind of light source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    /// Parallel rays along the transform's -Z axis.
    Directional,
    /// Omnidirectional emitter at the transform's origin.
    Point,
}

/// A light source positioned by its world transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// The light type.
    pub kind: LightKind,
    /// World transform.
    pub transform: Mat4,
    /// Emitted color.
    pub color: LinearRgba,
    /// Scalar multiplier of `color`.
    pub intensity: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self::directional(Vec3::new(-0.3, -1.0, -0.5), LinearRgba::WHITE, 1.0)
    }
}

impl Light {
    /// A directional light shining along `direction`.
    pub fn directional(direction: Vec3, color: LinearRgba, intensity: f32) -> Self {
        let forward = direction.normalize_or(Vec3::NEG_Z);
        let up = if forward.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        Self {
            kind: LightKind::Directional,
            // look_to_rh maps world to view; its inverse places -Z along `forward`.
            transform: Mat4::look_to_rh(Vec3::ZERO, forward, up).inverse(),
            color,
            intensity,
        }
    }

    /// A point light at `position`.
    pub fn point(position: Vec3, color: LinearRgba, intensity: f32) -> Self {
        Self {
            kind: LightKind::Point,
            transform: Mat4::from_translation(position),
            color,
            intensity,
        }
    }

    /// The direction the light shines in, from the transform's -Z axis.
    pub fn direction(&self) -> Vec3 {
        self.transform
            .transform_vector3(Vec3::NEG_Z)
            .normalize_or(Vec3::NEG_Z)
    }

    /// The light position, from the transform's translation.
    pub fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }

    /// Packs the light into its GPU constant layout.
    pub fn to_constants(&self) -> LightConstants {
        match self.kind {
            LightKind::Directional => {
                LightConstants::directional(self.direction(), self.color, self.intensity)
            }
            LightKind::Point => LightConstants::point(self.position(), self.color, self.intensity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn directional_light_derives_direction_from_transform() {
        let light = Light::directional(Vec3::new(0.0, -3.0, 0.0), LinearRgba::WHITE, 1.0);
        let d = light.direction();
        assert_relative_eq!(d.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(d.y, -1.0, epsilon = 1e-5);
        assert_relative_eq!(d.z, 0.0, epsilon = 1e-5);
        assert!(!light.to_constants().is_point());
    }

    #[test]
    fn point_light_derives_position_from_transform() {
        let light = Light::point(Vec3::new(1.0, 2.0, 3.0), LinearRgba::RED, 2.0);
        assert_eq!(light.position(), Vec3::new(1.0, 2.0, 3.0));
        let c = light.to_constants();
        assert!(c.is_point());
        assert_eq!(c.color[0], 2.0);
    }
}
