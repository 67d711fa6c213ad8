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

use kinema_core::math::{Mat4, Vec3};

/// The single point of view of a scene, with a perspective projection.
///
/// The aspect ratio is not stored; it comes from the output extent at render time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Eye position.
    pub eye: Vec3,
    /// The point looked at.
    pub target: Vec3,
    /// The up direction.
    pub up: Vec3,
    /// Distance to the near clipping plane. Must be positive.
    pub z_near: f32,
    /// Distance to the far clipping plane. Must exceed `z_near`.
    pub z_far: f32,
    /// Vertical field of view in radians.
    pub fov_y_radians: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            z_near: 0.1,
            z_far: 100.0,
            fov_y_radians: 45.0_f32.to_radians(),
        }
    }
}

impl Camera {
    /// Moves the point of view.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        self.eye = eye;
        self.target = target;
        self.up = up;
    }

    /// Changes the projection parameters.
    pub fn set_projection(&mut self, z_near: f32, z_far: f32, fov_y_radians: f32) {
        self.z_near = z_near;
        self.z_far = z_far;
        self.fov_y_radians = fov_y_radians;
    }

    /// The world-to-view matrix (right-handed).
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// The view-to-clip matrix for the given aspect ratio, depth mapped to `[0, 1]`.
    pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, aspect_ratio, self.z_near, self.z_far)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn target_projects_to_the_center_of_clip_space() {
        let camera = Camera::default();
        let clip = camera.projection_matrix(16.0 / 9.0) * camera.view_matrix() * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-6);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
