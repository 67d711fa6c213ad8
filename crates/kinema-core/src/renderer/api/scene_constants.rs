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

//! GPU-side layouts of the per-frame constants and of the mesh vertex.
//!
//! These structs are written byte-for-byte into the shared constant buffer, so
//! every backend (the WGSL scene shader and the software rasterizer) decodes the
//! same layout. All of them are `#[repr(C)]`, `Pod`, and sized in multiples of 16
//! bytes so that they are valid both in uniform and in storage address spaces.

use crate::math::{LinearRgba, Mat4, Vec3};
use bytemuck::{Pod, Zeroable};

/// Natural alignment of every constant struct (the alignment of a `vec4<f32>`).
pub const CONSTANT_NATURAL_ALIGNMENT: u64 = 16;

/// Binding index of [`FrameConstants`] in the scene bind group.
pub const FRAME_CONSTANTS_BINDING: u32 = 0;
/// Binding index of the [`LightConstants`] array.
pub const LIGHT_CONSTANTS_BINDING: u32 = 1;
/// Binding index of the [`NodeConstants`] array, indexed by instance.
pub const NODE_CONSTANTS_BINDING: u32 = 2;
/// Binding index of [`MaterialConstants`].
pub const MATERIAL_CONSTANTS_BINDING: u32 = 3;

/// Per-frame snapshot of the camera and light count.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameConstants {
    /// World-to-view matrix.
    pub view: [[f32; 4]; 4],
    /// World-to-clip matrix.
    pub view_proj: [[f32; 4]; 4],
    /// Camera position in world space (`w = 1`).
    pub camera_position: [f32; 4],
    /// Number of valid entries in the light array.
    pub light_count: u32,
    /// Padding to a 16-byte multiple.
    pub _padding: [u32; 3],
}

impl FrameConstants {
    /// Builds the frame constants from the camera matrices.
    pub fn new(view: Mat4, projection: Mat4, camera_position: Vec3, light_count: u32) -> Self {
        Self {
            view: view.to_cols_array_2d(),
            view_proj: (projection * view).to_cols_array_2d(),
            camera_position: camera_position.extend(1.0).to_array(),
            light_count,
            _padding: [0; 3],
        }
    }
}

/// One packed light.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightConstants {
    /// World position with `w = 1` for point lights, `w = 0` for directional lights.
    pub position: [f32; 4],
    /// Normalized direction the light travels (`w = 0`). Unused for point lights.
    pub direction: [f32; 4],
    /// Light color premultiplied by intensity.
    pub color: [f32; 4],
}

impl LightConstants {
    /// Packs a directional light.
    pub fn directional(direction: Vec3, color: LinearRgba, intensity: f32) -> Self {
        Self {
            position: [0.0, 0.0, 0.0, 0.0],
            direction: direction.normalize_or_zero().extend(0.0).to_array(),
            color: (color * intensity).to_array(),
        }
    }

    /// Packs a point light.
    pub fn point(position: Vec3, color: LinearRgba, intensity: f32) -> Self {
        Self {
            position: position.extend(1.0).to_array(),
            direction: [0.0; 4],
            color: (color * intensity).to_array(),
        }
    }

    /// Whether this is a point light.
    pub fn is_point(&self) -> bool {
        self.position[3] != 0.0
    }
}

/// Per-node transforms.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct NodeConstants {
    /// Model-to-world matrix.
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of the model matrix, for normals.
    pub normal: [[f32; 4]; 4],
}

impl NodeConstants {
    /// Builds the node constants from a world transform.
    pub fn from_world(world: Mat4) -> Self {
        let normal = if world.determinant().abs() > f32::EPSILON {
            world.inverse().transpose()
        } else {
            Mat4::IDENTITY
        };
        Self {
            model: world.to_cols_array_2d(),
            normal: normal.to_cols_array_2d(),
        }
    }
}

/// Texture presence bits of [`MaterialConstants::texture_flags`].
pub mod material_texture_flags {
    /// A base-color texture is assigned.
    pub const BASE_COLOR: u32 = 1 << 0;
    /// An emissive texture is assigned.
    pub const EMISSIVE: u32 = 1 << 1;
    /// A metallic texture is assigned.
    pub const METALLIC: u32 = 1 << 2;
    /// A roughness texture is assigned.
    pub const ROUGHNESS: u32 = 1 << 3;
    /// A normal map is assigned.
    pub const NORMAL: u32 = 1 << 4;
    /// An ambient-occlusion texture is assigned.
    pub const AMBIENT_OCCLUSION: u32 = 1 << 5;
}

/// Per-material shading parameters.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialConstants {
    /// Base color (linear RGBA).
    pub base_color: [f32; 4],
    /// Emissive color (linear RGB, `w` unused).
    pub emissive: [f32; 4],
    /// Metallic factor.
    pub metallic: f32,
    /// Roughness factor.
    pub roughness: f32,
    /// Opacity multiplier.
    pub opacity: f32,
    /// Bitset of assigned textures, see [`material_texture_flags`].
    pub texture_flags: u32,
}

/// The vertex layout of every mesh: position and normal.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Object-space normal.
    pub normal: [f32; 3],
}

impl Vertex {
    /// Creates a vertex.
    pub const fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self { position, normal }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_sizes_are_vec4_multiples() {
        assert_eq!(std::mem::size_of::<FrameConstants>(), 160);
        assert_eq!(std::mem::size_of::<LightConstants>(), 48);
        assert_eq!(std::mem::size_of::<NodeConstants>(), 128);
        assert_eq!(std::mem::size_of::<MaterialConstants>(), 48);
        for size in [
            std::mem::size_of::<FrameConstants>(),
            std::mem::size_of::<LightConstants>(),
            std::mem::size_of::<NodeConstants>(),
            std::mem::size_of::<MaterialConstants>(),
        ] {
            assert_eq!(size as u64 % CONSTANT_NATURAL_ALIGNMENT, 0);
        }
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
    }

    #[test]
    fn light_packing_uses_w_to_tag_the_type() {
        let d = LightConstants::directional(Vec3::new(0.0, -2.0, 0.0), LinearRgba::WHITE, 2.0);
        assert!(!d.is_point());
        assert_eq!(d.direction, [0.0, -1.0, 0.0, 0.0]);
        assert_eq!(d.color, [2.0, 2.0, 2.0, 1.0]);

        let p = LightConstants::point(Vec3::new(1.0, 2.0, 3.0), LinearRgba::RED, 1.0);
        assert!(p.is_point());
        assert_eq!(p.position, [1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn normal_matrix_of_uniform_scale_is_inverse_scale() {
        let c = NodeConstants::from_world(Mat4::from_scale(Vec3::splat(2.0)));
        assert_eq!(c.normal[0][0], 0.5);
        assert_eq!(c.model[0][0], 2.0);
    }
}
