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

//! Triangle rasterization and the fixed scene program.
//!
//! The program mirrors `scene.wgsl`: vertices are transformed by the instance's node
//! constants and the frame's view-projection, fragments are Lambert lit with a constant
//! ambient term. Coverage uses the standard 4x sample pattern; shading runs once per
//! pixel and is written to every covered sample, like a GPU without sample shading.

use kinema_core::math::{Extent2D, Mat4, Vec2, Vec3, Vec4};
use kinema_core::renderer::{
    CompareFunction, Face, FrameConstants, LightConstants, MaterialConstants, NodeConstants,
};

const AMBIENT: f32 = 0.1;

const SAMPLE_PATTERN_1X: [[f32; 2]; 1] = [[0.5, 0.5]];
const SAMPLE_PATTERN_4X: [[f32; 2]; 4] = [
    [0.375, 0.125],
    [0.875, 0.375],
    [0.125, 0.625],
    [0.625, 0.875],
];

/// Sub-pixel sample positions for a sample count of 1 or 4.
pub(crate) fn sample_positions(sample_count: u32) -> &'static [[f32; 2]] {
    if sample_count >= 4 {
        &SAMPLE_PATTERN_4X
    } else {
        &SAMPLE_PATTERN_1X
    }
}

/// The constants one draw reads, decoded from the bound windows.
#[derive(Debug, Clone)]
pub(crate) struct DrawConstants {
    pub frame: FrameConstants,
    pub lights: Vec<LightConstants>,
    pub material: MaterialConstants,
}

/// Fixed-function state of a draw.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RasterState {
    pub cull_mode: Option<Face>,
    pub depth_compare: Option<CompareFunction>,
    pub depth_write: bool,
}

/// The attachments a pass draws into, with `sample_count` texels per pixel.
pub(crate) struct Targets<'a> {
    pub extent: Extent2D,
    pub sample_count: u32,
    pub color: &'a mut [[f32; 4]],
    pub depth: Option<&'a mut [f32]>,
}

/// A vertex after the vertex stage.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ShadedVertex {
    pub clip: Vec4,
    pub world: Vec3,
    pub normal: Vec3,
}

/// The vertex stage of the scene program.
pub(crate) fn transform_vertex(
    frame: &FrameConstants,
    node: &NodeConstants,
    position: Vec3,
    normal: Vec3,
) -> ShadedVertex {
    let model = Mat4::from_cols_array_2d(&node.model);
    let normal_matrix = Mat4::from_cols_array_2d(&node.normal);
    let view_proj = Mat4::from_cols_array_2d(&frame.view_proj);
    let world = model * position.extend(1.0);
    ShadedVertex {
        clip: view_proj * world,
        world: world.truncate(),
        normal: (normal_matrix * normal.extend(0.0)).truncate(),
    }
}

/// The fragment stage of the scene program.
pub(crate) fn shade(constants: &DrawConstants, world: Vec3, normal: Vec3) -> [f32; 4] {
    let n = normal.normalize_or_zero();
    let count = (constants.frame.light_count as usize).min(constants.lights.len());

    let mut diffuse = Vec3::splat(AMBIENT);
    for light in &constants.lights[..count] {
        let to_light = if light.position[3] > 0.5 {
            (Vec3::from_slice(&light.position[..3]) - world).normalize_or_zero()
        } else {
            -Vec3::from_slice(&light.direction[..3])
        };
        diffuse += Vec3::from_slice(&light.color[..3]) * n.dot(to_light).max(0.0);
    }

    let material = &constants.material;
    let rgb = Vec3::from_slice(&material.base_color[..3]) * diffuse
        + Vec3::from_slice(&material.emissive[..3]);
    let rgb = rgb.clamp(Vec3::ZERO, Vec3::ONE);
    let alpha = (material.base_color[3] * material.opacity).clamp(0.0, 1.0);
    [rgb.x, rgb.y, rgb.z, alpha]
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Rasterizes one triangle into `targets`.
///
/// Triangles reaching behind the near plane are discarded rather than clipped.
pub(crate) fn draw_triangle(
    targets: &mut Targets<'_>,
    state: &RasterState,
    constants: &DrawConstants,
    triangle: [ShadedVertex; 3],
) {
    if triangle
        .iter()
        .any(|v| v.clip.w <= f32::EPSILON || v.clip.z < 0.0)
    {
        return;
    }
    let ndc = triangle.map(|v| v.clip.truncate() / v.clip.w);

    // Counter-clockwise in normalized device coordinates faces the camera.
    let area = (ndc[1].x - ndc[0].x) * (ndc[2].y - ndc[0].y)
        - (ndc[2].x - ndc[0].x) * (ndc[1].y - ndc[0].y);
    if area == 0.0 {
        return;
    }
    let front_facing = area > 0.0;
    match state.cull_mode {
        Some(Face::Back) if !front_facing => return,
        Some(Face::Front) if front_facing => return,
        _ => {}
    }

    let (width, height) = (targets.extent.width as f32, targets.extent.height as f32);
    let screen = ndc.map(|p| Vec2::new((p.x * 0.5 + 0.5) * width, (0.5 - p.y * 0.5) * height));
    let total = edge(screen[0], screen[1], screen[2]);
    if total.abs() <= f32::EPSILON {
        return;
    }
    let inv_w = triangle.map(|v| 1.0 / v.clip.w);

    let min = screen[0].min(screen[1]).min(screen[2]).max(Vec2::ZERO);
    let max = screen[0]
        .max(screen[1])
        .max(screen[2])
        .min(Vec2::new(width, height));
    if min.x >= max.x || min.y >= max.y {
        return;
    }

    let samples = sample_positions(targets.sample_count);
    let sample_count = targets.sample_count.max(1) as usize;
    let row_pixels = targets.extent.width as usize;

    for y in (min.y.floor() as u32)..(max.y.ceil() as u32) {
        for x in (min.x.floor() as u32)..(max.x.ceil() as u32) {
            let mut color: Option<[f32; 4]> = None;
            for (sample, offset) in samples.iter().enumerate() {
                let p = Vec2::new(x as f32 + offset[0], y as f32 + offset[1]);
                let b = [
                    edge(screen[1], screen[2], p) / total,
                    edge(screen[2], screen[0], p) / total,
                    edge(screen[0], screen[1], p) / total,
                ];
                if b.iter().any(|&w| w < 0.0) {
                    continue;
                }
                let z = b[0] * ndc[0].z + b[1] * ndc[1].z + b[2] * ndc[2].z;
                if z > 1.0 {
                    continue;
                }

                let index = (y as usize * row_pixels + x as usize) * sample_count + sample;
                if let Some(depth) = targets.depth.as_deref_mut() {
                    if let Some(compare) = state.depth_compare {
                        if !compare.passes(z, depth[index]) {
                            continue;
                        }
                    }
                    if state.depth_write {
                        depth[index] = z;
                    }
                }

                let shaded = *color.get_or_insert_with(|| {
                    let pw = [b[0] * inv_w[0], b[1] * inv_w[1], b[2] * inv_w[2]];
                    let norm = pw[0] + pw[1] + pw[2];
                    let world = (triangle[0].world * pw[0]
                        + triangle[1].world * pw[1]
                        + triangle[2].world * pw[2])
                        / norm;
                    let normal = (triangle[0].normal * pw[0]
                        + triangle[1].normal * pw[1]
                        + triangle[2].normal * pw[2])
                        / norm;
                    shade(constants, world, normal)
                });
                targets.color[index] = shaded;
            }
        }
    }
}

/// Averages every pixel's samples into `dst`.
pub(crate) fn resolve(src: &[[f32; 4]], sample_count: u32, dst: &mut [[f32; 4]]) {
    let n = sample_count.max(1) as usize;
    for (pixel, samples) in dst.iter_mut().zip(src.chunks_exact(n)) {
        let mut sum = [0.0f32; 4];
        for s in samples {
            for c in 0..4 {
                sum[c] += s[c];
            }
        }
        *pixel = sum.map(|v| v / n as f32);
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Quantizes a color to 8-bit RGBA, sRGB encoding the color channels if asked.
pub(crate) fn encode_rgba8(color: [f32; 4], srgb: bool) -> [u8; 4] {
    let quantize = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    let channel = |v: f32| {
        if srgb {
            quantize(linear_to_srgb(v.clamp(0.0, 1.0)))
        } else {
            quantize(v)
        }
    };
    [
        channel(color[0]),
        channel(color[1]),
        channel(color[2]),
        quantize(color[3]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn constants(material_color: [f32; 4], lights: Vec<LightConstants>) -> DrawConstants {
        DrawConstants {
            frame: FrameConstants::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO, lights.len() as u32),
            lights,
            material: MaterialConstants {
                base_color: material_color,
                emissive: [0.0; 4],
                metallic: 0.0,
                roughness: 0.5,
                opacity: 1.0,
                texture_flags: 0,
            },
        }
    }

    fn vertex(x: f32, y: f32, z: f32) -> ShadedVertex {
        ShadedVertex {
            clip: Vec4::new(x, y, z, 1.0),
            world: Vec3::new(x, y, z),
            normal: Vec3::Z,
        }
    }

    #[test]
    fn test_shade_matches_lambert_with_ambient() {
        let light = LightConstants::directional(-Vec3::Z, kinema_core::math::LinearRgba::WHITE, 1.0);
        let c = shade(&constants([0.5, 0.5, 0.5, 1.0], vec![light]), Vec3::ZERO, Vec3::Z);
        assert_relative_eq!(c[0], 0.55);
        assert_relative_eq!(c[3], 1.0);

        let unlit = shade(&constants([1.0, 1.0, 1.0, 1.0], vec![]), Vec3::ZERO, Vec3::Z);
        assert_relative_eq!(unlit[0], AMBIENT);
    }

    #[test]
    fn test_triangle_covers_and_depth_tests() {
        let extent = Extent2D::new(4, 4);
        let mut color = vec![[0.0; 4]; 16];
        let mut depth = vec![1.0; 16];
        let state = RasterState {
            cull_mode: Some(Face::Back),
            depth_compare: Some(CompareFunction::Less),
            depth_write: true,
        };
        let near = constants([1.0, 0.0, 0.0, 1.0], vec![]);
        let far = constants([0.0, 1.0, 0.0, 1.0], vec![]);
        let big = |z| [vertex(-1.0, -1.0, z), vertex(3.0, -1.0, z), vertex(-1.0, 3.0, z)];

        let mut targets = Targets {
            extent,
            sample_count: 1,
            color: &mut color,
            depth: Some(&mut depth),
        };
        draw_triangle(&mut targets, &state, &near, big(0.2));
        draw_triangle(&mut targets, &state, &far, big(0.5));

        assert!(color.iter().all(|c| c[0] > 0.0 && c[1] == 0.0));
        assert!(depth.iter().all(|&d| (d - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_back_faces_are_culled() {
        let mut color = vec![[0.0; 4]; 16];
        let mut targets = Targets {
            extent: Extent2D::new(4, 4),
            sample_count: 1,
            color: &mut color,
            depth: None,
        };
        let state = RasterState {
            cull_mode: Some(Face::Back),
            depth_compare: None,
            depth_write: false,
        };
        // Clockwise in NDC.
        let tri = [
            vertex(-1.0, -1.0, 0.5),
            vertex(-1.0, 3.0, 0.5),
            vertex(3.0, -1.0, 0.5),
        ];
        draw_triangle(&mut targets, &state, &constants([1.0; 4], vec![]), tri);
        assert!(color.iter().all(|c| *c == [0.0; 4]));
    }

    #[test]
    fn test_resolve_averages_samples() {
        let src = [[1.0, 0.0, 0.0, 1.0], [0.0; 4], [1.0, 0.0, 0.0, 1.0], [0.0; 4]];
        let mut dst = [[9.0; 4]; 1];
        resolve(&src, 4, &mut dst);
        assert_eq!(dst[0], [0.5, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn test_encode_rgba8() {
        assert_eq!(encode_rgba8([1.0, 0.5, -1.0, 2.0], false), [255, 128, 0, 255]);
        assert_eq!(encode_rgba8([0.5, 0.0, 1.0, 1.0], true)[0], 188);
    }
}
