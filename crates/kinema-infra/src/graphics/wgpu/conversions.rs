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
use kinema_core::math::{Extent2D, LinearRgba};
use kinema_core::renderer::{
    BufferBindingType, BufferUsage, CompareFunction, DeviceLimits, Face, IndexFormat, LoadOp,
    ShaderStages, StoreOp, TextureFormat, TextureUsage, VertexFormat, VertexStepMode,
};

/// A local extension trait to convert Kinema's types into WGPU-compatible types.
/// This avoids Rust's orphan rules while keeping an idiomatic `.into_wgpu()` syntax.
pub trait IntoWgpu<T> {
    /// Consumes self and converts it into a WGPU-compatible type.
    fn into_wgpu(self) -> T;
}

impl IntoWgpu<wgpu::Extent3d> for Extent2D {
    fn into_wgpu(self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

// The flag bits are laid out like wgpu's.
impl IntoWgpu<wgpu::BufferUsages> for BufferUsage {
    fn into_wgpu(self) -> wgpu::BufferUsages {
        wgpu::BufferUsages::from_bits_truncate(self.bits())
    }
}

impl IntoWgpu<wgpu::TextureUsages> for TextureUsage {
    fn into_wgpu(self) -> wgpu::TextureUsages {
        wgpu::TextureUsages::from_bits_truncate(self.bits())
    }
}

impl IntoWgpu<wgpu::ShaderStages> for ShaderStages {
    fn into_wgpu(self) -> wgpu::ShaderStages {
        let mut stages = wgpu::ShaderStages::NONE;
        if self.contains(ShaderStages::VERTEX) {
            stages |= wgpu::ShaderStages::VERTEX;
        }
        if self.contains(ShaderStages::FRAGMENT) {
            stages |= wgpu::ShaderStages::FRAGMENT;
        }
        stages
    }
}

impl IntoWgpu<wgpu::TextureFormat> for TextureFormat {
    fn into_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }
}

impl IntoWgpu<wgpu::VertexFormat> for VertexFormat {
    fn into_wgpu(self) -> wgpu::VertexFormat {
        match self {
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        }
    }
}

impl IntoWgpu<wgpu::VertexStepMode> for VertexStepMode {
    fn into_wgpu(self) -> wgpu::VertexStepMode {
        match self {
            VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
            VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
        }
    }
}

impl IntoWgpu<wgpu::CompareFunction> for CompareFunction {
    fn into_wgpu(self) -> wgpu::CompareFunction {
        match self {
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }
}

impl IntoWgpu<wgpu::Face> for Face {
    fn into_wgpu(self) -> wgpu::Face {
        match self {
            Face::Front => wgpu::Face::Front,
            Face::Back => wgpu::Face::Back,
        }
    }
}

impl IntoWgpu<wgpu::IndexFormat> for IndexFormat {
    fn into_wgpu(self) -> wgpu::IndexFormat {
        match self {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }
}

impl IntoWgpu<wgpu::BufferBindingType> for BufferBindingType {
    fn into_wgpu(self) -> wgpu::BufferBindingType {
        match self {
            BufferBindingType::Uniform => wgpu::BufferBindingType::Uniform,
            BufferBindingType::Storage { read_only } => {
                wgpu::BufferBindingType::Storage { read_only }
            }
        }
    }
}

impl IntoWgpu<wgpu::StoreOp> for StoreOp {
    fn into_wgpu(self) -> wgpu::StoreOp {
        match self {
            StoreOp::Store => wgpu::StoreOp::Store,
            StoreOp::Discard => wgpu::StoreOp::Discard,
        }
    }
}

impl IntoWgpu<wgpu::LoadOp<wgpu::Color>> for LoadOp<LinearRgba> {
    fn into_wgpu(self) -> wgpu::LoadOp<wgpu::Color> {
        match self {
            LoadOp::Load => wgpu::LoadOp::Load,
            LoadOp::Clear(color) => wgpu::LoadOp::Clear(wgpu::Color {
                r: color.r as f64,
                g: color.g as f64,
                b: color.b as f64,
                a: color.a as f64,
            }),
        }
    }
}

impl IntoWgpu<wgpu::LoadOp<f32>> for LoadOp<f32> {
    fn into_wgpu(self) -> wgpu::LoadOp<f32> {
        match self {
            LoadOp::Load => wgpu::LoadOp::Load,
            LoadOp::Clear(depth) => wgpu::LoadOp::Clear(depth),
        }
    }
}

/// Builds Kinema's view of a device's limits.
///
/// `max_sample_count` comes from the adapter's support for multisampled color targets.
pub fn from_wgpu_limits(limits: &wgpu::Limits, max_sample_count: u32) -> DeviceLimits {
    DeviceLimits {
        min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
        min_storage_buffer_offset_alignment: limits.min_storage_buffer_offset_alignment,
        copy_bytes_per_row_alignment: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
        max_storage_buffer_binding_size: limits.max_storage_buffer_binding_size as u64,
        max_sample_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_bits_match_wgpu() {
        let usage = BufferUsage::MAP_READ | BufferUsage::COPY_DST;
        let converted: wgpu::BufferUsages = usage.into_wgpu();
        assert_eq!(
            converted,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST
        );

        let usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC;
        let converted: wgpu::TextureUsages = usage.into_wgpu();
        assert_eq!(
            converted,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC
        );

        let all = BufferUsage::all();
        let converted: wgpu::BufferUsages = all.into_wgpu();
        assert_eq!(converted.bits(), all.bits());
    }

    #[test]
    fn test_clear_color_widens() {
        let op: wgpu::LoadOp<wgpu::Color> =
            LoadOp::Clear(LinearRgba::new(0.5, 0.25, 0.0, 1.0)).into_wgpu();
        match op {
            wgpu::LoadOp::Clear(c) => {
                assert_eq!((c.r, c.g, c.b, c.a), (0.5, 0.25, 0.0, 1.0));
            }
            other => panic!("unexpected load op {other:?}"),
        }
    }
}
