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

//! Render pipeline, bind group layout and vertex layout descriptors.

use crate::renderer::api::shader::ShaderModuleId;
use crate::renderer::api::texture::TextureFormat;
use bitflags::bitflags;
use std::borrow::Cow;

/// An opaque handle to a compiled render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPipelineId(pub usize);

/// An opaque handle to a bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutId(pub usize);

bitflags! {
    /// The shader stages a binding is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// The vertex stage.
        const VERTEX = 1 << 0;
        /// The fragment stage.
        const FRAGMENT = 1 << 1;
    }
}

/// The kind of buffer a binding refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferBindingType {
    /// A uniform buffer.
    Uniform,
    /// A storage buffer.
    Storage {
        /// Whether the shader may only read from it.
        read_only: bool,
    },
}

/// One entry of a [`BindGroupLayoutDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutEntry {
    /// The binding index inside the group.
    pub binding: u32,
    /// Stages that can see this binding.
    pub visibility: ShaderStages,
    /// The type of buffer bound here.
    pub ty: BufferBindingType,
    /// If `true`, the offset is provided at `set_bind_group` time.
    pub has_dynamic_offset: bool,
    /// The minimum size the bound range must have, if any.
    pub min_binding_size: Option<u64>,
}

/// Describes the layout of a bind group.
#[derive(Debug, Clone)]
pub struct BindGroupLayoutDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<&'a str>,
    /// The entries, ordered by binding index.
    pub entries: &'a [BindGroupLayoutEntry],
}

/// The data type of a single vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// Two 32-bit floats.
    Float32x2,
    /// Three 32-bit floats.
    Float32x3,
    /// Four 32-bit floats.
    Float32x4,
}

impl VertexFormat {
    /// Size of the attribute in bytes.
    pub const fn size(self) -> u64 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// Whether a vertex buffer advances per vertex or per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexStepMode {
    /// Advance once per vertex.
    Vertex,
    /// Advance once per instance.
    Instance,
}

/// A single attribute inside a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// The attribute format.
    pub format: VertexFormat,
    /// Byte offset inside one vertex.
    pub offset: u64,
    /// The `@location` the shader reads it from.
    pub shader_location: u32,
}

/// The layout of one vertex buffer slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout<'a> {
    /// Distance in bytes between two consecutive elements.
    pub array_stride: u64,
    /// How the buffer advances.
    pub step_mode: VertexStepMode,
    /// The attributes of one element.
    pub attributes: Cow<'a, [VertexAttribute]>,
}

/// Comparison used by the depth test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    /// Passes if the incoming value is less than the stored one.
    Less,
    /// Passes if the incoming value is less than or equal to the stored one.
    LessEqual,
    /// Always passes.
    Always,
}

impl CompareFunction {
    /// Evaluates the comparison for an incoming and a stored depth value.
    #[inline]
    pub fn passes(self, incoming: f32, stored: f32) -> bool {
        match self {
            CompareFunction::Less => incoming < stored,
            CompareFunction::LessEqual => incoming <= stored,
            CompareFunction::Always => true,
        }
    }
}

/// Which triangle faces to discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    /// Discard front faces.
    Front,
    /// Discard back faces.
    Back,
}

/// Depth testing state for a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    /// The depth attachment format.
    pub format: TextureFormat,
    /// Whether passing fragments write their depth.
    pub write_enabled: bool,
    /// The depth comparison.
    pub compare: CompareFunction,
}

/// A descriptor used to create a [`RenderPipelineId`].
///
/// Triangles are always counter-clockwise front facing with triangle-list topology.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The module holding both entry points.
    pub shader_module: ShaderModuleId,
    /// The vertex entry point.
    pub vertex_entry_point: Cow<'a, str>,
    /// The fragment entry point.
    pub fragment_entry_point: Cow<'a, str>,
    /// The bind group layouts, one per group index.
    pub bind_group_layouts: Cow<'a, [BindGroupLayoutId]>,
    /// The vertex buffer slots.
    pub vertex_buffers: Cow<'a, [VertexBufferLayout<'a>]>,
    /// The color target format.
    pub color_format: TextureFormat,
    /// Depth testing, if any.
    pub depth: Option<DepthState>,
    /// Faces to cull, if any.
    pub cull_mode: Option<Face>,
    /// Number of samples per pixel of the targets this pipeline renders to.
    pub sample_count: u32,
}
