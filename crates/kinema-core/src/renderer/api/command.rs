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

//! Command buffers, bind groups, render pass descriptors and submission types.

use crate::math::{Extent2D, LinearRgba};
use crate::renderer::api::buffer::BufferId;
use crate::renderer::api::pipeline::BindGroupLayoutId;
use crate::renderer::api::texture::{TextureId, TextureViewId};
use crate::renderer::error::RenderError;

/// An opaque handle to a recorded command buffer that is ready for submission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// An opaque handle to a bind group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BindGroupId(pub usize);

/// Binds a range of a buffer to one binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindGroupEntry {
    /// The binding index.
    pub binding: u32,
    /// The buffer bound here.
    pub buffer: BufferId,
    /// Base offset of the binding. Dynamic offsets are added on top.
    pub offset: u64,
    /// Size of the bound window. `None` binds the rest of the buffer.
    pub size: Option<u64>,
}

/// A descriptor used to create a [`BindGroupId`].
#[derive(Debug, Clone)]
pub struct BindGroupDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<&'a str>,
    /// The layout the group conforms to.
    pub layout: BindGroupLayoutId,
    /// The bound resources.
    pub entries: &'a [BindGroupEntry],
}

/// Describes the operation to perform on an attachment at the start of a render pass.
#[derive(Clone, Debug)]
pub enum LoadOp<V> {
    /// The existing contents of the attachment will be loaded into the pass.
    Load,
    /// The attachment will be cleared to the specified value before the pass begins.
    Clear(V),
}

/// Describes the operation to perform on an attachment at the end of a render pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
    /// The results of the render pass will be stored to the attachment's memory.
    Store,
    /// The results will be discarded. Resolve targets are still written.
    Discard,
}

/// Defines the load and store operations for a single render pass attachment.
#[derive(Debug, Clone)]
pub struct Operations<V> {
    /// The operation to perform at the beginning of the pass.
    pub load: LoadOp<V>,
    /// The operation to perform at the end of the pass.
    pub store: StoreOp,
}

/// A color attachment of a render pass.
#[derive(Debug)]
pub struct RenderPassColorAttachment<'a> {
    /// The view that will be rendered to.
    pub view: &'a TextureViewId,
    /// If `view` is multisampled, the single-sample view receiving the resolved output
    /// at the end of the pass. Must be `None` for single-sample views.
    pub resolve_target: Option<&'a TextureViewId>,
    /// The load and store operations for this color attachment.
    pub ops: Operations<LinearRgba>,
}

/// The depth attachment of a render pass.
#[derive(Debug)]
pub struct RenderPassDepthStencilAttachment<'a> {
    /// The view of the depth texture.
    pub view: &'a TextureViewId,
    /// The load and store operations for the depth aspect.
    pub depth_ops: Operations<f32>,
}

/// A descriptor for a render pass.
#[derive(Debug, Default)]
pub struct RenderPassDescriptor<'a> {
    /// An optional debug label for the render pass.
    pub label: Option<&'a str>,
    /// A slice of color attachments to be used in the pass.
    pub color_attachments: &'a [RenderPassColorAttachment<'a>],
    /// An optional depth attachment for this pass.
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment<'a>>,
}

/// Describes a texture-to-buffer copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureToBufferCopy {
    /// The single-sample source texture.
    pub texture: TextureId,
    /// The destination buffer.
    pub buffer: BufferId,
    /// Offset of the first row in the buffer.
    pub buffer_offset: u64,
    /// Distance in bytes between two rows in the buffer. Must be a multiple of
    /// the device's `copy_bytes_per_row_alignment`.
    pub bytes_per_row: u32,
    /// The copied region, starting at the texture origin.
    pub extent: Extent2D,
}

/// A range of a buffer whose contents are read back once a submission completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadbackRequest {
    /// The buffer to read. It must have been created with `MAP_READ`.
    pub buffer: BufferId,
    /// Offset of the range.
    pub offset: u64,
    /// Size of the range.
    pub size: u64,
}

/// The outcome of a successful submission.
#[derive(Debug, Default)]
pub struct CompletedSubmission {
    /// The bytes of the [`ReadbackRequest`], if one was attached.
    pub readback: Option<Vec<u8>>,
}

/// Invoked exactly once when a submission finishes executing, on an arbitrary thread.
pub type CompletionCallback =
    Box<dyn FnOnce(Result<CompletedSubmission, RenderError>) + Send + 'static>;
