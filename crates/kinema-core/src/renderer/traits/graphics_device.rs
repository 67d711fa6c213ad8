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

use crate::renderer::api::*;
use crate::renderer::error::{RenderError, ResourceError};
use crate::renderer::traits::CommandEncoder;
use std::fmt::Debug;

/// The main interface to a graphics device.
///
/// A device creates and destroys GPU resources, records commands through a
/// [`CommandEncoder`] and executes them. Execution is asynchronous: [`submit`]
/// returns as soon as the work is queued, and the completion callback fires later,
/// on a thread chosen by the backend.
///
/// [`submit`]: GraphicsDevice::submit
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// Returns the hardware limits the caller must respect.
    fn limits(&self) -> DeviceLimits;

    /// A human-readable name of the adapter, for logging.
    fn adapter_name(&self) -> String;

    /// Creates a shader module from the provided descriptor.
    /// ## Errors
    /// * `ResourceError::Shader` - If the source fails to compile.
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError>;

    /// Destroys the shader module associated with the given ID.
    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError>;

    /// Creates a bind group layout.
    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError>;

    /// Destroys a bind group layout.
    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) -> Result<(), ResourceError>;

    /// Creates a render pipeline from the provided descriptor.
    /// ## Errors
    /// * `ResourceError::Pipeline` - If the pipeline cannot be built, for instance
    ///   because the sample count is unsupported.
    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError>;

    /// Destroys the render pipeline associated with the given ID.
    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError>;

    /// Creates a new GPU buffer. Its contents are zeroed.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Creates a new GPU buffer and initializes it with the provided data.
    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError>;

    /// Destroys a GPU buffer.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Writes data to a GPU buffer.
    ///
    /// The write is ordered before any command buffer submitted afterwards.
    /// ## Errors
    /// * `ResourceError::OutOfBounds` - If `offset + data.len()` exceeds the buffer size.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Creates a new two-dimensional texture.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Destroys a texture.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Creates a view covering the whole texture.
    fn create_texture_view(&self, texture_id: TextureId) -> Result<TextureViewId, ResourceError>;

    /// Destroys a texture view.
    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError>;

    /// Creates a bind group.
    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError>;

    /// Destroys a bind group.
    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError>;

    /// Creates a new command encoder to record GPU commands.
    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder>;

    /// Submits a previously recorded command buffer for execution.
    ///
    /// `on_complete` is invoked exactly once, on an arbitrary thread, when the work has
    /// finished or failed. If `readback` is set, the requested buffer range is copied
    /// out after the work finished and handed to the callback.
    ///
    /// ## Errors
    /// A synchronous error means the work was never queued. `on_complete` is then
    /// dropped without being called.
    fn submit(
        &self,
        command_buffer: CommandBufferId,
        readback: Option<ReadbackRequest>,
        on_complete: CompletionCallback,
    ) -> Result<(), RenderError>;

    /// Blocks until every submitted command buffer has completed and its callback ran.
    fn wait_idle(&self) -> Result<(), RenderError>;
}
