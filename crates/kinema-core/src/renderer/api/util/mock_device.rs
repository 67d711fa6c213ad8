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

//! A recording mock device for unit tests of the rendering utilities.

use crate::renderer::api::*;
use crate::renderer::error::{RenderError, ResourceError};
use crate::renderer::traits::{CommandEncoder, GraphicsDevice, RenderPass};
use std::any::Any;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub(crate) struct MockGraphicsDevice {
    next_id: AtomicUsize,
    buffer_sizes: Mutex<HashMap<BufferId, u64>>,
    writes: Mutex<Vec<(BufferId, u64, Vec<u8>)>>,
}

impl MockGraphicsDevice {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn buffer_size(&self, id: BufferId) -> Option<u64> {
        self.buffer_sizes.lock().unwrap().get(&id).copied()
    }

    pub(crate) fn writes(&self) -> Vec<(BufferId, u64, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }
}

struct MockRenderPass;

impl<'a> RenderPass<'a> for MockRenderPass {
    fn set_pipeline(&mut self, _pipeline: &'a RenderPipelineId) {}
    fn set_bind_group(&mut self, _index: u32, _bind_group: &'a BindGroupId, _offsets: &[u32]) {}
    fn set_vertex_buffer(&mut self, _slot: u32, _buffer: &'a BufferId, _offset: u64) {}
    fn set_index_buffer(&mut self, _buffer: &'a BufferId, _offset: u64, _format: IndexFormat) {}
    fn draw_indexed(&mut self, _indices: Range<u32>, _base_vertex: i32, _instances: Range<u32>) {}
}

struct MockCommandEncoder;

impl CommandEncoder for MockCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        _descriptor: &RenderPassDescriptor<'encoder>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder> {
        Box::new(MockRenderPass)
    }

    fn copy_texture_to_buffer(&mut self, _copy: &TextureToBufferCopy) {}

    fn finish(self: Box<Self>) -> CommandBufferId {
        CommandBufferId(0)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn limits(&self) -> DeviceLimits {
        DeviceLimits::default()
    }

    fn adapter_name(&self) -> String {
        "Mock".to_string()
    }

    fn create_shader_module(
        &self,
        _descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        Ok(ShaderModuleId(self.next()))
    }

    fn destroy_shader_module(&self, _id: ShaderModuleId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_bind_group_layout(
        &self,
        _descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        Ok(BindGroupLayoutId(self.next()))
    }

    fn destroy_bind_group_layout(&self, _id: BindGroupLayoutId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_render_pipeline(
        &self,
        _descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        Ok(RenderPipelineId(self.next()))
    }

    fn destroy_render_pipeline(&self, _id: RenderPipelineId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let id = BufferId(self.next());
        self.buffer_sizes
            .lock()
            .unwrap()
            .insert(id, descriptor.size);
        Ok(id)
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        _data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        self.create_buffer(descriptor)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        self.buffer_sizes
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let size = self.buffer_size(id).ok_or(ResourceError::NotFound)?;
        if offset + data.len() as u64 > size {
            return Err(ResourceError::OutOfBounds);
        }
        self.writes
            .lock()
            .unwrap()
            .push((id, offset, data.to_vec()));
        Ok(())
    }

    fn create_texture(&self, _descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        Ok(TextureId(self.next()))
    }

    fn destroy_texture(&self, _id: TextureId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_texture_view(&self, _texture_id: TextureId) -> Result<TextureViewId, ResourceError> {
        Ok(TextureViewId(self.next()))
    }

    fn destroy_texture_view(&self, _id: TextureViewId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_bind_group(
        &self,
        _descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        Ok(BindGroupId(self.next()))
    }

    fn destroy_bind_group(&self, _id: BindGroupId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_command_encoder(&self, _label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(MockCommandEncoder)
    }

    fn submit(
        &self,
        _command_buffer: CommandBufferId,
        _readback: Option<ReadbackRequest>,
        on_complete: CompletionCallback,
    ) -> Result<(), RenderError> {
        on_complete(Ok(CompletedSubmission::default()));
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), RenderError> {
        Ok(())
    }
}
