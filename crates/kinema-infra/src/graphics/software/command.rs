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

use super::device::SoftwareDevice;
use kinema_core::math::LinearRgba;
use kinema_core::renderer::{
    BindGroupId, BufferId, CommandBufferId, CommandEncoder, IndexFormat, LoadOp,
    RenderPass, RenderPassDescriptor, RenderPipelineId, StoreOp, TextureToBufferCopy,
    TextureViewId,
};
use std::any::Any;
use std::ops::Range;

#[derive(Debug, Clone)]
pub(crate) struct RecordedDraw {
    pub pipeline: Option<RenderPipelineId>,
    pub bind_group: Option<(BindGroupId, Vec<u32>)>,
    pub vertex_buffer: Option<(BufferId, u64)>,
    pub index_buffer: Option<(BufferId, u64, IndexFormat)>,
    pub indices: Range<u32>,
    pub base_vertex: i32,
    pub instances: Range<u32>,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedColorAttachment {
    pub view: TextureViewId,
    pub resolve_target: Option<TextureViewId>,
    pub load: LoadOp<LinearRgba>,
    pub store: StoreOp,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedPass {
    pub label: Option<String>,
    pub color_attachments: Vec<RecordedColorAttachment>,
    pub depth: Option<(TextureViewId, LoadOp<f32>)>,
    pub draws: Vec<RecordedDraw>,
}

#[derive(Debug, Clone)]
pub(crate) enum Command {
    Pass(RecordedPass),
    CopyTextureToBuffer(TextureToBufferCopy),
}

/// Records draw state and draws into a pass; nothing executes until submission.
///
/// Like a wgpu pass, the pass ends when it is dropped.
pub struct SoftwareRenderPass<'a> {
    commands: &'a mut Vec<Command>,
    pass: Option<RecordedPass>,
    pipeline: Option<RenderPipelineId>,
    bind_group: Option<(BindGroupId, Vec<u32>)>,
    vertex_buffer: Option<(BufferId, u64)>,
    index_buffer: Option<(BufferId, u64, IndexFormat)>,
}

impl<'pass> RenderPass<'pass> for SoftwareRenderPass<'pass> {
    fn set_pipeline(&mut self, pipeline: &'pass RenderPipelineId) {
        self.pipeline = Some(*pipeline);
    }

    fn set_bind_group(&mut self, index: u32, bind_group: &'pass BindGroupId, offsets: &[u32]) {
        if index != 0 {
            log::warn!("SoftwareRenderPass: only bind group 0 is read, ignoring group {index}");
            return;
        }
        self.bind_group = Some((*bind_group, offsets.to_vec()));
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &'pass BufferId, offset: u64) {
        if slot != 0 {
            log::warn!("SoftwareRenderPass: only vertex slot 0 is read, ignoring slot {slot}");
            return;
        }
        self.vertex_buffer = Some((*buffer, offset));
    }

    fn set_index_buffer(&mut self, buffer: &'pass BufferId, offset: u64, index_format: IndexFormat) {
        self.index_buffer = Some((*buffer, offset, index_format));
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        let Some(pass) = self.pass.as_mut() else {
            return;
        };
        pass.draws.push(RecordedDraw {
            pipeline: self.pipeline,
            bind_group: self.bind_group.clone(),
            vertex_buffer: self.vertex_buffer,
            index_buffer: self.index_buffer,
            indices,
            base_vertex,
            instances,
        });
    }
}

impl Drop for SoftwareRenderPass<'_> {
    fn drop(&mut self) {
        if let Some(pass) = self.pass.take() {
            self.commands.push(Command::Pass(pass));
        }
    }
}

/// Records commands for the [`SoftwareDevice`].
pub struct SoftwareCommandEncoder {
    pub(crate) device: SoftwareDevice,
    pub(crate) commands: Vec<Command>,
}

impl CommandEncoder for SoftwareCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'encoder>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder> {
        let pass = RecordedPass {
            label: descriptor.label.map(str::to_owned),
            color_attachments: descriptor
                .color_attachments
                .iter()
                .map(|attachment| RecordedColorAttachment {
                    view: *attachment.view,
                    resolve_target: attachment.resolve_target.copied(),
                    load: attachment.ops.load.clone(),
                    store: attachment.ops.store.clone(),
                })
                .collect(),
            depth: descriptor
                .depth_stencil_attachment
                .as_ref()
                .map(|ds| (*ds.view, ds.depth_ops.load.clone())),
            draws: Vec::new(),
        };
        Box::new(SoftwareRenderPass {
            commands: &mut self.commands,
            pass: Some(pass),
            pipeline: None,
            bind_group: None,
            vertex_buffer: None,
            index_buffer: None,
        })
    }

    fn copy_texture_to_buffer(&mut self, copy: &TextureToBufferCopy) {
        self.commands.push(Command::CopyTextureToBuffer(*copy));
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let Self { device, commands } = *self;
        device.register_command_buffer(commands)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
