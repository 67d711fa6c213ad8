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
use kinema_core::renderer::{
    BindGroupId, BufferId, CommandBufferId, CommandEncoder, IndexFormat, RenderPass,
    RenderPassDescriptor, RenderPipelineId, TextureToBufferCopy,
};
use std::any::Any;
use std::ops::Range;
use std::sync::Arc;

use super::conversions::IntoWgpu;
use super::device::WgpuDevice;

/// A render pass recording into a wgpu command encoder.
pub struct WgpuRenderPass<'a> {
    pub(crate) pass: wgpu::RenderPass<'a>,
    pub(crate) device: &'a WgpuDevice,
}

impl<'pass> RenderPass<'pass> for WgpuRenderPass<'pass> {
    fn set_pipeline(&mut self, pipeline_id: &'pass RenderPipelineId) {
        if let Some(pipeline) = self.device.get_wgpu_render_pipeline(*pipeline_id) {
            self.pass.set_pipeline(&pipeline);
        } else {
            log::warn!("WgpuRenderPass: RenderPipelineId {pipeline_id:?} not found.");
        }
    }

    fn set_bind_group(&mut self, index: u32, bind_group_id: &'pass BindGroupId, offsets: &[u32]) {
        if let Some(bind_group) = self.device.get_wgpu_bind_group(*bind_group_id) {
            self.pass.set_bind_group(index, bind_group.as_ref(), offsets);
        } else {
            log::warn!("WgpuRenderPass: BindGroupId {bind_group_id:?} not found.");
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer_id: &'pass BufferId, offset: u64) {
        if let Some(buffer) = self.device.get_wgpu_buffer(*buffer_id) {
            self.pass.set_vertex_buffer(slot, buffer.slice(offset..));
        } else {
            log::warn!("WgpuRenderPass: Vertex BufferId {buffer_id:?} not found.");
        }
    }

    fn set_index_buffer(
        &mut self,
        buffer_id: &'pass BufferId,
        offset: u64,
        index_format: IndexFormat,
    ) {
        if let Some(buffer) = self.device.get_wgpu_buffer(*buffer_id) {
            self.pass
                .set_index_buffer(buffer.slice(offset..), index_format.into_wgpu());
        } else {
            log::warn!("WgpuRenderPass: Index BufferId {buffer_id:?} not found.");
        }
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.pass.draw_indexed(indices, base_vertex, instances);
    }
}

/// Records commands for the [`WgpuDevice`].
pub struct WgpuCommandEncoder {
    pub(crate) encoder: wgpu::CommandEncoder,
    pub(crate) device: WgpuDevice,
    /// Handles that could not be resolved while recording. A non-empty list fails the
    /// submission of the finished buffer.
    pub(crate) errors: Vec<String>,
}

impl WgpuCommandEncoder {
    /// Provides mutable access to the underlying `wgpu::CommandEncoder`.
    pub fn wgpu_encoder_mut(&mut self) -> &mut wgpu::CommandEncoder {
        &mut self.encoder
    }
}

impl CommandEncoder for WgpuCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'encoder>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder> {
        let mut views: Vec<Arc<wgpu::TextureView>> = Vec::new();
        let mut resolve_targets: Vec<Option<Arc<wgpu::TextureView>>> = Vec::new();
        let mut ops = Vec::new();
        for att in descriptor.color_attachments.iter() {
            let Some(view) = self.device.get_wgpu_texture_view(att.view) else {
                self.errors
                    .push(format!("color attachment {:?} not found", att.view));
                continue;
            };
            let resolve_target = match att.resolve_target {
                Some(id) => {
                    let target = self.device.get_wgpu_texture_view(id);
                    if target.is_none() {
                        self.errors.push(format!("resolve target {id:?} not found"));
                    }
                    target
                }
                None => None,
            };
            views.push(view);
            resolve_targets.push(resolve_target);
            ops.push(wgpu::Operations {
                load: att.ops.load.clone().into_wgpu(),
                store: att.ops.store.clone().into_wgpu(),
            });
        }

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = views
            .iter()
            .zip(resolve_targets.iter())
            .zip(ops)
            .map(|((view, resolve_target), ops)| {
                Some(wgpu::RenderPassColorAttachment {
                    view: view.as_ref(),
                    resolve_target: resolve_target.as_deref(),
                    ops,
                    depth_slice: None,
                })
            })
            .collect();

        let depth_view = descriptor
            .depth_stencil_attachment
            .as_ref()
            .and_then(|ds| {
                let view = self.device.get_wgpu_texture_view(ds.view);
                if view.is_none() {
                    self.errors
                        .push(format!("depth attachment {:?} not found", ds.view));
                }
                view.map(|view| (view, ds.depth_ops.clone()))
            });
        let depth_stencil_attachment =
            depth_view
                .as_ref()
                .map(|(view, depth_ops)| wgpu::RenderPassDepthStencilAttachment {
                    view: view.as_ref(),
                    depth_ops: Some(wgpu::Operations {
                        load: depth_ops.load.clone().into_wgpu(),
                        store: depth_ops.store.clone().into_wgpu(),
                    }),
                    stencil_ops: None,
                });

        let wgpu_descriptor = wgpu::RenderPassDescriptor {
            label: descriptor.label,
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        };

        let pass = self.encoder.begin_render_pass(&wgpu_descriptor);
        Box::new(WgpuRenderPass {
            pass,
            device: &self.device,
        })
    }

    fn copy_texture_to_buffer(&mut self, copy: &TextureToBufferCopy) {
        let texture = self.device.get_wgpu_texture(copy.texture);
        let buffer = self.device.get_wgpu_buffer(copy.buffer);
        let (Some(texture), Some(buffer)) = (texture, buffer) else {
            self.errors.push(format!(
                "copy from {:?} into {:?} refers to a missing resource",
                copy.texture, copy.buffer
            ));
            return;
        };
        self.encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: copy.buffer_offset,
                    bytes_per_row: Some(copy.bytes_per_row),
                    rows_per_image: Some(copy.extent.height),
                },
            },
            copy.extent.into_wgpu(),
        );
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let Self {
            encoder,
            device,
            errors,
        } = *self;
        let command_buffer = encoder.finish();
        device.register_command_buffer(command_buffer, errors)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
