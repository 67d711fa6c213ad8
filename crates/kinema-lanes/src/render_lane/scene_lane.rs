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

//! The forward scene pass: multisampled color and depth, resolved and copied out for
//! readback.

use super::shaders::SCENE_WGSL;
use super::{BatchPlanner, FramePlan, PlanError, SceneSnapshot};
use kinema_core::math::{align_up, Extent2D, LinearRgba};
use kinema_core::renderer::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindGroupLayoutId, BufferBindingType, BufferDescriptor, BufferId,
    BufferUsage, CommandBufferId, CompareFunction, DepthState, Face, FrameConstantBuffer,
    FrameConstants, FrameRange, GraphicsDevice, IndexFormat, LightConstants, LoadOp,
    MaterialConstants, NodeConstants, Operations, PipelineError, ReadbackRequest, RenderError,
    RenderPassColorAttachment, RenderPassDepthStencilAttachment, RenderPassDescriptor,
    RenderPipelineDescriptor, RenderPipelineId, ResourceError, ShaderModuleDescriptor,
    ShaderModuleId, ShaderSourceData, ShaderStages, StoreOp, TextureDescriptor, TextureFormat,
    TextureId, TextureToBufferCopy, TextureUsage, TextureViewId, Vertex, VertexAttribute,
    VertexBufferLayout, VertexFormat, VertexStepMode, FRAME_CONSTANTS_BINDING,
    LIGHT_CONSTANTS_BINDING, MATERIAL_CONSTANTS_BINDING, NODE_CONSTANTS_BINDING,
};
use kinema_core::sink::{FrameImage, FRAME_IMAGE_BYTES_PER_PIXEL};
use kinema_data::assets::MeshId;
use std::borrow::Cow;
use std::collections::HashMap;
use std::mem::size_of;
use thiserror::Error;

/// The color format of the scene targets and of the read back image.
pub const SCENE_COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
/// The depth format of the scene pass.
pub const SCENE_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Errors of [`SceneRenderLane::prepare`].
#[derive(Debug, Error)]
pub enum LaneError {
    /// Writing the frame's constants failed.
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// Uploading geometry or constants failed.
    #[error("Scene lane resource error: {0}")]
    Resource(#[from] ResourceError),
}

/// Static configuration of the scene pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneLaneConfig {
    /// Output size.
    pub extent: Extent2D,
    /// MSAA sample count, 1 or 4.
    pub sample_count: u32,
    /// Largest instance count of one draw.
    pub max_instances_per_draw: u32,
    /// Largest light count of one frame.
    pub max_lights: u32,
    /// Clear color of the color target.
    pub clear_color: LinearRgba,
    /// Number of readback buffers, one per frame that can be in flight. Frames pick
    /// theirs by in-flight slot.
    pub readback_slots: usize,
}

impl SceneLaneConfig {
    /// Byte sizes of the four constant binding windows.
    pub fn binding_windows(&self) -> [u64; 4] {
        [
            size_of::<FrameConstants>() as u64,
            self.max_lights.max(1) as u64 * size_of::<LightConstants>() as u64,
            self.max_instances_per_draw.max(1) as u64 * size_of::<NodeConstants>() as u64,
            size_of::<MaterialConstants>() as u64,
        ]
    }

    /// Bytes to add past the ring capacity so every window can start at any ring offset.
    pub fn binding_slack(&self) -> u64 {
        self.binding_windows().into_iter().max().unwrap_or(0)
    }
}

/// Row layout of a read back image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadbackLayout {
    /// Image size.
    pub extent: Extent2D,
    /// Bytes of pixel data per row.
    pub unpadded_bytes_per_row: u32,
    /// Bytes per row in the readback buffer, aligned for texture copies.
    pub padded_bytes_per_row: u32,
}

impl ReadbackLayout {
    /// Computes the layout for an extent and the device's copy row alignment.
    pub fn new(extent: Extent2D, row_alignment: u32) -> Self {
        let unpadded = extent.width * FRAME_IMAGE_BYTES_PER_PIXEL;
        Self {
            extent,
            unpadded_bytes_per_row: unpadded,
            padded_bytes_per_row: align_up(unpadded as u64, row_alignment.max(1) as u64) as u32,
        }
    }

    /// Size of the readback buffer.
    pub fn buffer_size(&self) -> u64 {
        self.padded_bytes_per_row as u64 * self.extent.height as u64
    }

    /// Strips the row padding of `bytes` into `image`.
    pub fn copy_to(&self, bytes: &[u8], image: &mut FrameImage) -> Result<(), RenderError> {
        if image.extent() != self.extent {
            return Err(RenderError::ReadbackFailed(format!(
                "image extent {:?} does not match readback extent {:?}",
                image.extent(),
                self.extent
            )));
        }
        if (bytes.len() as u64) < self.buffer_size() {
            return Err(RenderError::ReadbackFailed(format!(
                "readback holds {} bytes, expected {}",
                bytes.len(),
                self.buffer_size()
            )));
        }
        let (padded, unpadded) = (
            self.padded_bytes_per_row as usize,
            self.unpadded_bytes_per_row as usize,
        );
        for (dst, src) in image
            .pixels_mut()
            .chunks_exact_mut(unpadded)
            .zip(bytes.chunks(padded))
        {
            dst.copy_from_slice(&src[..unpadded]);
        }
        Ok(())
    }
}

/// A frame whose constants are committed and which is ready to encode.
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    /// Offset of the frame constants.
    pub frame_offset: u32,
    /// Offset of the light array.
    pub light_offset: u32,
    /// The ordered draws.
    pub plan: FramePlan,
    /// The constant ring range the frame occupies.
    pub constant_range: FrameRange,
    /// The in-flight slot the frame holds.
    pub slot: usize,
}

#[derive(Debug)]
struct GpuMesh {
    vertex_buffer: BufferId,
    index_buffer: BufferId,
}

#[derive(Debug, Clone, Copy)]
struct RenderTarget {
    texture: TextureId,
    view: TextureViewId,
}

impl RenderTarget {
    fn new(
        device: &dyn GraphicsDevice,
        label: &str,
        extent: Extent2D,
        sample_count: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Result<Self, ResourceError> {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some(Cow::Borrowed(label)),
            size: extent,
            sample_count,
            format,
            usage,
        })?;
        let view = device.create_texture_view(texture)?;
        Ok(Self { texture, view })
    }

    fn destroy(&self, device: &dyn GraphicsDevice) {
        warn_on_error("texture view", device.destroy_texture_view(self.view));
        warn_on_error("texture", device.destroy_texture(self.texture));
    }
}

fn warn_on_error(what: &str, result: Result<(), ResourceError>) {
    if let Err(e) = result {
        log::warn!("Failed to destroy scene lane {what}: {e}");
    }
}

/// Renders a [`SceneSnapshot`] into an offscreen image and copies it out.
#[derive(Debug)]
pub struct SceneRenderLane {
    config: SceneLaneConfig,
    planner: BatchPlanner,
    shader: ShaderModuleId,
    bind_group_layout: BindGroupLayoutId,
    pipeline: RenderPipelineId,
    bind_group: BindGroupId,
    msaa: Option<RenderTarget>,
    resolve: RenderTarget,
    depth: RenderTarget,
    readback: Vec<BufferId>,
    readback_layout: ReadbackLayout,
    meshes: HashMap<MeshId, GpuMesh>,
}

impl SceneRenderLane {
    /// Builds the pipeline, targets and readback buffers.
    ///
    /// `constants` must have been created with at least
    /// [`SceneLaneConfig::binding_slack`] bytes of slack.
    ///
    /// # Errors
    /// `PipelineError::UnsupportedSampleCount` for sample counts other than 1 or 4 or
    /// above the device limit, and any resource creation error of the device.
    pub fn new(
        device: &dyn GraphicsDevice,
        constants: &FrameConstantBuffer,
        config: SceneLaneConfig,
    ) -> Result<Self, ResourceError> {
        let limits = device.limits();
        if !matches!(config.sample_count, 1 | 4) || config.sample_count > limits.max_sample_count {
            return Err(PipelineError::UnsupportedSampleCount(config.sample_count).into());
        }

        let shader = device.create_shader_module(&ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: ShaderSourceData::Wgsl(Cow::Borrowed(SCENE_WGSL)),
        })?;

        let windows = config.binding_windows();
        let entry = |binding: u32, visibility, ty| BindGroupLayoutEntry {
            binding,
            visibility,
            ty,
            has_dynamic_offset: true,
            min_binding_size: Some(windows[binding as usize]),
        };
        let storage = BufferBindingType::Storage { read_only: true };
        let layout_entries = [
            entry(
                FRAME_CONSTANTS_BINDING,
                ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                BufferBindingType::Uniform,
            ),
            entry(LIGHT_CONSTANTS_BINDING, ShaderStages::FRAGMENT, storage),
            entry(NODE_CONSTANTS_BINDING, ShaderStages::VERTEX, storage),
            entry(
                MATERIAL_CONSTANTS_BINDING,
                ShaderStages::FRAGMENT,
                BufferBindingType::Uniform,
            ),
        ];
        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Scene Constants Layout"),
            entries: &layout_entries,
        })?;

        let group_entries: Vec<BindGroupEntry> = layout_entries
            .iter()
            .map(|e| BindGroupEntry {
                binding: e.binding,
                buffer: constants.buffer(),
                offset: 0,
                size: e.min_binding_size,
            })
            .collect();
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("Scene Constants"),
            layout: bind_group_layout,
            entries: &group_entries,
        })?;

        let attributes = [
            VertexAttribute {
                format: VertexFormat::Float32x3,
                offset: 0,
                shader_location: 0,
            },
            VertexAttribute {
                format: VertexFormat::Float32x3,
                offset: VertexFormat::Float32x3.size(),
                shader_location: 1,
            },
        ];
        let vertex_buffers = [VertexBufferLayout {
            array_stride: size_of::<Vertex>() as u64,
            step_mode: VertexStepMode::Vertex,
            attributes: Cow::Borrowed(&attributes),
        }];
        let layouts = [bind_group_layout];
        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(Cow::Borrowed("Scene Pipeline")),
            shader_module: shader,
            vertex_entry_point: Cow::Borrowed("vs_main"),
            fragment_entry_point: Cow::Borrowed("fs_main"),
            bind_group_layouts: Cow::Borrowed(&layouts),
            vertex_buffers: Cow::Borrowed(&vertex_buffers),
            color_format: SCENE_COLOR_FORMAT,
            depth: Some(DepthState {
                format: SCENE_DEPTH_FORMAT,
                write_enabled: true,
                compare: CompareFunction::Less,
            }),
            cull_mode: Some(Face::Back),
            sample_count: config.sample_count,
        })?;

        let extent = config.extent;
        let msaa = if config.sample_count > 1 {
            Some(RenderTarget::new(
                device,
                "Scene MSAA Color",
                extent,
                config.sample_count,
                SCENE_COLOR_FORMAT,
                TextureUsage::RENDER_ATTACHMENT,
            )?)
        } else {
            None
        };
        let resolve = RenderTarget::new(
            device,
            "Scene Output",
            extent,
            1,
            SCENE_COLOR_FORMAT,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        )?;
        let depth = RenderTarget::new(
            device,
            "Scene Depth",
            extent,
            config.sample_count,
            SCENE_DEPTH_FORMAT,
            TextureUsage::RENDER_ATTACHMENT,
        )?;

        let readback_layout = ReadbackLayout::new(extent, limits.copy_bytes_per_row_alignment);
        let readback = (0..config.readback_slots.max(1))
            .map(|i| {
                device.create_buffer(&BufferDescriptor {
                    label: Some(Cow::Owned(format!("Scene Readback {i}"))),
                    size: readback_layout.buffer_size(),
                    usage: BufferUsage::MAP_READ | BufferUsage::COPY_DST,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        log::info!(
            "Scene lane ready on '{}': {}x{}, {}x MSAA, {} readback slots",
            device.adapter_name(),
            extent.width,
            extent.height,
            config.sample_count,
            readback.len()
        );

        Ok(Self {
            planner: BatchPlanner::new(config.max_instances_per_draw),
            config,
            shader,
            bind_group_layout,
            pipeline,
            bind_group,
            msaa,
            resolve,
            depth,
            readback,
            readback_layout,
            meshes: HashMap::new(),
        })
    }

    /// The lane configuration.
    pub fn config(&self) -> &SceneLaneConfig {
        &self.config
    }

    /// The row layout of read back frames.
    pub fn readback_layout(&self) -> ReadbackLayout {
        self.readback_layout
    }

    /// Uploads missing geometry, then writes and commits the frame's constants into
    /// the ring range of `slot`.
    ///
    /// `slot` must not be held by another frame in flight. On a planning error the
    /// frame is aborted and nothing is written to the device.
    pub fn prepare(
        &mut self,
        device: &dyn GraphicsDevice,
        snapshot: &SceneSnapshot,
        constants: &mut FrameConstantBuffer,
        slot: usize,
    ) -> Result<PreparedFrame, LaneError> {
        self.upload_meshes(device, snapshot)?;

        constants.begin_frame(slot);
        let (frame_offset, light_offset, plan) = match self.write_constants(snapshot, constants) {
            Ok(written) => written,
            Err(e) => {
                constants.abort_frame();
                return Err(e.into());
            }
        };
        let constant_range = constants.commit(device)?;
        log::trace!(
            "Frame constants {:?}: {} draws",
            constant_range,
            plan.draws.len()
        );

        Ok(PreparedFrame {
            frame_offset,
            light_offset,
            plan,
            constant_range,
            slot,
        })
    }

    fn write_constants(
        &self,
        snapshot: &SceneSnapshot,
        constants: &mut FrameConstantBuffer,
    ) -> Result<(u32, u32, FramePlan), PlanError> {
        if snapshot.lights.len() > self.config.max_lights as usize {
            return Err(PlanError::TooManyLights {
                count: snapshot.lights.len(),
                max: self.config.max_lights as usize,
            });
        }
        let frame_offset = constants.push(&snapshot.frame_constants())?;
        // With no lights the window is never read; any bindable offset will do.
        let light_offset = if snapshot.lights.is_empty() {
            frame_offset
        } else {
            constants.push_slice(&snapshot.lights)?
        };
        let plan = self.planner.plan(snapshot, constants)?;
        Ok((frame_offset, light_offset, plan))
    }

    fn upload_meshes(
        &mut self,
        device: &dyn GraphicsDevice,
        snapshot: &SceneSnapshot,
    ) -> Result<(), ResourceError> {
        for node in &snapshot.nodes {
            let mesh = &node.mesh;
            if self.meshes.contains_key(&mesh.id()) {
                continue;
            }
            let vertex_buffer = device.create_buffer_with_data(
                &BufferDescriptor {
                    label: Some(Cow::Owned(format!("{} Vertices", mesh.name()))),
                    size: std::mem::size_of_val(mesh.vertices()) as u64,
                    usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
                },
                bytemuck::cast_slice(mesh.vertices()),
            )?;
            let index_buffer = device.create_buffer_with_data(
                &BufferDescriptor {
                    label: Some(Cow::Owned(format!("{} Indices", mesh.name()))),
                    size: std::mem::size_of_val(mesh.indices()) as u64,
                    usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
                },
                bytemuck::cast_slice(mesh.indices()),
            )?;
            log::debug!("Uploaded mesh '{}' ({:?})", mesh.name(), mesh.id());
            self.meshes.insert(
                mesh.id(),
                GpuMesh {
                    vertex_buffer,
                    index_buffer,
                },
            );
        }
        Ok(())
    }

    /// Records the scene pass and the readback copy of a prepared frame.
    ///
    /// The copy lands in the readback buffer of the frame's slot (modulo the buffer
    /// count), so frames holding distinct slots never share one.
    pub fn encode(
        &mut self,
        device: &dyn GraphicsDevice,
        prepared: &PreparedFrame,
    ) -> (CommandBufferId, ReadbackRequest) {
        let readback = self.readback[prepared.slot % self.readback.len()];

        let mut encoder = device.create_command_encoder(Some("Scene Frame"));
        {
            let (view, resolve_target, store) = match &self.msaa {
                Some(msaa) => (&msaa.view, Some(&self.resolve.view), StoreOp::Discard),
                None => (&self.resolve.view, None, StoreOp::Store),
            };
            let color_attachments = [RenderPassColorAttachment {
                view,
                resolve_target,
                ops: Operations {
                    load: LoadOp::Clear(self.config.clear_color),
                    store,
                },
            }];
            let descriptor = RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Operations {
                        load: LoadOp::Clear(1.0),
                        store: StoreOp::Discard,
                    },
                }),
            };

            let mut pass = encoder.begin_render_pass(&descriptor);
            pass.set_pipeline(&self.pipeline);
            for draw in &prepared.plan.draws {
                let Some(gpu_mesh) = self.meshes.get(&draw.mesh.id()) else {
                    log::warn!("Mesh '{}' was not uploaded; draw skipped", draw.mesh.name());
                    continue;
                };
                pass.set_bind_group(
                    0,
                    &self.bind_group,
                    &[
                        prepared.frame_offset,
                        prepared.light_offset,
                        draw.node_offset,
                        draw.material_offset,
                    ],
                );
                pass.set_vertex_buffer(0, &gpu_mesh.vertex_buffer, 0);
                pass.set_index_buffer(&gpu_mesh.index_buffer, 0, IndexFormat::Uint32);
                pass.draw_indexed(draw.index_range(), 0, 0..draw.instance_count);
            }
        }

        encoder.copy_texture_to_buffer(&TextureToBufferCopy {
            texture: self.resolve.texture,
            buffer: readback,
            buffer_offset: 0,
            bytes_per_row: self.readback_layout.padded_bytes_per_row,
            extent: self.config.extent,
        });

        let command_buffer = encoder.finish();
        (
            command_buffer,
            ReadbackRequest {
                buffer: readback,
                offset: 0,
                size: self.readback_layout.buffer_size(),
            },
        )
    }

    /// Releases every device resource of the lane. The device must be idle.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for (_, mesh) in self.meshes.drain() {
            warn_on_error("vertex buffer", device.destroy_buffer(mesh.vertex_buffer));
            warn_on_error("index buffer", device.destroy_buffer(mesh.index_buffer));
        }
        for buffer in self.readback.drain(..) {
            warn_on_error("readback buffer", device.destroy_buffer(buffer));
        }
        if let Some(msaa) = self.msaa.take() {
            msaa.destroy(device);
        }
        self.resolve.destroy(device);
        self.depth.destroy(device);
        warn_on_error("bind group", device.destroy_bind_group(self.bind_group));
        warn_on_error("pipeline", device.destroy_render_pipeline(self.pipeline));
        warn_on_error(
            "bind group layout",
            device.destroy_bind_group_layout(self.bind_group_layout),
        );
        warn_on_error("shader", device.destroy_shader_module(self.shader));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readback_layout_pads_rows() {
        let layout = ReadbackLayout::new(Extent2D::new(10, 3), 256);
        assert_eq!(layout.unpadded_bytes_per_row, 40);
        assert_eq!(layout.padded_bytes_per_row, 256);
        assert_eq!(layout.buffer_size(), 768);
    }

    #[test]
    fn test_readback_copy_strips_padding() {
        let layout = ReadbackLayout::new(Extent2D::new(1, 2), 8);
        let bytes = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0];
        let mut image = FrameImage::new(Extent2D::new(1, 2), vec![0; 8]).unwrap();
        layout.copy_to(&bytes, &mut image).unwrap();
        assert_eq!(image.pixels(), &[1, 2, 3, 4, 5, 6, 7, 8]);

        assert!(layout.copy_to(&bytes[..10], &mut image).is_err());
    }

    #[test]
    fn test_binding_slack_covers_the_largest_window() {
        let config = SceneLaneConfig {
            extent: Extent2D::new(4, 4),
            sample_count: 4,
            max_instances_per_draw: 64,
            max_lights: 8,
            clear_color: LinearRgba::BLACK,
            readback_slots: 3,
        };
        assert_eq!(config.binding_windows(), [160, 384, 8192, 48]);
        assert_eq!(config.binding_slack(), 8192);
    }
}
