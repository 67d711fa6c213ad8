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

use super::command::{Command, SoftwareCommandEncoder};
use super::completion::CompletionController;
use super::executor;
use kinema_core::math::Extent2D;
use kinema_core::renderer::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindGroupLayoutId, BufferDescriptor, BufferId, BufferUsage,
    CommandBufferId, CommandEncoder, CompareFunction, CompletedSubmission, CompletionCallback,
    DeviceLimits, Face, GraphicsDevice, PipelineError, ReadbackRequest, RenderError,
    RenderPipelineDescriptor, RenderPipelineId, ResourceError, ShaderError,
    ShaderModuleDescriptor, ShaderModuleId, ShaderSourceData, TextureDescriptor, TextureFormat,
    TextureId, TextureUsage, TextureViewId, VertexFormat,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
pub(crate) struct SoftBuffer {
    pub data: Vec<u8>,
    pub usage: BufferUsage,
}

#[derive(Debug)]
pub(crate) enum Texels {
    Color(Vec<[f32; 4]>),
    Depth(Vec<f32>),
}

#[derive(Debug)]
pub(crate) struct SoftTexture {
    pub extent: Extent2D,
    pub sample_count: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub texels: Texels,
}

#[derive(Debug, Clone)]
pub(crate) struct SoftPipeline {
    pub label: String,
    pub vertex_stride: u64,
    pub position_offset: u64,
    pub normal_offset: u64,
    pub color_format: TextureFormat,
    pub depth_compare: Option<CompareFunction>,
    pub depth_write: bool,
    pub cull_mode: Option<Face>,
    pub sample_count: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct SoftBindGroup {
    /// Layout entries paired with their resources, sorted by binding.
    pub entries: Vec<(BindGroupLayoutEntry, BindGroupEntry)>,
}

#[derive(Debug, Default)]
pub(crate) struct Resources {
    pub buffers: HashMap<BufferId, SoftBuffer>,
    pub textures: HashMap<TextureId, SoftTexture>,
    pub views: HashMap<TextureViewId, TextureId>,
    pub shaders: HashMap<ShaderModuleId, String>,
    pub layouts: HashMap<BindGroupLayoutId, Vec<BindGroupLayoutEntry>>,
    pub bind_groups: HashMap<BindGroupId, SoftBindGroup>,
    pub pipelines: HashMap<RenderPipelineId, SoftPipeline>,
    pub command_buffers: HashMap<CommandBufferId, Vec<Command>>,
}

struct SoftwareDeviceInner {
    limits: DeviceLimits,
    resources: Mutex<Resources>,
    next_id: AtomicUsize,
    next_command_buffer: AtomicU64,
    completions: CompletionController,
}

/// A CPU implementation of [`GraphicsDevice`] running the fixed scene program.
///
/// Command buffers execute synchronously inside [`submit`](GraphicsDevice::submit), so
/// later buffer writes never affect an already submitted frame. The completion
/// notification is handed to the [`CompletionController`], which decides when and on
/// which thread it runs.
#[derive(Clone)]
pub struct SoftwareDevice {
    inner: Arc<SoftwareDeviceInner>,
}

impl std::fmt::Debug for SoftwareDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareDevice")
            .field("limits", &self.inner.limits)
            .field("completions", &self.inner.completions)
            .finish()
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new(CompletionController::inline())
    }
}

impl SoftwareDevice {
    /// Name reported by [`GraphicsDevice::adapter_name`].
    pub const ADAPTER_NAME: &'static str = "Kinema Software Rasterizer";

    /// Creates a device with WebGPU default limits.
    pub fn new(completions: CompletionController) -> Self {
        Self::with_limits(DeviceLimits::default(), completions)
    }

    /// Creates a device reporting `limits`.
    pub fn with_limits(limits: DeviceLimits, completions: CompletionController) -> Self {
        log::info!(
            "Created software device ({}x MSAA max, completions {:?})",
            limits.max_sample_count,
            completions.mode()
        );
        Self {
            inner: Arc::new(SoftwareDeviceInner {
                limits,
                resources: Mutex::new(Resources::default()),
                next_id: AtomicUsize::new(1),
                next_command_buffer: AtomicU64::new(1),
                completions,
            }),
        }
    }

    /// The scheduler of this device's completion notifications.
    pub fn completions(&self) -> &CompletionController {
        &self.inner.completions
    }

    /// Number of live resources of every kind, excluding unsubmitted command buffers.
    pub fn live_resource_count(&self) -> usize {
        self.resources()
            .map(|r| {
                r.buffers.len()
                    + r.textures.len()
                    + r.views.len()
                    + r.shaders.len()
                    + r.layouts.len()
                    + r.bind_groups.len()
                    + r.pipelines.len()
            })
            .unwrap_or(0)
    }

    fn next(&self) -> usize {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn resources(&self) -> Result<MutexGuard<'_, Resources>, ResourceError> {
        self.inner.resources.lock().map_err(|e| {
            ResourceError::BackendError(format!("Mutex poisoned (software resources): {e}"))
        })
    }

    pub(crate) fn register_command_buffer(&self, commands: Vec<Command>) -> CommandBufferId {
        let id = CommandBufferId(self.inner.next_command_buffer.fetch_add(1, Ordering::Relaxed));
        match self.resources() {
            Ok(mut resources) => {
                resources.command_buffers.insert(id, commands);
            }
            Err(e) => log::error!("Dropping command buffer {id:?}: {e}"),
        }
        id
    }

    fn remove<K, V>(map: &mut HashMap<K, V>, id: K) -> Result<V, ResourceError>
    where
        K: std::hash::Hash + Eq,
    {
        map.remove(&id).ok_or(ResourceError::NotFound)
    }
}

fn is_valid_sample_count(count: u32, limits: &DeviceLimits) -> bool {
    matches!(count, 1 | 4) && count <= limits.max_sample_count
}

impl GraphicsDevice for SoftwareDevice {
    fn limits(&self) -> DeviceLimits {
        self.inner.limits
    }

    fn adapter_name(&self) -> String {
        Self::ADAPTER_NAME.to_string()
    }

    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        let ShaderSourceData::Wgsl(source) = &descriptor.source;
        let id = ShaderModuleId(self.next());
        self.resources()?.shaders.insert(id, source.to_string());
        log::debug!("SoftwareDevice: created shader module {:?} ({id:?})", descriptor.label);
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        self.resources()?
            .shaders
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ShaderError::NotFound { id }.into())
    }

    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        let mut entries = descriptor.entries.to_vec();
        entries.sort_by_key(|e| e.binding);
        let id = BindGroupLayoutId(self.next());
        self.resources()?.layouts.insert(id, entries);
        Ok(id)
    }

    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) -> Result<(), ResourceError> {
        Self::remove(&mut self.resources()?.layouts, id).map(|_| ())
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let label = descriptor.label.as_deref().unwrap_or("Unnamed").to_string();
        let compilation_failed = |details: String| {
            ResourceError::from(PipelineError::CompilationFailed {
                label: Some(label.clone()),
                details,
            })
        };

        if !is_valid_sample_count(descriptor.sample_count, &self.inner.limits) {
            return Err(PipelineError::UnsupportedSampleCount(descriptor.sample_count).into());
        }

        let resources = self.resources()?;
        let source = resources.shaders.get(&descriptor.shader_module).ok_or_else(|| {
            PipelineError::InvalidShaderModuleForPipeline {
                id: descriptor.shader_module,
                pipeline_label: Some(label.clone()),
            }
        })?;
        for entry_point in [&descriptor.vertex_entry_point, &descriptor.fragment_entry_point] {
            if !source.contains(&format!("fn {entry_point}(")) {
                return Err(compilation_failed(format!("entry point '{entry_point}' not found")));
            }
        }
        for layout in descriptor.bind_group_layouts.iter() {
            if !resources.layouts.contains_key(layout) {
                return Err(ResourceError::NotFound);
            }
        }

        let vertex_layout = descriptor
            .vertex_buffers
            .first()
            .ok_or_else(|| compilation_failed("no vertex buffer layout".into()))?;
        let attribute_offset = |location: u32| {
            vertex_layout
                .attributes
                .iter()
                .find(|a| a.shader_location == location && a.format == VertexFormat::Float32x3)
                .map(|a| a.offset)
                .ok_or_else(|| {
                    compilation_failed(format!("location {location} must be a Float32x3 attribute"))
                })
        };
        let pipeline = SoftPipeline {
            label: label.clone(),
            vertex_stride: vertex_layout.array_stride,
            position_offset: attribute_offset(0)?,
            normal_offset: attribute_offset(1)?,
            color_format: descriptor.color_format,
            depth_compare: descriptor.depth.map(|d| d.compare),
            depth_write: descriptor.depth.is_some_and(|d| d.write_enabled),
            cull_mode: descriptor.cull_mode,
            sample_count: descriptor.sample_count,
        };
        drop(resources);

        let id = RenderPipelineId(self.next());
        self.resources()?.pipelines.insert(id, pipeline);
        log::info!("SoftwareDevice: created render pipeline '{label}' ({id:?})");
        Ok(id)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        Self::remove(&mut self.resources()?.pipelines, id).map(|_| ())
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let id = BufferId(self.next());
        self.resources()?.buffers.insert(
            id,
            SoftBuffer {
                data: vec![0; descriptor.size as usize],
                usage: descriptor.usage,
            },
        );
        log::trace!(
            "SoftwareDevice: created buffer {:?} ({id:?}, {} bytes)",
            descriptor.label,
            descriptor.size
        );
        Ok(id)
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        if data.len() as u64 > descriptor.size {
            return Err(ResourceError::OutOfBounds);
        }
        let id = self.create_buffer(descriptor)?;
        self.write_buffer(id, 0, data)?;
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        Self::remove(&mut self.resources()?.buffers, id).map(|_| ())
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut resources = self.resources()?;
        let buffer = resources.buffers.get_mut(&id).ok_or(ResourceError::NotFound)?;
        let start = offset as usize;
        let end = start
            .checked_add(data.len())
            .filter(|&end| end <= buffer.data.len())
            .ok_or(ResourceError::OutOfBounds)?;
        buffer.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        if !is_valid_sample_count(descriptor.sample_count, &self.inner.limits) {
            return Err(PipelineError::UnsupportedSampleCount(descriptor.sample_count).into());
        }
        let texel_count = descriptor.size.area() as usize * descriptor.sample_count as usize;
        let texels = if descriptor.format.is_depth() {
            Texels::Depth(vec![1.0; texel_count])
        } else {
            Texels::Color(vec![[0.0; 4]; texel_count])
        };
        let id = TextureId(self.next());
        self.resources()?.textures.insert(
            id,
            SoftTexture {
                extent: descriptor.size,
                sample_count: descriptor.sample_count,
                format: descriptor.format,
                usage: descriptor.usage,
                texels,
            },
        );
        log::debug!(
            "SoftwareDevice: created texture {:?} ({id:?}, {}x{}, {} samples)",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.sample_count
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        Self::remove(&mut self.resources()?.textures, id).map(|_| ())
    }

    fn create_texture_view(&self, texture_id: TextureId) -> Result<TextureViewId, ResourceError> {
        let mut resources = self.resources()?;
        if !resources.textures.contains_key(&texture_id) {
            return Err(ResourceError::NotFound);
        }
        let id = TextureViewId(self.next());
        resources.views.insert(id, texture_id);
        Ok(id)
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        Self::remove(&mut self.resources()?.views, id).map(|_| ())
    }

    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        let mut resources = self.resources()?;
        let layout = resources
            .layouts
            .get(&descriptor.layout)
            .ok_or(ResourceError::NotFound)?;
        if layout.len() != descriptor.entries.len() {
            return Err(ResourceError::BackendError(format!(
                "bind group {:?} has {} entries, its layout {}",
                descriptor.label,
                descriptor.entries.len(),
                layout.len()
            )));
        }

        let mut entries = Vec::with_capacity(layout.len());
        for layout_entry in layout {
            let entry = descriptor
                .entries
                .iter()
                .find(|e| e.binding == layout_entry.binding)
                .ok_or(ResourceError::InvalidHandle)?;
            let buffer = resources
                .buffers
                .get(&entry.buffer)
                .ok_or(ResourceError::NotFound)?;
            let size = entry
                .size
                .unwrap_or((buffer.data.len() as u64).saturating_sub(entry.offset));
            if entry.offset + size > buffer.data.len() as u64 {
                return Err(ResourceError::OutOfBounds);
            }
            entries.push((*layout_entry, *entry));
        }

        let id = BindGroupId(self.next());
        resources.bind_groups.insert(id, SoftBindGroup { entries });
        Ok(id)
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError> {
        Self::remove(&mut self.resources()?.bind_groups, id).map(|_| ())
    }

    fn create_command_encoder(&self, _label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(SoftwareCommandEncoder {
            device: self.clone(),
            commands: Vec::new(),
        })
    }

    fn submit(
        &self,
        command_buffer: CommandBufferId,
        readback: Option<ReadbackRequest>,
        on_complete: CompletionCallback,
    ) -> Result<(), RenderError> {
        let result = {
            let mut resources = self.resources().map_err(RenderError::ResourceError)?;
            let commands = resources
                .command_buffers
                .remove(&command_buffer)
                .ok_or_else(|| {
                    RenderError::SubmissionFailed(format!(
                        "command buffer {command_buffer:?} was never recorded or already submitted"
                    ))
                })?;
            executor::execute(&mut resources, &self.inner.limits, commands).and_then(|()| {
                let readback = readback
                    .map(|request| executor::read_buffer(&resources, request))
                    .transpose()?;
                Ok(CompletedSubmission { readback })
            })
        };

        if let Err(e) = &result {
            log::error!("SoftwareDevice: submission {command_buffer:?} failed: {e}");
        }
        self.inner.completions.schedule(result, on_complete);
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), RenderError> {
        self.inner.completions.wait_idle();
        Ok(())
    }
}
