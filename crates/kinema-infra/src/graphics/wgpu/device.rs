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
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use kinema_core::renderer::{
    BindGroupDescriptor, BindGroupId, BindGroupLayoutDescriptor, BindGroupLayoutId,
    BufferDescriptor, BufferId, CommandBufferId, CommandEncoder,
    CompletionCallback, DeviceLimits, GraphicsDevice, PipelineError, ReadbackRequest,
    RenderError, RenderPipelineDescriptor, RenderPipelineId, ResourceError, ShaderError,
    ShaderModuleDescriptor, ShaderModuleId, ShaderSourceData, TextureDescriptor, TextureId,
    TextureViewId,
};

use super::command::WgpuCommandEncoder;
use super::context::HeadlessContext;
use super::conversions::{from_wgpu_limits, IntoWgpu};
use super::poller::{InFlight, MappedReadback, Poller};

#[derive(Debug)]
struct PendingCommandBuffer {
    buffer: wgpu::CommandBuffer,
    /// Why the buffer must not execute, if recording failed.
    error: Option<String>,
}

#[derive(Debug, Default)]
struct Tables {
    shader_modules: HashMap<ShaderModuleId, Arc<wgpu::ShaderModule>>,
    bind_group_layouts: HashMap<BindGroupLayoutId, Arc<wgpu::BindGroupLayout>>,
    pipelines: HashMap<RenderPipelineId, Arc<wgpu::RenderPipeline>>,
    buffers: HashMap<BufferId, Arc<wgpu::Buffer>>,
    textures: HashMap<TextureId, Arc<wgpu::Texture>>,
    texture_views: HashMap<TextureViewId, Arc<wgpu::TextureView>>,
    bind_groups: HashMap<BindGroupId, Arc<wgpu::BindGroup>>,
    pending_command_buffers: HashMap<CommandBufferId, PendingCommandBuffer>,
}

/// The internal, non-clonable state of the WgpuDevice.
#[derive(Debug)]
struct WgpuDeviceInternal {
    context: Arc<HeadlessContext>,
    tables: Mutex<Tables>,
    limits: DeviceLimits,
    next_id: AtomicUsize,
    command_buffer_id_counter: AtomicU64,
    submission_counter: AtomicU64,
    poller: Poller,
}

/// A clonable, thread-safe handle to an offscreen WGPU device.
///
/// Completion callbacks run on a dedicated poller thread, so several frames can be in
/// flight on the GPU while the caller keeps encoding.
#[derive(Clone, Debug)]
pub struct WgpuDevice {
    internal: Arc<WgpuDeviceInternal>,
}

impl WgpuDevice {
    /// Opens the default adapter without a surface.
    ///
    /// `poll_interval` is how often the poller checks outstanding submissions.
    pub fn headless(
        power_preference: wgpu::PowerPreference,
        poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        let context = pollster::block_on(HeadlessContext::new(power_preference))?;
        Ok(Self::new(context, poll_interval)?)
    }

    /// Wraps an initialized context and starts its poller thread.
    pub fn new(context: HeadlessContext, poll_interval: Duration) -> std::io::Result<Self> {
        let limits = from_wgpu_limits(&context.device_limits, context.max_sample_count);
        let context = Arc::new(context);
        let poller = Poller::spawn(context.clone(), poll_interval)?;
        Ok(Self {
            internal: Arc::new(WgpuDeviceInternal {
                context,
                tables: Mutex::new(Tables::default()),
                limits,
                next_id: AtomicUsize::new(1),
                command_buffer_id_counter: AtomicU64::new(1),
                submission_counter: AtomicU64::new(0),
                poller,
            }),
        })
    }

    fn next_id(&self) -> usize {
        self.internal.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn wgpu_device(&self) -> &wgpu::Device {
        &self.internal.context.device
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, ResourceError> {
        self.internal
            .tables
            .lock()
            .map_err(|e| ResourceError::BackendError(format!("Mutex poisoned (tables): {e}")))
    }

    /// Fails with the validation error wgpu reported for the last call, if any.
    fn check_validation(&self) -> Result<(), String> {
        match self.internal.context.take_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Retrieves a reference-counted pointer to the internal WGPU render pipeline.
    /// Returns `None` if the ID is invalid.
    pub fn get_wgpu_render_pipeline(
        &self,
        id: RenderPipelineId,
    ) -> Option<Arc<wgpu::RenderPipeline>> {
        self.tables().ok()?.pipelines.get(&id).cloned()
    }

    /// Retrieves a reference-counted pointer to the internal WGPU buffer.
    pub fn get_wgpu_buffer(&self, id: BufferId) -> Option<Arc<wgpu::Buffer>> {
        self.tables().ok()?.buffers.get(&id).cloned()
    }

    /// Retrieves a reference-counted pointer to the internal WGPU texture.
    pub fn get_wgpu_texture(&self, id: TextureId) -> Option<Arc<wgpu::Texture>> {
        self.tables().ok()?.textures.get(&id).cloned()
    }

    /// Retrieves a reference-counted pointer to the internal WGPU texture view.
    pub fn get_wgpu_texture_view(&self, id: &TextureViewId) -> Option<Arc<wgpu::TextureView>> {
        self.tables().ok()?.texture_views.get(id).cloned()
    }

    /// Retrieves a reference-counted pointer to the internal WGPU bind group.
    pub fn get_wgpu_bind_group(&self, id: BindGroupId) -> Option<Arc<wgpu::BindGroup>> {
        self.tables().ok()?.bind_groups.get(&id).cloned()
    }

    /// Number of submissions whose completion callback has not run yet.
    pub fn in_flight(&self) -> u64 {
        self.internal.poller.in_flight()
    }

    /// (crate-internal) Registers a finished wgpu::CommandBuffer, storing it
    /// in a map and returning an abstract ID for it.
    pub(crate) fn register_command_buffer(
        &self,
        buffer: wgpu::CommandBuffer,
        errors: Vec<String>,
    ) -> CommandBufferId {
        let id = CommandBufferId(
            self.internal
                .command_buffer_id_counter
                .fetch_add(1, Ordering::SeqCst),
        );
        let mut error = (!errors.is_empty()).then(|| errors.join("; "));
        if let Err(validation) = self.check_validation() {
            error.get_or_insert(validation);
        }
        match self.tables() {
            Ok(mut tables) => {
                tables
                    .pending_command_buffers
                    .insert(id, PendingCommandBuffer { buffer, error });
            }
            Err(e) => log::error!("Dropping command buffer {id:?}: {e}"),
        }
        id
    }

    fn readback_target(
        &self,
        request: ReadbackRequest,
    ) -> Result<MappedReadback, RenderError> {
        let buffer = self.get_wgpu_buffer(request.buffer).ok_or_else(|| {
            RenderError::ReadbackFailed(format!("readback buffer {:?} not found", request.buffer))
        })?;
        if !buffer.usage().contains(wgpu::BufferUsages::MAP_READ) {
            return Err(RenderError::ReadbackFailed(format!(
                "buffer {:?} is not mappable for reading",
                request.buffer
            )));
        }
        if request.offset + request.size > buffer.size() {
            return Err(RenderError::ReadbackFailed(format!(
                "range {}+{} exceeds buffer {:?}",
                request.offset, request.size, request.buffer
            )));
        }
        Ok(MappedReadback {
            buffer,
            offset: request.offset,
            size: request.size,
        })
    }
}

impl GraphicsDevice for WgpuDevice {
    fn limits(&self) -> DeviceLimits {
        self.internal.limits
    }

    fn adapter_name(&self) -> String {
        format!(
            "{} ({:?})",
            self.internal.context.adapter_name, self.internal.context.adapter_backend
        )
    }

    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        let ShaderSourceData::Wgsl(source) = &descriptor.source;
        let module = self
            .wgpu_device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: descriptor.label,
                source: wgpu::ShaderSource::Wgsl(source.clone()),
            });
        self.check_validation().map_err(|details| ShaderError::CompilationError {
            label: descriptor.label.unwrap_or("Unnamed").to_string(),
            details,
        })?;

        let id = ShaderModuleId(self.next_id());
        self.tables()?.shader_modules.insert(id, Arc::new(module));
        log::debug!("WgpuDevice: created shader module {:?} ({id:?})", descriptor.label);
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        self.tables()?
            .shader_modules
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ShaderError::NotFound { id }.into())
    }

    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = descriptor
            .entries
            .iter()
            .map(|entry| wgpu::BindGroupLayoutEntry {
                binding: entry.binding,
                visibility: entry.visibility.into_wgpu(),
                ty: wgpu::BindingType::Buffer {
                    ty: entry.ty.into_wgpu(),
                    has_dynamic_offset: entry.has_dynamic_offset,
                    min_binding_size: entry.min_binding_size.and_then(NonZeroU64::new),
                },
                count: None,
            })
            .collect();
        let layout = self
            .wgpu_device()
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: descriptor.label,
                entries: &entries,
            });
        self.check_validation().map_err(ResourceError::BackendError)?;

        let id = BindGroupLayoutId(self.next_id());
        self.tables()?.bind_group_layouts.insert(id, Arc::new(layout));
        Ok(id)
    }

    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) -> Result<(), ResourceError> {
        self.tables()?
            .bind_group_layouts
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        log::debug!(
            "WgpuDevice: Creating render pipeline with label: {:?}",
            descriptor.label
        );
        if !matches!(descriptor.sample_count, 1 | 4)
            || descriptor.sample_count > self.internal.limits.max_sample_count
        {
            return Err(PipelineError::UnsupportedSampleCount(descriptor.sample_count).into());
        }

        let (module, layouts) = {
            let tables = self.tables()?;
            let module = tables
                .shader_modules
                .get(&descriptor.shader_module)
                .cloned()
                .ok_or_else(|| PipelineError::InvalidShaderModuleForPipeline {
                    id: descriptor.shader_module,
                    pipeline_label: descriptor.label.as_deref().map(String::from),
                })?;
            let layouts = descriptor
                .bind_group_layouts
                .iter()
                .map(|id| tables.bind_group_layouts.get(id).cloned())
                .collect::<Option<Vec<_>>>()
                .ok_or(ResourceError::NotFound)?;
            (module, layouts)
        };

        let layout_refs: Vec<Option<&wgpu::BindGroupLayout>> =
            layouts.iter().map(|l| Some(l.as_ref())).collect();
        let pipeline_layout = self
            .wgpu_device()
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: descriptor.label.as_deref(),
                bind_group_layouts: &layout_refs,
                immediate_size: 0,
            });

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = descriptor
            .vertex_buffers
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|attr| wgpu::VertexAttribute {
                        format: attr.format.into_wgpu(),
                        offset: attr.offset,
                        shader_location: attr.shader_location,
                    })
                    .collect()
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = descriptor
            .vertex_buffers
            .iter()
            .zip(attributes.iter())
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: layout.step_mode.into_wgpu(),
                attributes,
            })
            .collect();

        let pipeline = self
            .wgpu_device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: descriptor.label.as_deref(),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some(&descriptor.vertex_entry_point),
                    buffers: &vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(&descriptor.fragment_entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: descriptor.color_format.into_wgpu(),
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: descriptor.cull_mode.map(IntoWgpu::into_wgpu),
                    ..Default::default()
                },
                depth_stencil: descriptor.depth.map(|depth| wgpu::DepthStencilState {
                    format: depth.format.into_wgpu(),
                    depth_write_enabled: Some(depth.write_enabled),
                    depth_compare: Some(depth.compare.into_wgpu()),
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: descriptor.sample_count,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview_mask: None,
                cache: None,
            });
        self.check_validation()
            .map_err(|details| PipelineError::CompilationFailed {
                label: descriptor.label.as_deref().map(String::from),
                details,
            })?;

        let id = RenderPipelineId(self.next_id());
        self.tables()?.pipelines.insert(id, Arc::new(pipeline));
        log::info!(
            "WgpuDevice: created render pipeline {:?} ({id:?})",
            descriptor.label
        );
        Ok(id)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        self.tables()?
            .pipelines
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PipelineError::InvalidRenderPipeline { id }.into())
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let buffer = self.wgpu_device().create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size: descriptor.size,
            usage: descriptor.usage.into_wgpu(),
            mapped_at_creation: false,
        });
        let id = BufferId(self.next_id());
        self.tables()?.buffers.insert(id, Arc::new(buffer));
        log::trace!(
            "WgpuDevice: created buffer {:?} ({id:?}, {} bytes)",
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
        // Buffers mapped at creation must have a size aligned to COPY_BUFFER_ALIGNMENT.
        let size = descriptor.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.wgpu_device().create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size,
            usage: descriptor.usage.into_wgpu(),
            mapped_at_creation: true,
        });
        buffer
            .slice(..)
            .get_mapped_range_mut()
            .slice(..data.len())
            .copy_from_slice(data);
        buffer.unmap();

        let id = BufferId(self.next_id());
        self.tables()?.buffers.insert(id, Arc::new(buffer));
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        self.tables()?
            .buffers
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let buffer = self.get_wgpu_buffer(id).ok_or(ResourceError::NotFound)?;
        if offset + data.len() as u64 > buffer.size() {
            return Err(ResourceError::OutOfBounds);
        }
        self.internal.context.queue.write_buffer(&buffer, offset, data);
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        if descriptor.sample_count > self.internal.limits.max_sample_count {
            return Err(PipelineError::UnsupportedSampleCount(descriptor.sample_count).into());
        }
        let texture = self.wgpu_device().create_texture(&wgpu::TextureDescriptor {
            label: descriptor.label.as_deref(),
            size: descriptor.size.into_wgpu(),
            mip_level_count: 1,
            sample_count: descriptor.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: descriptor.format.into_wgpu(),
            usage: descriptor.usage.into_wgpu(),
            view_formats: &[],
        });
        self.check_validation().map_err(ResourceError::BackendError)?;

        let id = TextureId(self.next_id());
        self.tables()?.textures.insert(id, Arc::new(texture));
        log::debug!(
            "WgpuDevice: created texture {:?} ({id:?}, {} bytes)",
            descriptor.label,
            descriptor.size_in_bytes()
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        self.tables()?
            .textures
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_texture_view(&self, texture_id: TextureId) -> Result<TextureViewId, ResourceError> {
        let texture = self
            .get_wgpu_texture(texture_id)
            .ok_or(ResourceError::NotFound)?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureViewId(self.next_id());
        self.tables()?.texture_views.insert(id, Arc::new(view));
        Ok(id)
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        self.tables()?
            .texture_views
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        let (layout, buffers) = {
            let tables = self.tables()?;
            let layout = tables
                .bind_group_layouts
                .get(&descriptor.layout)
                .cloned()
                .ok_or(ResourceError::NotFound)?;
            let buffers = descriptor
                .entries
                .iter()
                .map(|entry| tables.buffers.get(&entry.buffer).cloned())
                .collect::<Option<Vec<_>>>()
                .ok_or(ResourceError::NotFound)?;
            (layout, buffers)
        };

        let entries: Vec<wgpu::BindGroupEntry> = descriptor
            .entries
            .iter()
            .zip(buffers.iter())
            .map(|(entry, buffer)| wgpu::BindGroupEntry {
                binding: entry.binding,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: entry.offset,
                    size: entry.size.and_then(NonZeroU64::new),
                }),
            })
            .collect();
        let bind_group = self
            .wgpu_device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: descriptor.label,
                layout: &layout,
                entries: &entries,
            });
        self.check_validation().map_err(ResourceError::BackendError)?;

        let id = BindGroupId(self.next_id());
        self.tables()?.bind_groups.insert(id, Arc::new(bind_group));
        Ok(id)
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError> {
        self.tables()?
            .bind_groups
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder> {
        let encoder = self
            .wgpu_device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label });
        Box::new(WgpuCommandEncoder {
            encoder,
            device: self.clone(),
            errors: Vec::new(),
        })
    }

    fn submit(
        &self,
        command_buffer: CommandBufferId,
        readback: Option<ReadbackRequest>,
        on_complete: CompletionCallback,
    ) -> Result<(), RenderError> {
        let pending = self
            .tables()
            .map_err(RenderError::ResourceError)?
            .pending_command_buffers
            .remove(&command_buffer)
            .ok_or_else(|| {
                RenderError::SubmissionFailed(format!(
                    "command buffer {command_buffer:?} was never recorded or already submitted"
                ))
            })?;
        let readback = readback.map(|r| self.readback_target(r)).transpose()?;

        let submission = self.internal.submission_counter.fetch_add(1, Ordering::Relaxed);
        let (status_tx, status) = flume::bounded(1);
        let context = &self.internal.context;
        let error = match pending.error {
            Some(e) => Some(e),
            None => {
                context.queue.submit(std::iter::once(pending.buffer));
                self.check_validation().err()
            }
        };

        let readback = match (error, readback) {
            (Some(e), _) => {
                let _ = status_tx.send(Err(e));
                None
            }
            (None, Some(target)) => {
                let end = target.offset + target.size;
                target
                    .buffer
                    .slice(target.offset..end)
                    .map_async(wgpu::MapMode::Read, move |result| {
                        let _ = status_tx.send(result.map_err(|e| e.to_string()));
                    });
                Some(target)
            }
            (None, None) => {
                context.queue.on_submitted_work_done(move || {
                    let _ = status_tx.send(Ok(()));
                });
                None
            }
        };

        log::trace!("WgpuDevice: submitted {command_buffer:?} as submission {submission}");
        self.internal.poller.track(InFlight {
            submission,
            status,
            readback,
            on_complete,
        });
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), RenderError> {
        self.internal.poller.wait_idle();
        Ok(())
    }
}
