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
use anyhow::anyhow;
use anyhow::Result;
use std::sync::{Arc, Mutex};

/// Holds the core WGPU state objects of an offscreen device.
///
/// There is no surface: every frame is rendered into textures owned by the device and
/// read back through mappable buffers.
#[derive(Debug)]
pub struct HeadlessContext {
    /// The selected adapter.
    pub adapter: wgpu::Adapter,
    /// The logical device.
    pub device: wgpu::Device,
    /// Its command queue.
    pub queue: wgpu::Queue,

    /// Name of the adapter, as reported by the driver.
    pub adapter_name: String,
    /// Backend API the adapter runs on.
    pub adapter_backend: wgpu::Backend,
    /// Limits of the opened device.
    pub device_limits: wgpu::Limits,
    /// Largest supported sample count of an `Rgba8Unorm` target, 4 or 1.
    pub max_sample_count: u32,

    /// The last validation error reported by the device and not yet claimed by a submission.
    pub(crate) last_error: Arc<Mutex<Option<String>>>,
}

impl HeadlessContext {
    /// Creates an instance, selects an adapter and opens a device on it.
    ///
    /// ## Errors
    /// Fails if no adapter is available (for instance on a machine without any GPU or
    /// software Vulkan driver) or if the device cannot be opened.
    pub async fn new(power_preference: wgpu::PowerPreference) -> Result<Self> {
        log::info!("Initializing headless WGPU context ({power_preference:?})...");
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| anyhow!("Failed to find a graphics adapter: {}", e))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Using graphics adapter: \"{}\" (Backend: {:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Kinema Headless Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow!("Failed to create logical device: {}", e))?;
        log::info!("Logical device and command queue created.");

        let last_error = Arc::new(Mutex::new(None));
        let sink = last_error.clone();
        device.on_uncaptured_error(Arc::new(move |e: wgpu::Error| {
            log::error!("WGPU Uncaptured Error: {e}");
            if let Ok(mut slot) = sink.lock() {
                slot.get_or_insert_with(|| e.to_string());
            }
        }));

        let msaa_flags = adapter
            .get_texture_format_features(wgpu::TextureFormat::Rgba8Unorm)
            .flags;
        let max_sample_count = if msaa_flags.sample_count_supported(4) {
            4
        } else {
            1
        };

        let device_limits = device.limits();
        log::debug!("Device limits: {device_limits:?}");

        Ok(Self {
            adapter,
            device,
            queue,
            adapter_name: adapter_info.name,
            adapter_backend: adapter_info.backend,
            device_limits,
            max_sample_count,
            last_error,
        })
    }

    /// Takes the pending validation error, if any.
    pub(crate) fn take_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|mut slot| slot.take())
    }
}
