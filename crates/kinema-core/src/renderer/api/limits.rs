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

//! Device capabilities the pipeline must respect.

/// Hardware limits reported by a [`GraphicsDevice`](crate::renderer::GraphicsDevice).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Required alignment of dynamic offsets into uniform buffers.
    pub min_uniform_buffer_offset_alignment: u32,
    /// Required alignment of dynamic offsets into storage buffers.
    pub min_storage_buffer_offset_alignment: u32,
    /// Required alignment of `bytes_per_row` in texture-to-buffer copies.
    pub copy_bytes_per_row_alignment: u32,
    /// Largest storage buffer window that can be bound.
    pub max_storage_buffer_binding_size: u64,
    /// Largest supported multisample count for color targets.
    pub max_sample_count: u32,
}

impl DeviceLimits {
    /// The hardware minimum alignment for any per-frame constant range.
    ///
    /// Constants are bound as both uniform and storage buffers, so the stricter of
    /// the two alignments applies.
    pub fn constant_offset_alignment(&self) -> u64 {
        crate::math::lcm(
            self.min_uniform_buffer_offset_alignment as u64,
            self.min_storage_buffer_offset_alignment as u64,
        )
    }
}

impl Default for DeviceLimits {
    /// Mirrors the WebGPU default limits.
    fn default() -> Self {
        Self {
            min_uniform_buffer_offset_alignment: 256,
            min_storage_buffer_offset_alignment: 256,
            copy_bytes_per_row_alignment: 256,
            max_storage_buffer_binding_size: 128 << 20,
            max_sample_count: 4,
        }
    }
}
