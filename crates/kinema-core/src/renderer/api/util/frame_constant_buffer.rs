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

//! GPU-backed wrapper around the [`FrameConstantAllocator`].
//!
//! Constants pushed during a frame are staged in CPU memory. Nothing reaches the
//! device until [`commit`](FrameConstantBuffer::commit) uploads the whole frame with
//! a single `write_buffer`, so a frame that blows its budget leaves the GPU buffer
//! untouched.
//!
//! ```text
//! physical buffer: [ ring capacity ................................ | binding slack ]
//!                    ^ offsets handed out always fall in here          ^ lets a fixed-size
//!                                                                        binding window start
//!                                                                        at any ring offset
//! ```

use crate::renderer::api::buffer::{BufferDescriptor, BufferId, BufferUsage};
use crate::renderer::api::scene_constants::CONSTANT_NATURAL_ALIGNMENT;
use crate::renderer::api::util::frame_constant_allocator::{FrameConstantAllocator, FrameRange};
use crate::renderer::error::{CapacityError, ResourceError};
use crate::renderer::traits::GraphicsDevice;
use bytemuck::Pod;
use std::borrow::Cow;

/// A shared, fixed-capacity constant buffer handing out per-frame ranges.
#[derive(Debug)]
pub struct FrameConstantBuffer {
    buffer: BufferId,
    allocator: FrameConstantAllocator,
    staging: Vec<u8>,
    staging_base: u64,
    peak_frame_bytes: u64,
}

impl FrameConstantBuffer {
    /// Creates the GPU buffer and its allocator.
    ///
    /// * `capacity` - bytes available to the ring.
    /// * `frames_in_flight` - number of frames sharing it.
    /// * `binding_slack` - the largest binding window that will be bound at a ring offset.
    ///
    /// # Errors
    /// `ResourceError::OutOfBounds` if the capacity cannot be addressed with 32-bit
    /// dynamic offsets or holds less than one block per frame, and any error of the
    /// device's buffer creation.
    pub fn new(
        device: &dyn GraphicsDevice,
        capacity: u64,
        frames_in_flight: usize,
        binding_slack: u64,
        label: &str,
    ) -> Result<Self, ResourceError> {
        if capacity > u32::MAX as u64 {
            return Err(ResourceError::OutOfBounds);
        }
        let alignment = device.limits().constant_offset_alignment();
        let allocator =
            FrameConstantAllocator::new(capacity, frames_in_flight, alignment).map_err(|e| {
                log::error!("FrameConstantBuffer '{label}': {e}");
                ResourceError::OutOfBounds
            })?;

        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Owned(format!("{label} Frame Constants"))),
            size: capacity + binding_slack,
            usage: BufferUsage::UNIFORM | BufferUsage::STORAGE | BufferUsage::COPY_DST,
        })?;

        log::info!(
            "FrameConstantBuffer '{}': {} bytes, {} frames in flight, {} bytes per frame",
            label,
            capacity,
            frames_in_flight,
            allocator.budget()
        );

        Ok(Self {
            buffer,
            allocator,
            staging: Vec::new(),
            staging_base: 0,
            peak_frame_bytes: 0,
        })
    }

    /// The underlying GPU buffer, for bind group creation.
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// The allocator state.
    pub fn allocator(&self) -> &FrameConstantAllocator {
        &self.allocator
    }

    /// The largest number of bytes a committed frame used.
    pub fn peak_frame_bytes(&self) -> u64 {
        self.peak_frame_bytes
    }

    /// Opens a new frame in `slot`, which no other in-flight frame may hold.
    pub fn begin_frame(&mut self, slot: usize) {
        self.staging_base = self.allocator.begin_frame(slot);
        self.staging.clear();
    }

    /// Stages raw bytes and returns their offset in the buffer.
    ///
    /// # Errors
    /// A [`CapacityError`] if the frame would exceed its budget.
    pub fn push_bytes(&mut self, bytes: &[u8], natural_alignment: u64) -> Result<u32, CapacityError> {
        let offset = self.allocator.allocate(bytes.len() as u64, natural_alignment)?;
        let local = (offset - self.staging_base) as usize;
        let end = local + bytes.len();
        if self.staging.len() < end {
            self.staging.resize(end, 0);
        }
        self.staging[local..end].copy_from_slice(bytes);
        // The capacity is checked to fit in u32 at construction.
        Ok(offset as u32)
    }

    /// Stages one constant struct and returns its offset.
    pub fn push<T: Pod>(&mut self, value: &T) -> Result<u32, CapacityError> {
        self.push_bytes(bytemuck::bytes_of(value), CONSTANT_NATURAL_ALIGNMENT)
    }

    /// Stages a contiguous array of constant structs and returns the offset of the first.
    pub fn push_slice<T: Pod>(&mut self, values: &[T]) -> Result<u32, CapacityError> {
        self.push_bytes(bytemuck::cast_slice(values), CONSTANT_NATURAL_ALIGNMENT)
    }

    /// Bytes staged by the open frame, padding included.
    pub fn frame_usage(&self) -> u64 {
        self.allocator.frame_usage()
    }

    /// Uploads the staged frame and closes it.
    ///
    /// # Errors
    /// Propagates the device's `write_buffer` error. The frame is closed either way.
    pub fn commit(&mut self, device: &dyn GraphicsDevice) -> Result<FrameRange, ResourceError> {
        let range = self.allocator.end_frame().unwrap_or(FrameRange {
            start: self.staging_base,
            end: self.staging_base,
        });
        self.peak_frame_bytes = self.peak_frame_bytes.max(range.len());
        if !self.staging.is_empty() {
            device.write_buffer(self.buffer, self.staging_base, &self.staging)?;
        }
        self.staging.clear();
        Ok(range)
    }

    /// Discards the staged frame and rolls the cursor back.
    pub fn abort_frame(&mut self) {
        self.allocator.abort_frame();
        self.staging.clear();
    }

    /// Releases the GPU buffer.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        if let Err(e) = device.destroy_buffer(self.buffer) {
            log::warn!("Failed to destroy frame constant buffer {:?}: {:?}", self.buffer, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::scene_constants::{FrameConstants, NodeConstants};
    use crate::renderer::api::util::mock_device::MockGraphicsDevice;

    #[test]
    fn buffer_is_sized_with_binding_slack() {
        let device = MockGraphicsDevice::new();
        let ring = FrameConstantBuffer::new(&device, 3 * 4096, 3, 1024, "Test").unwrap();
        assert_eq!(device.buffer_size(ring.buffer()), Some(3 * 4096 + 1024));
    }

    #[test]
    fn commit_uploads_one_contiguous_write() {
        let device = MockGraphicsDevice::new();
        let mut ring = FrameConstantBuffer::new(&device, 3 * 4096, 3, 0, "Test").unwrap();

        ring.begin_frame(0);
        let a = ring.push(&FrameConstants::new(
            crate::math::Mat4::IDENTITY,
            crate::math::Mat4::IDENTITY,
            crate::math::Vec3::ZERO,
            0,
        ))
        .unwrap();
        let b = ring
            .push_slice(&[NodeConstants::from_world(crate::math::Mat4::IDENTITY); 2])
            .unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 256);
        let range = ring.commit(&device).unwrap();
        assert_eq!(range, FrameRange { start: 0, end: 512 });

        let writes = device.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1, 0);
        assert_eq!(writes[0].2.len(), 512);
    }

    #[test]
    fn frames_upload_into_the_slot_they_were_opened_in() {
        let device = MockGraphicsDevice::new();
        let mut ring = FrameConstantBuffer::new(&device, 3 * 4096, 3, 0, "Test").unwrap();

        ring.begin_frame(2);
        let offset = ring.push_slice(&[1u8; 64]).unwrap();
        assert_eq!(offset, 2 * 4096);
        let range = ring.commit(&device).unwrap();
        assert_eq!(range, FrameRange { start: 2 * 4096, end: 2 * 4096 + 64 });
        assert_eq!(device.writes()[0].1, 2 * 4096);
    }

    #[test]
    fn capacity_error_leaves_the_gpu_buffer_untouched() {
        let device = MockGraphicsDevice::new();
        let mut ring = FrameConstantBuffer::new(&device, 3 * 512, 3, 0, "Test").unwrap();

        ring.begin_frame(0);
        ring.push_slice(&[0u8; 300]).unwrap();
        let err = ring.push_slice(&[0u8; 300]).unwrap_err();
        assert_eq!(err.budget, 512);
        ring.abort_frame();

        assert!(device.writes().is_empty());
        assert_eq!(ring.allocator().cursor(), 0);
    }

    #[test]
    fn capacity_beyond_u32_offsets_is_rejected() {
        let device = MockGraphicsDevice::new();
        let err = FrameConstantBuffer::new(&device, u32::MAX as u64 + 1, 3, 0, "Huge");
        assert!(matches!(err, Err(ResourceError::OutOfBounds)));
    }
}
