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

//! Output images and the bounded pool they are drawn from.

use crate::math::Extent2D;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Bytes per pixel of every [`FrameImage`] (tightly packed RGBA8).
pub const FRAME_IMAGE_BYTES_PER_PIXEL: u32 = 4;

#[derive(Debug)]
struct PoolState {
    free: Vec<Vec<u8>>,
    outstanding: usize,
}

#[derive(Debug)]
struct PoolInner {
    extent: Extent2D,
    capacity: usize,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        // The state is two counters and a free list; it stays consistent across a panic.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A bounded pool of RGBA8 output images.
///
/// At most `capacity` images can be checked out at once. Dropping a pooled
/// [`FrameImage`] returns its pixel buffer for reuse. Cloning the pool yields another
/// handle to the same pool.
#[derive(Debug, Clone)]
pub struct ImagePool {
    inner: Arc<PoolInner>,
}

impl ImagePool {
    /// Creates a pool of images of the given extent.
    pub fn new(extent: Extent2D, capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                extent,
                capacity,
                state: Mutex::new(PoolState {
                    free: Vec::new(),
                    outstanding: 0,
                }),
            }),
        }
    }

    /// The extent of the pooled images.
    pub fn extent(&self) -> Extent2D {
        self.inner.extent
    }

    /// The maximum number of images checked out at once.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of images currently checked out.
    pub fn outstanding(&self) -> usize {
        self.inner.state().outstanding
    }

    /// Checks an image out of the pool, or returns `None` if the pool is exhausted.
    ///
    /// The returned image has the pool's extent; its contents are unspecified.
    pub fn try_acquire(&self) -> Option<FrameImage> {
        let mut state = self.inner.state();
        if state.outstanding >= self.inner.capacity {
            return None;
        }
        state.outstanding += 1;
        let len = self.inner.extent.area() as usize * FRAME_IMAGE_BYTES_PER_PIXEL as usize;
        let pixels = match state.free.pop() {
            Some(buffer) => buffer,
            None => vec![0; len],
        };
        drop(state);
        Some(FrameImage {
            extent: self.inner.extent,
            pixels,
            pool: Some(Arc::downgrade(&self.inner)),
        })
    }
}

/// A finished RGBA8 image, rows tightly packed, top row first.
pub struct FrameImage {
    extent: Extent2D,
    pixels: Vec<u8>,
    pool: Option<Weak<PoolInner>>,
}

impl FrameImage {
    /// Wraps a pixel buffer that does not belong to any pool.
    ///
    /// Returns `None` if the buffer length does not match the extent.
    pub fn new(extent: Extent2D, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() as u64 != extent.area() * FRAME_IMAGE_BYTES_PER_PIXEL as u64 {
            return None;
        }
        Some(Self {
            extent,
            pixels,
            pool: None,
        })
    }

    /// The image size.
    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Bytes per row.
    pub fn bytes_per_row(&self) -> usize {
        self.extent.width as usize * FRAME_IMAGE_BYTES_PER_PIXEL as usize
    }

    /// The pixel bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable access to the pixel bytes.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// The RGBA value of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.extent.width || y >= self.extent.height {
            return None;
        }
        let i = (y as usize * self.extent.width as usize + x as usize) * 4;
        let p = &self.pixels[i..i + 4];
        Some([p[0], p[1], p[2], p[3]])
    }

    /// Takes the pixel buffer out of the image. The pool slot is released but the
    /// buffer is not returned for reuse.
    pub fn detach(mut self) -> Vec<u8> {
        std::mem::take(&mut self.pixels)
    }
}

impl Drop for FrameImage {
    fn drop(&mut self) {
        let Some(pool) = self.pool.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        let mut state = pool.state();
        state.outstanding = state.outstanding.saturating_sub(1);
        let expected = pool.extent.area() as usize * FRAME_IMAGE_BYTES_PER_PIXEL as usize;
        if self.pixels.len() == expected {
            state.free.push(std::mem::take(&mut self.pixels));
        }
    }
}

impl fmt::Debug for FrameImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameImage")
            .field("extent", &self.extent)
            .field("bytes", &self.pixels.len())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_bounds_outstanding_images_and_recycles_buffers() {
        let pool = ImagePool::new(Extent2D::new(4, 2), 2);
        let mut a = pool.try_acquire().unwrap();
        let b = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.outstanding(), 2);

        a.pixels_mut()[0] = 42;
        let ptr = a.pixels().as_ptr();
        drop(a);
        assert_eq!(pool.outstanding(), 1);
        let c = pool.try_acquire().unwrap();
        assert_eq!(c.pixels().as_ptr(), ptr);
        assert_eq!(c.pixels().len(), 32);
        drop((b, c));
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn detached_buffers_free_the_slot() {
        let pool = ImagePool::new(Extent2D::new(1, 1), 1);
        let image = pool.try_acquire().unwrap();
        let bytes = image.detach();
        assert_eq!(bytes.len(), 4);
        assert_eq!(pool.outstanding(), 0);
        assert!(pool.try_acquire().is_some());
    }

    #[test]
    fn unpooled_image_checks_its_length() {
        assert!(FrameImage::new(Extent2D::new(2, 2), vec![0; 15]).is_none());
        let image = FrameImage::new(Extent2D::new(2, 2), vec![7; 16]).unwrap();
        assert_eq!(image.pixel(1, 1), Some([7, 7, 7, 7]));
        assert_eq!(image.pixel(2, 0), None);
    }
}
