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

//! Defines data structures related to textures and texture views.

use crate::math::Extent2D;
use bitflags::bitflags;
use std::borrow::Cow;

/// An opaque handle to a GPU texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

/// An opaque handle to a view of a texture.
///
/// Render pass attachments and resolve targets are expressed as views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureViewId(pub usize);

/// The pixel formats the pipeline renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Four 8-bit unsigned normalized channels.
    Rgba8Unorm,
    /// Four 8-bit channels with sRGB encoding on write.
    Rgba8UnormSrgb,
    /// A 32-bit float depth format.
    Depth32Float,
}

impl TextureFormat {
    /// Returns the number of bytes a single texel occupies.
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => 4,
            TextureFormat::Depth32Float => 4,
        }
    }

    /// Whether this is a depth format.
    pub const fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    /// Whether writes to this format are sRGB encoded.
    pub const fn is_srgb(self) -> bool {
        matches!(self, TextureFormat::Rgba8UnormSrgb)
    }
}

bitflags! {
    /// A set of flags describing the allowed usages of a [`TextureId`].
    ///
    /// The bit values match wgpu's `TextureUsages`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// The texture can be used as the source of a copy operation.
        const COPY_SRC = 1 << 0;
        /// The texture can be used as the destination of a copy operation.
        const COPY_DST = 1 << 1;
        /// The texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 2;
        /// The texture can be used as a render pass attachment or resolve target.
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

/// A descriptor used to create a two-dimensional [`TextureId`].
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    /// An optional debug label for the texture.
    pub label: Option<Cow<'a, str>>,
    /// The size of the texture in pixels.
    pub size: Extent2D,
    /// Number of samples per pixel. `1` for single-sampled textures.
    pub sample_count: u32,
    /// The texel format.
    pub format: TextureFormat,
    /// How the texture will be used.
    pub usage: TextureUsage,
}

impl TextureDescriptor<'_> {
    /// Size of the texture in bytes, counting every sample.
    pub fn size_in_bytes(&self) -> u64 {
        self.size.area() * self.sample_count as u64 * self.format.bytes_per_pixel() as u64
    }
}
