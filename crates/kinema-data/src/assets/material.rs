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

use kinema_core::math::{Extent2D, LinearRgba};
use kinema_core::renderer::{material_texture_flags, MaterialConstants};
use std::fmt;
use std::sync::Arc;

/// A decoded RGBA8 image, registered by name in a [`TextureRegistry`](super::TextureRegistry).
#[derive(Clone, PartialEq)]
pub struct Texture {
    /// The registry name.
    pub name: String,
    /// Image size.
    pub extent: Extent2D,
    /// Tightly packed RGBA8 texels.
    pub pixels: Arc<[u8]>,
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("name", &self.name)
            .field("extent", &self.extent)
            .finish()
    }
}

/// Optional texture maps of a [`Material`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialTextures {
    /// Base color map.
    pub base_color: Option<Arc<Texture>>,
    /// Emissive map.
    pub emissive: Option<Arc<Texture>>,
    /// Metallic map.
    pub metallic: Option<Arc<Texture>>,
    /// Roughness map.
    pub roughness: Option<Arc<Texture>>,
    /// Tangent-space normal map.
    pub normal: Option<Arc<Texture>>,
    /// Ambient occlusion map.
    pub ambient_occlusion: Option<Arc<Texture>>,
}

impl MaterialTextures {
    /// The presence bitmask written into [`MaterialConstants::texture_flags`].
    pub fn flags(&self) -> u32 {
        use material_texture_flags::*;
        [
            (self.base_color.is_some(), BASE_COLOR),
            (self.emissive.is_some(), EMISSIVE),
            (self.metallic.is_some(), METALLIC),
            (self.roughness.is_some(), ROUGHNESS),
            (self.normal.is_some(), NORMAL),
            (self.ambient_occlusion.is_some(), AMBIENT_OCCLUSION),
        ]
        .into_iter()
        .filter(|(present, _)| *present)
        .fold(0, |flags, (_, bit)| flags | bit)
    }
}

/// Physically based surface parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Base color, alpha included.
    pub base_color: LinearRgba,
    /// Metallic factor in `[0, 1]`.
    pub metallic: f32,
    /// Roughness factor in `[0, 1]`.
    pub roughness: f32,
    /// Emitted radiance.
    pub emissive: LinearRgba,
    /// Surface opacity in `[0, 1]`.
    pub opacity: f32,
    /// Optional texture maps.
    pub textures: MaterialTextures,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: LinearRgba::WHITE,
            metallic: 0.0,
            roughness: 0.5,
            emissive: LinearRgba::BLACK,
            opacity: 1.0,
            textures: MaterialTextures::default(),
        }
    }
}

impl Material {
    /// A default material with the given base color.
    pub fn from_color(base_color: LinearRgba) -> Self {
        Self {
            base_color,
            ..Default::default()
        }
    }

    /// Packs the material into its GPU constant layout.
    pub fn to_constants(&self) -> MaterialConstants {
        MaterialConstants {
            base_color: self.base_color.to_array(),
            emissive: self.emissive.to_array(),
            metallic: self.metallic,
            roughness: self.roughness,
            opacity: self.opacity,
            texture_flags: self.textures.flags(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_flags_follow_present_maps() {
        let texture = Arc::new(Texture {
            name: "checker".into(),
            extent: Extent2D::new(1, 1),
            pixels: Arc::from(vec![255u8; 4]),
        });
        let material = Material {
            textures: MaterialTextures {
                base_color: Some(texture.clone()),
                normal: Some(texture),
                ..Default::default()
            },
            ..Default::default()
        };
        let constants = material.to_constants();
        assert_eq!(
            constants.texture_flags,
            material_texture_flags::BASE_COLOR | material_texture_flags::NORMAL
        );
        assert_eq!(constants.base_color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(constants.opacity, 1.0);
    }
}
