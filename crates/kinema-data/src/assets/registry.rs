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

//! Name-keyed storage of shared, immutable assets.

use super::{Mesh, Texture};
use kinema_core::math::Extent2D;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building or registering assets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// A mesh has no vertices, indices or submeshes.
    #[error("Mesh '{0}' has no geometry")]
    EmptyGeometry(String),
    /// An index references a vertex past the end of the vertex list.
    #[error("Mesh '{mesh}' references vertex {index} but only has {vertex_count} vertices")]
    IndexOutOfRange {
        /// The mesh name.
        mesh: String,
        /// The offending index.
        index: u32,
        /// The number of vertices.
        vertex_count: usize,
    },
    /// A submesh range is malformed or has no material slot.
    #[error("Submesh {submesh} of mesh '{mesh}' is invalid")]
    InvalidSubmesh {
        /// The mesh name.
        mesh: String,
        /// The submesh index.
        submesh: usize,
    },
    /// Texel data does not match the declared extent.
    #[error("Texture '{0}' pixel data does not match its extent")]
    TextureSizeMismatch(String),
    /// The name is already taken.
    #[error("An asset named '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// Registered meshes, resolved by name.
///
/// Meshes are immutable once registered and shared through `Arc`. A node's mesh identity
/// is the `Arc` allocation, so a name can never be re-bound to different geometry.
#[derive(Debug, Default, Clone)]
pub struct MeshRegistry {
    meshes: HashMap<String, Arc<Mesh>>,
}

impl MeshRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mesh under its own name.
    ///
    /// # Errors
    /// [`AssetError::AlreadyRegistered`] if the name is taken.
    pub fn register(&mut self, mesh: Mesh) -> Result<Arc<Mesh>, AssetError> {
        if self.meshes.contains_key(mesh.name()) {
            return Err(AssetError::AlreadyRegistered(mesh.name().to_owned()));
        }
        let mesh = Arc::new(mesh);
        log::debug!(
            "Registered mesh '{}' ({} vertices, {} submeshes)",
            mesh.name(),
            mesh.vertices().len(),
            mesh.submeshes().len()
        );
        self.meshes.insert(mesh.name().to_owned(), mesh.clone());
        Ok(mesh)
    }

    /// Resolves a mesh by name.
    pub fn get(&self, name: &str) -> Option<&Arc<Mesh>> {
        self.meshes.get(name)
    }

    /// Whether a mesh with that name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.meshes.contains_key(name)
    }

    /// Number of registered meshes.
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

/// Registered textures, resolved by name.
#[derive(Debug, Default, Clone)]
pub struct TextureRegistry {
    textures: HashMap<String, Arc<Texture>>,
}

impl TextureRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers decoded RGBA8 texels under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        extent: Extent2D,
        pixels: Vec<u8>,
    ) -> Result<Arc<Texture>, AssetError> {
        let name = name.into();
        if pixels.len() as u64 != extent.area() * 4 {
            return Err(AssetError::TextureSizeMismatch(name));
        }
        if self.textures.contains_key(&name) {
            return Err(AssetError::AlreadyRegistered(name));
        }
        let texture = Arc::new(Texture {
            name: name.clone(),
            extent,
            pixels: Arc::from(pixels),
        });
        self.textures.insert(name, texture.clone());
        Ok(texture)
    }

    /// Resolves a texture by name.
    pub fn get(&self, name: &str) -> Option<&Arc<Texture>> {
        self.textures.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::primitives;

    #[test]
    fn names_cannot_be_rebound() {
        let mut registry = MeshRegistry::new();
        let cube = registry.register(primitives::cube("cube", Default::default()).unwrap()).unwrap();
        let err = registry
            .register(primitives::cube("cube", Default::default()).unwrap())
            .unwrap_err();
        assert_eq!(err, AssetError::AlreadyRegistered("cube".into()));
        assert!(Arc::ptr_eq(registry.get("cube").unwrap(), &cube));
        assert!(registry.get("sphere").is_none());
    }

    #[test]
    fn texture_size_is_checked() {
        let mut registry = TextureRegistry::new();
        assert!(registry
            .register("t", Extent2D::new(2, 2), vec![0; 15])
            .is_err());
        let texture = registry.register("t", Extent2D::new(2, 2), vec![0; 16]).unwrap();
        assert_eq!(registry.get("t").map(|t| t.extent), Some(texture.extent));
    }
}
