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

use super::NodeId;
use crate::assets::{Material, Mesh};
use kinema_core::math::{LinearRgba, Mat4};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Addresses one material of a mesh: `materials[slot]` of `submeshes[submesh]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialSlot {
    /// Submesh index.
    pub submesh: usize,
    /// Material slot within the submesh.
    pub slot: usize,
}

impl MaterialSlot {
    /// Creates a slot address.
    pub const fn new(submesh: usize, slot: usize) -> Self {
        Self { submesh, slot }
    }
}

/// Per-node replacement of individual material parameters. `None` keeps the mesh's value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MaterialOverride {
    /// Replaces the base color.
    pub base_color: Option<LinearRgba>,
    /// Replaces the metallic factor.
    pub metallic: Option<f32>,
    /// Replaces the roughness factor.
    pub roughness: Option<f32>,
    /// Replaces the emissive color.
    pub emissive: Option<LinearRgba>,
    /// Replaces the opacity.
    pub opacity: Option<f32>,
}

impl MaterialOverride {
    /// An override replacing only the base color.
    pub fn base_color(color: LinearRgba) -> Self {
        Self {
            base_color: Some(color),
            ..Default::default()
        }
    }

    /// Applies the override on top of `material`.
    pub fn apply(&self, material: &Material) -> Material {
        Material {
            base_color: self.base_color.unwrap_or(material.base_color),
            metallic: self.metallic.unwrap_or(material.metallic),
            roughness: self.roughness.unwrap_or(material.roughness),
            emissive: self.emissive.unwrap_or(material.emissive),
            opacity: self.opacity.unwrap_or(material.opacity),
            textures: material.textures.clone(),
        }
    }
}

/// Everything needed to insert a node with [`SceneGraph::add_node`](super::SceneGraph::add_node).
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    /// Unique node name.
    pub name: String,
    /// Registry name of the mesh.
    pub mesh: String,
    /// Optional parent.
    pub parent: Option<NodeId>,
    /// Optional batch key.
    pub batch_key: Option<String>,
    /// Local transform relative to the parent.
    pub transform: Mat4,
    /// Initial material overrides.
    pub overrides: Vec<(MaterialSlot, MaterialOverride)>,
}

impl NodeDescriptor {
    /// A root node drawing `mesh`, with an identity transform.
    pub fn new(name: impl Into<String>, mesh: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mesh: mesh.into(),
            parent: None,
            batch_key: None,
            transform: Mat4::IDENTITY,
            overrides: Vec::new(),
        }
    }

    /// Sets the parent.
    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the batch key.
    pub fn with_batch_key(mut self, key: impl Into<String>) -> Self {
        self.batch_key = Some(key.into());
        self
    }

    /// Sets the local transform.
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    /// Adds a material override.
    pub fn with_override(mut self, slot: MaterialSlot, value: MaterialOverride) -> Self {
        self.overrides.push((slot, value));
        self
    }
}

/// A drawable element of the scene hierarchy.
#[derive(Debug, Clone)]
pub struct Node {
    pub(super) name: String,
    pub(super) mesh: Arc<Mesh>,
    pub(super) batch_key: Option<String>,
    pub(super) transform: Mat4,
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,
    pub(super) overrides: BTreeMap<MaterialSlot, MaterialOverride>,
}

impl Node {
    /// The unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared mesh.
    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    /// The batch key, if the node is batched.
    pub fn batch_key(&self) -> Option<&str> {
        self.batch_key.as_deref()
    }

    /// The local transform.
    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    /// The parent node.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child nodes in attachment order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The material override for a slot, if any.
    pub fn material_override(&self, slot: MaterialSlot) -> Option<&MaterialOverride> {
        self.overrides.get(&slot)
    }

    /// The material of a slot with this node's override applied.
    pub fn resolved_material(&self, slot: MaterialSlot) -> Option<Material> {
        let base = self
            .mesh
            .submeshes()
            .get(slot.submesh)?
            .materials
            .get(slot.slot)?;
        Some(match self.overrides.get(&slot) {
            Some(o) => o.apply(base),
            None => base.clone(),
        })
    }

    pub(super) fn has_slot(&self, slot: MaterialSlot) -> bool {
        self.mesh
            .submeshes()
            .get(slot.submesh)
            .is_some_and(|s| slot.slot < s.materials.len())
    }
}
