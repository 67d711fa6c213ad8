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

use super::{Camera, Light, MaterialOverride, MaterialSlot, Node, NodeDescriptor, SceneError};
use crate::assets::{Mesh, MeshRegistry};
use kinema_core::math::Mat4;
use slotmap::{new_key_type, SecondaryMap, SlotMap};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

new_key_type! {
    /// Stable handle of a node in a [`SceneGraph`].
    pub struct NodeId;
    /// Stable handle of a light in a [`SceneGraph`].
    pub struct LightId;
}

/// Mesh established by the first member of a batch, and the member count.
#[derive(Debug, Clone)]
struct BatchInfo {
    mesh: Arc<Mesh>,
    members: usize,
}

/// The mutable scene description owned by the application.
///
/// Iteration over nodes and lights follows insertion order, which is what makes draw
/// order, batch representatives and instance order reproducible.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, Node>,
    node_order: Vec<NodeId>,
    names: HashMap<String, NodeId>,
    batches: HashMap<String, BatchInfo>,
    lights: SlotMap<LightId, Light>,
    light_order: Vec<LightId>,
    camera: Camera,
}

impl SceneGraph {
    /// Creates an empty scene with a default camera.
    pub fn new() -> Self {
        Self::default()
    }

    // --- Nodes ---

    /// Inserts a node.
    ///
    /// # Errors
    /// * [`SceneError::DuplicateName`] - the name is taken.
    /// * [`SceneError::MeshNotRegistered`] - the mesh name does not resolve.
    /// * [`SceneError::NodeNotFound`] - the parent does not exist.
    /// * [`SceneError::HeterogeneousBatch`] - the batch already draws another mesh.
    /// * [`SceneError::InvalidMaterialSlot`] - an override targets a missing slot.
    ///
    /// On error the scene is unchanged.
    pub fn add_node(
        &mut self,
        registry: &MeshRegistry,
        descriptor: NodeDescriptor,
    ) -> Result<NodeId, SceneError> {
        let NodeDescriptor {
            name,
            mesh,
            parent,
            batch_key,
            transform,
            overrides,
        } = descriptor;

        if self.names.contains_key(&name) {
            return Err(SceneError::DuplicateName(name));
        }
        let Some(mesh) = registry.get(&mesh).cloned() else {
            log::warn!("Node '{name}' references unregistered mesh '{mesh}'");
            return Err(SceneError::MeshNotRegistered(mesh));
        };
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return Err(SceneError::NodeNotFound);
            }
        }
        if let Some(key) = &batch_key {
            self.check_batch(key, &mesh, &name)?;
        }

        let mut node = Node {
            name,
            mesh,
            batch_key,
            transform,
            parent,
            children: Vec::new(),
            overrides: BTreeMap::new(),
        };
        for (slot, value) in overrides {
            if !node.has_slot(slot) {
                return Err(SceneError::InvalidMaterialSlot {
                    node: node.name,
                    submesh: slot.submesh,
                    slot: slot.slot,
                });
            }
            node.overrides.insert(slot, value);
        }

        if let Some(key) = &node.batch_key {
            self.join_batch(key, &node.mesh);
        }
        let name = node.name.clone();
        let id = self.nodes.insert(node);
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.push(id);
        }
        self.names.insert(name, id);
        self.node_order.push(id);
        Ok(id)
    }

    /// Removes a node and its whole subtree. Returns the number of nodes removed.
    pub fn remove_node(&mut self, id: NodeId) -> Result<usize, SceneError> {
        let parent = self.nodes.get(id).ok_or(SceneError::NodeNotFound)?.parent;
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|&c| c != id);
        }

        let mut pending = vec![id];
        let mut removed = 0;
        while let Some(current) = pending.pop() {
            let Some(node) = self.nodes.remove(current) else {
                continue;
            };
            if let Some(key) = &node.batch_key {
                self.leave_batch(key);
            }
            self.names.remove(&node.name);
            pending.extend(node.children);
            removed += 1;
        }
        self.node_order.retain(|id| self.nodes.contains_key(*id));
        Ok(removed)
    }

    /// Looks a node up by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Looks a node id up by name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.node_order
            .iter()
            .filter_map(move |&id| self.nodes.get(id).map(|n| (id, n)))
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Replaces a node's local transform.
    pub fn set_transform(&mut self, id: NodeId, transform: Mat4) -> Result<(), SceneError> {
        self.nodes.get_mut(id).ok_or(SceneError::NodeNotFound)?.transform = transform;
        Ok(())
    }

    /// Reparents a node, or detaches it to the root with `None`.
    ///
    /// # Errors
    /// [`SceneError::CycleDetected`] if `parent` is the node itself or one of its
    /// descendants.
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<(), SceneError> {
        let old_parent = self.nodes.get(id).ok_or(SceneError::NodeNotFound)?.parent;
        if let Some(new_parent) = parent {
            if !self.nodes.contains_key(new_parent) {
                return Err(SceneError::NodeNotFound);
            }
            if self.is_ancestor_or_self(id, new_parent) {
                return Err(SceneError::CycleDetected {
                    node: self.nodes[id].name.clone(),
                    parent: self.nodes[new_parent].name.clone(),
                });
            }
        }

        if let Some(old) = old_parent.and_then(|p| self.nodes.get_mut(p)) {
            old.children.retain(|&c| c != id);
        }
        if let Some(new) = parent.and_then(|p| self.nodes.get_mut(p)) {
            new.children.push(id);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = parent;
        }
        Ok(())
    }

    /// Assigns or clears a node's batch key.
    ///
    /// # Errors
    /// [`SceneError::HeterogeneousBatch`] if the batch already draws another mesh.
    pub fn set_batch_key(&mut self, id: NodeId, key: Option<String>) -> Result<(), SceneError> {
        let node = self.nodes.get(id).ok_or(SceneError::NodeNotFound)?;
        if node.batch_key == key {
            return Ok(());
        }
        if let Some(key) = &key {
            self.check_batch(key, &node.mesh, &node.name)?;
        }

        let node = &mut self.nodes[id];
        let old = std::mem::replace(&mut node.batch_key, key.clone());
        let mesh = node.mesh.clone();
        if let Some(old) = old {
            self.leave_batch(&old);
        }
        if let Some(key) = key {
            self.join_batch(&key, &mesh);
        }
        Ok(())
    }

    /// Swaps the mesh a node draws.
    ///
    /// # Errors
    /// [`SceneError::MeshNotRegistered`] for an unknown name, and
    /// [`SceneError::HeterogeneousBatch`] if the node is batched with other members that
    /// keep the old mesh. Material overrides that no longer address a slot are dropped.
    pub fn set_mesh(
        &mut self,
        registry: &MeshRegistry,
        id: NodeId,
        mesh: &str,
    ) -> Result<(), SceneError> {
        let node = self.nodes.get(id).ok_or(SceneError::NodeNotFound)?;
        let mesh = registry
            .get(mesh)
            .cloned()
            .ok_or_else(|| SceneError::MeshNotRegistered(mesh.to_owned()))?;
        if let Some(key) = &node.batch_key {
            let shared = self.batches.get(key).is_some_and(|b| b.members > 1);
            if shared && !Arc::ptr_eq(&node.mesh, &mesh) {
                return Err(SceneError::HeterogeneousBatch {
                    key: key.clone(),
                    node: node.name.clone(),
                });
            }
        }

        let node = &mut self.nodes[id];
        node.mesh = mesh.clone();
        let valid: Vec<MaterialSlot> = node
            .overrides
            .keys()
            .copied()
            .filter(|&slot| node.has_slot(slot))
            .collect();
        node.overrides.retain(|slot, _| valid.contains(slot));
        if let Some(batch) = node.batch_key.as_ref().and_then(|k| self.batches.get_mut(k)) {
            batch.mesh = mesh;
        }
        Ok(())
    }

    /// Sets the material override of one slot.
    ///
    /// Overrides on batched nodes are stored but only the batch representative's
    /// materials are drawn, because a batch shares one material set per submesh.
    pub fn set_material_override(
        &mut self,
        id: NodeId,
        slot: MaterialSlot,
        value: MaterialOverride,
    ) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::NodeNotFound)?;
        if !node.has_slot(slot) {
            return Err(SceneError::InvalidMaterialSlot {
                node: node.name.clone(),
                submesh: slot.submesh,
                slot: slot.slot,
            });
        }
        node.overrides.insert(slot, value);
        Ok(())
    }

    /// Removes the material override of one slot.
    pub fn clear_material_override(
        &mut self,
        id: NodeId,
        slot: MaterialSlot,
    ) -> Result<Option<MaterialOverride>, SceneError> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::NodeNotFound)?;
        Ok(node.overrides.remove(&slot))
    }

    /// The world transform of a node: its parent's world transform times its local one.
    pub fn world_transform(&self, id: NodeId) -> Option<Mat4> {
        let mut node = self.nodes.get(id)?;
        let mut world = node.transform;
        while let Some(parent) = node.parent.and_then(|p| self.nodes.get(p)) {
            world = parent.transform * world;
            node = parent;
        }
        Some(world)
    }

    /// World transforms of every node, each parent chain evaluated once.
    pub fn world_transforms(&self) -> SecondaryMap<NodeId, Mat4> {
        let mut resolved: SecondaryMap<NodeId, Mat4> = SecondaryMap::with_capacity(self.nodes.len());
        let mut chain = Vec::new();
        for &id in &self.node_order {
            let mut current = Some(id);
            while let Some(c) = current.filter(|c| !resolved.contains_key(*c)) {
                chain.push(c);
                current = self.nodes.get(c).and_then(|n| n.parent);
            }
            let mut world = current
                .and_then(|c| resolved.get(c).copied())
                .unwrap_or(Mat4::IDENTITY);
            while let Some(c) = chain.pop() {
                if let Some(node) = self.nodes.get(c) {
                    world *= node.transform;
                    resolved.insert(c, world);
                }
            }
        }
        resolved
    }

    // --- Lights ---

    /// Adds a light.
    pub fn add_light(&mut self, light: Light) -> LightId {
        let id = self.lights.insert(light);
        self.light_order.push(id);
        id
    }

    /// Removes a light.
    pub fn remove_light(&mut self, id: LightId) -> Result<Light, SceneError> {
        let light = self.lights.remove(id).ok_or(SceneError::LightNotFound)?;
        self.light_order.retain(|&l| l != id);
        Ok(light)
    }

    /// Looks a light up by id.
    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(id)
    }

    /// Mutable access to a light.
    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(id)
    }

    /// Lights in insertion order.
    pub fn lights(&self) -> impl Iterator<Item = (LightId, &Light)> + '_ {
        self.light_order
            .iter()
            .filter_map(move |&id| self.lights.get(id).map(|l| (id, l)))
    }

    // --- Camera ---

    /// The camera.
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Mutable access to the camera.
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    // --- Internals ---

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes.get(node).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn check_batch(&self, key: &str, mesh: &Arc<Mesh>, node: &str) -> Result<(), SceneError> {
        match self.batches.get(key) {
            Some(batch) if !Arc::ptr_eq(&batch.mesh, mesh) => Err(SceneError::HeterogeneousBatch {
                key: key.to_owned(),
                node: node.to_owned(),
            }),
            _ => Ok(()),
        }
    }

    fn join_batch(&mut self, key: &str, mesh: &Arc<Mesh>) {
        self.batches
            .entry(key.to_owned())
            .and_modify(|b| b.members += 1)
            .or_insert_with(|| BatchInfo {
                mesh: mesh.clone(),
                members: 1,
            });
    }

    fn leave_batch(&mut self, key: &str) {
        if let Some(batch) = self.batches.get_mut(key) {
            batch.members -= 1;
            if batch.members == 0 {
                self.batches.remove(key);
            }
        }
    }
}
