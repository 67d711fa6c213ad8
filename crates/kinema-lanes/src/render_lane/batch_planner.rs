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

//! Groups nodes into instanced batches and writes their per-draw constants.
//!
//! Nodes sharing a batch key are drawn with one instanced draw per submesh; batch keys
//! are visited in lexicographic order so draw order is reproducible from run to run.
//! Every other node gets one draw per submesh, in scene insertion order. Batched draws
//! always come first.

use super::{ExtractedNode, SceneSnapshot};
use kinema_core::renderer::{CapacityError, FrameConstantBuffer, MaterialConstants, NodeConstants};
use kinema_data::assets::{Material, Mesh};
use kinema_data::scene::NodeId;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

/// Size in bytes of one instance's node constants.
pub const NODE_CONSTANT_STRIDE: u64 = std::mem::size_of::<NodeConstants>() as u64;

/// Errors raised while writing a frame's constants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// The frame's constants do not fit the per-frame budget.
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    /// The scene has more lights than the light binding can hold.
    #[error("{count} lights exceed the per-frame maximum of {max}")]
    TooManyLights {
        /// Lights in the scene.
        count: usize,
        /// Configured maximum.
        max: usize,
    },
}

/// What a draw renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawSource {
    /// A chunk of the batch with this key.
    Batch {
        /// The batch key.
        key: String,
        /// Chunk index within the batch, 0 unless the batch was split.
        chunk: usize,
    },
    /// A single unbatched node.
    Node(NodeId),
}

/// One indexed draw with its constant offsets.
#[derive(Debug, Clone)]
pub struct DrawCommand {
    /// What is drawn.
    pub source: DrawSource,
    /// The geometry.
    pub mesh: Arc<Mesh>,
    /// Submesh index within `mesh`.
    pub submesh: usize,
    /// Number of instances; instance `i` reads node constants `i` of the block.
    pub instance_count: u32,
    /// Offset of the first instance's node constants.
    pub node_offset: u32,
    /// Offset of the submesh's material block (slot 0 first).
    pub material_offset: u32,
}

impl DrawCommand {
    /// The index range of the submesh.
    pub fn index_range(&self) -> Range<u32> {
        self.mesh
            .submeshes()
            .get(self.submesh)
            .map(|s| s.indices.clone())
            .unwrap_or(0..0)
    }
}

/// The ordered draw list of a frame.
#[derive(Debug, Clone, Default)]
pub struct FramePlan {
    /// Draws in submission order: batched first, then unbatched.
    pub draws: Vec<DrawCommand>,
    /// Number of distinct batch keys drawn.
    pub batch_count: usize,
    /// Number of nodes drawn through batches.
    pub batched_instances: usize,
}

impl FramePlan {
    /// Number of instanced draws issued for batches.
    pub fn batched_draw_count(&self) -> usize {
        self.draws
            .iter()
            .filter(|d| matches!(d.source, DrawSource::Batch { .. }))
            .count()
    }

    /// Number of draws issued for unbatched nodes.
    pub fn unbatched_draw_count(&self) -> usize {
        self.draws.len() - self.batched_draw_count()
    }
}

/// Plans the draws of a [`SceneSnapshot`] and writes their node and material constants.
///
/// Planning only pushes constants; the snapshot is not modified.
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    max_instances_per_draw: u32,
}

impl BatchPlanner {
    /// Creates a planner splitting batches into draws of at most `max_instances_per_draw`.
    pub fn new(max_instances_per_draw: u32) -> Self {
        Self {
            max_instances_per_draw: max_instances_per_draw.max(1),
        }
    }

    /// The largest instance count of one draw.
    pub fn max_instances_per_draw(&self) -> u32 {
        self.max_instances_per_draw
    }

    /// Plans one frame.
    ///
    /// # Errors
    /// [`PlanError::Capacity`] as soon as an allocation would exceed the frame budget.
    /// The caller is expected to abort the frame.
    pub fn plan(
        &self,
        snapshot: &SceneSnapshot,
        constants: &mut FrameConstantBuffer,
    ) -> Result<FramePlan, PlanError> {
        let mut batches: BTreeMap<&str, Vec<&ExtractedNode>> = BTreeMap::new();
        let mut unbatched = Vec::new();
        for node in &snapshot.nodes {
            match node.batch_key.as_deref() {
                Some(key) => batches.entry(key).or_default().push(node),
                None => unbatched.push(node),
            }
        }

        let mut plan = FramePlan {
            batch_count: batches.len(),
            ..Default::default()
        };

        for (key, members) in &batches {
            // The first member in insertion order describes the whole batch.
            let representative = members[0];
            let material_offsets = Self::push_materials(representative, constants)?;

            for (chunk, instances) in members.chunks(self.max_instances_per_draw as usize).enumerate() {
                let block: Vec<NodeConstants> = instances
                    .iter()
                    .map(|n| NodeConstants::from_world(n.world))
                    .collect();
                let node_offset = constants.push_slice(&block)?;
                for (submesh, &material_offset) in material_offsets.iter().enumerate() {
                    plan.draws.push(DrawCommand {
                        source: DrawSource::Batch {
                            key: (*key).to_owned(),
                            chunk,
                        },
                        mesh: representative.mesh.clone(),
                        submesh,
                        instance_count: block.len() as u32,
                        node_offset,
                        material_offset,
                    });
                }
            }
            plan.batched_instances += members.len();
            log::trace!(
                "Batch '{}': {} instances, {} submeshes",
                key,
                members.len(),
                material_offsets.len()
            );
        }

        for node in unbatched {
            let node_offset = constants.push(&NodeConstants::from_world(node.world))?;
            let material_offsets = Self::push_materials(node, constants)?;
            for (submesh, material_offset) in material_offsets.into_iter().enumerate() {
                plan.draws.push(DrawCommand {
                    source: DrawSource::Node(node.id),
                    mesh: node.mesh.clone(),
                    submesh,
                    instance_count: 1,
                    node_offset,
                    material_offset,
                });
            }
        }

        Ok(plan)
    }

    /// Writes one material block per submesh and returns their offsets.
    fn push_materials(
        node: &ExtractedNode,
        constants: &mut FrameConstantBuffer,
    ) -> Result<Vec<u32>, CapacityError> {
        node.materials
            .iter()
            .map(|slots| {
                let block: Vec<MaterialConstants> = if slots.is_empty() {
                    vec![Material::default().to_constants()]
                } else {
                    slots.iter().map(Material::to_constants).collect()
                };
                constants.push_slice(&block)
            })
            .collect()
    }
}
