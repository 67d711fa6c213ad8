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

use super::{AssetError, Material};
use kinema_core::math::{Aabb, Mat4, Vec3};
use kinema_core::renderer::Vertex;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a registered [`Mesh`].
///
/// Renderers key their uploaded geometry on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u64);

/// A contiguous index range of a mesh drawn with one material list.
#[derive(Debug, Clone, PartialEq)]
pub struct Submesh {
    /// The index range, in indices.
    pub indices: Range<u32>,
    /// Ordered material slots. Slot 0 is the one the scene program shades with.
    pub materials: Vec<Material>,
}

impl Submesh {
    /// A submesh covering `indices` with a single material.
    pub fn new(indices: Range<u32>, material: Material) -> Self {
        Self {
            indices,
            materials: vec![material],
        }
    }

    /// Number of indices drawn.
    pub fn index_count(&self) -> u32 {
        self.indices.end.saturating_sub(self.indices.start)
    }
}

/// Immutable indexed triangle geometry with its submesh/material topology.
#[derive(Debug)]
pub struct Mesh {
    id: MeshId,
    name: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    bounds: Aabb,
    submeshes: Vec<Submesh>,
}

impl Mesh {
    /// Builds and validates a mesh.
    ///
    /// # Errors
    /// * [`AssetError::EmptyGeometry`] - no vertices, no indices or no submeshes.
    /// * [`AssetError::IndexOutOfRange`] - an index references a missing vertex.
    /// * [`AssetError::InvalidSubmesh`] - a submesh range is empty, not a whole number of
    ///   triangles, outside the index buffer, or has no material slot.
    pub fn new(
        name: impl Into<String>,
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
        submeshes: Vec<Submesh>,
    ) -> Result<Self, AssetError> {
        let name = name.into();
        if vertices.is_empty() || indices.is_empty() || submeshes.is_empty() {
            return Err(AssetError::EmptyGeometry(name));
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(AssetError::IndexOutOfRange {
                mesh: name,
                index,
                vertex_count: vertices.len(),
            });
        }
        for (i, submesh) in submeshes.iter().enumerate() {
            let count = submesh.index_count();
            if count == 0
                || count % 3 != 0
                || submesh.indices.end as usize > indices.len()
                || submesh.materials.is_empty()
            {
                return Err(AssetError::InvalidSubmesh {
                    mesh: name,
                    submesh: i,
                });
            }
        }

        let bounds = Aabb::from_points(vertices.iter().map(|v| Vec3::from(v.position)))
            .ok_or_else(|| AssetError::EmptyGeometry(name.clone()))?;

        Ok(Self {
            id: MeshId(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed)),
            name,
            vertices,
            indices,
            bounds,
            submeshes,
        })
    }

    /// The mesh identity.
    pub fn id(&self) -> MeshId {
        self.id
    }

    /// The registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vertex data.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Index data, 32-bit.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// The bounding extent of all vertices.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Ordered submeshes.
    pub fn submeshes(&self) -> &[Submesh] {
        &self.submeshes
    }

    /// The uniform scale that normalises the largest bounding dimension to 1.
    pub fn unit_scale(&self) -> Mat4 {
        self.bounds.unit_scale()
    }

    /// Whether two meshes share the same submesh/material-slot shape.
    pub fn same_topology(&self, other: &Mesh) -> bool {
        self.submeshes.len() == other.submeshes.len()
            && self
                .submeshes
                .iter()
                .zip(&other.submeshes)
                .all(|(a, b)| a.materials.len() == b.materials.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn triangle() -> Vec<Vertex> {
        vec![
            Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            Vertex::new([4.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            Vertex::new([0.0, 2.0, 0.0], [0.0, 0.0, 1.0]),
        ]
    }

    #[test]
    fn unit_scale_normalises_largest_dimension() {
        let mesh = Mesh::new(
            "tri",
            triangle(),
            vec![0, 1, 2],
            vec![Submesh::new(0..3, Material::default())],
        )
        .unwrap();
        let scaled = mesh.unit_scale().transform_point3(Vec3::new(4.0, 2.0, 0.0));
        assert_relative_eq!(scaled.x, 1.0);
        assert_relative_eq!(scaled.y, 0.5);
    }

    #[test]
    fn rejects_out_of_range_indices() {
        let err = Mesh::new(
            "bad",
            triangle(),
            vec![0, 1, 3],
            vec![Submesh::new(0..3, Material::default())],
        )
        .unwrap_err();
        assert!(matches!(err, AssetError::IndexOutOfRange { index: 3, .. }));
    }

    #[test]
    fn rejects_partial_triangles() {
        let err = Mesh::new(
            "bad",
            triangle(),
            vec![0, 1, 2],
            vec![Submesh::new(0..2, Material::default())],
        )
        .unwrap_err();
        assert!(matches!(err, AssetError::InvalidSubmesh { submesh: 0, .. }));
    }

    #[test]
    fn ids_are_unique() {
        let make = || {
            Mesh::new(
                "tri",
                triangle(),
                vec![0, 1, 2],
                vec![Submesh::new(0..3, Material::default())],
            )
            .unwrap()
        };
        let (a, b) = (make(), make());
        assert_ne!(a.id(), b.id());
        assert!(a.same_topology(&b));
    }
}
