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

//! Procedural meshes for demos and tests.

use super::{AssetError, Material, Mesh, Submesh};
use kinema_core::renderer::Vertex;

/// A unit cube centered on the origin, one submesh.
pub fn cube(name: &str, material: Material) -> Result<Mesh, AssetError> {
    // (normal, tangent u, tangent v) per face
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (n, u, v) in FACES {
        let base = vertices.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = [
                0.5 * (n[0] + su * u[0] + sv * v[0]),
                0.5 * (n[1] + su * u[1] + sv * v[1]),
                0.5 * (n[2] + su * u[2] + sv * v[2]),
            ];
            vertices.push(Vertex::new(position, n));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Mesh::new(name, vertices, indices, vec![Submesh::new(0..36, material)])
}

/// A unit quad in the XY plane facing +Z.
pub fn quad(name: &str, material: Material) -> Result<Mesh, AssetError> {
    let n = [0.0, 0.0, 1.0];
    let vertices = vec![
        Vertex::new([-0.5, -0.5, 0.0], n),
        Vertex::new([0.5, -0.5, 0.0], n),
        Vertex::new([0.5, 0.5, 0.0], n),
        Vertex::new([-0.5, 0.5, 0.0], n),
    ];
    Mesh::new(
        name,
        vertices,
        vec![0, 1, 2, 0, 2, 3],
        vec![Submesh::new(0..6, material)],
    )
}

/// A unit quad split into two triangle submeshes with their own materials.
pub fn two_tone_quad(
    name: &str,
    lower: Material,
    upper: Material,
) -> Result<Mesh, AssetError> {
    let n = [0.0, 0.0, 1.0];
    let vertices = vec![
        Vertex::new([-0.5, -0.5, 0.0], n),
        Vertex::new([0.5, -0.5, 0.0], n),
        Vertex::new([0.5, 0.5, 0.0], n),
        Vertex::new([-0.5, 0.5, 0.0], n),
    ];
    Mesh::new(
        name,
        vertices,
        vec![0, 1, 2, 0, 2, 3],
        vec![Submesh::new(0..3, lower), Submesh::new(3..6, upper)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_is_unit_sized() {
        let mesh = cube("cube", Material::default()).unwrap();
        assert_eq!(mesh.vertices().len(), 24);
        assert_eq!(mesh.bounds().largest_dimension(), 1.0);
        assert_eq!(mesh.submeshes()[0].index_count(), 36);
    }

    #[test]
    fn two_tone_quad_has_two_submeshes() {
        let mesh = two_tone_quad("q", Material::default(), Material::default()).unwrap();
        assert_eq!(mesh.submeshes().len(), 2);
    }
}
