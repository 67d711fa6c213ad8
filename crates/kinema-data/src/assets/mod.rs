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

//! Immutable geometry, materials and the registries that name them.

mod material;
mod mesh;
pub mod primitives;
mod registry;

pub use self::material::{Material, MaterialTextures, Texture};
pub use self::mesh::{Mesh, MeshId, Submesh};
pub use self::registry::{AssetError, MeshRegistry, TextureRegistry};
