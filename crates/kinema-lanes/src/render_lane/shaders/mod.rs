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

//! WGSL sources of the render lanes.

/// The lit scene program: bindings 0..=3 of group 0 hold the frame, light, node and
/// material constants, all with dynamic offsets.
pub const SCENE_WGSL: &str = include_str!("scene.wgsl");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_shader_has_both_stages() {
        assert!(SCENE_WGSL.contains("@vertex"));
        assert!(SCENE_WGSL.contains("@fragment"));
    }

    #[test]
    fn test_scene_shader_declares_all_constant_bindings() {
        for binding in 0..4 {
            assert!(SCENE_WGSL.contains(&format!("@binding({binding})")));
        }
    }
}
