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


//! The frame lanes: extraction, batch planning and the scene render pass.

mod batch_planner;
mod extract_lane;
mod scene_lane;
pub mod shaders;
mod world;

pub use self::batch_planner::{
    BatchPlanner, DrawCommand, DrawSource, FramePlan, PlanError, NODE_CONSTANT_STRIDE,
};
pub use self::extract_lane::ExtractLane;
pub use self::scene_lane::{
    LaneError, PreparedFrame, ReadbackLayout, SceneLaneConfig, SceneRenderLane,
    SCENE_COLOR_FORMAT, SCENE_DEPTH_FORMAT,
};
pub use self::world::{ExtractedCamera, ExtractedNode, SceneSnapshot};
