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
//! Executes recorded command buffers against the software resource tables.

use super::command::{Command, RecordedColorAttachment, RecordedDraw, RecordedPass};
use super::device::{Resources, SoftTexture, Texels};
use super::raster::{self, DrawConstants, RasterState, ShadedVertex, Targets};
use bytemuck::Pod;
use kinema_core::math::Vec3;
use kinema_core::renderer::{
    BufferBindingType, BufferUsage, DeviceLimits, FrameConstants, IndexFormat, LightConstants,
    LoadOp, MaterialConstants, NodeConstants, ReadbackRequest, RenderError, TextureFormat,
    TextureId, TextureToBufferCopy, TextureUsage, TextureViewId, FRAME_CONSTANTS_BINDING,
    LIGHT_CONSTANTS_BINDING, MATERIAL_CONSTANTS_BINDING, NODE_CONSTANTS_BINDING,
};

fn fail(message: impl Into<String>) -> RenderError {
    RenderError::SubmissionFailed(message.into())
}

/// Runs `commands` in order. The first failing command aborts the rest.
pub(crate) fn execute(
    resources: &mut Resources,
    limits: &DeviceLimits,
    commands: Vec<Command>,
) -> Result<(), RenderError> {
    for command in commands {
        match command {
            Command::Pass(pass) => run_pass(resources, limits, &pass)?,
            Command::CopyTextureToBuffer(copy) => copy_texture_to_buffer(resources, limits, &copy)?,
        }
    }
    Ok(())
}

/// Copies the requested range out of a mappable buffer.
pub(crate) fn read_buffer(
    resources: &Resources,
    request: ReadbackRequest,
) -> Result<Vec<u8>, RenderError> {
    let buffer = resources.buffers.get(&request.buffer).ok_or_else(|| {
        RenderError::ReadbackFailed(format!("readback buffer {:?} does not exist", request.buffer))
    })?;
    if !buffer.usage.contains(BufferUsage::MAP_READ) {
        return Err(RenderError::ReadbackFailed(format!(
            "buffer {:?} is not mappable for reading",
            request.buffer
        )));
    }
    let start = request.offset as usize;
    let bytes = start
        .checked_add(request.size as usize)
        .and_then(|end| buffer.data.get(start..end))
        .ok_or_else(|| {
            RenderError::ReadbackFailed(format!(
                "range {}+{} exceeds buffer {:?}",
                request.offset, request.size, request.buffer
            ))
        })?;
    Ok(bytes.to_vec())
}

fn texture_of(resources: &Resources, view: TextureViewId) -> Result<TextureId, RenderError> {
    resources
        .views
        .get(&view)
        .copied()
        .ok_or_else(|| fail(format!("texture view {view:?} does not exist")))
}

fn take_texture(resources: &mut Resources, id: TextureId) -> Result<SoftTexture, RenderError> {
    resources
        .textures
        .remove(&id)
        .ok_or_else(|| fail(format!("texture {id:?} is missing or bound twice in one pass")))
}

fn run_pass(
    resources: &mut Resources,
    limits: &DeviceLimits,
    pass: &RecordedPass,
) -> Result<(), RenderError> {
    let [attachment] = pass.color_attachments.as_slice() else {
        return Err(fail(format!(
            "pass {:?} has {} color attachments, exactly one is supported",
            pass.label,
            pass.color_attachments.len()
        )));
    };
    let color_id = texture_of(resources, attachment.view)?;
    let depth_id = pass
        .depth
        .as_ref()
        .map(|(view, _)| texture_of(resources, *view))
        .transpose()?;
    let resolve_id = attachment
        .resolve_target
        .map(|view| texture_of(resources, view))
        .transpose()?;

    // Attachments leave the table for the duration of the pass so that they can be
    // written while the bound buffers are read.
    let mut color = take_texture(resources, color_id)?;
    let mut depth = match depth_id.map(|id| take_texture(resources, id)).transpose() {
        Ok(depth) => depth,
        Err(e) => {
            resources.textures.insert(color_id, color);
            return Err(e);
        }
    };

    let result = draw_pass(resources, limits, pass, attachment, &mut color, depth.as_mut())
        .and_then(|()| match resolve_id {
            Some(id) => resolve_into(resources, &color, id),
            None => Ok(()),
        });

    resources.textures.insert(color_id, color);
    if let (Some(id), Some(texture)) = (depth_id, depth) {
        resources.textures.insert(id, texture);
    }
    result
}

fn draw_pass(
    resources: &Resources,
    limits: &DeviceLimits,
    pass: &RecordedPass,
    attachment: &RecordedColorAttachment,
    color: &mut SoftTexture,
    depth: Option<&mut SoftTexture>,
) -> Result<(), RenderError> {
    if !color.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        return Err(fail("color attachment lacks RENDER_ATTACHMENT usage"));
    }
    let extent = color.extent;
    let sample_count = color.sample_count;
    let format = color.format;

    let Texels::Color(color_texels) = &mut color.texels else {
        return Err(fail("a depth texture was bound as color attachment"));
    };
    if let LoadOp::Clear(c) = &attachment.load {
        color_texels.fill([c.r, c.g, c.b, c.a]);
    }

    let depth_texels = match (depth, &pass.depth) {
        (Some(texture), Some((_, load))) => {
            if texture.extent != extent || texture.sample_count != sample_count {
                return Err(fail("depth attachment does not match the color attachment"));
            }
            let Texels::Depth(texels) = &mut texture.texels else {
                return Err(fail("a color texture was bound as depth attachment"));
            };
            if let LoadOp::Clear(value) = load {
                texels.fill(*value);
            }
            Some(texels.as_mut_slice())
        }
        _ => None,
    };

    let mut targets = Targets {
        extent,
        sample_count,
        color: color_texels.as_mut_slice(),
        depth: depth_texels,
    };
    for draw in &pass.draws {
        execute_draw(resources, limits, &mut targets, format, draw)?;
    }
    log::trace!(
        "SoftwareDevice: executed pass {:?} ({} draws)",
        pass.label,
        pass.draws.len()
    );
    Ok(())
}

fn resolve_into(
    resources: &mut Resources,
    source: &SoftTexture,
    target: TextureId,
) -> Result<(), RenderError> {
    let target = resources
        .textures
        .get_mut(&target)
        .ok_or_else(|| fail(format!("resolve target {target:?} does not exist")))?;
    if target.sample_count != 1 || target.extent != source.extent {
        return Err(fail("resolve target must be single-sample and match the attachment"));
    }
    match (&source.texels, &mut target.texels) {
        (Texels::Color(src), Texels::Color(dst)) => {
            raster::resolve(src, source.sample_count, dst);
            Ok(())
        }
        _ => Err(fail("only color attachments can be resolved")),
    }
}

/// One bound window of the scene bind group.
struct Window<'a> {
    binding: u32,
    bytes: &'a [u8],
}

fn bind_windows<'a>(
    resources: &'a Resources,
    limits: &DeviceLimits,
    draw: &RecordedDraw,
) -> Result<Vec<Window<'a>>, RenderError> {
    let (group_id, offsets) = draw
        .bind_group
        .as_ref()
        .ok_or_else(|| fail("draw without a bind group"))?;
    let group = resources
        .bind_groups
        .get(group_id)
        .ok_or_else(|| fail(format!("bind group {group_id:?} does not exist")))?;

    let dynamic = group.entries.iter().filter(|(l, _)| l.has_dynamic_offset).count();
    if dynamic != offsets.len() {
        return Err(fail(format!(
            "bind group {group_id:?} expects {dynamic} dynamic offsets, got {}",
            offsets.len()
        )));
    }

    let mut offsets = offsets.iter();
    let mut windows = Vec::with_capacity(group.entries.len());
    for (layout, entry) in &group.entries {
        let dynamic_offset = if layout.has_dynamic_offset {
            offsets.next().copied().unwrap_or(0) as u64
        } else {
            0
        };
        let alignment = match layout.ty {
            BufferBindingType::Uniform => limits.min_uniform_buffer_offset_alignment,
            BufferBindingType::Storage { .. } => limits.min_storage_buffer_offset_alignment,
        } as u64;
        if dynamic_offset % alignment.max(1) != 0 {
            return Err(fail(format!(
                "dynamic offset {dynamic_offset} of binding {} is not aligned to {alignment}",
                layout.binding
            )));
        }

        let buffer = resources
            .buffers
            .get(&entry.buffer)
            .ok_or_else(|| fail(format!("bound buffer {:?} was destroyed", entry.buffer)))?;
        let size = entry
            .size
            .unwrap_or((buffer.data.len() as u64).saturating_sub(entry.offset));
        let start = (entry.offset + dynamic_offset) as usize;
        let bytes = buffer
            .data
            .get(start..start + size as usize)
            .ok_or_else(|| fail(format!("binding {} window exceeds its buffer", layout.binding)))?;
        windows.push(Window {
            binding: layout.binding,
            bytes,
        });
    }
    Ok(windows)
}

fn window<'a>(windows: &[Window<'a>], binding: u32) -> Result<&'a [u8], RenderError> {
    windows
        .iter()
        .find(|w| w.binding == binding)
        .map(|w| w.bytes)
        .ok_or_else(|| fail(format!("the scene program needs binding {binding}")))
}

fn read_pod<T: Pod>(bytes: &[u8]) -> Result<T, RenderError> {
    bytes
        .get(..std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .ok_or_else(|| fail("bound window is smaller than its constant block"))
}

fn read_index(bytes: &[u8], format: IndexFormat, index: u32) -> Option<u32> {
    let size = format.size() as usize;
    let start = index as usize * size;
    let raw = bytes.get(start..start + size)?;
    Some(match format {
        IndexFormat::Uint16 => u16::from_le_bytes([raw[0], raw[1]]) as u32,
        IndexFormat::Uint32 => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
    })
}

fn read_vec3(bytes: &[u8], offset: usize) -> Option<Vec3> {
    let raw = bytes.get(offset..offset + 12)?;
    Some(Vec3::from_array(bytemuck::pod_read_unaligned::<[f32; 3]>(raw)))
}

fn execute_draw(
    resources: &Resources,
    limits: &DeviceLimits,
    targets: &mut Targets<'_>,
    format: TextureFormat,
    draw: &RecordedDraw,
) -> Result<(), RenderError> {
    let pipeline_id = draw.pipeline.ok_or_else(|| fail("draw without a pipeline"))?;
    let pipeline = resources
        .pipelines
        .get(&pipeline_id)
        .ok_or_else(|| fail(format!("pipeline {pipeline_id:?} does not exist")))?;
    if pipeline.sample_count != targets.sample_count || pipeline.color_format != format {
        return Err(fail(format!(
            "pipeline '{}' does not match the pass attachments",
            pipeline.label
        )));
    }

    let windows = bind_windows(resources, limits, draw)?;
    let frame: FrameConstants = read_pod(window(&windows, FRAME_CONSTANTS_BINDING)?)?;
    let lights = window(&windows, LIGHT_CONSTANTS_BINDING)?
        .chunks_exact(std::mem::size_of::<LightConstants>())
        .map(bytemuck::pod_read_unaligned::<LightConstants>)
        .collect();
    let material: MaterialConstants = read_pod(window(&windows, MATERIAL_CONSTANTS_BINDING)?)?;
    let nodes = window(&windows, NODE_CONSTANTS_BINDING)?;

    let (vertex_id, vertex_offset) = draw
        .vertex_buffer
        .ok_or_else(|| fail("draw without a vertex buffer"))?;
    let (index_id, index_offset, index_format) = draw
        .index_buffer
        .ok_or_else(|| fail("draw without an index buffer"))?;
    let vertices = resources
        .buffers
        .get(&vertex_id)
        .and_then(|b| b.data.get(vertex_offset as usize..))
        .ok_or_else(|| fail(format!("vertex buffer {vertex_id:?} is not usable")))?;
    let indices = resources
        .buffers
        .get(&index_id)
        .and_then(|b| b.data.get(index_offset as usize..))
        .ok_or_else(|| fail(format!("index buffer {index_id:?} is not usable")))?;

    let state = RasterState {
        cull_mode: pipeline.cull_mode,
        depth_compare: pipeline.depth_compare,
        depth_write: pipeline.depth_write,
    };
    let constants = DrawConstants {
        frame,
        lights,
        material,
    };
    let node_size = std::mem::size_of::<NodeConstants>();
    let stride = pipeline.vertex_stride as usize;

    for instance in draw.instances.clone() {
        let start = instance as usize * node_size;
        let Some(node_bytes) = nodes.get(start..start + node_size) else {
            log::warn!("SoftwareDevice: instance {instance} lies outside the node window");
            continue;
        };
        let node: NodeConstants = bytemuck::pod_read_unaligned(node_bytes);

        let fetch = |i: u32| -> Option<ShadedVertex> {
            let index = read_index(indices, index_format, i)? as i64 + draw.base_vertex as i64;
            let base = usize::try_from(index).ok()? * stride;
            let position = read_vec3(vertices, base + pipeline.position_offset as usize)?;
            let normal = read_vec3(vertices, base + pipeline.normal_offset as usize)?;
            Some(raster::transform_vertex(&frame, &node, position, normal))
        };

        let mut first = draw.indices.start;
        while first + 3 <= draw.indices.end {
            if let (Some(a), Some(b), Some(c)) = (fetch(first), fetch(first + 1), fetch(first + 2))
            {
                raster::draw_triangle(targets, &state, &constants, [a, b, c]);
            }
            first += 3;
        }
    }
    Ok(())
}

fn copy_texture_to_buffer(
    resources: &mut Resources,
    limits: &DeviceLimits,
    copy: &TextureToBufferCopy,
) -> Result<(), RenderError> {
    let Resources {
        textures, buffers, ..
    } = resources;
    let texture = textures
        .get(&copy.texture)
        .ok_or_else(|| fail(format!("copy source {:?} does not exist", copy.texture)))?;
    if !texture.usage.contains(TextureUsage::COPY_SRC) {
        return Err(fail("copy source lacks COPY_SRC usage"));
    }
    if texture.sample_count != 1 {
        return Err(fail("multisampled textures cannot be copied"));
    }
    let Texels::Color(texels) = &texture.texels else {
        return Err(fail("depth textures cannot be copied"));
    };
    if copy.extent.width > texture.extent.width || copy.extent.height > texture.extent.height {
        return Err(fail("copy region exceeds the source texture"));
    }

    let row_bytes = copy.extent.width as u64 * 4;
    let alignment = limits.copy_bytes_per_row_alignment.max(1);
    if copy.bytes_per_row % alignment != 0 || (copy.bytes_per_row as u64) < row_bytes {
        return Err(fail(format!(
            "bytes_per_row {} must be a multiple of {alignment} and hold {row_bytes} bytes",
            copy.bytes_per_row
        )));
    }

    let buffer = buffers
        .get_mut(&copy.buffer)
        .ok_or_else(|| fail(format!("copy destination {:?} does not exist", copy.buffer)))?;
    if !buffer.usage.contains(BufferUsage::COPY_DST) {
        return Err(fail("copy destination lacks COPY_DST usage"));
    }
    if copy.extent.height == 0 || copy.extent.width == 0 {
        return Ok(());
    }
    let needed = copy.buffer_offset
        + copy.bytes_per_row as u64 * (copy.extent.height as u64 - 1)
        + row_bytes;
    if needed > buffer.data.len() as u64 {
        return Err(fail("copy region exceeds the destination buffer"));
    }

    let srgb = texture.format.is_srgb();
    let texture_width = texture.extent.width as usize;
    for y in 0..copy.extent.height as usize {
        let row = copy.buffer_offset as usize + y * copy.bytes_per_row as usize;
        for x in 0..copy.extent.width as usize {
            let at = row + x * 4;
            let pixel = raster::encode_rgba8(texels[y * texture_width + x], srgb);
            buffer.data[at..at + 4].copy_from_slice(&pixel);
        }
    }
    Ok(())
}
