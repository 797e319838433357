//! Sound Shader Renderer (spec §4.7, §4.9). Runs on its own OS thread with a
//! secondary `wgpu::Device` requested from the main context's adapter (the
//! closest analog available to a shared GL context; see
//! `gfx::context::GraphicsContext::secondary_device` and DESIGN.md).

use crate::audio::synth::SoundBlock;
use crate::error::{EngineError, Result};
use crate::gfx::fullscreen::FullscreenQuad;
use crate::gfx::translator::Translator;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const TILE: u32 = 512;
const SAMPLES_PER_BLOCK: usize = (TILE * TILE) as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundRendererState {
    Idle,
    Initializing,
    Running,
    Cancelling,
    Drained,
}

/// Shared observer for the `Idle -> Initializing -> Running -> Cancelling ->
/// Drained` state machine (spec §4.9), read by tests and any diagnostics.
pub struct SoundRendererHandle {
    state: std::sync::Mutex<SoundRendererState>,
}

impl SoundRendererHandle {
    fn new() -> Arc<Self> {
        Arc::new(Self { state: std::sync::Mutex::new(SoundRendererState::Idle) })
    }

    pub fn state(&self) -> SoundRendererState {
        *self.state.lock().unwrap()
    }

    fn set(&self, s: SoundRendererState) {
        *self.state.lock().unwrap() = s;
    }
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct SoundUniforms {
    time_offset: f32,
    sample_offset: f32,
    sample_rate: f32,
    _pad: f32,
}

/// Spawns the sound-shader thread. `cancel` is the single cancel token
/// observed at top-of-loop and at the blocking send (spec §4.7, §5).
pub fn spawn(
    ctx: &crate::gfx::context::GraphicsContext,
    translator: Arc<dyn Translator + Send + Sync>,
    common_source: String,
    sound_source: String,
    sample_rate: u32,
    sender: Sender<SoundBlock>,
    cancel: Arc<AtomicBool>,
) -> Result<(std::thread::JoinHandle<()>, Arc<SoundRendererHandle>)> {
    let (device, queue) = ctx
        .secondary_device()
        .map_err(|e| EngineError::ResourceAlloc(format!("secondary device for sound thread: {e}")))?;

    let handle = SoundRendererHandle::new();
    let handle_for_thread = handle.clone();

    let join = std::thread::Builder::new()
        .name("sound-shader".into())
        .spawn(move || run(device, queue, translator, common_source, sound_source, sample_rate, sender, cancel, handle_for_thread))
        .map_err(|e| EngineError::ResourceAlloc(format!("spawning sound-shader thread: {e}")))?;

    Ok((join, handle))
}

#[allow(clippy::too_many_arguments)]
fn run(
    device: wgpu::Device,
    queue: wgpu::Queue,
    translator: Arc<dyn Translator + Send + Sync>,
    common_source: String,
    sound_source: String,
    sample_rate: u32,
    sender: Sender<SoundBlock>,
    cancel: Arc<AtomicBool>,
    handle: Arc<SoundRendererHandle>,
) {
    handle.set(SoundRendererState::Initializing);

    let target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("sound_shader_target"),
        size: wgpu::Extent3d { width: TILE, height: TILE, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());

    let vertex_source = include_str!("../shaders/vertex.wgsl");
    let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("sound vertex"),
        source: wgpu::ShaderSource::Wgsl(vertex_source.into()),
    });

    let full_source = format!("{common_source}\n{sound_source}");
    let translated = match translator.translate(&full_source, crate::gfx::translator::ShaderStage::Fragment, crate::gfx::translator::Dialect::WebGl2, crate::gfx::translator::Dialect::Wgsl) {
        Ok(t) => t,
        Err(reason) => {
            log::error!("sound shader translation failed: {reason}");
            handle.set(SoundRendererState::Drained);
            return;
        }
    };
    let fs_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("sound fragment"),
        source: wgpu::ShaderSource::Wgsl(translated.code.into()),
    });

    let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("sound uniform layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None },
            count: None,
        }],
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("sound pipeline layout"),
        bind_group_layouts: &[&uniform_layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("sound pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex_module,
            entry_point: Some("vs_main"),
            buffers: &[FullscreenQuad::vertex_buffer_layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &fs_module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState { format: wgpu::TextureFormat::Rgba8Unorm, blend: None, write_mask: wgpu::ColorWrites::ALL })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState { topology: wgpu::PrimitiveTopology::TriangleStrip, ..Default::default() },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    let quad = FullscreenQuad::new(&device);

    use wgpu::util::DeviceExt;
    let mut sound_uniforms = SoundUniforms { time_offset: 0.0, sample_offset: 0.0, sample_rate: sample_rate as f32, _pad: 0.0 };
    let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("sound uniforms"),
        contents: bytemuck::bytes_of(&sound_uniforms),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("sound uniform bind group"),
        layout: &uniform_layout,
        entries: &[wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() }],
    });

    handle.set(SoundRendererState::Running);

    let mut sample_offset: u64 = 0;
    loop {
        if cancel.load(Ordering::SeqCst) {
            break;
        }

        queue.write_buffer(&uniform_buffer, 0, bytemuck::bytes_of(&sound_uniforms));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("sound pass encoder") });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sound pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Clear(wgpu::Color::BLACK), store: wgpu::StoreOp::Store },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(&pipeline);
            render_pass.set_bind_group(0, &uniform_bind_group, &[]);
            quad.draw(&mut render_pass);
        }
        queue.submit(Some(encoder.finish()));

        let block = match readback_block(&device, &queue, &target) {
            Ok(samples) => samples,
            Err(e) => {
                log::error!("sound shader readback failed: {e}");
                break;
            }
        };

        if cancel.load(Ordering::SeqCst) || sender.send(SoundBlock { samples: block }).is_err() {
            break;
        }

        sound_uniforms.time_offset += SAMPLES_PER_BLOCK as f32 / sample_rate as f32;
        sound_uniforms.sample_offset = sample_offset as f32;
        sample_offset += SAMPLES_PER_BLOCK as u64;
    }

    handle.set(SoundRendererState::Drained);
}

/// Reads back the 512x512 RGBA8 target and decodes the official Shadertoy
/// stereo-int16 pixel encoding into interleaved float samples (spec §4.7
/// step 3): R|G = left 16-bit value (low|high byte), B|A = right.
fn readback_block(device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) -> Result<Vec<f32>> {
    let bytes_per_row_unpadded = TILE * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bytes_per_row = ((bytes_per_row_unpadded + align - 1) / align) * align;

    let buffer_size = (padded_bytes_per_row * TILE) as wgpu::BufferAddress;
    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("sound readback buffer"),
        size: buffer_size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("sound readback encoder") });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo { texture, mip_level: 0, origin: wgpu::Origin3d::ZERO, aspect: wgpu::TextureAspect::All },
        wgpu::TexelCopyBufferInfo {
            buffer: &output_buffer,
            layout: wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(padded_bytes_per_row), rows_per_image: Some(TILE) },
        },
        wgpu::Extent3d { width: TILE, height: TILE, depth_or_array_layers: 1 },
    );
    queue.submit(Some(encoder.finish()));

    let slice = output_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|e| EngineError::Readback(format!("map_async channel closed: {e}")))?
        .map_err(|e| EngineError::Readback(format!("{e:?}")))?;

    let data = slice.get_mapped_range();
    let mut samples = Vec::with_capacity(SAMPLES_PER_BLOCK * 2);
    for row in 0..TILE {
        let row_start = (row * padded_bytes_per_row) as usize;
        let row_bytes = &data[row_start..row_start + bytes_per_row_unpadded as usize];
        for pixel in row_bytes.chunks_exact(4) {
            samples.push(decode_channel(pixel[0], pixel[1]));
            samples.push(decode_channel(pixel[2], pixel[3]));
        }
    }
    drop(data);
    output_buffer.unmap();
    Ok(samples)
}

/// Unsigned affine decode of one Shadertoy-encoded 16-bit channel (low byte,
/// high byte) into `[-1.0, 1.0]` (spec §4.7 step 3).
fn decode_channel(low: u8, high: u8) -> f32 {
    let raw = low as u32 + (high as u32) * 256;
    (raw as f32 / 65535.0) * 2.0 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn decode_channel_maps_raw_zero_and_max_to_the_range_endpoints() {
        assert_abs_diff_eq!(decode_channel(0, 0), -1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(decode_channel(255, 255), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn decode_channel_maps_midpoint_raw_value_to_zero() {
        // raw = 32767 -> (32767/65535)*2 - 1, just shy of the true midpoint.
        assert_abs_diff_eq!(decode_channel(255, 127), 0.0, epsilon = 1e-4);
    }
}
