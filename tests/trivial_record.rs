//! End-to-end record-mode smoke test: compiles a single-pass shader with no
//! inputs, drives three record-mode frames through the scheduler, and checks
//! both the presentation-timestamp sequence and the YUV conversion of a known
//! constant color.

use shaderrunner::audio::bus::SharedAudioBuffer;
use shaderrunner::capture::yuv::YuvPass;
use shaderrunner::config::{BitDepth, RunMode};
use shaderrunner::error::Result;
use shaderrunner::gfx::context::GraphicsContext;
use shaderrunner::gfx::scene::Scene;
use shaderrunner::gfx::translator::PassthroughTranslator;
use shaderrunner::gfx::uniforms::{UniformBinding, Uniforms};
use shaderrunner::media::fs::FsMediaSource;
use shaderrunner::media::MediaSource;
use shaderrunner::scheduler::{FrameScheduler, MouseState};
use std::sync::Arc;

const WIDTH: u32 = 4;
const HEIGHT: u32 = 4;

fn write_fixture(dir: &std::path::Path) {
    std::fs::create_dir_all(dir).unwrap();
    let json = r#"{
        "info": {"id": "trivial", "name": "trivial", "author": "test"},
        "renderpass": [
            {
                "type": "image",
                "name": null,
                "code": "fn mainImage(fragColor: ptr<function, vec4<f32>>, fragCoord: vec2<f32>) {\n  *fragColor = vec4<f32>(0.25, 0.5, 0.75, 1.0);\n}\n",
                "inputs": []
            }
        ]
    }"#;
    std::fs::write(dir.join("trivial.json"), json).unwrap();
}

/// Reads back the top-left texel of a single-channel integer plane texture.
fn read_u8_texel(device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bytes_per_row = ((WIDTH + align - 1) / align) * align;
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("trivial record readback"),
        size: (padded_bytes_per_row * HEIGHT) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("trivial record readback encoder") });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo { texture, mip_level: 0, origin: wgpu::Origin3d::ZERO, aspect: wgpu::TextureAspect::All },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(padded_bytes_per_row), rows_per_image: Some(HEIGHT) },
        },
        wgpu::Extent3d { width: WIDTH, height: HEIGHT, depth_or_array_layers: 1 },
    );
    queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv().unwrap().unwrap();

    let data = slice.get_mapped_range();
    let value = data[0] as u32;
    drop(data);
    buffer.unmap();
    value
}

#[test]
fn record_mode_emits_sequential_pts_and_the_yuv_encoded_constant_color() -> Result<()> {
    let dir = std::env::temp_dir().join("shaderrunner_trivial_record_test");
    write_fixture(&dir);
    let media = FsMediaSource::new(&dir);
    let def = media.fetch_shader("trivial")?;

    let Ok(ctx) = GraphicsContext::new() else {
        eprintln!("skipping: no GPU adapter available in this environment");
        return Ok(());
    };

    let translator = PassthroughTranslator;
    let audio_bus = Arc::new(SharedAudioBuffer::new(44_100, 2048, 44_100));
    let output_format = wgpu::TextureFormat::Rgba8Unorm;

    let mut scene = Scene::compile(&ctx, &translator, &media, &def, WIDTH, HEIGHT, output_format, audio_bus)?;
    assert!(!scene.data_incomplete);

    let uniform_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("test uniform layout"),
        entries: &[UniformBinding::<Uniforms>::layout_entry(0)],
    });
    let mut uniform_binding = UniformBinding::new(&ctx.device, "test frame uniforms", Uniforms::zeroed(), &uniform_layout, 0);

    let mut scheduler = FrameScheduler::new(RunMode::Record, 1, Some(3.0), false);
    let yuv = YuvPass::new(&ctx.device, WIDTH, HEIGHT, BitDepth::Eight)?;
    let fallback_sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor::default());

    let mut pts_sequence = Vec::new();
    let mut last_y_code = 0u32;
    for _ in 0..3 {
        uniform_binding.data = scheduler.build_uniforms(WIDTH, HEIGHT, MouseState::default(), 44_100, [[0.0; 4]; 4], [0.0; 4]);

        scheduler.render_buffer_passes(&ctx.device, &ctx.queue, &mut scene, &uniform_binding)?;
        let image_view = scene.image_output.write_view();
        scheduler.render_image_pass(&ctx.device, &ctx.queue, &scene, &uniform_binding, image_view)?;
        scene.image_output.swap();

        yuv.convert(&ctx.device, &ctx.queue, scene.image_output.read_view(), &fallback_sampler)?;
        last_y_code = read_u8_texel(&ctx.device, &ctx.queue, &yuv.y_plane);

        pts_sequence.push(scheduler.pts());
        scheduler.advance();
    }

    assert_eq!(pts_sequence, vec![0, 1, 2]);

    // Same BT.709 + TV-range formula as the production conversion shader,
    // evaluated independently against the constant fragment color.
    let (r, g, b) = (0.25f32, 0.5f32, 0.75f32);
    let yp = 0.2126 * r + 0.7152 * g + 0.0722 * b;
    let expected_y_code = (yp * 219.0 + 16.0).round().clamp(16.0, 235.0) as u32;
    assert_eq!(last_y_code, expected_y_code);

    Ok(())
}
