//! `Scene::compile` (spec §4.1): resolves buffers, channels, and fragment
//! programs for every pass in a `ShaderDefinition` into a ready-to-drive
//! render graph. Mirrors cuneus's `ComputeShaderBuilder::build()` in shape —
//! a builder-ish free function that does all resource allocation up front and
//! returns one immutable result — generalized from compute dispatches to
//! fragment-shader draws.

use crate::audio::bus::SharedAudioBuffer;
use crate::error::{EngineError, Result};
use crate::fft::FftChannel;
use crate::gfx::buffer::{Buffer, BufferId};
use crate::gfx::channel::{AudioChannel, BufferRefChannel, Channel, CubemapChannel, Texture2DChannel, Volume3DChannel};
use crate::gfx::context::GraphicsContext;
use crate::gfx::fullscreen::FullscreenQuad;
use crate::gfx::pass::RenderPass;
use crate::gfx::translator::Translator;
use crate::media::MediaSource;
use crate::shaderdef::{ChannelType, FilterMode, InputDef, RenderPassDef, SamplerDef, ShaderDefinition, WrapMode};
use crate::volume::VolumeBlob;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Scene {
    pub buffers: HashMap<BufferId, Buffer>,
    pub buffer_passes: Vec<(BufferId, RenderPass)>,
    pub image_pass: RenderPass,
    pub image_output: Buffer,
    pub quad: FullscreenQuad,
    /// Set when a referenced buffer or media asset could not be resolved
    /// (spec §8 DataIncompleteError); rendering proceeds with a nil slot.
    pub data_incomplete: bool,
    pub width: u32,
    pub height: u32,
}

const VERTEX_SOURCE: &str = include_str!("../../shaders/vertex.wgsl");

impl Scene {
    pub fn compile(
        ctx: &GraphicsContext,
        translator: &dyn Translator,
        media: &dyn MediaSource,
        def: &ShaderDefinition,
        width: u32,
        height: u32,
        output_format: wgpu::TextureFormat,
        audio_bus: Arc<SharedAudioBuffer>,
    ) -> Result<Scene> {
        let device = &ctx.device;
        let queue = &ctx.queue;

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fullscreen vertex"),
            source: wgpu::ShaderSource::Wgsl(VERTEX_SOURCE.into()),
        });
        let quad = FullscreenQuad::new(device);

        let mut buffers: HashMap<BufferId, Buffer> = HashMap::new();
        for pass_def in def.buffer_passes() {
            let letter = pass_def.buffer_letter().expect("buffer_passes() filters to resolvable letters");
            let id = BufferId::from_letter(letter).expect("validated by buffer_letter()");
            buffers.insert(id, Buffer::new(device, id, width, height, output_format));
        }

        let mut data_incomplete = false;

        let mut buffer_passes = Vec::new();
        for pass_def in def.buffer_passes() {
            let letter = pass_def.buffer_letter().expect("buffer_passes() filters to resolvable letters");
            let id = BufferId::from_letter(letter).expect("validated by buffer_letter()");
            let channels = resolve_channels(device, queue, media, pass_def, &buffers, &audio_bus, &mut data_incomplete)?;
            let compiled = RenderPass::compile(
                device,
                translator,
                &format!("buffer_{letter}"),
                def.common_source(),
                &pass_def.code,
                channels,
                Some(id),
                output_format,
                &vertex_module,
            )?;
            buffer_passes.push((id, compiled));
        }

        let image_pass_def = def
            .image_pass()
            .ok_or_else(|| EngineError::Config("shader definition has no image pass".into()))?;
        let image_channels = resolve_channels(device, queue, media, image_pass_def, &buffers, &audio_bus, &mut data_incomplete)?;
        let image_pass = RenderPass::compile(
            device,
            translator,
            "image",
            def.common_source(),
            &image_pass_def.code,
            image_channels,
            None,
            output_format,
            &vertex_module,
        )?;

        let image_output = Buffer::new(device, BufferId::A, width, height, output_format);

        Ok(Scene {
            buffers,
            buffer_passes,
            image_pass,
            image_output,
            quad,
            data_incomplete,
            width,
            height,
        })
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<()> {
        for buffer in self.buffers.values_mut() {
            buffer.resize(device, width, height)?;
        }
        self.image_output.resize(device, width, height)?;
        self.width = width;
        self.height = height;
        Ok(())
    }
}

fn resolve_channels(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    media: &dyn MediaSource,
    pass_def: &RenderPassDef,
    buffers: &HashMap<BufferId, Buffer>,
    audio_bus: &Arc<SharedAudioBuffer>,
    data_incomplete: &mut bool,
) -> Result<[Option<Channel>; 4]> {
    let mut channels: [Option<Channel>; 4] = [None, None, None, None];
    for input in &pass_def.inputs {
        let slot = input.channel as usize;
        if slot >= 4 {
            continue;
        }
        match resolve_one_channel(device, queue, media, input, buffers, audio_bus) {
            Ok(channel) => channels[slot] = Some(channel),
            Err(EngineError::DataIncomplete(reason)) => {
                log::warn!("channel {slot} unresolved: {reason}");
                *data_incomplete = true;
            }
            Err(other) => return Err(other),
        }
    }
    Ok(channels)
}

fn resolve_one_channel(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    media: &dyn MediaSource,
    input: &InputDef,
    buffers: &HashMap<BufferId, Buffer>,
    audio_bus: &Arc<SharedAudioBuffer>,
) -> Result<Channel> {
    match input.ctype {
        ChannelType::Texture => {
            let bytes = media.fetch_asset(&input.source)?;
            let image = image::load_from_memory(&bytes)
                .map_err(|e| EngineError::DataIncomplete(format!("decoding texture '{}': {e}", input.source)))?
                .to_rgba8();
            let (w, h) = image.dimensions();
            let sampler_def = sampler_def_or_default(input);
            let texture = upload_2d(device, queue, &image, w, h, &sampler_def);
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let sampler = make_sampler(device, &sampler_def);
            Ok(Channel::Texture2D(Texture2DChannel { texture, view, sampler, resolution: [w as f32, h as f32, 0.0] }))
        }
        ChannelType::Volume => {
            let bytes = media.fetch_asset(&input.source)?;
            let blob = VolumeBlob::parse(&bytes).map_err(|e| EngineError::DataIncomplete(format!("{}: {e}", input.source)))?;
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("volume_{}", input.source)),
                size: wgpu::Extent3d {
                    width: blob.header.width,
                    height: blob.header.height,
                    depth_or_array_layers: blob.header.depth,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D3,
                format: blob.header.format.wgpu_format(blob.header.channels)?,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let bytes_per_row = blob.header.width * blob.header.format.bytes_per_channel() as u32 * blob.header.channels as u32;
            queue.write_texture(
                wgpu::TexelCopyTextureInfo { texture: &texture, mip_level: 0, origin: wgpu::Origin3d::ZERO, aspect: wgpu::TextureAspect::All },
                &blob.voxels,
                wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(bytes_per_row), rows_per_image: Some(blob.header.height) },
                wgpu::Extent3d { width: blob.header.width, height: blob.header.height, depth_or_array_layers: blob.header.depth },
            );
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let sampler = make_sampler(device, &sampler_def_or_default(input));
            Ok(Channel::Volume3D(Volume3DChannel {
                texture,
                view,
                sampler,
                resolution: [blob.header.width as f32, blob.header.height as f32, blob.header.depth as f32],
            }))
        }
        ChannelType::Cubemap => {
            let face_suffixes = ["px", "nx", "ny", "py", "pz", "nz"];
            let mut faces = Vec::with_capacity(6);
            let mut dims = (0u32, 0u32);
            for suffix in face_suffixes {
                let reference = format!("{}_{suffix}", input.source);
                let bytes = media.fetch_asset(&reference)?;
                let image = image::load_from_memory(&bytes)
                    .map_err(|e| EngineError::DataIncomplete(format!("decoding cubemap face '{reference}': {e}")))?
                    .to_rgba8();
                dims = image.dimensions();
                faces.push(image);
            }
            let ordered: [image::RgbaImage; 6] = crate::cubemap::reorder_faces_for_upload(faces.try_into().unwrap());
            let (w, h) = dims;
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("cubemap_{}", input.source)),
                size: wgpu::Extent3d { width: w, height: h, depth_or_array_layers: 6 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            for (layer, face) in ordered.iter().enumerate() {
                queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d { x: 0, y: 0, z: layer as u32 },
                        aspect: wgpu::TextureAspect::All,
                    },
                    face,
                    wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(4 * w), rows_per_image: Some(h) },
                    wgpu::Extent3d { width: w, height: h, depth_or_array_layers: 1 },
                );
            }
            let view = texture.create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::Cube),
                ..Default::default()
            });
            let sampler = make_sampler(device, &sampler_def_or_default(input));
            Ok(Channel::Cubemap(CubemapChannel { texture, view, sampler, resolution: [w as f32, h as f32, 0.0] }))
        }
        ChannelType::Buffer => {
            let letter = input
                .source
                .chars()
                .last()
                .ok_or_else(|| EngineError::DataIncomplete("empty buffer reference".into()))?;
            let id = BufferId::from_letter(letter)
                .ok_or_else(|| EngineError::DataIncomplete(format!("unresolvable buffer reference '{}'", input.source)))?;
            if !buffers.contains_key(&id) {
                return Err(EngineError::DataIncomplete(format!("buffer '{}' is not declared in this scene", input.source)));
            }
            Ok(Channel::BufferRef(BufferRefChannel { buffer: id, resolution: [0.0, 0.0, 0.0] }))
        }
        ChannelType::Mic | ChannelType::Music => Ok(Channel::Audio(AudioChannel { fft: FftChannel::new(device), bus: audio_bus.clone() })),
    }
}

/// Input channels declare no sampler at all for plenty of shaders; this is
/// the same default every `ChannelType` asset branch falls back to.
fn sampler_def_or_default(input: &InputDef) -> SamplerDef {
    input.sampler.clone().unwrap_or(SamplerDef {
        filter: FilterMode::Linear,
        wrap: WrapMode::Clamp,
        vflip: false,
        srgb: false,
        internal: None,
    })
}

fn make_sampler(device: &wgpu::Device, sampler_def: &SamplerDef) -> wgpu::Sampler {
    let address_mode = match sampler_def.wrap {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
    };
    let filter_mode = match sampler_def.filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear | FilterMode::Mipmap => wgpu::FilterMode::Linear,
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter_mode,
        min_filter: filter_mode,
        ..Default::default()
    })
}

/// Reverses row order so row 0 of the uploaded texture is the image's bottom
/// row, matching Shadertoy's bottom-left texture origin when `vflip` is set.
fn flip_rows_rgba8(image: &image::RgbaImage) -> Vec<u8> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let row_bytes = width * 4;
    let raw = image.as_raw();
    let mut out = vec![0u8; row_bytes * height];
    for y in 0..height {
        let dst_row = height - 1 - y;
        out[dst_row * row_bytes..(dst_row + 1) * row_bytes].copy_from_slice(&raw[y * row_bytes..(y + 1) * row_bytes]);
    }
    out
}

/// Widens 8-bit-per-channel RGBA bytes into little-endian `f16` RGBA bytes
/// for a `sampler.internal == "float"` channel (spec §6).
fn rgba8_to_rgba16f(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.extend_from_slice(&half::f16::from_f32(b as f32 / 255.0).to_le_bytes());
    }
    out
}

fn upload_2d(device: &wgpu::Device, queue: &wgpu::Queue, image: &image::RgbaImage, width: u32, height: u32, sampler_def: &SamplerDef) -> wgpu::Texture {
    let format = if sampler_def.wants_float16() {
        wgpu::TextureFormat::Rgba16Float
    } else if sampler_def.srgb {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    };

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("texture2d channel"),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    let rows: std::borrow::Cow<[u8]> = if sampler_def.vflip {
        std::borrow::Cow::Owned(flip_rows_rgba8(image))
    } else {
        std::borrow::Cow::Borrowed(image.as_raw())
    };

    if sampler_def.wants_float16() {
        let texels = rgba8_to_rgba16f(&rows);
        queue.write_texture(
            wgpu::TexelCopyTextureInfo { texture: &texture, mip_level: 0, origin: wgpu::Origin3d::ZERO, aspect: wgpu::TextureAspect::All },
            &texels,
            wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(8 * width), rows_per_image: Some(height) },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
    } else {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo { texture: &texture, mip_level: 0, origin: wgpu::Origin3d::ZERO, aspect: wgpu::TextureAspect::All },
            &rows,
            wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(4 * width), rows_per_image: Some(height) },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
    }
    texture
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sampler_def_is_linear_clamp() {
        let def = SamplerDef { filter: FilterMode::Linear, wrap: WrapMode::Clamp, vflip: false, srgb: false, internal: None };
        assert!(!def.wants_float16());
    }

    #[test]
    fn flip_rows_reverses_row_order() {
        let image = image::RgbaImage::from_raw(1, 2, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let flipped = flip_rows_rgba8(&image);
        assert_eq!(flipped, vec![5, 6, 7, 8, 1, 2, 3, 4]);
    }

    #[test]
    fn rgba8_to_rgba16f_round_trips_full_scale_bytes() {
        let bytes = rgba8_to_rgba16f(&[0, 255]);
        assert_eq!(half::f16::from_le_bytes([bytes[0], bytes[1]]).to_f32(), 0.0);
        assert_eq!(half::f16::from_le_bytes([bytes[2], bytes[3]]).to_f32(), 1.0);
    }
}
