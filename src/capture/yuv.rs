//! RGB -> YUV conversion pass (spec §4.4): three single-channel integer
//! render targets written in one multiple-render-target draw.

use crate::config::BitDepth;
use crate::error::Result;
use crate::gfx::fullscreen::FullscreenQuad;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct YuvParams {
    y_scale: f32,
    c_scale: f32,
    y_offset: f32,
    c_offset: f32,
    hdr: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
}

impl YuvParams {
    /// TV-range scale/offset pairs per spec §4.4: Y in [16,235] for 8-bit
    /// (scaled ranges [64,940] for 10-bit), C in [16,240]/[64,960]. `hdr` is
    /// set for 10/12-bit capture, where the source is float-linear and needs
    /// the BT.709 transfer function applied before the Y'CbCr matrix.
    fn for_bit_depth(bit_depth: BitDepth) -> Self {
        let hdr = if bit_depth.is_hdr() { 1.0 } else { 0.0 };
        match bit_depth {
            BitDepth::Eight => YuvParams { y_scale: 219.0, c_scale: 224.0, y_offset: 16.0, c_offset: 16.0, hdr, _pad0: 0.0, _pad1: 0.0, _pad2: 0.0 },
            BitDepth::Ten | BitDepth::Twelve => YuvParams { y_scale: 876.0, c_scale: 896.0, y_offset: 64.0, c_offset: 64.0, hdr, _pad0: 0.0, _pad1: 0.0, _pad2: 0.0 },
        }
    }

    fn plane_format(bit_depth: BitDepth) -> wgpu::TextureFormat {
        match bit_depth {
            BitDepth::Eight => wgpu::TextureFormat::R8Uint,
            BitDepth::Ten | BitDepth::Twelve => wgpu::TextureFormat::R16Uint,
        }
    }
}

pub struct YuvPass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    pub y_plane: wgpu::Texture,
    pub u_plane: wgpu::Texture,
    pub v_plane: wgpu::Texture,
    y_view: wgpu::TextureView,
    u_view: wgpu::TextureView,
    v_view: wgpu::TextureView,
    quad: FullscreenQuad,
    width: u32,
    height: u32,
    plane_format: wgpu::TextureFormat,
}

const SHADER_SOURCE: &str = include_str!("../../shaders/yuv.wgsl");
const VERTEX_SOURCE: &str = include_str!("../../shaders/vertex.wgsl");

impl YuvPass {
    pub fn new(device: &wgpu::Device, width: u32, height: u32, bit_depth: BitDepth) -> Result<Self> {
        let plane_format = YuvParams::plane_format(bit_depth);
        let (y_plane, y_view) = make_plane(device, width, height, plane_format, "yuv_y");
        let (u_plane, u_view) = make_plane(device, width, height, plane_format, "yuv_u");
        let (v_plane, v_view) = make_plane(device, width, height, plane_format, "yuv_v");

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("yuv bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture { multisampled: false, sample_type: wgpu::TextureSampleType::Float { filterable: true }, view_dimension: wgpu::TextureViewDimension::D2 },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
            ],
        });

        let params = YuvParams::for_bit_depth(bit_depth);
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("yuv params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("yuv vertex"),
            source: wgpu::ShaderSource::Wgsl(VERTEX_SOURCE.into()),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("yuv fragment"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("yuv pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("yuv pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("vs_main"),
                buffers: &[FullscreenQuad::vertex_buffer_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("fs_main"),
                targets: &[
                    Some(wgpu::ColorTargetState { format: plane_format, blend: None, write_mask: wgpu::ColorWrites::ALL }),
                    Some(wgpu::ColorTargetState { format: plane_format, blend: None, write_mask: wgpu::ColorWrites::ALL }),
                    Some(wgpu::ColorTargetState { format: plane_format, blend: None, write_mask: wgpu::ColorWrites::ALL }),
                ],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState { topology: wgpu::PrimitiveTopology::TriangleStrip, ..Default::default() },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let quad = FullscreenQuad::new(device);

        Ok(Self { pipeline, bind_group_layout, params_buffer, y_plane, u_plane, v_plane, y_view, u_view, v_view, quad, width, height, plane_format })
    }

    pub fn plane_format(&self) -> wgpu::TextureFormat {
        self.plane_format
    }

    pub fn convert(&self, device: &wgpu::Device, queue: &wgpu::Queue, source_view: &wgpu::TextureView, source_sampler: &wgpu::Sampler) -> Result<()> {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("yuv bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(source_view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(source_sampler) },
                wgpu::BindGroupEntry { binding: 2, resource: self.params_buffer.as_entire_binding() },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("yuv encoder") });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("yuv pass"),
                color_attachments: &[
                    Some(color_attachment(&self.y_view)),
                    Some(color_attachment(&self.u_view)),
                    Some(color_attachment(&self.v_view)),
                ],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            self.quad.draw(&mut render_pass);
        }
        queue.submit(Some(encoder.finish()));
        Ok(())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

fn color_attachment(view: &wgpu::TextureView) -> wgpu::RenderPassColorAttachment<'_> {
    wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations { load: wgpu::LoadOp::Clear(wgpu::Color::BLACK), store: wgpu::StoreOp::Store },
        depth_slice: None,
    }
}

fn make_plane(device: &wgpu::Device, width: u32, height: u32, format: wgpu::TextureFormat, label: &str) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_bit_params_match_tv_range() {
        let params = YuvParams::for_bit_depth(BitDepth::Eight);
        assert_eq!(params.y_offset, 16.0);
        assert_eq!(params.y_scale, 219.0);
    }

    #[test]
    fn ten_bit_uses_wider_plane_format() {
        assert_eq!(YuvParams::plane_format(BitDepth::Ten), wgpu::TextureFormat::R16Uint);
        assert_eq!(YuvParams::plane_format(BitDepth::Eight), wgpu::TextureFormat::R8Uint);
    }

    #[test]
    fn only_ten_and_twelve_bit_set_the_hdr_flag() {
        assert_eq!(YuvParams::for_bit_depth(BitDepth::Eight).hdr, 0.0);
        assert_eq!(YuvParams::for_bit_depth(BitDepth::Ten).hdr, 1.0);
        assert_eq!(YuvParams::for_bit_depth(BitDepth::Twelve).hdr, 1.0);
    }
}
