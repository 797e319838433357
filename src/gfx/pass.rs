//! `RenderPass` compilation (spec §4.1). A pass is immutable once compiled:
//! program, four channel slots, an optional buffer back-pointer, and a cached
//! uniform-variable table from the translator.

use crate::error::{EngineError, Result};
use crate::gfx::buffer::BufferId;
use crate::gfx::channel::{Channel, SamplerKind};
use crate::gfx::fullscreen::FullscreenQuad;
use crate::gfx::translator::{Dialect, ShaderStage, Translator, UniformMapping};
use crate::gfx::uniforms::Uniforms;
use std::collections::HashMap;

/// Preamble declaring the standard uniform block and the `iChannel0..3`
/// sampler/texture pairs, shaped by each resolved channel's sampler kind.
fn synthesize_preamble(channel_kinds: &[Option<SamplerKind>; 4]) -> String {
    let mut out = String::new();
    out.push_str(
        "struct StdUniforms {\n\
         \x20\x20resolution: vec3<f32>,\n\
         \x20\x20time: f32,\n\
         \x20\x20time_delta: f32,\n\
         \x20\x20frame_rate: f32,\n\
         \x20\x20frame: u32,\n\
         \x20\x20mouse: vec4<f32>,\n\
         \x20\x20date: vec4<f32>,\n\
         \x20\x20sample_rate: f32,\n\
         \x20\x20channel_time: vec4<f32>,\n\
         \x20\x20channel_resolution: array<vec4<f32>, 4>,\n\
         };\n\
         @group(0) @binding(0) var<uniform> iUniforms: StdUniforms;\n\n",
    );
    for (i, kind) in channel_kinds.iter().enumerate() {
        let ty = match kind {
            Some(SamplerKind::Sampler2D) | None => "texture_2d<f32>",
            Some(SamplerKind::Sampler3D) => "texture_3d<f32>",
            Some(SamplerKind::SamplerCube) => "texture_cube<f32>",
        };
        out.push_str(&format!(
            "@group(1) @binding({}) var iChannel{}: {};\n@group(1) @binding({}) var iChannel{}Sampler: sampler;\n",
            i * 2,
            i,
            ty,
            i * 2 + 1,
            i
        ));
    }
    out
}

fn synthesize_main_wrapper() -> &'static str {
    "\n@fragment\n\
     fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {\n\
     \x20\x20var fragColor: vec4<f32>;\n\
     \x20\x20let fragCoord = in.uv * iUniforms.resolution.xy;\n\
     \x20\x20mainImage(&fragColor, fragCoord);\n\
     \x20\x20return fragColor;\n\
     }\n"
}

pub struct RenderPass {
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub channels: [Option<Channel>; 4],
    /// `None` for the image pass; `Some` for a buffer pass, naming the
    /// Scene-owned buffer it writes to.
    pub writes_to: Option<BufferId>,
    pub uniform_table: HashMap<String, UniformMapping>,
}

impl RenderPass {
    #[allow(clippy::too_many_arguments)]
    pub fn compile(
        device: &wgpu::Device,
        translator: &dyn Translator,
        label: &str,
        common_source: &str,
        pass_source: &str,
        channels: [Option<Channel>; 4],
        writes_to: Option<BufferId>,
        target_format: wgpu::TextureFormat,
        vertex_module: &wgpu::ShaderModule,
    ) -> Result<Self> {
        let channel_kinds: [Option<SamplerKind>; 4] = [
            channels[0].as_ref().map(|c| c.sampler_kind()),
            channels[1].as_ref().map(|c| c.sampler_kind()),
            channels[2].as_ref().map(|c| c.sampler_kind()),
            channels[3].as_ref().map(|c| c.sampler_kind()),
        ];

        let mut full_source = synthesize_preamble(&channel_kinds);
        full_source.push_str(common_source);
        full_source.push('\n');
        full_source.push_str(pass_source);
        full_source.push_str(synthesize_main_wrapper());

        let translated = translator
            .translate(&full_source, ShaderStage::Fragment, Dialect::WebGl2, Dialect::Wgsl)
            .map_err(|reason| EngineError::Translation { pass: label.to_string(), reason })?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let fs_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} fragment")),
            source: wgpu::ShaderSource::Wgsl(translated.code.into()),
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(EngineError::CompileLink { pass: label.to_string(), reason: err.to_string() });
        }

        let bind_group_layout = Self::build_bind_group_layout(device, label, &channel_kinds);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("std uniform layout"),
            entries: &[crate::gfx::uniforms::UniformBinding::<Uniforms>::layout_entry(0)],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{label} pipeline layout")),
            bind_group_layouts: &[&uniform_layout, &bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{label} pipeline")),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: vertex_module,
                entry_point: Some("vs_main"),
                buffers: &[FullscreenQuad::vertex_buffer_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fs_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(RenderPass {
            pipeline,
            bind_group_layout,
            channels,
            writes_to,
            uniform_table: translated.variables,
        })
    }

    fn build_bind_group_layout(
        device: &wgpu::Device,
        label: &str,
        channel_kinds: &[Option<SamplerKind>; 4],
    ) -> wgpu::BindGroupLayout {
        let mut entries = Vec::with_capacity(8);
        for (i, kind) in channel_kinds.iter().enumerate() {
            let view_dimension = match kind {
                Some(SamplerKind::Sampler3D) => wgpu::TextureViewDimension::D3,
                Some(SamplerKind::SamplerCube) => wgpu::TextureViewDimension::Cube,
                _ => wgpu::TextureViewDimension::D2,
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: (i * 2) as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: (i * 2 + 1) as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{label} channel layout")),
            entries: &entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_declares_each_resolved_channel_kind() {
        let kinds = [Some(SamplerKind::Sampler2D), None, Some(SamplerKind::SamplerCube), Some(SamplerKind::Sampler3D)];
        let src = synthesize_preamble(&kinds);
        assert!(src.contains("texture_2d<f32>"));
        assert!(src.contains("texture_cube<f32>"));
        assert!(src.contains("texture_3d<f32>"));
        assert!(src.contains("iChannel0"));
        assert!(src.contains("iChannel3"));
    }
}
