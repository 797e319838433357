//! The channel sum type (spec §3, §4.1, DESIGN NOTES "polymorphic channels").
//!
//! Modeled as an `enum`, not a trait object hierarchy, per the DESIGN NOTES'
//! explicit "avoid inheritance; compose" guidance. Every variant answers the
//! same four questions (`sampler_kind`, `resolution`, `texture_view`,
//! `update`) through inherent methods on `Channel` rather than a trait, since
//! an `enum match` is simpler here than a vtable for five known variants.

use crate::audio::bus::SharedAudioBuffer;
use crate::error::Result;
use crate::fft::FftChannel;
use crate::gfx::buffer::BufferId;
use crate::gfx::uniforms::Uniforms;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerKind {
    Sampler2D,
    Sampler3D,
    SamplerCube,
}

/// A single static GPU texture (from a fetched image asset).
pub struct Texture2DChannel {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub resolution: [f32; 3],
}

/// A single 3D volume texture built from a parsed `VolumeBlob`.
pub struct Volume3DChannel {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub resolution: [f32; 3],
}

/// Six faces composed into one cubemap texture.
pub struct CubemapChannel {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub resolution: [f32; 3],
}

/// A non-owning reference to a Scene-owned `Buffer`, resolved by name.
#[derive(Debug, Clone, Copy)]
pub struct BufferRefChannel {
    pub buffer: BufferId,
    pub resolution: [f32; 3],
}

/// The FFT/waveform texture, refreshed every frame from the Audio Bus.
pub struct AudioChannel {
    pub fft: FftChannel,
    pub bus: Arc<SharedAudioBuffer>,
}

pub enum Channel {
    Texture2D(Texture2DChannel),
    Volume3D(Volume3DChannel),
    Cubemap(CubemapChannel),
    BufferRef(BufferRefChannel),
    Audio(AudioChannel),
}

impl Channel {
    pub fn sampler_kind(&self) -> SamplerKind {
        match self {
            Channel::Texture2D(_) | Channel::BufferRef(_) | Channel::Audio(_) => SamplerKind::Sampler2D,
            Channel::Volume3D(_) => SamplerKind::Sampler3D,
            Channel::Cubemap(_) => SamplerKind::SamplerCube,
        }
    }

    pub fn resolution(&self, resolve_buffer: impl Fn(BufferId) -> [f32; 3]) -> [f32; 3] {
        match self {
            Channel::Texture2D(c) => c.resolution,
            Channel::Volume3D(c) => c.resolution,
            Channel::Cubemap(c) => c.resolution,
            Channel::BufferRef(c) => resolve_buffer(c.buffer),
            Channel::Audio(_) => [512.0, 2.0, 0.0],
        }
    }

    /// Per-frame update hook. Only the Audio channel does anything here; the
    /// others are static after construction (Texture2D/Volume3D/Cubemap) or
    /// resolved indirectly through the Scene's buffer table (BufferRef).
    pub fn update(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, _uniforms: &Uniforms) -> Result<()> {
        if let Channel::Audio(audio) = self {
            audio.fft.tick(device, queue, &audio.bus)?;
        }
        Ok(())
    }

    /// Releases GPU resources owned by this channel. `BufferRef` is
    /// intentionally a no-op: the buffer it points to is owned by the Scene,
    /// per §4.1's destruction-order invariant ("channel resources (non-buffer
    /// channels only—buffers are owned by the Scene)").
    pub fn destroy(self) {
        // Dropping `self` releases wgpu handles for every owning variant;
        // `BufferRef` and `Audio` (whose bus is an `Arc`) never owned the
        // buffer/bus exclusively, so nothing extra is needed here.
    }
}
