//! Ping-pong buffer (spec §3 `Buffer`, §4.3), generalized from cuneus's
//! `MultiPassManager` (`src/compute/multipass.rs`), which already tracks an
//! independent write-side flag per named buffer and exposes
//! `get_read_texture`/`get_write_texture`/`mark_written`. Here each `Buffer`
//! is its own value (the Scene owns a `HashMap<BufferId, Buffer>`) rather
//! than one manager owning every buffer, since render passes in this engine
//! are fragment-shader draws into color attachments, not compute dispatches
//! into storage textures.

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferId {
    A,
    B,
    C,
    D,
}

impl BufferId {
    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'A' => Some(BufferId::A),
            'B' => Some(BufferId::B),
            'C' => Some(BufferId::C),
            'D' => Some(BufferId::D),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BufferId::A => "A",
            BufferId::B => "B",
            BufferId::C => "C",
            BufferId::D => "D",
        }
    }
}

struct Side {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

fn make_side(device: &wgpu::Device, width: u32, height: u32, format: wgpu::TextureFormat, label: &str) -> Side {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Side { texture, view }
}

/// Two (framebuffer, texture) pairs used alternately as read/write targets,
/// per the glossary's "Buffer (ping-pong)" definition.
///
/// Invariant: `read_index != write_index`, both in `{0, 1}`, at every point
/// in the buffer's lifetime (spec §8).
pub struct Buffer {
    sides: [Side; 2],
    read_index: usize,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    name: BufferId,
}

impl Buffer {
    pub fn new(device: &wgpu::Device, name: BufferId, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        let sides = [
            make_side(device, width, height, format, &format!("buffer_{}_0", name.as_str())),
            make_side(device, width, height, format, &format!("buffer_{}_1", name.as_str())),
        ];
        Self {
            sides,
            read_index: 0,
            format,
            width,
            height,
            name,
        }
    }

    pub fn name(&self) -> BufferId {
        self.name
    }

    pub fn resolution(&self) -> [f32; 3] {
        [self.width as f32, self.height as f32, 0.0]
    }

    fn write_index(&self) -> usize {
        1 - self.read_index
    }

    /// The texture downstream passes sample.
    pub fn read_view(&self) -> &wgpu::TextureView {
        &self.sides[self.read_index].view
    }

    /// The current render destination.
    pub fn write_view(&self) -> &wgpu::TextureView {
        &self.sides[self.write_index()].view
    }

    pub fn write_texture(&self) -> &wgpu::Texture {
        &self.sides[self.write_index()].texture
    }

    /// Atomically toggles `read_index`/`write_index`. Called once per frame
    /// in which this buffer is the target of a pass, after the pass's
    /// `UnbindForWriting` (spec §4.2 step 3, §4.9).
    pub fn swap(&mut self) {
        self.read_index = self.write_index();
    }

    /// Reallocates both textures at new dimensions. Per §4.3, buffer history
    /// is intentionally dropped on resize.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(EngineError::ResourceAlloc("buffer resize to zero dimension".into()));
        }
        self.width = width;
        self.height = height;
        self.sides = [
            make_side(device, width, height, self.format, &format!("buffer_{}_0", self.name.as_str())),
            make_side(device, width, height, self.format, &format!("buffer_{}_1", self.name.as_str())),
        ];
        self.read_index = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_device() -> (wgpu::Device, wgpu::Queue) {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
            .expect("no adapter available for test");
        pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default())).expect("no device")
    }

    #[test]
    fn swap_flips_read_and_write() {
        let (device, _queue) = test_device();
        let mut buf = Buffer::new(&device, BufferId::A, 4, 4, wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(buf.read_index, 0);
        let write_before = buf.write_index();
        buf.swap();
        assert_eq!(buf.read_index, write_before);
        // read_index and write_index are always the two distinct values {0, 1}.
        assert_ne!(buf.read_index, buf.write_index());
    }

    #[test]
    fn double_swap_returns_to_original_read_side() {
        let (device, _queue) = test_device();
        let mut buf = Buffer::new(&device, BufferId::A, 4, 4, wgpu::TextureFormat::Rgba8Unorm);
        let original = buf.read_index;
        buf.swap();
        buf.swap();
        assert_eq!(buf.read_index, original);
    }

    #[test]
    fn resize_rejects_zero_dimension() {
        let (device, _queue) = test_device();
        let mut buf = Buffer::new(&device, BufferId::A, 4, 4, wgpu::TextureFormat::Rgba8Unorm);
        assert!(buf.resize(&device, 0, 4).is_err());
    }
}
