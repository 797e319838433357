//! Process-wide GPU lifecycle, generalized from cuneus's `Core` (device,
//! queue, surface, window size) to also support a headless variant used by
//! record/stream capture, which never creates a window surface.
//!
//! Per the DESIGN NOTES' "global state" guidance, `wgpu` initialization
//! (instance + adapter selection) happens once, on the main thread, before
//! any other GL/GPU object is created; `GraphicsContext` is then handed to
//! every consumer by reference.

use anyhow::{Context as _, Result};
use std::sync::Arc;

/// Shared device/queue/adapter handle. A second, independently-requested
/// `wgpu::Device` from the same `adapter` is what the sound-shader thread
/// uses as its "shared" context (see `sound_shader`); `wgpu` has no literal
/// GL-style shared-context object, so sharing the adapter is the closest
/// analog, as recorded in DESIGN.md.
pub struct GraphicsContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GraphicsContext {
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("no suitable GPU adapter found")?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("shaderrunner device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .context("failed to request wgpu device")?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Requests a second device from the same adapter for use by a thread
    /// that must not touch the main thread's device (spec §5: GL contexts are
    /// not shareable across threads).
    pub fn secondary_device(&self) -> Result<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(self.adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("shaderrunner secondary device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .context("failed to request secondary wgpu device")
    }
}

/// Windowed presentation target, held separately from `GraphicsContext` so
/// headless capture runs never construct one.
pub struct PresentationSurface {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
    pub size: winit::dpi::PhysicalSize<u32>,
}

impl PresentationSurface {
    pub fn new(ctx: &GraphicsContext, window: Arc<winit::window::Window>) -> Result<Self> {
        let size = window.inner_size();
        let surface = ctx
            .instance
            .create_surface(window)
            .context("failed to create window surface")?;
        let caps = surface.get_capabilities(&ctx.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(caps.formats[0]);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&ctx.device, &config);
        Ok(Self { surface, config, size })
    }

    pub fn resize(&mut self, ctx: &GraphicsContext, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&ctx.device, &self.config);
    }
}
