//! Frame Scheduler (spec §4.2, §4.9). Owns per-frame timing, builds the
//! standard `Uniforms` record, drives buffer passes then the image pass in
//! order, and (in capture modes) the YUV pass, readback issue, and the
//! record/stream pacing state machine.

use crate::audio::bus::AudioBus;
use crate::config::RunMode;
use crate::error::Result;
use crate::gfx::scene::Scene;
use crate::gfx::uniforms::{current_date_uniform, Uniforms};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Prewarming,
    Rendering,
    Eof,
    EncoderDone,
}

/// Shadertoy-convention mouse uniform: `(x, flippedY, clickX, flippedClickY)`,
/// click components negated while the button is not pressed (spec §4.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct MouseState {
    pub x: f32,
    pub y: f32,
    pub click_x: f32,
    pub click_y: f32,
    pub pressed: bool,
}

impl MouseState {
    pub fn to_uniform(self, viewport_height: f32) -> [f32; 4] {
        let flipped_y = viewport_height - self.y;
        let flipped_click_y = viewport_height - self.click_y;
        if self.pressed {
            [self.x, flipped_y, self.click_x, flipped_click_y]
        } else {
            [self.x, flipped_y, -self.click_x, -flipped_click_y]
        }
    }
}

pub struct FrameScheduler {
    mode: RunMode,
    fps: u32,
    duration: Option<f32>,
    frame_index: u64,
    start: Instant,
    last_tick: Instant,
    last_time_delta: f32,
    pub capture_state: CaptureState,
    prewarm_frames_remaining: u32,
}

impl FrameScheduler {
    pub fn new(mode: RunMode, fps: u32, duration: Option<f32>, prewarm: bool) -> Self {
        let now = Instant::now();
        Self {
            mode,
            fps,
            duration,
            frame_index: 0,
            start: now,
            last_tick: now,
            last_time_delta: 1.0 / fps as f32,
            capture_state: if prewarm && mode != RunMode::Live { CaptureState::Prewarming } else { CaptureState::Rendering },
            prewarm_frames_remaining: if prewarm { fps } else { 0 },
        }
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Total frames to render in record mode; `None` for live/stream, which
    /// run until cancelled.
    pub fn total_frames(&self) -> Option<u64> {
        match self.mode {
            RunMode::Record => self.duration.map(|d| (d * self.fps as f32).round() as u64),
            _ => None,
        }
    }

    /// Builds the per-frame `Uniforms` record (spec §4.2 step 2).
    pub fn build_uniforms(&mut self, width: u32, height: u32, mouse: MouseState, sample_rate: u32, channel_resolution: [[f32; 4]; 4], channel_time: [f32; 4]) -> Uniforms {
        let now = Instant::now();
        let (time, time_delta) = match self.mode {
            RunMode::Live => {
                let time = now.duration_since(self.start).as_secs_f32();
                let delta = now.duration_since(self.last_tick).as_secs_f32();
                (time, delta)
            }
            RunMode::Record | RunMode::Stream => {
                let time = self.frame_index as f32 / self.fps as f32;
                (time, 1.0 / self.fps as f32)
            }
        };
        self.last_tick = now;
        self.last_time_delta = time_delta;

        let frame_rate = if time_delta > 1e-6 { (1.0 / time_delta).clamp(1.0, 1000.0) } else { self.fps as f32 };

        Uniforms {
            resolution: [width as f32, height as f32, 1.0],
            time,
            time_delta,
            frame_rate,
            frame: self.frame_index as u32,
            _pad0: 0,
            mouse: mouse.to_uniform(height as f32),
            date: current_date_uniform(),
            sample_rate: sample_rate as f32,
            _pad1: [0.0; 3],
            channel_time,
            channel_resolution,
        }
    }

    /// In record mode, blocks the Audio Bus until it has produced at least
    /// `ceil(frame_index * sample_rate / fps)` samples (spec §4.8, §5).
    pub fn sync_audio_for_frame(&self, bus: &dyn AudioBus) {
        if self.mode != RunMode::Record {
            return;
        }
        let sample_rate = bus.sample_rate() as u64;
        let required = (self.frame_index * sample_rate).div_ceil(self.fps as u64);
        bus.decode_until_sample(required);
    }

    /// Draws every buffer pass in canonical A, B, C, D order into its
    /// buffer's write side, then swaps (spec §4.2 step 3; ordering guarantee
    /// in §5: "buffer passes execute strictly before the image pass").
    pub fn render_buffer_passes(&self, device: &wgpu::Device, queue: &wgpu::Queue, scene: &mut Scene, uniform_binding: &crate::gfx::uniforms::UniformBinding<Uniforms>) -> Result<()> {
        for (id, pass) in &scene.buffer_passes {
            let write_view = scene.buffers.get(id).expect("buffer pass targets a declared buffer").write_view();
            draw_into(device, queue, pass, &scene.quad, &scene.buffers, uniform_binding, write_view);
        }
        for (id, _) in &scene.buffer_passes {
            if let Some(buffer) = scene.buffers.get_mut(id) {
                buffer.swap();
            }
        }
        Ok(())
    }

    /// Draws the image pass into an arbitrary destination view — the
    /// interactive primary offscreen FBO or the capture pipeline's YUV-pass
    /// input, per spec §4.2 step 4.
    pub fn render_image_pass(&self, device: &wgpu::Device, queue: &wgpu::Queue, scene: &Scene, uniform_binding: &crate::gfx::uniforms::UniformBinding<Uniforms>, destination: &wgpu::TextureView) -> Result<()> {
        draw_into(device, queue, &scene.image_pass, &scene.quad, &scene.buffers, uniform_binding, destination);
        Ok(())
    }

    /// Advances timing state and, in capture modes, the prewarm/rendering
    /// state machine. Call once per tick, after rendering.
    pub fn advance(&mut self) {
        match self.capture_state {
            CaptureState::Prewarming => {
                self.prewarm_frames_remaining = self.prewarm_frames_remaining.saturating_sub(1);
                if self.prewarm_frames_remaining == 0 {
                    self.capture_state = CaptureState::Rendering;
                }
            }
            CaptureState::Rendering => {
                self.frame_index += 1;
                if let Some(total) = self.total_frames() {
                    if self.frame_index >= total {
                        self.capture_state = CaptureState::Eof;
                    }
                }
            }
            CaptureState::Eof => self.capture_state = CaptureState::EncoderDone,
            CaptureState::EncoderDone => {}
        }
    }

    /// `frameIndex` as presentation timestamp in record mode (spec §4.6).
    pub fn pts(&self) -> u64 {
        self.frame_index
    }

    /// Stream-mode pacing (spec §4.6): how many frames the real-time clock
    /// says should have rendered by now.
    pub fn stream_should_have_rendered(&self) -> u64 {
        let elapsed = Instant::now().duration_since(self.start).as_secs_f32();
        (elapsed * self.fps as f32).floor() as u64
    }
}

/// Builds the per-frame channel bind group and issues the fullscreen draw
/// into `destination` (spec §4.2 step 3: "bind the four channels' textures
/// with the correct sampler target. Draw the fullscreen quad").
fn draw_into(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    pass: &crate::gfx::pass::RenderPass,
    quad: &crate::gfx::fullscreen::FullscreenQuad,
    buffers: &std::collections::HashMap<crate::gfx::buffer::BufferId, crate::gfx::buffer::Buffer>,
    uniform_binding: &crate::gfx::uniforms::UniformBinding<Uniforms>,
    destination: &wgpu::TextureView,
) {
    uniform_binding.update(queue);

    let mut entries = Vec::with_capacity(8);
    let fallback_sampler = device.create_sampler(&wgpu::SamplerDescriptor::default());
    let fallback_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("channel fallback"),
        size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let default_view = fallback_texture.create_view(&wgpu::TextureViewDescriptor::default());
    let default_sampler = &fallback_sampler;

    for (i, channel) in pass.channels.iter().enumerate() {
        let (view, sampler) = channel_binding(channel, buffers, &default_view, default_sampler);
        entries.push(wgpu::BindGroupEntry { binding: (i * 2) as u32, resource: wgpu::BindingResource::TextureView(view) });
        entries.push(wgpu::BindGroupEntry { binding: (i * 2 + 1) as u32, resource: wgpu::BindingResource::Sampler(sampler) });
    }
    let channel_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("pass channel bind group"),
        layout: &pass.bind_group_layout,
        entries: &entries,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("pass encoder") });
    {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("fullscreen pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: destination,
                resolve_target: None,
                ops: wgpu::Operations { load: wgpu::LoadOp::Clear(wgpu::Color::BLACK), store: wgpu::StoreOp::Store },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(&pass.pipeline);
        render_pass.set_bind_group(0, &uniform_binding.bind_group, &[]);
        render_pass.set_bind_group(1, &channel_bind_group, &[]);
        quad.draw(&mut render_pass);
    }
    queue.submit(Some(encoder.finish()));
}

fn channel_binding<'a>(
    channel: &'a Option<crate::gfx::channel::Channel>,
    buffers: &'a std::collections::HashMap<crate::gfx::buffer::BufferId, crate::gfx::buffer::Buffer>,
    default_view: &'a wgpu::TextureView,
    default_sampler: &'a wgpu::Sampler,
) -> (&'a wgpu::TextureView, &'a wgpu::Sampler) {
    use crate::gfx::channel::Channel;
    match channel {
        None => (default_view, default_sampler),
        Some(Channel::Texture2D(c)) => (&c.view, &c.sampler),
        Some(Channel::Volume3D(c)) => (&c.view, &c.sampler),
        Some(Channel::Cubemap(c)) => (&c.view, &c.sampler),
        Some(Channel::Audio(c)) => (c.fft.view(), c.fft.sampler()),
        Some(Channel::BufferRef(c)) => match buffers.get(&c.buffer) {
            Some(buffer) => (buffer.read_view(), default_sampler),
            None => (default_view, default_sampler),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn record_mode_time_is_frame_index_over_fps() {
        let mut sched = FrameScheduler::new(RunMode::Record, 30, Some(2.0), false);
        sched.advance();
        sched.advance();
        let u = sched.build_uniforms(4, 4, MouseState::default(), 44_100, [[0.0; 4]; 4], [0.0; 4]);
        assert_abs_diff_eq!(u.time, 2.0 / 30.0, epsilon = 1e-6);
        assert_abs_diff_eq!(u.time_delta, 1.0 / 30.0, epsilon = 1e-6);
    }

    #[test]
    fn required_sample_count_rounds_up() {
        let sched = FrameScheduler::new(RunMode::Record, 60, Some(1.0), false);
        // frame_index = 0 requires 0 samples regardless of sample rate.
        let required = (sched.frame_index() * 44_100u64).div_ceil(60);
        assert_eq!(required, 0);
    }

    #[test]
    fn total_frames_matches_duration_times_fps() {
        let sched = FrameScheduler::new(RunMode::Record, 24, Some(2.5), false);
        assert_eq!(sched.total_frames(), Some(60));
    }

    #[test]
    fn reaches_eof_after_total_frames() {
        let mut sched = FrameScheduler::new(RunMode::Record, 10, Some(0.3), false);
        for _ in 0..3 {
            sched.advance();
        }
        assert_eq!(sched.capture_state, CaptureState::Eof);
    }

    #[test]
    fn mouse_uniform_negates_click_components_while_not_pressed() {
        let mouse = MouseState { x: 10.0, y: 20.0, click_x: 5.0, click_y: 5.0, pressed: false };
        let u = mouse.to_uniform(100.0);
        assert_eq!(u, [10.0, 80.0, -5.0, -95.0]);
    }

    #[test]
    fn prewarm_transitions_to_rendering_after_n_frames() {
        let mut sched = FrameScheduler::new(RunMode::Record, 5, Some(1.0), true);
        assert_eq!(sched.capture_state, CaptureState::Prewarming);
        for _ in 0..5 {
            sched.advance();
        }
        assert_eq!(sched.capture_state, CaptureState::Rendering);
        assert_eq!(sched.frame_index(), 0);
    }
}
