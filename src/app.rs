//! Top-level orchestration (spec §4.9, §5): wires the Graphics Context, Scene,
//! Frame Scheduler, Audio Bus, and (in capture modes) the Sound Shader
//! Renderer and capture pipeline together, and drives the run loop for each
//! `RunMode`.

use crate::audio::bus::{AudioBus, SharedAudioBuffer};
use crate::audio::file::FileAudioBus;
use crate::audio::live::LiveAudioBus;
use crate::audio::silent::SilentBus;
use crate::audio::synth::SynthAudioBus;
use crate::capture::encoder::{create_control_fifo, EncoderSink, PixelFormat, ShmHeader};
use crate::capture::readback::ReadbackRing;
use crate::capture::yuv::YuvPass;
use crate::config::{AudioSource, BitDepth, Config, RunMode};
use crate::error::{EngineError, Result};
use crate::gfx::blit::BlitPass;
use crate::gfx::context::{GraphicsContext, PresentationSurface};
use crate::gfx::scene::Scene;
use crate::gfx::translator::{PassthroughTranslator, Translator};
use crate::gfx::uniforms::{UniformBinding, Uniforms};
use crate::media::fs::FsMediaSource;
use crate::media::MediaSource;
use crate::scheduler::{CaptureState, FrameScheduler, MouseState};
use crate::sound_shader::SoundRendererHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::WindowId;

const SOUND_SAMPLE_RATE: u32 = 44_100;

/// Single cancel flag observed by the render loop, the sound-shader thread,
/// and (implicitly, via channel closure) the encoder sidecar.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn inner(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

struct CapturePipeline {
    yuv: YuvPass,
    readback: ReadbackRing,
    sink: EncoderSink,
}

struct SoundThread {
    join: std::thread::JoinHandle<()>,
    handle: Arc<SoundRendererHandle>,
    cancel: CancelToken,
}

pub struct App {
    ctx: GraphicsContext,
    scene: Scene,
    scheduler: FrameScheduler,
    audio: Arc<dyn AudioBus>,
    uniform_binding: UniformBinding<Uniforms>,
    capture: Option<CapturePipeline>,
    sound_thread: Option<SoundThread>,
    mouse: MouseState,
    cancel: CancelToken,
    width: u32,
    height: u32,
}

/// Render-target/scene format for the configured bit depth (spec §4.4): HDR
/// capture (10/12-bit) renders float-linear so the YUV pass's BT.709
/// transfer function has linear light to work from; 8-bit renders directly
/// in its display-encoded form.
fn output_format_for_bit_depth(bit_depth: BitDepth) -> wgpu::TextureFormat {
    if bit_depth.is_hdr() {
        wgpu::TextureFormat::Rgba16Float
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    }
}

impl App {
    /// Builds every collaborator and compiles the Scene (spec §4.1). Record
    /// and Stream modes additionally stand up the YUV pass, readback ring,
    /// and encoder sink (spec §4.6).
    pub fn new(config: &Config, cancel: CancelToken) -> Result<Self> {
        let ctx = GraphicsContext::new().map_err(|e| EngineError::ResourceAlloc(format!("{e:#}")))?;
        let translator: Arc<dyn Translator + Send + Sync> = Arc::new(PassthroughTranslator);
        let media = FsMediaSource::new(&config.media_root);
        let def = media.fetch_shader(&config.shader_id)?;

        let (audio, shared_buffer, sound_thread) = build_audio(&ctx, translator.clone(), &def, config)?;
        audio.start()?;

        let output_format = output_format_for_bit_depth(config.bit_depth);
        let scene = Scene::compile(&ctx, translator.as_ref(), &media, &def, config.width, config.height, output_format, shared_buffer)?;
        if scene.data_incomplete {
            log::warn!("shader '{}' compiled with one or more unresolved channels", config.shader_id);
        }

        let uniform_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("std uniform layout"),
            entries: &[UniformBinding::<Uniforms>::layout_entry(0)],
        });
        let uniform_binding = UniformBinding::new(&ctx.device, "frame uniforms", Uniforms::zeroed(), &uniform_layout, 0);

        let capture = match config.mode {
            RunMode::Record | RunMode::Stream => Some(build_capture_pipeline(&ctx, config)?),
            RunMode::Live => None,
        };

        let scheduler = FrameScheduler::new(config.mode, config.fps, config.duration, config.prewarm);

        Ok(Self {
            ctx,
            scene,
            scheduler,
            audio,
            uniform_binding,
            capture,
            sound_thread,
            mouse: MouseState::default(),
            cancel,
            width: config.width,
            height: config.height,
        })
    }

    pub fn mouse_mut(&mut self) -> &mut MouseState {
        &mut self.mouse
    }

    pub fn sound_renderer_state(&self) -> Option<crate::sound_shader::SoundRendererState> {
        self.sound_thread.as_ref().map(|s| s.handle.state())
    }

    /// Runs Record or Stream mode to completion (spec §4.9 capture-mode order:
    /// prewarm, then per-frame sync/render/convert/readback/send, then EOF).
    pub fn run_headless(&mut self) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.scheduler.capture_state {
                CaptureState::Prewarming => {
                    self.render_one_frame(false)?;
                    self.scheduler.advance();
                }
                CaptureState::Rendering => {
                    self.render_one_frame(true)?;
                    self.scheduler.advance();
                }
                CaptureState::Eof => {
                    if let Some(capture) = self.capture.as_mut() {
                        capture.sink.send_eof()?;
                    }
                    self.scheduler.advance();
                }
                CaptureState::EncoderDone => break,
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Renders one frame and presents it to a window surface (`Live` mode);
    /// does not touch the capture pipeline.
    pub fn render_and_present(&mut self, blit: &BlitPass, destination: &wgpu::TextureView) -> Result<()> {
        self.render_one_frame(false)?;
        blit.draw(&self.ctx.device, &self.ctx.queue, self.scene.image_output.read_view(), destination);
        Ok(())
    }

    pub fn graphics_context(&self) -> &GraphicsContext {
        &self.ctx
    }

    /// Draws one frame: buffer passes, image pass, then (in capture modes)
    /// YUV conversion, ring readback, and the framed send to the encoder.
    fn render_one_frame(&mut self, captured: bool) -> Result<()> {
        self.scheduler.sync_audio_for_frame(self.audio.as_ref());

        let buffers = &self.scene.buffers;
        let mut channel_resolution = [[0.0f32; 4]; 4];
        let mut channel_active = [false; 4];
        for (i, channel) in self.scene.image_pass.channels.iter().enumerate() {
            if let Some(channel) = channel {
                let [x, y, z] = channel.resolution(|id| buffers.get(&id).map(|b| b.resolution()).unwrap_or_default());
                channel_resolution[i] = [x, y, z, 0.0];
                channel_active[i] = true;
            }
        }
        let prev_time = self.uniform_binding.data.time;
        let channel_time = channel_active.map(|active| if active { prev_time } else { 0.0 });

        self.uniform_binding.data = self
            .scheduler
            .build_uniforms(self.width, self.height, self.mouse, self.audio.sample_rate(), channel_resolution, channel_time);

        for channel in self.scene.image_pass.channels.iter_mut().flatten() {
            channel.update(&self.ctx.device, &self.ctx.queue, &self.uniform_binding.data)?;
        }
        for (_, pass) in self.scene.buffer_passes.iter_mut() {
            for channel in pass.channels.iter_mut().flatten() {
                channel.update(&self.ctx.device, &self.ctx.queue, &self.uniform_binding.data)?;
            }
        }

        self.scheduler.render_buffer_passes(&self.ctx.device, &self.ctx.queue, &mut self.scene, &self.uniform_binding)?;
        let image_view = self.scene.image_output.write_view();
        self.scheduler.render_image_pass(&self.ctx.device, &self.ctx.queue, &self.scene, &self.uniform_binding, image_view)?;
        self.scene.image_output.swap();

        if captured {
            self.encode_current_frame()?;
        }
        Ok(())
    }

    fn encode_current_frame(&mut self) -> Result<()> {
        let Some(capture) = self.capture.as_mut() else { return Ok(()) };
        let device = &self.ctx.device;
        let queue = &self.ctx.queue;

        let fallback_sampler = device.create_sampler(&wgpu::SamplerDescriptor::default());
        capture.yuv.convert(device, queue, self.scene.image_output.read_view(), &fallback_sampler)?;
        capture
            .readback
            .issue(device, queue, [&capture.yuv.y_plane, &capture.yuv.u_plane, &capture.yuv.v_plane]);

        let y = capture.readback.map_previous(device, 0)?;
        let u = capture.readback.map_previous(device, 1)?;
        let v = capture.readback.map_previous(device, 2)?;
        capture.readback.advance();

        if let (Some(y), Some(u), Some(v)) = (y, u, v) {
            capture.sink.send_frame(&y.data, &u.data, &v.data, self.scheduler.pts())?;
        }
        Ok(())
    }

    /// Signals cancellation to the sound-shader thread, joins it, and closes
    /// the encoder sink (EOF is emitted by the caller before this, once, per
    /// spec §4.6).
    fn shutdown(&mut self) {
        self.audio.stop();
        if let Some(sound) = self.sound_thread.take() {
            sound.cancel.cancel();
            let _ = sound.join.join();
        }
    }
}

fn build_audio(
    ctx: &GraphicsContext,
    translator: Arc<dyn Translator + Send + Sync>,
    def: &crate::shaderdef::ShaderDefinition,
    config: &Config,
) -> Result<(Arc<dyn AudioBus>, Arc<SharedAudioBuffer>, Option<SoundThread>)> {
    match &config.audio_source {
        AudioSource::LiveDevice => {
            let bus = LiveAudioBus::new()?;
            let shared = bus.buffer_handle();
            Ok((Arc::new(bus) as Arc<dyn AudioBus>, shared, None))
        }
        AudioSource::File { path } => {
            let bus = FileAudioBus::new(path)?;
            let shared = bus.buffer_handle();
            Ok((Arc::new(bus) as Arc<dyn AudioBus>, shared, None))
        }
        AudioSource::Silent => {
            let bus = SilentBus::new(SOUND_SAMPLE_RATE);
            let shared = bus.buffer_handle();
            Ok((Arc::new(bus) as Arc<dyn AudioBus>, shared, None))
        }
        AudioSource::Shader => {
            let sound_pass = def
                .sound_pass()
                .ok_or_else(|| EngineError::Config("audioSource=shader but shader definition has no sound pass".into()))?;
            let (sender, receiver) = crossbeam_channel::bounded(4);
            let sound_cancel = CancelToken::new();
            let (join, handle) = crate::sound_shader::spawn(
                ctx,
                translator,
                def.common_source().to_string(),
                sound_pass.code.clone(),
                SOUND_SAMPLE_RATE,
                sender,
                sound_cancel.inner(),
            )?;
            let bus = SynthAudioBus::new(receiver, SOUND_SAMPLE_RATE);
            let shared = bus.buffer_handle();
            Ok((Arc::new(bus) as Arc<dyn AudioBus>, shared, Some(SoundThread { join, handle, cancel: sound_cancel })))
        }
    }
}

/// Drives `RunMode::Live`: opens a window, blits the compiled Scene's image
/// pass to it every frame, and forwards mouse input to the `App`'s uniforms.
/// `cuneus`'s own windowed loop (`ShaderApp::run`) isn't part of the
/// retrieval pack; the winit 0.30 `ApplicationHandler` wiring below follows
/// the shape used elsewhere in the corpus for exactly this kind of
/// resumed/window_event/about_to_wait loop.
pub fn run_interactive(app: App, title: &str) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|e| EngineError::ResourceAlloc(format!("creating event loop: {e}")))?;
    let mut runner = LiveRunner { app, title: title.to_string(), window: None, surface: None, blit: None };
    event_loop
        .run_app(&mut runner)
        .map_err(|e| EngineError::ResourceAlloc(format!("event loop exited with error: {e}")))
}

struct LiveRunner {
    app: App,
    title: String,
    window: Option<Arc<winit::window::Window>>,
    surface: Option<PresentationSurface>,
    blit: Option<BlitPass>,
}

impl ApplicationHandler for LiveRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = winit::window::Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(self.app.width, self.app.height));
        let window = match event_loop.create_window(attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };
        let ctx = self.app.graphics_context();
        let surface = match PresentationSurface::new(ctx, window.clone()) {
            Ok(s) => s,
            Err(e) => {
                log::error!("failed to create window surface: {e:#}");
                event_loop.exit();
                return;
            }
        };
        let blit = match BlitPass::new(&ctx.device, surface.config.format) {
            Ok(b) => b,
            Err(e) => {
                log::error!("failed to build blit pass: {e}");
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window);
        self.surface = Some(surface);
        self.blit = Some(blit);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(surface) = self.surface.as_mut() {
                    surface.resize(self.app.graphics_context(), size);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let mouse = self.app.mouse_mut();
                mouse.x = position.x as f32;
                mouse.y = position.y as f32;
            }
            WindowEvent::MouseInput { state, button: winit::event::MouseButton::Left, .. } => {
                let mouse = self.app.mouse_mut();
                mouse.pressed = state == winit::event::ElementState::Pressed;
                if mouse.pressed {
                    mouse.click_x = mouse.x;
                    mouse.click_y = mouse.y;
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl LiveRunner {
    fn redraw(&mut self) {
        let (Some(surface), Some(blit)) = (self.surface.as_ref(), self.blit.as_ref()) else { return };
        let frame = match surface.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("dropped frame: {e}");
                return;
            }
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        if let Err(e) = self.app.render_and_present(blit, &view) {
            log::error!("render error: {e}");
        }
        frame.present();
    }
}

fn build_capture_pipeline(ctx: &GraphicsContext, config: &Config) -> Result<CapturePipeline> {
    let yuv = YuvPass::new(&ctx.device, config.width, config.height, config.bit_depth)?;
    let readback = ReadbackRing::new(&ctx.device, config.width, config.height, yuv.plane_format(), config.num_pbos)?;

    let run_dir = std::env::temp_dir().join(format!("shaderrunner_{}", config.shader_id));
    std::fs::create_dir_all(&run_dir).map_err(|e| EngineError::EncoderPipe(format!("creating {run_dir:?}: {e}")))?;
    let shm_path = run_dir.join("frames.shm");
    let control_path = run_dir.join("control.fifo");
    create_control_fifo(&control_path)?;

    let pixel_format = match config.bit_depth {
        BitDepth::Eight => PixelFormat::Yuv444P8,
        BitDepth::Ten | BitDepth::Twelve => PixelFormat::Yuv444P10Le,
    };
    let header = ShmHeader { shm_name: shm_path.display().to_string(), width: config.width, height: config.height, fps: config.fps, pixel_format };
    let sink = EncoderSink::new(&shm_path, &control_path, header, config.bit_depth.bytes_per_sample())?;

    Ok(CapturePipeline { yuv, readback, sink })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_starts_uncancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_token_cancel_is_observed_through_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn output_format_is_float_linear_only_for_hdr_bit_depths() {
        assert_eq!(output_format_for_bit_depth(BitDepth::Eight), wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(output_format_for_bit_depth(BitDepth::Ten), wgpu::TextureFormat::Rgba16Float);
        assert_eq!(output_format_for_bit_depth(BitDepth::Twelve), wgpu::TextureFormat::Rgba16Float);
    }
}
