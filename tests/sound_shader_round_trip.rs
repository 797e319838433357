//! End-to-end sound-shader smoke test: a `mainSound`-equivalent fragment
//! program emitting a pure 440 Hz tone, decoded back through the real
//! Shadertoy pixel encoding, should show its energy at the expected FFT bin.

use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;
use shaderrunner::gfx::context::GraphicsContext;
use shaderrunner::gfx::translator::{PassthroughTranslator, Translator};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const SAMPLE_RATE: u32 = 44_100;
const TONE_HZ: f32 = 440.0;
const FFT_SIZE: usize = 8192;

const SOUND_SOURCE: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

struct SoundUniforms {
    time_offset: f32,
    sample_offset: f32,
    sample_rate: f32,
    _pad: f32,
};

@group(0) @binding(0) var<uniform> su: SoundUniforms;

fn encode_channel(x: f32) -> vec2<f32> {
    let clamped = clamp(x, -1.0, 1.0);
    let raw = u32(round((clamped * 0.5 + 0.5) * 65535.0));
    let low = f32(raw % 256u) / 255.0;
    let high = f32(raw / 256u) / 255.0;
    return vec2<f32>(low, high);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let col = floor(in.uv.x * 512.0);
    let row = floor(in.uv.y * 512.0);
    let sample_index = row * 512.0 + col;
    let t = su.time_offset + sample_index / su.sample_rate;
    let s = sin(6.283185307 * 440.0 * t);
    let left = encode_channel(s);
    let right = encode_channel(s);
    return vec4<f32>(left.x, left.y, right.x, right.y);
}
"#;

#[test]
fn tone_shader_peaks_near_its_own_frequency_after_decode() -> Result<(), Box<dyn std::error::Error>> {
    let Ok(ctx) = GraphicsContext::new() else {
        eprintln!("skipping: no GPU adapter available in this environment");
        return Ok(());
    };

    let translator: Arc<dyn Translator + Send + Sync> = Arc::new(PassthroughTranslator);
    let (sender, receiver) = crossbeam_channel::bounded(4);
    let cancel = Arc::new(AtomicBool::new(false));

    let (join, _handle) = shaderrunner::sound_shader::spawn(&ctx, translator, String::new(), SOUND_SOURCE.to_string(), SAMPLE_RATE, sender, cancel.clone())?;

    let block = receiver.recv().expect("sound thread produced at least one block before exiting");
    cancel.store(true, std::sync::atomic::Ordering::SeqCst);
    drop(receiver);
    let _ = join.join();

    let left: Vec<f32> = block.samples.chunks(2).map(|lr| lr[0]).take(FFT_SIZE).collect();
    assert_eq!(left.len(), FFT_SIZE);

    let mut buf: Vec<Complex32> = left.iter().map(|s| Complex32::new(*s, 0.0)).collect();
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FFT_SIZE);
    fft.process(&mut buf);

    let (peak_bin, _) = buf[..FFT_SIZE / 2]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.norm().partial_cmp(&b.1.norm()).unwrap())
        .unwrap();

    let bin_hz = SAMPLE_RATE as f32 / FFT_SIZE as f32;
    let peak_freq = peak_bin as f32 * bin_hz;
    assert!((peak_freq - TONE_HZ).abs() <= bin_hz * 2.0, "expected peak near {TONE_HZ} Hz, got {peak_freq} Hz");

    Ok(())
}
