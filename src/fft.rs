//! FFT/Waveform Channel (spec §4.8). Consumes the Audio Bus's non-destructive
//! recent window, computes a windowed real FFT with `rustfft`, maps
//! magnitudes to smoothed decibels, and uploads a 512x2 RG32F texture: row 0
//! is the spectrum, row 1 is the raw waveform.

use crate::audio::bus::SharedAudioBuffer;
use crate::error::Result;
use rustfft::{num_complex::Complex32, FftPlanner};
use std::sync::Arc;

const WINDOW_SIZE: usize = 2048;
const SPECTRUM_BINS: usize = 512;
const BLACKMAN_A0: f32 = 0.42;
const BLACKMAN_A1: f32 = 0.5;
const BLACKMAN_A2: f32 = 0.08;
const SMOOTHING_ALPHA: f32 = 0.8;
const DB_FLOOR: f32 = -100.0;
const DB_CEIL: f32 = -30.0;

fn blackman_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32;
            BLACKMAN_A0 - BLACKMAN_A1 * phase.cos() + BLACKMAN_A2 * (2.0 * phase).cos()
        })
        .collect()
}

/// Pure transform from a mono window to the smoothed dB spectrum, used both
/// by `FftChannel::tick` and directly by tests (spec §8: "FFT channel is
/// pure w.r.t. its input window").
pub fn spectrum_from_window(window: &[f32], blackman: &[f32], smoothing_state: &mut [f32; SPECTRUM_BINS], alpha: f32) -> [f32; SPECTRUM_BINS] {
    let n = window.len();
    let mut buf: Vec<Complex32> = window
        .iter()
        .zip(blackman.iter())
        .map(|(s, w)| Complex32::new(s * w, 0.0))
        .collect();

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buf);

    let mut out = [0.0f32; SPECTRUM_BINS];
    for k in 0..SPECTRUM_BINS.min(n) {
        let magnitude = (2.0 / n as f32) * buf[k].norm();
        let db = 20.0 * (magnitude + 1e-9).log10();
        let smoothed = alpha * smoothing_state[k] + (1.0 - alpha) * db;
        smoothing_state[k] = smoothed;
        let mapped = ((smoothed - DB_FLOOR) / (DB_CEIL - DB_FLOOR)).clamp(0.0, 1.0);
        out[k] = mapped;
    }
    out
}

pub struct FftChannel {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    blackman: Vec<f32>,
    smoothing_state: [f32; SPECTRUM_BINS],
}

impl FftChannel {
    pub fn new(device: &wgpu::Device) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("fft_waveform"),
            size: wgpu::Extent3d { width: SPECTRUM_BINS as u32, height: 2, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rg32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("fft_sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
            blackman: blackman_window(WINDOW_SIZE),
            smoothing_state: [0.0; SPECTRUM_BINS],
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// One render-thread tick (spec §4.8): pull the recent window, compute
    /// the spectrum, and upload both rows.
    pub fn tick(&mut self, _device: &wgpu::Device, queue: &wgpu::Queue, bus: &Arc<SharedAudioBuffer>) -> Result<()> {
        let window = bus.peek_window();
        let window: Vec<f32> = if window.len() >= WINDOW_SIZE {
            window[window.len() - WINDOW_SIZE..].to_vec()
        } else {
            let mut padded = vec![0.0; WINDOW_SIZE - window.len()];
            padded.extend_from_slice(&window);
            padded
        };

        let spectrum = spectrum_from_window(&window, &self.blackman, &mut self.smoothing_state, SMOOTHING_ALPHA);

        let mut row0 = [[0.0f32; 2]; SPECTRUM_BINS];
        let mut row1 = [[0.0f32; 2]; SPECTRUM_BINS];
        for i in 0..SPECTRUM_BINS {
            row0[i] = [spectrum[i], 0.0];
            let raw = window.get(window.len() - SPECTRUM_BINS + i).copied().unwrap_or(0.0);
            row1[i] = [(raw + 1.0) * 0.5, 0.0];
        }

        let mut bytes = Vec::with_capacity(SPECTRUM_BINS * 2 * 2 * 4);
        bytes.extend(bytemuck::cast_slice(&row0));
        bytes.extend(bytemuck::cast_slice(&row1));

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some((SPECTRUM_BINS * 2 * 4) as u32),
                rows_per_image: Some(2),
            },
            wgpu::Extent3d { width: SPECTRUM_BINS as u32, height: 2, depth_or_array_layers: 1 },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn blackman_window_matches_coefficients_at_midpoint() {
        let w = blackman_window(WINDOW_SIZE);
        let i = WINDOW_SIZE / 2;
        let phase = 2.0 * std::f32::consts::PI * i as f32 / (WINDOW_SIZE - 1) as f32;
        let expected = 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos();
        assert_abs_diff_eq!(w[i], expected, epsilon = 1e-5);
        assert!(w[0] < 0.01);
    }

    #[test]
    fn zero_smoothing_factor_is_pure_function_of_input() {
        let window = vec![0.0f32; WINDOW_SIZE];
        let blackman = blackman_window(WINDOW_SIZE);
        let mut state_a = [0.0f32; SPECTRUM_BINS];
        let mut state_b = [5.0f32; SPECTRUM_BINS];
        let out_a = spectrum_from_window(&window, &blackman, &mut state_a, 0.0);
        let out_b = spectrum_from_window(&window, &blackman, &mut state_b, 0.0);
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn sine_tone_peaks_near_expected_bin() {
        let sample_rate = 44_100.0f32;
        let freq = 1000.0f32;
        let window: Vec<f32> = (0..WINDOW_SIZE)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect();
        let blackman = blackman_window(WINDOW_SIZE);
        let mut state = [-100.0f32; SPECTRUM_BINS];
        // Converge smoothing by running a few ticks on the same input.
        let mut spectrum = [0.0f32; SPECTRUM_BINS];
        for _ in 0..8 {
            spectrum = spectrum_from_window(&window, &blackman, &mut state, 0.0);
        }
        let (peak_bin, _) = spectrum.iter().enumerate().max_by(|a, b| a.1.partial_cmp(b.1).unwrap()).unwrap();
        // bin k corresponds to k * sample_rate / WINDOW_SIZE Hz
        let expected_bin = (freq * WINDOW_SIZE as f32 / sample_rate).round() as usize;
        assert!((peak_bin as i64 - expected_bin as i64).abs() <= 2);
    }
}
