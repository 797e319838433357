//! Live microphone capture bus, built on `cpal`. The default input device's
//! native sample format is converted to mono `f32` before it reaches the
//! `SharedAudioBuffer`; downmixing multi-channel input by arithmetic mean
//! matches the FFT channel's own mono downmix convention (spec §4.8 step 1).

use crate::audio::bus::{AudioBus, SharedAudioBuffer};
use crate::error::{EngineError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;

pub struct LiveAudioBus {
    buffer: Arc<SharedAudioBuffer>,
    sample_rate: u32,
    stream: Mutex<Option<cpal::Stream>>,
}

use parking_lot::Mutex;

impl LiveAudioBus {
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| EngineError::AudioSource("no default input device".into()))?;
        let config = device
            .default_input_config()
            .map_err(|e| EngineError::AudioSource(format!("no input config: {e}")))?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let buffer = Arc::new(SharedAudioBuffer::new(sample_rate as usize * 4, 2048, sample_rate));
        let buffer_for_stream = buffer.clone();

        let err_fn = |err| log::error!("cpal input stream error: {err}");
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data: &[f32], _| push_downmixed(&buffer_for_stream, data, channels),
                err_fn,
                None,
            ),
            other => {
                return Err(EngineError::AudioSource(format!("unsupported sample format {other:?}")));
            }
        }
        .map_err(|e| EngineError::AudioSource(format!("failed to build input stream: {e}")))?;

        Ok(Self { buffer, sample_rate, stream: Mutex::new(Some(stream)) })
    }

    pub fn buffer_handle(&self) -> Arc<SharedAudioBuffer> {
        self.buffer.clone()
    }
}

fn push_downmixed(buffer: &SharedAudioBuffer, data: &[f32], channels: usize) {
    if channels <= 1 {
        buffer.write(data, true);
        return;
    }
    let mono: Vec<f32> = data
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    buffer.write(&mono, true);
}

impl AudioBus for LiveAudioBus {
    fn start(&self) -> Result<()> {
        let guard = self.stream.lock();
        if let Some(stream) = guard.as_ref() {
            stream
                .play()
                .map_err(|e| EngineError::AudioSource(format!("failed to start input stream: {e}")))?;
        }
        Ok(())
    }

    fn stop(&self) {
        if let Some(stream) = self.stream.lock().as_ref() {
            let _ = stream.pause();
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn shared_buffer(&self) -> &SharedAudioBuffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let buf = SharedAudioBuffer::new(1024, 8, 44_100);
        push_downmixed(&buf, &[1.0, 3.0, 0.0, 0.0], 2);
        let out = buf.read(2);
        assert_eq!(out, vec![2.0, 0.0]);
    }
}
