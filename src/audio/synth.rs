//! The GPU-synthesized Audio Bus: consumes stereo PCM blocks produced by the
//! Sound Shader Renderer (spec §4.7) off a bounded `crossbeam_channel`, and
//! exposes them through the same `SharedAudioBuffer`/`AudioBus` contract as
//! the live/file variants so the render thread's FFT channel and capture
//! pipeline don't need to special-case this source.

use crate::audio::bus::{AudioBus, SharedAudioBuffer};
use crate::error::Result;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;

/// One 512x512-pixel block's worth of decoded stereo samples, interleaved
/// L, R, L, R, ... (spec §4.7 step 3).
pub struct SoundBlock {
    pub samples: Vec<f32>,
}

pub struct SynthAudioBus {
    buffer: Arc<SharedAudioBuffer>,
    sample_rate: u32,
    receiver: Mutex<Receiver<SoundBlock>>,
    drained: std::sync::atomic::AtomicUsize,
}

impl SynthAudioBus {
    pub fn new(receiver: Receiver<SoundBlock>, sample_rate: u32) -> Self {
        Self {
            buffer: Arc::new(SharedAudioBuffer::new(sample_rate as usize * 4, 2048, sample_rate)),
            sample_rate,
            receiver: Mutex::new(receiver),
            drained: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn buffer_handle(&self) -> Arc<SharedAudioBuffer> {
        self.buffer.clone()
    }

    /// Downmixes an interleaved stereo block to mono and writes it to the
    /// shared buffer, recording how many mono samples have been produced so
    /// `decode_until_sample` can tell whether it has caught up.
    fn ingest(&self, block: SoundBlock) {
        let mono: Vec<f32> = block.samples.chunks(2).map(|lr| (lr[0] + lr.get(1).copied().unwrap_or(lr[0])) * 0.5).collect();
        self.drained.fetch_add(mono.len(), std::sync::atomic::Ordering::SeqCst);
        self.buffer.write(&mono, true);
    }
}

impl AudioBus for SynthAudioBus {
    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn stop(&self) {}

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn shared_buffer(&self) -> &SharedAudioBuffer {
        &self.buffer
    }

    /// Blocks on the sound thread's channel until at least `n` mono samples
    /// have been produced in total, or the channel is closed (sound thread
    /// drained/cancelled), matching the record-mode A/V sync discipline
    /// (spec §4.8, §5).
    fn decode_until_sample(&self, n: u64) {
        let receiver = self.receiver.lock();
        while (self.drained.load(std::sync::atomic::Ordering::SeqCst) as u64) < n {
            match receiver.recv() {
                Ok(block) => self.ingest(block),
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_downmixes_interleaved_stereo_to_mono() {
        let (_sender, receiver) = crossbeam_channel::unbounded();
        let bus = SynthAudioBus::new(receiver, 44_100);
        bus.ingest(SoundBlock { samples: vec![1.0, 3.0, 2.0, -2.0] });
        let out = bus.buffer.read(2);
        assert_eq!(out, vec![2.0, 0.0]);
    }

    #[test]
    fn decode_until_sample_drains_blocks_until_caught_up() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let bus = SynthAudioBus::new(receiver, 44_100);
        sender.send(SoundBlock { samples: vec![1.0, 1.0, 1.0, 1.0] }).unwrap();
        sender.send(SoundBlock { samples: vec![2.0, 2.0] }).unwrap();
        drop(sender);
        bus.decode_until_sample(3);
        assert_eq!(bus.drained.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[test]
    fn decode_until_sample_stops_when_channel_closes_early() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let bus = SynthAudioBus::new(receiver, 44_100);
        sender.send(SoundBlock { samples: vec![1.0, 1.0] }).unwrap();
        drop(sender);
        bus.decode_until_sample(100);
        assert_eq!(bus.drained.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn buffer_handle_shares_identity_with_trait_object_buffer() {
        let (_sender, receiver) = crossbeam_channel::unbounded();
        let bus = SynthAudioBus::new(receiver, 44_100);
        let handle = bus.buffer_handle();
        bus.ingest(SoundBlock { samples: vec![5.0, 5.0] });
        assert_eq!(handle.available_samples(), bus.shared_buffer().available_samples());
    }
}
