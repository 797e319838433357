//! The null Audio Bus: produces nothing, ever. Grounds the spec's
//! "well-defined silence behavior" scenario (§8, scenario 3) — a shader
//! bound to this bus reads back an all-zero FFT texture indefinitely since
//! the shared buffer is never written.

use crate::audio::bus::{AudioBus, SharedAudioBuffer};
use crate::error::Result;
use std::sync::Arc;

pub struct SilentBus {
    buffer: Arc<SharedAudioBuffer>,
}

impl SilentBus {
    pub fn new(sample_rate: u32) -> Self {
        Self { buffer: Arc::new(SharedAudioBuffer::new(4096, 2048, sample_rate)) }
    }

    pub fn buffer_handle(&self) -> Arc<SharedAudioBuffer> {
        self.buffer.clone()
    }
}

impl AudioBus for SilentBus {
    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn stop(&self) {}

    fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    fn shared_buffer(&self) -> &SharedAudioBuffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_reports_available_samples() {
        let bus = SilentBus::new(44_100);
        bus.start().unwrap();
        assert_eq!(bus.shared_buffer().available_samples(), 0);
    }
}
