//! `SharedAudioBuffer` (spec §3, §4.8) and the `AudioBus` trait every
//! producer variant implements. The buffer's coarse-grained lock is a
//! `parking_lot::Mutex`, the same choice cuneus makes for its own
//! state-sharing guards — the operations inside are short, so a fair,
//! low-overhead lock beats a lock-free structure here.

use parking_lot::Mutex;
use std::collections::VecDeque;

struct Inner {
    queue: VecDeque<f32>,
    available_samples: usize,
    window_capacity: usize,
    write_window: Vec<f32>,
    write_pos: usize,
    read_window: Vec<f32>,
}

/// Thread-safe PCM queue with bounded FIFO semantics plus an independent,
/// non-destructive "recent window" for FFT consumers (spec §4.8).
///
/// Invariant: `available_samples == sum(chunk lengths)` — enforced here by
/// storing the queue flat (one `VecDeque<f32>`) and tracking its length
/// directly, rather than as a deque-of-chunks, so the invariant holds by
/// construction instead of needing to be reasoned about across pushes.
pub struct SharedAudioBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
    sample_rate: u32,
}

impl SharedAudioBuffer {
    pub fn new(capacity: usize, window_size: usize, sample_rate: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                available_samples: 0,
                window_capacity: window_size,
                write_window: vec![0.0; window_size],
                write_pos: 0,
                read_window: vec![0.0; window_size],
            }),
            capacity,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn available_samples(&self) -> usize {
        self.inner.lock().available_samples
    }

    /// Pushes mono samples, updating the FIFO queue and the write-side
    /// window. When `drop_oldest_on_overflow` is set and the push would
    /// exceed `capacity`, the oldest samples are discarded first.
    pub fn write(&self, chunk: &[f32], drop_oldest_on_overflow: bool) {
        let mut inner = self.inner.lock();

        if drop_oldest_on_overflow {
            let overflow = (inner.available_samples + chunk.len()).saturating_sub(self.capacity);
            for _ in 0..overflow.min(inner.available_samples) {
                inner.queue.pop_front();
                inner.available_samples -= 1;
            }
        }
        for &s in chunk {
            inner.queue.push_back(s);
            inner.available_samples += 1;
        }

        for &s in chunk {
            let cap = inner.window_capacity;
            inner.write_window[inner.write_pos] = s;
            inner.write_pos += 1;
            if inner.write_pos >= cap {
                std::mem::swap(&mut inner.write_window, &mut inner.read_window);
                inner.write_pos = 0;
            }
        }
    }

    /// Destructively dequeues up to `count` samples in FIFO order.
    pub fn read(&self, count: usize) -> Vec<f32> {
        let mut inner = self.inner.lock();
        let n = count.min(inner.available_samples);
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            if let Some(s) = inner.queue.pop_front() {
                out.push(s);
                inner.available_samples -= 1;
            }
        }
        out
    }

    /// A copy of the read-side recent window, non-destructive.
    pub fn peek_window(&self) -> Vec<f32> {
        self.inner.lock().read_window.clone()
    }
}

/// Common contract for every producer variant (spec §4.8).
pub trait AudioBus: Send + Sync {
    fn start(&self) -> crate::error::Result<()>;
    fn stop(&self);
    fn sample_rate(&self) -> u32;
    fn shared_buffer(&self) -> &SharedAudioBuffer;

    /// No-op for live sources; a blocking pull for shader-synthesized or
    /// file sources. Ensures at least `n` samples of history are available
    /// before the caller proceeds (spec §4.8, §5 A/V sync ordering).
    fn decode_until_sample(&self, _n: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_samples_matches_queue_length_after_write() {
        let buf = SharedAudioBuffer::new(1024, 8, 44_100);
        buf.write(&[0.1, 0.2, 0.3], false);
        assert_eq!(buf.available_samples(), 3);
    }

    #[test]
    fn write_then_read_round_trips_in_fifo_order_and_restores_available() {
        let buf = SharedAudioBuffer::new(1024, 8, 44_100);
        let before = buf.available_samples();
        let chunk = vec![1.0, 2.0, 3.0, 4.0];
        buf.write(&chunk, false);
        let out = buf.read(chunk.len());
        assert_eq!(out, chunk);
        assert_eq!(buf.available_samples(), before);
    }

    #[test]
    fn drop_oldest_on_overflow_keeps_capacity_bound() {
        let buf = SharedAudioBuffer::new(4, 8, 44_100);
        buf.write(&[1.0, 2.0, 3.0, 4.0], false);
        buf.write(&[5.0, 6.0], true);
        assert!(buf.available_samples() <= 4);
        let out = buf.read(buf.available_samples());
        assert_eq!(out, vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn window_swaps_after_capacity_samples_written() {
        let buf = SharedAudioBuffer::new(1024, 4, 44_100);
        buf.write(&[1.0, 2.0, 3.0, 4.0], false);
        assert_eq!(buf.peek_window(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn peek_window_is_non_destructive() {
        let buf = SharedAudioBuffer::new(1024, 4, 44_100);
        buf.write(&[1.0, 2.0, 3.0, 4.0], false);
        let _ = buf.peek_window();
        let _ = buf.peek_window();
        assert_eq!(buf.available_samples(), 4);
    }
}
