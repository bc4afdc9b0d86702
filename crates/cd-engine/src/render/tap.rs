//! Lock-free waveform capture for meter stages.
//!
//! The render side pushes samples; any thread may copy out the most recent
//! window. Readers can observe a window that straddles a concurrent write,
//! which is harmless for level metering.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

pub struct MeterTap {
    samples: Box<[AtomicU32]>,
    /// Total samples ever written
    written: AtomicUsize,
}

impl MeterTap {
    pub fn new(len: usize) -> Self {
        let len = len.max(1);
        Self {
            samples: (0..len).map(|_| AtomicU32::new(0)).collect(),
            written: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.written.load(Ordering::Acquire) == 0
    }

    #[inline]
    pub fn push(&self, sample: f32) {
        let n = self.written.load(Ordering::Relaxed);
        self.samples[n % self.samples.len()].store(sample.to_bits(), Ordering::Relaxed);
        self.written.store(n.wrapping_add(1), Ordering::Release);
    }

    /// Copy the newest `out.len()` samples (or fewer, if not yet written)
    /// into `out`, oldest first. Returns the count copied.
    pub fn read(&self, out: &mut [f32]) -> usize {
        let written = self.written.load(Ordering::Acquire);
        let count = out.len().min(self.samples.len()).min(written);
        let start = written - count;
        for (i, slot) in out.iter_mut().take(count).enumerate() {
            let idx = (start + i) % self.samples.len();
            *slot = f32::from_bits(self.samples[idx].load(Ordering::Relaxed));
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_newest_in_order() {
        let tap = MeterTap::new(4);
        for i in 0..6 {
            tap.push(i as f32);
        }
        let mut out = [0.0; 4];
        assert_eq!(tap.read(&mut out), 4);
        assert_eq!(out, [2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn partial_fill() {
        let tap = MeterTap::new(8);
        assert!(tap.is_empty());
        tap.push(0.5);
        let mut out = [0.0; 4];
        assert_eq!(tap.read(&mut out), 1);
        assert_eq!(out[0], 0.5);
    }
}
