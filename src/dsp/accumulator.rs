//! Thread-safe staging buffer between the device callback and the
//! processing thread.
//!
//! Grounded in spec.md §4.1/§5 and `original_source/src/libs/SdrEngine/
//! SdrEngine.h`'s mutex+condvar accumulation buffer. The teacher's
//! `audio_stream.rs` `CircularBuffer` uses the same mutex-guarded,
//! restart-on-resize shape for its own ring buffer; this generalizes that
//! pattern to complex I/Q samples with the overrun-oldest cap from §4.1.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use log::warn;

use crate::error::{Result, WorkbenchError};
use crate::types::IqSample;

/// Accumulation buffer is capped at `fft_size * OVERRUN_FACTOR` samples;
/// once exceeded the oldest samples are dropped (spec.md §9(a)).
const OVERRUN_FACTOR: usize = 16;

struct Inner {
    samples: VecDeque<IqSample>,
    fft_size: usize,
    shutdown: bool,
}

/// Mutex+condvar hand-off between the device I/O callback and the
/// processing thread. The callback side (`push_bytes`) never blocks on
/// consumers; the processing side (`drain_block`) blocks until enough
/// samples are available or the accumulator is shut down.
pub struct SampleAccumulator {
    inner: Mutex<Inner>,
    condvar: Condvar,
    dc_spike_removal: AtomicBool,
    dropped_samples: AtomicUsize,
}

impl SampleAccumulator {
    pub fn new(fft_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                samples: VecDeque::new(),
                fft_size,
                shutdown: false,
            }),
            condvar: Condvar::new(),
            dc_spike_removal: AtomicBool::new(false),
            dropped_samples: AtomicUsize::new(0),
        }
    }

    pub fn set_fft_size(&self, fft_size: usize) {
        self.inner.lock().unwrap().fft_size = fft_size;
    }

    pub fn set_dc_spike_removal_enabled(&self, enabled: bool) {
        self.dc_spike_removal.store(enabled, Ordering::SeqCst);
    }

    pub fn dc_spike_removal_enabled(&self) -> bool {
        self.dc_spike_removal.load(Ordering::SeqCst)
    }

    /// Total samples ever dropped by overrun-oldest truncation.
    pub fn dropped_samples(&self) -> usize {
        self.dropped_samples.load(Ordering::SeqCst)
    }

    /// Current buffered sample count (for tests and diagnostics).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert a block of raw interleaved unsigned 8-bit I/Q bytes to
    /// complex samples and append them, truncating to the overrun cap.
    /// Called from the device I/O thread; never blocks on the consumer.
    pub fn push_bytes(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() % 2 != 0 {
            return Err(WorkbenchError::Capacity(
                "I/Q byte block must have even length".into(),
            ));
        }

        let mut block: Vec<IqSample> = bytes
            .chunks_exact(2)
            .map(|pair| {
                let i = (pair[0] as f32 - 127.5) / 127.5;
                let q = (pair[1] as f32 - 127.5) / 127.5;
                IqSample::new(i, q)
            })
            .collect();

        if self.dc_spike_removal.load(Ordering::SeqCst) && !block.is_empty() {
            let n = block.len() as f32;
            let mean_i = block.iter().map(|s| s.re).sum::<f32>() / n;
            let mean_q = block.iter().map(|s| s.im).sum::<f32>() / n;
            for sample in &mut block {
                sample.re -= mean_i;
                sample.im -= mean_q;
            }
        }

        let mut inner = self.inner.lock().unwrap();
        let cap = inner.fft_size * OVERRUN_FACTOR;
        inner.samples.extend(block);
        if inner.samples.len() > cap {
            let excess = inner.samples.len() - cap;
            inner.samples.drain(0..excess);
            self.dropped_samples.fetch_add(excess, Ordering::SeqCst);
            warn!("sample accumulator overran cap of {cap}; dropped {excess} oldest samples");
        }
        drop(inner);
        self.condvar.notify_one();
        Ok(())
    }

    /// Block until at least `fft_size` samples are buffered (draining
    /// exactly that many, oldest first) or the accumulator is shut down.
    /// Returns `None` only after shutdown with nothing left to drain.
    pub fn drain_block(&self) -> Option<Vec<IqSample>> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.samples.len() >= inner.fft_size {
                let drained: Vec<IqSample> = inner.samples.drain(0..inner.fft_size).collect();
                return Some(drained);
            }
            if inner.shutdown {
                return None;
            }
            inner = self.condvar.wait(inner).unwrap();
        }
    }

    /// Wake any waiting processing thread and mark the accumulator as
    /// shut down; subsequent `drain_block` calls return `None` once
    /// insufficient samples remain.
    pub fn shutdown(&self) {
        self.inner.lock().unwrap().shutdown = true;
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone_bytes(n: usize) -> Vec<u8> {
        (0..n * 2).map(|i| (i % 256) as u8).collect()
    }

    #[test]
    fn push_then_drain_round_trips_sample_count() {
        let acc = SampleAccumulator::new(4);
        acc.push_bytes(&tone_bytes(4)).unwrap();
        let block = acc.drain_block().unwrap();
        assert_eq!(block.len(), 4);
        assert!(acc.is_empty());
    }

    #[test]
    fn byte_conversion_matches_formula() {
        let acc = SampleAccumulator::new(1);
        acc.push_bytes(&[255, 0]).unwrap();
        let block = acc.drain_block().unwrap();
        assert!((block[0].re - 1.0).abs() < 1e-3);
        assert!((block[0].im - (-127.5 / 127.5)).abs() < 1e-3);
    }

    #[test]
    fn overrun_truncates_to_cap_and_counts_drops() {
        let acc = SampleAccumulator::new(4); // cap = 64 samples
        acc.push_bytes(&tone_bytes(100)).unwrap();
        assert_eq!(acc.len(), 64);
        assert_eq!(acc.dropped_samples(), 36);
    }

    #[test]
    fn odd_length_block_is_rejected() {
        let acc = SampleAccumulator::new(4);
        assert!(acc.push_bytes(&[1, 2, 3]).is_err());
    }

    #[test]
    fn shutdown_unblocks_drain_with_none_when_insufficient() {
        let acc = std::sync::Arc::new(SampleAccumulator::new(1024));
        let acc2 = acc.clone();
        let handle = std::thread::spawn(move || acc2.drain_block());
        std::thread::sleep(std::time::Duration::from_millis(20));
        acc.shutdown();
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn dc_spike_removal_zeroes_mean_of_block() {
        let acc = SampleAccumulator::new(2);
        acc.set_dc_spike_removal_enabled(true);
        acc.push_bytes(&[200, 200, 100, 100]).unwrap();
        let block = acc.drain_block().unwrap();
        let mean_i: f32 = block.iter().map(|s| s.re).sum::<f32>() / block.len() as f32;
        assert!(mean_i.abs() < 1e-5);
    }
}
