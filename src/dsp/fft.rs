//! Windowed forward FFT producing a DC-centred magnitude-in-dB spectrum.
//!
//! Grounded in the teacher's `fft_analysis.rs` (`rustfft::FftPlanner`,
//! `apply_blackman_harris`'s exact four-term coefficients) and
//! `original_source/src/libs/SdrEngine/FftProcessor.h` (mutex-guarded
//! reconfigurable processor, default size 2048 / Blackman-Harris).

use std::sync::{Arc, Mutex};

use rustfft::{Fft, FftPlanner};

use crate::error::{Result, WorkbenchError};
use crate::types::{IqSample, WindowFunction};

/// Smallest permitted FFT size (spec.md §4.2: "power of two ≥ 64").
pub const MIN_FFT_SIZE: usize = 64;

/// `20*log10(1e-9)` — the magnitude floor below which bins are clamped.
const AMPLITUDE_FLOOR: f32 = 1e-9;

struct PlanState {
    size: usize,
    window: WindowFunction,
    coefficients: Vec<f32>,
    plan: Arc<dyn Fft<f32>>,
}

/// Reconfigurable FFT processor. `set_fft_size`/`set_window_function` take
/// effect atomically: a `process()` call in flight always sees a consistent
/// plan, and the next call after reconfiguration sees the new one.
pub struct FftProcessor {
    state: Mutex<PlanState>,
}

impl FftProcessor {
    pub fn new(fft_size: usize, window: WindowFunction) -> Result<Self> {
        Ok(Self {
            state: Mutex::new(Self::build_state(fft_size, window)?),
        })
    }

    fn build_state(fft_size: usize, window: WindowFunction) -> Result<PlanState> {
        if fft_size < MIN_FFT_SIZE || !fft_size.is_power_of_two() {
            return Err(WorkbenchError::Configuration(format!(
                "fft size must be a power of two >= {MIN_FFT_SIZE}, got {fft_size}"
            )));
        }
        let coefficients = window_coefficients(window, fft_size);
        let mut planner = FftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(fft_size);
        Ok(PlanState {
            size: fft_size,
            window,
            coefficients,
            plan,
        })
    }

    /// Replace the FFT size, rebuilding the plan and window. The averaging
    /// vector the engine owns is resized lazily when it detects a mismatch.
    pub fn set_fft_size(&self, fft_size: usize) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let window = guard.window;
        *guard = Self::build_state(fft_size, window)?;
        Ok(())
    }

    pub fn set_window_function(&self, window: WindowFunction) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let size = guard.size;
        *guard = Self::build_state(size, window)?;
        Ok(())
    }

    pub fn fft_size(&self) -> usize {
        self.state.lock().unwrap().size
    }

    pub fn window_function(&self) -> WindowFunction {
        self.state.lock().unwrap().window
    }

    /// Windowed forward FFT of up to `fft_size` samples (zero-padded if
    /// fewer are given), DC-centred magnitude in dB, length `fft_size`.
    pub fn process(&self, samples: &[IqSample]) -> Vec<f32> {
        let guard = self.state.lock().unwrap();
        let n = guard.size;

        let mut buf: Vec<IqSample> = Vec::with_capacity(n);
        for i in 0..n {
            let sample = samples.get(i).copied().unwrap_or(IqSample::new(0.0, 0.0));
            buf.push(sample * guard.coefficients[i]);
        }

        guard.plan.process(&mut buf);

        let norm = n as f32;
        let mut mags: Vec<f32> = buf
            .iter()
            .map(|x| 20.0 * (x.norm() / norm).max(AMPLITUDE_FLOOR).log10())
            .collect();
        mags.rotate_left(n / 2);
        mags
    }
}

fn window_coefficients(window: WindowFunction, n: usize) -> Vec<f32> {
    match window {
        WindowFunction::Rectangular => vec![1.0; n],
        WindowFunction::Hanning => (0..n)
            .map(|i| {
                0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (n as f32 - 1.0)).cos()
            })
            .collect(),
        WindowFunction::BlackmanHarris => (0..n)
            .map(|i| {
                let alpha0 = 0.35875;
                let alpha1 = 0.48829;
                let alpha2 = 0.14128;
                let alpha3 = 0.01168;
                let phase = 2.0 * std::f32::consts::PI * i as f32 / (n as f32 - 1.0);
                alpha0 - alpha1 * phase.cos() + alpha2 * (2.0 * phase).cos()
                    - alpha3 * (3.0 * phase).cos()
            })
            .collect(),
        WindowFunction::FlatTop => (0..n)
            .map(|i| {
                let a0 = 0.21557895;
                let a1 = 0.41663158;
                let a2 = 0.277263158;
                let a3 = 0.083578947;
                let a4 = 0.006947368;
                let phase = 2.0 * std::f32::consts::PI * i as f32 / (n as f32 - 1.0);
                a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos() - a3 * (3.0 * phase).cos()
                    + a4 * (4.0 * phase).cos()
            })
            .collect(),
    }
}
