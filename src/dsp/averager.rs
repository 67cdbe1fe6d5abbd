//! Per-bin exponential moving average over successive spectra.
//!
//! Grounded in spec.md §3 ("Spectrum Average State") and §4.1's update rule;
//! no teacher analogue exists (the teacher's GUI re-plots each spectrum
//! as-is), so this mirrors `original_source/src/libs/SdrEngine/SdrEngine.h`'s
//! `fftAlpha` field and the `avg[k] = α·avg[k−1] + (1−α)·new[k]` recurrence.

use std::sync::Mutex;

use crate::error::{Result, WorkbenchError};

/// Running per-bin average, reset automatically whenever the incoming
/// spectrum length changes (i.e. whenever FFT size changes).
pub struct SpectrumAverager {
    alpha: Mutex<f32>,
    state: Mutex<Option<Vec<f32>>>,
}

impl SpectrumAverager {
    pub fn new(alpha: f32) -> Result<Self> {
        Self::validate_alpha(alpha)?;
        Ok(Self {
            alpha: Mutex::new(alpha),
            state: Mutex::new(None),
        })
    }

    fn validate_alpha(alpha: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(WorkbenchError::Configuration(format!(
                "fft average alpha must be in [0, 1], got {alpha}"
            )));
        }
        Ok(())
    }

    pub fn set_alpha(&self, alpha: f32) -> Result<()> {
        Self::validate_alpha(alpha)?;
        *self.alpha.lock().unwrap() = alpha;
        Ok(())
    }

    pub fn alpha(&self) -> f32 {
        *self.alpha.lock().unwrap()
    }

    /// Clear the running average without changing the configured alpha.
    pub fn reset(&self) {
        *self.state.lock().unwrap() = None;
    }

    /// Fold `new` into the running average (or pass it through untouched if
    /// alpha is zero or the bin count changed) and optionally interpolate
    /// the DC bin from its neighbours before returning.
    pub fn update(&self, new: Vec<f32>, dc_spike_removal: bool) -> Vec<f32> {
        let alpha = self.alpha();
        let mut state = self.state.lock().unwrap();

        let mut out = match state.as_mut() {
            Some(avg) if avg.len() == new.len() && alpha > 0.0 => {
                for (a, n) in avg.iter_mut().zip(new.iter()) {
                    *a = alpha * *a + (1.0 - alpha) * *n;
                }
                avg.clone()
            }
            _ => {
                *state = Some(new.clone());
                new
            }
        };

        if dc_spike_removal && out.len() >= 3 {
            let mid = out.len() / 2;
            out[mid] = (out[mid - 1] + out[mid + 1]) / 2.0;
        }
        out
    }
}
