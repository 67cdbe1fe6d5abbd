//! FM mono, FM stereo (19 kHz pilot PLL -> 38 kHz subcarrier), and AM
//! demodulation, each followed by de-emphasis/DC-block and resample to a
//! fixed audio rate.
//!
//! Grounded in `original_source/src/libs/SdrEngine/Demodulator.h`: liquid-dsp
//! objects for the discriminator, de-emphasis IIR, pilot band-pass, pilot
//! PLL, mono/difference low-passes, envelope detector, and DC-blocker are
//! reimplemented directly as one-pole/biquad state machines over `f32`,
//! following the exact difference equations spec.md §4.4 specifies.

use std::sync::Mutex;

use crate::error::{Result, WorkbenchError};
use crate::types::{DemodAudio, DemodMode, IqSample, DEFAULT_AUDIO_RATE_HZ};

/// FM de-emphasis time constant (Americas/Asia broadcast standard).
const DEEMPHASIS_TAU_SECONDS: f32 = 75e-6;
/// AM DC-blocker high-pass cutoff.
const AM_DC_BLOCK_HZ: f32 = 20.0;
/// Pilot band-pass centre frequency and half-bandwidth.
const PILOT_CENTER_HZ: f32 = 19_000.0;
const PILOT_BANDWIDTH_HZ: f32 = 500.0;
/// Mono-sum / stereo-difference low-pass cutoff (audio bandwidth).
const MPX_LOWPASS_HZ: f32 = 15_000.0;
/// Linear pilot amplitude below which stereo falls back to mono, sustained
/// for `PILOT_LOCK_WINDOW_SAMPLES` samples (spec.md §9(c) open question).
const PILOT_LOCK_THRESHOLD: f32 = 0.02;
const PILOT_LOCK_WINDOW_SAMPLES: usize = 4096;

/// One-pole low-pass / de-emphasis filter: `y[n] = (1-a) x[n] + a y[n-1]`.
#[derive(Clone, Copy, Default)]
struct OnePoleLowPass {
    a: f32,
    y: f32,
}

impl OnePoleLowPass {
    fn new(cutoff_hz: f32, sample_rate_hz: f32) -> Self {
        let a = (-2.0 * std::f32::consts::PI * cutoff_hz / sample_rate_hz).exp();
        Self { a, y: 0.0 }
    }

    fn from_time_constant(tau_seconds: f32, sample_rate_hz: f32) -> Self {
        let a = (-1.0 / (tau_seconds * sample_rate_hz)).exp();
        Self { a, y: 0.0 }
    }

    fn process(&mut self, x: f32) -> f32 {
        self.y = (1.0 - self.a) * x + self.a * self.y;
        self.y
    }

    fn reset(&mut self) {
        self.y = 0.0;
    }
}

/// One-pole high-pass (DC blocker): `y[n] = x[n] - x[n-1] + a y[n-1]`.
#[derive(Clone, Copy, Default)]
struct OnePoleHighPass {
    a: f32,
    prev_x: f32,
    prev_y: f32,
}

impl OnePoleHighPass {
    fn new(cutoff_hz: f32, sample_rate_hz: f32) -> Self {
        let a = (-2.0 * std::f32::consts::PI * cutoff_hz / sample_rate_hz).exp();
        Self { a, prev_x: 0.0, prev_y: 0.0 }
    }

    fn process(&mut self, x: f32) -> f32 {
        let y = x - self.prev_x + self.a * self.prev_y;
        self.prev_x = x;
        self.prev_y = y;
        y
    }

    fn reset(&mut self) {
        self.prev_x = 0.0;
        self.prev_y = 0.0;
    }
}

/// Simple second-order band-pass around `center_hz`, implemented as a
/// resonant biquad (constant-skirt-gain form).
#[derive(Clone, Copy)]
struct BandPass {
    b0: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BandPass {
    fn new(center_hz: f32, bandwidth_hz: f32, sample_rate_hz: f32) -> Self {
        // Constant-skirt-gain RBJ band-pass; b1 term is zero for this form.
        let w0 = 2.0 * std::f32::consts::PI * center_hz / sample_rate_hz;
        let q = (center_hz / bandwidth_hz).max(0.5);
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: alpha / a0,
            b2: -alpha / a0,
            a1: (-2.0 * w0.cos()) / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b2 * self.x2 - self.a1 * self.y1 - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Phase-locked loop tracking the 19 kHz pilot and producing a phase-locked
/// 38 kHz reference (second harmonic of the tracked pilot phase).
struct PilotPll {
    phase: f32,
    frequency: f32,
    sample_rate_hz: f32,
    loop_bandwidth: f32,
}

impl PilotPll {
    fn new(sample_rate_hz: f32) -> Self {
        Self {
            phase: 0.0,
            frequency: 2.0 * std::f32::consts::PI * PILOT_CENTER_HZ / sample_rate_hz,
            sample_rate_hz,
            loop_bandwidth: 0.002,
        }
    }

    /// Advance one sample given the band-pass-filtered pilot signal;
    /// returns `sin(2*phase)`, the 38 kHz in-phase reference.
    fn step(&mut self, pilot_sample: f32) -> f32 {
        let error = pilot_sample * self.phase.sin();
        self.frequency -= self.loop_bandwidth * error;
        self.phase += self.frequency;
        if self.phase > std::f32::consts::PI {
            self.phase -= 2.0 * std::f32::consts::PI;
        }
        (2.0 * self.phase).sin()
    }

    fn reset(&mut self) {
        self.phase = 0.0;
        self.frequency = 2.0 * std::f32::consts::PI * PILOT_CENTER_HZ / self.sample_rate_hz;
    }
}

/// Nearest-neighbor-free linear-interpolation resampler carrying fractional
/// state across calls, used to bring discriminator/envelope output up or
/// down to the configured audio rate.
struct AudioResampler {
    ratio: f64,
    output_pos: f64,
    cursor: f64,
    prev: f32,
}

impl AudioResampler {
    fn new(input_rate_hz: f64, output_rate_hz: f64) -> Self {
        Self {
            ratio: output_rate_hz / input_rate_hz,
            output_pos: 0.0,
            cursor: -1.0,
            prev: 0.0,
        }
    }

    fn reset(&mut self) {
        self.output_pos = 0.0;
        self.cursor = -1.0;
        self.prev = 0.0;
    }

    fn push(&mut self, current: f32, out: &mut Vec<f32>) {
        let step = 1.0 / self.ratio;
        let current_pos = self.cursor + 1.0;
        while self.output_pos <= current_pos {
            let t = ((self.output_pos - self.cursor) / (current_pos - self.cursor)).clamp(0.0, 1.0) as f32;
            out.push(self.prev * (1.0 - t) + current * t);
            self.output_pos += step;
        }
        self.cursor = current_pos;
        self.prev = current;
    }
}

struct FmState {
    deemphasis: OnePoleLowPass,
    resampler: AudioResampler,
}

struct FmStereoState {
    pilot_bandpass: BandPass,
    pilot_pll: PilotPll,
    mono_lowpass: OnePoleLowPass,
    diff_lowpass: OnePoleLowPass,
    left_deemphasis: OnePoleLowPass,
    right_deemphasis: OnePoleLowPass,
    left_resampler: AudioResampler,
    right_resampler: AudioResampler,
    pilot_locked_run: usize,
}

struct AmState {
    dc_block: OnePoleHighPass,
    resampler: AudioResampler,
}

enum ModeState {
    FmMono(FmState),
    FmStereo(Box<FmStereoState>),
    Am(AmState),
}

struct Demod {
    mode: DemodMode,
    input_rate_hz: f64,
    audio_rate_hz: f64,
    last_sample: IqSample,
    state: ModeState,
}

/// FM/AM demodulator producing stereo audio at a configurable output rate.
pub struct Demodulator {
    inner: Mutex<Option<Demod>>,
}

impl Demodulator {
    pub fn new() -> Self {
        Self { inner: Mutex::new(None) }
    }

    pub fn configure(&self, mode: DemodMode, input_rate_hz: f64, audio_rate_hz: Option<f64>) -> Result<()> {
        if input_rate_hz <= 0.0 {
            return Err(WorkbenchError::Configuration(
                "demodulator input rate must be positive".into(),
            ));
        }
        let audio_rate_hz = audio_rate_hz.unwrap_or(DEFAULT_AUDIO_RATE_HZ);
        let fs = input_rate_hz as f32;

        let state = match mode {
            DemodMode::FmMono => ModeState::FmMono(FmState {
                deemphasis: OnePoleLowPass::from_time_constant(DEEMPHASIS_TAU_SECONDS, fs),
                resampler: AudioResampler::new(input_rate_hz, audio_rate_hz),
            }),
            DemodMode::FmStereo => ModeState::FmStereo(Box::new(FmStereoState {
                pilot_bandpass: BandPass::new(PILOT_CENTER_HZ, PILOT_BANDWIDTH_HZ, fs),
                pilot_pll: PilotPll::new(fs),
                mono_lowpass: OnePoleLowPass::new(MPX_LOWPASS_HZ, fs),
                diff_lowpass: OnePoleLowPass::new(MPX_LOWPASS_HZ, fs),
                left_deemphasis: OnePoleLowPass::from_time_constant(DEEMPHASIS_TAU_SECONDS, fs),
                right_deemphasis: OnePoleLowPass::from_time_constant(DEEMPHASIS_TAU_SECONDS, fs),
                left_resampler: AudioResampler::new(input_rate_hz, audio_rate_hz),
                right_resampler: AudioResampler::new(input_rate_hz, audio_rate_hz),
                pilot_locked_run: 0,
            })),
            DemodMode::Am => ModeState::Am(AmState {
                dc_block: OnePoleHighPass::new(AM_DC_BLOCK_HZ, fs),
                resampler: AudioResampler::new(input_rate_hz, audio_rate_hz),
            }),
        };

        *self.inner.lock().unwrap() = Some(Demod {
            mode,
            input_rate_hz,
            audio_rate_hz,
            last_sample: IqSample::new(0.0, 0.0),
            state,
        });
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.inner.lock().unwrap().is_some()
    }

    pub fn mode(&self) -> Option<DemodMode> {
        self.inner.lock().unwrap().as_ref().map(|d| d.mode)
    }

    /// Zero all filter memory, PLL phase, and resampler state without
    /// changing configuration.
    pub fn reset(&self) {
        let mut guard = self.inner.lock().unwrap();
        if let Some(demod) = guard.as_mut() {
            demod.last_sample = IqSample::new(0.0, 0.0);
            match &mut demod.state {
                ModeState::FmMono(s) => {
                    s.deemphasis.reset();
                    s.resampler.reset();
                }
                ModeState::FmStereo(s) => {
                    s.pilot_bandpass.reset();
                    s.pilot_pll.reset();
                    s.mono_lowpass.reset();
                    s.diff_lowpass.reset();
                    s.left_deemphasis.reset();
                    s.right_deemphasis.reset();
                    s.left_resampler.reset();
                    s.right_resampler.reset();
                    s.pilot_locked_run = 0;
                }
                ModeState::Am(s) => {
                    s.dc_block.reset();
                    s.resampler.reset();
                }
            }
        }
    }

    /// Demodulate `iq` into stereo audio at the configured audio rate.
    /// Returns `None` if not yet configured.
    pub fn demodulate(&self, iq: &[IqSample]) -> Option<DemodAudio> {
        let mut guard = self.inner.lock().unwrap();
        let demod = guard.as_mut()?;

        let mut left = Vec::with_capacity(iq.len());
        let mut right = Vec::with_capacity(iq.len());
        let mut last_sample = demod.last_sample;

        match &mut demod.state {
            ModeState::FmMono(s) => {
                for &sample in iq {
                    let discriminated = fm_discriminate(last_sample, sample);
                    last_sample = sample;
                    let audio = s.deemphasis.process(discriminated);
                    s.resampler.push(audio, &mut left);
                }
                right = left.clone();
            }
            ModeState::FmStereo(s) => {
                for &sample in iq {
                    let mpx = fm_discriminate(last_sample, sample);
                    last_sample = sample;

                    let pilot = s.pilot_bandpass.process(mpx);
                    if pilot.abs() >= PILOT_LOCK_THRESHOLD {
                        s.pilot_locked_run = (s.pilot_locked_run + 1).min(PILOT_LOCK_WINDOW_SAMPLES);
                    } else {
                        s.pilot_locked_run = s.pilot_locked_run.saturating_sub(1);
                    }
                    let stereo_locked = s.pilot_locked_run >= PILOT_LOCK_WINDOW_SAMPLES / 2;

                    let mono = s.mono_lowpass.process(mpx);
                    let (l, r) = if stereo_locked {
                        let subcarrier = s.pilot_pll.step(pilot);
                        let difference = s.diff_lowpass.process(mpx * subcarrier * 2.0);
                        ((mono + difference) / 2.0, (mono - difference) / 2.0)
                    } else {
                        (mono, mono)
                    };

                    let l = s.left_deemphasis.process(l);
                    let r = s.right_deemphasis.process(r);
                    s.left_resampler.push(l, &mut left);
                    s.right_resampler.push(r, &mut right);
                }
            }
            ModeState::Am(s) => {
                for &sample in iq {
                    let envelope = sample.norm();
                    let blocked = s.dc_block.process(envelope);
                    s.resampler.push(blocked, &mut left);
                }
                right = left.clone();
            }
        }

        demod.last_sample = last_sample;
        Some(DemodAudio { left, right })
    }

    pub fn input_rate(&self) -> Option<f64> {
        self.inner.lock().unwrap().as_ref().map(|d| d.input_rate_hz)
    }

    pub fn audio_rate(&self) -> Option<f64> {
        self.inner.lock().unwrap().as_ref().map(|d| d.audio_rate_hz)
    }
}

impl Default for Demodulator {
    fn default() -> Self {
        Self::new()
    }
}

fn fm_discriminate(prev: IqSample, current: IqSample) -> f32 {
    (current * prev.conj()).arg() / std::f32::consts::PI
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_phase_iq(len: usize) -> Vec<IqSample> {
        vec![IqSample::new(1.0, 0.0); len]
    }

    #[test]
    fn fm_mono_silent_input_is_quiet() {
        let demod = Demodulator::new();
        demod.configure(DemodMode::FmMono, 1_024_000.0, Some(48_000.0)).unwrap();
        let audio = demod.demodulate(&constant_phase_iq(8192)).unwrap();

        let settle = audio.left.len() / 8;
        let settled_rms = rms(&audio.left[settle..]);
        assert!(settled_rms < 10f32.powf(-60.0 / 20.0), "settled RMS {settled_rms} too high");
    }

    #[test]
    fn am_silent_input_is_quiet() {
        let demod = Demodulator::new();
        demod.configure(DemodMode::Am, 1_024_000.0, Some(48_000.0)).unwrap();
        let audio = demod.demodulate(&constant_phase_iq(8192)).unwrap();
        let settle = audio.left.len() / 8;
        let settled_rms = rms(&audio.left[settle..]);
        assert!(settled_rms < 10f32.powf(-60.0 / 20.0), "settled RMS {settled_rms} too high");
    }

    #[test]
    fn demodulate_before_configure_returns_none() {
        let demod = Demodulator::new();
        assert!(demod.demodulate(&constant_phase_iq(4)).is_none());
    }

    #[test]
    fn fm_stereo_without_pilot_falls_back_to_mono() {
        let demod = Demodulator::new();
        demod.configure(DemodMode::FmStereo, 1_024_000.0, Some(48_000.0)).unwrap();
        let audio = demod.demodulate(&constant_phase_iq(16384)).unwrap();
        assert_eq!(audio.left.len(), audio.right.len());
        let settle = audio.left.len() / 4;
        for (l, r) in audio.left[settle..].iter().zip(audio.right[settle..].iter()) {
            assert!((l - r).abs() < 1e-3);
        }
    }

    #[test]
    fn reset_clears_state_without_losing_configuration() {
        let demod = Demodulator::new();
        demod.configure(DemodMode::FmMono, 1_024_000.0, None).unwrap();
        demod.demodulate(&constant_phase_iq(256));
        demod.reset();
        assert!(demod.is_configured());
        assert_eq!(demod.mode(), Some(DemodMode::FmMono));
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }
}
