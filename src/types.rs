//! Shared data-model types for the SDR processing pipeline.
//!
//! Mirrors `original_source/src/libs/SdrEngine/SdrTypes.h` one-for-one.

use num_complex::Complex32;
use std::time::Instant;

/// Complex baseband sample: in-phase and quadrature components.
pub type IqSample = Complex32;

/// A chunk of I/Q samples with metadata, produced once per processing cycle.
#[derive(Debug, Clone)]
pub struct IqBuffer {
    pub samples: Vec<IqSample>,
    pub center_freq_hz: f64,
    pub sample_rate_hz: f64,
    pub timestamp: Instant,
}

/// FFT magnitude spectrum with metadata. DC-centred: index 0 is the lowest
/// negative frequency, index `fft_size / 2` is DC, index `fft_size - 1` is
/// the highest positive frequency.
#[derive(Debug, Clone)]
pub struct SpectrumData {
    pub magnitudes_db: Vec<f32>,
    pub center_freq_hz: f64,
    pub bandwidth_hz: f64,
    pub fft_size: usize,
}

/// FFT windowing function choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum WindowFunction {
    Rectangular,
    Hanning,
    BlackmanHarris,
    FlatTop,
}

impl Default for WindowFunction {
    fn default() -> Self {
        WindowFunction::BlackmanHarris
    }
}

/// Tuner gain mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GainMode {
    Automatic,
    Manual,
}

/// Information about a connected SDR device, returned by `enumerate_devices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: i32,
    pub name: String,
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
}

/// Demodulation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DemodMode {
    FmMono,
    FmStereo,
    Am,
}

impl DemodMode {
    pub fn name(self) -> &'static str {
        match self {
            DemodMode::FmMono => "FM Mono",
            DemodMode::FmStereo => "FM Stereo",
            DemodMode::Am => "AM",
        }
    }
}

/// Stereo audio output from the demodulator, at the configured audio rate.
/// For `FmMono` and `Am`, `left` and `right` hold identical data.
#[derive(Debug, Clone, Default)]
pub struct DemodAudio {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

/// RTL-SDR sample rates exposed by the device mapping (spec.md §6).
pub const SUPPORTED_SAMPLE_RATES: [u32; 8] = [
    250_000, 1_024_000, 1_400_000, 1_800_000, 2_048_000, 2_400_000, 2_800_000, 3_200_000,
];

/// FFT sizes exposed to callers (spec.md §6).
pub const SUPPORTED_FFT_SIZES: [usize; 7] = [512, 1024, 2048, 4096, 8192, 16384, 32768];

/// Default audio output sample rate (Hz).
pub const DEFAULT_AUDIO_RATE_HZ: f64 = 48_000.0;
