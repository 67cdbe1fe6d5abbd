//! Tuner device abstraction.
//!
//! Mirrors `original_source/src/libs/SdrEngine/ISdrDevice.h`: a trait
//! object takes the place of the abstract base class, and the raw C-style
//! `{function pointer, user context}` callback becomes a boxed `FnMut`
//! closure, per the design note in spec.md §9 ("Callback into pipeline").

mod sim;

#[cfg(feature = "hardware")]
mod rtl;

pub use sim::SimulatedDevice;

#[cfg(feature = "hardware")]
pub use rtl::RtlSdrDevice;

use crate::error::{Result, WorkbenchError};
use crate::types::DeviceInfo;

/// Callback invoked by the device when a block of raw I/Q bytes arrives.
/// Each pair is two interleaved unsigned bytes: I then Q.
pub type RawIqCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Abstract interface for a software-defined-radio tuner.
///
/// Implementations wrap a specific hardware API (e.g. librtlsdr) behind a
/// common surface so the rest of the pipeline is device-agnostic.
pub trait SdrDevice: Send {
    /// Open the device at the given index (0-based).
    fn open(&mut self, device_index: usize) -> Result<()>;

    /// Close the device and release resources.
    fn close(&mut self);

    /// True if the device is currently open.
    fn is_open(&self) -> bool;

    /// Set the centre frequency in Hz.
    fn set_center_frequency(&mut self, frequency_hz: u64) -> Result<()>;

    /// Current centre frequency in Hz.
    fn center_frequency(&self) -> u64;

    /// Set the sample rate in samples per second.
    fn set_sample_rate(&mut self, rate_hz: u32) -> Result<()>;

    /// Current sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Enable or disable automatic gain control.
    fn set_auto_gain(&mut self, enabled: bool) -> Result<()>;

    /// Set the manual gain in tenths of a dB (e.g. 496 = 49.6 dB).
    fn set_gain(&mut self, tenths_db: i32) -> Result<()>;

    /// Current gain in tenths of a dB.
    fn gain(&self) -> i32;

    /// Sorted list of supported gain values (tenths of dB).
    fn gain_values(&self) -> Vec<i32>;

    /// Start asynchronous streaming. The callback is invoked from a device
    /// I/O thread with raw 8-bit unsigned I/Q pairs.
    fn start_streaming(&mut self, callback: RawIqCallback, buffer_size: usize) -> Result<()>;

    /// Stop asynchronous streaming.
    fn stop_streaming(&mut self);

    /// True while the device is actively streaming.
    fn is_streaming(&self) -> bool;

    /// Human-readable device name / description.
    fn name(&self) -> String;

    /// Enumerate available devices of this type.
    fn enumerate_devices(&self) -> Vec<DeviceInfo>;
}

pub(crate) fn check_sample_rate(rate_hz: u32) -> Result<()> {
    if crate::types::SUPPORTED_SAMPLE_RATES.contains(&rate_hz) {
        Ok(())
    } else {
        Err(WorkbenchError::Configuration(format!(
            "unsupported sample rate: {rate_hz} Hz"
        )))
    }
}
