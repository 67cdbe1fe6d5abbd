//! Crate-wide error kinds shared by the DSP pipeline and the VITA 49.2 codec.

use thiserror::Error;

/// Error kinds surfaced by the SDR pipeline and packet codec.
///
/// DSP and device setters return `Result<(), WorkbenchError>` in place of
/// the C/C++ "success flag" convention; the codec returns `None` on
/// malformed input rather than raising, reserving `WorkbenchError::Protocol`
/// for callers that want the reason.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkbenchError {
    /// A requested buffer size, FFT size, or sample count was zero or negative.
    #[error("capacity error: {0}")]
    Capacity(String),

    /// A component was asked to operate with an invalid or missing configuration,
    /// e.g. an FFT size that isn't a power of two, an unsupported sample rate,
    /// or a channel filter that hasn't been configured yet.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The tuner device failed to open, tune, or set gain.
    #[error("device error: {0}")]
    Device(String),

    /// A VITA 49.2 buffer was malformed: header claims more bytes than are
    /// available, reserved bits are non-zero, an unknown CIF0 bit was hit in
    /// strict mode, or an encode request exceeds the single-packet sample limit.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The accumulation buffer exceeded its soft cap and was truncated.
    /// The payload is the number of samples dropped.
    #[error("overflow: {0} samples dropped")]
    Overflow(usize),
}

pub type Result<T> = std::result::Result<T, WorkbenchError>;
