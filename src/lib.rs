//! Real-time SDR DSP pipeline (Core A) and VITA 49.2 signal-data/context
//! packet codec (Core B), sharing the crate-wide error type and data model
//! in [`error`] and [`types`].
//!
//! Mirrors the teacher's flat `src/` module layout, adapted from a single
//! spectrum-analyzer binary to a library crate with two independent cores
//! plus the ambient configuration/device layers that bind them.

pub mod config;
pub mod device;
pub mod dsp;
pub mod error;
pub mod types;
pub mod vita49;

pub use config::WorkbenchConfig;
pub use error::{Result, WorkbenchError};
