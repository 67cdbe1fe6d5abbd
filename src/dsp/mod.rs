//! Real-time DSP pipeline: accumulator → FFT → averager → channel filter →
//! demodulator → engine. Mirrors `original_source/src/libs/SdrEngine/`.

pub mod accumulator;
pub mod averager;
pub mod channel_filter;
pub mod demod;
pub mod engine;
pub mod fft;
pub mod handler;

pub use accumulator::SampleAccumulator;
pub use averager::SpectrumAverager;
pub use channel_filter::ChannelFilter;
pub use demod::Demodulator;
pub use engine::Engine;
pub use fft::FftProcessor;
pub use handler::DataHandler;
