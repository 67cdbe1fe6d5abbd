//! Engine: owns the device, FFT processor, accumulator, channel filter,
//! demodulator, and the three published data streams (spectrum, raw I/Q,
//! filtered I/Q).
//!
//! Grounded in `original_source/src/libs/SdrEngine/SdrEngine.h` — the full
//! setter/getter surface, the mutex+condvar accumulation hand-off, and the
//! processing-thread pipeline are carried across one-for-one; threading
//! itself follows the teacher's `start_sampling_thread`/`build_input_stream`
//! restart-and-join shape in `audio_stream.rs`.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{error, info, warn};

use crate::device::SdrDevice;
use crate::dsp::{ChannelFilter, DataHandler, Demodulator, FftProcessor, SampleAccumulator, SpectrumAverager};
use crate::error::{Result, WorkbenchError};
use crate::types::{IqBuffer, SpectrumData, WindowFunction};

const HANDLER_CAPACITY: usize = 8;
const DEFAULT_FFT_SIZE: usize = 2048;

/// DSP components and publisher queues, held behind a single `Arc` so the
/// processing thread can own a cheap clone of it without borrowing `Engine`.
struct Shared {
    fft: FftProcessor,
    averager: SpectrumAverager,
    channel_filter: ChannelFilter,
    demodulator: Demodulator,
    spectrum_handler: DataHandler<Arc<SpectrumData>>,
    raw_iq_handler: DataHandler<Arc<IqBuffer>>,
    filtered_iq_handler: DataHandler<Arc<IqBuffer>>,
    dc_spike_removal: AtomicBool,
}

/// Owns the tuner, the DSP chain, and the three publisher queues
/// (spectrum, raw I/Q, filtered I/Q) that downstream listeners subscribe to.
pub struct Engine {
    device: Mutex<Box<dyn SdrDevice>>,
    accumulator: Arc<SampleAccumulator>,
    shared: Arc<Shared>,

    center_freq_hz: AtomicU64,
    sample_rate_hz: AtomicU32,
    fft_size: AtomicUsize,
    auto_gain: AtomicBool,
    gain_tenths_db: AtomicU32,

    running: AtomicBool,
    processing_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(device: Box<dyn SdrDevice>) -> Result<Self> {
        Ok(Self {
            device: Mutex::new(device),
            accumulator: Arc::new(SampleAccumulator::new(DEFAULT_FFT_SIZE)),
            shared: Arc::new(Shared {
                fft: FftProcessor::new(DEFAULT_FFT_SIZE, WindowFunction::default())?,
                averager: SpectrumAverager::new(0.0)?,
                channel_filter: ChannelFilter::new(),
                demodulator: Demodulator::new(),
                spectrum_handler: DataHandler::new(HANDLER_CAPACITY),
                raw_iq_handler: DataHandler::new(HANDLER_CAPACITY),
                filtered_iq_handler: DataHandler::new(HANDLER_CAPACITY),
                dc_spike_removal: AtomicBool::new(false),
            }),
            center_freq_hz: AtomicU64::new(100_000_000),
            sample_rate_hz: AtomicU32::new(2_048_000),
            fft_size: AtomicUsize::new(DEFAULT_FFT_SIZE),
            auto_gain: AtomicBool::new(true),
            gain_tenths_db: AtomicU32::new(0),
            running: AtomicBool::new(false),
            processing_thread: Mutex::new(None),
        })
    }

    /// Replace the device. Only permitted while stopped.
    pub fn set_device(&self, device: Box<dyn SdrDevice>) -> Result<()> {
        if self.is_running() {
            return Err(WorkbenchError::Configuration(
                "cannot replace device while engine is running".into(),
            ));
        }
        *self.device.lock().unwrap() = device;
        Ok(())
    }

    pub fn set_center_frequency(&self, frequency_hz: u64) -> Result<()> {
        let mut device = self.device.lock().unwrap();
        if device.is_open() {
            device.set_center_frequency(frequency_hz)?;
        }
        self.center_freq_hz.store(frequency_hz, Ordering::SeqCst);
        Ok(())
    }

    pub fn center_frequency(&self) -> u64 {
        self.center_freq_hz.load(Ordering::SeqCst)
    }

    pub fn set_sample_rate(&self, rate_hz: u32) -> Result<()> {
        let mut device = self.device.lock().unwrap();
        if device.is_open() {
            device.set_sample_rate(rate_hz)?;
        }
        self.sample_rate_hz.store(rate_hz, Ordering::SeqCst);
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate_hz.load(Ordering::SeqCst)
    }

    pub fn set_auto_gain(&self, enabled: bool) -> Result<()> {
        let mut device = self.device.lock().unwrap();
        if device.is_open() {
            device.set_auto_gain(enabled)?;
        }
        self.auto_gain.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_gain(&self, tenths_db: i32) -> Result<()> {
        let mut device = self.device.lock().unwrap();
        if device.is_open() {
            device.set_gain(tenths_db)?;
        }
        self.auto_gain.store(false, Ordering::SeqCst);
        self.gain_tenths_db.store(tenths_db as u32, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_fft_size(&self, fft_size: usize) -> Result<()> {
        self.shared.fft.set_fft_size(fft_size)?;
        self.accumulator.set_fft_size(fft_size);
        self.fft_size.store(fft_size, Ordering::SeqCst);
        Ok(())
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size.load(Ordering::SeqCst)
    }

    pub fn set_window_function(&self, window: WindowFunction) -> Result<()> {
        self.shared.fft.set_window_function(window)
    }

    pub fn window_function(&self) -> WindowFunction {
        self.shared.fft.window_function()
    }

    pub fn set_fft_average_alpha(&self, alpha: f32) -> Result<()> {
        self.shared.averager.set_alpha(alpha)
    }

    pub fn fft_average_alpha(&self) -> f32 {
        self.shared.averager.alpha()
    }

    pub fn set_dc_spike_removal_enabled(&self, enabled: bool) {
        self.accumulator.set_dc_spike_removal_enabled(enabled);
        self.shared.dc_spike_removal.store(enabled, Ordering::SeqCst);
    }

    pub fn dc_spike_removal_enabled(&self) -> bool {
        self.shared.dc_spike_removal.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn channel_filter(&self) -> &ChannelFilter {
        &self.shared.channel_filter
    }

    pub fn demodulator(&self) -> &Demodulator {
        &self.shared.demodulator
    }

    pub fn register_spectrum_listener<F>(&self, listener: F) -> u64
    where
        F: Fn(&Arc<SpectrumData>) + Send + 'static,
    {
        self.shared.spectrum_handler.register_listener(listener)
    }

    pub fn unregister_spectrum_listener(&self, id: u64) {
        self.shared.spectrum_handler.unregister_listener(id);
    }

    pub fn register_raw_iq_listener<F>(&self, listener: F) -> u64
    where
        F: Fn(&Arc<IqBuffer>) + Send + 'static,
    {
        self.shared.raw_iq_handler.register_listener(listener)
    }

    pub fn unregister_raw_iq_listener(&self, id: u64) {
        self.shared.raw_iq_handler.unregister_listener(id);
    }

    pub fn register_filtered_iq_listener<F>(&self, listener: F) -> u64
    where
        F: Fn(&Arc<IqBuffer>) + Send + 'static,
    {
        self.shared.filtered_iq_handler.register_listener(listener)
    }

    pub fn unregister_filtered_iq_listener(&self, id: u64) {
        self.shared.filtered_iq_handler.unregister_listener(id);
    }

    /// Open the device, apply stored settings, and start the processing
    /// thread. Idempotent: a second `start()` while already running is a
    /// no-op.
    pub fn start(&self, device_index: usize) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        {
            let mut device = self.device.lock().unwrap();
            device.open(device_index)?;
            device.set_center_frequency(self.center_freq_hz.load(Ordering::SeqCst))?;
            device.set_sample_rate(self.sample_rate_hz.load(Ordering::SeqCst))?;
            if self.auto_gain.load(Ordering::SeqCst) {
                device.set_auto_gain(true)?;
            } else {
                device.set_gain(self.gain_tenths_db.load(Ordering::SeqCst) as i32)?;
            }
        }

        self.running.store(true, Ordering::SeqCst);

        let accumulator = self.accumulator.clone();
        {
            let mut device = self.device.lock().unwrap();
            device.start_streaming(
                Box::new(move |bytes| {
                    if let Err(e) = accumulator.push_bytes(bytes) {
                        warn!("engine: dropping malformed I/Q block: {e}");
                    }
                }),
                DEFAULT_FFT_SIZE.max(256),
            )?;
        }

        let processing_thread = Self::spawn_processing_thread(
            self.accumulator.clone(),
            self.shared.clone(),
            self.center_freq_hz.load(Ordering::SeqCst),
            self.sample_rate_hz.load(Ordering::SeqCst),
        );
        *self.processing_thread.lock().unwrap() = Some(processing_thread);
        info!("engine started on device index {device_index}");
        Ok(())
    }

    fn spawn_processing_thread(
        accumulator: Arc<SampleAccumulator>,
        shared: Arc<Shared>,
        center_freq_hz: u64,
        sample_rate_hz: u32,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            let center_hz = center_freq_hz as f64;
            let rate_hz = sample_rate_hz as f64;

            loop {
                let Some(block) = accumulator.drain_block() else {
                    break;
                };

                let raw = Arc::new(IqBuffer {
                    samples: block.clone(),
                    center_freq_hz: center_hz,
                    sample_rate_hz: rate_hz,
                    timestamp: Instant::now(),
                });
                shared.raw_iq_handler.signal_data(raw);

                let magnitudes = shared.fft.process(&block);
                let averaged = shared
                    .averager
                    .update(magnitudes, shared.dc_spike_removal.load(Ordering::SeqCst));
                let spectrum = Arc::new(SpectrumData {
                    magnitudes_db: averaged,
                    center_freq_hz: center_hz,
                    bandwidth_hz: rate_hz,
                    fft_size: shared.fft.fft_size(),
                });
                shared.spectrum_handler.signal_data(spectrum);

                if shared.channel_filter.is_enabled() {
                    let filtered_samples = shared.channel_filter.process(&block);
                    if !filtered_samples.is_empty() {
                        let output_rate = shared.channel_filter.output_sample_rate().unwrap_or(rate_hz);
                        let filtered = Arc::new(IqBuffer {
                            samples: filtered_samples,
                            center_freq_hz: center_hz,
                            sample_rate_hz: output_rate,
                            timestamp: Instant::now(),
                        });
                        shared.filtered_iq_handler.signal_data(filtered);
                    }
                }
            }
        })
    }

    /// Stop streaming, join the processing thread, close the device, and
    /// clear all handler subscriptions. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.accumulator.shutdown();

        if let Some(handle) = self.processing_thread.lock().unwrap().take() {
            if handle.join().is_err() {
                error!("engine: processing thread panicked during stop()");
            }
        }

        {
            let mut device = self.device.lock().unwrap();
            device.stop_streaming();
            device.close();
        }

        self.shared.spectrum_handler.clear_listeners();
        self.shared.raw_iq_handler.clear_listeners();
        self.shared.filtered_iq_handler.clear_listeners();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SimulatedDevice;
    use std::time::Duration;

    #[test]
    fn start_stop_cycle_publishes_spectrum_and_raw_iq() {
        let engine = Engine::new(Box::new(SimulatedDevice::new(50_000.0))).unwrap();
        engine.set_fft_size(64).unwrap();
        engine.set_sample_rate(2_048_000).unwrap();

        let spectrum_count = Arc::new(AtomicUsize::new(0));
        let raw_count = Arc::new(AtomicUsize::new(0));
        let spectrum_count_clone = spectrum_count.clone();
        let raw_count_clone = raw_count.clone();
        engine.register_spectrum_listener(move |_| {
            spectrum_count_clone.fetch_add(1, Ordering::SeqCst);
        });
        engine.register_raw_iq_listener(move |_| {
            raw_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        engine.start(0).unwrap();
        thread::sleep(Duration::from_millis(200));
        engine.stop();

        assert!(spectrum_count.load(Ordering::SeqCst) > 0);
        assert!(raw_count.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let engine = Engine::new(Box::new(SimulatedDevice::default())).unwrap();
        engine.stop();
        engine.stop();
        assert!(!engine.is_running());
    }

    #[test]
    fn accumulator_cap_holds_across_start_stop_cycles() {
        let engine = Engine::new(Box::new(SimulatedDevice::new(0.0))).unwrap();
        engine.set_fft_size(64).unwrap();
        engine.start(0).unwrap();
        thread::sleep(Duration::from_millis(100));
        engine.stop();
        assert!(engine.accumulator.len() <= 64 * 16);
    }
}
