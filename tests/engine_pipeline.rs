//! End-to-end exercise of the engine with the synthetic device: a full
//! device -> accumulator -> FFT -> averager -> channel filter -> demod
//! pipeline under `Engine::start`/`stop`, matching the `tests/` layout used
//! for the DSP-heavy reference repo in the pack rather than co-located
//! `#[cfg(test)]` units (spec.md §8, SPEC_FULL.md §8).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sdr_workbench::device::SimulatedDevice;
use sdr_workbench::dsp::Engine;
use sdr_workbench::types::{DemodMode, WindowFunction};

#[test]
fn full_pipeline_publishes_spectrum_raw_and_filtered_iq() {
    let engine = Engine::new(Box::new(SimulatedDevice::new(100_000.0))).unwrap();
    engine.set_fft_size(256).unwrap();
    engine.set_sample_rate(2_048_000).unwrap();
    engine.set_window_function(WindowFunction::Hanning).unwrap();

    engine.channel_filter().configure(100_000.0, 200_000.0, 2_048_000.0).unwrap();
    engine.channel_filter().set_enabled(true);
    engine
        .demodulator()
        .configure(DemodMode::FmMono, engine.channel_filter().output_sample_rate().unwrap(), Some(48_000.0))
        .unwrap();

    let spectrum_count = Arc::new(AtomicUsize::new(0));
    let raw_count = Arc::new(AtomicUsize::new(0));
    let filtered_count = Arc::new(AtomicUsize::new(0));
    let demod_samples = Arc::new(AtomicUsize::new(0));

    {
        let spectrum_count = spectrum_count.clone();
        engine.register_spectrum_listener(move |spectrum| {
            assert_eq!(spectrum.magnitudes_db.len(), spectrum.fft_size);
            spectrum_count.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let raw_count = raw_count.clone();
        engine.register_raw_iq_listener(move |_| {
            raw_count.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let filtered_count = filtered_count.clone();
        let demod_samples = demod_samples.clone();
        engine.register_filtered_iq_listener(move |iq| {
            filtered_count.fetch_add(1, Ordering::SeqCst);
            demod_samples.fetch_add(iq.samples.len(), Ordering::SeqCst);
        });
    }

    engine.start(0).unwrap();
    thread::sleep(Duration::from_millis(300));
    engine.stop();

    assert!(spectrum_count.load(Ordering::SeqCst) > 0, "no spectrum published");
    assert!(raw_count.load(Ordering::SeqCst) > 0, "no raw I/Q published");
    assert!(filtered_count.load(Ordering::SeqCst) > 0, "no filtered I/Q published");
    assert!(demod_samples.load(Ordering::SeqCst) > 0, "filtered I/Q carried no samples");
}

#[test]
fn reconfiguring_fft_size_mid_run_does_not_deadlock() {
    let engine = Engine::new(Box::new(SimulatedDevice::new(0.0))).unwrap();
    engine.set_fft_size(128).unwrap();
    engine.start(0).unwrap();
    thread::sleep(Duration::from_millis(50));
    engine.set_fft_size(256).unwrap();
    thread::sleep(Duration::from_millis(100));
    engine.stop();
    assert_eq!(engine.fft_size(), 256);
}

#[test]
fn stopped_engine_can_be_restarted_with_a_new_device() {
    let engine = Engine::new(Box::new(SimulatedDevice::new(0.0))).unwrap();
    engine.set_fft_size(64).unwrap();
    engine.start(0).unwrap();
    thread::sleep(Duration::from_millis(50));
    engine.stop();

    engine.set_device(Box::new(SimulatedDevice::new(50_000.0))).unwrap();
    engine.start(0).unwrap();
    thread::sleep(Duration::from_millis(50));
    engine.stop();
}
