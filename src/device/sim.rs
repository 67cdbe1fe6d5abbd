//! Synthetic-tone device, used by the demo binary and by tests in place of
//! real hardware. The original C++ source only ever targets real librtlsdr
//! hardware (`original_source/.../RtlSdrDevice.h`); a software-only
//! re-implementation needs a stand-in to be runnable and testable without a
//! dongle attached, so this module supplements it.

use std::thread;
use std::time::Duration;

use log::{debug, info};

use super::{check_sample_rate, RawIqCallback, SdrDevice};
use crate::error::{Result, WorkbenchError};
use crate::types::DeviceInfo;

/// Emits raw 8-bit unsigned I/Q pairs for a pure tone at `tone_offset_hz`
/// relative to the configured centre frequency, the same byte convention
/// (`(byte - 127.5) / 127.5`) the accumulator expects on decode.
pub struct SimulatedDevice {
    open: bool,
    streaming: bool,
    center_freq_hz: u64,
    sample_rate_hz: u32,
    gain_tenths_db: i32,
    auto_gain: bool,
    tone_offset_hz: f64,
    worker: Option<thread::JoinHandle<()>>,
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl SimulatedDevice {
    pub fn new(tone_offset_hz: f64) -> Self {
        Self {
            open: false,
            streaming: false,
            center_freq_hz: 100_000_000,
            sample_rate_hz: 2_048_000,
            gain_tenths_db: 0,
            auto_gain: true,
            tone_offset_hz,
            worker: None,
            stop: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl SdrDevice for SimulatedDevice {
    fn open(&mut self, device_index: usize) -> Result<()> {
        debug!("SimulatedDevice: opening index {device_index}");
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.stop_streaming();
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn set_center_frequency(&mut self, frequency_hz: u64) -> Result<()> {
        self.center_freq_hz = frequency_hz;
        Ok(())
    }

    fn center_frequency(&self) -> u64 {
        self.center_freq_hz
    }

    fn set_sample_rate(&mut self, rate_hz: u32) -> Result<()> {
        check_sample_rate(rate_hz)?;
        self.sample_rate_hz = rate_hz;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate_hz
    }

    fn set_auto_gain(&mut self, enabled: bool) -> Result<()> {
        self.auto_gain = enabled;
        Ok(())
    }

    fn set_gain(&mut self, tenths_db: i32) -> Result<()> {
        self.auto_gain = false;
        self.gain_tenths_db = tenths_db;
        Ok(())
    }

    fn gain(&self) -> i32 {
        self.gain_tenths_db
    }

    fn gain_values(&self) -> Vec<i32> {
        (0..=490).step_by(10).collect()
    }

    fn start_streaming(&mut self, mut callback: RawIqCallback, buffer_size: usize) -> Result<()> {
        if !self.open {
            return Err(WorkbenchError::Device("device not open".into()));
        }
        if self.streaming {
            return Ok(());
        }
        if buffer_size == 0 || buffer_size % 2 != 0 {
            return Err(WorkbenchError::Capacity(
                "buffer_size must be a positive even number".into(),
            ));
        }

        self.stop.store(false, std::sync::atomic::Ordering::SeqCst);
        let stop = self.stop.clone();
        let sample_rate_hz = self.sample_rate_hz as f64;
        let tone_hz = self.tone_offset_hz;

        let (tx, rx) = std::sync::mpsc::channel::<Vec<u8>>();
        let worker = thread::spawn(move || {
            let mut phase = 0.0f64;
            let phase_step = 2.0 * std::f64::consts::PI * tone_hz / sample_rate_hz;
            while !stop.load(std::sync::atomic::Ordering::SeqCst) {
                let mut block = vec![0u8; buffer_size];
                for pair in block.chunks_mut(2) {
                    let i = (phase.cos() * 80.0 + 127.5).clamp(0.0, 255.0) as u8;
                    let q = (phase.sin() * 80.0 + 127.5).clamp(0.0, 255.0) as u8;
                    pair[0] = i;
                    pair[1] = q;
                    phase += phase_step;
                }
                if tx.send(block).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(10));
            }
        });

        let dispatch_stop = self.stop.clone();
        thread::spawn(move || {
            while !dispatch_stop.load(std::sync::atomic::Ordering::SeqCst) {
                match rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(block) => callback(&block),
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        self.worker = Some(worker);
        self.streaming = true;
        info!("SimulatedDevice: streaming started ({buffer_size} bytes/block)");
        Ok(())
    }

    fn stop_streaming(&mut self) {
        if !self.streaming {
            return;
        }
        self.stop.store(true, std::sync::atomic::Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.streaming = false;
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn name(&self) -> String {
        "Simulated SDR".to_string()
    }

    fn enumerate_devices(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            index: 0,
            name: "Simulated SDR".to_string(),
            manufacturer: "sdr-workbench".to_string(),
            product: "sim".to_string(),
            serial: "0000".to_string(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn streams_even_length_blocks() {
        let mut dev = SimulatedDevice::new(1000.0);
        dev.open(0).unwrap();
        dev.set_sample_rate(2_048_000).unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        dev.start_streaming(
            Box::new(move |bytes| received_clone.lock().unwrap().push(bytes.to_vec())),
            256,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        dev.stop_streaming();

        let blocks = received.lock().unwrap();
        assert!(!blocks.is_empty());
        for block in blocks.iter() {
            assert_eq!(block.len() % 2, 0);
        }
    }

    #[test]
    fn rejects_unsupported_sample_rate() {
        let mut dev = SimulatedDevice::default();
        assert!(dev.set_sample_rate(12345).is_err());
    }
}
