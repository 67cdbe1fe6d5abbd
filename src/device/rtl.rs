//! RTL-SDR device backend, built on the `rtlsdr-rs` bindings to librtlsdr.
//!
//! Grounded in `original_source/src/libs/SdrEngine/RtlSdrDevice.h` (one
//! concrete `ISdrDevice` per hardware API, async read on a dedicated
//! thread) and in `FauxFaux-rtl-sdr-snipper/src/main.rs`, which shows the
//! actual `rtlsdr_rs::RtlSdr` surface this module calls: `open`,
//! `set_center_freq`, `set_sample_rate`, `set_tuner_gain`, `reset_buffer`,
//! `read_sync`, `close`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{error, info};
use rtlsdr_rs::{RtlSdr, TunerGain};

use super::{check_sample_rate, RawIqCallback, SdrDevice};
use crate::error::{Result, WorkbenchError};
use crate::types::DeviceInfo;

const READ_CHUNK_LEN: usize = 16 * 16384;

pub struct RtlSdrDevice {
    sdr: Option<RtlSdr>,
    open: bool,
    center_freq_hz: u64,
    sample_rate_hz: u32,
    gain_tenths_db: i32,
    auto_gain: bool,
    streaming: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl RtlSdrDevice {
    pub fn new() -> Self {
        Self {
            sdr: None,
            open: false,
            center_freq_hz: 100_000_000,
            sample_rate_hz: 2_048_000,
            gain_tenths_db: 0,
            auto_gain: true,
            streaming: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl Default for RtlSdrDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SdrDevice for RtlSdrDevice {
    fn open(&mut self, device_index: usize) -> Result<()> {
        let sdr = RtlSdr::open(device_index)
            .map_err(|e| WorkbenchError::Device(format!("open failed: {e:?}")))?;
        self.sdr = Some(sdr);
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.stop_streaming();
        if let Some(mut sdr) = self.sdr.take() {
            if let Err(e) = sdr.close() {
                error!("RtlSdrDevice: close failed: {e:?}");
            }
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn set_center_frequency(&mut self, frequency_hz: u64) -> Result<()> {
        let sdr = self
            .sdr
            .as_mut()
            .ok_or_else(|| WorkbenchError::Device("device not open".into()))?;
        sdr.set_center_freq(frequency_hz as u32)
            .map_err(|e| WorkbenchError::Device(format!("set_center_freq failed: {e:?}")))?;
        self.center_freq_hz = frequency_hz;
        Ok(())
    }

    fn center_frequency(&self) -> u64 {
        self.center_freq_hz
    }

    fn set_sample_rate(&mut self, rate_hz: u32) -> Result<()> {
        check_sample_rate(rate_hz)?;
        let sdr = self
            .sdr
            .as_mut()
            .ok_or_else(|| WorkbenchError::Device("device not open".into()))?;
        sdr.set_sample_rate(rate_hz)
            .map_err(|e| WorkbenchError::Device(format!("set_sample_rate failed: {e:?}")))?;
        self.sample_rate_hz = rate_hz;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate_hz
    }

    fn set_auto_gain(&mut self, enabled: bool) -> Result<()> {
        let sdr = self
            .sdr
            .as_mut()
            .ok_or_else(|| WorkbenchError::Device("device not open".into()))?;
        let gain = if enabled {
            TunerGain::Auto
        } else {
            TunerGain::Manual(self.gain_tenths_db)
        };
        sdr.set_tuner_gain(gain)
            .map_err(|e| WorkbenchError::Device(format!("set_tuner_gain failed: {e:?}")))?;
        self.auto_gain = enabled;
        Ok(())
    }

    fn set_gain(&mut self, tenths_db: i32) -> Result<()> {
        let sdr = self
            .sdr
            .as_mut()
            .ok_or_else(|| WorkbenchError::Device("device not open".into()))?;
        sdr.set_tuner_gain(TunerGain::Manual(tenths_db))
            .map_err(|e| WorkbenchError::Device(format!("set_tuner_gain failed: {e:?}")))?;
        self.auto_gain = false;
        self.gain_tenths_db = tenths_db;
        Ok(())
    }

    fn gain(&self) -> i32 {
        self.gain_tenths_db
    }

    fn gain_values(&self) -> Vec<i32> {
        // librtlsdr's discrete E4000/R820T gain steps, tenths of a dB.
        vec![
            0, 9, 14, 27, 37, 77, 87, 125, 144, 157, 166, 197, 207, 229, 254, 280, 297, 328, 338,
            364, 372, 386, 402, 421, 434, 439, 445, 480, 496,
        ]
    }

    fn start_streaming(&mut self, mut callback: RawIqCallback, buffer_size: usize) -> Result<()> {
        if buffer_size == 0 || buffer_size % 2 != 0 {
            return Err(WorkbenchError::Capacity(
                "buffer_size must be a positive even number".into(),
            ));
        }
        let mut sdr = self
            .sdr
            .take()
            .ok_or_else(|| WorkbenchError::Device("device not open".into()))?;

        sdr.reset_buffer()
            .map_err(|e| WorkbenchError::Device(format!("reset_buffer failed: {e:?}")))?;

        self.streaming.store(true, Ordering::SeqCst);
        let streaming = self.streaming.clone();
        let chunk_len = buffer_size.min(READ_CHUNK_LEN);

        let worker = thread::spawn(move || {
            let mut buf = vec![0u8; chunk_len];
            while streaming.load(Ordering::SeqCst) {
                match sdr.read_sync(&mut buf) {
                    Ok(len) if len > 0 => callback(&buf[..len]),
                    Ok(_) => continue,
                    Err(e) => {
                        error!("RtlSdrDevice: read_sync failed: {e:?}");
                        break;
                    }
                }
            }
            let _ = sdr.close();
        });

        self.worker = Some(worker);
        info!("RtlSdrDevice: streaming started ({chunk_len} bytes/read)");
        Ok(())
    }

    fn stop_streaming(&mut self) {
        self.streaming.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    fn name(&self) -> String {
        "RTL-SDR".to_string()
    }

    fn enumerate_devices(&self) -> Vec<DeviceInfo> {
        // rtlsdr-rs does not expose a device-enumeration API beyond index-based
        // open (spec.md Non-goals: "tuner hardware discovery beyond index-based
        // open"), so a single best-effort entry is reported for index 0.
        vec![DeviceInfo {
            index: 0,
            name: "RTL-SDR".to_string(),
            manufacturer: "Realtek".to_string(),
            product: "RTL2838".to_string(),
            serial: String::new(),
        }]
    }
}
