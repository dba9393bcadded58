// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drivers::MonitorError;

/// Largest rolling buffer a configuration may ask for (about 5.5 h at 500 Hz).
pub const MAX_BUFFER_SAMPLES: usize = 10_000_000;

/// Runtime configuration. Every operation reads the values it needs at call
/// time, so a change only affects the next poll / refresh.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub serial_port: String,
    pub baud_rate: u32,
    pub use_bluetooth: bool,
    pub bluetooth_device_name: String,
    pub sampling_rate: u32,
    /// Seconds of signal shown in the time-domain view.
    pub display_duration: f64,
    /// Display refresh period in milliseconds.
    pub update_interval_ms: u64,
    /// Seconds of signal kept for the spectrogram (also the buffer length).
    pub spectrogram_duration: f64,
    pub spectrogram_update_ms: u64,
    pub spectrogram_band: FrequencyBand,
    pub filter: FilterSettings,
    pub display: DisplaySettings,
    pub recording: RecordingSettings,
    pub simulation: SimulationSettings,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub min_hz: f64,
    pub max_hz: f64,
}

impl FrequencyBand {
    pub fn contains(&self, freq_hz: f64) -> bool {
        freq_hz >= self.min_hz && freq_hz <= self.max_hz
    }
}

impl Default for FrequencyBand {
    fn default() -> Self {
        Self {
            min_hz: 0.0,
            max_hz: 70.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub highpass_hz: f64,
    pub lowpass_hz: f64,
    pub notch_hz: f64,
    pub enabled: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            highpass_hz: 0.5,
            lowpass_hz: 70.0,
            notch_hz: 60.0,
            enabled: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Microvolts per vertical division.
    pub scale: f64,
    pub sensitivity: f64,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            scale: 100.0,
            sensitivity: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub directory: PathBuf,
    pub prefix: String,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("recordings"),
            prefix: "EEG_RECORDING".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub frequencies_hz: Vec<f64>,
    pub amplitudes: Vec<f64>,
    pub noise_level: f64,
    pub artifact_probability: f64,
    pub artifact_amplitude: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            frequencies_hz: vec![3.0, 10.0, 30.0],
            amplitudes: vec![10.0, 5.0, 2.0],
            noise_level: 2.0,
            artifact_probability: 0.001,
            artifact_amplitude: 50.0,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            serial_port: "/dev/cu.usbserial-0001".to_owned(),
            baud_rate: 115_200,
            use_bluetooth: true,
            bluetooth_device_name: "404-BrainNotFound".to_owned(),
            sampling_rate: 500,
            display_duration: 10.0,
            update_interval_ms: 20,
            spectrogram_duration: 30.0,
            spectrogram_update_ms: 500,
            spectrogram_band: FrequencyBand::default(),
            filter: FilterSettings::default(),
            display: DisplaySettings::default(),
            recording: RecordingSettings::default(),
            simulation: SimulationSettings::default(),
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        let text = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&text)
            .map_err(|e| MonitorError::Config(format!("{}: {e}", path.display())))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.sampling_rate == 0 {
            return Err(MonitorError::InvalidSampleRate);
        }
        if !(self.display_duration > 0.0 && self.spectrogram_duration > 0.0) {
            return Err(MonitorError::InvalidSetting(
                "window durations must be positive".into(),
            ));
        }
        let buffered = self.spectrogram_duration * self.sampling_rate_hz();
        if !(buffered <= MAX_BUFFER_SAMPLES as f64) {
            return Err(MonitorError::InvalidSetting(format!(
                "spectrogram window of {buffered} samples exceeds {MAX_BUFFER_SAMPLES}"
            )));
        }
        if self.update_interval_ms == 0 || self.spectrogram_update_ms == 0 {
            return Err(MonitorError::InvalidSetting(
                "refresh intervals must be positive".into(),
            ));
        }
        if self.spectrogram_band.max_hz <= self.spectrogram_band.min_hz {
            return Err(MonitorError::InvalidSetting(
                "spectrogram band upper bound must exceed lower bound".into(),
            ));
        }
        self.validate_filter()
    }

    /// Rejects cutoffs that can never be designed at this sampling rate, so
    /// the chain does not fail the same stage on every refresh.
    fn validate_filter(&self) -> Result<(), MonitorError> {
        let filter = &self.filter;
        if !filter.enabled {
            return Ok(());
        }
        let nyquist = self.nyquist_hz();
        if filter.highpass_hz > 0.0 && filter.highpass_hz >= nyquist {
            return Err(MonitorError::InvalidSetting(format!(
                "highpass {} Hz must be below Nyquist ({nyquist} Hz)",
                filter.highpass_hz
            )));
        }
        if !(filter.lowpass_hz > 0.0) {
            return Err(MonitorError::InvalidSetting(format!(
                "lowpass {} Hz must be positive",
                filter.lowpass_hz
            )));
        }
        if filter.notch_hz > 0.0 && filter.notch_hz >= nyquist {
            return Err(MonitorError::InvalidSetting(format!(
                "notch {} Hz must be below Nyquist ({nyquist} Hz)",
                filter.notch_hz
            )));
        }
        Ok(())
    }

    pub fn sampling_rate_hz(&self) -> f64 {
        self.sampling_rate as f64
    }

    pub fn nyquist_hz(&self) -> f64 {
        self.sampling_rate_hz() * 0.5
    }

    pub fn display_buffer_size(&self) -> usize {
        (self.display_duration * self.sampling_rate_hz()) as usize
    }

    pub fn spectrogram_buffer_size(&self) -> usize {
        (self.spectrogram_duration * self.sampling_rate_hz()) as usize
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// The fast poll runs four times per display refresh.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis((self.update_interval_ms / 4).max(1))
    }

    pub fn spectrogram_update(&self) -> Duration {
        Duration::from_millis(self.spectrogram_update_ms)
    }
}
