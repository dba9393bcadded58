// src/types.rs
use std::path::PathBuf;

use crate::config::Settings;
use crate::drivers::{DisplayFrame, SpectrogramFrame};

// Where samples come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionTarget {
    Simulation,
    /// `None` picks the preferred discovered device.
    Serial(Option<String>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// Dropped because the transport failed; behaves like `Disconnected`.
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

// Commands sent to the engine thread
#[derive(Clone, Debug)]
pub enum MonitorCommand {
    Connect(ConnectionTarget),
    Disconnect,
    StartRecording,
    StopRecording,
    ToggleRecording,
    UpdateSettings(Box<Settings>),
    ExportCsv(PathBuf),
    SaveSpectrogram(PathBuf),
    SaveWaveform(PathBuf),
    Shutdown,
}

// Messages sent back to the view layer
#[derive(Clone, Debug)]
pub enum MonitorEvent {
    Log(String),
    Connection(ConnectionState, String),
    Recording(RecordingState, String),
    Display(DisplayFrame),
    Spectrogram(SpectrogramFrame),
}
