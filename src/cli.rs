use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "eeg-monitor", about = "Real-time single-channel EEG acquisition and analysis")]
pub struct Cli {
    /// JSON settings file; missing keys take their defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial port, or "auto" to pick one
    #[arg(short, long, default_value = "auto")]
    pub port: String,

    /// Use the built-in signal simulator instead of a device
    #[arg(long)]
    pub simulate: bool,

    /// Record raw bytes from the moment the link is up
    #[arg(short, long)]
    pub record: bool,

    /// Stop after this many seconds (0 or absent: run until the link drops)
    #[arg(short, long)]
    pub seconds: Option<f64>,

    /// Save spectrogram and waveform PNGs here before exiting
    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,

    /// Export the buffered samples as CSV before exiting
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// List serial ports and exit
    #[arg(long)]
    pub list_ports: bool,
}

impl Cli {
    /// How long to run; `None` means until the link drops or Ctrl-C.
    pub fn run_duration(&self) -> Result<Option<Duration>> {
        match self.seconds {
            Some(s) if s > 0.0 => Duration::try_from_secs_f64(s)
                .map(Some)
                .with_context(|| format!("--seconds {s} is out of range")),
            _ => Ok(None),
        }
    }
}
