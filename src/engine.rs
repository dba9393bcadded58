// src/engine.rs
use std::path::Path;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::config::Settings;
use crate::drivers::pipeline::MIN_DISPLAY_SAMPLES;
use crate::drivers::{
    save_spectrogram, save_waveform, Acquisition, MonitorError, SignalPipeline,
    SimulatedTransport, Transport,
};
use crate::serial::{find_device, SerialTransport};
use crate::storage;
use crate::types::*;

/// Commands handled per loop pass before the signal work runs.
const COMMANDS_PER_PASS: usize = 10;
/// Longest the loop sleeps, so commands are never left waiting long.
const MAX_IDLE: Duration = Duration::from_millis(50);

/// Starts the acquisition loop on its own thread. Both cadences (fast poll
/// and display/spectrogram refresh) run on this one thread, so the rolling
/// buffer needs no lock.
pub fn spawn_thread(
    settings: Settings,
    tx: Sender<MonitorEvent>,
    rx_cmd: Receiver<MonitorCommand>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("eeg-engine".into())
        .spawn(move || Engine::new(settings, tx).run(rx_cmd))
}

pub struct Engine {
    settings: Settings,
    acquisition: Acquisition,
    tx: Sender<MonitorEvent>,
    next_poll: Instant,
    next_display: Instant,
    next_spectrogram: Instant,
}

impl Engine {
    pub fn new(settings: Settings, tx: Sender<MonitorEvent>) -> Self {
        let now = Instant::now();
        Self {
            acquisition: Acquisition::new(&settings),
            settings,
            tx,
            next_poll: now,
            next_display: now,
            next_spectrogram: now,
        }
    }

    pub fn acquisition(&self) -> &Acquisition {
        &self.acquisition
    }

    pub fn run(mut self, rx_cmd: Receiver<MonitorCommand>) {
        self.send(MonitorEvent::Log("EEG engine ready".to_owned()));
        'outer: loop {
            for _ in 0..COMMANDS_PER_PASS {
                match rx_cmd.try_recv() {
                    Ok(cmd) => {
                        if !self.handle(cmd) {
                            break 'outer;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'outer,
                }
            }
            self.tick(Instant::now());
            let wake = self.next_poll.min(self.next_display).min(self.next_spectrogram);
            thread::sleep(wake.saturating_duration_since(Instant::now()).min(MAX_IDLE));
        }
        self.shutdown();
    }

    /// Returns `false` once the engine should stop.
    pub fn handle(&mut self, cmd: MonitorCommand) -> bool {
        match cmd {
            MonitorCommand::Connect(target) => self.connect(target),
            MonitorCommand::Disconnect => {
                let was_recording = self.acquisition.is_recording();
                match self.acquisition.disconnect() {
                    Ok(message) => {
                        self.recording_ended(was_recording, "Recording stopped by disconnect");
                        self.send(MonitorEvent::Connection(ConnectionState::Disconnected, message));
                    }
                    Err(e) => self.log(e.to_string()),
                }
            }
            MonitorCommand::StartRecording => self.start_recording(),
            MonitorCommand::StopRecording => self.stop_recording(),
            MonitorCommand::ToggleRecording => {
                if self.acquisition.is_recording() {
                    self.stop_recording();
                } else {
                    self.start_recording();
                }
            }
            MonitorCommand::UpdateSettings(settings) => match settings.validate() {
                Ok(()) => {
                    self.settings = *settings;
                    self.log("Settings updated".to_owned());
                }
                Err(e) => self.log(format!("Settings rejected: {e}")),
            },
            MonitorCommand::ExportCsv(path) => {
                let window = self.acquisition.snapshot();
                let message = storage::export_csv(&path, &window.timestamps, &window.values)
                    .unwrap_or_else(|e| format!("Error exporting data: {e}"));
                self.log(message);
            }
            MonitorCommand::SaveSpectrogram(dir) => {
                let message = self
                    .save_spectrogram(&dir)
                    .unwrap_or_else(|e| format!("Error saving spectrogram: {e}"));
                self.log(message);
            }
            MonitorCommand::SaveWaveform(dir) => {
                let message = self
                    .save_waveform(&dir)
                    .unwrap_or_else(|e| format!("Error saving waveform: {e}"));
                self.log(message);
            }
            MonitorCommand::Shutdown => return false,
        }
        true
    }

    /// Runs whichever cadences are due at `now`.
    pub fn tick(&mut self, now: Instant) {
        if now >= self.next_poll {
            self.poll(now);
            self.next_poll = now + self.settings.poll_interval();
        }
        if now >= self.next_display {
            self.next_display = now + self.settings.update_interval();
            let window = self.acquisition.snapshot();
            if let Some(frame) = SignalPipeline::new(&self.settings).display_frame(&window) {
                self.send(MonitorEvent::Display(frame));
            }
        }
        if now >= self.next_spectrogram {
            self.next_spectrogram = now + self.settings.spectrogram_update();
            let window = self.acquisition.snapshot();
            if let Some(frame) = SignalPipeline::new(&self.settings).spectrogram_frame(&window) {
                self.send(MonitorEvent::Spectrogram(frame));
            }
        }
    }

    fn connect(&mut self, target: ConnectionTarget) {
        let was_recording = self.acquisition.is_recording();
        let settings = self.settings.clone();
        let result = match target {
            ConnectionTarget::Simulation => self.acquisition.connect_with(&settings, || {
                let sim = SimulatedTransport::new(
                    settings.simulation.clone(),
                    settings.sampling_rate_hz(),
                );
                Ok(Box::new(sim) as Box<dyn Transport>)
            }),
            ConnectionTarget::Serial(port) => {
                let port = port
                    .filter(|p| p != "auto")
                    .unwrap_or_else(|| find_device(&settings));
                self.acquisition.connect_with(&settings, || {
                    let link = SerialTransport::open(&port, settings.baud_rate)?;
                    Ok(Box::new(link) as Box<dyn Transport>)
                })
            }
        };
        self.recording_ended(was_recording, "Recording stopped by reconnect");
        match result {
            Ok(message) => self.send(MonitorEvent::Connection(ConnectionState::Connected, message)),
            Err(e) => self.send(MonitorEvent::Connection(
                self.acquisition.state(),
                format!("Error connecting: {e}"),
            )),
        }
    }

    fn poll(&mut self, now: Instant) {
        let was_recording = self.acquisition.is_recording();
        match self.acquisition.poll_at(now, &self.settings) {
            Ok(report) => {
                if let Some(reason) = report.recording_error {
                    self.send(MonitorEvent::Recording(
                        RecordingState::Idle,
                        format!("Recording aborted: {reason}"),
                    ));
                }
            }
            Err(e) => {
                self.recording_ended(was_recording, "Recording stopped: connection lost");
                self.send(MonitorEvent::Connection(
                    self.acquisition.state(),
                    format!("Error reading data: {e}"),
                ));
            }
        }
    }

    fn start_recording(&mut self) {
        match self.acquisition.start_recording(&self.settings) {
            Ok(message) => self.send(MonitorEvent::Recording(RecordingState::Recording, message)),
            Err(e) => self.log(e.to_string()),
        }
    }

    fn stop_recording(&mut self) {
        match self.acquisition.stop_recording() {
            Ok(summary) => self.send(MonitorEvent::Recording(
                RecordingState::Idle,
                summary.to_string(),
            )),
            Err(e) => self.log(e.to_string()),
        }
    }

    fn save_spectrogram(&self, dir: &Path) -> Result<String, MonitorError> {
        let window = self.acquisition.snapshot();
        let frame = SignalPipeline::new(&self.settings)
            .spectrogram_frame(&window)
            .ok_or(MonitorError::InsufficientData {
                needed: self.settings.sampling_rate as usize,
                available: window.len(),
            })?;
        let path = save_spectrogram(dir, &frame.spectrogram)?;
        Ok(format!("Saved spectrogram to {}", path.display()))
    }

    fn save_waveform(&self, dir: &Path) -> Result<String, MonitorError> {
        let window = self.acquisition.snapshot();
        let frame = SignalPipeline::new(&self.settings)
            .display_frame(&window)
            .ok_or(MonitorError::InsufficientData {
                needed: MIN_DISPLAY_SAMPLES,
                available: window.len(),
            })?;
        let path = save_waveform(dir, &frame)?;
        Ok(format!("Saved waveform to {}", path.display()))
    }

    fn recording_ended(&self, was_recording: bool, message: &str) {
        if was_recording && !self.acquisition.is_recording() {
            self.send(MonitorEvent::Recording(RecordingState::Idle, message.to_owned()));
        }
    }

    fn shutdown(&mut self) {
        let was_connected = self.acquisition.is_connected();
        let was_recording = self.acquisition.is_recording();
        self.acquisition.shutdown();
        self.recording_ended(was_recording, "Recording stopped by shutdown");
        if was_connected {
            self.send(MonitorEvent::Connection(
                ConnectionState::Disconnected,
                "Engine stopped".to_owned(),
            ));
        }
        info!("engine stopped");
    }

    fn log(&self, message: String) {
        info!("{message}");
        self.send(MonitorEvent::Log(message));
    }

    fn send(&self, event: MonitorEvent) {
        if self.tx.send(event).is_err() {
            warn!("event receiver dropped");
        }
    }
}
