use std::time::Instant;

use log::{error, info, warn};

use crate::config::Settings;
use crate::drivers::decoder::SampleDecoder;
use crate::drivers::{MonitorError, RollingBuffer, SampleWindow, Transport};
use crate::recorder::{DataRecorder, RecordingSummary};
use crate::types::ConnectionState;

/// Bytes the connection test will peek at.
const PROBE_BYTES: usize = 20;

/// Result of one fast poll.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PollReport {
    pub samples: usize,
    pub bytes: usize,
    /// Set when the recording had to be abandoned during this poll.
    pub recording_error: Option<String>,
}

/// Owns the device link, the decoder, the rolling buffer and the recorder.
/// Only `poll` mutates the buffer; readers get copies via `snapshot`.
pub struct Acquisition {
    transport: Option<Box<dyn Transport>>,
    port_label: String,
    state: ConnectionState,
    decoder: SampleDecoder,
    buffer: RollingBuffer,
    recorder: DataRecorder,
}

impl Acquisition {
    pub fn new(settings: &Settings) -> Self {
        Self {
            transport: None,
            port_label: String::new(),
            state: ConnectionState::Disconnected,
            decoder: SampleDecoder::new(settings.sampling_rate_hz()),
            buffer: RollingBuffer::with_capacity(settings.spectrogram_buffer_size()),
            recorder: DataRecorder::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    pub fn snapshot(&self) -> SampleWindow {
        self.buffer.snapshot()
    }

    /// Replaces any current link. `open` runs after the old link is torn
    /// down; on success the buffer is emptied and the timeline restarts.
    pub fn connect_with<F>(&mut self, settings: &Settings, open: F) -> Result<String, MonitorError>
    where
        F: FnOnce() -> Result<Box<dyn Transport>, MonitorError>,
    {
        if self.transport.is_some() {
            if let Err(e) = self.disconnect() {
                warn!("closing previous link: {e}");
            }
        }
        match open() {
            Ok(transport) => Ok(self.attach(transport, settings)),
            Err(e) => {
                self.state = ConnectionState::Error;
                error!("connect failed: {e}");
                Err(e)
            }
        }
    }

    pub fn connect(&mut self, transport: Box<dyn Transport>, settings: &Settings) -> String {
        if self.transport.is_some() {
            if let Err(e) = self.disconnect() {
                warn!("closing previous link: {e}");
            }
        }
        self.attach(transport, settings)
    }

    fn attach(&mut self, transport: Box<dyn Transport>, settings: &Settings) -> String {
        self.port_label = transport.describe();
        self.transport = Some(transport);
        self.state = ConnectionState::Connected;
        self.buffer.set_capacity(settings.spectrogram_buffer_size());
        self.buffer.clear();
        self.decoder.set_sampling_rate(settings.sampling_rate_hz());
        self.decoder.reset(Instant::now());
        info!("connected to {}", self.port_label);
        format!("Connected to {}", self.port_label)
    }

    /// Stops any recording, then closes the link.
    pub fn disconnect(&mut self) -> Result<String, MonitorError> {
        let mut transport = self.transport.take().ok_or(MonitorError::NotConnected)?;
        let saved = self.finish_recording();
        if let Err(e) = transport.close() {
            warn!("closing {}: {e}", self.port_label);
        }
        self.state = ConnectionState::Disconnected;
        info!("disconnected from {}", self.port_label);
        let mut message = format!("Disconnected from {}", self.port_label);
        if let Some(summary) = saved {
            message.push_str(&format!("; {summary}"));
        }
        Ok(message)
    }

    pub fn poll(&mut self, settings: &Settings) -> Result<PollReport, MonitorError> {
        self.poll_at(Instant::now(), settings)
    }

    /// Drains whatever the transport has ready into the buffer (and the
    /// recording). Without a link this is an empty no-op; a transport
    /// failure drops the link and is returned as the error.
    pub fn poll_at(&mut self, now: Instant, settings: &Settings) -> Result<PollReport, MonitorError> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(PollReport::default());
        };
        self.buffer.set_capacity(settings.spectrogram_buffer_size());
        self.decoder.set_sampling_rate(settings.sampling_rate_hz());
        let elapsed = self.decoder.mark_poll(now);
        let bytes = match transport
            .bytes_available()
            .and_then(|n| if n == 0 { Ok(Vec::new()) } else { transport.read(n) })
        {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.lose_connection(e)),
        };
        if bytes.is_empty() {
            return Ok(PollReport::default());
        }
        let decoded = self.decoder.decode(&bytes, elapsed);
        let mut report = PollReport {
            samples: decoded.samples.len(),
            bytes: bytes.len(),
            recording_error: None,
        };
        if let Err(e) = self.recorder.write(&decoded.raw) {
            report.recording_error = Some(e.to_string());
        }
        self.buffer.extend(decoded.samples);
        Ok(report)
    }

    pub fn start_recording(&mut self, settings: &Settings) -> Result<String, MonitorError> {
        if !self.is_connected() {
            return Err(MonitorError::NotConnected);
        }
        let path = self
            .recorder
            .start(&settings.recording, settings.sampling_rate, &self.port_label)?;
        Ok(format!("Recording to {}", path.display()))
    }

    pub fn stop_recording(&mut self) -> Result<RecordingSummary, MonitorError> {
        self.recorder.stop()
    }

    pub fn toggle_recording(&mut self, settings: &Settings) -> Result<String, MonitorError> {
        if self.is_recording() {
            self.stop_recording().map(|summary| summary.to_string())
        } else {
            self.start_recording(settings)
        }
    }

    /// `(alive, message)` for the status bar.
    pub fn connection_status(&mut self) -> (bool, String) {
        let Some(transport) = self.transport.as_mut() else {
            return (false, "Not connected".to_owned());
        };
        match transport.bytes_available() {
            Ok(waiting) => (true, format!("Active ({waiting} bytes waiting)")),
            Err(_) => (false, "Connection error".to_owned()),
        }
    }

    /// Peeks at up to 20 waiting bytes and reports them as hex. The bytes
    /// are consumed.
    pub fn test_connection(&mut self) -> Result<String, MonitorError> {
        let transport = self.transport.as_mut().ok_or(MonitorError::NotConnected)?;
        let waiting = transport.bytes_available()?;
        if waiting == 0 {
            return Ok("No data in buffer. Verify device is sending data.".to_owned());
        }
        let probe = transport.read(waiting.min(PROBE_BYTES))?;
        let hex: Vec<String> = probe.iter().map(|b| format!("{b:02x}")).collect();
        Ok(format!(
            "Data received ({} bytes): {}",
            probe.len(),
            hex.join(" ")
        ))
    }

    /// Teardown path: never fails.
    pub fn shutdown(&mut self) {
        match self.disconnect() {
            Ok(message) => info!("{message}"),
            Err(MonitorError::NotConnected) => {}
            Err(e) => warn!("shutdown: {e}"),
        }
    }

    #[cfg(test)]
    pub(crate) fn recorder_mut(&mut self) -> &mut DataRecorder {
        &mut self.recorder
    }

    fn finish_recording(&mut self) -> Option<RecordingSummary> {
        if !self.recorder.is_recording() {
            return None;
        }
        match self.recorder.stop() {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!("stopping recording: {e}");
                None
            }
        }
    }

    fn lose_connection(&mut self, cause: MonitorError) -> MonitorError {
        error!("lost {}: {cause}", self.port_label);
        self.finish_recording();
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                warn!("closing {}: {e}", self.port_label);
            }
        }
        self.state = ConnectionState::Error;
        match cause {
            MonitorError::Transport(_) => cause,
            other => MonitorError::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordingSettings;
    use crate::drivers::source::ManualTransport;
    use crate::drivers::decoder::encode_samples;
    use crate::recorder::BrokenSink;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    fn settings_in(dir: &Path) -> Settings {
        Settings {
            recording: RecordingSettings {
                directory: dir.to_path_buf(),
                prefix: "EEG_RECORDING".into(),
            },
            ..Settings::default()
        }
    }

    fn connected(chunks: Vec<Vec<u8>>, settings: &Settings) -> Acquisition {
        let mut acq = Acquisition::new(settings);
        acq.connect(Box::new(ManualTransport::new(chunks)), settings);
        acq
    }

    #[test]
    fn poll_without_connection_is_empty() {
        let settings = Settings::default();
        let mut acq = Acquisition::new(&settings);
        assert_eq!(acq.poll(&settings).unwrap(), PollReport::default());
        assert_eq!(acq.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn polls_fill_the_buffer_in_time_order() {
        let settings = Settings::default();
        let mut acq = connected(
            vec![encode_samples(&[1, 2, 3]), encode_samples(&[4, 5])],
            &settings,
        );
        let t0 = Instant::now();
        assert_eq!(acq.poll_at(t0 + Duration::from_millis(6), &settings).unwrap().samples, 3);
        assert_eq!(acq.poll_at(t0 + Duration::from_millis(10), &settings).unwrap().samples, 2);
        let window = acq.snapshot();
        assert_eq!(window.values, vec![1, 2, 3, 4, 5]);
        assert!(window.timestamps.windows(2).all(|p| p[1] > p[0]));
    }

    #[test]
    fn reconnect_clears_stale_samples() {
        let settings = Settings::default();
        let mut acq = connected(vec![encode_samples(&[9; 50])], &settings);
        acq.poll(&settings).unwrap();
        assert_eq!(acq.buffered_samples(), 50);
        acq.connect(Box::new(ManualTransport::new(vec![encode_samples(&[1])])), &settings);
        assert_eq!(acq.buffered_samples(), 0);
        acq.poll(&settings).unwrap();
        let window = acq.snapshot();
        assert_eq!(window.values, vec![1]);
        assert!(window.timestamps[0] < 1.0);
    }

    #[test]
    fn recording_captures_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let mut acq = connected(vec![vec![0x01, 0x00, 0x02, 0x00]], &settings);
        let message = acq.start_recording(&settings).unwrap();
        assert!(message.starts_with("Recording to "));
        acq.poll(&settings).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let summary = acq.stop_recording().unwrap();
        assert!(summary.duration_seconds > 0.0);
        assert_eq!(fs::read(&summary.path).unwrap(), vec![0x01, 0x00, 0x02, 0x00]);
    }

    #[test]
    fn recording_requires_a_connection() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let mut acq = Acquisition::new(&settings);
        assert!(matches!(
            acq.start_recording(&settings),
            Err(MonitorError::NotConnected)
        ));
        assert!(matches!(acq.stop_recording(), Err(MonitorError::NotRecording)));
    }

    #[test]
    fn disconnect_while_recording_closes_the_file_first() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let mut acq = connected(vec![vec![0x05, 0x00]], &settings);
        acq.toggle_recording(&settings).unwrap();
        acq.poll(&settings).unwrap();
        let message = acq.disconnect().unwrap();
        assert!(message.contains("Saved "));
        assert!(!acq.is_recording());
        assert_eq!(acq.state(), ConnectionState::Disconnected);

        acq.connect(Box::new(ManualTransport::new(vec![vec![0x06, 0x00]])), &settings);
        let started = acq.toggle_recording(&settings).unwrap();
        assert!(started.starts_with("Recording to "));
        acq.poll(&settings).unwrap();
        let summary = acq.stop_recording().unwrap();
        assert_eq!(fs::read(&summary.path).unwrap(), vec![0x06, 0x00]);
        let recordings = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "dat"))
            .count();
        assert_eq!(recordings, 2);
    }

    #[test]
    fn transport_failure_downgrades_and_stops_recording() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let mut acq = Acquisition::new(&settings);
        acq.connect(
            Box::new(ManualTransport::new(vec![vec![1, 0]]).failing_after(1)),
            &settings,
        );
        acq.start_recording(&settings).unwrap();
        acq.poll(&settings).unwrap();
        let err = acq.poll(&settings).unwrap_err();
        assert!(matches!(err, MonitorError::Transport(_)));
        assert_eq!(acq.state(), ConnectionState::Error);
        assert!(!acq.is_recording());
        assert_eq!(acq.poll(&settings).unwrap(), PollReport::default());
        assert_eq!(acq.snapshot().values, vec![1]);
    }

    #[test]
    fn recording_write_failure_keeps_acquiring() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::default();
        let mut acq = connected(
            vec![encode_samples(&[7, 8, 9]), encode_samples(&[10])],
            &settings,
        );
        acq.recorder
            .start_with_writer(dir.path().join("broken.dat"), Box::new(BrokenSink), 500, "test")
            .unwrap();
        let report = acq.poll(&settings).unwrap();
        assert_eq!(report.samples, 3);
        assert!(report
            .recording_error
            .as_deref()
            .is_some_and(|m| m.contains("disk full")));
        assert!(!acq.is_recording());
        assert_eq!(acq.state(), ConnectionState::Connected);
        assert_eq!(acq.snapshot().values, vec![7, 8, 9]);

        let next = acq.poll(&settings).unwrap();
        assert_eq!(next.recording_error, None);
        assert_eq!(acq.snapshot().values, vec![7, 8, 9, 10]);
    }

    #[test]
    fn failed_open_reports_error_state() {
        let settings = Settings::default();
        let mut acq = Acquisition::new(&settings);
        let result = acq.connect_with(&settings, || {
            Err(MonitorError::Transport("no such port".into()))
        });
        assert!(result.is_err());
        assert_eq!(acq.state(), ConnectionState::Error);
        assert!(matches!(acq.disconnect(), Err(MonitorError::NotConnected)));
    }

    #[test]
    fn status_and_probe() {
        let settings = Settings::default();
        let mut acq = Acquisition::new(&settings);
        assert_eq!(acq.connection_status(), (false, "Not connected".to_owned()));
        let mut acq = connected(vec![vec![0xab, 0xcd, 0x01]], &settings);
        let (alive, message) = acq.connection_status();
        assert!(alive);
        assert_eq!(message, "Active (3 bytes waiting)");
        assert_eq!(
            acq.test_connection().unwrap(),
            "Data received (3 bytes): ab cd 01"
        );
    }

    #[test]
    fn buffer_capacity_follows_settings() {
        let mut settings = Settings::default();
        settings.spectrogram_duration = 0.01;
        let mut acq = connected(vec![encode_samples(&[0; 20])], &settings);
        acq.poll(&settings).unwrap();
        assert_eq!(acq.buffered_samples(), 5);
    }
}
