use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Local};
use log::{error, info, warn};

use crate::config::RecordingSettings;
use crate::drivers::MonitorError;
use crate::storage;

struct RecordingSession {
    path: PathBuf,
    writer: Box<dyn Write + Send>,
    started_at: Instant,
    started_wall: DateTime<Local>,
    bytes_written: u64,
    sample_rate: u32,
    source: String,
}

/// What a finished recording produced.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub duration_seconds: f64,
    pub bytes_written: u64,
}

impl fmt::Display for RecordingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Saved {} ({:.1} sec)",
            self.path.display(),
            self.duration_seconds
        )
    }
}

/// Writes the raw device bytes of one session to a headerless `.dat` file.
/// Only the undecoded bytes are stored, never filtered or scaled values.
pub struct DataRecorder {
    session: Option<RecordingSession>,
}

impl Default for DataRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl DataRecorder {
    pub fn new() -> Self {
        Self { session: None }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn start(
        &mut self,
        settings: &RecordingSettings,
        sample_rate: u32,
        source: &str,
    ) -> Result<PathBuf, MonitorError> {
        if let Some(session) = &self.session {
            return Err(MonitorError::AlreadyRecording(
                session.path.display().to_string(),
            ));
        }
        let open = || -> std::io::Result<(PathBuf, File)> {
            fs::create_dir_all(&settings.directory)?;
            let path = storage::unique_filename(&settings.directory, &settings.prefix, ".dat");
            let file = File::create(&path)?;
            Ok((path, file))
        };
        let (path, file) = open().map_err(|e| MonitorError::RecordingIo(e.to_string()))?;
        self.start_with_writer(path.clone(), Box::new(file), sample_rate, source)?;
        Ok(path)
    }

    /// Opens a session over an already-open sink. `path` names the session
    /// in logs and is where the sidecar goes on `stop`.
    pub fn start_with_writer(
        &mut self,
        path: PathBuf,
        writer: Box<dyn Write + Send>,
        sample_rate: u32,
        source: &str,
    ) -> Result<(), MonitorError> {
        if let Some(session) = &self.session {
            return Err(MonitorError::AlreadyRecording(
                session.path.display().to_string(),
            ));
        }
        info!("recording started: {}", path.display());
        self.session = Some(RecordingSession {
            path,
            writer,
            started_at: Instant::now(),
            started_wall: Local::now(),
            bytes_written: 0,
            sample_rate,
            source: source.to_owned(),
        });
        Ok(())
    }

    /// Appends bytes to the open session and flushes them, so the file on
    /// disk always holds everything polled so far. Does nothing when idle.
    /// A write failure ends the session.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), MonitorError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let written = session
            .writer
            .write_all(bytes)
            .and_then(|()| session.writer.flush());
        match written {
            Ok(()) => {
                session.bytes_written += bytes.len() as u64;
                Ok(())
            }
            Err(e) => {
                let path = session.path.display().to_string();
                self.session = None;
                error!("recording to {path} aborted: {e}");
                Err(MonitorError::RecordingIo(format!("{path}: {e}")))
            }
        }
    }

    /// Closes the file and writes the `_meta.txt` sidecar.
    pub fn stop(&mut self) -> Result<RecordingSummary, MonitorError> {
        let mut session = self.session.take().ok_or(MonitorError::NotRecording)?;
        let duration_seconds = session.started_at.elapsed().as_secs_f64();
        session
            .writer
            .flush()
            .map_err(|e| MonitorError::RecordingIo(e.to_string()))?;
        drop(session.writer);
        let entries = [
            ("sample_rate", session.sample_rate.to_string()),
            ("start_time", session.started_wall.to_rfc3339()),
            ("duration_seconds", format!("{duration_seconds:.3}")),
            ("samples", (session.bytes_written / 2).to_string()),
            ("source", session.source.clone()),
        ];
        if let Err(e) = storage::save_metadata(&session.path, &entries) {
            warn!("could not write metadata for {}: {e}", session.path.display());
        }
        let summary = RecordingSummary {
            path: session.path,
            duration_seconds,
            bytes_written: session.bytes_written,
        };
        info!("{summary}");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn settings_in(dir: &Path) -> RecordingSettings {
        RecordingSettings {
            directory: dir.to_path_buf(),
            prefix: "EEG_RECORDING".into(),
        }
    }

    #[test]
    fn records_raw_bytes_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = DataRecorder::new();
        let path = recorder.start(&settings_in(dir.path()), 500, "test").unwrap();
        recorder.write(&[0x01, 0x00]).unwrap();
        recorder.write(&[0x02, 0x00]).unwrap();
        let summary = recorder.stop().unwrap();
        assert_eq!(summary.path, path);
        assert_eq!(summary.bytes_written, 4);
        assert!(summary.duration_seconds > 0.0);
        assert_eq!(fs::read(&path).unwrap(), vec![0x01, 0x00, 0x02, 0x00]);
        let loaded = storage::load_recording(&path, 1).unwrap();
        assert_eq!(loaded.samples, vec![1, 2]);
        assert_eq!(loaded.sample_rate, 500);
        assert_eq!(loaded.metadata["samples"], "2");
    }

    #[test]
    fn double_start_and_idle_stop_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = DataRecorder::new();
        assert!(matches!(recorder.stop(), Err(MonitorError::NotRecording)));
        recorder.start(&settings_in(dir.path()), 500, "test").unwrap();
        assert!(matches!(
            recorder.start(&settings_in(dir.path()), 500, "test"),
            Err(MonitorError::AlreadyRecording(_))
        ));
        assert!(recorder.is_recording());
        recorder.stop().unwrap();
        assert!(!recorder.is_recording());
    }

    #[test]
    fn idle_writes_are_ignored() {
        let mut recorder = DataRecorder::new();
        assert!(recorder.write(&[1, 2, 3, 4]).is_ok());
        assert!(!recorder.is_recording());
    }

    #[test]
    fn bytes_reach_the_file_before_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = DataRecorder::new();
        let path = recorder.start(&settings_in(dir.path()), 500, "test").unwrap();
        recorder.write(&[0x0a, 0x00, 0x0b, 0x00]).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![0x0a, 0x00, 0x0b, 0x00]);
        recorder.write(&[0x0c, 0x00]).unwrap();
        assert_eq!(fs::read(&path).unwrap().len(), 6);
        recorder.stop().unwrap();
    }

    #[test]
    fn write_failure_ends_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.dat");
        let mut recorder = DataRecorder::new();
        recorder
            .start_with_writer(path.clone(), Box::new(BrokenSink), 500, "test")
            .unwrap();
        assert!(recorder.is_recording());
        let err = recorder.write(&[1, 0]).unwrap_err();
        assert!(matches!(err, MonitorError::RecordingIo(ref m) if m.contains("disk full")));
        assert!(!recorder.is_recording());
        assert!(matches!(recorder.stop(), Err(MonitorError::NotRecording)));
        assert!(!storage::metadata_path(&path).exists());
    }

    #[test]
    fn unwritable_directory_fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();
        let mut recorder = DataRecorder::new();
        let result = recorder.start(&settings_in(&blocker), 500, "test");
        assert!(matches!(result, Err(MonitorError::RecordingIo(_))));
        assert!(!recorder.is_recording());
    }
}

/// Sink whose every write fails, standing in for a full or vanished disk.
#[cfg(test)]
pub(crate) struct BrokenSink;

#[cfg(test)]
impl Write for BrokenSink {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
