// src/storage.rs
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::drivers::MonitorError;

/// A `.dat` recording read back from disk.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedRecording {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub metadata: BTreeMap<String, String>,
}

/// `<dir>/<prefix>_<YYYYMMDD-HHMMSS><extension>`
pub fn generate_filename(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    dir.join(format!("{prefix}_{timestamp}{extension}"))
}

/// Like [`generate_filename`], but appends `_1`, `_2`, ... when a file from
/// the same second already exists.
pub fn unique_filename(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    let base = generate_filename(dir, prefix, extension);
    if !base.exists() {
        return base;
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    (1..)
        .map(|n| dir.join(format!("{stem}_{n}{extension}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(base)
}

/// `recording.dat` -> `recording_meta.txt`
pub fn metadata_path(recording: &Path) -> PathBuf {
    let stem = recording
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    recording.with_file_name(format!("{stem}_meta.txt"))
}

/// Writes `key: value` lines next to the recording.
pub fn save_metadata<K: Display, V: Display>(
    recording: &Path,
    entries: &[(K, V)],
) -> Result<PathBuf, MonitorError> {
    let path = metadata_path(recording);
    let mut w = BufWriter::new(File::create(&path)?);
    for (key, value) in entries {
        writeln!(w, "{key}: {value}")?;
    }
    w.flush()?;
    Ok(path)
}

pub fn parse_metadata(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .collect()
}

/// Decodes the whole file as little-endian int16. The sample rate comes from
/// the sidecar when present and parseable, otherwise `default_rate`.
pub fn load_recording(path: &Path, default_rate: u32) -> Result<LoadedRecording, MonitorError> {
    let raw = fs::read(path)?;
    if raw.len() % 2 == 1 {
        warn!("{}: ignoring odd trailing byte", path.display());
    }
    let samples = raw
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let metadata = match fs::read_to_string(metadata_path(path)) {
        Ok(text) => parse_metadata(&text),
        Err(_) => BTreeMap::new(),
    };
    let sample_rate = metadata
        .get("sample_rate")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default_rate);
    Ok(LoadedRecording {
        samples,
        sample_rate,
        metadata,
    })
}

/// `Time,EEG` header, then one `<time:.6>,<value>` row per sample.
pub fn export_csv<V: Display>(
    path: &Path,
    times: &[f64],
    values: &[V],
) -> Result<String, MonitorError> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "Time,EEG")?;
    for (t, value) in times.iter().zip(values) {
        writeln!(w, "{t:.6},{value}")?;
    }
    w.flush()?;
    info!("exported {} rows to {}", times.len().min(values.len()), path.display());
    Ok(format!("Exported data to {}", path.display()))
}
