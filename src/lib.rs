//! Real-time single-channel EEG acquisition and processing.
//!
//! Bytes from a serial headset (or the built-in simulator) are decoded into
//! timestamped int16 samples, kept in a bounded rolling buffer, optionally
//! recorded verbatim to disk, and periodically filtered and analysed into a
//! time-domain window, a spectrogram and per-band powers.
pub mod config;
pub mod drivers;
pub mod engine;
pub mod recorder;
pub mod serial;
pub mod storage;
pub mod types;
