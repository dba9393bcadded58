use std::time::Instant;

use log::debug;

use crate::drivers::Sample;

/// Samples decoded from one poll, plus the exact bytes they came from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedPoll {
    pub samples: Vec<Sample>,
    /// Even-length raw bytes consumed by this poll, in device order.
    pub raw: Vec<u8>,
}

/// Turns a little-endian int16 byte stream into timestamped samples.
///
/// The device delivers bytes in bursts, so the arrival time of each pair is
/// unknown. Timestamps are spread evenly over the wall-clock interval covered
/// by the poll: the i-th of `n` samples gets `last_time + dt * (i + 1) / n`.
pub struct SampleDecoder {
    pending: Option<u8>,
    last_time: f64,
    last_poll: Instant,
    nominal_period: f64,
}

impl SampleDecoder {
    pub fn new(sampling_rate_hz: f64) -> Self {
        Self {
            pending: None,
            last_time: 0.0,
            last_poll: Instant::now(),
            nominal_period: period_for(sampling_rate_hz),
        }
    }

    /// Forgets the previous session: timestamps restart at zero and the
    /// elapsed-time baseline moves to `now`.
    pub fn reset(&mut self, now: Instant) {
        self.pending = None;
        self.last_time = 0.0;
        self.last_poll = now;
    }

    pub fn set_sampling_rate(&mut self, sampling_rate_hz: f64) {
        self.nominal_period = period_for(sampling_rate_hz);
    }

    /// Timestamp of the newest decoded sample (0 before the first one).
    pub fn last_time(&self) -> f64 {
        self.last_time
    }

    pub fn has_pending_byte(&self) -> bool {
        self.pending.is_some()
    }

    /// Seconds since the previous call; advances the baseline to `now`.
    pub fn mark_poll(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_poll).as_secs_f64();
        self.last_poll = now;
        elapsed
    }

    /// Decodes `bytes` (prefixed by any byte held back last time). An odd
    /// trailing byte is kept for the next call instead of being decoded.
    ///
    /// If the clock did not advance, samples are spaced at the nominal
    /// sampling period so timestamps stay strictly increasing.
    pub fn decode(&mut self, bytes: &[u8], elapsed_secs: f64) -> DecodedPoll {
        let mut raw = Vec::with_capacity(bytes.len() + 1);
        if let Some(byte) = self.pending.take() {
            raw.push(byte);
        }
        raw.extend_from_slice(bytes);
        if raw.len() % 2 == 1 {
            self.pending = raw.pop();
            debug!("holding back odd trailing byte for next poll");
        }
        let count = raw.len() / 2;
        if count == 0 {
            return DecodedPoll::default();
        }
        let span = if elapsed_secs.is_finite() && elapsed_secs > 0.0 {
            elapsed_secs
        } else {
            self.nominal_period * count as f64
        };
        let start = self.last_time;
        let samples: Vec<Sample> = raw
            .chunks_exact(2)
            .enumerate()
            .map(|(i, pair)| Sample {
                value: i16::from_le_bytes([pair[0], pair[1]]),
                timestamp: start + span * (i + 1) as f64 / count as f64,
            })
            .collect();
        self.last_time = start + span;
        DecodedPoll { samples, raw }
    }
}

/// Inverse of decoding: int16 values back to little-endian bytes.
pub fn encode_samples(values: &[i16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn period_for(sampling_rate_hz: f64) -> f64 {
    if sampling_rate_hz > 0.0 {
        1.0 / sampling_rate_hz
    } else {
        0.0
    }
}
