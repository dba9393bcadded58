use std::collections::VecDeque;
use std::f64::consts::PI;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulationSettings;
use crate::drivers::decoder::encode_samples;
use crate::drivers::MonitorError;

/// Byte-level link to the device. Reads never block for long; a poll that
/// finds nothing simply gets an empty vector.
pub trait Transport: Send {
    fn bytes_available(&mut self) -> Result<usize, MonitorError>;
    fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>, MonitorError>;
    fn close(&mut self) -> Result<(), MonitorError>;
    fn describe(&self) -> String;
}

/// Scripted transport for tests and deterministic playback. Each time the
/// ready queue runs dry, `bytes_available` releases the next chunk, so one
/// chunk behaves like one burst from the device.
pub struct ManualTransport {
    chunks: VecDeque<Vec<u8>>,
    ready: VecDeque<u8>,
    fail_after_polls: Option<usize>,
    polls: usize,
    closed: bool,
}

impl ManualTransport {
    pub fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
            ready: VecDeque::new(),
            fail_after_polls: None,
            polls: 0,
            closed: false,
        }
    }

    /// After `polls` successful availability checks, every call errors.
    pub fn failing_after(mut self, polls: usize) -> Self {
        self.fail_after_polls = Some(polls);
        self
    }

    fn ensure_open(&self) -> Result<(), MonitorError> {
        if self.closed {
            return Err(MonitorError::Transport("port closed".into()));
        }
        Ok(())
    }
}

impl Transport for ManualTransport {
    fn bytes_available(&mut self) -> Result<usize, MonitorError> {
        self.ensure_open()?;
        if self.fail_after_polls.is_some_and(|limit| self.polls >= limit) {
            return Err(MonitorError::Transport("device stopped responding".into()));
        }
        self.polls += 1;
        if self.ready.is_empty() {
            if let Some(chunk) = self.chunks.pop_front() {
                self.ready.extend(chunk);
            }
        }
        Ok(self.ready.len())
    }

    fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>, MonitorError> {
        self.ensure_open()?;
        let take = max_bytes.min(self.ready.len());
        Ok(self.ready.drain(..take).collect())
    }

    fn close(&mut self) -> Result<(), MonitorError> {
        self.closed = true;
        Ok(())
    }

    fn describe(&self) -> String {
        "manual".to_owned()
    }
}

/// Synthetic EEG: a sum of sines plus Gaussian noise and rare large spikes.
/// Samples become due in real time at the configured rate and are handed out
/// as little-endian int16 bytes, just like the hardware.
pub struct SimulatedTransport {
    settings: SimulationSettings,
    sample_rate_hz: f64,
    started_at: Instant,
    emitted: u64,
    pending: VecDeque<u8>,
    rng: StdRng,
}

impl SimulatedTransport {
    pub fn new(settings: SimulationSettings, sample_rate_hz: f64) -> Self {
        Self::with_rng(settings, sample_rate_hz, StdRng::from_entropy())
    }

    pub fn seeded(settings: SimulationSettings, sample_rate_hz: f64, seed: u64) -> Self {
        Self::with_rng(settings, sample_rate_hz, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: SimulationSettings, sample_rate_hz: f64, rng: StdRng) -> Self {
        Self {
            settings,
            sample_rate_hz,
            started_at: Instant::now(),
            emitted: 0,
            pending: VecDeque::new(),
            rng,
        }
    }

    /// Produces the next `count` samples of the synthetic signal.
    pub fn generate(&mut self, count: usize) -> Vec<i16> {
        (0..count).map(|_| self.next_sample()).collect()
    }

    /// Queues every sample that has come due by `now`.
    pub fn fill_until(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f64();
        let due = (elapsed * self.sample_rate_hz) as u64;
        let count = due.saturating_sub(self.emitted) as usize;
        if count > 0 {
            let samples = self.generate(count);
            self.pending.extend(encode_samples(&samples));
        }
    }

    fn next_sample(&mut self) -> i16 {
        let t = self.emitted as f64 / self.sample_rate_hz;
        self.emitted += 1;
        let mut value: f64 = self
            .settings
            .frequencies_hz
            .iter()
            .zip(&self.settings.amplitudes)
            .map(|(freq, amp)| amp * (2.0 * PI * freq * t).sin())
            .sum();
        value += self.settings.noise_level * self.gaussian();
        if self.rng.gen::<f64>() < self.settings.artifact_probability {
            value += self.settings.artifact_amplitude * self.gaussian();
        }
        value.clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }

    // Box-Muller
    fn gaussian(&mut self) -> f64 {
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

impl Transport for SimulatedTransport {
    fn bytes_available(&mut self) -> Result<usize, MonitorError> {
        self.fill_until(Instant::now());
        Ok(self.pending.len())
    }

    fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>, MonitorError> {
        let take = max_bytes.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }

    fn close(&mut self) -> Result<(), MonitorError> {
        self.pending.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("simulated ({} Hz)", self.sample_rate_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::fft::{EegBand, SpectralAnalyzer};
    use crate::config::FrequencyBand;
    use std::time::Duration;

    #[test]
    fn manual_transport_releases_one_chunk_per_burst() {
        let mut transport = ManualTransport::new(vec![vec![1, 0, 2, 0], vec![3, 0]]);
        assert_eq!(transport.bytes_available().unwrap(), 4);
        assert_eq!(transport.read(3).unwrap(), vec![1, 0, 2]);
        assert_eq!(transport.bytes_available().unwrap(), 1);
        assert_eq!(transport.read(10).unwrap(), vec![0]);
        assert_eq!(transport.bytes_available().unwrap(), 2);
        transport.close().unwrap();
        assert!(transport.bytes_available().is_err());
    }

    #[test]
    fn manual_transport_failure_injection() {
        let mut transport = ManualTransport::new(vec![vec![0, 0]]).failing_after(1);
        assert!(transport.bytes_available().is_ok());
        assert!(matches!(
            transport.bytes_available(),
            Err(MonitorError::Transport(_))
        ));
    }

    #[test]
    fn simulator_emits_samples_in_real_time() {
        let mut sim = SimulatedTransport::seeded(SimulationSettings::default(), 500.0, 7);
        let start = sim.started_at;
        sim.fill_until(start + Duration::from_millis(100));
        assert_eq!(sim.pending.len(), 100);
        sim.fill_until(start + Duration::from_millis(100));
        assert_eq!(sim.pending.len(), 100);
        assert_eq!(sim.read(1000).unwrap().len(), 100);
    }

    #[test]
    fn simulated_signal_is_dominated_by_its_strongest_rhythm() {
        let settings = SimulationSettings {
            artifact_probability: 0.0,
            ..SimulationSettings::default()
        };
        let mut sim = SimulatedTransport::seeded(settings, 500.0, 42);
        let values: Vec<f64> = sim.generate(5000).into_iter().map(f64::from).collect();
        let analyzer = SpectralAnalyzer::new(500.0, FrequencyBand::default());
        assert_eq!(analyzer.band_powers(&values).dominant(), Some(EegBand::Delta));
    }
}
