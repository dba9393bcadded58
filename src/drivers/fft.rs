use std::f64::consts::PI;
use std::sync::Arc;

use log::warn;
use ndarray::Array2;
use rustfft::{num_complex::Complex64, Fft, FftPlanner};

use crate::config::{FrequencyBand, Settings};

/// Added before the log so silent bins do not become -inf.
pub const DB_EPSILON: f64 = 1e-10;
/// Segment length used by both the spectrogram and Welch, in seconds.
pub const SEGMENT_SECONDS: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EegBand {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}

impl EegBand {
    pub const ALL: [EegBand; 5] = [
        EegBand::Delta,
        EegBand::Theta,
        EegBand::Alpha,
        EegBand::Beta,
        EegBand::Gamma,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EegBand::Delta => "delta",
            EegBand::Theta => "theta",
            EegBand::Alpha => "alpha",
            EegBand::Beta => "beta",
            EegBand::Gamma => "gamma",
        }
    }

    /// Inclusive frequency range in Hz.
    pub fn range_hz(self) -> (f64, f64) {
        match self {
            EegBand::Delta => (0.5, 4.0),
            EegBand::Theta => (4.0, 8.0),
            EegBand::Alpha => (8.0, 13.0),
            EegBand::Beta => (13.0, 30.0),
            EegBand::Gamma => (30.0, 70.0),
        }
    }
}

/// Mean power spectral density per band.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BandPowers([f64; 5]);

impl BandPowers {
    pub fn get(&self, band: EegBand) -> f64 {
        self.0[band as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (EegBand, f64)> + '_ {
        EegBand::ALL.iter().map(move |&band| (band, self.get(band)))
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&p| p == 0.0)
    }

    /// Band with the largest mean power (ties resolve to the lower band).
    pub fn dominant(&self) -> Option<EegBand> {
        if self.is_zero() {
            return None;
        }
        self.iter()
            .fold(None, |best: Option<(EegBand, f64)>, (band, power)| match best {
                Some((_, p)) if p >= power => best,
                _ => Some((band, power)),
            })
            .map(|(band, _)| band)
    }
}

/// Short-time power spectrum in dB, truncated to the display band.
#[derive(Clone, Debug)]
pub struct Spectrogram {
    pub freqs: Vec<f64>,
    /// Segment centres in seconds from the window start.
    pub times: Vec<f64>,
    /// Shape: freqs x times.
    pub power_db: Array2<f64>,
}

impl Spectrogram {
    pub fn db_range(&self) -> (f64, f64) {
        self.power_db
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}

/// Hann-windowed, mean-detrended, density-scaled one-sided periodograms.
struct Periodogram {
    window: Vec<f64>,
    scale: f64,
    fft: Arc<dyn Fft<f64>>,
    sample_rate_hz: f64,
}

impl Periodogram {
    fn new(segment_len: usize, sample_rate_hz: f64) -> Self {
        let window: Vec<f64> = (0..segment_len)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / segment_len as f64).cos())
            .collect();
        let energy: f64 = window.iter().map(|w| w * w).sum();
        let mut planner = FftPlanner::<f64>::new();
        Self {
            scale: 1.0 / (sample_rate_hz * energy),
            fft: planner.plan_fft_forward(segment_len),
            window,
            sample_rate_hz,
        }
    }

    fn len(&self) -> usize {
        self.window.len()
    }

    fn frequencies(&self) -> Vec<f64> {
        let n = self.len();
        (0..=n / 2)
            .map(|k| k as f64 * self.sample_rate_hz / n as f64)
            .collect()
    }

    fn segment(&self, segment: &[f64]) -> Vec<f64> {
        let n = self.len();
        let mean = segment.iter().sum::<f64>() / n as f64;
        let mut buffer: Vec<Complex64> = segment
            .iter()
            .zip(&self.window)
            .map(|(x, w)| Complex64::new((x - mean) * w, 0.0))
            .collect();
        self.fft.process(&mut buffer);
        let bins = n / 2 + 1;
        // Fold the negative frequencies in; DC and (for even n) Nyquist appear once.
        let doubled_end = if n % 2 == 0 { bins - 1 } else { bins };
        buffer
            .iter()
            .take(bins)
            .enumerate()
            .map(|(k, c)| {
                let p = c.norm_sqr() * self.scale;
                if k > 0 && k < doubled_end {
                    2.0 * p
                } else {
                    p
                }
            })
            .collect()
    }

    /// Periodograms of every full segment, stepping by half a segment.
    fn segments(&self, data: &[f64]) -> Vec<(usize, Vec<f64>)> {
        let n = self.len();
        let step = n - n / 2;
        let mut out = Vec::new();
        let mut start = 0;
        while start + n <= data.len() {
            out.push((start, self.segment(&data[start..start + n])));
            start += step;
        }
        out
    }
}

pub struct SpectralAnalyzer {
    sample_rate_hz: f64,
    display_band: FrequencyBand,
}

impl SpectralAnalyzer {
    pub fn new(sample_rate_hz: f64, display_band: FrequencyBand) -> Self {
        Self {
            sample_rate_hz,
            display_band,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.sampling_rate_hz(), settings.spectrogram_band)
    }

    fn segment_len(&self) -> usize {
        (self.sample_rate_hz * SEGMENT_SECONDS).round() as usize
    }

    /// `None` until at least one second of samples is available. With less
    /// than a full segment the whole window becomes a single segment.
    pub fn spectrogram(&self, samples: &[f64]) -> Option<Spectrogram> {
        let one_second = self.sample_rate_hz.round() as usize;
        if self.sample_rate_hz <= 0.0 || samples.len() < one_second.max(2) {
            return None;
        }
        if samples.iter().any(|v| !v.is_finite()) {
            warn!("spectrogram skipped: window contains non-finite samples");
            return None;
        }
        let periodogram = Periodogram::new(self.segment_len().min(samples.len()), self.sample_rate_hz);
        let half = periodogram.len() as f64 / 2.0;
        let (times, columns): (Vec<f64>, Vec<Vec<f64>>) = periodogram
            .segments(samples)
            .into_iter()
            .map(|(start, psd)| ((start as f64 + half) / self.sample_rate_hz, psd))
            .unzip();
        let rows: Vec<(usize, f64)> = periodogram
            .frequencies()
            .into_iter()
            .enumerate()
            .filter(|(_, f)| self.display_band.contains(*f))
            .collect();
        if rows.is_empty() || columns.is_empty() {
            warn!("spectrogram skipped: display band holds no frequency bins");
            return None;
        }
        let power_db = Array2::from_shape_fn((rows.len(), columns.len()), |(r, c)| {
            10.0 * (columns[c][rows[r].0] + DB_EPSILON).log10()
        });
        Some(Spectrogram {
            freqs: rows.into_iter().map(|(_, f)| f).collect(),
            times,
            power_db,
        })
    }

    /// Welch estimate: mean of the half-overlapping segment periodograms.
    pub fn welch(&self, samples: &[f64]) -> Option<(Vec<f64>, Vec<f64>)> {
        let segment_len = self.segment_len();
        if segment_len < 2 || samples.len() < segment_len {
            return None;
        }
        let periodogram = Periodogram::new(segment_len, self.sample_rate_hz);
        let segments = periodogram.segments(samples);
        let mut psd = vec![0.0; segment_len / 2 + 1];
        for (_, segment) in &segments {
            for (acc, p) in psd.iter_mut().zip(segment) {
                *acc += p;
            }
        }
        let count = segments.len() as f64;
        psd.iter_mut().for_each(|p| *p /= count);
        Some((periodogram.frequencies(), psd))
    }

    /// All bands read 0 until two seconds of samples are available.
    pub fn band_powers(&self, samples: &[f64]) -> BandPowers {
        if samples.iter().any(|v| !v.is_finite()) {
            warn!("band powers skipped: window contains non-finite samples");
            return BandPowers::default();
        }
        let Some((freqs, psd)) = self.welch(samples) else {
            return BandPowers::default();
        };
        let mut powers = [0.0; 5];
        for band in EegBand::ALL {
            let (low, high) = band.range_hz();
            let (sum, count) = freqs
                .iter()
                .zip(&psd)
                .filter(|(f, _)| **f >= low && **f <= high)
                .fold((0.0, 0usize), |(s, c), (_, p)| (s + p, c + 1));
            if count > 0 {
                powers[band as usize] = sum / count as f64;
            }
        }
        BandPowers(powers)
    }
}
