use std::f64::consts::PI;

use log::warn;

use crate::config::{FilterSettings, Settings};
use crate::drivers::MonitorError;

/// Windows shorter than this are returned untouched.
pub const MIN_FILTER_LENGTH: usize = 30;
pub const BUTTERWORTH_ORDER: usize = 4;
pub const NOTCH_QUALITY: f64 = 30.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterStage {
    Highpass,
    Lowpass,
    Notch,
}

impl FilterStage {
    pub fn name(self) -> &'static str {
        match self {
            FilterStage::Highpass => "highpass",
            FilterStage::Lowpass => "lowpass",
            FilterStage::Notch => "notch",
        }
    }
}

/// Normalized second-order section (a0 == 1).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Biquad {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

#[derive(Clone, Copy, Debug, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        let a0_inv = 1.0 / a0;
        Self {
            b0: b0 * a0_inv,
            b1: b1 * a0_inv,
            b2: b2 * a0_inv,
            a1: a1 * a0_inv,
            a2: a2 * a0_inv,
        }
    }

    fn lowpass(w0: f64, q: f64) -> Self {
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();
        let b0 = (1.0 - cos_w0) * 0.5;
        Self::normalized(b0, 1.0 - cos_w0, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    fn highpass(w0: f64, q: f64) -> Self {
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();
        let b0 = (1.0 + cos_w0) * 0.5;
        Self::normalized(b0, -(1.0 + cos_w0), b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    /// Second-order IIR notch with -3 dB bandwidth `w0 / q`.
    fn notch(w0: f64, q: f64) -> Self {
        let bandwidth = w0 / q;
        let gain = 1.0 / (1.0 + (bandwidth / 2.0).tan());
        let cos_w0 = w0.cos();
        Self {
            b0: gain,
            b1: -2.0 * gain * cos_w0,
            b2: gain,
            a1: -2.0 * gain * cos_w0,
            a2: 2.0 * gain - 1.0,
        }
    }

    fn is_finite(&self) -> bool {
        [self.b0, self.b1, self.b2, self.a1, self.a2]
            .iter()
            .all(|c| c.is_finite())
    }

    /// Both poles strictly inside the unit circle.
    fn is_stable(&self) -> bool {
        self.a2.abs() < 1.0 && self.a1.abs() < 1.0 + self.a2
    }

    fn process(&self, state: &mut BiquadState, input: f64) -> f64 {
        // Transposed direct form II
        let y = self.b0 * input + state.z1;
        state.z1 = self.b1 * input - self.a1 * y + state.z2;
        state.z2 = self.b2 * input - self.a2 * y;
        y
    }

    /// State that makes a constant input `u` look like it has always been
    /// there. Returns the section's steady output alongside.
    fn steady_state(&self, u: f64) -> (BiquadState, f64) {
        let y = u * (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2);
        (
            BiquadState {
                z1: y - self.b0 * u,
                z2: self.b2 * u - self.a2 * y,
            },
            y,
        )
    }
}

/// A cascade of biquads that together realise one filter stage.
#[derive(Clone, Debug, PartialEq)]
pub struct StageDesign {
    pub stage: FilterStage,
    pub sections: Vec<Biquad>,
}

impl StageDesign {
    pub fn butterworth(
        stage: FilterStage,
        order: usize,
        cutoff_hz: f64,
        sample_rate_hz: f64,
    ) -> Result<Self, MonitorError> {
        if order == 0 || order % 2 == 1 {
            return Err(stage_error(stage, format!("unsupported order {order}")));
        }
        let w0 = normalized_frequency(stage, cutoff_hz, sample_rate_hz)?;
        let sections = (0..order / 2)
            .map(|k| {
                let q = 1.0 / (2.0 * ((2 * k + 1) as f64 * PI / (2 * order) as f64).sin());
                match stage {
                    FilterStage::Highpass => Biquad::highpass(w0, q),
                    _ => Biquad::lowpass(w0, q),
                }
            })
            .collect();
        Self { stage, sections }.checked()
    }

    pub fn notch(freq_hz: f64, quality: f64, sample_rate_hz: f64) -> Result<Self, MonitorError> {
        let w0 = normalized_frequency(FilterStage::Notch, freq_hz, sample_rate_hz)?;
        if quality <= 0.0 {
            return Err(stage_error(FilterStage::Notch, "quality must be positive".into()));
        }
        Self {
            stage: FilterStage::Notch,
            sections: vec![Biquad::notch(w0, quality)],
        }
        .checked()
    }

    fn checked(self) -> Result<Self, MonitorError> {
        for section in &self.sections {
            if !section.is_finite() || !section.is_stable() {
                return Err(stage_error(self.stage, "unstable coefficients".into()));
            }
            if (1.0 + section.a1 + section.a2).abs() < f64::EPSILON {
                return Err(stage_error(self.stage, "pole on the unit circle at DC".into()));
            }
        }
        Ok(self)
    }

    /// Samples of odd reflection added at each end before filtering.
    pub fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Forward-backward application: zero net phase, squared magnitude.
    pub fn filtfilt(&self, data: &[f64]) -> Result<Vec<f64>, MonitorError> {
        let pad = self.pad_len();
        if data.len() <= pad {
            return Err(stage_error(
                self.stage,
                format!("window of {} samples must exceed padding of {pad}", data.len()),
            ));
        }
        let n = data.len();
        let first = data[0];
        let last = data[n - 1];
        let mut extended = Vec::with_capacity(n + 2 * pad);
        extended.extend((1..=pad).rev().map(|i| 2.0 * first - data[i]));
        extended.extend_from_slice(data);
        extended.extend((1..=pad).map(|i| 2.0 * last - data[n - 1 - i]));

        let mut forward = self.run(&extended);
        forward.reverse();
        let mut backward = self.run(&forward);
        backward.reverse();

        let output = backward[pad..pad + n].to_vec();
        if output.iter().any(|v| !v.is_finite()) {
            return Err(stage_error(self.stage, "non-finite output".into()));
        }
        Ok(output)
    }

    fn run(&self, input: &[f64]) -> Vec<f64> {
        let Some(&x0) = input.first() else {
            return Vec::new();
        };
        let mut u = x0;
        let mut states: Vec<BiquadState> = self
            .sections
            .iter()
            .map(|section| {
                let (state, y) = section.steady_state(u);
                u = y;
                state
            })
            .collect();
        input
            .iter()
            .map(|&x| {
                self.sections
                    .iter()
                    .zip(states.iter_mut())
                    .fold(x, |value, (section, state)| section.process(state, value))
            })
            .collect()
    }
}

/// Highpass, lowpass, then notch, each applied zero-phase over the window.
#[derive(Clone, Debug)]
pub struct FilterChain {
    settings: FilterSettings,
    sample_rate_hz: f64,
}

impl FilterChain {
    pub fn new(settings: FilterSettings, sample_rate_hz: f64) -> Self {
        Self {
            settings,
            sample_rate_hz,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.filter, settings.sampling_rate_hz())
    }

    /// Stages that the current settings turn on, in application order.
    pub fn active_stages(&self) -> Vec<FilterStage> {
        if !self.settings.enabled {
            return Vec::new();
        }
        let mut stages = Vec::with_capacity(3);
        if self.settings.highpass_hz > 0.0 {
            stages.push(FilterStage::Highpass);
        }
        if self.settings.lowpass_hz < self.sample_rate_hz * 0.5 {
            stages.push(FilterStage::Lowpass);
        }
        if self.settings.notch_hz > 0.0 {
            stages.push(FilterStage::Notch);
        }
        stages
    }

    pub fn design(&self, stage: FilterStage) -> Result<StageDesign, MonitorError> {
        match stage {
            FilterStage::Highpass | FilterStage::Lowpass => {
                let cutoff = if stage == FilterStage::Highpass {
                    self.settings.highpass_hz
                } else {
                    self.settings.lowpass_hz
                };
                StageDesign::butterworth(stage, BUTTERWORTH_ORDER, cutoff, self.sample_rate_hz)
            }
            FilterStage::Notch => {
                StageDesign::notch(self.settings.notch_hz, NOTCH_QUALITY, self.sample_rate_hz)
            }
        }
    }

    /// Always returns a vector of the input's length. A stage that cannot be
    /// designed or applied is skipped; the rest of the chain still runs.
    pub fn apply(&self, samples: &[f64]) -> Vec<f64> {
        let mut data = samples.to_vec();
        if samples.len() < MIN_FILTER_LENGTH {
            return data;
        }
        for stage in self.active_stages() {
            match self.design(stage).and_then(|d| d.filtfilt(&data)) {
                Ok(filtered) => data = filtered,
                Err(e) => warn!("{e}"),
            }
        }
        data
    }
}

fn normalized_frequency(
    stage: FilterStage,
    freq_hz: f64,
    sample_rate_hz: f64,
) -> Result<f64, MonitorError> {
    if sample_rate_hz <= 0.0 {
        return Err(stage_error(stage, "sample rate must be positive".into()));
    }
    let nyquist = sample_rate_hz * 0.5;
    if !(freq_hz > 0.0 && freq_hz < nyquist) {
        return Err(stage_error(
            stage,
            format!("{freq_hz} Hz is outside (0, {nyquist}) Hz"),
        ));
    }
    Ok(2.0 * PI * freq_hz / sample_rate_hz)
}

fn stage_error(stage: FilterStage, reason: String) -> MonitorError {
    MonitorError::Filter {
        stage: stage.name(),
        reason,
    }
}
