use crate::config::Settings;
use crate::drivers::fft::{BandPowers, SpectralAnalyzer, Spectrogram};
use crate::drivers::filter::FilterChain;
use crate::drivers::SampleWindow;
/// Fewer samples than this and the time-domain view is not refreshed.
pub const MIN_DISPLAY_SAMPLES: usize = 10;
/// Ready-to-plot time-domain window.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayFrame {
    /// Seconds from the window start, so the newest sample sits at `window_seconds`.
    pub times: Vec<f64>,
    /// Filtered values multiplied by the display sensitivity.
    pub values: Vec<f64>,
    pub window_seconds: f64,
    pub y_range: (f64, f64),
}
#[derive(Clone, Debug)]
pub struct SpectrogramFrame {
    pub spectrogram: Spectrogram,
    pub bands: BandPowers,
}
/// Runs one refresh: filter the buffered window, then shape it for a view.
/// Built from the settings in force at refresh time.
pub struct SignalPipeline {
    filter: FilterChain,
    analyzer: SpectralAnalyzer,
    sampling_rate: usize,
    display_seconds: f64,
    sensitivity: f64,
    scale: f64,
}
impl SignalPipeline {
    pub fn new(settings: &Settings) -> Self {
        Self {
            filter: FilterChain::from_settings(settings),
            analyzer: SpectralAnalyzer::from_settings(settings),
            sampling_rate: settings.sampling_rate as usize,
            display_seconds: settings.display_duration,
            sensitivity: settings.display.sensitivity,
            scale: settings.display.scale,
        }
    }
    pub fn filtered(&self, window: &SampleWindow) -> Vec<f64> {
        self.filter.apply(&window.values_f64())
    }
    pub fn display_frame(&self, window: &SampleWindow) -> Option<DisplayFrame> {
        if window.len() < MIN_DISPLAY_SAMPLES {
            return None;
        }
        let filtered = self.filtered(window);
        let newest = *window.timestamps.last()?;
        let start = newest - self.display_seconds;
        let (times, values) = window
            .timestamps
            .iter()
            .zip(filtered)
            .filter(|(t, _)| **t >= start)
            .map(|(t, v)| (t - start, v * self.sensitivity))
            .unzip();
        let half_height = 5.0 * self.scale;
        Some(DisplayFrame {
            times,
            values,
            window_seconds: self.display_seconds,
            y_range: (-half_height, half_height),
        })
    }
    pub fn spectrogram_frame(&self, window: &SampleWindow) -> Option<SpectrogramFrame> {
        if window.len() < self.sampling_rate {
            return None;
        }
        let filtered = self.filtered(window);
        let spectrogram = self.analyzer.spectrogram(&filtered)?;
        Some(SpectrogramFrame {
            spectrogram,
            bands: self.analyzer.band_powers(&filtered),
        })
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterSettings;
    use crate::drivers::fft::EegBand;
    use std::f64::consts::PI;
    fn window(len: usize, rate: f64, f: impl Fn(f64) -> f64) -> SampleWindow {
        let timestamps: Vec<f64> = (1..=len).map(|i| i as f64 / rate).collect();
        let values = timestamps.iter().map(|&t| f(t).round() as i16).collect();
        SampleWindow { values, timestamps }
    }
    #[test]
    fn display_needs_ten_samples() {
        let pipeline = SignalPipeline::new(&Settings::default());
        assert!(pipeline.display_frame(&window(9, 500.0, |_| 1.0)).is_none());
        assert!(pipeline.display_frame(&window(10, 500.0, |_| 1.0)).is_some());
    }
    #[test]
    fn display_keeps_only_the_visible_window() {
        let settings = Settings {
            display_duration: 2.0,
            filter: FilterSettings {
                enabled: false,
                ..FilterSettings::default()
            },
            ..Settings::default()
        };
        let pipeline = SignalPipeline::new(&settings);
        let frame = pipeline
            .display_frame(&window(2500, 500.0, |t| t * 10.0))
            .unwrap();
        assert_eq!(frame.times.len(), 1001);
        assert!(frame.times[0].abs() < 1e-9);
        assert!((frame.times.last().unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(frame.y_range, (-500.0, 500.0));
        assert_eq!(frame.values.last().copied(), Some(50.0));
    }
    #[test]
    fn sensitivity_scales_values() {
        let mut settings = Settings::default();
        settings.filter.enabled = false;
        settings.display.sensitivity = 2.5;
        let pipeline = SignalPipeline::new(&settings);
        let frame = pipeline.display_frame(&window(20, 500.0, |_| 4.0)).unwrap();
        assert!(frame.values.iter().all(|&v| v == 10.0));
    }
    #[test]
    fn spectrogram_frame_waits_for_one_second() {
        let pipeline = SignalPipeline::new(&Settings::default());
        assert!(pipeline
            .spectrogram_frame(&window(499, 500.0, |_| 0.0))
            .is_none());
    }
    #[test]
    fn spectrogram_frame_reports_alpha_for_alpha_rhythm() {
        let pipeline = SignalPipeline::new(&Settings::default());
        let frame = pipeline
            .spectrogram_frame(&window(5000, 500.0, |t| 200.0 * (2.0 * PI * 10.0 * t).sin()))
            .unwrap();
        assert_eq!(frame.bands.dominant(), Some(EegBand::Alpha));
        assert_eq!(frame.spectrogram.freqs.last().copied(), Some(70.0));
    }
}
