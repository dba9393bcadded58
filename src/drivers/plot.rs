use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;
use crate::drivers::fft::Spectrogram;
use crate::drivers::pipeline::DisplayFrame;
use crate::drivers::MonitorError;
use crate::storage;
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub trace: RGBColor,
    pub axis: RGBColor,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 600,
            background: RGBColor(10, 10, 10),
            trace: YELLOW,
            axis: RGBColor(80, 80, 80),
        }
    }
}
pub fn render_waveform_png(frame: &DisplayFrame, style: &PlotStyle) -> Result<Vec<u8>, MonitorError> {
    if frame.values.is_empty() {
        return Err(MonitorError::Plot("display frame has no samples".into()));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let (y_min, y_max) = frame.y_range;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .build_cartesian_2d(0f64..frame.window_seconds.max(f64::EPSILON), y_min..y_max)?;
        chart.draw_series(LineSeries::new(
            [(0.0, 0.0), (frame.window_seconds, 0.0)],
            &style.axis,
        ))?;
        let series = frame
            .times
            .iter()
            .zip(&frame.values)
            .map(|(t, v)| (*t, v.clamp(y_min, y_max)));
        chart.draw_series(LineSeries::new(series, &style.trace))?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
/// Heat map with time on x and frequency on y, colour levels spanning the
/// frame's own dB range.
pub fn render_spectrogram_png(
    spectrogram: &Spectrogram,
    style: &PlotStyle,
) -> Result<Vec<u8>, MonitorError> {
    let (rows, cols) = spectrogram.power_db.dim();
    if rows == 0 || cols == 0 {
        return Err(MonitorError::Plot("spectrogram is empty".into()));
    }
    let dt = cell_size(&spectrogram.times);
    let df = cell_size(&spectrogram.freqs);
    let t0 = spectrogram.times[0] - dt / 2.0;
    let t1 = spectrogram.times[cols - 1] + dt / 2.0;
    let f0 = spectrogram.freqs[0] - df / 2.0;
    let f1 = spectrogram.freqs[rows - 1] + df / 2.0;
    let (lo, hi) = spectrogram.db_range();
    let span = (hi - lo).max(f64::EPSILON);
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .build_cartesian_2d(t0..t1, f0..f1)?;
        let cells = spectrogram
            .power_db
            .indexed_iter()
            .map(|((r, c), &db)| {
                let t = spectrogram.times[c];
                let f = spectrogram.freqs[r];
                Rectangle::new(
                    [(t - dt / 2.0, f - df / 2.0), (t + dt / 2.0, f + df / 2.0)],
                    heat_color((db - lo) / span).filled(),
                )
            });
        chart.draw_series(cells)?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
/// Writes `<dir>/EEG_SPEC_<timestamp>.png` and returns its path.
pub fn save_spectrogram(dir: &Path, spectrogram: &Spectrogram) -> Result<PathBuf, MonitorError> {
    let png = render_spectrogram_png(spectrogram, &PlotStyle::default())?;
    write_png(dir, "EEG_SPEC", &png)
}
/// Writes `<dir>/EEG_WAVE_<timestamp>.png` and returns its path.
pub fn save_waveform(dir: &Path, frame: &DisplayFrame) -> Result<PathBuf, MonitorError> {
    let png = render_waveform_png(frame, &PlotStyle::default())?;
    write_png(dir, "EEG_WAVE", &png)
}
fn write_png(dir: &Path, prefix: &str, png: &[u8]) -> Result<PathBuf, MonitorError> {
    fs::create_dir_all(dir)?;
    let path = storage::unique_filename(dir, prefix, ".png");
    fs::write(&path, png)?;
    Ok(path)
}
fn cell_size(axis: &[f64]) -> f64 {
    match axis {
        [a, b, ..] => (b - a).abs().max(f64::EPSILON),
        [a] => (2.0 * a.abs()).max(1.0),
        [] => 1.0,
    }
}
// Dark blue -> teal -> yellow, close to viridis.
fn heat_color(level: f64) -> RGBColor {
    const STOPS: [(f64, f64, f64); 3] = [(68.0, 1.0, 84.0), (33.0, 145.0, 140.0), (253.0, 231.0, 37.0)];
    let x = level.clamp(0.0, 1.0) * 2.0;
    let i = (x.floor() as usize).min(1);
    let frac = x - i as f64;
    let (a, b) = (STOPS[i], STOPS[i + 1]);
    let mix = |p: f64, q: f64| (p + (q - p) * frac).round() as u8;
    RGBColor(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, MonitorError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| MonitorError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrequencyBand;
    use crate::drivers::fft::SpectralAnalyzer;
    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    fn spectrogram() -> Spectrogram {
        let samples: Vec<f64> = (0..3000)
            .map(|i| 20.0 * (2.0 * std::f64::consts::PI * 10.0 * i as f64 / 500.0).sin())
            .collect();
        SpectralAnalyzer::new(500.0, FrequencyBand::default())
            .spectrogram(&samples)
            .unwrap()
    }
    #[test]
    fn waveform_renders_and_saves() {
        let frame = DisplayFrame {
            times: (0..100).map(|i| i as f64 * 0.01).collect(),
            values: (0..100).map(|i| (i as f64 * 0.3).sin() * 100.0).collect(),
            window_seconds: 1.0,
            y_range: (-500.0, 500.0),
        };
        let png = render_waveform_png(&frame, &PlotStyle::default()).unwrap();
        assert_eq!(png[..8], PNG_MAGIC);
        let dir = tempfile::tempdir().unwrap();
        let path = save_waveform(dir.path(), &frame).unwrap();
        assert_eq!(fs::read(&path).unwrap()[..8], PNG_MAGIC);
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("EEG_WAVE_"));
    }
    #[test]
    fn spectrogram_renders_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_spectrogram(dir.path(), &spectrogram()).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes[..8], PNG_MAGIC);
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("EEG_SPEC_"));
    }
    #[test]
    fn empty_waveform_is_an_error() {
        let frame = DisplayFrame {
            times: vec![],
            values: vec![],
            window_seconds: 1.0,
            y_range: (-1.0, 1.0),
        };
        assert!(matches!(
            render_waveform_png(&frame, &PlotStyle::default()),
            Err(MonitorError::Plot(_))
        ));
    }
    #[test]
    fn heat_ramp_endpoints() {
        assert_eq!(heat_color(0.0), RGBColor(68, 1, 84));
        assert_eq!(heat_color(1.0), RGBColor(253, 231, 37));
        assert_eq!(heat_color(0.5), RGBColor(33, 145, 140));
    }
}
