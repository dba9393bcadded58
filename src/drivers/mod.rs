// Signal path: bytes -> samples -> rolling buffer -> filters -> views
pub mod acquisition;
pub mod buffer;
pub mod decoder;
pub mod error;
pub mod fft;
pub mod filter;
pub mod pipeline;
pub mod plot;
pub mod source;
// Re-exported for callers outside the driver layer
pub use acquisition::{Acquisition, PollReport};
pub use buffer::{RollingBuffer, Sample, SampleWindow};
pub use decoder::{encode_samples, DecodedPoll, SampleDecoder};
pub use error::MonitorError;
pub use fft::{BandPowers, EegBand, SpectralAnalyzer, Spectrogram};
pub use filter::{FilterChain, FilterStage};
pub use pipeline::{DisplayFrame, SignalPipeline, SpectrogramFrame};
pub use plot::{
    render_spectrogram_png, render_waveform_png, save_spectrogram, save_waveform, PlotStyle,
};
pub use source::{ManualTransport, SimulatedTransport, Transport};
