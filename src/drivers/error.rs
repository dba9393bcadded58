use thiserror::Error;
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("not connected to any port")]
    NotConnected,
    #[error("already recording to {0}")]
    AlreadyRecording(String),
    #[error("not recording")]
    NotRecording,
    #[error("recording failed: {0}")]
    RecordingIo(String),
    #[error("filter stage {stage} skipped: {reason}")]
    Filter { stage: &'static str, reason: String },
    #[error("not enough data: need {needed} samples, have {available}")]
    InsufficientData { needed: usize, available: usize },
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to render plot: {0}")]
    Plot(String),
}
impl From<serialport::Error> for MonitorError {
    fn from(value: serialport::Error) -> Self {
        MonitorError::Transport(value.to_string())
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for MonitorError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        MonitorError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for MonitorError {
    fn from(value: image::ImageError) -> Self {
        MonitorError::Plot(value.to_string())
    }
}
