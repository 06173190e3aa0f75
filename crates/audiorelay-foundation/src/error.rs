use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Audio subsystem error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Net(String),

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {name:?}")]
    DeviceNotFound { name: Option<String> },

    #[error("Format not supported: {format}")]
    FormatNotSupported { format: String },

    #[error("Input stream reported failure")]
    StreamFailed,

    #[error("No complete frame within {timeout:?}")]
    ReadTimeout { timeout: Duration },

    #[error("Build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Default stream config error: {0}")]
    DefaultStreamConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

impl AudioError {
    /// Transient errors are retried by the capture loop with a short backoff;
    /// everything else ends the session.
    pub fn is_transient(&self) -> bool {
        matches!(self, AudioError::StreamFailed | AudioError::ReadTimeout { .. })
    }
}
