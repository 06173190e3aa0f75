use std::path::Path;

use ::config::{Config, File, FileFormat};
use serde::Deserialize;

use crate::error::AppError;

/// Top-level service configuration, merged from defaults and an optional
/// TOML file. Read once at startup; never mutated afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub audio: AudioSettings,
    pub processing: ProcessingConfig,
    pub protocols: ProtocolsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Raw PCM stream port.
    pub tcp_port: u16,
    /// WAV stream + status endpoints.
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_port: 12345,
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u16,
    /// Per-channel frame size in samples; 0 selects the automatic policy.
    pub buffer_size: usize,
    /// Exact input device name; overrides all other selection rules.
    pub device_name: Option<String>,
    /// Prefer a monitor/loopback capture device when no name is given.
    pub prefer_monitor: bool,
    /// Fall back to the host default input when nothing else matches.
    pub auto_select: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            buffer_size: 0,
            device_name: None,
            prefer_monitor: true,
            auto_select: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub silence_detection: bool,
    pub silence_threshold: i16,
    pub volume_multiplier: f64,
    pub clip_threshold: i16,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            silence_detection: true,
            silence_threshold: 1000,
            volume_multiplier: 1.0,
            clip_threshold: 28_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProtocolsConfig {
    pub tcp: ProtocolToggle,
    pub http: ProtocolToggle,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtocolToggle {
    pub enabled: bool,
}

impl Default for ProtocolToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl RelayConfig {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let mut builder = Config::builder();
        if path.exists() {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
            tracing::info!("Loading configuration from {}", path.display());
        } else {
            tracing::warn!(
                "Config file {} not found, using default configuration",
                path.display()
            );
        }

        let cfg: RelayConfig = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.server.tcp_port == 0 {
            return Err(AppError::Config("server.tcp_port must be nonzero".into()));
        }
        if self.server.http_port == 0 {
            return Err(AppError::Config("server.http_port must be nonzero".into()));
        }
        if self.audio.sample_rate == 0 {
            return Err(AppError::Config("audio.sample_rate must be positive".into()));
        }
        if self.audio.channels == 0 {
            return Err(AppError::Config("audio.channels must be positive".into()));
        }
        if self.processing.volume_multiplier <= 0.0 {
            return Err(AppError::Config(
                "processing.volume_multiplier must be positive".into(),
            ));
        }
        if self.processing.clip_threshold <= 0 {
            return Err(AppError::Config(
                "processing.clip_threshold must be positive".into(),
            ));
        }
        if self.processing.silence_threshold < 0 {
            return Err(AppError::Config(
                "processing.silence_threshold must not be negative".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = RelayConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.server.tcp_port, 12345);
        assert_eq!(cfg.server.http_port, 8080);
        assert_eq!(cfg.audio.sample_rate, 48_000);
        assert_eq!(cfg.audio.channels, 2);
        assert_eq!(cfg.audio.buffer_size, 0);
        assert!(cfg.processing.silence_detection);
        assert_eq!(cfg.processing.silence_threshold, 1000);
        assert!(cfg.protocols.tcp.enabled);
        assert!(cfg.protocols.http.enabled);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = RelayConfig::load(Path::new("/nonexistent/audiorelay.toml")).unwrap();
        assert_eq!(cfg.server.tcp_port, 12345);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[server]
tcp_port = 9000

[audio]
sample_rate = 44100
channels = 1
buffer_size = 512

[processing]
silence_detection = false
volume_multiplier = 1.5

[protocols.tcp]
enabled = false
"#
        )
        .unwrap();

        let cfg = RelayConfig::load(file.path()).unwrap();
        assert_eq!(cfg.server.tcp_port, 9000);
        assert_eq!(cfg.server.http_port, 8080);
        assert_eq!(cfg.audio.sample_rate, 44_100);
        assert_eq!(cfg.audio.channels, 1);
        assert_eq!(cfg.audio.buffer_size, 512);
        assert!(!cfg.processing.silence_detection);
        assert_eq!(cfg.processing.volume_multiplier, 1.5);
        assert!(!cfg.protocols.tcp.enabled);
        assert!(cfg.protocols.http.enabled);
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let mut cfg = RelayConfig::default();
        cfg.audio.sample_rate = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_channels_is_rejected() {
        let mut cfg = RelayConfig::default();
        cfg.audio.channels = 0;
        assert!(cfg.validate().is_err());
    }
}
