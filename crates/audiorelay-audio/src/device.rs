use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};

use audiorelay_foundation::{AudioError, AudioSettings};

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
}

pub struct DeviceManager {
    host: Host,
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn host_id(&self) -> cpal::HostId {
        self.host.id()
    }

    pub fn enumerate(&self) -> Vec<DeviceInfo> {
        let default_name = self.default_input_device_name();
        let mut devices = Vec::new();
        if let Ok(inputs) = self.host.input_devices() {
            for device in inputs {
                if let Ok(name) = device.name() {
                    let is_default = default_name.as_deref() == Some(name.as_str());
                    devices.push(DeviceInfo { name, is_default });
                }
            }
        }
        devices
    }

    pub fn default_input_device_name(&self) -> Option<String> {
        self.host.default_input_device().and_then(|d| d.name().ok())
    }

    /// Selects the capture device: explicit name, then a monitor/loopback
    /// source when preferred, then the host default when auto-select is on,
    /// then any usable input.
    pub fn select(&self, settings: &AudioSettings) -> Result<Device, AudioError> {
        if let Some(name) = &settings.device_name {
            return self.by_name(name);
        }

        if settings.prefer_monitor {
            if let Some(device) = self.find_monitor() {
                if let Ok(name) = device.name() {
                    tracing::info!("Auto-selected monitor device: {}", name);
                }
                return Ok(device);
            }
        }

        if settings.auto_select {
            if let Some(device) = self.host.default_input_device() {
                if let Ok(name) = device.name() {
                    tracing::info!("Auto-selected default device: {}", name);
                }
                return Ok(device);
            }
            if let Some(device) = self.host.input_devices().ok().and_then(|mut d| d.next()) {
                if let Ok(name) = device.name() {
                    tracing::info!("Auto-selected first available device: {}", name);
                }
                return Ok(device);
            }
        }

        self.log_available();
        Err(AudioError::DeviceNotFound { name: None })
    }

    fn by_name(&self, name: &str) -> Result<Device, AudioError> {
        if let Ok(inputs) = self.host.input_devices() {
            for device in inputs {
                if device.name().map(|n| n == name).unwrap_or(false) {
                    return Ok(device);
                }
            }
        }
        self.log_available();
        Err(AudioError::DeviceNotFound {
            name: Some(name.to_string()),
        })
    }

    /// PipeWire/PulseAudio expose playback loopbacks as "monitor" sources;
    /// they are the natural pick for relaying system audio.
    fn find_monitor(&self) -> Option<Device> {
        let inputs = self.host.input_devices().ok()?;
        for device in inputs {
            if let Ok(name) = device.name() {
                if name.to_lowercase().contains("monitor") {
                    return Some(device);
                }
            }
        }
        None
    }

    fn log_available(&self) {
        let devices = self.enumerate();
        if devices.is_empty() {
            tracing::warn!("No audio input devices available");
            return;
        }
        tracing::info!("Available audio input devices:");
        for d in devices {
            tracing::info!(
                "  {}{}",
                d.name,
                if d.is_default { " (default)" } else { "" }
            );
        }
    }
}
