//! Playback device enumeration and lookup.

use cpal::traits::{DeviceTrait, HostTrait};
use tracing::{debug, instrument, warn};

use consonance_ipc::AudioDevice;

use crate::capture::{CaptureConfig, LoopbackCapture};
use crate::error::AudioError;
use crate::source::ChunkSource;
use crate::AudioResult;

/// Enumerates playback devices and opens them for loopback capture.
pub trait DeviceDirectory: Send + Sync {
    /// List playback devices that can be captured in loopback mode.
    fn list_devices(&self) -> AudioResult<Vec<AudioDevice>>;

    /// Open a loopback capture source on `device`.
    fn open_loopback(
        &self,
        device: &AudioDevice,
        config: &CaptureConfig,
    ) -> AudioResult<Box<dyn ChunkSource>>;

    /// Find a device by exact name.
    fn find_device_by_name(&self, name: &str) -> AudioResult<AudioDevice> {
        self.list_devices()?
            .into_iter()
            .find(|device| device.name == name)
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
    }

    /// The default playback device.
    fn default_device(&self) -> AudioResult<AudioDevice> {
        self.list_devices()?
            .into_iter()
            .find(|device| device.is_default)
            .ok_or_else(|| AudioError::DeviceNotFound("default playback device".to_string()))
    }

    /// Resolve a device by name, or the default device when no name is given.
    fn resolve(&self, name: Option<&str>) -> AudioResult<AudioDevice> {
        match name {
            Some(name) => self.find_device_by_name(name),
            None => self.default_device(),
        }
    }
}

/// Device directory backed by the platform's default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDeviceDirectory;

impl CpalDeviceDirectory {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceDirectory for CpalDeviceDirectory {
    #[instrument(name = "enumerate_playback_devices", skip(self))]
    fn list_devices(&self) -> AudioResult<Vec<AudioDevice>> {
        let host = cpal::default_host();
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let mut devices = Vec::new();
        for (index, device) in host.output_devices()?.enumerate() {
            let name = match device.name() {
                Ok(name) => name,
                Err(e) => {
                    warn!(index, "Skipping unnamed playback device: {}", e);
                    continue;
                }
            };
            let is_default = default_name.as_deref() == Some(name.as_str());
            devices.push(AudioDevice {
                id: format!("{}:{}", host.id().name(), index),
                name,
                is_default,
            });
        }

        debug!(count = devices.len(), "Enumerated playback devices");
        Ok(devices)
    }

    fn open_loopback(
        &self,
        device: &AudioDevice,
        config: &CaptureConfig,
    ) -> AudioResult<Box<dyn ChunkSource>> {
        Ok(Box::new(LoopbackCapture::new(
            device.name.clone(),
            config.clone(),
        )))
    }
}

/// Look up a cpal playback device by exact name.
pub(crate) fn find_output_device(name: &str) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    for device in host.output_devices()? {
        if device.name().ok().as_deref() == Some(name) {
            return Ok(device);
        }
    }
    Err(AudioError::DeviceNotFound(name.to_string()))
}
