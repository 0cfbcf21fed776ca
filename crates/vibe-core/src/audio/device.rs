//! Output device discovery
//!
//! Enumerates output devices from every available CPAL host and resolves a
//! configured [`DeviceId`] back to a device.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

fn host_name(host_id: HostId) -> String {
    format!("{:?}", host_id)
}

fn get_host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

/// An output device as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDevice {
    /// Identifier to put in [`super::AudioConfig::device`]
    pub id: DeviceId,
    pub name: String,
    pub host: String,
    /// Default output device of its host
    pub is_default: bool,
}

impl std::fmt::Display for OutputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.host, self.name)?;
        if self.is_default {
            write!(f, " (default)")?;
        }
        Ok(())
    }
}

/// List output devices of all hosts, defaults first
pub fn list_output_devices() -> AudioResult<Vec<OutputDevice>> {
    let mut devices = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let outputs = match host.output_devices() {
            Ok(outputs) => outputs,
            Err(e) => {
                log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };
        for device in outputs {
            let Ok(name) = device.name() else {
                continue;
            };
            devices.push(OutputDevice {
                id: DeviceId::with_host(&name, &host_label),
                is_default: default_name.as_deref() == Some(name.as_str()),
                host: host_label.clone(),
                name,
            });
        }
    }

    if devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });
    log::info!("Enumerated {} output devices", devices.len());
    Ok(devices)
}

/// Resolve a device id, searching every host when none is given
pub fn find_device_by_id(id: &DeviceId) -> AudioResult<cpal::Device> {
    if let Some(host) = id.host.as_deref().and_then(get_host_by_name) {
        return host
            .output_devices()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .find(|d: &cpal::Device| d.name().ok().as_deref() == Some(id.name.as_str()))
            .ok_or_else(|| AudioError::DeviceNotFound(id.name.clone()));
    }

    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            continue;
        };
        let Ok(mut outputs) = host.output_devices() else {
            continue;
        };
        if let Some(device) = outputs.find(|d: &cpal::Device| d.name().ok().as_deref() == Some(id.name.as_str())) {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(id.name.clone()))
}

/// Default output device of the default host
pub fn default_output_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // Hosts without audio hardware (CI) report no devices
        match list_output_devices() {
            Ok(devices) => {
                for device in &devices {
                    println!("  - {}", device);
                }
                // Defaults sort first
                let first_plain = devices.iter().position(|d| !d.is_default);
                if let Some(index) = first_plain {
                    assert!(devices[index..].iter().all(|d| !d.is_default));
                }
            }
            Err(e) => println!("No output devices: {}", e),
        }
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let id = DeviceId::new("definitely-not-a-real-device-7f3a");
        assert!(matches!(
            find_device_by_id(&id),
            Err(AudioError::DeviceNotFound(name)) if name == id.name
        ));
    }
}
