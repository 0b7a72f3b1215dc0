//! Audio input enumeration and selection

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::error::CaptureError;

/// Input device as shown on the console and in `/api/devices`
#[derive(Debug, Clone, Serialize)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// List all available audio input devices
pub fn list_input_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = get_device_capabilities(&device);
                devices.push(AudioDeviceInfo {
                    id: format!("input:{}", name),
                    is_default: default_name.as_ref() == Some(&name),
                    name,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    devices
}

/// Get device capabilities
pub fn get_device_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    if let Ok(configs) = device.supported_input_configs() {
        for config in configs {
            for rate_val in [8000u32, 16000, 32000, 44100, 48000, 88200, 96000, 192000] {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !sample_rates.contains(&rate_val)
                {
                    sample_rates.push(rate_val);
                }
            }

            let ch = config.channels();
            if !channels.contains(&ch) {
                channels.push(ch);
            }
        }
    }

    sample_rates.sort();
    channels.sort();

    (sample_rates, channels)
}

/// Pick an input by name.
///
/// An explicit `preferred` name (or `input:` id) must match exactly. Without
/// one, the first input whose name contains `hint` (case-insensitive) wins,
/// then the default input.
pub fn select_device(
    names: &[String],
    default_name: Option<&str>,
    preferred: Option<&str>,
    hint: &str,
) -> Option<usize> {
    if let Some(preferred) = preferred {
        let wanted = preferred.strip_prefix("input:").unwrap_or(preferred);
        return names.iter().position(|n| n == wanted);
    }

    let hint = hint.to_lowercase();
    if !hint.is_empty() {
        let matches: Vec<usize> = names
            .iter()
            .enumerate()
            .filter(|(_, n)| n.to_lowercase().contains(&hint))
            .map(|(i, _)| i)
            .collect();
        if let Some(&first) = matches.first() {
            if matches.len() > 1 {
                tracing::info!(
                    "Found {} inputs matching '{}', using '{}'",
                    matches.len(),
                    hint,
                    names[first]
                );
            }
            return Some(first);
        }
    }

    let default_name = default_name?;
    let index = names.iter().position(|n| n == default_name);
    if index.is_some() {
        tracing::info!(
            "No input matching '{}', using default input '{}'",
            hint,
            default_name
        );
    }
    index
}

/// Name of the input that [`find_input_device`] would open, if any.
///
/// Used before a capture worker is started so that a host without a
/// matching microphone simply runs without audio.
pub fn find_input_name(preferred: Option<&str>, hint: &str) -> Option<String> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let names: Vec<String> = match host.input_devices() {
        Ok(inputs) => inputs.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            tracing::warn!("Cannot enumerate audio inputs: {}", e);
            return None;
        }
    };

    select_device(&names, default_name.as_deref(), preferred, hint).and_then(|i| names.get(i).cloned())
}

/// Resolve an input device on the default host
pub fn find_input_device(
    preferred: Option<&str>,
    hint: &str,
) -> Result<(cpal::Device, String), CaptureError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let label = preferred.unwrap_or(hint).to_string();
    let devices: Vec<(cpal::Device, String)> = host
        .input_devices()
        .map_err(|e| CaptureError::device_init(&label, e.to_string()))?
        .filter_map(|d| d.name().ok().map(|name| (d, name)))
        .collect();

    let names: Vec<String> = devices.iter().map(|(_, name)| name.clone()).collect();
    let index = select_device(&names, default_name.as_deref(), preferred, hint).ok_or_else(|| {
        CaptureError::device_init(
            &label,
            "no matching audio input and no default input device \
             (check the microphone connection; `arecord -l` lists capture devices)",
        )
    })?;

    devices
        .into_iter()
        .nth(index)
        .ok_or_else(|| CaptureError::device_init(&label, "device list changed while opening"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_hint_match_is_case_insensitive() {
        let inputs = names(&["Built-in Mic", "webcam: usb audio (hw:1,0)", "USB Headset"]);
        assert_eq!(select_device(&inputs, Some("Built-in Mic"), None, "USB"), Some(1));
    }

    #[test]
    fn test_falls_back_to_default() {
        let inputs = names(&["Built-in Mic", "Line In"]);
        assert_eq!(select_device(&inputs, Some("Line In"), None, "USB"), Some(1));
        assert_eq!(select_device(&inputs, None, None, "USB"), None);
    }

    #[test]
    fn test_preferred_name_must_match_exactly() {
        let inputs = names(&["USB Mic", "Line In"]);
        assert_eq!(
            select_device(&inputs, Some("USB Mic"), Some("input:Line In"), "USB"),
            Some(1)
        );
        assert_eq!(select_device(&inputs, Some("USB Mic"), Some("Line"), "USB"), None);
    }
}
