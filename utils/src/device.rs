use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Finds the input device called `device_name`, or the host default when `None`.
pub fn get_or_default_input(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    match device_name {
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No default input device")),
        Some(target) => host
            .input_devices()?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .ok_or_else(|| anyhow::anyhow!("No input device named {:?}", target)),
    }
}

/// Finds the output device called `device_name`, or the host default when `None`.
pub fn get_or_default_output(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    match device_name {
        None => host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("No default output device")),
        Some(target) => host
            .output_devices()?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .ok_or_else(|| anyhow::anyhow!("No output device named {:?}", target)),
    }
}

fn describe(name: String, channels: u16, sample_rate: u32, default: bool) -> String {
    let mut d = format!(" * {}({}ch, {}hz)", name, channels, sample_rate);
    if default {
        d.push_str(" [default]");
    }
    d
}

/// One line per input device, the default one marked.
pub fn get_available_inputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_device = host.default_input_device().and_then(|d| d.name().ok());
    let mut device_names: Vec<String> = Vec::new();
    for in_device in host.input_devices()? {
        let Ok(d_name) = in_device.name() else {
            continue;
        };
        let Ok(d_cfg) = in_device.default_input_config() else {
            tracing::debug!("Skipping input device without a default config: {}", d_name);
            continue;
        };
        let is_default = default_device.as_deref() == Some(d_name.as_str());
        device_names.push(describe(d_name, d_cfg.channels(), d_cfg.sample_rate().0, is_default));
    }
    Ok(device_names.join("\n"))
}

/// One line per output device, the default one marked.
pub fn get_available_outputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_device = host.default_output_device().and_then(|d| d.name().ok());
    let mut device_names: Vec<String> = Vec::new();
    for out_device in host.output_devices()? {
        let Ok(d_name) = out_device.name() else {
            continue;
        };
        let Ok(d_cfg) = out_device.default_output_config() else {
            tracing::debug!("Skipping output device without a default config: {}", d_name);
            continue;
        };
        let is_default = default_device.as_deref() == Some(d_name.as_str());
        device_names.push(describe(d_name, d_cfg.channels(), d_cfg.sample_rate().0, is_default));
    }
    Ok(device_names.join("\n"))
}
