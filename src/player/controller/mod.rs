pub mod rest;

pub use rest::{DeviceInfo, UltimateDevice};

use std::time::Duration;

/// Factory for the device client
pub fn get_device(base_url: &str, password: Option<String>, timeout: Duration) -> anyhow::Result<UltimateDevice> {
    UltimateDevice::new(base_url, password, timeout)
}
