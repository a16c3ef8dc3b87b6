//! hidapi backend.

use crate::config::TransportConfig;
use crate::device::{DeviceProbe, HidDevice};
use crate::error::DeviceError;
use hidapi::HidApi;
use std::time::Duration;

/// An open lock, backed by hidapi.
pub struct UsbDevice {
    device: hidapi::HidDevice,
}

impl HidDevice for UsbDevice {
    fn write_report(&mut self, report: &[u8]) -> Result<usize, DeviceError> {
        Ok(self.device.write(report)?)
    }

    fn read_report(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, DeviceError> {
        // hidapi: -1 blocks, otherwise milliseconds
        let timeout_ms = match timeout {
            Some(t) => t.as_millis().clamp(1, i32::MAX as u128) as i32,
            None => -1,
        };
        Ok(self.device.read_timeout(buf, timeout_ms)?)
    }
}

/// Finds the lock by vendor/product ID.
pub struct UsbProbe {
    api: HidApi,
    vendor_id: u16,
    product_id: u16,
}

impl UsbProbe {
    pub fn new(config: &TransportConfig) -> Result<Self, DeviceError> {
        let api = HidApi::new()?;
        tracing::debug!(
            "HID probe for {:04x}:{:04x}",
            config.vendor_id,
            config.product_id
        );
        Ok(Self {
            api,
            vendor_id: config.vendor_id,
            product_id: config.product_id,
        })
    }
}

impl DeviceProbe for UsbProbe {
    fn is_present(&mut self) -> Result<bool, DeviceError> {
        self.api.refresh_devices()?;
        Ok(self
            .api
            .device_list()
            .any(|d| d.vendor_id() == self.vendor_id && d.product_id() == self.product_id))
    }

    fn open(&mut self) -> Result<Box<dyn HidDevice>, DeviceError> {
        let device = self.api.open(self.vendor_id, self.product_id)?;
        Ok(Box::new(UsbDevice { device }))
    }
}
