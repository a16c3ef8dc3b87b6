//! Transport configuration.

use crate::{DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};
use lockprov_protocol::REPORT_SIZE;
use std::time::Duration;

/// Default interval between presence checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default input buffer size, one report.
pub const DEFAULT_READ_BUFFER_SIZE: usize = REPORT_SIZE;

/// Minimum input buffer size.
pub const MIN_READ_BUFFER_SIZE: usize = REPORT_SIZE;

/// Maximum input buffer size.
pub const MAX_READ_BUFFER_SIZE: usize = 4096;

/// Device identity and transport behavior.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// USB vendor ID of the lock.
    pub vendor_id: u16,
    /// USB product ID of the lock.
    pub product_id: u16,
    /// Upper bound on waiting for one complete response. `None` blocks until
    /// the device answers or fails.
    pub read_timeout: Option<Duration>,
    /// Interval between presence checks.
    pub poll_interval: Duration,
    /// Buffer size for a single read.
    pub read_buffer_size: usize,
    /// Reject responses whose CRC16 trailer does not match.
    pub verify_response_checksum: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
            read_timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            verify_response_checksum: false,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device_id(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_response_checksum = verify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TransportConfig::new();
        assert_eq!(config.vendor_id, 0x2FE3);
        assert_eq!(config.product_id, 0x0100);
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.read_buffer_size, 64);
        assert!(!config.verify_response_checksum);
    }

    #[test]
    fn test_config_buffer_clamping() {
        let config = TransportConfig::new().with_read_buffer_size(8);
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);

        let config = TransportConfig::new().with_read_buffer_size(1 << 20);
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_config_builders() {
        let config = TransportConfig::new()
            .with_device_id(0x1234, 0x5678)
            .with_read_timeout(Duration::from_secs(5))
            .with_checksum_verification(true);
        assert_eq!(config.vendor_id, 0x1234);
        assert_eq!(config.product_id, 0x5678);
        assert_eq!(config.read_timeout, Some(Duration::from_secs(5)));
        assert!(config.verify_response_checksum);
    }
}
