//! Device error types.

use lockprov_protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// Errors from device access and the chunked transport.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device not present")]
    NotPresent,

    #[error("HID I/O error: {0}")]
    Io(String),

    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("no complete response within {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("USB support not compiled in (enable the `usb` feature)")]
    Unsupported,
}

impl DeviceError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeviceError::NotPresent | DeviceError::Io(_) | DeviceError::Timeout(_)
        )
    }
}

#[cfg(feature = "usb")]
impl From<hidapi::HidError> for DeviceError {
    fn from(e: hidapi::HidError) -> Self {
        DeviceError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(DeviceError::NotPresent.is_retryable());
        assert!(DeviceError::Io("unplugged".into()).is_retryable());
        assert!(DeviceError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!DeviceError::Protocol(ProtocolError::MissingCsrEnd).is_retryable());
        assert!(!DeviceError::Unsupported.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = DeviceError::ShortWrite {
            written: 10,
            expected: 65,
        };
        assert_eq!(err.to_string(), "short write: 10 of 65 bytes");

        let err = DeviceError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "no complete response within 1.5s");
    }
}
