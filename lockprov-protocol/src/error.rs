//! Protocol error types.

use thiserror::Error;

/// Errors raised while framing commands or interpreting responses.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: command of {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("invalid frame marker: expected [5a, 5a], got {0:02x?}")]
    InvalidMarker([u8; 2]),

    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch { expected: u16, actual: u16 },

    #[error("response too short: need {needed} bytes, got {actual}")]
    ResponseTooShort { needed: usize, actual: usize },

    #[error("CSR end marker not found in response")]
    MissingCsrEnd,

    #[error("invalid IMEI digit {value:#04x} at offset {offset}")]
    InvalidImeiDigit { offset: usize, value: u8 },

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::InvalidMarker([0x12, 0xAB]);
        assert_eq!(
            err.to_string(),
            "invalid frame marker: expected [5a, 5a], got [12, ab]"
        );

        let err = ProtocolError::CrcMismatch {
            expected: 0xC07C,
            actual: 0x0001,
        };
        assert_eq!(err.to_string(), "CRC mismatch: expected 0xc07c, got 0x0001");

        let err = ProtocolError::FrameTooLarge {
            size: 70000,
            max: 65530,
        };
        assert!(err.to_string().contains("70000"));

        let err = ProtocolError::InvalidImeiDigit {
            offset: 30,
            value: 0x41,
        };
        assert_eq!(err.to_string(), "invalid IMEI digit 0x41 at offset 30");
    }
}
