//! Parsers for device responses.
//!
//! Offsets are absolute positions in the response frame, marker included.

use crate::error::ProtocolError;
use std::fmt;

/// Offset of the 6-byte MAC address in a get-info response.
pub const MAC_OFFSET: usize = 17;
pub const MAC_LEN: usize = 6;

/// Offset of the 15 IMEI digits in a get-info response.
pub const IMEI_OFFSET: usize = 23;
pub const IMEI_LEN: usize = 15;

/// Offset of the PEM text in a CSR response.
pub const CSR_OFFSET: usize = 17;

/// Line closing the CSR PEM block.
pub const CSR_END_MARKER: &str = "-----END CERTIFICATE REQUEST-----";

/// Lock MAC address, displayed as `AA:BB:CC:DD:EE:FF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; MAC_LEN]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

/// Identity reported by the get-info command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub mac: MacAddress,
    pub imei: String,
}

impl DeviceInfo {
    pub fn parse(response: &[u8]) -> Result<Self, ProtocolError> {
        let needed = IMEI_OFFSET + IMEI_LEN;
        if response.len() < needed {
            return Err(ProtocolError::ResponseTooShort {
                needed,
                actual: response.len(),
            });
        }

        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&response[MAC_OFFSET..MAC_OFFSET + MAC_LEN]);

        let imei = response[IMEI_OFFSET..needed]
            .iter()
            .enumerate()
            .map(|(i, &value)| {
                if value.is_ascii_digit() {
                    Ok(char::from(value))
                } else {
                    Err(ProtocolError::InvalidImeiDigit {
                        offset: IMEI_OFFSET + i,
                        value,
                    })
                }
            })
            .collect::<Result<String, _>>()?;

        Ok(Self {
            mac: MacAddress(mac),
            imei,
        })
    }
}

/// Extracts the CSR PEM block from a request-CSR response.
///
/// The block starts at [`CSR_OFFSET`] and ends with the last byte of
/// [`CSR_END_MARKER`].
pub fn extract_csr(response: &[u8]) -> Result<String, ProtocolError> {
    let marker = CSR_END_MARKER.as_bytes();
    let start = response
        .windows(marker.len())
        .position(|w| w == marker)
        .ok_or(ProtocolError::MissingCsrEnd)?;

    // A marker inside the response header cannot close a CSR
    if start < CSR_OFFSET {
        return Err(ProtocolError::ResponseTooShort {
            needed: CSR_OFFSET + marker.len(),
            actual: start + marker.len(),
        });
    }

    let end = start + marker.len();

    let csr = std::str::from_utf8(&response[CSR_OFFSET..end])
        .map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok(csr.to_string())
}
