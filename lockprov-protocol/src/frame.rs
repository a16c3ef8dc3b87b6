//! Binary frame format for the provisioning interface.
//!
//! Frame layout (always a multiple of 64 bytes):
//!
//! ```text
//! +---------+---------+-------------+--------------+---------+
//! | marker  | length  | command     | zero padding | crc16   |
//! | 2 bytes | 2 bytes | n bytes     | to 64 blocks | 2 bytes |
//! +---------+---------+-------------+--------------+---------+
//! ```
//!
//! `length` is big-endian and counts every byte after the marker, itself and
//! the checksum included (total frame length minus 2). The checksum is
//! CRC16-CCITT (poly 0x1021, init 0xFFFF) over `length`, `command` and the
//! padding, stored big-endian.

use crate::error::ProtocolError;
use crate::{MARKER, REPORT_SIZE};
use bytes::{BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_16_IBM_3740};

/// Size of marker plus length field.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Size of the CRC16 trailer.
pub const CHECKSUM_SIZE: usize = 2;

/// Bytes a frame adds around its command.
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_SIZE + CHECKSUM_SIZE;

/// Largest frame whose length field still fits in a u16 (1024 reports).
pub const MAX_FRAME_SIZE: usize = 1024 * REPORT_SIZE;

/// Largest command that can be framed.
pub const MAX_COMMAND_SIZE: usize = MAX_FRAME_SIZE - FRAME_OVERHEAD;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// CRC16-CCITT ("CCITT-FALSE") checksum.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// A framed command, ready to be split into HID reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Frames a raw command.
    pub fn build(command: &[u8]) -> Result<Self, ProtocolError> {
        let blocks = (command.len() + FRAME_OVERHEAD).div_ceil(REPORT_SIZE);
        let total = blocks * REPORT_SIZE;
        if total > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: command.len(),
                max: MAX_COMMAND_SIZE,
            });
        }

        let declared = (total - MARKER.len()) as u16;
        let mut buf = BytesMut::with_capacity(total);

        buf.put_slice(&MARKER);
        buf.put_u16(declared);
        buf.put_slice(command);

        // Pad so the checksum lands on the last two bytes of the final block
        let padding = total - CHECKSUM_SIZE - buf.len();
        buf.put_bytes(0, padding);

        let checksum = crc16(&buf[MARKER.len()..]);
        buf.put_u16(checksum);

        Ok(Self {
            bytes: buf.freeze(),
        })
    }

    /// Value of the length field.
    pub fn declared_length(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2], self.bytes[3]])
    }

    /// Trailing CRC16.
    pub fn checksum(&self) -> u16 {
        let len = self.bytes.len();
        u16::from_be_bytes([self.bytes[len - 2], self.bytes[len - 1]])
    }

    /// Total frame length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Frames are never empty; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Splits the frame into report-sized segments, in write order.
    pub fn reports(&self) -> std::slice::Chunks<'_, u8> {
        self.bytes.chunks(REPORT_SIZE)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Reads the declared length from the start of an inbound byte stream.
///
/// Returns `Ok(None)` until four bytes are available. Fails if the bytes
/// present cannot be the start of a frame.
pub fn parse_header(buf: &[u8]) -> Result<Option<u16>, ProtocolError> {
    if buf.len() < MARKER.len() {
        return Ok(None);
    }

    let marker = [buf[0], buf[1]];
    if marker != MARKER {
        return Err(ProtocolError::InvalidMarker(marker));
    }

    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }

    Ok(Some(u16::from_be_bytes([buf[2], buf[3]])))
}

/// Recomputes the checksum of a complete frame and compares it with the
/// trailer. Bytes past the declared length are ignored.
pub fn verify_checksum(frame: &[u8]) -> Result<(), ProtocolError> {
    let declared = parse_header(frame)?.ok_or(ProtocolError::ResponseTooShort {
        needed: FRAME_HEADER_SIZE,
        actual: frame.len(),
    })? as usize;

    let end = declared + MARKER.len();
    if declared < FRAME_HEADER_SIZE || frame.len() < end {
        return Err(ProtocolError::ResponseTooShort {
            needed: end.max(FRAME_OVERHEAD),
            actual: frame.len(),
        });
    }

    let expected = u16::from_be_bytes([frame[end - 2], frame[end - 1]]);
    let actual = crc16(&frame[MARKER.len()..end - CHECKSUM_SIZE]);
    if expected != actual {
        return Err(ProtocolError::CrcMismatch { expected, actual });
    }

    Ok(())
}
