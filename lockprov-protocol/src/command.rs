//! Provisioning commands.
//!
//! Every command starts with the prefix `00 01 40` followed by an opcode.
//! Commands that carry PEM material add eight reserved zero bytes, and key
//! material additionally a one-byte slot discriminator.

use crate::error::ProtocolError;
use crate::frame::Frame;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Bytes preceding the opcode in every command.
pub const COMMAND_PREFIX: [u8; 3] = [0x00, 0x01, 0x40];

/// Reserved zero bytes between opcode and payload on forward commands.
pub const RESERVED_LEN: usize = 8;

/// Command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Read MAC address and IMEI.
    GetInfo = 0x00,
    /// Generate and return a certificate signing request.
    RequestCsr = 0x01,
    /// Store the issued device certificate.
    ForwardCertificate = 0x02,
    /// Store a key or CA certificate in the slot named by the trailing byte.
    ForwardKeyMaterial = 0x03,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Opcode::GetInfo),
            0x01 => Ok(Opcode::RequestCsr),
            0x02 => Ok(Opcode::ForwardCertificate),
            0x03 => Ok(Opcode::ForwardKeyMaterial),
            _ => Err(value),
        }
    }
}

/// Destination slot for [`Opcode::ForwardKeyMaterial`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeySlot {
    ServerCa = 1,
    DeviceCa = 2,
    DevicePrivateKey = 3,
}

impl fmt::Display for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySlot::ServerCa => write!(f, "server CA"),
            KeySlot::DeviceCa => write!(f, "device CA"),
            KeySlot::DevicePrivateKey => write!(f, "device private key"),
        }
    }
}

/// An unframed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: Opcode,
    bytes: Bytes,
}

impl Command {
    fn header(opcode: Opcode, extra: usize) -> BytesMut {
        let mut buf = BytesMut::with_capacity(COMMAND_PREFIX.len() + 1 + extra);
        buf.put_slice(&COMMAND_PREFIX);
        buf.put_u8(opcode as u8);
        buf
    }

    fn simple(opcode: Opcode) -> Self {
        Self {
            opcode,
            bytes: Self::header(opcode, 0).freeze(),
        }
    }

    /// `00 01 40 00`
    pub fn get_info() -> Self {
        Self::simple(Opcode::GetInfo)
    }

    /// `00 01 40 01`
    pub fn request_csr() -> Self {
        Self::simple(Opcode::RequestCsr)
    }

    /// `00 01 40 02`, eight reserved bytes, then the certificate text.
    pub fn forward_certificate(pem: &str) -> Self {
        let opcode = Opcode::ForwardCertificate;
        let mut buf = Self::header(opcode, RESERVED_LEN + pem.len());
        buf.put_bytes(0, RESERVED_LEN);
        buf.put_slice(pem.as_bytes());
        Self {
            opcode,
            bytes: buf.freeze(),
        }
    }

    /// `00 01 40 03`, eight reserved bytes, the slot byte, then the PEM text.
    pub fn forward_key_material(slot: KeySlot, pem: &str) -> Self {
        let opcode = Opcode::ForwardKeyMaterial;
        let mut buf = Self::header(opcode, RESERVED_LEN + 1 + pem.len());
        buf.put_bytes(0, RESERVED_LEN);
        buf.put_u8(slot as u8);
        buf.put_slice(pem.as_bytes());
        Self {
            opcode,
            bytes: buf.freeze(),
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Frames the command for the wire.
    pub fn frame(&self) -> Result<Frame, ProtocolError> {
        Frame::build(&self.bytes)
    }
}
