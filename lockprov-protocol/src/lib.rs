//! # lockprov-protocol
//!
//! Wire protocol spoken by the lock's USB HID provisioning interface.
//!
//! This crate provides:
//! - Frame building with zero padding to 64-byte blocks and a CRC16 trailer
//! - Response reassembly across multiple HID reports
//! - Command builders for the provisioning opcodes
//! - Parsers for device info and CSR responses

pub mod assembler;
pub mod command;
pub mod error;
pub mod frame;
pub mod response;

pub use assembler::ResponseAssembler;
pub use command::{Command, KeySlot, Opcode};
pub use error::ProtocolError;
pub use frame::{crc16, parse_header, verify_checksum, Frame, MAX_COMMAND_SIZE, MAX_FRAME_SIZE};
pub use response::{extract_csr, DeviceInfo, MacAddress};

/// Marker bytes opening every frame, in both directions.
pub const MARKER: [u8; 2] = [0x5A, 0x5A];

/// HID report size. Frames are always a whole number of reports.
pub const REPORT_SIZE: usize = 64;
