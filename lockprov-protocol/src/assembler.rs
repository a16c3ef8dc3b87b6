//! Response reassembly.
//!
//! The device answers with a frame of the same shape it receives, but a
//! single read may deliver only part of it. [`ResponseAssembler`] collects
//! reads until the length announced in the frame's own header is satisfied.

use crate::error::ProtocolError;
use crate::frame::parse_header;
use crate::MARKER;
use bytes::{Bytes, BytesMut};

/// Accumulates inbound chunks into one logical response.
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    /// Declared length once the header has been seen.
    expected: Option<u16>,
    /// Bytes received so far for the current response.
    received: BytesMut,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk.
    ///
    /// Returns the complete response once `received - 2 >= declared length`,
    /// resetting for the next exchange. On error the partial response is
    /// discarded.
    ///
    /// A first chunk without the `5A 5A` marker is rejected with
    /// [`ProtocolError::InvalidMarker`] rather than leaving the length unknown.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Bytes>, ProtocolError> {
        self.received.extend_from_slice(chunk);

        if self.expected.is_none() {
            match parse_header(&self.received) {
                Ok(expected) => self.expected = expected,
                Err(e) => {
                    self.reset();
                    return Err(e);
                }
            }
        }

        match self.expected {
            Some(expected) if self.received.len() >= expected as usize + MARKER.len() => {
                self.expected = None;
                Ok(Some(self.received.split().freeze()))
            }
            _ => Ok(None),
        }
    }

    /// Declared length of the response in progress, if known yet.
    pub fn expected_length(&self) -> Option<u16> {
        self.expected
    }

    /// Number of bytes buffered for the response in progress.
    pub fn buffered(&self) -> usize {
        self.received.len()
    }

    /// Drops any partial response.
    pub fn reset(&mut self) {
        self.expected = None;
        self.received.clear();
    }
}
