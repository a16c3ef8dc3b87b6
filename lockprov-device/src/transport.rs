//! Chunked transport over 64-byte HID reports.
//!
//! Outbound frames are written one report at a time, each prefixed with
//! report ID 0. Inbound reports are read until the response's own header
//! says it is complete.

use crate::config::TransportConfig;
use crate::device::{Direction, HidDevice, TrafficSink};
use crate::error::DeviceError;
use crate::slot::DeviceSlot;
use crate::REPORT_ID;
use bytes::Bytes;
use lockprov_protocol::{verify_checksum, Frame, ResponseAssembler, REPORT_SIZE};
use std::sync::Arc;
use std::time::Instant;

/// Writes frames and reassembles responses.
pub struct ChunkedTransport {
    config: TransportConfig,
    sink: Option<Arc<dyn TrafficSink>>,
}

impl ChunkedTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self { config, sink: None }
    }

    /// Mirrors every report payload sent or received to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn TrafficSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn observe(&self, direction: Direction, data: &[u8]) {
        if let Some(ref sink) = self.sink {
            sink.on_traffic(direction, data);
        }
    }

    /// Writes `frame` report by report, in order.
    pub fn write(&self, device: &mut dyn HidDevice, frame: &Frame) -> Result<(), DeviceError> {
        let mut report = [0u8; REPORT_SIZE + 1];
        report[0] = REPORT_ID;

        for (index, segment) in frame.reports().enumerate() {
            let len = segment.len() + 1;
            report[1..len].copy_from_slice(segment);

            tracing::debug!("Send report {} ({} bytes)", index, segment.len());
            self.observe(Direction::Send, segment);

            let written = device.write_report(&report[..len])?;
            if written < len {
                return Err(DeviceError::ShortWrite {
                    written,
                    expected: len,
                });
            }
        }

        Ok(())
    }

    /// Reads until one complete response has been assembled.
    ///
    /// Partial state lives only for the duration of this call; an error
    /// discards whatever had been received.
    pub fn read(&self, device: &mut dyn HidDevice) -> Result<Bytes, DeviceError> {
        let mut assembler = ResponseAssembler::new();
        let mut buf = vec![0u8; self.config.read_buffer_size];
        let deadline = self
            .config
            .read_timeout
            .map(|limit| (limit, Instant::now() + limit));

        loop {
            let timeout = match deadline {
                Some((limit, at)) => {
                    let remaining = at.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        tracing::debug!(
                            "Response incomplete at deadline ({} bytes buffered)",
                            assembler.buffered()
                        );
                        return Err(DeviceError::Timeout(limit));
                    }
                    Some(remaining)
                }
                None => None,
            };

            let n = device.read_report(&mut buf, timeout)?;
            if n == 0 {
                continue;
            }

            let chunk = &buf[..n];
            tracing::debug!("Received {} bytes", n);
            self.observe(Direction::Received, chunk);

            if let Some(response) = assembler.push(chunk)? {
                self.check_response(&response)?;
                return Ok(response);
            }

            tracing::debug!(
                "Response incomplete: {} of {:?} bytes",
                assembler.buffered(),
                assembler.expected_length().map(|len| len as usize + 2)
            );
        }
    }

    fn check_response(&self, response: &[u8]) -> Result<(), DeviceError> {
        match verify_checksum(response) {
            Ok(()) => Ok(()),
            Err(e) if self.config.verify_response_checksum => Err(e.into()),
            Err(e) => {
                tracing::warn!("Response checksum ignored: {}", e);
                Ok(())
            }
        }
    }

    /// Writes `frame` and waits for the full response.
    pub fn write_and_read(
        &self,
        device: &mut dyn HidDevice,
        frame: &Frame,
    ) -> Result<Bytes, DeviceError> {
        self.write(device, frame)?;
        self.read(device)
    }

    /// One exchange against whatever device `slot` holds, with the slot
    /// locked throughout.
    pub fn exchange(&self, slot: &DeviceSlot, frame: &Frame) -> Result<Bytes, DeviceError> {
        slot.with_device(|device| self.write_and_read(device, frame))
    }
}
