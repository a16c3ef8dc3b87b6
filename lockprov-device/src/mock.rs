//! Scripted in-memory device for tests.

use crate::device::{DeviceProbe, HidDevice};
use crate::error::DeviceError;
use lockprov_protocol::{ResponseAssembler, REPORT_SIZE};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
enum Input {
    Chunk(Vec<u8>),
    Error(String),
    /// Never answers again; every read times out.
    Silence,
}

/// Handle on everything written to a [`MockDevice`].
#[derive(Debug, Clone, Default)]
pub struct MockLog {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockLog {
    /// Raw output reports, report ID included.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    /// Output reports stitched back into frames.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        let mut assembler = ResponseAssembler::new();
        let mut frames = Vec::new();
        for write in self.writes.lock().iter() {
            if let Ok(Some(frame)) = assembler.push(&write[1..]) {
                frames.push(frame.to_vec());
            }
        }
        frames
    }

    /// Opcode byte of each written frame.
    pub fn opcodes(&self) -> Vec<u8> {
        self.frames().iter().map(|frame| frame[7]).collect()
    }
}

/// A device that replays scripted input reports and records output reports.
#[derive(Debug, Default)]
pub struct MockDevice {
    inputs: VecDeque<Input>,
    log: MockLog,
    write_limit: Option<usize>,
    write_error: Option<String>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one input chunk, delivered as-is (split if larger than the
    /// reader's buffer).
    pub fn with_read(mut self, chunk: &[u8]) -> Self {
        self.inputs.push_back(Input::Chunk(chunk.to_vec()));
        self
    }

    /// Queues a complete response, one report per read.
    pub fn with_response(mut self, response: &[u8]) -> Self {
        for report in response.chunks(REPORT_SIZE) {
            self.inputs.push_back(Input::Chunk(report.to_vec()));
        }
        self
    }

    /// Queues a read failure.
    pub fn with_read_error(mut self, message: &str) -> Self {
        self.inputs.push_back(Input::Error(message.to_string()));
        self
    }

    /// After the queued input, stop answering.
    pub fn with_silence(mut self) -> Self {
        self.inputs.push_back(Input::Silence);
        self
    }

    /// Accept at most `limit` bytes per write.
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Fail every write.
    pub fn with_write_error(mut self, message: &str) -> Self {
        self.write_error = Some(message.to_string());
        self
    }

    pub fn log(&self) -> MockLog {
        self.log.clone()
    }
}

impl HidDevice for MockDevice {
    fn write_report(&mut self, report: &[u8]) -> Result<usize, DeviceError> {
        if let Some(ref message) = self.write_error {
            return Err(DeviceError::Io(message.clone()));
        }
        self.log.writes.lock().push(report.to_vec());
        Ok(self.write_limit.map_or(report.len(), |limit| limit.min(report.len())))
    }

    fn read_report(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, DeviceError> {
        match self.inputs.pop_front() {
            Some(Input::Chunk(mut chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.inputs.push_front(Input::Chunk(chunk.split_off(n)));
                }
                Ok(n)
            }
            Some(Input::Error(message)) => Err(DeviceError::Io(message)),
            Some(Input::Silence) => {
                self.inputs.push_front(Input::Silence);
                let wait = timeout.unwrap_or(Duration::MAX).min(Duration::from_millis(5));
                std::thread::sleep(wait);
                Ok(0)
            }
            None => Err(DeviceError::Io("no scripted input left".to_string())),
        }
    }
}

/// A probe whose presence is toggled by the test.
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    present: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
    fail_open: Arc<AtomicBool>,
    next_device: Arc<Mutex<Option<MockDevice>>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Device handed out by the next `open`; a blank one otherwise.
    pub fn set_next_device(&self, device: MockDevice) {
        *self.next_device.lock() = Some(device);
    }

    /// Number of successful opens.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl DeviceProbe for MockProbe {
    fn is_present(&mut self) -> Result<bool, DeviceError> {
        Ok(self.present.load(Ordering::SeqCst))
    }

    fn open(&mut self) -> Result<Box<dyn HidDevice>, DeviceError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(DeviceError::Io("open failed".to_string()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        let device = self.next_device.lock().take().unwrap_or_default();
        Ok(Box::new(device))
    }
}
