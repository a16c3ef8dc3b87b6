//! Device seams.
//!
//! The transport only needs to push output reports and pull input reports;
//! hot-plug detection only needs to know whether the lock is attached and
//! how to open it. Both are traits so the hidapi backend and the test
//! device plug in the same way.

use crate::error::DeviceError;
use std::fmt;
use std::time::Duration;

/// An open HID device.
pub trait HidDevice: Send {
    /// Writes one output report. `report[0]` is the report ID.
    ///
    /// Returns the number of bytes accepted, report ID included.
    fn write_report(&mut self, report: &[u8]) -> Result<usize, DeviceError>;

    /// Blocks until an input report arrives or `timeout` elapses.
    ///
    /// `None` waits indefinitely. Returns the number of bytes read, `0` when
    /// the timeout elapsed first.
    fn read_report(&mut self, buf: &mut [u8], timeout: Option<Duration>)
        -> Result<usize, DeviceError>;
}

/// Locates and opens the provisioning interface.
pub trait DeviceProbe: Send {
    /// Whether a matching device is currently enumerated.
    fn is_present(&mut self) -> Result<bool, DeviceError>;

    /// Opens the matching device.
    fn open(&mut self) -> Result<Box<dyn HidDevice>, DeviceError>;
}

impl<P: DeviceProbe + ?Sized> DeviceProbe for Box<P> {
    fn is_present(&mut self) -> Result<bool, DeviceError> {
        (**self).is_present()
    }

    fn open(&mut self) -> Result<Box<dyn HidDevice>, DeviceError> {
        (**self).open()
    }
}

/// Direction of a traffic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Send,
    Received,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "Send"),
            Direction::Received => write!(f, "Received"),
        }
    }
}

/// Observer for raw report payloads, used for diagnostics.
pub trait TrafficSink: Send + Sync {
    fn on_traffic(&self, direction: Direction, data: &[u8]);
}
