//! # lockprov-device
//!
//! Device access for lockprov.
//!
//! This crate provides:
//! - The [`HidDevice`] and [`DeviceProbe`] seams over the physical lock
//! - Chunked frame writes and blocking response reassembly
//! - A shared, lock-guarded device slot
//! - A background presence poller that attaches and detaches the device
//! - A hidapi backend (feature `usb`)

pub mod config;
pub mod device;
pub mod error;
pub mod poller;
pub mod slot;
pub mod transport;

#[cfg(feature = "usb")]
pub mod hid;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::TransportConfig;
pub use device::{DeviceProbe, Direction, HidDevice, TrafficSink};
pub use error::DeviceError;
pub use poller::PresencePoller;
pub use slot::DeviceSlot;
pub use transport::ChunkedTransport;

/// Vendor ID of the provisioning interface.
pub const DEFAULT_VENDOR_ID: u16 = 0x2FE3;

/// Product ID of the provisioning interface.
pub const DEFAULT_PRODUCT_ID: u16 = 0x0100;

/// Report ID prepended to every output report.
pub const REPORT_ID: u8 = 0x00;
