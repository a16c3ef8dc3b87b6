//! Shared device slot.
//!
//! The presence poller and the active provisioning run both touch the
//! device. They serialize on the slot's lock, so the poller can never swap
//! or drop the handle in the middle of an exchange.

use crate::device::HidDevice;
use crate::error::DeviceError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Holds the currently attached device, if any.
#[derive(Clone, Default)]
pub struct DeviceSlot {
    inner: Arc<Mutex<Option<Box<dyn HidDevice>>>>,
}

impl DeviceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a device is attached. Waits for an in-flight exchange.
    pub fn is_present(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Attaches a device, returning the one it replaced.
    pub fn attach(&self, device: Box<dyn HidDevice>) -> Option<Box<dyn HidDevice>> {
        self.inner.lock().replace(device)
    }

    /// Drops the attached device. Returns whether one was attached.
    pub fn detach(&self) -> bool {
        self.inner.lock().take().is_some()
    }

    /// Runs `f` with exclusive access to the attached device.
    ///
    /// Fails fast with [`DeviceError::NotPresent`] when the slot is empty.
    pub fn with_device<R>(
        &self,
        f: impl FnOnce(&mut dyn HidDevice) -> Result<R, DeviceError>,
    ) -> Result<R, DeviceError> {
        let mut guard = self.inner.lock();
        let device = guard.as_mut().ok_or(DeviceError::NotPresent)?;
        f(device.as_mut())
    }
}

impl fmt::Debug for DeviceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // try_lock: Debug must not block behind an exchange
        let present = self.inner.try_lock().map(|guard| guard.is_some());
        f.debug_struct("DeviceSlot")
            .field("present", &present)
            .finish()
    }
}
