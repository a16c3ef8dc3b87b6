//! Device presence polling.

use crate::device::DeviceProbe;
use crate::error::DeviceError;
use crate::slot::DeviceSlot;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Attaches the lock to a [`DeviceSlot`] when it appears and detaches it
/// when it goes away.
pub struct PresencePoller<P: DeviceProbe> {
    probe: Mutex<P>,
    slot: DeviceSlot,
    interval: Duration,
    shutdown: AtomicBool,
    notify: Notify,
}

impl<P: DeviceProbe + 'static> PresencePoller<P> {
    pub fn new(probe: P, slot: DeviceSlot, interval: Duration) -> Self {
        Self {
            probe: Mutex::new(probe),
            slot,
            interval,
            shutdown: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn slot(&self) -> &DeviceSlot {
        &self.slot
    }

    /// Runs one presence check.
    ///
    /// Returns `Some(connected)` when the slot changed. Blocks while an
    /// exchange holds the slot.
    pub fn poll_once(&self) -> Result<Option<bool>, DeviceError> {
        let mut probe = self.probe.lock();
        let present = probe.is_present()?;
        let attached = self.slot.is_present();

        if present && !attached {
            let device = probe.open()?;
            self.slot.attach(device);
            tracing::info!("Device connected");
            return Ok(Some(true));
        }

        if !present && attached {
            self.slot.detach();
            tracing::warn!("Device disconnected");
            return Ok(Some(false));
        }

        Ok(None)
    }

    /// Runs the polling loop (call from a background task).
    ///
    /// `on_change` receives the new connection state each time it flips.
    pub async fn run<F>(self: Arc<Self>, on_change: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        tracing::debug!("Presence poller started (interval={:?})", self.interval);

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            let poller = self.clone();
            match tokio::task::spawn_blocking(move || poller.poll_once()).await {
                Ok(Ok(Some(connected))) => on_change(connected),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => tracing::warn!("Presence check failed: {}", e),
                Err(e) => {
                    tracing::error!("Presence check task failed: {}", e);
                    break;
                }
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::debug!("Presence poller stopped");
    }

    /// Signals the polling loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockProbe};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;

    fn poller(probe: &MockProbe) -> PresencePoller<MockProbe> {
        PresencePoller::new(probe.clone(), DeviceSlot::new(), Duration::from_millis(5))
    }

    #[test]
    fn test_attach_on_appearance() {
        let probe = MockProbe::new();
        let poller = poller(&probe);

        assert_eq!(poller.poll_once().unwrap(), None);
        assert!(!poller.slot().is_present());

        probe.set_present(true);
        assert_eq!(poller.poll_once().unwrap(), Some(true));
        assert!(poller.slot().is_present());

        // Already attached: no reopen
        assert_eq!(poller.poll_once().unwrap(), None);
        assert_eq!(probe.opens(), 1);
    }

    #[test]
    fn test_detach_on_removal() {
        let probe = MockProbe::new();
        let poller = poller(&probe);

        probe.set_present(true);
        poller.poll_once().unwrap();

        probe.set_present(false);
        assert_eq!(poller.poll_once().unwrap(), Some(false));
        assert!(!poller.slot().is_present());
    }

    #[test]
    fn test_attaches_opened_device() {
        let probe = MockProbe::new();
        let poller = poller(&probe);
        let device = MockDevice::new();
        let log = device.log();
        probe.set_next_device(device);
        probe.set_present(true);

        assert_eq!(poller.poll_once().unwrap(), Some(true));
        poller
            .slot()
            .with_device(|device| device.write_report(&[0, 7]))
            .unwrap();
        assert_eq!(log.writes(), vec![vec![0, 7]]);
    }

    #[test]
    fn test_detach_waits_for_exchange() {
        let probe = MockProbe::new();
        let poller = poller(&probe);
        probe.set_present(true);
        poller.poll_once().unwrap();

        let (started_tx, started_rx) = mpsc::channel();
        let finished = Arc::new(AtomicBool::new(false));
        let exchange = {
            let slot = poller.slot().clone();
            let finished = finished.clone();
            thread::spawn(move || {
                slot.with_device(|device| {
                    started_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(50));
                    let written = device.write_report(&[0; 65])?;
                    finished.store(true, Ordering::SeqCst);
                    Ok(written)
                })
            })
        };

        started_rx.recv().unwrap();
        probe.set_present(false);

        // Blocks until the exchange releases the slot
        assert_eq!(poller.poll_once().unwrap(), Some(false));
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(exchange.join().unwrap().unwrap(), 65);
        assert!(!poller.slot().is_present());
    }

    #[test]
    fn test_open_failure_leaves_slot_empty() {
        let probe = MockProbe::new();
        let poller = poller(&probe);
        probe.set_present(true);
        probe.set_fail_open(true);

        assert!(matches!(poller.poll_once(), Err(DeviceError::Io(_))));
        assert!(!poller.slot().is_present());

        probe.set_fail_open(false);
        assert_eq!(poller.poll_once().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_run_reports_changes_and_stops() {
        let probe = MockProbe::new();
        probe.set_present(true);
        let poller = Arc::new(poller(&probe));
        let changes = Arc::new(AtomicUsize::new(0));

        let handle = {
            let poller = poller.clone();
            let changes = changes.clone();
            tokio::spawn(poller.run(move |connected| {
                assert!(connected);
                changes.fetch_add(1, Ordering::SeqCst);
            }))
        };

        for _ in 0..100 {
            if poller.slot().is_present() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(poller.slot().is_present());

        poller.shutdown();
        handle.await.unwrap();
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }
}
