//! The provisioning run.
//!
//! A run walks [`Step::SEQUENCE`] in order. Each step is announced as
//! pending (and recorded as the lock's provisioning status), executed, and
//! then announced as successful. The first error aborts the run and is
//! surfaced once through [`ProgressReporter::alert`].

use crate::error::ProvisionError;
use crate::progress::{ProgressEvent, ProgressReporter, StepState};
use crate::record::{LockRecordStore, LockRecordUpdate};
use crate::service::CertificateService;
use crate::session::{ProvisioningSession, ProvisioningState};
use bytes::Bytes;
use lockprov_device::{ChunkedTransport, DeviceError, DeviceSlot};
use lockprov_protocol::{extract_csr, Command, DeviceInfo, KeySlot};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Status label recorded once every step has succeeded.
pub const DONE_LABEL: &str = "Done";

/// One step of the provisioning sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    GetInfo,
    RequestCsr,
    UploadCsr,
    ForwardCrt,
    FetchKeys,
    ForwardDevicePrivateKey,
    ForwardDeviceCa,
    ForwardServerCa,
}

impl Step {
    /// Every step, in execution order.
    pub const SEQUENCE: [Step; 8] = [
        Step::GetInfo,
        Step::RequestCsr,
        Step::UploadCsr,
        Step::ForwardCrt,
        Step::FetchKeys,
        Step::ForwardDevicePrivateKey,
        Step::ForwardDeviceCa,
        Step::ForwardServerCa,
    ];

    /// Label shown to the operator and stored as the record status.
    pub fn label(&self) -> &'static str {
        match self {
            Step::GetInfo => "Requesting lock info...",
            Step::RequestCsr => "Requesting csr...",
            Step::UploadCsr => "Uploading csr to server...",
            Step::ForwardCrt => "Sending crt...",
            Step::FetchKeys => "Fetching keys from server...",
            Step::ForwardDevicePrivateKey => "Sending device private key...",
            Step::ForwardDeviceCa => "Sending device CA...",
            Step::ForwardServerCa => "Sending server CA...",
        }
    }

    /// Session state reached when this step succeeds.
    pub fn completes(&self) -> ProvisioningState {
        match self {
            Step::GetInfo => ProvisioningState::Info,
            Step::RequestCsr => ProvisioningState::Csr,
            Step::UploadCsr => ProvisioningState::CsrUploaded,
            Step::ForwardCrt => ProvisioningState::CrtForwarded,
            Step::FetchKeys => ProvisioningState::KeysFetched,
            Step::ForwardDevicePrivateKey => ProvisioningState::PrivateKeyForwarded,
            Step::ForwardDeviceCa => ProvisioningState::DeviceCaForwarded,
            Step::ForwardServerCa => ProvisioningState::ServerCaForwarded,
        }
    }

    /// Whether this step talks to the certificate service instead of the device.
    pub fn is_remote(&self) -> bool {
        matches!(self, Step::UploadCsr | Step::FetchKeys)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of [`Provisioner::run`].
///
/// The session is returned even on failure, holding whatever the run
/// learned before it stopped.
#[derive(Debug)]
pub struct RunReport {
    pub session: ProvisioningSession,
    pub result: Result<(), ProvisionError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Clears the running flag however the run ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives provisioning runs against the device in a [`DeviceSlot`].
pub struct Provisioner<S> {
    slot: DeviceSlot,
    transport: Arc<ChunkedTransport>,
    service: S,
    records: Arc<dyn LockRecordStore>,
    reporter: Arc<dyn ProgressReporter>,
    running: AtomicBool,
    cancelled: AtomicBool,
}

impl<S> Provisioner<S> {
    pub fn new(
        slot: DeviceSlot,
        transport: Arc<ChunkedTransport>,
        service: S,
        records: Arc<dyn LockRecordStore>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            slot,
            transport,
            service,
            records,
            reporter,
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn slot(&self) -> &DeviceSlot {
        &self.slot
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the active run before its next step.
    pub fn cancel(&self) {
        if self.is_running() {
            tracing::info!("Cancellation requested");
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    /// Sends get-info and parses the lock's identity.
    pub async fn read_device_info(&self) -> Result<DeviceInfo, ProvisionError> {
        let response = self.exchange(Command::get_info()).await?;
        Ok(DeviceInfo::parse(&response)?)
    }

    /// Asks the device for a fresh CSR.
    pub async fn read_csr(&self) -> Result<String, ProvisionError> {
        let response = self.exchange(Command::request_csr()).await?;
        Ok(extract_csr(&response)?)
    }

    /// One framed exchange on the blocking pool.
    async fn exchange(&self, command: Command) -> Result<Bytes, ProvisionError> {
        let frame = command.frame()?;
        tracing::debug!(
            "Exchange {:?}: {} command bytes, {} frame bytes",
            command.opcode(),
            command.len(),
            frame.len()
        );

        let slot = self.slot.clone();
        let transport = self.transport.clone();
        let response = tokio::task::spawn_blocking(move || transport.exchange(&slot, &frame))
            .await
            .map_err(|e| DeviceError::Io(format!("exchange task failed: {}", e)))??;

        Ok(response)
    }
}

impl<S: CertificateService> Provisioner<S> {
    /// Runs the full sequence once.
    pub async fn run(&self) -> RunReport {
        let mut session = ProvisioningSession::new();

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let err = ProvisionError::AlreadyRunning;
            self.reporter.alert(&err.to_string());
            return RunReport {
                session,
                result: Err(err),
            };
        }
        let _guard = RunGuard(&self.running);
        self.cancelled.store(false, Ordering::SeqCst);

        tracing::info!("Provisioning run {} started", session.run_id);
        let result = self.provision(&mut session).await;

        match &result {
            Ok(()) => tracing::info!("Provisioning run {} complete", session.run_id),
            Err(e) => {
                tracing::error!(
                    "Provisioning run {} failed in state {}: {}",
                    session.run_id,
                    session.state(),
                    e
                );
                session.fail();
                self.reporter.alert(&e.to_string());
            }
        }

        RunReport { session, result }
    }

    /// Walks every step on `session`, which must not have started yet.
    pub(crate) async fn provision(
        &self,
        session: &mut ProvisioningSession,
    ) -> Result<(), ProvisionError> {
        let record = self.records.create()?;
        session.record_id = Some(record.id);
        self.reporter.report(ProgressEvent::LockInfo {
            id: Some(record.id),
            lock_mac: None,
            imei: None,
            status: Some(Step::GetInfo.label().to_string()),
        });

        for step in Step::SEQUENCE {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(ProvisionError::Cancelled);
            }

            self.set_status(session, step.label())?;
            self.reporter
                .report(ProgressEvent::step(step.label(), StepState::Pending));
            tracing::info!("{}", step.label());

            let payload = self.execute(step, session).await?;
            session.advance(step.completes())?;

            self.reporter.report(ProgressEvent::Step {
                step: step.label().to_string(),
                state: StepState::Success,
                payload,
            });
        }

        session.advance(ProvisioningState::Done)?;
        self.set_status(session, DONE_LABEL)?;
        self.reporter
            .report(ProgressEvent::step(DONE_LABEL, StepState::Success));

        Ok(())
    }

    async fn execute(
        &self,
        step: Step,
        session: &mut ProvisioningSession,
    ) -> Result<Option<serde_json::Value>, ProvisionError> {
        match step {
            Step::GetInfo => {
                let info = self.read_device_info().await?;
                let lock_mac = info.mac.to_string();

                let record_id = session
                    .record_id
                    .ok_or(ProvisionError::MissingArtifact("lock record"))?;
                let record = self
                    .records
                    .update(record_id, LockRecordUpdate::identity(&lock_mac, &info.imei))?;
                self.reporter.report(ProgressEvent::LockInfo {
                    id: Some(record.id),
                    lock_mac: record.lock_mac.clone(),
                    imei: record.imei.clone(),
                    status: record.provisioning.clone(),
                });

                tracing::info!("Lock {} (IMEI {})", lock_mac, info.imei);
                let payload = json!({ "lockMac": lock_mac, "imei": info.imei });
                session.lock_mac = Some(lock_mac);
                session.imei = Some(info.imei);
                Ok(Some(payload))
            }
            Step::RequestCsr => {
                let csr = self.read_csr().await?;
                tracing::debug!("CSR received ({} bytes)", csr.len());
                session.csr = Some(csr);
                Ok(None)
            }
            Step::UploadCsr => {
                let lock_mac = session
                    .lock_mac
                    .as_deref()
                    .ok_or(ProvisionError::MissingArtifact("lock MAC"))?;
                let imei = session
                    .imei
                    .as_deref()
                    .ok_or(ProvisionError::MissingArtifact("IMEI"))?;
                let csr = session
                    .csr
                    .as_deref()
                    .ok_or(ProvisionError::MissingArtifact("CSR"))?;

                let issued = self.service.upload_csr(lock_mac, imei, csr).await?;
                session.certificate = Some(issued);
                Ok(None)
            }
            Step::ForwardCrt => {
                let certificate = session
                    .certificate
                    .as_ref()
                    .ok_or(ProvisionError::MissingArtifact("certificate"))?;
                self.exchange(Command::forward_certificate(&certificate.certificate))
                    .await?;
                Ok(None)
            }
            Step::FetchKeys => {
                session.keys = Some(self.service.get_keys().await?);
                Ok(None)
            }
            Step::ForwardDevicePrivateKey | Step::ForwardDeviceCa | Step::ForwardServerCa => {
                let keys = session
                    .keys
                    .as_ref()
                    .ok_or(ProvisionError::MissingArtifact("key material"))?;
                let (slot, pem) = match step {
                    Step::ForwardDevicePrivateKey => (KeySlot::DevicePrivateKey, &keys.private_key),
                    Step::ForwardDeviceCa => (KeySlot::DeviceCa, &keys.ca),
                    _ => (KeySlot::ServerCa, &keys.root_ca),
                };
                tracing::debug!("Forwarding {} ({} bytes)", slot, pem.len());
                self.exchange(Command::forward_key_material(slot, pem)).await?;
                Ok(None)
            }
        }
    }

    /// Records `label` as the lock's status and tells the UI.
    fn set_status(
        &self,
        session: &ProvisioningSession,
        label: &str,
    ) -> Result<(), ProvisionError> {
        let record_id = session
            .record_id
            .ok_or(ProvisionError::MissingArtifact("lock record"))?;
        let record = self
            .records
            .update(record_id, LockRecordUpdate::status(label))?;
        self.reporter.report(ProgressEvent::LockInfo {
            id: Some(record.id),
            lock_mac: record.lock_mac,
            imei: record.imei,
            status: record.provisioning,
        });
        Ok(())
    }
}
