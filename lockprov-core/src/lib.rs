//! # lockprov-core
//!
//! Provisioning engine for lockprov.
//!
//! This crate provides:
//! - The ordered provisioning step sequence and its state machine
//! - Per-run session state threaded through every step
//! - The certificate service, record store and progress reporter seams

pub mod error;
pub mod progress;
pub mod provisioner;
pub mod record;
pub mod service;
pub mod session;

pub use error::ProvisionError;
pub use progress::{
    BroadcastReporter, ProgressEvent, ProgressReporter, StepState, TrafficForwarder,
};
pub use provisioner::{Provisioner, RunReport, Step, DONE_LABEL};
pub use record::{
    JsonFileRecordStore, LockRecord, LockRecordStore, LockRecordUpdate, MemoryRecordStore,
    RecordError,
};
pub use service::{CertificateService, IssuedCertificate, KeyMaterial, ServiceError};
pub use session::{ProvisioningSession, ProvisioningState};
