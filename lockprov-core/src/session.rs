//! Provisioning session state.

use crate::error::ProvisionError;
use crate::service::{IssuedCertificate, KeyMaterial};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Position of a run in the provisioning sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    #[default]
    NotStarted,
    Info,
    Csr,
    CsrUploaded,
    CrtForwarded,
    KeysFetched,
    PrivateKeyForwarded,
    DeviceCaForwarded,
    ServerCaForwarded,
    Done,
    Failed,
}

impl ProvisioningState {
    /// The only state reachable on success, if any.
    pub fn next(&self) -> Option<Self> {
        use ProvisioningState::*;
        match self {
            NotStarted => Some(Info),
            Info => Some(Csr),
            Csr => Some(CsrUploaded),
            CsrUploaded => Some(CrtForwarded),
            CrtForwarded => Some(KeysFetched),
            KeysFetched => Some(PrivateKeyForwarded),
            PrivateKeyForwarded => Some(DeviceCaForwarded),
            DeviceCaForwarded => Some(ServerCaForwarded),
            ServerCaForwarded => Some(Done),
            Done | Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProvisioningState::Done | ProvisioningState::Failed)
    }

    /// Forward by exactly one step, or to `Failed` from any live state.
    pub fn can_transition_to(&self, to: ProvisioningState) -> bool {
        if to == ProvisioningState::Failed {
            return !self.is_terminal();
        }
        self.next() == Some(to)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningState::NotStarted => "not_started",
            ProvisioningState::Info => "info",
            ProvisioningState::Csr => "csr",
            ProvisioningState::CsrUploaded => "csr_uploaded",
            ProvisioningState::CrtForwarded => "crt_forwarded",
            ProvisioningState::KeysFetched => "keys_fetched",
            ProvisioningState::PrivateKeyForwarded => "private_key_forwarded",
            ProvisioningState::DeviceCaForwarded => "device_ca_forwarded",
            ProvisioningState::ServerCaForwarded => "server_ca_forwarded",
            ProvisioningState::Done => "done",
            ProvisioningState::Failed => "failed",
        }
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything learned about one device during one run.
///
/// Owned by the run that created it and passed by `&mut` to each step.
#[derive(Debug, Clone)]
pub struct ProvisioningSession {
    /// Unique run ID, for logs.
    pub run_id: Uuid,

    /// ID of the persisted lock record, once created.
    pub record_id: Option<u64>,

    /// Current state.
    state: ProvisioningState,

    /// Lock MAC address (`AA:BB:CC:DD:EE:FF`).
    pub lock_mac: Option<String>,

    /// 15-digit IMEI.
    pub imei: Option<String>,

    /// CSR PEM produced by the device.
    pub csr: Option<String>,

    /// Certificate issued for the CSR.
    pub certificate: Option<IssuedCertificate>,

    /// Private key and CA chain from the certificate service.
    pub keys: Option<KeyMaterial>,
}

impl ProvisioningSession {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            record_id: None,
            state: ProvisioningState::NotStarted,
            lock_mac: None,
            imei: None,
            csr: None,
            certificate: None,
            keys: None,
        }
    }

    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ProvisioningState::Done
    }

    /// Moves to `to`, rejecting skips and reversals.
    pub fn advance(&mut self, to: ProvisioningState) -> Result<(), ProvisionError> {
        if !self.state.can_transition_to(to) {
            return Err(ProvisionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Marks the run failed. No-op once terminal.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = ProvisioningState::Failed;
        }
    }
}

impl Default for ProvisioningSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_forward_walk() {
        let mut session = ProvisioningSession::new();
        let mut visited = vec![session.state()];

        while let Some(next) = session.state().next() {
            session.advance(next).unwrap();
            visited.push(next);
        }

        assert_eq!(visited.len(), 10);
        assert_eq!(visited.first(), Some(&ProvisioningState::NotStarted));
        assert!(session.is_done());
    }

    #[test]
    fn test_skip_rejected() {
        let mut session = ProvisioningSession::new();
        let result = session.advance(ProvisioningState::Csr);

        assert!(matches!(
            result,
            Err(ProvisionError::InvalidTransition {
                from: ProvisioningState::NotStarted,
                to: ProvisioningState::Csr
            })
        ));
        assert_eq!(session.state(), ProvisioningState::NotStarted);
    }

    #[test]
    fn test_reverse_rejected() {
        let mut session = ProvisioningSession::new();
        session.advance(ProvisioningState::Info).unwrap();
        session.advance(ProvisioningState::Csr).unwrap();

        assert!(session.advance(ProvisioningState::Info).is_err());
        assert!(session.advance(ProvisioningState::Csr).is_err());
    }

    #[test]
    fn test_fail_from_any_live_state() {
        let mut session = ProvisioningSession::new();
        session.advance(ProvisioningState::Info).unwrap();
        session.fail();
        assert_eq!(session.state(), ProvisioningState::Failed);

        // Failed is terminal
        assert!(session.advance(ProvisioningState::Csr).is_err());
        assert!(!ProvisioningState::Failed.can_transition_to(ProvisioningState::Failed));
    }

    #[test]
    fn test_done_is_terminal() {
        assert!(ProvisioningState::Done.is_terminal());
        assert_eq!(ProvisioningState::Done.next(), None);
        assert!(!ProvisioningState::Done.can_transition_to(ProvisioningState::Failed));

        let mut session = ProvisioningSession::new();
        while let Some(next) = session.state().next() {
            session.advance(next).unwrap();
        }
        session.fail();
        assert!(session.is_done());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&ProvisioningState::CsrUploaded).unwrap();
        assert_eq!(json, "\"csr_uploaded\"");
        assert_eq!(ProvisioningState::DeviceCaForwarded.to_string(), "device_ca_forwarded");
    }
}
