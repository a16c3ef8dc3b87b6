//! Provisioning error types.

use crate::record::RecordError;
use crate::service::ServiceError;
use crate::session::ProvisioningState;
use lockprov_device::DeviceError;
use lockprov_protocol::ProtocolError;
use thiserror::Error;

/// Errors that abort a provisioning run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("transport error: {0}")]
    Transport(DeviceError),

    #[error("frame too large: command of {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("malformed response: {0}")]
    MalformedResponse(ProtocolError),

    #[error("certificate service error: {0}")]
    RemoteService(#[from] ServiceError),

    #[error("record store error: {0}")]
    Record(#[from] RecordError),

    #[error("invalid transition: cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        from: ProvisioningState,
        to: ProvisioningState,
    },

    #[error("session has no {0} yet")]
    MissingArtifact(&'static str),

    #[error("provisioning cancelled")]
    Cancelled,

    #[error("a provisioning run is already in progress")]
    AlreadyRunning,
}

impl From<ProtocolError> for ProvisionError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::FrameTooLarge { size, max } => {
                ProvisionError::FrameTooLarge { size, max }
            }
            other => ProvisionError::MalformedResponse(other),
        }
    }
}

impl From<DeviceError> for ProvisionError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::Protocol(p) => p.into(),
            other => ProvisionError::Transport(other),
        }
    }
}

impl ProvisionError {
    /// Returns whether starting a fresh run might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProvisionError::Transport(e) => e.is_retryable(),
            ProvisionError::RemoteService(e) => e.is_retryable(),
            ProvisionError::Cancelled | ProvisionError::AlreadyRunning => true,
            _ => false,
        }
    }

    /// Stable code for logs and UI.
    pub fn error_code(&self) -> &'static str {
        match self {
            ProvisionError::Transport(_) => "TRANSPORT_ERROR",
            ProvisionError::FrameTooLarge { .. } => "FRAME_TOO_LARGE",
            ProvisionError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            ProvisionError::RemoteService(_) => "REMOTE_SERVICE_ERROR",
            ProvisionError::Record(_) => "RECORD_ERROR",
            ProvisionError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ProvisionError::MissingArtifact(_) => "MISSING_ARTIFACT",
            ProvisionError::Cancelled => "CANCELLED",
            ProvisionError::AlreadyRunning => "CONFLICT",
        }
    }
}
