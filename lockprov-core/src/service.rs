//! Remote certificate service boundary.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use thiserror::Error;

/// Certificate issued for an uploaded CSR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedCertificate {
    /// PEM text forwarded to the device verbatim.
    pub certificate: String,

    /// Whatever else the service returned alongside the certificate.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IssuedCertificate {
    pub fn new(certificate: impl Into<String>) -> Self {
        Self {
            certificate: certificate.into(),
            extra: Map::new(),
        }
    }
}

/// Private key and CA chain handed out by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMaterial {
    pub private_key: String,
    pub ca: String,
    #[serde(rename = "rootCA")]
    pub root_ca: String,
}

/// Certificate service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("certificate service request failed: {0}")]
    Request(String),

    #[error("invalid certificate service payload: {0}")]
    InvalidPayload(String),
}

impl ServiceError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Request(_))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::InvalidPayload(e.to_string())
    }
}

/// Issues device certificates and hands out key material.
pub trait CertificateService: Send + Sync {
    /// Submits a CSR for the given lock and returns the issued certificate.
    fn upload_csr(
        &self,
        lock_mac: &str,
        imei: &str,
        csr: &str,
    ) -> impl Future<Output = Result<IssuedCertificate, ServiceError>> + Send;

    /// Fetches the device private key, device CA and root CA.
    fn get_keys(&self) -> impl Future<Output = Result<KeyMaterial, ServiceError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_material_field_names() {
        let keys: KeyMaterial = serde_json::from_value(json!({
            "privateKey": "KEY",
            "ca": "DEVICE-CA",
            "rootCA": "ROOT-CA"
        }))
        .unwrap();

        assert_eq!(keys.private_key, "KEY");
        assert_eq!(keys.ca, "DEVICE-CA");
        assert_eq!(keys.root_ca, "ROOT-CA");

        let value = serde_json::to_value(&keys).unwrap();
        assert_eq!(value["rootCA"], "ROOT-CA");
        assert_eq!(value["privateKey"], "KEY");
    }

    #[test]
    fn test_issued_certificate_keeps_extra_fields() {
        let issued: IssuedCertificate = serde_json::from_value(json!({
            "certificate": "-----BEGIN CERTIFICATE-----",
            "serial": "0A1B",
            "expires": 1767225600
        }))
        .unwrap();

        assert_eq!(issued.certificate, "-----BEGIN CERTIFICATE-----");
        assert_eq!(issued.extra["serial"], "0A1B");
        assert_eq!(issued.extra.len(), 2);
    }

    #[test]
    fn test_missing_field_is_invalid_payload() {
        let err: ServiceError = serde_json::from_value::<KeyMaterial>(json!({"ca": "x"}))
            .unwrap_err()
            .into();
        assert!(matches!(err, ServiceError::InvalidPayload(_)));
        assert!(!err.is_retryable());
    }
}
