//! Offline certificate bundle.
//!
//! Stands in for the remote certificate service: the issued certificate and
//! key material are read from a YAML file prepared ahead of time, and the
//! device's CSR is optionally written out so it can be signed elsewhere.

use crate::config::ConfigError;
use lockprov_core::{CertificateService, IssuedCertificate, KeyMaterial, ServiceError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Contents of a bundle file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateBundle {
    pub certificate: String,
    #[serde(flatten)]
    pub keys: KeyMaterial,
}

impl CertificateBundle {
    /// Loads a bundle from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let bundle: CertificateBundle = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        bundle.validate()?;
        Ok(bundle)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("certificate", &self.certificate),
            ("privateKey", &self.keys.private_key),
            ("ca", &self.keys.ca),
            ("rootCA", &self.keys.root_ca),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "bundle field '{}' is empty",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// [`CertificateService`] backed by a [`CertificateBundle`].
pub struct BundleService {
    bundle: CertificateBundle,
    csr_out: Option<PathBuf>,
}

impl BundleService {
    pub fn new(bundle: CertificateBundle) -> Self {
        Self {
            bundle,
            csr_out: None,
        }
    }

    /// Writes every uploaded CSR to `path`.
    pub fn with_csr_out(mut self, path: impl Into<PathBuf>) -> Self {
        self.csr_out = Some(path.into());
        self
    }
}

impl CertificateService for BundleService {
    async fn upload_csr(
        &self,
        lock_mac: &str,
        imei: &str,
        csr: &str,
    ) -> Result<IssuedCertificate, ServiceError> {
        if let Some(ref path) = self.csr_out {
            tokio::fs::write(path, csr).await.map_err(|e| {
                ServiceError::Request(format!("failed to write CSR to {}: {}", path.display(), e))
            })?;
            tracing::info!("CSR for {} written to {}", lock_mac, path.display());
        }

        let mut issued = IssuedCertificate::new(self.bundle.certificate.clone());
        issued
            .extra
            .insert("lockMac".to_string(), Value::from(lock_mac));
        issued.extra.insert("imei".to_string(), Value::from(imei));
        Ok(issued)
    }

    async fn get_keys(&self) -> Result<KeyMaterial, ServiceError> {
        Ok(self.bundle.keys.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    const BUNDLE: &str = "\
certificate: |
  -----BEGIN CERTIFICATE-----
  MIIC
  -----END CERTIFICATE-----
privateKey: KEY
ca: DEVICE-CA
rootCA: ROOT-CA
";

    fn bundle_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_bundle() {
        let file = bundle_file(BUNDLE);
        let bundle = CertificateBundle::from_file(file.path()).unwrap();

        assert!(bundle.certificate.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert_eq!(bundle.keys.private_key, "KEY");
        assert_eq!(bundle.keys.ca, "DEVICE-CA");
        assert_eq!(bundle.keys.root_ca, "ROOT-CA");
    }

    #[test]
    fn test_missing_field() {
        let file = bundle_file("certificate: C\nprivateKey: K\nca: CA\n");
        let result = CertificateBundle::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(..))));
    }

    #[test]
    fn test_empty_field() {
        let file = bundle_file("certificate: C\nprivateKey: ''\nca: CA\nrootCA: R\n");
        let result = CertificateBundle::from_file(file.path());
        assert!(
            matches!(result, Err(ConfigError::ValidationError(msg)) if msg.contains("privateKey"))
        );
    }

    #[tokio::test]
    async fn test_service_answers_from_bundle() {
        let dir = tempdir().unwrap();
        let csr_path = dir.path().join("lock.csr");
        let bundle = CertificateBundle::from_file(bundle_file(BUNDLE).path()).unwrap();
        let service = BundleService::new(bundle.clone()).with_csr_out(&csr_path);

        let issued = service
            .upload_csr("11:22:33:44:55:66", "000000000000000", "CSR-PEM")
            .await
            .unwrap();
        assert_eq!(issued.certificate, bundle.certificate);
        assert_eq!(issued.extra["lockMac"], "11:22:33:44:55:66");
        assert_eq!(std::fs::read_to_string(&csr_path).unwrap(), "CSR-PEM");

        assert_eq!(service.get_keys().await.unwrap(), bundle.keys);
    }

    #[tokio::test]
    async fn test_unwritable_csr_out() {
        let bundle = CertificateBundle::from_file(bundle_file(BUNDLE).path()).unwrap();
        let service = BundleService::new(bundle).with_csr_out("/nonexistent/dir/lock.csr");

        let result = service.upload_csr("M", "I", "CSR").await;
        assert!(matches!(result, Err(ServiceError::Request(_))));
    }
}
