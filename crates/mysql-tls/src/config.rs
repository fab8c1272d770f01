//! TLS configuration options.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::TlsError;

/// Client authentication credentials for mutual TLS.
///
/// This is wrapped in an Arc because `PrivateKeyDer` doesn't implement Clone.
#[derive(Clone)]
pub struct ClientAuth {
    /// Client certificate chain.
    pub certificates: Vec<CertificateDer<'static>>,
    /// Client private key (wrapped in Arc as it doesn't implement Clone).
    pub key: Arc<PrivateKeyDer<'static>>,
}

impl ClientAuth {
    /// Create new client authentication credentials.
    pub fn new(certificates: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self {
            certificates,
            key: Arc::new(key),
        }
    }
}

impl std::fmt::Debug for ClientAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAuth")
            .field("certificates_count", &self.certificates.len())
            .field("has_key", &true)
            .finish()
    }
}

/// How strictly TLS is required and verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SslMode {
    /// Use TLS when the server offers it; do not verify the certificate.
    Preferred,
    /// Require TLS; do not verify the certificate.
    Required,
    /// Require TLS and verify the certificate chain, but not the hostname.
    VerifyCa,
    /// Require TLS and verify the certificate chain and the hostname.
    #[default]
    VerifyIdentity,
}

impl SslMode {
    /// Whether the connection fails when the server lacks TLS support.
    #[must_use]
    pub fn requires_tls(self) -> bool {
        !matches!(self, Self::Preferred)
    }

    /// Whether the certificate chain is verified.
    #[must_use]
    pub fn verifies_chain(self) -> bool {
        matches!(self, Self::VerifyCa | Self::VerifyIdentity)
    }

    /// Whether the certificate must match the server name.
    #[must_use]
    pub fn verifies_hostname(self) -> bool {
        matches!(self, Self::VerifyIdentity)
    }
}

/// TLS configuration for MySQL connections.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct TlsConfig {
    /// TLS requirement and verification level.
    pub mode: SslMode,

    /// Custom root certificates to trust.
    ///
    /// If empty, the Mozilla root certificates are used.
    pub root_certificates: Vec<CertificateDer<'static>>,

    /// Client authentication credentials for mutual TLS.
    pub client_auth: Option<ClientAuth>,

    /// Server hostname for certificate validation.
    ///
    /// If not set, the connection hostname is used.
    pub server_name: Option<String>,

    /// Minimum TLS version to accept.
    pub min_protocol_version: TlsVersion,

    /// Maximum TLS version to accept.
    pub max_protocol_version: TlsVersion,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            mode: SslMode::default(),
            root_certificates: Vec::new(),
            client_auth: None,
            server_name: None,
            min_protocol_version: TlsVersion::Tls12,
            max_protocol_version: TlsVersion::Tls13,
        }
    }
}

impl TlsConfig {
    /// Create a new TLS configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TLS mode.
    #[must_use]
    pub fn mode(mut self, mode: SslMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a custom root certificate to trust.
    #[must_use]
    pub fn add_root_certificate(mut self, cert: CertificateDer<'static>) -> Self {
        self.root_certificates.push(cert);
        self
    }

    /// Add every certificate of a PEM bundle as a trusted root.
    pub fn add_root_certificates_pem(mut self, pem: &[u8]) -> Result<Self, TlsError> {
        let mut reader = pem;
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(|e| TlsError::InvalidCertificate(e.to_string()))?;
            self.root_certificates.push(cert);
        }
        if self.root_certificates.is_empty() {
            return Err(TlsError::InvalidCertificate(
                "no certificates found in PEM".into(),
            ));
        }
        Ok(self)
    }

    /// Set custom root certificates, replacing any existing ones.
    #[must_use]
    pub fn with_root_certificates(mut self, certs: Vec<CertificateDer<'static>>) -> Self {
        self.root_certificates = certs;
        self
    }

    /// Set client certificate and key for mutual TLS.
    #[must_use]
    pub fn with_client_auth(
        mut self,
        certs: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Self {
        self.client_auth = Some(ClientAuth::new(certs, key));
        self
    }

    /// Set client certificate and key from PEM.
    pub fn with_client_auth_pem(self, cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, TlsError> {
        let mut reader = cert_pem;
        let certs = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TlsError::InvalidCertificate(e.to_string()))?;
        let mut reader = key_pem;
        let key = rustls_pemfile::private_key(&mut reader)
            .map_err(|e| TlsError::InvalidPrivateKey(e.to_string()))?
            .ok_or_else(|| TlsError::InvalidPrivateKey("no private key found in PEM".into()))?;
        Ok(self.with_client_auth(certs, key))
    }

    /// Set the server name for certificate validation.
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Set the minimum TLS version.
    #[must_use]
    pub fn min_protocol_version(mut self, version: TlsVersion) -> Self {
        self.min_protocol_version = version;
        self
    }

    /// Set the maximum TLS version.
    #[must_use]
    pub fn max_protocol_version(mut self, version: TlsVersion) -> Self {
        self.max_protocol_version = version;
        self
    }

    /// Check if client certificate authentication is configured.
    #[must_use]
    pub fn has_client_auth(&self) -> bool {
        self.client_auth.is_some()
    }
}

/// TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TlsVersion {
    /// TLS 1.2
    #[default]
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Convert to rustls protocol version.
    #[must_use]
    pub fn to_rustls(&self) -> &'static rustls::SupportedProtocolVersion {
        match self {
            Self::Tls12 => &rustls::version::TLS12,
            Self::Tls13 => &rustls::version::TLS13,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_semantics() {
        assert!(!SslMode::Preferred.requires_tls());
        assert!(SslMode::Required.requires_tls());
        assert!(!SslMode::Required.verifies_chain());
        assert!(SslMode::VerifyCa.verifies_chain());
        assert!(!SslMode::VerifyCa.verifies_hostname());
        assert!(SslMode::default().verifies_hostname());
    }

    #[test]
    fn test_root_certificates_from_pem() {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
        let pem = cert.cert.pem();
        let config = TlsConfig::new().add_root_certificates_pem(pem.as_bytes()).unwrap();
        assert_eq!(config.root_certificates.len(), 1);

        assert!(TlsConfig::new().add_root_certificates_pem(b"garbage").is_err());
    }

    #[test]
    fn test_client_auth_from_pem() {
        let cert = rcgen::generate_simple_self_signed(vec!["client".into()]).unwrap();
        let config = TlsConfig::new()
            .with_client_auth_pem(
                cert.cert.pem().as_bytes(),
                cert.signing_key.serialize_pem().as_bytes(),
            )
            .unwrap();
        assert!(config.has_client_auth());
    }
}
