//! TLS connector for upgrading an established MySQL connection.

use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector as TokioTlsConnector;
use tokio_rustls::client::TlsStream;

use crate::config::{SslMode, TlsConfig, TlsVersion};
use crate::error::TlsError;

// =============================================================================
// Certificate Verifiers
// =============================================================================

/// Accepts any server certificate. Used by `Preferred` and `Required`.
#[derive(Debug)]
struct NoCertificateVerification {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Verifies the chain but tolerates a name mismatch. Used by `VerifyCa`.
#[derive(Debug)]
struct ChainOnlyVerification {
    inner: Arc<WebPkiServerVerifier>,
}

impl ChainOnlyVerification {
    fn is_name_mismatch(err: &rustls::Error) -> bool {
        // Newer rustls releases report the mismatch with extra context.
        match err {
            rustls::Error::InvalidCertificate(cert_err) => {
                matches!(cert_err, rustls::CertificateError::NotValidForName)
                    || format!("{cert_err:?}").starts_with("NotValidForName")
            }
            _ => false,
        }
    }
}

impl ServerCertVerifier for ChainOnlyVerification {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(err) if Self::is_name_mismatch(&err) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

// =============================================================================
// TLS Connector
// =============================================================================

/// TLS connector for MySQL connections.
///
/// MySQL negotiates TLS in-band: the client sends an SSLRequest packet in
/// reply to the initial handshake, then runs the TLS handshake on the same
/// socket and continues the protocol inside the encrypted stream.
pub struct TlsConnector {
    config: TlsConfig,
    inner: TokioTlsConnector,
}

impl TlsConnector {
    /// Create a new TLS connector with the given configuration.
    pub fn new(config: TlsConfig) -> Result<Self, TlsError> {
        let client_config = Self::build_client_config(&config)?;
        let inner = TokioTlsConnector::from(Arc::new(client_config));

        Ok(Self { config, inner })
    }

    /// Build the rustls client configuration.
    fn build_client_config(config: &TlsConfig) -> Result<ClientConfig, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let versions = Self::select_versions(config);
        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(&versions)?;

        let builder = match config.mode {
            SslMode::Preferred | SslMode::Required => {
                tracing::warn!(
                    mode = ?config.mode,
                    "TLS certificate validation is DISABLED; \
                     connections are vulnerable to man-in-the-middle attacks"
                );
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoCertificateVerification {
                        provider,
                    }))
            }
            SslMode::VerifyCa => {
                let roots = Arc::new(Self::build_root_store(config)?);
                let inner = WebPkiServerVerifier::builder_with_provider(roots, provider)
                    .build()
                    .map_err(|e| TlsError::Configuration(e.to_string()))?;
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(ChainOnlyVerification { inner }))
            }
            SslMode::VerifyIdentity => {
                builder.with_root_certificates(Self::build_root_store(config)?)
            }
        };

        let client_config = if let Some(client_auth) = &config.client_auth {
            builder
                .with_client_auth_cert(client_auth.certificates.clone(), client_auth.key.clone_key())
                .map_err(|e| TlsError::Configuration(format!("client auth setup failed: {e}")))?
        } else {
            builder.with_no_client_auth()
        };

        Ok(client_config)
    }

    /// Build the root certificate store.
    fn build_root_store(config: &TlsConfig) -> Result<RootCertStore, TlsError> {
        let mut root_store = RootCertStore::empty();

        if config.root_certificates.is_empty() {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        } else {
            for cert in &config.root_certificates {
                root_store
                    .add(cert.clone())
                    .map_err(|e| TlsError::InvalidCertificate(e.to_string()))?;
            }
        }

        Ok(root_store)
    }

    /// Select TLS protocol versions based on configuration.
    fn select_versions(config: &TlsConfig) -> Vec<&'static rustls::SupportedProtocolVersion> {
        let mut versions = Vec::new();

        for version in [TlsVersion::Tls12, TlsVersion::Tls13] {
            if config.min_protocol_version <= version && config.max_protocol_version >= version {
                versions.push(version.to_rustls());
            }
        }

        if versions.is_empty() {
            // Fallback to TLS 1.2 if no versions match
            versions.push(&rustls::version::TLS12);
        }

        versions
    }

    /// Perform the TLS handshake over an established stream.
    ///
    /// # Arguments
    ///
    /// * `stream` - The socket, positioned right after the SSLRequest packet
    /// * `server_name` - The server hostname for SNI and certificate validation
    pub async fn connect<S>(&self, stream: S, server_name: &str) -> Result<TlsStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let server_name = self.config.server_name.as_deref().unwrap_or(server_name);

        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TlsError::InvalidServerName(server_name.to_string()))?;

        tracing::debug!(server_name = %server_name, mode = ?self.config.mode, "performing TLS handshake");

        let tls_stream = self
            .inner
            .connect(name, stream)
            .await
            .map_err(|e| TlsError::HandshakeFailed(e.to_string()))?;

        tracing::debug!("TLS handshake completed successfully");

        Ok(tls_stream)
    }

    /// TLS mode of this connector.
    #[must_use]
    pub fn mode(&self) -> SslMode {
        self.config.mode
    }

    /// Get the underlying configuration.
    #[must_use]
    pub fn config(&self) -> &TlsConfig {
        &self.config
    }
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let connector = TlsConnector::new(TlsConfig::default());
        assert!(connector.is_ok());
    }

    #[test]
    fn test_all_modes_build() {
        for mode in [
            SslMode::Preferred,
            SslMode::Required,
            SslMode::VerifyCa,
            SslMode::VerifyIdentity,
        ] {
            let connector = TlsConnector::new(TlsConfig::new().mode(mode)).unwrap();
            assert_eq!(connector.mode(), mode);
        }
    }

    #[test]
    fn test_version_selection() {
        let config = TlsConfig::new().min_protocol_version(TlsVersion::Tls13);
        let versions = TlsConnector::select_versions(&config);
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, rustls::ProtocolVersion::TLSv1_3);
    }

    #[test]
    fn test_name_mismatch_detection() {
        let err = rustls::Error::InvalidCertificate(rustls::CertificateError::NotValidForName);
        assert!(ChainOnlyVerification::is_name_mismatch(&err));
        let err = rustls::Error::InvalidCertificate(rustls::CertificateError::Expired);
        assert!(!ChainOnlyVerification::is_name_mismatch(&err));
    }
}
