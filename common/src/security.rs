//! Transport security layer: rustls configurations enforcing mutual TLS.

use std::sync::Arc;

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider},
    pki_types::{CertificateDer, ServerName, UnixTime},
    server::WebPkiClientVerifier,
    ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme,
};

use crate::{
    credentials::{CredentialBundle, CredentialProvider, TrustStore},
    error::{Error, Result},
};

/// ALPN identifier for the HTTP/1.1 request that carries the upgrade
const ALPN_HTTP11: &[u8] = b"http/1.1";

/// Install the default crypto provider for rustls if not already installed
pub fn ensure_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Server-side TLS configuration. Always requires and verifies a client
/// certificate against a non-empty trust store.
#[derive(Clone)]
pub struct ServerSecurity {
    tls: Arc<ServerConfig>,
}

impl ServerSecurity {
    /// Builds the configuration from an already loaded credential and trust store
    pub fn build(credential: CredentialBundle, trust_store: TrustStore) -> Result<Self> {
        ensure_crypto_provider();

        if trust_store.is_empty() {
            return Err(Error::TrustStore("client CA trust store is empty".into()));
        }
        let (cert_chain, private_key) = credential.into_parts();

        let client_verifier = WebPkiClientVerifier::builder(Arc::new(trust_store.into_roots()))
            .build()
            .map_err(|e| Error::TrustStore(format!("failed to build client verifier: {e}")))?;

        let mut config = ServerConfig::builder()
            .with_client_cert_verifier(client_verifier) // Require and verify a client cert
            .with_single_cert(cert_chain, private_key)
            .map_err(|e| Error::CredentialLoad(format!("unusable server certificate: {e}")))?;
        config.alpn_protocols = vec![ALPN_HTTP11.to_vec()];

        Ok(Self {
            tls: Arc::new(config),
        })
    }

    /// Loads credential and trust store from a provider and builds the configuration
    pub fn from_provider(provider: &impl CredentialProvider) -> Result<Self> {
        let credential = provider.credential()?;
        let trust_store = provider.trust_store()?;
        tracing::info!(
            "Server credential loaded ({} certificate(s)), {} trusted client CA(s)",
            credential.cert_chain().len(),
            trust_store.len()
        );
        Self::build(credential, trust_store)
    }

    /// The rustls configuration handed to the TLS acceptor
    pub fn tls_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.tls)
    }

    /// Client certificates are mandatory for every server configuration
    pub fn mutual_auth_required(&self) -> bool {
        true
    }
}

/// How the client checks the identity the server presents
#[derive(Debug, Clone)]
pub enum ServerVerification {
    /// Verify the server chain and hostname against these authorities
    TrustStore(TrustStore),
    /// Accept any server certificate. Only for private self-signed deployments.
    InsecureSkipVerify,
}

/// Client-side TLS configuration. Always presents the client credential.
#[derive(Clone)]
pub struct ClientSecurity {
    tls:             Arc<ClientConfig>,
    verifies_server: bool,
}

impl ClientSecurity {
    /// Builds the configuration from a loaded credential
    pub fn build(credential: CredentialBundle, verification: ServerVerification) -> Result<Self> {
        ensure_crypto_provider();
        let (cert_chain, private_key) = credential.into_parts();

        let (builder, verifies_server) = match verification {
            ServerVerification::TrustStore(trust_store) => {
                if trust_store.is_empty() {
                    return Err(Error::TrustStore("server CA trust store is empty".into()));
                }
                (
                    ClientConfig::builder().with_root_certificates(trust_store.into_roots()),
                    true,
                )
            }
            ServerVerification::InsecureSkipVerify => {
                tracing::warn!(
                    "Server certificate verification is DISABLED; any server identity will be \
                     accepted"
                );
                let provider = CryptoProvider::get_default()
                    .cloned()
                    .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
                (
                    ClientConfig::builder()
                        .dangerous()
                        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert {
                            provider,
                        })),
                    false,
                )
            }
        };

        let mut config = builder
            .with_client_auth_cert(cert_chain, private_key)
            .map_err(|e| Error::CredentialLoad(format!("unusable client certificate: {e}")))?;
        config.alpn_protocols = vec![ALPN_HTTP11.to_vec()];

        Ok(Self {
            tls: Arc::new(config),
            verifies_server,
        })
    }

    /// Loads the credential (and, unless `insecure_skip_verify`, the trust
    /// store) from a provider and builds the configuration
    pub fn from_provider(
        provider: &impl CredentialProvider,
        insecure_skip_verify: bool,
    ) -> Result<Self> {
        let credential = provider.credential()?;
        let verification = if insecure_skip_verify {
            ServerVerification::InsecureSkipVerify
        } else {
            ServerVerification::TrustStore(provider.trust_store()?)
        };
        Self::build(credential, verification)
    }

    /// The rustls configuration handed to the TLS connector
    pub fn tls_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.tls)
    }

    /// Whether the server chain and hostname are verified
    pub fn verifies_server(&self) -> bool {
        self.verifies_server
    }
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
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
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
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
