//! Credential provider: PEM certificate chains, private keys and trust stores.

use std::{fs, io::BufReader, path::Path};

use rustls::{
    pki_types::{CertificateDer, PrivateKeyDer},
    RootCertStore,
};
use rustls_pemfile::{certs, private_key};

use crate::{
    config::{ClientCertPath, ServerCertPath},
    error::{Error, Result},
};

/// Source of the key material an endpoint needs to build its TLS configuration
pub trait CredentialProvider {
    /// Certificate chain and private key this endpoint presents
    fn credential(&self) -> Result<CredentialBundle>;

    /// Authorities this endpoint trusts to sign its peer's certificate
    fn trust_store(&self) -> Result<TrustStore>;
}

/// Certificate chain plus private key, immutable once loaded
pub struct CredentialBundle {
    cert_chain:  Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
}

impl CredentialBundle {
    /// Reads a certificate chain and key from PEM files. Both paths may point to
    /// the same file.
    pub fn load(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let cert_path = cert_path.as_ref();
        let key_path = key_path.as_ref();
        tracing::debug!("Loading credential: cert {:?}, key {:?}", cert_path, key_path);

        let cert_pem = read_pem(cert_path, Error::CredentialLoad)?;
        let key_pem = if key_path == cert_path {
            cert_pem.clone()
        } else {
            read_pem(key_path, Error::CredentialLoad)?
        };

        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Parses a certificate chain and key from PEM bytes
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let cert_chain = certs(&mut BufReader::new(cert_pem))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::CredentialLoad(format!("failed to parse certificate: {e}")))?;
        if cert_chain.is_empty() {
            return Err(Error::CredentialLoad("no certificate found".into()));
        }

        let private_key = private_key(&mut BufReader::new(key_pem))
            .map_err(|e| Error::CredentialLoad(format!("failed to parse private key: {e}")))?
            .ok_or_else(|| Error::CredentialLoad("no private key found".into()))?;

        Ok(Self {
            cert_chain,
            private_key,
        })
    }

    /// Certificates presented during the handshake, leaf first
    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.cert_chain
    }

    pub(crate) fn into_parts(self) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        (self.cert_chain, self.private_key)
    }
}

impl Clone for CredentialBundle {
    fn clone(&self) -> Self {
        Self {
            cert_chain:  self.cert_chain.clone(),
            private_key: self.private_key.clone_key(),
        }
    }
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("certificates", &self.cert_chain.len())
            .finish_non_exhaustive()
    }
}

/// Non-empty set of trusted root and intermediate certificates
#[derive(Debug, Clone)]
pub struct TrustStore {
    roots: RootCertStore,
}

impl TrustStore {
    /// Reads a PEM bundle of trusted certificates
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let pem = read_pem(path, Error::TrustStore)?;
        Self::from_pem(&pem)
            .map_err(|e| Error::TrustStore(format!("{} ({})", e, path.display())))
    }

    /// Parses a PEM bundle, keeping every certificate rustls accepts as an anchor
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let ca_certs = certs(&mut BufReader::new(pem))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::TrustStore(format!("failed to parse CA certificates: {e}")))?;

        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(ca_certs);
        if ignored > 0 {
            tracing::warn!("Ignored {} unparsable CA certificate(s)", ignored);
        }

        if roots.is_empty() {
            return Err(Error::TrustStore("no valid CA certificates found".into()));
        }
        tracing::debug!("Trust store holds {} certificate(s)", added);

        Ok(Self { roots })
    }

    /// Number of trusted certificates
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Always false for a constructed store
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// The underlying rustls root store
    pub fn roots(&self) -> &RootCertStore {
        &self.roots
    }

    pub(crate) fn into_roots(self) -> RootCertStore {
        self.roots
    }
}

impl CredentialProvider for ServerCertPath {
    fn credential(&self) -> Result<CredentialBundle> {
        CredentialBundle::load(&self.cert_path, &self.key_path)
    }

    fn trust_store(&self) -> Result<TrustStore> {
        TrustStore::load(&self.ca_path)
    }
}

impl CredentialProvider for ClientCertPath {
    fn credential(&self) -> Result<CredentialBundle> {
        CredentialBundle::load(&self.cert_path, &self.key_path)
    }

    fn trust_store(&self) -> Result<TrustStore> {
        match &self.ca_path {
            Some(path) => TrustStore::load(path),
            None => Err(Error::TrustStore(
                "no CA bundle configured for server verification".into(),
            )),
        }
    }
}

fn read_pem(path: &Path, err: fn(String) -> Error) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| err(format!("failed to read {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pki::TestPki;

    #[test]
    fn test_load_credential_from_pem() {
        let pki = TestPki::generate();
        let bundle =
            CredentialBundle::from_pem(pki.client.cert_pem.as_bytes(), pki.client.key_pem.as_bytes())
                .expect("client credential should parse");
        // leaf + issuing CA
        assert_eq!(bundle.cert_chain().len(), 2);
    }

    #[test]
    fn test_combined_pem_file() {
        let pki = TestPki::generate();
        let dir = pki.write_to_temp_dir("combined");
        let combined = dir.path().join("user.client.pem");
        assert!(CredentialBundle::load(&combined, &combined).is_ok());
    }

    #[test]
    fn test_missing_key_is_credential_error() {
        let pki = TestPki::generate();
        let result = CredentialBundle::from_pem(pki.client.cert_pem.as_bytes(), b"");
        assert!(matches!(result, Err(Error::CredentialLoad(_))));
    }

    #[test]
    fn test_missing_file_is_credential_error() {
        let result = CredentialBundle::load("/nonexistent/cert.pem", "/nonexistent/key.pem");
        assert!(matches!(result, Err(Error::CredentialLoad(_))));
    }

    #[test]
    fn test_empty_trust_store_rejected() {
        assert!(matches!(
            TrustStore::from_pem(b"not a pem"),
            Err(Error::TrustStore(_))
        ));
    }

    #[test]
    fn test_trust_store_from_ca() {
        let pki = TestPki::generate();
        let store = TrustStore::from_pem(pki.ca_pem.as_bytes()).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_client_paths_without_ca() {
        let paths = ClientCertPath {
            ca_path: None,
            ..ClientCertPath::new()
        };
        assert!(matches!(paths.trust_store(), Err(Error::TrustStore(_))));
    }
}
