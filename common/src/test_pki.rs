//! Throwaway PKI for tests: one CA, a `localhost` server leaf, a client leaf,
//! and a client leaf signed by an unrelated CA.
//!
//! Only compiled for tests or with the `test-util` feature.

use std::fs;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};

use tempfile::TempDir;

use crate::credentials::{CredentialBundle, TrustStore};

/// PEM-encoded leaf certificate and its key
#[derive(Debug, Clone)]
pub struct TestLeaf {
    /// Leaf certificate followed by its issuing CA
    pub cert_pem: String,
    /// PKCS#8 private key
    pub key_pem:  String,
}

impl TestLeaf {
    /// Parses the leaf into a credential bundle.
    ///
    /// # Panics
    ///
    /// Panics if the generated PEM does not parse (test-only).
    pub fn credential(&self) -> CredentialBundle {
        CredentialBundle::from_pem(self.cert_pem.as_bytes(), self.key_pem.as_bytes())
            .expect("generated credential should parse")
    }
}

/// Certificates for one test run
#[derive(Debug, Clone)]
pub struct TestPki {
    /// The CA both endpoints trust
    pub ca_pem:       String,
    /// Server leaf for `localhost`
    pub server:       TestLeaf,
    /// Client leaf signed by the trusted CA
    pub client:       TestLeaf,
    /// Client leaf signed by a CA nobody trusts
    pub rogue_client: TestLeaf,
}

struct TestCa {
    cert: Certificate,
    key:  KeyPair,
}

impl TestCa {
    fn generate(name: &str) -> Self {
        let mut params =
            CertificateParams::new(Vec::<String>::new()).expect("CA params should build");
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let key = KeyPair::generate().expect("CA key generation should succeed");
        let cert = params.self_signed(&key).expect("CA self-signing should succeed");
        Self { cert, key }
    }

    fn issue(&self, name: &str, usage: ExtendedKeyUsagePurpose) -> TestLeaf {
        let mut params =
            CertificateParams::new(vec![name.to_string()]).expect("leaf params should build");
        params.distinguished_name.push(DnType::CommonName, name);
        params.extended_key_usages = vec![usage];

        let key = KeyPair::generate().expect("leaf key generation should succeed");
        let cert = params
            .signed_by(&key, &self.cert, &self.key)
            .expect("leaf signing should succeed");

        TestLeaf {
            cert_pem: format!("{}{}", cert.pem(), self.cert.pem()),
            key_pem:  key.serialize_pem(),
        }
    }
}

impl TestPki {
    /// Generates a fresh CA and leaves.
    ///
    /// # Panics
    ///
    /// Panics if certificate generation fails (test-only).
    pub fn generate() -> Self {
        let ca = TestCa::generate("ackwire test CA");
        let rogue_ca = TestCa::generate("ackwire rogue CA");

        Self {
            ca_pem:       ca.cert.pem(),
            server:       ca.issue("localhost", ExtendedKeyUsagePurpose::ServerAuth),
            client:       ca.issue("ackwire-client", ExtendedKeyUsagePurpose::ClientAuth),
            rogue_client: rogue_ca.issue("ackwire-client", ExtendedKeyUsagePurpose::ClientAuth),
        }
    }

    /// Trust store holding the test CA.
    ///
    /// # Panics
    ///
    /// Panics if the CA PEM does not parse (test-only).
    pub fn trust_store(&self) -> TrustStore {
        TrustStore::from_pem(self.ca_pem.as_bytes()).expect("CA should parse")
    }

    /// Writes the PKI in the default on-disk layout (`localhost.chain.pem`,
    /// `localhost.key.pem`, `user.client.pem`) to a fresh temp directory.
    /// The directory and the keys in it are removed when the returned
    /// [`TempDir`] is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the files cannot be written (test-only).
    pub fn write_to_temp_dir(&self, label: &str) -> TempDir {
        let dir = tempfile::Builder::new()
            .prefix(&format!("ackwire-{label}-"))
            .tempdir()
            .expect("temp dir should be created");
        let path = dir.path();

        fs::write(path.join("localhost.chain.pem"), &self.server.cert_pem)
            .expect("chain should be written");
        fs::write(path.join("localhost.key.pem"), &self.server.key_pem)
            .expect("server key should be written");
        fs::write(
            path.join("user.client.pem"),
            format!("{}{}", self.client.cert_pem, self.client.key_pem),
        )
        .expect("client pem should be written");

        dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_dir_is_removed_on_drop() {
        let pki = TestPki::generate();
        let dir = pki.write_to_temp_dir("cleanup");
        let path = dir.path().to_path_buf();
        assert!(path.join("localhost.key.pem").is_file());
        assert!(path.join("user.client.pem").is_file());

        drop(dir);
        assert!(!path.exists(), "private keys left behind in {path:?}");
    }
}
