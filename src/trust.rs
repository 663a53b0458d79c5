//! PKCS#12 certificate containers.
//!
//! Certificates arrive as password protected PKCS#12 bundles. [`decrypt`] opens a
//! bundle into a [`Provider`] which is re-encoded as unencrypted PEM for storage.

use thiserror::Error;
use zeroize::Zeroizing;

use p12::{AlgorithmIdentifier, PFX};

pub const CERTIFICATE_TAG: &str = "CERTIFICATE";
pub const PRIVATE_KEY_TAG: &str = "PRIVATE KEY";

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("invalid pkcs12 password")]
    InvalidPassword,

    #[error("invalid certificate container: {0}")]
    Format(String),
}

/// A decrypted certificate chain (leaf first) and its PKCS#8 private key.
pub struct Provider {
    certificates: Vec<Vec<u8>>,
    private_key: Option<Zeroizing<Vec<u8>>>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("certificates", &self.certificates.len())
            .field("private_key", &self.private_key.is_some())
            .finish()
    }
}

/// Open a PKCS#12 bundle with its password.
pub fn decrypt(data: &[u8], password: &[u8]) -> Result<Provider, TrustError> {
    let password = std::str::from_utf8(password).map_err(|_| TrustError::InvalidPassword)?;
    let pfx = PFX::parse(data).map_err(|e| TrustError::Format(format!("{:?}", e)))?;

    // Only SHA-1 MACs can be verified.
    if let Some(mac_data) = &pfx.mac_data {
        if !matches!(mac_data.mac.digest_algorithm, AlgorithmIdentifier::Sha1) {
            return Err(TrustError::Format("unsupported mac digest algorithm".into()));
        }
    }

    if !pfx.verify_mac(password) {
        return Err(TrustError::InvalidPassword);
    }

    let certificates = pfx
        .cert_x509_bags(password)
        .map_err(|e| TrustError::Format(format!("{:?}", e)))?;
    if certificates.is_empty() {
        return Err(TrustError::Format("no certificates in container".into()));
    }

    let private_key = pfx
        .key_bags(password)
        .map_err(|e| TrustError::Format(format!("{:?}", e)))?
        .into_iter()
        .next()
        .map(Zeroizing::new);

    Ok(Provider {
        certificates,
        private_key,
    })
}

impl Provider {
    pub fn new(certificates: Vec<Vec<u8>>, private_key: Option<Vec<u8>>) -> Self {
        Self {
            certificates,
            private_key: private_key.map(Zeroizing::new),
        }
    }

    /// Parse PEM produced by [`Provider::encode`]. Blocks with other tags are ignored.
    pub fn from_pem(data: &[u8]) -> Result<Self, TrustError> {
        let blocks = pem::parse_many(data).map_err(|e| TrustError::Format(e.to_string()))?;

        let mut certificates = Vec::new();
        let mut private_key = None;
        for block in blocks {
            match block.tag() {
                CERTIFICATE_TAG => certificates.push(block.contents().to_vec()),
                PRIVATE_KEY_TAG => private_key = Some(Zeroizing::new(block.contents().to_vec())),
                _ => {}
            }
        }

        if certificates.is_empty() {
            return Err(TrustError::Format("no certificates in pem data".into()));
        }
        Ok(Self {
            certificates,
            private_key,
        })
    }

    pub fn certificates(&self) -> &[Vec<u8>] {
        &self.certificates
    }

    pub fn leaf(&self) -> Option<&[u8]> {
        self.certificates.first().map(Vec::as_slice)
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// Unencrypted PEM: the certificate chain followed by the private key.
    pub fn encode(&self) -> Vec<u8> {
        let mut blocks: Vec<pem::Pem> = self
            .certificates
            .iter()
            .map(|der| pem::Pem::new(CERTIFICATE_TAG, der.clone()))
            .collect();
        if let Some(key) = &self.private_key {
            blocks.push(pem::Pem::new(PRIVATE_KEY_TAG, key.to_vec()));
        }
        pem::encode_many(&blocks).into_bytes()
    }

    /// Wrap the chain and key back into a password protected PKCS#12 bundle.
    pub fn encrypt(&self, password: &str) -> Result<Vec<u8>, TrustError> {
        let key = self
            .private_key
            .as_ref()
            .ok_or_else(|| TrustError::Format("cannot encrypt without a private key".into()))?;

        let (leaf, chain) = self
            .certificates
            .split_first()
            .ok_or_else(|| TrustError::Format("no certificates to encrypt".into()))?;

        let cas: Vec<&[u8]> = chain.iter().map(Vec::as_slice).collect();
        let pfx = PFX::new_with_cas(leaf, key, &cas, password, "")
            .ok_or_else(|| TrustError::Format("could not build pkcs12 container".into()))?;
        Ok(pfx.to_der())
    }
}
