//! The service provider's assertion decryption key

use super::CredentialError;
use openssl::pkey::{Id, PKey, Private};
use std::fmt;

/// RSA private key used to unwrap assertion encryption keys.
///
/// Loaded once at startup and shared read-only between requests.
#[derive(Clone)]
pub struct DecryptionCredential {
    key: PKey<Private>,
}

impl DecryptionCredential {
    /// Load an RSA private key from PEM (PKCS#1 or PKCS#8).
    pub fn from_pem(pem: &[u8]) -> Result<Self, CredentialError> {
        let key = PKey::private_key_from_pem(pem)
            .map_err(|e| CredentialError::InvalidPrivateKey(e.to_string()))?;
        Self::from_key(key)
    }

    pub fn from_key(key: PKey<Private>) -> Result<Self, CredentialError> {
        if key.id() != Id::RSA {
            return Err(CredentialError::InvalidPrivateKey(
                "assertion decryption requires an RSA key".to_string(),
            ));
        }
        Ok(Self { key })
    }

    pub(crate) fn private_key(&self) -> &PKey<Private> {
        &self.key
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> u32 {
        self.key.bits()
    }
}

impl fmt::Debug for DecryptionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionCredential")
            .field("bits", &self.key.bits())
            .field("key", &"[REDACTED]")
            .finish()
    }
}
