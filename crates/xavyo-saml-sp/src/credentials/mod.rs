//! Key material: trusted identity provider credentials and the service
//! provider's decryption key.

pub mod decryption;
pub mod trust;

pub use decryption::DecryptionCredential;
pub use trust::{
    Credential, CredentialCriteria, EntityRole, KeyUsage, TrustAnchorResolver, TrustAnchorSet,
    TrustResolutionError, TrustedEntity,
};

use thiserror::Error;

/// Errors loading key material
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
}
