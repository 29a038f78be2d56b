//! Trust anchors for identity provider signatures.
//!
//! The resolver is the only source of verification keys. Keys embedded in
//! a received signature's `KeyInfo` are never consulted.

use super::CredentialError;
use crate::saml::constants::SAMLP_NS;
use openssl::pkey::{PKey, Public};
use openssl::x509::X509;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Metadata role a credential is published under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRole {
    IdpSsoDescriptor,
    SpSsoDescriptor,
}

/// Declared use of a key (`KeyDescriptor/@use`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    Signing,
    Encryption,
    /// No `use` attribute: valid for both
    Unspecified,
}

/// What a caller is looking for in the trust store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCriteria {
    pub entity_id: String,
    pub role: EntityRole,
    pub protocol: String,
    pub usage: KeyUsage,
}

impl CredentialCriteria {
    /// Signing keys of an identity provider speaking SAML 2.0.
    pub fn idp_signing(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            role: EntityRole::IdpSsoDescriptor,
            protocol: SAMLP_NS.to_string(),
            usage: KeyUsage::Signing,
        }
    }
}

/// Trust store failure
#[derive(Debug, Error)]
pub enum TrustResolutionError {
    #[error("Trust anchor lookup failed: {0}")]
    Lookup(String),
}

/// A trusted public key, optionally with the certificate it came from
#[derive(Debug, Clone)]
pub struct Credential {
    public_key: PKey<Public>,
    certificate: Option<X509>,
    usage: KeyUsage,
}

impl Credential {
    /// Load from an X.509 certificate in PEM form, with or without the PEM armour.
    pub fn from_certificate_pem(pem: &str, usage: KeyUsage) -> Result<Self, CredentialError> {
        let pem_data = if pem.contains("-----BEGIN CERTIFICATE-----") {
            pem.to_string()
        } else {
            format!(
                "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----",
                pem.trim()
            )
        };

        let certificate = X509::from_pem(pem_data.as_bytes())
            .map_err(|e| CredentialError::InvalidCertificate(e.to_string()))?;
        Self::from_certificate(certificate, usage)
    }

    pub fn from_certificate(certificate: X509, usage: KeyUsage) -> Result<Self, CredentialError> {
        let public_key = certificate
            .public_key()
            .map_err(|e| CredentialError::InvalidCertificate(e.to_string()))?;
        Ok(Self {
            public_key,
            certificate: Some(certificate),
            usage,
        })
    }

    /// Load from a `PUBLIC KEY` PEM block.
    pub fn from_public_key_pem(pem: &[u8], usage: KeyUsage) -> Result<Self, CredentialError> {
        let public_key = PKey::public_key_from_pem(pem)
            .map_err(|e| CredentialError::InvalidPublicKey(e.to_string()))?;
        Ok(Self::from_public_key(public_key, usage))
    }

    pub fn from_public_key(public_key: PKey<Public>, usage: KeyUsage) -> Self {
        Self {
            public_key,
            certificate: None,
            usage,
        }
    }

    pub fn public_key(&self) -> &PKey<Public> {
        &self.public_key
    }

    pub fn certificate(&self) -> Option<&X509> {
        self.certificate.as_ref()
    }

    pub fn usage(&self) -> KeyUsage {
        self.usage
    }

    /// True if this credential may be used for `wanted`.
    pub fn allows(&self, wanted: KeyUsage) -> bool {
        self.usage == KeyUsage::Unspecified || wanted == KeyUsage::Unspecified || self.usage == wanted
    }
}

/// Looks up trusted credentials.
///
/// Implementations are expected to be pre-populated (for instance from
/// metadata fetched elsewhere); lookups must not block on the network.
pub trait TrustAnchorResolver: Send + Sync {
    fn resolve(
        &self,
        criteria: &CredentialCriteria,
    ) -> Result<Vec<Arc<Credential>>, TrustResolutionError>;
}

/// One trusted entity in a [`TrustAnchorSet`]
#[derive(Debug, Clone)]
pub struct TrustedEntity {
    pub entity_id: String,
    pub role: EntityRole,
    pub protocols: Vec<String>,
    pub credentials: Vec<Arc<Credential>>,
}

impl TrustedEntity {
    /// An identity provider supporting the SAML 2.0 protocol.
    pub fn saml20_idp(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            role: EntityRole::IdpSsoDescriptor,
            protocols: vec![SAMLP_NS.to_string()],
            credentials: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credentials.push(Arc::new(credential));
        self
    }
}

/// In-memory, read-only trust store
#[derive(Debug, Clone, Default)]
pub struct TrustAnchorSet {
    entities: HashMap<(String, EntityRole), TrustedEntity>,
}

impl TrustAnchorSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entity.
    #[must_use]
    pub fn with_entity(mut self, entity: TrustedEntity) -> Self {
        self.entities
            .insert((entity.entity_id.clone(), entity.role), entity);
        self
    }

    /// Trust `certificate_pem` as a signing key of the identity provider `entity_id`.
    pub fn with_idp_signing_certificate(
        self,
        entity_id: impl Into<String>,
        certificate_pem: &str,
    ) -> Result<Self, CredentialError> {
        let entity_id = entity_id.into();
        let credential = Credential::from_certificate_pem(certificate_pem, KeyUsage::Signing)?;
        let entity = match self
            .entities
            .get(&(entity_id.clone(), EntityRole::IdpSsoDescriptor))
        {
            Some(existing) => existing.clone().with_credential(credential),
            None => TrustedEntity::saml20_idp(entity_id).with_credential(credential),
        };
        Ok(self.with_entity(entity))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl TrustAnchorResolver for TrustAnchorSet {
    fn resolve(
        &self,
        criteria: &CredentialCriteria,
    ) -> Result<Vec<Arc<Credential>>, TrustResolutionError> {
        let Some(entity) = self
            .entities
            .get(&(criteria.entity_id.clone(), criteria.role))
        else {
            return Ok(Vec::new());
        };

        if !entity.protocols.iter().any(|p| *p == criteria.protocol) {
            return Ok(Vec::new());
        }

        Ok(entity
            .credentials
            .iter()
            .filter(|c| c.allows(criteria.usage))
            .cloned()
            .collect())
    }
}
