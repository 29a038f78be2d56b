//! Enveloped XML signature verification for decrypted assertions
//!
//! Verification runs in a fixed order: presence, SAML signature profile,
//! trust resolution, then the cryptographic checks. The signing key always
//! comes from the trust resolver; `ds:KeyInfo` in the message is ignored.

use crate::c14n::C14nOptions;
use crate::credentials::{Credential, CredentialCriteria, TrustAnchorResolver};
use crate::error::{SamlError, SamlResult};
use crate::saml::algorithms::{DigestAlgorithm, SignatureAlgorithm};
use crate::saml::constants::{transform_algorithms, XMLDSIG_NS};
use crate::saml::DecryptedAssertion;
use crate::xml::{XmlElement, XmlError};
use base64::{engine::general_purpose::STANDARD, Engine};
use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use openssl::hash::hash;
use openssl::pkey::Id;
use openssl::sign::Verifier;
use std::sync::Arc;
use thiserror::Error;

/// Detailed signature failure, for logs only
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Signature profile violation: {0}")]
    Profile(String),

    #[error(transparent)]
    Canonicalization(#[from] XmlError),

    #[error("Invalid base64 in {0}")]
    Encoding(&'static str),

    #[error("Reference digest does not match the assertion content")]
    DigestMismatch,

    #[error("Credential key type does not match signature algorithm {0}")]
    KeyMismatch(&'static str),

    #[error("Signature verification error: {0}")]
    Crypto(String),

    #[error("Signature value does not verify")]
    Invalid,
}

impl From<openssl::error::ErrorStack> for SignatureError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::Crypto(e.to_string())
    }
}

fn violation(message: impl Into<String>) -> SignatureError {
    SignatureError::Profile(message.into())
}

/// The parts of a profile-conformant signature needed for verification
#[derive(Debug, Clone)]
pub struct SignatureProfile<'a> {
    pub signature: &'a XmlElement,
    pub signed_info: &'a XmlElement,
    pub algorithm: SignatureAlgorithm,
    pub digest: DigestAlgorithm,
    pub digest_value: &'a str,
    pub signature_value: &'a str,
    /// Canonicalization of `SignedInfo`
    pub signed_info_c14n: C14nOptions,
    /// Canonicalization of the referenced assertion after the enveloped transform
    pub content_c14n: C14nOptions,
}

/// Structural checks from the SAML signature profile (SAML Core 5.4)
pub struct SignatureProfileValidator;

impl SignatureProfileValidator {
    /// Check that the assertion's signature has exactly the accepted shape.
    ///
    /// One enveloped signature, one reference to the assertion itself by a
    /// unique ID, and only the enveloped and exclusive C14N transforms.
    pub fn validate(assertion: &DecryptedAssertion) -> Result<SignatureProfile<'_>, SignatureError> {
        let root = assertion.root();

        let signature_count = root
            .descendants()
            .filter(|e| e.is(XMLDSIG_NS, "Signature"))
            .count();
        if signature_count != 1 {
            return Err(violation(format!(
                "expected exactly one ds:Signature, found {signature_count}"
            )));
        }
        let signature = root
            .child(XMLDSIG_NS, "Signature")
            .ok_or_else(|| violation("ds:Signature is not a child of the assertion"))?;

        let signed_info = exactly_one(signature, "SignedInfo")?;
        let signature_value = exactly_one(signature, "SignatureValue")?;
        if signature.child(XMLDSIG_NS, "Object").is_some() {
            return Err(violation("ds:Object is not allowed"));
        }

        let c14n = exactly_one(signed_info, "CanonicalizationMethod")?;
        if c14n.attribute("Algorithm") != Some(transform_algorithms::EXCLUSIVE_C14N) {
            return Err(violation(format!(
                "unsupported canonicalization method {:?}",
                c14n.attribute("Algorithm")
            )));
        }
        let signed_info_c14n = exclusive_options(c14n)?;

        let method = exactly_one(signed_info, "SignatureMethod")?;
        let method_uri = method.attribute("Algorithm").unwrap_or_default();
        let algorithm = SignatureAlgorithm::from_uri(method_uri)
            .filter(|a| !a.is_deprecated())
            .ok_or_else(|| violation(format!("unsupported signature method {method_uri}")))?;

        let reference = exactly_one(signed_info, "Reference")?;
        Self::validate_reference_target(assertion, reference)?;
        let content_c14n = Self::validate_transforms(reference)?;

        let digest_method = exactly_one(reference, "DigestMethod")?;
        let digest_uri = digest_method.attribute("Algorithm").unwrap_or_default();
        let digest = DigestAlgorithm::from_uri(digest_uri)
            .filter(DigestAlgorithm::is_acceptable_for_signatures)
            .ok_or_else(|| violation(format!("unsupported digest method {digest_uri}")))?;
        let digest_value = exactly_one(reference, "DigestValue")?;

        Ok(SignatureProfile {
            signature,
            signed_info,
            algorithm,
            digest,
            digest_value: digest_value.text_content(),
            signature_value: signature_value.text_content(),
            signed_info_c14n,
            content_c14n,
        })
    }

    fn validate_reference_target(
        assertion: &DecryptedAssertion,
        reference: &XmlElement,
    ) -> Result<(), SignatureError> {
        if assertion.id.is_empty() {
            return Err(violation("assertion has an empty ID"));
        }

        let expected = format!("#{}", assertion.id);
        match reference.attribute("URI") {
            Some(uri) if uri == expected => {}
            other => {
                return Err(violation(format!(
                    "reference URI {other:?} does not point at assertion {}",
                    assertion.id
                )))
            }
        }

        // SECURITY: a duplicated ID lets a wrapped element satisfy the reference.
        let holders = assertion.document().count_id(&assertion.id);
        if holders != 1 {
            return Err(violation(format!(
                "assertion ID {} is held by {holders} elements",
                assertion.id
            )));
        }
        Ok(())
    }

    /// Enveloped-signature, optionally followed by exclusive C14N.
    ///
    /// Without an explicit canonicalization transform the node set is
    /// serialized with inclusive C14N.
    fn validate_transforms(reference: &XmlElement) -> Result<C14nOptions, SignatureError> {
        let transforms = exactly_one(reference, "Transforms")?;

        let mut enveloped = 0;
        let mut exclusive = None;
        for transform in &transforms.children {
            if !transform.is(XMLDSIG_NS, "Transform") {
                return Err(violation(format!(
                    "unexpected element {} in ds:Transforms",
                    transform.qualified_name()
                )));
            }
            match transform.attribute("Algorithm") {
                Some(transform_algorithms::ENVELOPED_SIGNATURE)
                    if transform.children.is_empty() && exclusive.is_none() =>
                {
                    enveloped += 1;
                }
                Some(transform_algorithms::EXCLUSIVE_C14N) if exclusive.is_none() => {
                    exclusive = Some(exclusive_options(transform)?);
                }
                other => return Err(violation(format!("transform {other:?} is not allowed"))),
            }
        }

        if enveloped != 1 {
            return Err(violation(
                "transforms must be enveloped-signature, optionally followed by exclusive C14N",
            ));
        }
        Ok(exclusive.unwrap_or_else(C14nOptions::inclusive))
    }
}

/// Exclusive C14N options from an algorithm element and its optional
/// `InclusiveNamespaces` child.
fn exclusive_options(method: &XmlElement) -> Result<C14nOptions, SignatureError> {
    let mut options = C14nOptions::exclusive();
    match method.children.as_slice() {
        [] => {}
        [inclusive] if inclusive.is(transform_algorithms::EXCLUSIVE_C14N, "InclusiveNamespaces") => {
            options = options.with_prefix_list(inclusive.attribute("PrefixList").unwrap_or_default());
        }
        _ => {
            return Err(violation(format!(
                "unexpected content in {}",
                method.qualified_name()
            )))
        }
    }
    Ok(options)
}

fn exactly_one<'a>(
    parent: &'a XmlElement,
    local_name: &'static str,
) -> Result<&'a XmlElement, SignatureError> {
    let mut matches = parent.children_named(XMLDSIG_NS, local_name);
    match (matches.next(), matches.next()) {
        (Some(element), None) => Ok(element),
        (None, _) => Err(violation(format!("missing ds:{local_name}"))),
        (Some(_), Some(_)) => Err(violation(format!("more than one ds:{local_name}"))),
    }
}

/// Verifies assertion signatures against trusted identity provider keys
#[derive(Clone)]
pub struct SignatureValidator {
    resolver: Arc<dyn TrustAnchorResolver>,
}

impl std::fmt::Debug for SignatureValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureValidator").finish_non_exhaustive()
    }
}

impl SignatureValidator {
    pub fn new(resolver: Arc<dyn TrustAnchorResolver>) -> Self {
        Self { resolver }
    }

    /// Verify the enveloped signature of a decrypted assertion.
    pub fn validate(&self, assertion: &DecryptedAssertion) -> SamlResult<()> {
        if assertion.signature().is_none() {
            tracing::warn!(assertion_id = %assertion.id, "SAML assertion is not signed");
            return Err(SamlError::UnsignedAssertion);
        }

        let profile = SignatureProfileValidator::validate(assertion).map_err(|e| {
            tracing::warn!(
                assertion_id = %assertion.id,
                error = %e,
                "SAML assertion signature does not follow the signature profile"
            );
            SamlError::SignatureProfileViolation
        })?;

        let credential = self.resolve_credential(&assertion.issuer)?;

        verify_signature(assertion, &profile, &credential).map_err(|e| {
            tracing::warn!(
                assertion_id = %assertion.id,
                issuer = %assertion.issuer,
                error = %e,
                "SAML assertion signature verification failed"
            );
            SamlError::SignatureInvalid
        })?;

        tracing::info!(
            assertion_id = %assertion.id,
            issuer = %assertion.issuer,
            algorithm = profile.algorithm.uri(),
            "SAML Assertion signature verified"
        );
        Ok(())
    }

    /// Exactly one trusted signing credential must exist for the issuer.
    fn resolve_credential(&self, issuer: &str) -> SamlResult<Arc<Credential>> {
        let criteria = CredentialCriteria::idp_signing(issuer);
        let mut credentials = self.resolver.resolve(&criteria).map_err(|e| {
            tracing::error!(issuer = %issuer, error = %e, "Trust anchor lookup failed");
            SamlError::UntrustedIssuer(issuer.to_string())
        })?;

        if credentials.len() != 1 {
            tracing::warn!(
                issuer = %issuer,
                credentials = credentials.len(),
                "Expected exactly one trusted signing credential"
            );
            return Err(SamlError::UntrustedIssuer(issuer.to_string()));
        }
        credentials
            .pop()
            .ok_or_else(|| SamlError::UntrustedIssuer(issuer.to_string()))
    }
}

/// Check the reference digest, then the signature over `SignedInfo`.
pub fn verify_signature(
    assertion: &DecryptedAssertion,
    profile: &SignatureProfile<'_>,
    credential: &Credential,
) -> Result<(), SignatureError> {
    let document = assertion.document();

    let signed_content = document.canonicalize_element(
        assertion.root(),
        Some(profile.signature),
        &profile.content_c14n,
    )?;
    let computed = hash(profile.digest.message_digest(), signed_content.as_bytes())?;
    let expected = decode_base64(profile.digest_value, "DigestValue")?;
    if computed.len() != expected.len() || !openssl::memcmp::eq(&computed, &expected) {
        return Err(SignatureError::DigestMismatch);
    }

    let signed_info =
        document.canonicalize_element(profile.signed_info, None, &profile.signed_info_c14n)?;
    let signature = decode_base64(profile.signature_value, "SignatureValue")?;

    let public_key = credential.public_key();
    let signature = if profile.algorithm.is_ecdsa() {
        if public_key.id() != Id::EC {
            return Err(SignatureError::KeyMismatch(profile.algorithm.uri()));
        }
        ecdsa_raw_to_der(&signature)?
    } else {
        if public_key.id() != Id::RSA {
            return Err(SignatureError::KeyMismatch(profile.algorithm.uri()));
        }
        signature
    };

    let mut verifier = Verifier::new(profile.algorithm.message_digest(), public_key)?;
    verifier.update(signed_info.as_bytes())?;
    if verifier.verify(&signature)? {
        Ok(())
    } else {
        Err(SignatureError::Invalid)
    }
}

fn decode_base64(value: &str, field: &'static str) -> Result<Vec<u8>, SignatureError> {
    let compact: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|_| SignatureError::Encoding(field))
}

/// XML-DSig carries ECDSA signatures as `r || s`; OpenSSL expects DER.
fn ecdsa_raw_to_der(raw: &[u8]) -> Result<Vec<u8>, SignatureError> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(SignatureError::Invalid);
    }
    let (r, s) = raw.split_at(raw.len() / 2);
    let sig = EcdsaSig::from_private_components(BigNum::from_slice(r)?, BigNum::from_slice(s)?)?;
    Ok(sig.to_der()?)
}
