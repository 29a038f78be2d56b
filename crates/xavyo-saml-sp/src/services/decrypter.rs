//! XML Encryption of SAML assertions: key unwrap and payload decryption
//!
//! Every failure is reported to callers as the single
//! [`SamlError::DecryptionFailed`]. The precise [`DecryptionError`] is
//! logged and never leaves this module.

use crate::credentials::DecryptionCredential;
use crate::error::{SamlError, SamlResult};
use crate::saml::algorithms::{BlockCipherAlgorithm, DigestAlgorithm, KeyTransportAlgorithm};
use crate::saml::constants::encryption_algorithms;
use crate::saml::{
    AssertionParseError, CipherData, DecryptedAssertion, EncryptedAssertion, EncryptedKey,
    EncryptionMethod,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use openssl::encrypt::Decrypter;
use openssl::rsa::Padding;
use openssl::symm::{decrypt_aead, Crypter, Mode};
use std::sync::Arc;
use thiserror::Error;

/// GCM authentication tag length in bytes
const GCM_TAG_LEN: usize = 16;

/// AES block size in bytes
const AES_BLOCK_LEN: usize = 16;

/// Detailed decryption failure, for logs only
#[derive(Debug, Error)]
pub enum DecryptionError {
    #[error("EncryptedData has no EncryptionMethod")]
    MissingDataAlgorithm,

    #[error("EncryptedKey has no EncryptionMethod")]
    MissingKeyAlgorithm,

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Refused key transport algorithm: {0}")]
    RefusedAlgorithm(String),

    #[error("Unsupported EncryptedData type: {0}")]
    UnsupportedType(String),

    #[error("No EncryptedKey available for the assertion")]
    NoEncryptedKey,

    #[error("CipherReference is not supported: {0}")]
    CipherReference(String),

    #[error("Invalid base64 in {field}: {message}")]
    Base64 { field: &'static str, message: String },

    #[error("Key unwrap failed: {0}")]
    KeyUnwrap(String),

    #[error("Unwrapped key has {actual} bytes, algorithm requires {expected}")]
    KeyLength { expected: usize, actual: usize },

    #[error("Ciphertext is too short or misaligned ({0} bytes)")]
    CiphertextLength(usize),

    #[error("Payload decryption failed: {0}")]
    Payload(String),

    #[error("Invalid block cipher padding")]
    Padding,

    #[error("Decrypted assertion is not UTF-8")]
    Utf8,

    #[error("Decrypted content is not a valid assertion: {0}")]
    Assertion(#[from] AssertionParseError),
}

/// Decrypts `EncryptedAssertion`s addressed to this service provider
#[derive(Debug, Clone)]
pub struct AssertionDecrypter {
    credential: Arc<DecryptionCredential>,
}

impl AssertionDecrypter {
    pub fn new(credential: Arc<DecryptionCredential>) -> Self {
        Self { credential }
    }

    /// Decrypt and parse an assertion, hiding the failure cause.
    pub fn decrypt(&self, encrypted: &EncryptedAssertion) -> SamlResult<DecryptedAssertion> {
        self.try_decrypt(encrypted).map_err(|e| {
            tracing::warn!(error = %e, "SAML assertion decryption failed");
            SamlError::DecryptionFailed
        })
    }

    /// Decrypt and parse an assertion, returning the detailed cause on failure.
    pub fn try_decrypt(
        &self,
        encrypted: &EncryptedAssertion,
    ) -> Result<DecryptedAssertion, DecryptionError> {
        let data = &encrypted.encrypted_data;

        if let Some(type_uri) = &data.type_uri {
            if type_uri != encryption_algorithms::TYPE_ELEMENT {
                return Err(DecryptionError::UnsupportedType(type_uri.clone()));
            }
        }

        let method = data
            .method
            .as_ref()
            .ok_or(DecryptionError::MissingDataAlgorithm)?;
        let algorithm = BlockCipherAlgorithm::from_uri(&method.algorithm)
            .ok_or_else(|| DecryptionError::UnsupportedAlgorithm(method.algorithm.clone()))?;

        let key = self.resolve_key(encrypted, algorithm)?;
        let ciphertext = decode_cipher_data(&data.cipher, "EncryptedData")?;
        let plaintext = decrypt_payload(algorithm, &key, &ciphertext)?;

        let xml = String::from_utf8(plaintext).map_err(|_| DecryptionError::Utf8)?;
        let assertion = DecryptedAssertion::parse(&xml)?;

        tracing::debug!(
            assertion_id = %assertion.id,
            algorithm = algorithm.uri(),
            "SAML assertion decrypted"
        );

        Ok(assertion)
    }

    /// Try candidate keys in resolution order until one unwraps.
    ///
    /// Order: `EncryptedKey` inline in `KeyInfo`, keys named by a
    /// `RetrievalMethod`, then the remaining `EncryptedKey` siblings.
    fn resolve_key(
        &self,
        encrypted: &EncryptedAssertion,
        algorithm: BlockCipherAlgorithm,
    ) -> Result<Vec<u8>, DecryptionError> {
        let data = &encrypted.encrypted_data;

        let mut candidates: Vec<&EncryptedKey> = data.inline_keys.iter().collect();
        for reference in &data.key_references {
            let Some(id) = reference.strip_prefix('#') else {
                continue;
            };
            candidates.extend(
                encrypted
                    .encrypted_keys
                    .iter()
                    .filter(|k| k.id.as_deref() == Some(id)),
            );
        }
        for key in &encrypted.encrypted_keys {
            if !candidates.iter().any(|c| std::ptr::eq(*c, key)) {
                candidates.push(key);
            }
        }

        let mut last_error = DecryptionError::NoEncryptedKey;
        for candidate in candidates {
            match self.unwrap_key(candidate, algorithm) {
                Ok(key) => return Ok(key),
                Err(e) => {
                    tracing::debug!(
                        key_id = ?candidate.id,
                        error = %e,
                        "EncryptedKey candidate rejected"
                    );
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    fn unwrap_key(
        &self,
        encrypted_key: &EncryptedKey,
        algorithm: BlockCipherAlgorithm,
    ) -> Result<Vec<u8>, DecryptionError> {
        let method = encrypted_key
            .method
            .as_ref()
            .ok_or(DecryptionError::MissingKeyAlgorithm)?;
        let transport = KeyTransportAlgorithm::from_uri(&method.algorithm)
            .ok_or_else(|| DecryptionError::UnsupportedAlgorithm(method.algorithm.clone()))?;

        // SECURITY: PKCS#1 v1.5 key transport is open to padding oracle attacks.
        if transport == KeyTransportAlgorithm::Rsa15 {
            return Err(DecryptionError::RefusedAlgorithm(method.algorithm.clone()));
        }

        let (oaep_digest, mgf_digest) = oaep_parameters(transport, method)?;
        let wrapped = decode_cipher_data(&encrypted_key.cipher, "EncryptedKey")?;

        let unwrap_err = |e: openssl::error::ErrorStack| DecryptionError::KeyUnwrap(e.to_string());
        let mut decrypter = Decrypter::new(self.credential.private_key()).map_err(unwrap_err)?;
        decrypter
            .set_rsa_padding(Padding::PKCS1_OAEP)
            .map_err(unwrap_err)?;
        decrypter
            .set_rsa_oaep_md(oaep_digest.message_digest())
            .map_err(unwrap_err)?;
        decrypter
            .set_rsa_mgf1_md(mgf_digest.message_digest())
            .map_err(unwrap_err)?;
        if let Some(params) = &method.oaep_params {
            let label = decode_base64(params, "OAEPparams")?;
            if !label.is_empty() {
                decrypter.set_rsa_oaep_label(&label).map_err(unwrap_err)?;
            }
        }

        let buffer_len = decrypter.decrypt_len(&wrapped).map_err(unwrap_err)?;
        let mut key = vec![0u8; buffer_len];
        let key_len = decrypter.decrypt(&wrapped, &mut key).map_err(unwrap_err)?;
        key.truncate(key_len);

        if key.len() != algorithm.key_len() {
            return Err(DecryptionError::KeyLength {
                expected: algorithm.key_len(),
                actual: key.len(),
            });
        }
        Ok(key)
    }
}

/// OAEP digest and MGF1 digest. Both default to SHA-1.
fn oaep_parameters(
    transport: KeyTransportAlgorithm,
    method: &EncryptionMethod,
) -> Result<(DigestAlgorithm, DigestAlgorithm), DecryptionError> {
    let digest = match &method.digest_method {
        Some(uri) => DigestAlgorithm::from_uri(uri)
            .ok_or_else(|| DecryptionError::UnsupportedAlgorithm(uri.clone()))?,
        None => DigestAlgorithm::Sha1,
    };

    let mgf = match (transport, &method.mgf) {
        (KeyTransportAlgorithm::RsaOaep, Some(uri)) => DigestAlgorithm::from_mgf_uri(uri)
            .ok_or_else(|| DecryptionError::UnsupportedAlgorithm(uri.clone()))?,
        _ => DigestAlgorithm::Sha1,
    };

    Ok((digest, mgf))
}

fn decode_cipher_data(cipher: &CipherData, field: &'static str) -> Result<Vec<u8>, DecryptionError> {
    match cipher {
        CipherData::Value(value) => decode_base64(value, field),
        CipherData::Reference(uri) => Err(DecryptionError::CipherReference(uri.clone())),
    }
}

fn decode_base64(value: &str, field: &'static str) -> Result<Vec<u8>, DecryptionError> {
    let compact: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| DecryptionError::Base64 {
            field,
            message: e.to_string(),
        })
}

fn decrypt_payload(
    algorithm: BlockCipherAlgorithm,
    key: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, DecryptionError> {
    let iv_len = algorithm.iv_len();

    if algorithm.is_gcm() {
        if data.len() < iv_len + GCM_TAG_LEN {
            return Err(DecryptionError::CiphertextLength(data.len()));
        }
        let (iv, rest) = data.split_at(iv_len);
        let (ciphertext, tag) = rest.split_at(rest.len() - GCM_TAG_LEN);
        return decrypt_aead(algorithm.cipher(), key, Some(iv), &[], ciphertext, tag)
            .map_err(|e| DecryptionError::Payload(e.to_string()));
    }

    if data.len() < iv_len + AES_BLOCK_LEN || (data.len() - iv_len) % AES_BLOCK_LEN != 0 {
        return Err(DecryptionError::CiphertextLength(data.len()));
    }
    let (iv, ciphertext) = data.split_at(iv_len);

    let payload_err = |e: openssl::error::ErrorStack| DecryptionError::Payload(e.to_string());
    let mut crypter =
        Crypter::new(algorithm.cipher(), Mode::Decrypt, key, Some(iv)).map_err(payload_err)?;
    crypter.pad(false);
    let mut plaintext = vec![0u8; ciphertext.len() + AES_BLOCK_LEN];
    let mut count = crypter.update(ciphertext, &mut plaintext).map_err(payload_err)?;
    count += crypter
        .finalize(&mut plaintext[count..])
        .map_err(payload_err)?;
    plaintext.truncate(count);

    // ISO 10126: only the final byte (the pad length) is meaningful.
    let pad = usize::from(*plaintext.last().ok_or(DecryptionError::Padding)?);
    if pad == 0 || pad > AES_BLOCK_LEN || pad > plaintext.len() {
        return Err(DecryptionError::Padding);
    }
    plaintext.truncate(plaintext.len() - pad);
    Ok(plaintext)
}
