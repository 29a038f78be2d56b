//! Signature, digest and encryption algorithm identifiers.

use super::constants::{digest_algorithms, encryption_algorithms, signature_algorithms};
use openssl::hash::MessageDigest;
use openssl::symm::Cipher;

/// XML-DSig signature method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaSha256,
    RsaSha384,
    RsaSha512,
    EcdsaSha256,
    EcdsaSha384,
    EcdsaSha512,
    /// Legacy, refused by the signature profile.
    RsaSha1,
    /// Legacy, refused by the signature profile.
    EcdsaSha1,
}

impl SignatureAlgorithm {
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha256 => signature_algorithms::RSA_SHA256,
            Self::RsaSha384 => signature_algorithms::RSA_SHA384,
            Self::RsaSha512 => signature_algorithms::RSA_SHA512,
            Self::EcdsaSha256 => signature_algorithms::ECDSA_SHA256,
            Self::EcdsaSha384 => signature_algorithms::ECDSA_SHA384,
            Self::EcdsaSha512 => signature_algorithms::ECDSA_SHA512,
            Self::RsaSha1 => signature_algorithms::RSA_SHA1,
            Self::EcdsaSha1 => signature_algorithms::ECDSA_SHA1,
        }
    }

    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            signature_algorithms::RSA_SHA256 => Some(Self::RsaSha256),
            signature_algorithms::RSA_SHA384 => Some(Self::RsaSha384),
            signature_algorithms::RSA_SHA512 => Some(Self::RsaSha512),
            signature_algorithms::ECDSA_SHA256 => Some(Self::EcdsaSha256),
            signature_algorithms::ECDSA_SHA384 => Some(Self::EcdsaSha384),
            signature_algorithms::ECDSA_SHA512 => Some(Self::EcdsaSha512),
            signature_algorithms::RSA_SHA1 => Some(Self::RsaSha1),
            signature_algorithms::ECDSA_SHA1 => Some(Self::EcdsaSha1),
            _ => None,
        }
    }

    /// Hash function used by the signature.
    #[must_use]
    pub fn message_digest(&self) -> MessageDigest {
        match self {
            Self::RsaSha256 | Self::EcdsaSha256 => MessageDigest::sha256(),
            Self::RsaSha384 | Self::EcdsaSha384 => MessageDigest::sha384(),
            Self::RsaSha512 | Self::EcdsaSha512 => MessageDigest::sha512(),
            Self::RsaSha1 | Self::EcdsaSha1 => MessageDigest::sha1(),
        }
    }

    #[must_use]
    pub const fn is_ecdsa(&self) -> bool {
        matches!(
            self,
            Self::EcdsaSha256 | Self::EcdsaSha384 | Self::EcdsaSha512 | Self::EcdsaSha1
        )
    }

    /// True for SHA-1 based algorithms.
    #[must_use]
    pub const fn is_deprecated(&self) -> bool {
        matches!(self, Self::RsaSha1 | Self::EcdsaSha1)
    }
}

/// XML-DSig / XML-Enc digest method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Sha1 => digest_algorithms::SHA1,
            Self::Sha224 => digest_algorithms::SHA224,
            Self::Sha256 => digest_algorithms::SHA256,
            Self::Sha384 => digest_algorithms::SHA384,
            Self::Sha512 => digest_algorithms::SHA512,
        }
    }

    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            digest_algorithms::SHA1 => Some(Self::Sha1),
            digest_algorithms::SHA224 => Some(Self::Sha224),
            digest_algorithms::SHA256 => Some(Self::Sha256),
            digest_algorithms::SHA384 => Some(Self::Sha384),
            digest_algorithms::SHA512 => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Digest named by an XML-Enc 1.1 `MGF` algorithm URI.
    #[must_use]
    pub fn from_mgf_uri(uri: &str) -> Option<Self> {
        match uri {
            encryption_algorithms::MGF1_SHA1 => Some(Self::Sha1),
            encryption_algorithms::MGF1_SHA224 => Some(Self::Sha224),
            encryption_algorithms::MGF1_SHA256 => Some(Self::Sha256),
            encryption_algorithms::MGF1_SHA384 => Some(Self::Sha384),
            encryption_algorithms::MGF1_SHA512 => Some(Self::Sha512),
            _ => None,
        }
    }

    #[must_use]
    pub fn message_digest(&self) -> MessageDigest {
        match self {
            Self::Sha1 => MessageDigest::sha1(),
            Self::Sha224 => MessageDigest::sha224(),
            Self::Sha256 => MessageDigest::sha256(),
            Self::Sha384 => MessageDigest::sha384(),
            Self::Sha512 => MessageDigest::sha512(),
        }
    }

    /// SHA-1 and SHA-224 are not accepted for reference digests.
    #[must_use]
    pub const fn is_acceptable_for_signatures(&self) -> bool {
        matches!(self, Self::Sha256 | Self::Sha384 | Self::Sha512)
    }
}

/// Key transport (key wrapping) algorithm for the assertion key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransportAlgorithm {
    /// RSA-OAEP with MGF1/SHA-1 (`xmlenc#rsa-oaep-mgf1p`)
    RsaOaepMgf1p,
    /// RSA-OAEP with configurable MGF (`xmlenc11#rsa-oaep`)
    RsaOaep,
    /// PKCS#1 v1.5, refused
    Rsa15,
}

impl KeyTransportAlgorithm {
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            encryption_algorithms::RSA_OAEP_MGF1P => Some(Self::RsaOaepMgf1p),
            encryption_algorithms::RSA_OAEP => Some(Self::RsaOaep),
            encryption_algorithms::RSA_1_5 => Some(Self::Rsa15),
            _ => None,
        }
    }
}

/// Block cipher for the encrypted assertion payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCipherAlgorithm {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes192Gcm,
    Aes256Gcm,
}

impl BlockCipherAlgorithm {
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Aes128Cbc => encryption_algorithms::AES128_CBC,
            Self::Aes192Cbc => encryption_algorithms::AES192_CBC,
            Self::Aes256Cbc => encryption_algorithms::AES256_CBC,
            Self::Aes128Gcm => encryption_algorithms::AES128_GCM,
            Self::Aes192Gcm => encryption_algorithms::AES192_GCM,
            Self::Aes256Gcm => encryption_algorithms::AES256_GCM,
        }
    }

    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            encryption_algorithms::AES128_CBC => Some(Self::Aes128Cbc),
            encryption_algorithms::AES192_CBC => Some(Self::Aes192Cbc),
            encryption_algorithms::AES256_CBC => Some(Self::Aes256Cbc),
            encryption_algorithms::AES128_GCM => Some(Self::Aes128Gcm),
            encryption_algorithms::AES192_GCM => Some(Self::Aes192Gcm),
            encryption_algorithms::AES256_GCM => Some(Self::Aes256Gcm),
            _ => None,
        }
    }

    #[must_use]
    pub fn cipher(&self) -> Cipher {
        match self {
            Self::Aes128Cbc => Cipher::aes_128_cbc(),
            Self::Aes192Cbc => Cipher::aes_192_cbc(),
            Self::Aes256Cbc => Cipher::aes_256_cbc(),
            Self::Aes128Gcm => Cipher::aes_128_gcm(),
            Self::Aes192Gcm => Cipher::aes_192_gcm(),
            Self::Aes256Gcm => Cipher::aes_256_gcm(),
        }
    }

    /// Key length in bytes.
    #[must_use]
    pub const fn key_len(&self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes128Gcm => 16,
            Self::Aes192Cbc | Self::Aes192Gcm => 24,
            Self::Aes256Cbc | Self::Aes256Gcm => 32,
        }
    }

    /// IV length in bytes as prepended to the cipher value.
    #[must_use]
    pub const fn iv_len(&self) -> usize {
        if self.is_gcm() {
            12
        } else {
            16
        }
    }

    #[must_use]
    pub const fn is_gcm(&self) -> bool {
        matches!(self, Self::Aes128Gcm | Self::Aes192Gcm | Self::Aes256Gcm)
    }
}
