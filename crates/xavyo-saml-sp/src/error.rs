//! SAML response validation error types

use crate::services::assertion_validator::AssertionValidationError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type for SAML operations
pub type SamlResult<T> = Result<T, SamlError>;

/// Errors produced while turning an incoming SAML `Response` into an
/// [`AuthenticationResult`](crate::models::AuthenticationResult).
///
/// Decryption and signature failures deliberately carry no cause detail.
/// The precise reason is only written to the log.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Missing, undecodable or not well-formed response
    #[error("Malformed SAML response: {0}")]
    MalformedInput(String),

    /// Well-formed XML that does not satisfy the SAML protocol schema
    #[error("SAML response violates the protocol schema: {0}")]
    SchemaViolation(String),

    /// `IssueInstant` outside the accepted message lifetime window
    #[error("SAML response expired: issued at {issue_instant}, validated at {validated_at}")]
    ExpiredMessage {
        issue_instant: DateTime<Utc>,
        validated_at: DateTime<Utc>,
    },

    /// `Destination` does not match the configured callback URL
    #[error("SAML response destination mismatch: expected {expected}, got {actual:?}")]
    EndpointMismatch {
        expected: String,
        actual: Option<String>,
    },

    /// The user refused to authenticate (`Requester` / `RequestDenied`)
    #[error("Authentication was denied at the identity provider")]
    AuthenticationDenied,

    /// The identity provider could not authenticate the user (`Responder` / `AuthnFailed`)
    #[error("Authentication failed at the identity provider")]
    AuthenticationFailed,

    /// Any other non-success status returned by the identity provider
    #[error(
        "Identity provider returned status {status_code} \
         (sub-status: {sub_status_code:?}, message: {status_message:?})"
    )]
    ProtocolError {
        status_code: String,
        sub_status_code: Option<String>,
        status_message: Option<String>,
    },

    /// No `EncryptedAssertion` in the response
    #[error("SAML response contains no encrypted assertion")]
    MissingAssertion,

    /// More than one `EncryptedAssertion` in the response
    #[error("SAML response contains {0} encrypted assertions, expected exactly one")]
    AmbiguousAssertion(usize),

    /// The assertion could not be decrypted
    #[error("Failed to decrypt SAML assertion")]
    DecryptionFailed,

    /// The decrypted assertion carries no signature
    #[error("SAML assertion is not signed")]
    UnsignedAssertion,

    /// The signature does not follow the SAML signature profile
    #[error("SAML assertion signature does not conform to the SAML signature profile")]
    SignatureProfileViolation,

    /// No single trusted credential exists for the assertion issuer
    #[error("No trusted signing credential for issuer: {0}")]
    UntrustedIssuer(String),

    /// Cryptographic signature verification failed
    #[error("SAML assertion signature is invalid")]
    SignatureInvalid,

    /// Rejected by the assertion validator after signature verification
    #[error("SAML assertion rejected: {0}")]
    AssertionValidation(#[from] AssertionValidationError),
}

/// Fieldless discriminant of [`SamlError`], convenient for matching in callers
/// and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedInput,
    SchemaViolation,
    ExpiredMessage,
    EndpointMismatch,
    AuthenticationDenied,
    AuthenticationFailed,
    ProtocolError,
    MissingAssertion,
    AmbiguousAssertion,
    DecryptionFailed,
    UnsignedAssertion,
    SignatureProfileViolation,
    UntrustedIssuer,
    SignatureInvalid,
    AssertionValidation,
}

/// How a failure should be surfaced by the calling application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorVisibility {
    /// The request itself was bad; report as an invalid request.
    ClientError,
    /// A normal outcome the end user should be told about.
    UserFacing,
    /// Unexpected behaviour of the identity provider.
    SystemAnomaly,
    /// Possible tampering or misconfiguration of trust; alert-worthy.
    SecurityAnomaly,
}

impl SamlError {
    /// Returns the fieldless kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedInput(_) => ErrorKind::MalformedInput,
            Self::SchemaViolation(_) => ErrorKind::SchemaViolation,
            Self::ExpiredMessage { .. } => ErrorKind::ExpiredMessage,
            Self::EndpointMismatch { .. } => ErrorKind::EndpointMismatch,
            Self::AuthenticationDenied => ErrorKind::AuthenticationDenied,
            Self::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            Self::ProtocolError { .. } => ErrorKind::ProtocolError,
            Self::MissingAssertion => ErrorKind::MissingAssertion,
            Self::AmbiguousAssertion(_) => ErrorKind::AmbiguousAssertion,
            Self::DecryptionFailed => ErrorKind::DecryptionFailed,
            Self::UnsignedAssertion => ErrorKind::UnsignedAssertion,
            Self::SignatureProfileViolation => ErrorKind::SignatureProfileViolation,
            Self::UntrustedIssuer(_) => ErrorKind::UntrustedIssuer,
            Self::SignatureInvalid => ErrorKind::SignatureInvalid,
            Self::AssertionValidation(_) => ErrorKind::AssertionValidation,
        }
    }

    /// Classifies the error for the calling application.
    #[must_use]
    pub fn visibility(&self) -> ErrorVisibility {
        match self {
            Self::MalformedInput(_)
            | Self::SchemaViolation(_)
            | Self::ExpiredMessage { .. }
            | Self::EndpointMismatch { .. }
            | Self::MissingAssertion
            | Self::AmbiguousAssertion(_)
            | Self::AssertionValidation(_) => ErrorVisibility::ClientError,
            Self::AuthenticationDenied | Self::AuthenticationFailed => ErrorVisibility::UserFacing,
            Self::ProtocolError { .. } => ErrorVisibility::SystemAnomaly,
            Self::DecryptionFailed
            | Self::UnsignedAssertion
            | Self::SignatureProfileViolation
            | Self::UntrustedIssuer(_)
            | Self::SignatureInvalid => ErrorVisibility::SecurityAnomaly,
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed_response",
            Self::SchemaViolation(_) => "schema_violation",
            Self::ExpiredMessage { .. } => "response_expired",
            Self::EndpointMismatch { .. } => "destination_mismatch",
            Self::AuthenticationDenied => "authentication_denied",
            Self::AuthenticationFailed => "authentication_failed",
            Self::ProtocolError { .. } => "idp_protocol_error",
            Self::MissingAssertion => "missing_assertion",
            Self::AmbiguousAssertion(_) => "ambiguous_assertion",
            Self::DecryptionFailed => "decryption_failed",
            Self::UnsignedAssertion => "unsigned_assertion",
            Self::SignatureProfileViolation => "signature_profile_violation",
            Self::UntrustedIssuer(_) => "untrusted_issuer",
            Self::SignatureInvalid => "invalid_signature",
            Self::AssertionValidation(_) => "assertion_rejected",
        }
    }

    /// Message that is safe to show to the end user or return to a client.
    ///
    /// Never contains attacker-controlled values or internal detail.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::MalformedInput(_) | Self::SchemaViolation(_) => {
                "Invalid SAML response".to_string()
            }
            Self::ExpiredMessage { .. } => "SAML response has expired".to_string(),
            Self::EndpointMismatch { .. } => {
                "SAML response was not addressed to this service".to_string()
            }
            Self::AuthenticationDenied => "Authentication was cancelled".to_string(),
            Self::AuthenticationFailed => "Authentication failed".to_string(),
            Self::ProtocolError { .. } => {
                "The identity provider returned an unexpected status".to_string()
            }
            Self::MissingAssertion | Self::AmbiguousAssertion(_) => {
                "SAML response does not contain a usable assertion".to_string()
            }
            Self::DecryptionFailed
            | Self::UnsignedAssertion
            | Self::SignatureProfileViolation
            | Self::UntrustedIssuer(_)
            | Self::SignatureInvalid => "SAML response could not be verified".to_string(),
            Self::AssertionValidation(_) => "SAML assertion is not acceptable".to_string(),
        }
    }
}
