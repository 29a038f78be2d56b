//! SAML protocol status.
//!
//! Status codes are a closed set of the URIs defined by SAML 2.0 Core, plus
//! an `Other` variant for anything else an identity provider may send.

use super::constants::status_codes;
use serde::Serialize;
use std::fmt;

/// A SAML 2.0 status code value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum StatusCode {
    // Top-level codes
    Success,
    Requester,
    Responder,
    VersionMismatch,

    // Second-level codes
    AuthnFailed,
    InvalidAttrNameOrValue,
    InvalidNameIdPolicy,
    NoAuthnContext,
    NoAvailableIdp,
    NoPassive,
    NoSupportedIdp,
    PartialLogout,
    ProxyCountExceeded,
    RequestDenied,
    RequestUnsupported,
    RequestVersionDeprecated,
    RequestVersionTooHigh,
    RequestVersionTooLow,
    ResourceNotRecognized,
    TooManyResponses,
    UnknownAttrProfile,
    UnknownPrincipal,
    UnsupportedBinding,

    /// Any URI not defined by SAML 2.0 Core
    Other(String),
}

impl StatusCode {
    /// Map a status URI to its variant. Never fails.
    #[must_use]
    pub fn from_uri(uri: &str) -> Self {
        match uri {
            status_codes::SUCCESS => Self::Success,
            status_codes::REQUESTER => Self::Requester,
            status_codes::RESPONDER => Self::Responder,
            status_codes::VERSION_MISMATCH => Self::VersionMismatch,
            status_codes::AUTHN_FAILED => Self::AuthnFailed,
            status_codes::INVALID_ATTR_NAME_OR_VALUE => Self::InvalidAttrNameOrValue,
            status_codes::INVALID_NAMEID_POLICY => Self::InvalidNameIdPolicy,
            status_codes::NO_AUTHN_CONTEXT => Self::NoAuthnContext,
            status_codes::NO_AVAILABLE_IDP => Self::NoAvailableIdp,
            status_codes::NO_PASSIVE => Self::NoPassive,
            status_codes::NO_SUPPORTED_IDP => Self::NoSupportedIdp,
            status_codes::PARTIAL_LOGOUT => Self::PartialLogout,
            status_codes::PROXY_COUNT_EXCEEDED => Self::ProxyCountExceeded,
            status_codes::REQUEST_DENIED => Self::RequestDenied,
            status_codes::REQUEST_UNSUPPORTED => Self::RequestUnsupported,
            status_codes::REQUEST_VERSION_DEPRECATED => Self::RequestVersionDeprecated,
            status_codes::REQUEST_VERSION_TOO_HIGH => Self::RequestVersionTooHigh,
            status_codes::REQUEST_VERSION_TOO_LOW => Self::RequestVersionTooLow,
            status_codes::RESOURCE_NOT_RECOGNIZED => Self::ResourceNotRecognized,
            status_codes::TOO_MANY_RESPONSES => Self::TooManyResponses,
            status_codes::UNKNOWN_ATTR_PROFILE => Self::UnknownAttrProfile,
            status_codes::UNKNOWN_PRINCIPAL => Self::UnknownPrincipal,
            status_codes::UNSUPPORTED_BINDING => Self::UnsupportedBinding,
            other => Self::Other(other.to_string()),
        }
    }

    /// The literal status URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        match self {
            Self::Success => status_codes::SUCCESS,
            Self::Requester => status_codes::REQUESTER,
            Self::Responder => status_codes::RESPONDER,
            Self::VersionMismatch => status_codes::VERSION_MISMATCH,
            Self::AuthnFailed => status_codes::AUTHN_FAILED,
            Self::InvalidAttrNameOrValue => status_codes::INVALID_ATTR_NAME_OR_VALUE,
            Self::InvalidNameIdPolicy => status_codes::INVALID_NAMEID_POLICY,
            Self::NoAuthnContext => status_codes::NO_AUTHN_CONTEXT,
            Self::NoAvailableIdp => status_codes::NO_AVAILABLE_IDP,
            Self::NoPassive => status_codes::NO_PASSIVE,
            Self::NoSupportedIdp => status_codes::NO_SUPPORTED_IDP,
            Self::PartialLogout => status_codes::PARTIAL_LOGOUT,
            Self::ProxyCountExceeded => status_codes::PROXY_COUNT_EXCEEDED,
            Self::RequestDenied => status_codes::REQUEST_DENIED,
            Self::RequestUnsupported => status_codes::REQUEST_UNSUPPORTED,
            Self::RequestVersionDeprecated => status_codes::REQUEST_VERSION_DEPRECATED,
            Self::RequestVersionTooHigh => status_codes::REQUEST_VERSION_TOO_HIGH,
            Self::RequestVersionTooLow => status_codes::REQUEST_VERSION_TOO_LOW,
            Self::ResourceNotRecognized => status_codes::RESOURCE_NOT_RECOGNIZED,
            Self::TooManyResponses => status_codes::TOO_MANY_RESPONSES,
            Self::UnknownAttrProfile => status_codes::UNKNOWN_ATTR_PROFILE,
            Self::UnknownPrincipal => status_codes::UNKNOWN_PRINCIPAL,
            Self::UnsupportedBinding => status_codes::UNSUPPORTED_BINDING,
            Self::Other(uri) => uri,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

impl From<StatusCode> for String {
    fn from(code: StatusCode) -> Self {
        code.uri().to_string()
    }
}

/// Status of a SAML response.
///
/// Only the first nested sub-code is retained; deeper nesting carries no
/// meaning for response processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_code: Option<StatusCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    /// A bare `Success` status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: StatusCode::Success,
            sub_code: None,
            message: None,
        }
    }

    /// True if the top-level code is `Success`, whatever the sub-code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }
}
