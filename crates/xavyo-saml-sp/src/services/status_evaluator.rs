//! Interpretation of the SAML response status

use crate::error::{SamlError, SamlResult};
use crate::saml::{Status, StatusCode};

/// Maps a response status to "proceed" or a typed failure
pub struct StatusEvaluator;

impl StatusEvaluator {
    /// `Success` proceeds regardless of any sub-code. The two user-driven
    /// outcomes get their own errors; every other status is a protocol error.
    pub fn evaluate(status: &Status) -> SamlResult<()> {
        match (&status.code, status.sub_code.as_ref()) {
            (StatusCode::Success, _) => Ok(()),
            (StatusCode::Requester, Some(StatusCode::RequestDenied)) => {
                tracing::info!("SAML authentication denied by the user");
                Err(SamlError::AuthenticationDenied)
            }
            (StatusCode::Responder, Some(StatusCode::AuthnFailed)) => {
                tracing::info!("SAML authentication failed at the identity provider");
                Err(SamlError::AuthenticationFailed)
            }
            (code, sub_code) => {
                tracing::warn!(
                    status_code = %code,
                    sub_status_code = ?sub_code.map(StatusCode::uri),
                    status_message = ?status.message,
                    "Identity provider returned an unexpected SAML status"
                );
                Err(SamlError::ProtocolError {
                    status_code: code.uri().to_string(),
                    sub_status_code: sub_code.map(|c| c.uri().to_string()),
                    status_message: status.message.clone(),
                })
            }
        }
    }
}
