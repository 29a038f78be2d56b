//! Business-rule validation of a verified assertion

use crate::config::SpConfig;
use crate::saml::constants::BEARER_CONFIRMATION;
use crate::saml::{DecryptedAssertion, SubjectConfirmation};
use crate::session::{RequestSessionStore, SessionError};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Why an assertion was rejected after its signature was verified
#[derive(Debug, Error)]
pub enum AssertionValidationError {
    #[error("Unexpected issuer: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },

    #[error("Assertion is not valid before {0}")]
    NotYetValid(DateTime<Utc>),

    #[error("Assertion expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("Assertion is not intended for audience {0}")]
    AudienceMismatch(String),

    #[error("No valid bearer subject confirmation for recipient {0}")]
    NoBearerConfirmation(String),

    #[error("Assertion has no AuthnStatement")]
    MissingAuthnStatement,

    #[error("Authentication at {0} is older than the accepted lifetime")]
    AuthenticationTooOld(DateTime<Utc>),

    #[error("Authentication instant {0} is in the future")]
    AuthenticationInFuture(DateTime<Utc>),

    #[error("Assertion does not answer a known AuthnRequest")]
    MissingInResponseTo,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{0}")]
    Rejected(String),
}

/// Called exactly once with an assertion whose signature has been verified
pub trait AssertionValidator: Send + Sync {
    fn validate(
        &self,
        assertion: &DecryptedAssertion,
        now: DateTime<Utc>,
    ) -> Result<(), AssertionValidationError>;
}

impl<F> AssertionValidator for F
where
    F: Fn(&DecryptedAssertion, DateTime<Utc>) -> Result<(), AssertionValidationError>
        + Send
        + Sync,
{
    fn validate(
        &self,
        assertion: &DecryptedAssertion,
        now: DateTime<Utc>,
    ) -> Result<(), AssertionValidationError> {
        self(assertion, now)
    }
}

/// Web browser SSO profile checks on issuer, conditions, subject
/// confirmation, authentication age and request correlation.
#[derive(Clone)]
pub struct DefaultAssertionValidator {
    sp_entity_id: String,
    callback_url: String,
    idp_entity_id: Option<String>,
    clock_skew: Duration,
    maximum_authentication_lifetime: Duration,
    sessions: Option<Arc<dyn RequestSessionStore>>,
}

impl std::fmt::Debug for DefaultAssertionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultAssertionValidator")
            .field("sp_entity_id", &self.sp_entity_id)
            .field("callback_url", &self.callback_url)
            .field("idp_entity_id", &self.idp_entity_id)
            .field("tracks_requests", &self.sessions.is_some())
            .finish()
    }
}

impl DefaultAssertionValidator {
    pub fn new(config: &SpConfig) -> Self {
        Self {
            sp_entity_id: config.sp_entity_id.clone(),
            callback_url: config.callback_url.clone(),
            idp_entity_id: config.idp_entity_id.clone(),
            clock_skew: config.clock_skew(),
            maximum_authentication_lifetime: config.maximum_authentication_lifetime(),
            sessions: None,
        }
    }

    /// Require `InResponseTo` to name a tracked `AuthnRequest`, consumed once.
    #[must_use]
    pub fn with_session_store(mut self, sessions: Arc<dyn RequestSessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    fn validate_issuer(&self, assertion: &DecryptedAssertion) -> Result<(), AssertionValidationError> {
        match &self.idp_entity_id {
            Some(expected) if *expected != assertion.issuer => {
                Err(AssertionValidationError::IssuerMismatch {
                    expected: expected.clone(),
                    actual: assertion.issuer.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn validate_conditions(
        &self,
        assertion: &DecryptedAssertion,
        now: DateTime<Utc>,
    ) -> Result<(), AssertionValidationError> {
        let audience_missing = || AssertionValidationError::AudienceMismatch(self.sp_entity_id.clone());
        let conditions = assertion.conditions.as_ref().ok_or_else(audience_missing)?;

        if let Some(not_before) = conditions.not_before {
            if now < not_before - self.clock_skew {
                return Err(AssertionValidationError::NotYetValid(not_before));
            }
        }
        if let Some(not_on_or_after) = conditions.not_on_or_after {
            if now >= not_on_or_after + self.clock_skew {
                return Err(AssertionValidationError::Expired(not_on_or_after));
            }
        }

        // Every AudienceRestriction must name this SP.
        if conditions.audience_restrictions.is_empty()
            || !conditions
                .audience_restrictions
                .iter()
                .all(|audiences| audiences.iter().any(|a| *a == self.sp_entity_id))
        {
            return Err(audience_missing());
        }
        Ok(())
    }

    fn bearer_confirmation<'a>(
        &self,
        assertion: &'a DecryptedAssertion,
        now: DateTime<Utc>,
    ) -> Result<&'a SubjectConfirmation, AssertionValidationError> {
        assertion
            .subject
            .iter()
            .flat_map(|s| s.confirmations.iter())
            .find(|c| {
                c.method == BEARER_CONFIRMATION
                    && c.recipient.as_deref() == Some(self.callback_url.as_str())
                    && c.not_on_or_after
                        .is_some_and(|noa| now < noa + self.clock_skew)
                    && c.not_before.map_or(true, |nb| now >= nb - self.clock_skew)
            })
            .ok_or_else(|| AssertionValidationError::NoBearerConfirmation(self.callback_url.clone()))
    }

    fn validate_authentication(
        &self,
        assertion: &DecryptedAssertion,
        now: DateTime<Utc>,
    ) -> Result<(), AssertionValidationError> {
        let statement = assertion
            .authn_statements
            .first()
            .ok_or(AssertionValidationError::MissingAuthnStatement)?;
        let instant = statement.authn_instant;

        if instant > now + self.clock_skew {
            return Err(AssertionValidationError::AuthenticationInFuture(instant));
        }
        if now > instant + self.maximum_authentication_lifetime + self.clock_skew {
            return Err(AssertionValidationError::AuthenticationTooOld(instant));
        }
        Ok(())
    }
}

impl AssertionValidator for DefaultAssertionValidator {
    fn validate(
        &self,
        assertion: &DecryptedAssertion,
        now: DateTime<Utc>,
    ) -> Result<(), AssertionValidationError> {
        self.validate_issuer(assertion)?;
        self.validate_conditions(assertion, now)?;
        let confirmation = self.bearer_confirmation(assertion, now)?;
        self.validate_authentication(assertion, now)?;

        // Consumed last so that a rejected assertion leaves the request open.
        if let Some(sessions) = &self.sessions {
            let request_id = confirmation
                .in_response_to
                .as_deref()
                .ok_or(AssertionValidationError::MissingInResponseTo)?;
            sessions.validate_and_consume(request_id, now)?;
        }

        tracing::debug!(
            assertion_id = %assertion.id,
            issuer = %assertion.issuer,
            "SAML assertion conditions validated"
        );
        Ok(())
    }
}
