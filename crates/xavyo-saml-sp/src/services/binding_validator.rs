//! Message lifetime and destination checks for HTTP-POST responses

use crate::error::{SamlError, SamlResult};
use crate::saml::ParsedResponse;
use chrono::{DateTime, Duration, Utc};

/// Validates where and when a response was delivered
#[derive(Debug, Clone)]
pub struct BindingValidator {
    callback_url: String,
    clock_skew: Duration,
    message_lifetime: Duration,
}

impl BindingValidator {
    pub fn new(callback_url: impl Into<String>, clock_skew: Duration, message_lifetime: Duration) -> Self {
        Self {
            callback_url: callback_url.into(),
            clock_skew,
            message_lifetime,
        }
    }

    /// Check the message lifetime, then the destination.
    ///
    /// The response is accepted within
    /// `[IssueInstant - skew, IssueInstant + lifetime + skew]`, bounds
    /// inclusive. `Destination` must equal the callback URL byte for byte.
    pub fn validate(
        &self,
        response: &ParsedResponse,
        received_endpoint: Option<&str>,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        self.validate_lifetime(response.issue_instant, now)?;
        self.validate_destination(response.destination.as_deref(), received_endpoint)
    }

    fn validate_lifetime(&self, issue_instant: DateTime<Utc>, now: DateTime<Utc>) -> SamlResult<()> {
        let earliest = issue_instant - self.clock_skew;
        let latest = issue_instant + self.message_lifetime + self.clock_skew;

        if now < earliest || now > latest {
            tracing::debug!(
                issue_instant = %issue_instant,
                validated_at = %now,
                "SAML response outside the accepted lifetime window"
            );
            return Err(SamlError::ExpiredMessage {
                issue_instant,
                validated_at: now,
            });
        }
        Ok(())
    }

    fn validate_destination(
        &self,
        destination: Option<&str>,
        received_endpoint: Option<&str>,
    ) -> SamlResult<()> {
        let mismatch = || SamlError::EndpointMismatch {
            expected: self.callback_url.clone(),
            actual: destination.map(str::to_string),
        };

        if received_endpoint.is_none() {
            return Err(mismatch());
        }
        match destination {
            Some(destination) if destination == self.callback_url => Ok(()),
            _ => Err(mismatch()),
        }
    }
}
