//! Session types for SAML `AuthnRequest` tracking
//!
//! The service provider records every `AuthnRequest` it sends so that the
//! `InResponseTo` of the returned assertion can be matched exactly once.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default TTL for `AuthnRequest` sessions (15 minutes)
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 900;

/// Grace period for clock skew (30 seconds)
pub const CLOCK_SKEW_GRACE_SECONDS: i64 = 30;

/// A sent `AuthnRequest` awaiting its response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSession {
    /// Unique identifier for this session record
    pub id: Uuid,
    /// The `AuthnRequest` ID
    pub request_id: String,
    /// The identity provider the request was sent to
    pub idp_entity_id: String,
    /// When this request was issued
    pub created_at: DateTime<Utc>,
    /// When this request expires (`created_at` + TTL)
    pub expires_at: DateTime<Utc>,
    /// When the response for this request was accepted (None = unused)
    pub consumed_at: Option<DateTime<Utc>>,
    /// RelayState to restore after the SSO flow
    pub relay_state: Option<String>,
}

impl RequestSession {
    /// Create a new session with default TTL
    pub fn new(request_id: String, idp_entity_id: String, relay_state: Option<String>) -> Self {
        Self::with_ttl(
            request_id,
            idp_entity_id,
            relay_state,
            DEFAULT_SESSION_TTL_SECONDS,
        )
    }

    /// Create a new session with custom TTL
    pub fn with_ttl(
        request_id: String,
        idp_entity_id: String,
        relay_state: Option<String>,
        ttl_seconds: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            request_id,
            idp_entity_id,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
            consumed_at: None,
            relay_state,
        }
    }

    /// Check if this session has expired at `now` (with grace period for clock skew)
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at + Duration::seconds(CLOCK_SKEW_GRACE_SECONDS)
    }

    /// Check if this session has been consumed
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    /// Validate that this session is usable at `now`
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if let Some(consumed_at) = self.consumed_at {
            return Err(SessionError::AlreadyConsumed {
                request_id: self.request_id.clone(),
                consumed_at,
            });
        }
        if self.is_expired_at(now) {
            return Err(SessionError::Expired {
                request_id: self.request_id.clone(),
                expired_at: self.expires_at,
            });
        }
        Ok(())
    }
}

/// Session-related errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Request ID not found in session store
    #[error("AuthnRequest not found: {0}")]
    NotFound(String),

    /// Request has expired (past TTL + grace period)
    #[error("AuthnRequest expired: {request_id} (expired at {expired_at})")]
    Expired {
        request_id: String,
        expired_at: DateTime<Utc>,
    },

    /// A response for this request was already accepted (replay)
    #[error("Replay detected: AuthnRequest {request_id} was already answered at {consumed_at}")]
    AlreadyConsumed {
        request_id: String,
        consumed_at: DateTime<Utc>,
    },

    /// Request ID conflict
    #[error("Duplicate AuthnRequest ID: {0}")]
    DuplicateRequestId(String),

    /// Storage error
    #[error("Session storage error: {0}")]
    StorageError(String),
}
