//! Session storage for SAML `AuthnRequest` tracking

use super::types::{RequestSession, SessionError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Session store trait for `AuthnRequest` tracking
pub trait RequestSessionStore: Send + Sync {
    /// Store a new `AuthnRequest` session
    fn store(&self, session: RequestSession) -> Result<(), SessionError>;

    /// Look up a session by request ID
    fn get(&self, request_id: &str) -> Result<Option<RequestSession>, SessionError>;

    /// Validate and consume a session atomically
    ///
    /// Looks up the session, checks it is neither expired nor consumed at
    /// `now`, marks it consumed and returns it.
    fn validate_and_consume(
        &self,
        request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RequestSession, SessionError>;

    /// Remove sessions expired at `now`
    ///
    /// Returns the number of sessions deleted
    fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, SessionError>;
}

/// In-memory session store
#[derive(Debug, Default)]
pub struct InMemoryRequestSessionStore {
    sessions: RwLock<HashMap<String, RequestSession>>,
}

impl InMemoryRequestSessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestSessionStore for InMemoryRequestSessionStore {
    fn store(&self, session: RequestSession) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write();

        if sessions.contains_key(&session.request_id) {
            return Err(SessionError::DuplicateRequestId(session.request_id));
        }

        sessions.insert(session.request_id.clone(), session);
        Ok(())
    }

    fn get(&self, request_id: &str) -> Result<Option<RequestSession>, SessionError> {
        Ok(self.sessions.read().get(request_id).cloned())
    }

    fn validate_and_consume(
        &self,
        request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RequestSession, SessionError> {
        let mut sessions = self.sessions.write();

        let session = sessions
            .get_mut(request_id)
            .ok_or_else(|| SessionError::NotFound(request_id.to_string()))?;

        session.validate_at(now)?;
        session.consumed_at = Some(now);

        tracing::info!(
            request_id = %request_id,
            idp_entity_id = %session.idp_entity_id,
            "SAML AuthnRequest session consumed"
        );

        Ok(session.clone())
    }

    fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, SessionError> {
        let mut sessions = self.sessions.write();
        let before_count = sessions.len();

        sessions.retain(|_, session| !session.is_expired_at(now));

        let deleted = (before_count - sessions.len()) as u64;

        if deleted > 0 {
            tracing::debug!(deleted = deleted, "Cleaned up expired SAML request sessions");
        }

        Ok(deleted)
    }
}
