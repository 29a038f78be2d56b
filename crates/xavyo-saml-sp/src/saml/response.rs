//! Parsed `samlp:Response`

use super::encrypted::EncryptedAssertion;
use super::status::Status;
use chrono::{DateTime, Utc};

/// A schema-valid SAML response.
///
/// Nothing in here is trusted yet: the response envelope is not signed by
/// this profile, only the assertion inside it.
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub id: String,
    pub issue_instant: DateTime<Utc>,
    pub destination: Option<String>,
    pub in_response_to: Option<String>,
    pub issuer: Option<String>,
    pub status: Status,
    /// Encrypted assertions in document order
    pub encrypted_assertions: Vec<EncryptedAssertion>,
    /// Plaintext `saml:Assertion` elements, which are never accepted
    pub plain_assertion_count: usize,
}
