//! SAML 2.0 protocol model

pub mod algorithms;
pub mod assertion;
pub mod constants;
pub mod encrypted;
pub mod response;
pub mod schema;
pub mod status;

pub use assertion::{
    AssertionParseError, Attribute, AuthnStatement, Conditions, DecryptedAssertion, NameId,
    Subject, SubjectConfirmation,
};
pub use encrypted::{CipherData, EncryptedAssertion, EncryptedData, EncryptedKey, EncryptionMethod};
pub use response::ParsedResponse;
pub use schema::{ResponseSchema, SchemaError};
pub use status::{Status, StatusCode};

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse an `xs:dateTime` value. Values without a zone are taken as UTC.
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
