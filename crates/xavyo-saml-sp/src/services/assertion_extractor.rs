//! Selection of the single encrypted assertion in a response

use crate::error::{SamlError, SamlResult};
use crate::saml::{EncryptedAssertion, ParsedResponse};

pub struct AssertionExtractor;

impl AssertionExtractor {
    /// Exactly one `EncryptedAssertion` is accepted. Plaintext assertions
    /// never count.
    pub fn extract(response: &ParsedResponse) -> SamlResult<&EncryptedAssertion> {
        match response.encrypted_assertions.as_slice() {
            [single] => Ok(single),
            [] => {
                if response.plain_assertion_count > 0 {
                    tracing::warn!(
                        response_id = %response.id,
                        plain_assertions = response.plain_assertion_count,
                        "SAML response carries only unencrypted assertions"
                    );
                }
                Err(SamlError::MissingAssertion)
            }
            many => Err(SamlError::AmbiguousAssertion(many.len())),
        }
    }
}
