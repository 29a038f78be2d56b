//! HTTP-POST binding decoding of the `SAMLResponse` form parameter

use crate::error::{SamlError, SamlResult};
use base64::{engine::general_purpose::STANDARD, Engine};

/// Maximum encoded size for `SAMLResponse` in HTTP-POST binding (512 KB)
pub const MAX_ENCODED_SIZE_POST: usize = 512 * 1024;

/// Decoded response bytes. Opaque and untrusted until parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    bytes: Vec<u8>,
}

impl RawMessage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Service for decoding transport-encoded SAML responses
pub struct ResponseDecoder;

impl ResponseDecoder {
    /// Decode the `SAMLResponse` parameter of an HTTP-POST binding request.
    ///
    /// Standard base64 with embedded line breaks, as produced by most
    /// identity providers.
    pub fn decode_post(encoded_response: Option<&str>) -> SamlResult<RawMessage> {
        let encoded = encoded_response.ok_or_else(|| {
            SamlError::MalformedInput("Missing SAMLResponse parameter".to_string())
        })?;

        // SECURITY: Reject oversized input before base64 decode to prevent OOM.
        if encoded.len() > MAX_ENCODED_SIZE_POST {
            return Err(SamlError::MalformedInput(format!(
                "Encoded SAMLResponse exceeds maximum size ({} > {} bytes)",
                encoded.len(),
                MAX_ENCODED_SIZE_POST
            )));
        }

        let compact: String = encoded
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        if compact.is_empty() {
            return Err(SamlError::MalformedInput(
                "Empty SAMLResponse parameter".to_string(),
            ));
        }

        let decoded = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| SamlError::MalformedInput(format!("Base64 decode failed: {e}")))?;

        if decoded.is_empty() {
            return Err(SamlError::MalformedInput(
                "SAMLResponse decodes to an empty payload".to_string(),
            ));
        }

        tracing::debug!(
            saml_response = %String::from_utf8_lossy(&decoded),
            "Decoded SAMLResponse"
        );

        Ok(RawMessage::new(decoded))
    }
}
