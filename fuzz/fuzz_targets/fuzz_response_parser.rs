//! Fuzz target for SAML response decoding and parsing.
//!
//! Feeds arbitrary form values and raw documents through the HTTP-POST
//! decoder, the XML parser and the protocol schema. None of these may
//! panic.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_response_parser -- -max_total_time=600

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use xavyo_saml_sp::services::{RawMessage, ResponseDecoder, ResponseParser};
use xavyo_saml_sp::ResponseSchema;

/// Arbitrary input for the response parser
#[derive(Arbitrary, Debug)]
struct ResponseInput {
    /// Treated as the `SAMLResponse` form parameter
    form_value: String,
    /// Treated as an already decoded document
    document: Vec<u8>,
}

fuzz_target!(|input: ResponseInput| {
    let schema = ResponseSchema::saml20();

    if let Ok(raw) = ResponseDecoder::decode_post(Some(&input.form_value)) {
        assert!(!raw.is_empty());
        let _ = ResponseParser::parse(&raw, &schema);
    }

    if let Ok(response) = ResponseParser::parse(&RawMessage::new(input.document), &schema) {
        // ID is schema-validated as an xs:ID.
        assert!(!response.id.is_empty());
    }
});
