//! Fuzz target for decrypted assertion parsing and signature verification.
//!
//! Decrypted plaintext is attacker-influenced: the SP encryption key is
//! public. Parsing, the signature profile, canonicalization and the
//! cryptographic checks must reject anything malformed without panicking.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_assertion_parser -- -max_total_time=600

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;
use xavyo_saml_sp::c14n::{canonicalize, C14nOptions};
use xavyo_saml_sp::services::signature_validator::verify_signature;
use xavyo_saml_sp::services::SignatureProfileValidator;
use xavyo_saml_sp::{Credential, DecryptedAssertion, KeyUsage};

/// Fixed RSA signing key; fuzzed inputs only reach the verifier, never a valid signature.
const SIGNING_KEY_PEM: &[u8] = b"-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAtCkrkiVLkz87Ek7LgQPn
Q4cCjEidpOv1yYa9rfQBBM3TmmIi4cbs+rc2j1JdDJdp4hG103aAOVvh+40DxVRT
bNKgrMwIayYMAVYxaSgyDGKBpjzw/8nGHvt5XLttEpAmHfNYrij9jVSFQHIvBN9C
glo0RHVCUjtATg1T/cslNU6MCzWJdjMZmz6C1RYdR9UVv3jcblGHp7F1Se3f99G9
8sj6bF9MGvq/+woDQtpACEqJV+8MT5vYsAbboy6QqkvgqJpUbHPkey1zs2NKaDOz
wz8svIrCaGwjBYXYdoKvvEdcTSAYQC54lG+5k9tjgg6hvpqfugb0BP/93/+zaCZA
cwIDAQAB
-----END PUBLIC KEY-----
";

fn credential() -> &'static Credential {
    static CREDENTIAL: OnceLock<Credential> = OnceLock::new();
    CREDENTIAL.get_or_init(|| {
        Credential::from_public_key_pem(SIGNING_KEY_PEM, KeyUsage::Signing).unwrap()
    })
}

fuzz_target!(|data: &[u8]| {
    let Ok(xml) = std::str::from_utf8(data) else {
        return;
    };

    let _ = canonicalize(xml, &C14nOptions::inclusive());
    let _ = canonicalize(xml, &C14nOptions::exclusive().with_prefix_list("xs #default"));

    if let Ok(assertion) = DecryptedAssertion::parse(xml) {
        assert!(!assertion.id.is_empty());
        assert!(!assertion.issuer.is_empty());

        if let Ok(profile) = SignatureProfileValidator::validate(&assertion) {
            // A conformant signature always sits directly under the assertion.
            assert!(assertion.signature().is_some());
            assert_eq!(assertion.document().count_id(&assertion.id), 1);
            assert!(!profile.algorithm.is_deprecated());

            let _ = verify_signature(&assertion, &profile, credential());
        }
    }
});
