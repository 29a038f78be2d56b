//! Assertion signature tests
//!
//! The signature is checked on the decrypted assertion only. Keys come
//! from the trust anchors; nothing in the message can introduce one.

#[cfg(test)]
mod tests {
    use crate::security::common::*;
    use crate::security::fixtures::*;
    use chrono::Duration;
    use std::sync::Arc;
    use xavyo_saml_sp::saml::constants::XMLDSIG_NS;
    use xavyo_saml_sp::services::signature_validator::verify_signature;
    use xavyo_saml_sp::services::{SignatureError, SignatureProfileValidator};
    use xavyo_saml_sp::{
        Credential, CredentialCriteria, DecryptedAssertion, ErrorKind, ErrorVisibility, KeyUsage,
        SamlError, TrustAnchorResolver, TrustAnchorSet,
    };

    fn encrypted_response(assertion_xml: &str) -> String {
        TestResponse::new(now())
            .with_assertion(encrypt_assertion(assertion_xml))
            .encode()
    }

    // ============================================================
    // Signed Content Integrity
    // ============================================================

    #[test]
    fn test_fixture_signature_verifies_directly() {
        let assertion = TestAssertion::new(now());
        let decrypted = DecryptedAssertion::parse(&assertion.signed()).unwrap();
        let profile = SignatureProfileValidator::validate(&decrypted).unwrap();
        let credential = Credential::from_certificate_pem(
            &keys().idp_certificate_pem,
            KeyUsage::Signing,
        )
        .unwrap();

        verify_signature(&decrypted, &profile, &credential).unwrap();
    }

    #[test]
    fn test_modified_subject_breaks_signature() {
        let signed = TestAssertion::new(now()).signed();
        let tampered = signed.replace("alice@example.com", "mallory@example.com");
        assert_ne!(signed, tampered);

        let err = authenticate(&service(), &encrypted_response(&tampered), now()).unwrap_err();
        assert!(matches!(err, SamlError::SignatureInvalid));
        assert_eq!(err.visibility(), ErrorVisibility::SecurityAnomaly);
    }

    #[test]
    fn test_modified_attribute_breaks_signature() {
        let signed = TestAssertion::new(now()).signed();
        let tampered = signed.replace(">engineering<", ">administrators<");

        let err = authenticate(&service(), &encrypted_response(&tampered), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
    }

    #[test]
    fn test_modified_signature_value_fails() {
        let signed = TestAssertion::new(now()).signed();
        let start = signed.find("<ds:SignatureValue>").unwrap() + "<ds:SignatureValue>".len();
        let mut bytes = signed.into_bytes();
        bytes[start] = if bytes[start] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        let err = authenticate(&service(), &encrypted_response(&tampered), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
    }

    #[test]
    fn test_signature_by_untrusted_key_for_trusted_issuer() {
        let signed = TestAssertion::new(now()).signed_by(&keys().rogue_signing);

        let err = authenticate(&service(), &encrypted_response(&signed), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
    }

    #[test]
    fn test_embedded_key_info_is_ignored() {
        // An attacker attaches their own certificate; verification still
        // uses the trust anchor and fails.
        let signed = TestAssertion::new(now()).signed_by(&keys().rogue_signing);
        let with_key_info = signed.replacen(
            "</ds:SignatureValue>",
            "</ds:SignatureValue><ds:KeyInfo><ds:X509Data><ds:X509Certificate>MIIB</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
            1,
        );

        let err =
            authenticate(&service(), &encrypted_response(&with_key_info), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
    }

    // ============================================================
    // Externally Produced Signatures
    // ============================================================

    fn external_credential() -> Credential {
        Credential::from_certificate_pem(EXTERNAL_IDP_CERTIFICATE_PEM, KeyUsage::Signing).unwrap()
    }

    #[test]
    fn test_external_assertion_canonical_forms() {
        let assertion = DecryptedAssertion::parse(EXTERNAL_SIGNED_ASSERTION).unwrap();
        let profile = SignatureProfileValidator::validate(&assertion).unwrap();
        let document = assertion.document();

        let content = document
            .canonicalize_element(assertion.root(), Some(profile.signature), &profile.content_c14n)
            .unwrap();
        assert_eq!(content, EXTERNAL_ASSERTION_C14N);

        let signed_info = document
            .canonicalize_element(profile.signed_info, None, &profile.signed_info_c14n)
            .unwrap();
        assert_eq!(signed_info, EXTERNAL_SIGNED_INFO_C14N);
    }

    #[test]
    fn test_external_assertion_verifies() {
        let assertion = DecryptedAssertion::parse(EXTERNAL_SIGNED_ASSERTION).unwrap();
        assert_eq!(assertion.id, EXTERNAL_ASSERTION_ID);
        let profile = SignatureProfileValidator::validate(&assertion).unwrap();

        verify_signature(&assertion, &profile, &external_credential()).unwrap();
    }

    #[test]
    fn test_external_assertion_tampered_value_fails_digest() {
        let tampered = EXTERNAL_SIGNED_ASSERTION.replacen("Tamm &amp; Sõber", "Tamm &amp; Sober", 1);
        assert_ne!(tampered, EXTERNAL_SIGNED_ASSERTION);
        let assertion = DecryptedAssertion::parse(&tampered).unwrap();
        let profile = SignatureProfileValidator::validate(&assertion).unwrap();

        assert!(matches!(
            verify_signature(&assertion, &profile, &external_credential()),
            Err(SignatureError::DigestMismatch)
        ));
    }

    #[test]
    fn test_external_assertion_authenticates() {
        let issued = external_issue_instant();
        let form_value = TestResponse::new(issued)
            .with_assertion(encrypt_assertion(EXTERNAL_SIGNED_ASSERTION))
            .encode();
        let service = service_trusting(EXTERNAL_IDP_CERTIFICATE_PEM);

        let result = authenticate(&service, &form_value, issued + Duration::minutes(1)).unwrap();
        assert_eq!(result.issuer, IDP_ENTITY_ID);
        assert_eq!(result.name_id.as_deref(), Some("EE/EE/38001085718"));
        assert_eq!(result.attribute("FamilyName"), Some("Tamm & Sõber"));
        assert_eq!(
            result.authn_context_class_ref.as_deref(),
            Some("http://eidas.europa.eu/LoA/high")
        );
        assert_eq!(result.assertion().raw_xml(), EXTERNAL_SIGNED_ASSERTION);
    }

    #[test]
    fn test_external_assertion_rejected_without_its_trust_anchor() {
        let issued = external_issue_instant();
        let form_value = TestResponse::new(issued)
            .with_assertion(encrypt_assertion(EXTERNAL_SIGNED_ASSERTION))
            .encode();

        let err = authenticate(&service(), &form_value, issued + Duration::minutes(1)).unwrap_err();
        assert!(matches!(err, SamlError::SignatureInvalid));
    }

    // ============================================================
    // Signature Presence and Profile
    // ============================================================

    #[test]
    fn test_unsigned_assertion() {
        let unsigned = TestAssertion::new(now()).to_xml();

        let err = authenticate(&service(), &encrypted_response(&unsigned), now()).unwrap_err();
        assert!(matches!(err, SamlError::UnsignedAssertion));
    }

    #[test]
    fn test_reference_to_other_element_is_profile_violation() {
        let signed = TestAssertion::new(now()).signed_with_reference("#_someOtherElement");

        let err = authenticate(&service(), &encrypted_response(&signed), now()).unwrap_err();
        assert!(matches!(err, SamlError::SignatureProfileViolation));
    }

    #[test]
    fn test_whole_document_reference_is_profile_violation() {
        let signed = TestAssertion::new(now()).signed_with_reference("");

        let err = authenticate(&service(), &encrypted_response(&signed), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignatureProfileViolation);
    }

    #[test]
    fn test_wrapped_duplicate_id_is_profile_violation() {
        // The signed assertion is hidden inside Advice of an attacker
        // assertion carrying the same ID.
        let original = TestAssertion::new(now());
        let signed = original.signed();
        let inner = signed.replacen(
            r#" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion""#,
            "",
            1,
        );
        let forged = TestAssertion {
            name_id: "mallory@example.com".to_string(),
            ..original.clone()
        };
        let forged_xml = forged.to_xml();
        let signature_start = signed.find("<ds:Signature").unwrap();
        let signature_end = signed.find("</ds:Signature>").unwrap() + "</ds:Signature>".len();
        let wrapped = forged_xml
            .replacen(
                "</saml:Issuer>",
                &format!("</saml:Issuer>{}", &signed[signature_start..signature_end]),
                1,
            )
            .replacen(
                "</saml:Assertion>",
                &format!("<saml:Advice>{inner}</saml:Advice></saml:Assertion>"),
                1,
            );

        let err = authenticate(&service(), &encrypted_response(&wrapped), now()).unwrap_err();
        assert!(matches!(err, SamlError::SignatureProfileViolation));
    }

    #[test]
    fn test_signature_with_object_is_profile_violation() {
        let signed = TestAssertion::new(now()).signed();
        let with_object = signed.replacen(
            "</ds:SignatureValue>",
            "</ds:SignatureValue><ds:Object><payload/></ds:Object>",
            1,
        );

        let err = authenticate(&service(), &encrypted_response(&with_object), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignatureProfileViolation);
    }

    #[test]
    fn test_profile_error_detail_is_logged_not_returned() {
        let signed = TestAssertion::new(now()).signed_with_reference("#_someOtherElement");
        let decrypted = DecryptedAssertion::parse(&signed).unwrap();

        let detail = SignatureProfileValidator::validate(&decrypted).unwrap_err();
        assert!(matches!(detail, SignatureError::Profile(ref m) if m.contains("_someOtherElement")));
        assert!(decrypted.root().child(XMLDSIG_NS, "Signature").is_some());

        let err = authenticate(&service(), &encrypted_response(&signed), now()).unwrap_err();
        assert!(!err.to_string().contains("_someOtherElement"));
    }

    // ============================================================
    // Trust Resolution
    // ============================================================

    #[test]
    fn test_foreign_issuer_is_untrusted() {
        let signed = TestAssertion::new(now())
            .with_issuer("https://evil.example.com")
            .signed_by(&keys().rogue_signing);

        let err = authenticate(&service(), &encrypted_response(&signed), now()).unwrap_err();
        assert!(matches!(
            err,
            SamlError::UntrustedIssuer(ref issuer) if issuer == "https://evil.example.com"
        ));
    }

    #[test]
    fn test_ambiguous_trust_is_untrusted() {
        // Two signing certificates for the same issuer: no single key to use.
        let trust = trust_anchors()
            .with_idp_signing_certificate(IDP_ENTITY_ID, &keys().idp_certificate_pem)
            .unwrap();
        let service = xavyo_saml_sp::AuthResponseService::with_default_validator(
            &config(),
            decryption_credential(),
            Arc::new(trust),
        );
        let now = now();

        let err = authenticate(&service, &valid_response(&TestAssertion::new(now)), now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UntrustedIssuer);
    }

    #[test]
    fn test_encryption_only_credential_is_not_used_for_signatures() {
        let credential =
            Credential::from_certificate_pem(&keys().idp_certificate_pem, KeyUsage::Encryption)
                .unwrap();
        let trust = TrustAnchorSet::new().with_entity(
            xavyo_saml_sp::TrustedEntity::saml20_idp(IDP_ENTITY_ID).with_credential(credential),
        );
        assert!(trust
            .resolve(&CredentialCriteria::idp_signing(IDP_ENTITY_ID))
            .unwrap()
            .is_empty());

        let service = xavyo_saml_sp::AuthResponseService::with_default_validator(
            &config(),
            decryption_credential(),
            Arc::new(trust),
        );
        let now = now();
        let err = authenticate(&service, &valid_response(&TestAssertion::new(now)), now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UntrustedIssuer);
    }
}
