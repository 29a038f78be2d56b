//! End-to-end acceptance and stage ordering tests

#[cfg(test)]
mod tests {
    use crate::security::common::*;
    use chrono::Duration;
    use xavyo_saml_sp::{ErrorKind, IncomingResponse, SamlError};

    // ============================================================
    // Accepted Responses
    // ============================================================

    #[test]
    fn test_valid_response_authenticates() {
        let now = now();
        let assertion = TestAssertion::new(now);
        let signed = assertion.signed();
        let response = TestResponse::new(now).with_assertion(encrypt_assertion(&signed));

        let result = authenticate(&service(), &response.encode(), now).unwrap();

        assert_eq!(result.response_id, response.id);
        assert_eq!(result.issuer, IDP_ENTITY_ID);
        assert_eq!(result.name_id.as_deref(), Some("alice@example.com"));
        assert_eq!(
            result.name_id_format.as_deref(),
            Some("urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress")
        );
        assert_eq!(
            result.authn_context_class_ref.as_deref(),
            Some("urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport")
        );
        assert_eq!(result.authn_instant, Some(assertion.authn_instant));
        assert_eq!(result.session_index.as_deref(), Some("_session-1"));
        assert_eq!(result.assertion().id, assertion.id);
        assert_eq!(result.assertion().raw_xml(), signed);
    }

    #[test]
    fn test_typed_attribute_values_with_local_namespace() {
        // OpenSAML declares xsi on each AttributeValue next to xsi:type.
        let now = now();
        let assertion = TestAssertion::new(now);
        let typed = assertion
            .to_xml()
            .replacen(
                "<saml:Assertion ",
                r#"<saml:Assertion xmlns:xs="http://www.w3.org/2001/XMLSchema" "#,
                1,
            )
            .replace(
                "<saml:AttributeValue>",
                r#"<saml:AttributeValue xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:type="xs:string">"#,
            );
        let signed = sign_assertion_xml(&typed, &format!("#{}", assertion.id), &keys().idp_signing);
        let form_value = TestResponse::new(now)
            .with_assertion(encrypt_assertion(&signed))
            .encode();

        let service = service();
        let result = service
            .authenticate_at(&IncomingResponse::new(&form_value, CALLBACK_URL), now)
            .unwrap();
        assert_eq!(
            result.attributes.get("groups"),
            Some(&vec!["engineering".to_string(), "vpn-users".to_string()])
        );

        // Tampering with a typed value is still caught.
        let tampered = signed.replacen(">engineering<", ">administrators<", 1);
        let form_value = TestResponse::new(now)
            .with_assertion(encrypt_assertion(&tampered))
            .encode();
        let err = service
            .authenticate_at(&IncomingResponse::new(&form_value, CALLBACK_URL), now)
            .unwrap_err();
        assert!(matches!(err, SamlError::SignatureInvalid));
    }

    #[test]
    fn test_attributes_keyed_by_friendly_name() {
        let now = now();
        let result = authenticate(&service(), &valid_response(&TestAssertion::new(now)), now).unwrap();

        assert_eq!(result.attribute("mail"), Some("alice@example.com"));
        assert_eq!(
            result.attributes.get("groups"),
            Some(&vec!["engineering".to_string(), "vpn-users".to_string()])
        );
        assert!(!result.attributes.contains_key("urn:oid:0.9.2342.19200300.100.1.3"));
    }

    #[test]
    fn test_validation_is_repeatable_without_request_tracking() {
        let now = now();
        let service = service();
        let form_value = valid_response(&TestAssertion::new(now));

        let first = authenticate(&service, &form_value, now).unwrap();
        let second = authenticate(&service, &form_value, now).unwrap();

        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[test]
    fn test_result_serialization_omits_assertion() {
        let now = now();
        let result = authenticate(&service(), &valid_response(&TestAssertion::new(now)), now).unwrap();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["issuer"], IDP_ENTITY_ID);
        assert_eq!(json["name_id"], "alice@example.com");
        assert_eq!(json["attributes"]["mail"][0], "alice@example.com");
        assert!(json.get("assertion").is_none());
    }

    #[test]
    fn test_line_wrapped_form_value_is_accepted() {
        let now = now();
        let form_value = valid_response(&TestAssertion::new(now));
        let wrapped: String = form_value
            .as_bytes()
            .chunks(76)
            .map(|line| format!("{}\r\n", std::str::from_utf8(line).unwrap()))
            .collect();

        assert!(authenticate(&service(), &wrapped, now).is_ok());
    }

    // ============================================================
    // Input Handling
    // ============================================================

    #[test]
    fn test_missing_parameter() {
        let result = service().authenticate(&IncomingResponse {
            saml_response: None,
            received_endpoint: Some(CALLBACK_URL),
        });
        assert!(matches!(result, Err(SamlError::MalformedInput(_))));
    }

    #[test]
    fn test_invalid_base64() {
        let err = authenticate(&service(), "not*base64!", now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_not_well_formed_xml() {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let form_value = STANDARD.encode("<samlp:Response xmlns:samlp=\"urn:oasis:names:tc:SAML:2.0:protocol\">");
        let err = authenticate(&service(), &form_value, now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_doctype_is_a_schema_violation() {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let now = now();
        let xml = format!(
            "<!DOCTYPE samlp:Response [<!ENTITY x \"y\">]>{}",
            TestResponse::new(now).to_xml()
        );
        let err = authenticate(&service(), &STANDARD.encode(xml), now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    }

    #[test]
    fn test_unknown_response_attribute_is_a_schema_violation() {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let now = now();
        let xml = TestResponse::new(now)
            .to_xml()
            .replacen(" Version=", " Unexpected=\"1\" Version=", 1);
        let err = authenticate(&service(), &STANDARD.encode(xml), now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    }

    // ============================================================
    // Stage Ordering
    // ============================================================

    #[test]
    fn test_expiry_reported_before_status() {
        let now = now();
        let form_value = TestResponse::new(now - Duration::hours(1))
            .with_status(
                "urn:oasis:names:tc:SAML:2.0:status:Requester",
                Some("urn:oasis:names:tc:SAML:2.0:status:RequestDenied"),
                None,
            )
            .encode();

        let err = authenticate(&service(), &form_value, now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExpiredMessage);
    }

    #[test]
    fn test_status_reported_before_missing_assertion() {
        let now = now();
        let form_value = TestResponse::new(now)
            .with_status(
                "urn:oasis:names:tc:SAML:2.0:status:Responder",
                Some("urn:oasis:names:tc:SAML:2.0:status:AuthnFailed"),
                None,
            )
            .encode();

        let err = authenticate(&service(), &form_value, now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn test_decryption_failure_reported_before_signature() {
        let now = now();
        let unsigned = TestAssertion::new(now).to_xml();
        let form_value = TestResponse::new(now)
            .with_assertion(encrypt_assertion_with(&unsigned, |payload| payload[20] ^= 0x01))
            .encode();

        let err = authenticate(&service(), &form_value, now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
    }

    #[test]
    fn test_signature_checked_before_assertion_validator() {
        let now = now();
        let form_value = TestResponse::new(now)
            .with_assertion(encrypt_assertion(&TestAssertion::new(now).to_xml()))
            .encode();
        let service = service_with_validator(std::sync::Arc::new(
            |_: &xavyo_saml_sp::DecryptedAssertion,
             _: chrono::DateTime<chrono::Utc>|
             -> Result<(), xavyo_saml_sp::AssertionValidationError> {
                panic!("validator must not see an unsigned assertion")
            },
        ));

        let err = authenticate(&service, &form_value, now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsignedAssertion);
    }

    #[test]
    fn test_custom_validator_rejection() {
        let now = now();
        let service = service_with_validator(std::sync::Arc::new(
            |assertion: &xavyo_saml_sp::DecryptedAssertion,
             _: chrono::DateTime<chrono::Utc>|
             -> Result<(), xavyo_saml_sp::AssertionValidationError> {
                Err(xavyo_saml_sp::AssertionValidationError::Rejected(format!(
                    "subject {:?} is not provisioned",
                    assertion.name_id()
                )))
            },
        ));

        let err = authenticate(&service, &valid_response(&TestAssertion::new(now)), now).unwrap_err();
        assert!(matches!(
            err,
            SamlError::AssertionValidation(xavyo_saml_sp::AssertionValidationError::Rejected(_))
        ));
    }
}
