//! SAML `Response` parsing service

use crate::error::{SamlError, SamlResult};
use crate::saml::constants::{SAMLP_NS, SAML_NS};
use crate::saml::{parse_instant, EncryptedAssertion, ParsedResponse, ResponseSchema, Status, StatusCode};
use crate::services::decoder::RawMessage;
use crate::xml::{XmlDocument, XmlElement, XmlError};

/// Service for parsing decoded SAML `Response` messages
pub struct ResponseParser;

impl ResponseParser {
    /// Parse and schema-validate a decoded response.
    ///
    /// Nothing is extracted until the whole document has passed `schema`.
    pub fn parse(raw: &RawMessage, schema: &ResponseSchema) -> SamlResult<ParsedResponse> {
        let xml = std::str::from_utf8(raw.as_bytes())
            .map_err(|e| SamlError::MalformedInput(format!("Invalid UTF-8: {e}")))?;

        let document = XmlDocument::parse(xml).map_err(|e| match e {
            XmlError::DoctypeForbidden => SamlError::SchemaViolation(e.to_string()),
            other => SamlError::MalformedInput(other.to_string()),
        })?;

        let root = document.root();
        schema
            .validate(root)
            .map_err(|e| SamlError::SchemaViolation(e.to_string()))?;

        Self::extract(root)
    }

    fn extract(root: &XmlElement) -> SamlResult<ParsedResponse> {
        let id = required_attribute(root, "ID")?.to_string();
        let issue_instant_raw = required_attribute(root, "IssueInstant")?;
        let issue_instant = parse_instant(issue_instant_raw).ok_or_else(|| {
            SamlError::SchemaViolation(format!("Invalid IssueInstant: {issue_instant_raw}"))
        })?;

        let status = root
            .child(SAMLP_NS, "Status")
            .ok_or_else(|| SamlError::SchemaViolation("Missing Status".to_string()))
            .and_then(parse_status)?;

        let mut encrypted_assertions = Vec::new();
        let mut plain_assertion_count = 0;
        for child in &root.children {
            if child.is(SAML_NS, "EncryptedAssertion") {
                let assertion = EncryptedAssertion::from_element(child).ok_or_else(|| {
                    SamlError::SchemaViolation("Incomplete EncryptedAssertion".to_string())
                })?;
                encrypted_assertions.push(assertion);
            } else if child.is(SAML_NS, "Assertion") {
                plain_assertion_count += 1;
            }
        }

        Ok(ParsedResponse {
            id,
            issue_instant,
            destination: root.attribute("Destination").map(str::to_string),
            in_response_to: root.attribute("InResponseTo").map(str::to_string),
            issuer: root
                .child(SAML_NS, "Issuer")
                .map(|i| i.text_content().to_string()),
            status,
            encrypted_assertions,
            plain_assertion_count,
        })
    }
}

fn required_attribute<'a>(element: &'a XmlElement, name: &str) -> SamlResult<&'a str> {
    element
        .attribute(name)
        .ok_or_else(|| SamlError::SchemaViolation(format!("Missing {name} attribute")))
}

fn parse_status(status: &XmlElement) -> SamlResult<Status> {
    let code_element = status
        .child(SAMLP_NS, "StatusCode")
        .ok_or_else(|| SamlError::SchemaViolation("Missing StatusCode".to_string()))?;
    let code = StatusCode::from_uri(required_attribute(code_element, "Value")?);

    let sub_code = code_element
        .child(SAMLP_NS, "StatusCode")
        .map(|sub| required_attribute(sub, "Value").map(StatusCode::from_uri))
        .transpose()?;

    let message = status
        .child(SAMLP_NS, "StatusMessage")
        .map(|m| m.text_content().to_string());

    Ok(Status {
        code,
        sub_code,
        message,
    })
}
