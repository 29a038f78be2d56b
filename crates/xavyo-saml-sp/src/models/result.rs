//! The outcome of a successfully validated SAML response

use crate::saml::DecryptedAssertion;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// An authenticated principal.
///
/// Only ever constructed after decryption, signature verification and
/// assertion validation have all succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticationResult {
    /// ID of the response that carried the assertion
    pub response_id: String,
    /// Entity ID of the identity provider that signed the assertion
    pub issuer: String,
    /// Subject `NameID` value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id_format: Option<String>,
    /// Authentication context class (level of assurance)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_context_class_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_instant: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,
    /// Attribute values keyed by `FriendlyName`, or `Name` when absent
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    assertion: DecryptedAssertion,
}

impl AuthenticationResult {
    pub(crate) fn new(response_id: String, assertion: DecryptedAssertion) -> Self {
        let name_id = assertion.subject.as_ref().and_then(|s| s.name_id.as_ref());
        let authn = assertion.authn_statements.first();

        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for attribute in &assertion.attributes {
            let key = attribute
                .friendly_name
                .clone()
                .unwrap_or_else(|| attribute.name.clone());
            attributes
                .entry(key)
                .or_default()
                .extend(attribute.values.iter().cloned());
        }

        Self {
            response_id,
            issuer: assertion.issuer.clone(),
            name_id: name_id.map(|n| n.value.clone()),
            name_id_format: name_id.and_then(|n| n.format.clone()),
            authn_context_class_ref: authn.and_then(|a| a.authn_context_class_ref.clone()),
            authn_instant: authn.map(|a| a.authn_instant),
            session_index: authn.and_then(|a| a.session_index.clone()),
            attributes,
            assertion,
        }
    }

    /// First value of an attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// The verified assertion.
    pub fn assertion(&self) -> &DecryptedAssertion {
        &self.assertion
    }

    pub fn into_assertion(self) -> DecryptedAssertion {
        self.assertion
    }
}
