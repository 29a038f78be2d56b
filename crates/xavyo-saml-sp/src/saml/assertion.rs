//! Decrypted SAML assertion model

use super::constants::{SAML_NS, SAML_VERSION, XMLDSIG_NS};
use super::parse_instant;
use crate::xml::{is_ncname, XmlDocument, XmlElement, XmlError};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors turning decrypted plaintext into a [`DecryptedAssertion`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssertionParseError {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("Root element is not saml:Assertion")]
    NotAnAssertion,

    #[error("Missing {0}")]
    Missing(&'static str),

    #[error("Invalid {field}: {value}")]
    Invalid { field: &'static str, value: String },
}

/// `saml:NameID`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameId {
    pub value: String,
    pub format: Option<String>,
    pub name_qualifier: Option<String>,
    pub sp_name_qualifier: Option<String>,
}

/// `saml:SubjectConfirmation` with its `SubjectConfirmationData`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectConfirmation {
    pub method: String,
    pub recipient: Option<String>,
    pub in_response_to: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: Option<DateTime<Utc>>,
}

/// `saml:Subject`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Subject {
    pub name_id: Option<NameId>,
    pub confirmations: Vec<SubjectConfirmation>,
}

/// `saml:Conditions`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conditions {
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// One entry per `AudienceRestriction`; each must be satisfied.
    pub audience_restrictions: Vec<Vec<String>>,
    pub one_time_use: bool,
}

/// `saml:AuthnStatement`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnStatement {
    pub authn_instant: DateTime<Utc>,
    pub session_index: Option<String>,
    pub session_not_on_or_after: Option<DateTime<Utc>>,
    pub authn_context_class_ref: Option<String>,
}

/// `saml:Attribute` with its string values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub name_format: Option<String>,
    pub friendly_name: Option<String>,
    pub values: Vec<String>,
}

/// A decrypted `saml:Assertion`.
///
/// Holds the parsed plaintext document so the signature can be verified
/// over the exact bytes that were decrypted.
#[derive(Debug, Clone)]
pub struct DecryptedAssertion {
    document: XmlDocument,
    pub id: String,
    pub issuer: String,
    pub issue_instant: DateTime<Utc>,
    pub subject: Option<Subject>,
    pub conditions: Option<Conditions>,
    pub authn_statements: Vec<AuthnStatement>,
    pub attributes: Vec<Attribute>,
}

impl DecryptedAssertion {
    /// Parse a standalone `saml:Assertion` document.
    pub fn parse(xml: &str) -> Result<Self, AssertionParseError> {
        let document = XmlDocument::parse(xml)?;
        let root = document.root();
        if !root.is(SAML_NS, "Assertion") {
            return Err(AssertionParseError::NotAnAssertion);
        }

        let id = root
            .attribute("ID")
            .ok_or(AssertionParseError::Missing("ID"))?;
        if !is_ncname(id) {
            return Err(AssertionParseError::Invalid {
                field: "ID",
                value: id.to_string(),
            });
        }
        let id = id.to_string();

        match root.attribute("Version") {
            Some(SAML_VERSION) => {}
            Some(other) => {
                return Err(AssertionParseError::Invalid {
                    field: "Version",
                    value: other.to_string(),
                })
            }
            None => return Err(AssertionParseError::Missing("Version")),
        }

        let issue_instant = required_instant(root, "IssueInstant")?;

        let issuer = root
            .child(SAML_NS, "Issuer")
            .map(|i| i.text_content().to_string())
            .filter(|i| !i.is_empty())
            .ok_or(AssertionParseError::Missing("Issuer"))?;

        let subject = root.child(SAML_NS, "Subject").map(parse_subject).transpose()?;
        let conditions = root
            .child(SAML_NS, "Conditions")
            .map(parse_conditions)
            .transpose()?;
        let authn_statements = root
            .children_named(SAML_NS, "AuthnStatement")
            .map(parse_authn_statement)
            .collect::<Result<Vec<_>, _>>()?;
        let attributes = root
            .children_named(SAML_NS, "AttributeStatement")
            .flat_map(|s| s.children_named(SAML_NS, "Attribute"))
            .map(parse_attribute)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            document,
            id,
            issuer,
            issue_instant,
            subject,
            conditions,
            authn_statements,
            attributes,
        })
    }

    /// The decrypted document.
    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    /// The `saml:Assertion` element.
    pub fn root(&self) -> &XmlElement {
        self.document.root()
    }

    /// The decrypted plaintext.
    pub fn raw_xml(&self) -> &str {
        self.document.source()
    }

    /// The enveloped `ds:Signature`, if present.
    pub fn signature(&self) -> Option<&XmlElement> {
        self.root().child(XMLDSIG_NS, "Signature")
    }

    /// Value of the subject `NameID`.
    pub fn name_id(&self) -> Option<&str> {
        self.subject
            .as_ref()
            .and_then(|s| s.name_id.as_ref())
            .map(|n| n.value.as_str())
    }
}

fn optional_instant(
    element: &XmlElement,
    name: &'static str,
) -> Result<Option<DateTime<Utc>>, AssertionParseError> {
    element
        .attribute(name)
        .map(|value| {
            parse_instant(value).ok_or_else(|| AssertionParseError::Invalid {
                field: name,
                value: value.to_string(),
            })
        })
        .transpose()
}

fn required_instant(
    element: &XmlElement,
    name: &'static str,
) -> Result<DateTime<Utc>, AssertionParseError> {
    optional_instant(element, name)?.ok_or(AssertionParseError::Missing(name))
}

fn optional_string(element: &XmlElement, name: &str) -> Option<String> {
    element.attribute(name).map(str::to_string)
}

fn parse_subject(element: &XmlElement) -> Result<Subject, AssertionParseError> {
    let name_id = element.child(SAML_NS, "NameID").map(|n| NameId {
        value: n.text_content().to_string(),
        format: optional_string(n, "Format"),
        name_qualifier: optional_string(n, "NameQualifier"),
        sp_name_qualifier: optional_string(n, "SPNameQualifier"),
    });

    let mut confirmations = Vec::new();
    for confirmation in element.children_named(SAML_NS, "SubjectConfirmation") {
        let method = confirmation
            .attribute("Method")
            .ok_or(AssertionParseError::Missing("SubjectConfirmation Method"))?
            .to_string();
        let data = confirmation.child(SAML_NS, "SubjectConfirmationData");
        confirmations.push(SubjectConfirmation {
            method,
            recipient: data.and_then(|d| optional_string(d, "Recipient")),
            in_response_to: data.and_then(|d| optional_string(d, "InResponseTo")),
            not_before: data
                .map(|d| optional_instant(d, "NotBefore"))
                .transpose()?
                .flatten(),
            not_on_or_after: data
                .map(|d| optional_instant(d, "NotOnOrAfter"))
                .transpose()?
                .flatten(),
        });
    }

    Ok(Subject {
        name_id,
        confirmations,
    })
}

fn parse_conditions(element: &XmlElement) -> Result<Conditions, AssertionParseError> {
    Ok(Conditions {
        not_before: optional_instant(element, "NotBefore")?,
        not_on_or_after: optional_instant(element, "NotOnOrAfter")?,
        audience_restrictions: element
            .children_named(SAML_NS, "AudienceRestriction")
            .map(|r| {
                r.children_named(SAML_NS, "Audience")
                    .map(|a| a.text_content().to_string())
                    .collect()
            })
            .collect(),
        one_time_use: element.child(SAML_NS, "OneTimeUse").is_some(),
    })
}

fn parse_authn_statement(element: &XmlElement) -> Result<AuthnStatement, AssertionParseError> {
    Ok(AuthnStatement {
        authn_instant: required_instant(element, "AuthnInstant")?,
        session_index: optional_string(element, "SessionIndex"),
        session_not_on_or_after: optional_instant(element, "SessionNotOnOrAfter")?,
        authn_context_class_ref: element
            .child(SAML_NS, "AuthnContext")
            .and_then(|c| c.child(SAML_NS, "AuthnContextClassRef"))
            .map(|r| r.text_content().to_string()),
    })
}

fn parse_attribute(element: &XmlElement) -> Result<Attribute, AssertionParseError> {
    Ok(Attribute {
        name: element
            .attribute("Name")
            .ok_or(AssertionParseError::Missing("Attribute Name"))?
            .to_string(),
        name_format: optional_string(element, "NameFormat"),
        friendly_name: optional_string(element, "FriendlyName"),
        values: element
            .children_named(SAML_NS, "AttributeValue")
            .map(|v| v.text_content().to_string())
            .collect(),
    })
}
