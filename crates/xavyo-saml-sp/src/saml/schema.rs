//! Structural schema for SAML 2.0 `samlp:Response` messages.
//!
//! The schema is declarative: each element the validator descends into has
//! an [`ElementRule`] listing its attributes and content model. Content
//! models are sequences of particles with cardinalities, which covers the
//! parts of the SAML protocol, XML-Enc and XML-DSig schemas a response
//! carries up to the encrypted assertion.

use super::constants::{SAMLP_NS, SAML_NS, SAML_VERSION, XMLDSIG_NS, XMLENC_NS, XSI_NS};
use super::parse_instant;
use crate::xml::{is_ncname, XmlElement};
use thiserror::Error;

/// Expanded element name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QName {
    pub namespace: &'static str,
    pub local_name: &'static str,
}

impl QName {
    fn matches(&self, element: &XmlElement) -> bool {
        element.is(self.namespace, self.local_name)
    }
}

/// Lexical type of an attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    /// `xs:ID` / `xs:NCName`
    Id,
    /// `xs:dateTime`
    DateTime,
    /// Fixed to the SAML protocol version
    Version,
}

#[derive(Debug, Clone, Copy)]
pub struct AttributeRule {
    pub name: &'static str,
    pub required: bool,
    pub kind: AttributeType,
}

/// A sequence member: one of `names`, repeated `min..=max` times
#[derive(Debug, Clone, Copy)]
pub struct Particle {
    pub names: &'static [QName],
    pub min: usize,
    /// `None` means unbounded
    pub max: Option<usize>,
}

impl Particle {
    fn matches(&self, element: &XmlElement) -> bool {
        self.names.iter().any(|n| n.matches(element))
    }

    fn describe(&self) -> String {
        self.names
            .iter()
            .map(|n| n.local_name)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Content {
    Empty,
    Text,
    Elements(&'static [Particle]),
    /// At least `min` child elements, none of them in a SAML namespace
    ForeignElements { min: usize },
    /// Not validated here
    Any,
}

#[derive(Debug, Clone, Copy)]
pub struct ElementRule {
    pub name: QName,
    pub attributes: &'static [AttributeRule],
    /// Whether attributes from non-SAML namespaces are allowed
    pub foreign_attributes: bool,
    pub content: Content,
}

/// Schema validation failure with the path of the offending element
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

/// A set of element rules rooted at one element
#[derive(Debug, Clone, Copy)]
pub struct ResponseSchema {
    root: QName,
    rules: &'static [ElementRule],
}

impl Default for ResponseSchema {
    fn default() -> Self {
        Self::saml20()
    }
}

impl ResponseSchema {
    /// The SAML 2.0 protocol `Response` schema.
    #[must_use]
    pub fn saml20() -> Self {
        Self {
            root: RESPONSE,
            rules: SAML20_RULES,
        }
    }

    /// Validate a document root against the schema.
    pub fn validate(&self, root: &XmlElement) -> Result<(), SchemaError> {
        if !self.root.matches(root) {
            return Err(SchemaError {
                path: format!("/{}", root.qualified_name()),
                message: format!(
                    "expected root element {{{}}}{}",
                    self.root.namespace, self.root.local_name
                ),
            });
        }
        self.validate_element(root, "")
    }

    fn rule_for(&self, element: &XmlElement) -> Option<&ElementRule> {
        self.rules.iter().find(|r| r.name.matches(element))
    }

    fn validate_element(&self, element: &XmlElement, parent_path: &str) -> Result<(), SchemaError> {
        let path = format!("{parent_path}/{}", element.qualified_name());
        let fail = |message: String| SchemaError {
            path: path.clone(),
            message,
        };

        let rule = self
            .rule_for(element)
            .ok_or_else(|| fail("no declaration for element".to_string()))?;

        for attr in &element.attributes {
            match attr.namespace.as_deref() {
                None => {
                    let declared = rule
                        .attributes
                        .iter()
                        .find(|a| a.name == attr.local_name)
                        .ok_or_else(|| fail(format!("unexpected attribute {}", attr.local_name)))?;
                    check_attribute_value(declared, &attr.value).map_err(&fail)?;
                }
                Some(XSI_NS) => {}
                Some(SAML_NS | SAMLP_NS) => {
                    return Err(fail(format!("unexpected attribute {}", attr.local_name)));
                }
                Some(_) if rule.foreign_attributes => {}
                Some(_) => {
                    return Err(fail(format!(
                        "attribute {} from a foreign namespace is not allowed",
                        attr.local_name
                    )));
                }
            }
        }

        for declared in rule.attributes.iter().filter(|a| a.required) {
            if element.attribute(declared.name).is_none() {
                return Err(fail(format!("missing required attribute {}", declared.name)));
            }
        }

        match rule.content {
            Content::Empty => {
                if !element.children.is_empty() || element.has_text() {
                    return Err(fail("element must be empty".to_string()));
                }
            }
            Content::Text => {
                if let Some(child) = element.children.first() {
                    return Err(fail(format!(
                        "unexpected child element {}",
                        child.qualified_name()
                    )));
                }
            }
            Content::Elements(particles) => {
                if element.has_text() {
                    return Err(fail("character data not allowed here".to_string()));
                }
                let mut index = 0;
                for particle in particles {
                    let mut count = 0;
                    while index < element.children.len()
                        && particle.matches(&element.children[index])
                        && particle.max.map_or(true, |max| count < max)
                    {
                        count += 1;
                        index += 1;
                    }
                    if count < particle.min {
                        let found = element
                            .children
                            .get(index)
                            .map_or_else(|| "end of element".to_string(), |c| c.qualified_name());
                        return Err(fail(format!(
                            "expected {}, found {found}",
                            particle.describe()
                        )));
                    }
                }
                if let Some(extra) = element.children.get(index) {
                    return Err(fail(format!(
                        "unexpected element {}",
                        extra.qualified_name()
                    )));
                }
                for child in &element.children {
                    self.validate_element(child, &path)?;
                }
            }
            Content::ForeignElements { min } => {
                if element.has_text() {
                    return Err(fail("character data not allowed here".to_string()));
                }
                if element.children.len() < min {
                    return Err(fail(format!("expected at least {min} child element(s)")));
                }
                for child in &element.children {
                    match child.namespace.as_deref() {
                        None | Some(SAML_NS | SAMLP_NS) => {
                            return Err(fail(format!(
                                "element {} must belong to a foreign namespace",
                                child.qualified_name()
                            )));
                        }
                        Some(_) => {}
                    }
                }
            }
            Content::Any => {}
        }

        Ok(())
    }
}

fn check_attribute_value(rule: &AttributeRule, value: &str) -> Result<(), String> {
    match rule.kind {
        AttributeType::String => Ok(()),
        AttributeType::Id if is_ncname(value) => Ok(()),
        AttributeType::Id => Err(format!("{} is not a valid identifier", rule.name)),
        AttributeType::DateTime if parse_instant(value).is_some() => Ok(()),
        AttributeType::DateTime => Err(format!("{} is not a valid xs:dateTime", rule.name)),
        AttributeType::Version if value == SAML_VERSION => Ok(()),
        AttributeType::Version => Err(format!("unsupported {} {value}", rule.name)),
    }
}

const RESPONSE: QName = QName {
    namespace: SAMLP_NS,
    local_name: "Response",
};
const STATUS: QName = QName {
    namespace: SAMLP_NS,
    local_name: "Status",
};
const STATUS_CODE: QName = QName {
    namespace: SAMLP_NS,
    local_name: "StatusCode",
};
const STATUS_MESSAGE: QName = QName {
    namespace: SAMLP_NS,
    local_name: "StatusMessage",
};
const STATUS_DETAIL: QName = QName {
    namespace: SAMLP_NS,
    local_name: "StatusDetail",
};
const EXTENSIONS: QName = QName {
    namespace: SAMLP_NS,
    local_name: "Extensions",
};
const ISSUER: QName = QName {
    namespace: SAML_NS,
    local_name: "Issuer",
};
const ASSERTION: QName = QName {
    namespace: SAML_NS,
    local_name: "Assertion",
};
const ENCRYPTED_ASSERTION: QName = QName {
    namespace: SAML_NS,
    local_name: "EncryptedAssertion",
};
const SIGNATURE: QName = QName {
    namespace: XMLDSIG_NS,
    local_name: "Signature",
};
const KEY_INFO: QName = QName {
    namespace: XMLDSIG_NS,
    local_name: "KeyInfo",
};
const ENCRYPTED_DATA: QName = QName {
    namespace: XMLENC_NS,
    local_name: "EncryptedData",
};
const ENCRYPTED_KEY: QName = QName {
    namespace: XMLENC_NS,
    local_name: "EncryptedKey",
};
const ENCRYPTION_METHOD: QName = QName {
    namespace: XMLENC_NS,
    local_name: "EncryptionMethod",
};
const CIPHER_DATA: QName = QName {
    namespace: XMLENC_NS,
    local_name: "CipherData",
};
const CIPHER_VALUE: QName = QName {
    namespace: XMLENC_NS,
    local_name: "CipherValue",
};
const CIPHER_REFERENCE: QName = QName {
    namespace: XMLENC_NS,
    local_name: "CipherReference",
};
const ENCRYPTION_PROPERTIES: QName = QName {
    namespace: XMLENC_NS,
    local_name: "EncryptionProperties",
};
const REFERENCE_LIST: QName = QName {
    namespace: XMLENC_NS,
    local_name: "ReferenceList",
};
const CARRIED_KEY_NAME: QName = QName {
    namespace: XMLENC_NS,
    local_name: "CarriedKeyName",
};

const fn optional(name: &'static str, kind: AttributeType) -> AttributeRule {
    AttributeRule {
        name,
        required: false,
        kind,
    }
}

const fn required(name: &'static str, kind: AttributeType) -> AttributeRule {
    AttributeRule {
        name,
        required: true,
        kind,
    }
}

static SAML20_RULES: &[ElementRule] = &[
    ElementRule {
        name: RESPONSE,
        attributes: &[
            required("ID", AttributeType::Id),
            required("Version", AttributeType::Version),
            required("IssueInstant", AttributeType::DateTime),
            optional("InResponseTo", AttributeType::Id),
            optional("Destination", AttributeType::String),
            optional("Consent", AttributeType::String),
        ],
        foreign_attributes: false,
        content: Content::Elements(&[
            Particle {
                names: &[ISSUER],
                min: 0,
                max: Some(1),
            },
            Particle {
                names: &[SIGNATURE],
                min: 0,
                max: Some(1),
            },
            Particle {
                names: &[EXTENSIONS],
                min: 0,
                max: Some(1),
            },
            Particle {
                names: &[STATUS],
                min: 1,
                max: Some(1),
            },
            Particle {
                names: &[ASSERTION, ENCRYPTED_ASSERTION],
                min: 0,
                max: None,
            },
        ]),
    },
    ElementRule {
        name: ISSUER,
        attributes: &[
            optional("NameQualifier", AttributeType::String),
            optional("SPNameQualifier", AttributeType::String),
            optional("Format", AttributeType::String),
            optional("SPProvidedID", AttributeType::String),
        ],
        foreign_attributes: false,
        content: Content::Text,
    },
    ElementRule {
        name: SIGNATURE,
        attributes: &[optional("Id", AttributeType::Id)],
        foreign_attributes: false,
        content: Content::Any,
    },
    ElementRule {
        name: EXTENSIONS,
        attributes: &[],
        foreign_attributes: false,
        content: Content::ForeignElements { min: 1 },
    },
    ElementRule {
        name: STATUS,
        attributes: &[],
        foreign_attributes: false,
        content: Content::Elements(&[
            Particle {
                names: &[STATUS_CODE],
                min: 1,
                max: Some(1),
            },
            Particle {
                names: &[STATUS_MESSAGE],
                min: 0,
                max: Some(1),
            },
            Particle {
                names: &[STATUS_DETAIL],
                min: 0,
                max: Some(1),
            },
        ]),
    },
    ElementRule {
        name: STATUS_CODE,
        attributes: &[required("Value", AttributeType::String)],
        foreign_attributes: false,
        content: Content::Elements(&[Particle {
            names: &[STATUS_CODE],
            min: 0,
            max: Some(1),
        }]),
    },
    ElementRule {
        name: STATUS_MESSAGE,
        attributes: &[],
        foreign_attributes: false,
        content: Content::Text,
    },
    ElementRule {
        name: STATUS_DETAIL,
        attributes: &[],
        foreign_attributes: true,
        content: Content::Any,
    },
    ElementRule {
        name: ASSERTION,
        attributes: &[
            required("ID", AttributeType::Id),
            required("Version", AttributeType::Version),
            required("IssueInstant", AttributeType::DateTime),
        ],
        foreign_attributes: false,
        content: Content::Any,
    },
    ElementRule {
        name: ENCRYPTED_ASSERTION,
        attributes: &[],
        foreign_attributes: false,
        content: Content::Elements(&[
            Particle {
                names: &[ENCRYPTED_DATA],
                min: 1,
                max: Some(1),
            },
            Particle {
                names: &[ENCRYPTED_KEY],
                min: 0,
                max: None,
            },
        ]),
    },
    ElementRule {
        name: ENCRYPTED_DATA,
        attributes: &[
            optional("Id", AttributeType::Id),
            optional("Type", AttributeType::String),
            optional("MimeType", AttributeType::String),
            optional("Encoding", AttributeType::String),
        ],
        foreign_attributes: false,
        content: Content::Elements(&[
            Particle {
                names: &[ENCRYPTION_METHOD],
                min: 0,
                max: Some(1),
            },
            Particle {
                names: &[KEY_INFO],
                min: 0,
                max: Some(1),
            },
            Particle {
                names: &[CIPHER_DATA],
                min: 1,
                max: Some(1),
            },
            Particle {
                names: &[ENCRYPTION_PROPERTIES],
                min: 0,
                max: Some(1),
            },
        ]),
    },
    ElementRule {
        name: ENCRYPTED_KEY,
        attributes: &[
            optional("Id", AttributeType::Id),
            optional("Type", AttributeType::String),
            optional("MimeType", AttributeType::String),
            optional("Encoding", AttributeType::String),
            optional("Recipient", AttributeType::String),
        ],
        foreign_attributes: false,
        content: Content::Elements(&[
            Particle {
                names: &[ENCRYPTION_METHOD],
                min: 0,
                max: Some(1),
            },
            Particle {
                names: &[KEY_INFO],
                min: 0,
                max: Some(1),
            },
            Particle {
                names: &[CIPHER_DATA],
                min: 1,
                max: Some(1),
            },
            Particle {
                names: &[ENCRYPTION_PROPERTIES],
                min: 0,
                max: Some(1),
            },
            Particle {
                names: &[REFERENCE_LIST],
                min: 0,
                max: Some(1),
            },
            Particle {
                names: &[CARRIED_KEY_NAME],
                min: 0,
                max: Some(1),
            },
        ]),
    },
    ElementRule {
        name: ENCRYPTION_METHOD,
        attributes: &[required("Algorithm", AttributeType::String)],
        foreign_attributes: false,
        content: Content::Any,
    },
    ElementRule {
        name: KEY_INFO,
        attributes: &[optional("Id", AttributeType::Id)],
        foreign_attributes: false,
        content: Content::Any,
    },
    ElementRule {
        name: CIPHER_DATA,
        attributes: &[],
        foreign_attributes: false,
        content: Content::Elements(&[Particle {
            names: &[CIPHER_VALUE, CIPHER_REFERENCE],
            min: 1,
            max: Some(1),
        }]),
    },
    ElementRule {
        name: CIPHER_VALUE,
        attributes: &[],
        foreign_attributes: false,
        content: Content::Text,
    },
    ElementRule {
        name: CIPHER_REFERENCE,
        attributes: &[required("URI", AttributeType::String)],
        foreign_attributes: false,
        content: Content::Any,
    },
    ElementRule {
        name: ENCRYPTION_PROPERTIES,
        attributes: &[optional("Id", AttributeType::Id)],
        foreign_attributes: false,
        content: Content::Any,
    },
    ElementRule {
        name: REFERENCE_LIST,
        attributes: &[],
        foreign_attributes: false,
        content: Content::Any,
    },
    ElementRule {
        name: CARRIED_KEY_NAME,
        attributes: &[],
        foreign_attributes: false,
        content: Content::Text,
    },
];
