//! XML Encryption structures carried in `saml:EncryptedAssertion`.

use super::constants::{XMLDSIG_NS, XMLENC11_NS, XMLENC_NS};
use crate::xml::XmlElement;

/// An `EncryptedAssertion` exactly as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedAssertion {
    pub encrypted_data: EncryptedData,
    /// `EncryptedKey` siblings of `EncryptedData`
    pub encrypted_keys: Vec<EncryptedKey>,
}

/// `xenc:EncryptedData`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    pub id: Option<String>,
    pub type_uri: Option<String>,
    pub method: Option<EncryptionMethod>,
    /// `EncryptedKey` elements placed inline in `ds:KeyInfo`
    pub inline_keys: Vec<EncryptedKey>,
    /// `ds:RetrievalMethod` URIs in `ds:KeyInfo`
    pub key_references: Vec<String>,
    pub cipher: CipherData,
}

/// `xenc:EncryptedKey`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedKey {
    pub id: Option<String>,
    pub recipient: Option<String>,
    pub method: Option<EncryptionMethod>,
    pub cipher: CipherData,
}

/// `xenc:EncryptionMethod` and the parameters SAML deployments use with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionMethod {
    pub algorithm: String,
    pub key_size: Option<String>,
    pub oaep_params: Option<String>,
    pub digest_method: Option<String>,
    pub mgf: Option<String>,
}

/// `xenc:CipherData`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherData {
    /// Base64 `CipherValue`, whitespace preserved
    Value(String),
    /// `CipherReference` URI; never dereferenced
    Reference(String),
}

impl EncryptedAssertion {
    /// Build from a schema-valid `saml:EncryptedAssertion` element.
    pub(crate) fn from_element(element: &XmlElement) -> Option<Self> {
        let encrypted_data = element
            .child(XMLENC_NS, "EncryptedData")
            .and_then(EncryptedData::from_element)?;
        let encrypted_keys = element
            .children_named(XMLENC_NS, "EncryptedKey")
            .filter_map(EncryptedKey::from_element)
            .collect();
        Some(Self {
            encrypted_data,
            encrypted_keys,
        })
    }
}

impl EncryptedData {
    fn from_element(element: &XmlElement) -> Option<Self> {
        let key_info = element.child(XMLDSIG_NS, "KeyInfo");
        let inline_keys = key_info
            .map(|ki| {
                ki.children_named(XMLENC_NS, "EncryptedKey")
                    .filter_map(EncryptedKey::from_element)
                    .collect()
            })
            .unwrap_or_default();
        let key_references = key_info
            .map(|ki| {
                ki.children_named(XMLDSIG_NS, "RetrievalMethod")
                    .filter_map(|rm| rm.attribute("URI").map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            id: element.attribute("Id").map(str::to_string),
            type_uri: element.attribute("Type").map(str::to_string),
            method: element
                .child(XMLENC_NS, "EncryptionMethod")
                .and_then(EncryptionMethod::from_element),
            inline_keys,
            key_references,
            cipher: CipherData::from_parent(element)?,
        })
    }
}

impl EncryptedKey {
    fn from_element(element: &XmlElement) -> Option<Self> {
        Some(Self {
            id: element.attribute("Id").map(str::to_string),
            recipient: element.attribute("Recipient").map(str::to_string),
            method: element
                .child(XMLENC_NS, "EncryptionMethod")
                .and_then(EncryptionMethod::from_element),
            cipher: CipherData::from_parent(element)?,
        })
    }
}

impl EncryptionMethod {
    fn from_element(element: &XmlElement) -> Option<Self> {
        Some(Self {
            algorithm: element.attribute("Algorithm")?.to_string(),
            key_size: element
                .child(XMLENC_NS, "KeySize")
                .map(|k| k.text_content().to_string()),
            oaep_params: element
                .child(XMLENC_NS, "OAEPparams")
                .map(|p| p.text_content().to_string()),
            digest_method: element
                .child(XMLDSIG_NS, "DigestMethod")
                .and_then(|d| d.attribute("Algorithm"))
                .map(str::to_string),
            mgf: element
                .child(XMLENC11_NS, "MGF")
                .and_then(|m| m.attribute("Algorithm"))
                .map(str::to_string),
        })
    }
}

impl CipherData {
    fn from_parent(parent: &XmlElement) -> Option<Self> {
        let cipher_data = parent.child(XMLENC_NS, "CipherData")?;
        if let Some(value) = cipher_data.child(XMLENC_NS, "CipherValue") {
            return Some(Self::Value(value.text.clone()));
        }
        cipher_data
            .child(XMLENC_NS, "CipherReference")
            .and_then(|r| r.attribute("URI"))
            .map(|uri| Self::Reference(uri.to_string()))
    }
}
