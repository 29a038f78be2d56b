//! Common test utilities for SAML response tests
//!
//! Provides runtime-generated IdP and SP keys, an assertion builder that
//! signs with the enveloped exclusive-C14N profile, XML encryption for the
//! SP key and a response builder producing the `SAMLResponse` form value.
//!
//! # Usage
//!
//! ```ignore
//! use crate::security::common::*;
//!
//! let now = now();
//! let assertion = TestAssertion::new(now).signed();
//! let form_value = TestResponse::new(now).with_assertion(encrypt_assertion(&assertion)).encode();
//! let result = authenticate(&service(), &form_value, now);
//! ```

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::encrypt::Encrypter;
use openssl::hash::{hash, MessageDigest};
use openssl::pkey::{PKey, Private};
use openssl::rand::rand_bytes;
use openssl::rsa::{Padding, Rsa};
use openssl::sign::Signer;
use openssl::symm::{encrypt_aead, Cipher};
use openssl::x509::{X509NameBuilder, X509};
use std::sync::{Arc, Once, OnceLock};
use uuid::Uuid;
use xavyo_saml_sp::saml::constants::{
    digest_algorithms, encryption_algorithms, signature_algorithms, status_codes,
    transform_algorithms, SAMLP_NS, SAML_NS, XMLDSIG_NS, XMLENC_NS,
};
use xavyo_saml_sp::c14n::{canonicalize, C14nOptions};
use xavyo_saml_sp::{
    AssertionValidator, AuthResponseService, AuthenticationResult, DecryptionCredential,
    IncomingResponse, SamlResult, SpConfig, TrustAnchorSet,
};

pub const SP_ENTITY_ID: &str = "https://sp.example.com";
pub const CALLBACK_URL: &str = "https://sp.example.com/saml/acs";
pub const IDP_ENTITY_ID: &str = "https://idp.example.com";
pub const REQUEST_ID: &str = "_req-7d1f0c";

// ============================================================================
// Logging
// ============================================================================

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

// ============================================================================
// Keys
// ============================================================================

/// Key material shared by all tests
pub struct TestKeys {
    /// The trusted IdP signing key
    pub idp_signing: PKey<Private>,
    /// Self-signed certificate for `idp_signing`
    pub idp_certificate_pem: String,
    /// A signing key nobody trusts
    pub rogue_signing: PKey<Private>,
    /// The SP key assertions are encrypted for
    pub sp_decryption: PKey<Private>,
}

/// RSA generation is slow; generate once per test binary.
pub fn keys() -> &'static TestKeys {
    static KEYS: OnceLock<TestKeys> = OnceLock::new();
    KEYS.get_or_init(|| {
        let idp_signing = rsa_key();
        let certificate = self_signed_certificate(&idp_signing, "idp.example.com");
        TestKeys {
            idp_certificate_pem: String::from_utf8(certificate.to_pem().unwrap()).unwrap(),
            idp_signing,
            rogue_signing: rsa_key(),
            sp_decryption: rsa_key(),
        }
    })
}

fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

fn self_signed_certificate(key: &PKey<Private>, common_name: &str) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder.sign(key, MessageDigest::sha256()).unwrap();
    builder.build()
}

// ============================================================================
// Service
// ============================================================================

pub fn config() -> SpConfig {
    SpConfig::new(SP_ENTITY_ID, CALLBACK_URL)
        .unwrap()
        .with_idp_entity_id(IDP_ENTITY_ID)
}

pub fn trust_anchors() -> TrustAnchorSet {
    TrustAnchorSet::new()
        .with_idp_signing_certificate(IDP_ENTITY_ID, &keys().idp_certificate_pem)
        .unwrap()
}

pub fn decryption_credential() -> Arc<DecryptionCredential> {
    Arc::new(DecryptionCredential::from_key(keys().sp_decryption.clone()).unwrap())
}

/// Service with the default assertion validator and the test trust anchors.
pub fn service() -> AuthResponseService {
    init_test_logging();
    AuthResponseService::with_default_validator(
        &config(),
        decryption_credential(),
        Arc::new(trust_anchors()),
    )
}

/// Service with the default assertion validator trusting one IdP certificate.
pub fn service_trusting(certificate_pem: &str) -> AuthResponseService {
    init_test_logging();
    let trust = TrustAnchorSet::new()
        .with_idp_signing_certificate(IDP_ENTITY_ID, certificate_pem)
        .unwrap();
    AuthResponseService::with_default_validator(&config(), decryption_credential(), Arc::new(trust))
}

pub fn service_with_validator(validator: Arc<dyn AssertionValidator>) -> AuthResponseService {
    init_test_logging();
    AuthResponseService::new(
        &config(),
        decryption_credential(),
        Arc::new(trust_anchors()),
        validator,
    )
}

/// Post `form_value` to the callback URL as of `now`.
pub fn authenticate(
    service: &AuthResponseService,
    form_value: &str,
    now: DateTime<Utc>,
) -> SamlResult<AuthenticationResult> {
    service.authenticate_at(&IncomingResponse::new(form_value, CALLBACK_URL), now)
}

// ============================================================================
// Time
// ============================================================================

/// The current time at whole-second precision, as it appears in messages.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

pub fn instant(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn new_id() -> String {
    format!("_{}", Uuid::new_v4().simple())
}

// ============================================================================
// Assertions
// ============================================================================

/// Contents of a bearer assertion for the test SP
#[derive(Debug, Clone)]
pub struct TestAssertion {
    pub id: String,
    pub issuer: String,
    pub issue_instant: DateTime<Utc>,
    pub name_id: String,
    pub audience: String,
    pub recipient: String,
    pub in_response_to: Option<String>,
    pub authn_instant: DateTime<Utc>,
    pub session_index: String,
    /// `(Name, FriendlyName, values)`
    pub attributes: Vec<(String, Option<String>, Vec<String>)>,
}

impl TestAssertion {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            issuer: IDP_ENTITY_ID.to_string(),
            issue_instant: now,
            name_id: "alice@example.com".to_string(),
            audience: SP_ENTITY_ID.to_string(),
            recipient: CALLBACK_URL.to_string(),
            in_response_to: Some(REQUEST_ID.to_string()),
            authn_instant: now - Duration::seconds(30),
            session_index: "_session-1".to_string(),
            attributes: vec![
                (
                    "urn:oid:0.9.2342.19200300.100.1.3".to_string(),
                    Some("mail".to_string()),
                    vec!["alice@example.com".to_string()],
                ),
                (
                    "groups".to_string(),
                    None,
                    vec!["engineering".to_string(), "vpn-users".to_string()],
                ),
            ],
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.issuer = issuer.to_string();
        self
    }

    #[must_use]
    pub fn with_in_response_to(mut self, request_id: Option<&str>) -> Self {
        self.in_response_to = request_id.map(str::to_string);
        self
    }

    /// The assertion without a signature.
    pub fn to_xml(&self) -> String {
        let in_response_to = self
            .in_response_to
            .as_deref()
            .map(|id| format!(r#" InResponseTo="{id}""#))
            .unwrap_or_default();
        let not_before = instant(self.issue_instant - Duration::minutes(1));
        let not_on_or_after = instant(self.issue_instant + Duration::minutes(5));

        let mut attributes = String::new();
        for (name, friendly_name, values) in &self.attributes {
            let friendly_name = friendly_name
                .as_deref()
                .map(|f| format!(r#" FriendlyName="{f}""#))
                .unwrap_or_default();
            attributes.push_str(&format!(r#"<saml:Attribute Name="{name}"{friendly_name}>"#));
            for value in values {
                attributes.push_str(&format!("<saml:AttributeValue>{value}</saml:AttributeValue>"));
            }
            attributes.push_str("</saml:Attribute>");
        }
        let attribute_statement = if attributes.is_empty() {
            String::new()
        } else {
            format!("<saml:AttributeStatement>{attributes}</saml:AttributeStatement>")
        };

        format!(
            concat!(
                r#"<saml:Assertion xmlns:saml="{saml}" ID="{id}" Version="2.0" IssueInstant="{issued}">"#,
                r#"<saml:Issuer>{issuer}</saml:Issuer>"#,
                r#"<saml:Subject>"#,
                r#"<saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">{name_id}</saml:NameID>"#,
                r#"<saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">"#,
                r#"<saml:SubjectConfirmationData Recipient="{recipient}"{in_response_to} NotOnOrAfter="{not_on_or_after}"/>"#,
                r#"</saml:SubjectConfirmation>"#,
                r#"</saml:Subject>"#,
                r#"<saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{not_on_or_after}">"#,
                r#"<saml:AudienceRestriction><saml:Audience>{audience}</saml:Audience></saml:AudienceRestriction>"#,
                r#"</saml:Conditions>"#,
                r#"<saml:AuthnStatement AuthnInstant="{authn_instant}" SessionIndex="{session_index}">"#,
                r#"<saml:AuthnContext><saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport</saml:AuthnContextClassRef></saml:AuthnContext>"#,
                r#"</saml:AuthnStatement>"#,
                "{attribute_statement}",
                r#"</saml:Assertion>"#,
            ),
            saml = SAML_NS,
            id = self.id,
            issued = instant(self.issue_instant),
            issuer = self.issuer,
            name_id = self.name_id,
            recipient = self.recipient,
            in_response_to = in_response_to,
            not_before = not_before,
            not_on_or_after = not_on_or_after,
            audience = self.audience,
            authn_instant = instant(self.authn_instant),
            session_index = self.session_index,
            attribute_statement = attribute_statement,
        )
    }

    /// Signed by the trusted IdP key.
    pub fn signed(&self) -> String {
        self.signed_by(&keys().idp_signing)
    }

    pub fn signed_by(&self, key: &PKey<Private>) -> String {
        sign_assertion_xml(&self.to_xml(), &format!("#{}", self.id), key)
    }

    /// Signed by the trusted IdP key, with an arbitrary `Reference/@URI`.
    pub fn signed_with_reference(&self, reference_uri: &str) -> String {
        sign_assertion_xml(&self.to_xml(), reference_uri, &keys().idp_signing)
    }
}

/// Insert an enveloped RSA-SHA256 signature right after `saml:Issuer`.
///
/// The digest covers the unsigned assertion, which is exactly what the
/// enveloped-signature transform leaves once the signature is inserted.
pub fn sign_assertion_xml(unsigned: &str, reference_uri: &str, key: &PKey<Private>) -> String {
    let digest = hash(
        MessageDigest::sha256(),
        canonicalize(unsigned, &C14nOptions::exclusive())
            .unwrap()
            .as_bytes(),
    )
    .unwrap();

    let signed_info = format!(
        concat!(
            r#"<ds:SignedInfo xmlns:ds="{ds}">"#,
            r#"<ds:CanonicalizationMethod Algorithm="{c14n}"/>"#,
            r#"<ds:SignatureMethod Algorithm="{method}"/>"#,
            r#"<ds:Reference URI="{uri}">"#,
            r#"<ds:Transforms><ds:Transform Algorithm="{enveloped}"/><ds:Transform Algorithm="{c14n}"/></ds:Transforms>"#,
            r#"<ds:DigestMethod Algorithm="{digest_method}"/>"#,
            r#"<ds:DigestValue>{digest}</ds:DigestValue>"#,
            r#"</ds:Reference>"#,
            r#"</ds:SignedInfo>"#,
        ),
        ds = XMLDSIG_NS,
        c14n = transform_algorithms::EXCLUSIVE_C14N,
        method = signature_algorithms::RSA_SHA256,
        uri = reference_uri,
        enveloped = transform_algorithms::ENVELOPED_SIGNATURE,
        digest_method = digest_algorithms::SHA256,
        digest = STANDARD.encode(&digest[..]),
    );

    let mut signer = Signer::new(MessageDigest::sha256(), key).unwrap();
    signer
        .update(
            canonicalize(&signed_info, &C14nOptions::exclusive())
                .unwrap()
                .as_bytes(),
        )
        .unwrap();
    let signature_value = STANDARD.encode(signer.sign_to_vec().unwrap());

    // Inside the document the ds prefix is declared on ds:Signature.
    let signed_info = signed_info.replacen(&format!(r#" xmlns:ds="{XMLDSIG_NS}""#), "", 1);
    let signature = format!(
        r#"<ds:Signature xmlns:ds="{XMLDSIG_NS}">{signed_info}<ds:SignatureValue>{signature_value}</ds:SignatureValue></ds:Signature>"#
    );
    unsigned.replacen("</saml:Issuer>", &format!("</saml:Issuer>{signature}"), 1)
}

// ============================================================================
// Encryption
// ============================================================================

/// Encrypt for the SP key with AES-256-GCM and RSA-OAEP-MGF1P.
pub fn encrypt_assertion(assertion_xml: &str) -> String {
    encrypt_assertion_with(assertion_xml, |_| {})
}

/// Like [`encrypt_assertion`], letting `tamper` alter `IV || ciphertext || tag`.
pub fn encrypt_assertion_with(assertion_xml: &str, tamper: impl FnOnce(&mut Vec<u8>)) -> String {
    let mut content_key = [0u8; 32];
    rand_bytes(&mut content_key).unwrap();
    let mut iv = [0u8; 12];
    rand_bytes(&mut iv).unwrap();
    let mut tag = [0u8; 16];
    let ciphertext = encrypt_aead(
        Cipher::aes_256_gcm(),
        &content_key,
        Some(&iv),
        &[],
        assertion_xml.as_bytes(),
        &mut tag,
    )
    .unwrap();
    let mut payload = [&iv[..], &ciphertext[..], &tag[..]].concat();
    tamper(&mut payload);

    let mut encrypter = Encrypter::new(&keys().sp_decryption).unwrap();
    encrypter.set_rsa_padding(Padding::PKCS1_OAEP).unwrap();
    encrypter.set_rsa_oaep_md(MessageDigest::sha1()).unwrap();
    encrypter.set_rsa_mgf1_md(MessageDigest::sha1()).unwrap();
    let mut wrapped = vec![0u8; encrypter.encrypt_len(&content_key).unwrap()];
    let len = encrypter.encrypt(&content_key, &mut wrapped).unwrap();
    wrapped.truncate(len);

    format!(
        concat!(
            r#"<saml:EncryptedAssertion>"#,
            r#"<xenc:EncryptedData xmlns:xenc="{xenc}" Type="{element_type}">"#,
            r#"<xenc:EncryptionMethod Algorithm="{data_method}"/>"#,
            r#"<ds:KeyInfo xmlns:ds="{ds}">"#,
            r#"<xenc:EncryptedKey>"#,
            r#"<xenc:EncryptionMethod Algorithm="{key_method}"/>"#,
            r#"<xenc:CipherData><xenc:CipherValue>{wrapped}</xenc:CipherValue></xenc:CipherData>"#,
            r#"</xenc:EncryptedKey>"#,
            r#"</ds:KeyInfo>"#,
            r#"<xenc:CipherData><xenc:CipherValue>{payload}</xenc:CipherValue></xenc:CipherData>"#,
            r#"</xenc:EncryptedData>"#,
            r#"</saml:EncryptedAssertion>"#,
        ),
        xenc = XMLENC_NS,
        element_type = encryption_algorithms::TYPE_ELEMENT,
        data_method = encryption_algorithms::AES256_GCM,
        ds = XMLDSIG_NS,
        key_method = encryption_algorithms::RSA_OAEP_MGF1P,
        wrapped = STANDARD.encode(wrapped),
        payload = STANDARD.encode(payload),
    )
}

// ============================================================================
// Responses
// ============================================================================

/// A `samlp:Response` envelope
#[derive(Debug, Clone)]
pub struct TestResponse {
    pub id: String,
    pub issue_instant: DateTime<Utc>,
    pub destination: Option<String>,
    pub in_response_to: Option<String>,
    pub status_code: String,
    pub sub_status_code: Option<String>,
    pub status_message: Option<String>,
    /// Raw `EncryptedAssertion` or `Assertion` markup, in order
    pub assertions: Vec<String>,
}

impl TestResponse {
    pub fn new(issue_instant: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            issue_instant,
            destination: Some(CALLBACK_URL.to_string()),
            in_response_to: Some(REQUEST_ID.to_string()),
            status_code: status_codes::SUCCESS.to_string(),
            sub_status_code: None,
            status_message: None,
            assertions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_assertion(mut self, markup: String) -> Self {
        self.assertions.push(markup);
        self
    }

    #[must_use]
    pub fn with_destination(mut self, destination: Option<&str>) -> Self {
        self.destination = destination.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_status(mut self, code: &str, sub_code: Option<&str>, message: Option<&str>) -> Self {
        self.status_code = code.to_string();
        self.sub_status_code = sub_code.map(str::to_string);
        self.status_message = message.map(str::to_string);
        self
    }

    pub fn to_xml(&self) -> String {
        let mut attributes = format!(
            r#"ID="{}" Version="2.0" IssueInstant="{}""#,
            self.id,
            instant(self.issue_instant)
        );
        if let Some(destination) = &self.destination {
            attributes.push_str(&format!(r#" Destination="{destination}""#));
        }
        if let Some(in_response_to) = &self.in_response_to {
            attributes.push_str(&format!(r#" InResponseTo="{in_response_to}""#));
        }

        let status_code = match &self.sub_status_code {
            Some(sub) => format!(
                r#"<samlp:StatusCode Value="{}"><samlp:StatusCode Value="{sub}"/></samlp:StatusCode>"#,
                self.status_code
            ),
            None => format!(r#"<samlp:StatusCode Value="{}"/>"#, self.status_code),
        };
        let status_message = self
            .status_message
            .as_deref()
            .map(|m| format!("<samlp:StatusMessage>{m}</samlp:StatusMessage>"))
            .unwrap_or_default();

        format!(
            r#"<samlp:Response xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" {attributes}><saml:Issuer>{IDP_ENTITY_ID}</saml:Issuer><samlp:Status>{status_code}{status_message}</samlp:Status>{}</samlp:Response>"#,
            self.assertions.concat()
        )
    }

    /// The `SAMLResponse` form value.
    pub fn encode(&self) -> String {
        STANDARD.encode(self.to_xml())
    }
}

/// Form value of a valid response carrying `assertion`, signed and encrypted.
pub fn valid_response(assertion: &TestAssertion) -> String {
    TestResponse::new(assertion.issue_instant)
        .with_assertion(encrypt_assertion(&assertion.signed()))
        .encode()
}
