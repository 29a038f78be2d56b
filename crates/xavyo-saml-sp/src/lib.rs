//! SAML 2.0 Service Provider library for xavyo
//!
//! Validates `SAMLResponse` messages delivered to an assertion consumer
//! endpoint over the HTTP-POST binding:
//! - Base64 decoding with input size limits
//! - Protocol schema validation (no DTDs, strict structure)
//! - Message lifetime and destination checks
//! - Status code interpretation
//! - Decryption of the single `EncryptedAssertion` (RSA-OAEP + AES-GCM/CBC)
//! - Enveloped signature verification under the SAML signature profile,
//!   against trust anchors only
//! - Assertion conditions, audience, subject confirmation and replay checks
//!
//! ```no_run
//! use std::sync::Arc;
//! use xavyo_saml_sp::{
//!     AuthResponseService, DecryptionCredential, IncomingResponse, SpConfig, TrustAnchorSet,
//! };
//!
//! # fn run(key_pem: &[u8], idp_cert_pem: &str, form_value: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let config = SpConfig::from_env()?;
//! let trust = TrustAnchorSet::new()
//!     .with_idp_signing_certificate("https://idp.example.com", idp_cert_pem)?;
//! let service = AuthResponseService::with_default_validator(
//!     &config,
//!     Arc::new(DecryptionCredential::from_pem(key_pem)?),
//!     Arc::new(trust),
//! );
//!
//! let result = service.authenticate(&IncomingResponse::new(form_value, &config.callback_url))?;
//! println!("authenticated {:?}", result.name_id);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod c14n;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod saml;
pub mod services;
pub mod session;
pub mod xml;

pub use config::{ConfigError, SpConfig};
pub use credentials::{
    Credential, CredentialCriteria, CredentialError, DecryptionCredential, KeyUsage,
    TrustAnchorResolver, TrustAnchorSet, TrustedEntity,
};
pub use error::{ErrorKind, ErrorVisibility, SamlError, SamlResult};
pub use models::AuthenticationResult;
pub use saml::{DecryptedAssertion, ParsedResponse, ResponseSchema, Status, StatusCode};
pub use services::{
    AssertionValidationError, AssertionValidator, AuthResponseService, DefaultAssertionValidator,
    IncomingResponse,
};
pub use session::{InMemoryRequestSessionStore, RequestSession, RequestSessionStore, SessionError};
