//! End-to-end processing of an HTTP-POST `SAMLResponse`

use crate::config::SpConfig;
use crate::credentials::{DecryptionCredential, TrustAnchorResolver};
use crate::error::{SamlError, SamlResult};
use crate::models::AuthenticationResult;
use crate::saml::ResponseSchema;
use crate::services::assertion_extractor::AssertionExtractor;
use crate::services::assertion_validator::{AssertionValidator, DefaultAssertionValidator};
use crate::services::binding_validator::BindingValidator;
use crate::services::decoder::ResponseDecoder;
use crate::services::decrypter::AssertionDecrypter;
use crate::services::response_parser::ResponseParser;
use crate::services::signature_validator::SignatureValidator;
use crate::services::status_evaluator::StatusEvaluator;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::instrument;

/// What the assertion consumer endpoint received
#[derive(Debug, Clone, Copy, Default)]
pub struct IncomingResponse<'a> {
    /// The `SAMLResponse` form parameter
    pub saml_response: Option<&'a str>,
    /// The URL the request was received at
    pub received_endpoint: Option<&'a str>,
}

impl<'a> IncomingResponse<'a> {
    pub fn new(saml_response: &'a str, received_endpoint: &'a str) -> Self {
        Self {
            saml_response: Some(saml_response),
            received_endpoint: Some(received_endpoint),
        }
    }
}

/// Turns a `SAMLResponse` into an [`AuthenticationResult`].
///
/// Stages run in a fixed order and the first failure wins: decode, parse,
/// binding checks, status, assertion selection, decryption, signature,
/// assertion validation. Holds no mutable state; share it behind an `Arc`
/// or clone it.
#[derive(Clone)]
pub struct AuthResponseService {
    schema: ResponseSchema,
    binding: BindingValidator,
    decrypter: AssertionDecrypter,
    signatures: SignatureValidator,
    validator: Arc<dyn AssertionValidator>,
}

impl std::fmt::Debug for AuthResponseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResponseService")
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}

impl AuthResponseService {
    pub fn new(
        config: &SpConfig,
        decryption: Arc<DecryptionCredential>,
        resolver: Arc<dyn TrustAnchorResolver>,
        validator: Arc<dyn AssertionValidator>,
    ) -> Self {
        Self {
            schema: ResponseSchema::saml20(),
            binding: BindingValidator::new(
                config.callback_url.clone(),
                config.clock_skew(),
                config.message_lifetime(),
            ),
            decrypter: AssertionDecrypter::new(decryption),
            signatures: SignatureValidator::new(resolver),
            validator,
        }
    }

    /// Service using [`DefaultAssertionValidator`] built from `config`.
    pub fn with_default_validator(
        config: &SpConfig,
        decryption: Arc<DecryptionCredential>,
        resolver: Arc<dyn TrustAnchorResolver>,
    ) -> Self {
        let validator = Arc::new(DefaultAssertionValidator::new(config));
        Self::new(config, decryption, resolver, validator)
    }

    /// Replace the response schema.
    #[must_use]
    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Validate a response at the current time.
    pub fn authenticate(&self, request: &IncomingResponse<'_>) -> SamlResult<AuthenticationResult> {
        self.authenticate_at(request, Utc::now())
    }

    /// Validate a response as of `now`.
    #[instrument(skip_all, fields(received_endpoint = ?request.received_endpoint))]
    pub fn authenticate_at(
        &self,
        request: &IncomingResponse<'_>,
        now: DateTime<Utc>,
    ) -> SamlResult<AuthenticationResult> {
        let result = self.process(request, now);
        if let Err(e) = &result {
            tracing::debug!(
                error_code = e.error_code(),
                visibility = ?e.visibility(),
                "SAML response rejected"
            );
        }
        result
    }

    fn process(
        &self,
        request: &IncomingResponse<'_>,
        now: DateTime<Utc>,
    ) -> SamlResult<AuthenticationResult> {
        let raw = ResponseDecoder::decode_post(request.saml_response)?;
        let response = ResponseParser::parse(&raw, &self.schema)?;

        tracing::debug!(
            response_id = %response.id,
            issuer = ?response.issuer,
            in_response_to = ?response.in_response_to,
            "SAML response parsed"
        );

        self.binding
            .validate(&response, request.received_endpoint, now)?;
        StatusEvaluator::evaluate(&response.status)?;

        let encrypted = AssertionExtractor::extract(&response)?;
        let assertion = self.decrypter.decrypt(encrypted)?;
        self.signatures.validate(&assertion)?;

        self.validator.validate(&assertion, now).map_err(|e| {
            tracing::info!(
                assertion_id = %assertion.id,
                error = %e,
                "SAML assertion rejected by validator"
            );
            SamlError::AssertionValidation(e)
        })?;

        let result = AuthenticationResult::new(response.id, assertion);
        tracing::info!(
            response_id = %result.response_id,
            issuer = %result.issuer,
            "SAML authentication succeeded"
        );
        Ok(result)
    }
}
