//! SAML response processing services

pub mod assertion_extractor;
pub mod assertion_validator;
pub mod binding_validator;
pub mod decoder;
pub mod decrypter;
pub mod response_parser;
pub mod response_service;
pub mod signature_validator;
pub mod status_evaluator;

pub use assertion_extractor::AssertionExtractor;
pub use assertion_validator::{AssertionValidationError, AssertionValidator, DefaultAssertionValidator};
pub use binding_validator::BindingValidator;
pub use decoder::{RawMessage, ResponseDecoder, MAX_ENCODED_SIZE_POST};
pub use decrypter::{AssertionDecrypter, DecryptionError};
pub use response_parser::ResponseParser;
pub use response_service::{AuthResponseService, IncomingResponse};
pub use signature_validator::{SignatureError, SignatureProfile, SignatureProfileValidator, SignatureValidator};
pub use status_evaluator::StatusEvaluator;
