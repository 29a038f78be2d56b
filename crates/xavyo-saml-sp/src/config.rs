//! Service provider configuration loaded from environment variables.
//!
//! Loading is fail-fast: required variables must be present and valid, or
//! construction fails with a [`ConfigError`] naming the variable.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use url::Url;

pub const ENV_SP_ENTITY_ID: &str = "SAML_SP_ENTITY_ID";
pub const ENV_SP_CALLBACK_URL: &str = "SAML_SP_CALLBACK_URL";
pub const ENV_IDP_ENTITY_ID: &str = "SAML_IDP_ENTITY_ID";
pub const ENV_CLOCK_SKEW: &str = "SAML_ACCEPTED_CLOCK_SKEW_SECS";
pub const ENV_MESSAGE_LIFETIME: &str = "SAML_RESPONSE_MESSAGE_LIFETIME_SECS";
pub const ENV_MAX_AUTH_LIFETIME: &str = "SAML_MAXIMUM_AUTHENTICATION_LIFETIME_SECS";

/// Default accepted clock skew in seconds
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 2;

/// Default response message lifetime in seconds (15 minutes)
pub const DEFAULT_MESSAGE_LIFETIME_SECS: i64 = 900;

/// Default maximum age of the user's authentication in seconds (15 minutes)
pub const DEFAULT_MAX_AUTHENTICATION_LIFETIME_SECS: i64 = 900;

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Service provider settings used by the response pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpConfig {
    /// Entity ID of this service provider (the expected audience)
    pub sp_entity_id: String,

    /// Assertion consumer URL; responses must name it as `Destination`
    pub callback_url: String,

    /// Expected assertion issuer. When `None`, any trusted issuer is accepted.
    #[serde(default)]
    pub idp_entity_id: Option<String>,

    #[serde(default = "default_clock_skew")]
    pub accepted_clock_skew_secs: i64,

    #[serde(default = "default_message_lifetime")]
    pub response_message_lifetime_secs: i64,

    #[serde(default = "default_max_auth_lifetime")]
    pub maximum_authentication_lifetime_secs: i64,
}

fn default_clock_skew() -> i64 {
    DEFAULT_CLOCK_SKEW_SECS
}

fn default_message_lifetime() -> i64 {
    DEFAULT_MESSAGE_LIFETIME_SECS
}

fn default_max_auth_lifetime() -> i64 {
    DEFAULT_MAX_AUTHENTICATION_LIFETIME_SECS
}

impl SpConfig {
    /// Configuration with default timing parameters.
    pub fn new(
        sp_entity_id: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            sp_entity_id: sp_entity_id.into(),
            callback_url: callback_url.into(),
            idp_entity_id: None,
            accepted_clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
            response_message_lifetime_secs: DEFAULT_MESSAGE_LIFETIME_SECS,
            maximum_authentication_lifetime_secs: DEFAULT_MAX_AUTHENTICATION_LIFETIME_SECS,
        };
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_idp_entity_id(mut self, idp_entity_id: impl Into<String>) -> Self {
        self.idp_entity_id = Some(idp_entity_id.into());
        self
    }

    #[must_use]
    pub fn with_clock_skew_secs(mut self, secs: i64) -> Self {
        self.accepted_clock_skew_secs = secs;
        self
    }

    #[must_use]
    pub fn with_message_lifetime_secs(mut self, secs: i64) -> Self {
        self.response_message_lifetime_secs = secs;
        self
    }

    #[must_use]
    pub fn with_max_authentication_lifetime_secs(mut self, secs: i64) -> Self {
        self.maximum_authentication_lifetime_secs = secs;
        self
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
        };
        let seconds = |name: &str, default: i64| -> Result<i64, ConfigError> {
            match lookup(name).filter(|v| !v.trim().is_empty()) {
                None => Ok(default),
                Some(raw) => raw.trim().parse::<i64>().map_err(|e| ConfigError::InvalidValue {
                    var: name.to_string(),
                    message: e.to_string(),
                }),
            }
        };

        let config = Self {
            sp_entity_id: required(ENV_SP_ENTITY_ID)?,
            callback_url: required(ENV_SP_CALLBACK_URL)?,
            idp_entity_id: lookup(ENV_IDP_ENTITY_ID).filter(|v| !v.trim().is_empty()),
            accepted_clock_skew_secs: seconds(ENV_CLOCK_SKEW, DEFAULT_CLOCK_SKEW_SECS)?,
            response_message_lifetime_secs: seconds(
                ENV_MESSAGE_LIFETIME,
                DEFAULT_MESSAGE_LIFETIME_SECS,
            )?,
            maximum_authentication_lifetime_secs: seconds(
                ENV_MAX_AUTH_LIFETIME,
                DEFAULT_MAX_AUTHENTICATION_LIFETIME_SECS,
            )?,
        };
        config.validate()?;

        tracing::debug!(
            sp_entity_id = %config.sp_entity_id,
            callback_url = %config.callback_url,
            "SAML service provider configuration loaded"
        );

        Ok(config)
    }

    /// Check values that cannot be expressed in the type.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sp_entity_id.trim().is_empty() {
            return Err(ConfigError::MissingVar(ENV_SP_ENTITY_ID.to_string()));
        }

        let url = Url::parse(&self.callback_url).map_err(|e| ConfigError::InvalidValue {
            var: ENV_SP_CALLBACK_URL.to_string(),
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(ConfigError::InvalidValue {
                var: ENV_SP_CALLBACK_URL.to_string(),
                message: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        for (var, value) in [
            (ENV_CLOCK_SKEW, self.accepted_clock_skew_secs),
            (ENV_MESSAGE_LIFETIME, self.response_message_lifetime_secs),
            (ENV_MAX_AUTH_LIFETIME, self.maximum_authentication_lifetime_secs),
        ] {
            if value < 0 {
                return Err(ConfigError::InvalidValue {
                    var: var.to_string(),
                    message: "must not be negative".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::seconds(self.accepted_clock_skew_secs)
    }

    pub fn message_lifetime(&self) -> Duration {
        Duration::seconds(self.response_message_lifetime_secs)
    }

    pub fn maximum_authentication_lifetime(&self) -> Duration {
        Duration::seconds(self.maximum_authentication_lifetime_secs)
    }
}
