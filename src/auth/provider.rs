//! Identity providers
//!
//! The OAuth/OIDC exchange happens in an identity-aware proxy in front of
//! the service; by the time a callback reaches us the identity is verified.

use crate::config::AuthConfig;
use crate::error::FintrackError;
use crate::Result;
use axum::http::HeaderMap;

#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedIdentity {
    pub email: String,
    pub name: Option<String>,
}

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn identify(&self, headers: &HeaderMap) -> Result<VerifiedIdentity>;
}

/// Reads the identity from headers set by a trusted proxy.
pub struct ProxyHeaderProvider {
    email_header: String,
    name_header: String,
}

impl ProxyHeaderProvider {
    pub fn new(email_header: impl Into<String>, name_header: impl Into<String>) -> Self {
        Self {
            email_header: email_header.into().to_lowercase(),
            name_header: name_header.into().to_lowercase(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.email_header, &config.name_header)
    }

    fn header(headers: &HeaderMap, name: &str) -> Option<String> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

#[async_trait::async_trait]
impl IdentityProvider for ProxyHeaderProvider {
    async fn identify(&self, headers: &HeaderMap) -> Result<VerifiedIdentity> {
        let email = Self::header(headers, &self.email_header).ok_or_else(|| {
            FintrackError::Unauthorized(format!("missing {} header", self.email_header))
        })?;
        if !email.contains('@') {
            return Err(FintrackError::Unauthorized(format!(
                "{} is not an email address",
                email
            )));
        }

        Ok(VerifiedIdentity {
            email,
            name: Self::header(headers, &self.name_header),
        })
    }
}
