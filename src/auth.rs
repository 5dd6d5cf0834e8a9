//! Token authentication
//!
//! GitLab accepts a personal/group/project access token either in the
//! `PRIVATE-TOKEN` header or as an OAuth-style bearer token.

use crate::config::{AuthScheme, GitLabConfig};
use crate::error::AuthError;
use crate::util::SecretString;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};

/// Authentication header attached to every request
#[derive(Debug, Clone)]
pub enum AuthHeader {
    /// `Authorization: Bearer <token>`
    Bearer(SecretString),
    /// `PRIVATE-TOKEN: <token>`
    PrivateToken(SecretString),
}

impl AuthHeader {
    /// Build the header from configuration
    pub fn from_config(config: &GitLabConfig) -> Result<Self, AuthError> {
        let token = config.token.clone().ok_or(AuthError::NotConfigured)?;
        Self::new(config.auth_scheme, token)
    }

    pub fn new(scheme: AuthScheme, token: SecretString) -> Result<Self, AuthError> {
        if token.is_blank() {
            return Err(AuthError::InvalidToken);
        }

        Ok(match scheme {
            AuthScheme::PrivateToken => AuthHeader::PrivateToken(token),
            AuthScheme::Bearer => AuthHeader::Bearer(token),
        })
    }

    /// Get the header name for this auth type
    pub fn header_name(&self) -> HeaderName {
        match self {
            AuthHeader::Bearer(_) => AUTHORIZATION,
            AuthHeader::PrivateToken(_) => HeaderName::from_static("private-token"),
        }
    }

    /// Get the header value, marked sensitive so it is never logged
    pub fn header_value(&self) -> Result<HeaderValue, AuthError> {
        let raw = match self {
            AuthHeader::Bearer(token) => format!("Bearer {}", token.expose_secret()),
            AuthHeader::PrivateToken(token) => token.expose_secret().to_string(),
        };

        let mut value = HeaderValue::from_str(&raw).map_err(|_| AuthError::InvalidToken)?;
        value.set_sensitive(true);
        Ok(value)
    }
}
