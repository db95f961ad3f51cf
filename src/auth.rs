//! One-shot login against the ingestion API.
//!
//! The worker logs in once at startup and keeps the bearer token for the rest
//! of the process. There is no refresh: a failed login is fatal to the caller.

use std::fmt;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::API_TIMEOUT;

// ---

/// Admin credentials read once at startup.
#[derive(Clone, Serialize)]
pub struct Credentials {
    // ---
    pub email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: String, password: String) -> Self {
        Credentials { email, password }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"****")
            .finish()
    }
}

/// Opaque bearer token for the primary receiver.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    // ---
    /// Wrap a raw token. Empty tokens are rejected.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            None
        } else {
            Some(AuthToken(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken(****)")
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("login rejected with HTTP {0}")]
    Rejected(StatusCode),

    #[error("login response could not be decoded: {0}")]
    Decode(String),

    #[error("login response carried an empty access token")]
    EmptyToken,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    access_token: String,
}

/// Exchange credentials for a bearer token.
///
/// Only HTTP 200 and 201 count as success. No retry happens here.
pub async fn login(
    client: &Client,
    credentials: &Credentials,
    login_url: &str,
) -> Result<AuthToken, AuthError> {
    // ---
    tracing::debug!(url = %login_url, email = %credentials.email, "Logging in");

    let response = client
        .post(login_url)
        .timeout(API_TIMEOUT)
        .json(credentials)
        .send()
        .await?;

    let status = response.status();
    if status != StatusCode::OK && status != StatusCode::CREATED {
        return Err(AuthError::Rejected(status));
    }

    let body = response.text().await?;
    let parsed: LoginResponse =
        serde_json::from_str(&body).map_err(|e| AuthError::Decode(e.to_string()))?;

    AuthToken::new(parsed.access_token).ok_or(AuthError::EmptyToken)
}
