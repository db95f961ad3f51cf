//! HTTP delivery of transformed payloads to the receivers.
//!
//! Each [`Receiver`] knows its URL, whether it carries the bearer token, and
//! which status codes it counts as accepted. The [`DeliveryClient`] makes a
//! single POST and classifies the outcome; retrying is left to the caller.

use reqwest::{header, Client, StatusCode};
use thiserror::Error;

use crate::auth::AuthToken;
use crate::config::API_TIMEOUT;
use crate::models::ReceiverPayload;

/// Longest response body kept on a status failure.
const BODY_SNIPPET_MAX: usize = 512;

// ---

/// Status codes a receiver treats as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Exactly 200 or 201.
    OkOrCreated,
    /// Any 2xx.
    AnySuccess,
}

impl Acceptance {
    pub fn accepts(self, status: StatusCode) -> bool {
        match self {
            Acceptance::OkOrCreated => status == StatusCode::OK || status == StatusCode::CREATED,
            Acceptance::AnySuccess => status.is_success(),
        }
    }
}

/// A downstream HTTP endpoint that takes receiver payloads.
#[derive(Debug, Clone)]
pub struct Receiver {
    // ---
    pub name: &'static str,
    pub url: String,
    pub token: Option<AuthToken>,
    pub acceptance: Acceptance,
}

impl Receiver {
    // ---
    /// Ingestion API: bearer token attached, 200/201 only.
    pub fn primary(url: impl Into<String>, token: AuthToken) -> Self {
        Receiver {
            name: "primary",
            url: url.into(),
            token: Some(token),
            acceptance: Acceptance::OkOrCreated,
        }
    }

    /// Best-effort fan-out target: no auth, any 2xx.
    pub fn secondary(url: impl Into<String>) -> Self {
        Receiver {
            name: "secondary",
            url: url.into(),
            token: None,
            acceptance: Acceptance::AnySuccess,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("receiver returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Sends payloads over a shared HTTP client.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    http: Client,
}

impl DeliveryClient {
    // ---
    pub fn new(http: Client) -> Self {
        DeliveryClient { http }
    }

    /// POST `payload` to `receiver` once.
    pub async fn deliver(
        &self,
        receiver: &Receiver,
        payload: &ReceiverPayload,
    ) -> Result<(), DeliveryError> {
        // ---
        let body = serde_json::to_vec(payload)?;

        let mut request = self
            .http
            .post(&receiver.url)
            .timeout(API_TIMEOUT)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &receiver.token {
            request = request.bearer_auth(token.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if receiver.acceptance.accepts(status) {
            tracing::debug!(receiver = receiver.name, status = status.as_u16(), "Delivered");
            return Ok(());
        }

        // Body is diagnostic only; a read failure leaves it empty.
        let text = response.text().await.unwrap_or_default();
        Err(DeliveryError::Status {
            status: status.as_u16(),
            body: snippet(&text).to_string(),
        })
    }
}

/// Cut `text` to at most [`BODY_SNIPPET_MAX`] bytes on a char boundary.
fn snippet(text: &str) -> &str {
    // ---
    if text.len() <= BODY_SNIPPET_MAX {
        return text;
    }
    let mut end = BODY_SNIPPET_MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
