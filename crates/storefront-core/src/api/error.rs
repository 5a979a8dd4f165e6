use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The backend answered with a non-success status.
    #[error("Request failed with status {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
        payload: Option<ErrorPayload>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Structured error body the backend sends with 4xx answers,
/// e.g. `{"details": "Invalid credentials"}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl ErrorPayload {
    /// The `details` value as display text. Strings are returned verbatim,
    /// other JSON values in compact form. `null` counts as absent.
    pub fn details_text(&self) -> Option<String> {
        match self.details.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let payload = serde_json::from_str::<ErrorPayload>(body).ok();
        ApiError::Http {
            status,
            body: Self::truncate_body(body),
            payload,
        }
    }

    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Network(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self.status(),
            Some(reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN)
        )
    }

    /// The message to show a user for this failure.
    ///
    /// Only a backend answer carrying a `details` field says anything fit for
    /// display; every other shape yields `fallback` unchanged.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Http {
                payload: Some(payload),
                ..
            } => payload
                .details_text()
                .unwrap_or_else(|| fallback.to_string()),
            ApiError::Http { payload: None, .. }
            | ApiError::Network(_)
            | ApiError::InvalidResponse(_)
            | ApiError::InvalidRequest(_) => fallback.to_string(),
        }
    }
}

/// Turn any failure into a display string.
///
/// Walks the error chain looking for an [`ApiError`] (directly, or wrapped in
/// an [`AuthError`](crate::auth::AuthError)); anything unrecognized yields
/// `fallback`.
pub fn normalize(error: &anyhow::Error, fallback: &str) -> String {
    for cause in error.chain() {
        if let Some(api) = cause.downcast_ref::<ApiError>() {
            return api.user_message(fallback);
        }
        if let Some(auth) = cause.downcast_ref::<crate::auth::AuthError>() {
            return auth.user_message(fallback);
        }
    }
    fallback.to_string()
}
