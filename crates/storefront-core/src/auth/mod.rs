//! Authentication module for the client-side session.
//!
//! This module provides:
//! - `SessionManager`: current-user state and the check/login/logout operations
//! - `TokenStore`: the persisted token (bearer or session cookie) the HTTP client attaches to requests
//!
//! Tokens are persisted in the cache directory and expire after 60 minutes.

pub mod session;
pub mod token;

use thiserror::Error;

use crate::api::ApiError;
use crate::validation::FieldErrors;

pub use session::{AuthStatus, SessionManager, SessionState};
pub use token::{StoredToken, TokenSource, TokenStore, ACCESS_COOKIE};

/// Why a login or registration did not go through.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Rejected locally; no request was made.
    #[error("Invalid input: {0}")]
    Validation(#[from] FieldErrors),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            AuthError::Validation(errors) => Some(errors),
            AuthError::Api(_) => None,
        }
    }

    /// Display message for this failure. Validation problems belong next to
    /// their fields, so they only contribute `fallback` here.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            AuthError::Validation(_) => fallback.to_string(),
            AuthError::Api(e) => e.user_message(fallback),
        }
    }
}
