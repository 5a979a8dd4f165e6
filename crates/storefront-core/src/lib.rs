//! Storefront session client.
//!
//! The client-side half of the storefront's authentication: a session manager
//! tracking who is logged in, the HTTP client it talks to the backend through,
//! form validation for the login and sign-up forms, and the normalizer that
//! turns any failure into a message fit for display.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod validation;

pub use api::{normalize, ApiClient, ApiError, AuthBackend};
pub use auth::{
    AuthError, AuthStatus, SessionManager, SessionState, StoredToken, TokenSource, TokenStore,
};
pub use config::Config;
pub use models::{Avatar, Credentials, Registration, User};
pub use validation::FieldErrors;
