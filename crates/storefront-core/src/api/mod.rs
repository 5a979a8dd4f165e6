//! REST API client module for the storefront backend.
//!
//! This module provides the `ApiClient` for the auth endpoints, the
//! `AuthBackend` seam the session manager is written against, and the
//! `ApiError` type every failed call is reported with.
//!
//! Requests carry the token held in the local `TokenStore`: as a bearer header
//! when a login body issued it, or as the `access_token` cookie when the
//! backend set it as one.

pub mod backend;
pub mod client;
pub mod error;

pub use backend::AuthBackend;
pub use client::ApiClient;
pub use error::{normalize, ApiError, ErrorPayload};
