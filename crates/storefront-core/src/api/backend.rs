use async_trait::async_trait;

use crate::models::{Credentials, Registration, User};

use super::{ApiClient, ApiError};

/// The backend calls the session manager depends on.
///
/// `ApiClient` is the real implementation; each method is one outbound request.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// `GET /api/auth/user`
    async fn current_user(&self) -> Result<User, ApiError>;

    /// `POST /api/auth/login`
    async fn login(&self, credentials: &Credentials) -> Result<User, ApiError>;

    /// `POST /api/auth/logout`
    async fn logout(&self) -> Result<(), ApiError>;

    /// `POST /api/users`
    async fn register(&self, registration: &Registration) -> Result<(), ApiError>;
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn current_user(&self) -> Result<User, ApiError> {
        self.fetch_current_user().await
    }

    async fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        ApiClient::login(self, credentials).await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        ApiClient::logout(self).await
    }

    async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        ApiClient::register(self, registration).await
    }
}
