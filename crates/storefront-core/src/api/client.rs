//! HTTP client for the storefront REST backend.
//!
//! This module provides the `ApiClient` struct: thin `get`/`post` helpers that
//! attach the persisted token to every request, plus the auth endpoint calls
//! built on them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, multipart, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::{StoredToken, TokenSource, TokenStore, ACCESS_COOKIE};
use crate::config::Config;
use crate::models::{Credentials, Registration, User};

use super::ApiError;

// ============================================================================
// Endpoints
// ============================================================================

const CURRENT_USER_PATH: &str = "api/auth/user";
const LOGIN_PATH: &str = "api/auth/login";
const LOGOUT_PATH: &str = "api/auth/logout";
const REGISTER_PATH: &str = "api/users";

/// Body of a successful login. Older deployments wrap the user and hand back
/// a bearer token; the current backend answers with the bare user record and
/// sets the `access_token` cookie instead.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LoginResponse {
    Wrapped {
        user: User,
        #[serde(default)]
        access: Option<String>,
    },
    Bare(User),
}

impl LoginResponse {
    /// The user and the bearer token from the body, if any.
    fn into_parts(self) -> (User, Option<String>) {
        match self {
            LoginResponse::Wrapped { user, access } => (user, access),
            LoginResponse::Bare(user) => (user, None),
        }
    }
}

/// API client for the storefront backend.
/// Clone is cheap - reqwest::Client and the token store are shared.
///
/// There is no in-process cookie jar: the backend scopes its cookies to
/// `localhost`, and each CLI run is a new process, so the session cookie is
/// captured into the `TokenStore` at login and replayed from there.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: Arc<TokenStore>,
}

impl ApiClient {
    /// Create a client for `base_url`. Every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration, tokens: Arc<TokenStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub fn from_config(config: &Config, tokens: Arc<TokenStore>) -> Result<Self> {
        Self::new(&config.api_base_url(), config.request_timeout(), tokens)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Request interceptor: the persisted token, if any, sent back the way
    /// the backend issued it.
    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        let Some(token) = self.tokens.live_token() else {
            return Ok(headers);
        };

        let (name, value) = match token.source {
            TokenSource::Bearer => (header::AUTHORIZATION, format!("Bearer {}", token.access)),
            TokenSource::Cookie => (header::COOKIE, format!("{}={}", ACCESS_COOKIE, token.access)),
        };
        let value = header::HeaderValue::from_str(&value)
            .map_err(|_| ApiError::InvalidRequest("access token is not a valid header value".to_string()))?;
        headers.insert(name, value);
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, ApiError> {
        let response = request.headers(self.auth_headers()?).send().await?;
        debug!(url = url, status = %response.status(), "Response received");
        Self::check_response(response).await
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.send(self.client.get(&url), &url).await?;
        Self::parse_json(response, &url).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.send(self.client.post(&url).json(body), &url).await?;
        Self::parse_json(response, &url).await
    }

    /// POST without a body, ignoring whatever the backend answers with.
    pub async fn post_empty(&self, path: &str) -> Result<(), ApiError> {
        let url = self.url(path);
        self.send(self.client.post(&url), &url).await?;
        Ok(())
    }

    // ===== Auth Endpoints =====

    /// Who the backend thinks we are.
    pub async fn fetch_current_user(&self) -> Result<User, ApiError> {
        self.get(CURRENT_USER_PATH).await
    }

    /// Log in, persisting the token the backend hands back.
    ///
    /// An `access_token` cookie wins over a bearer token in the body, since
    /// the cookie is what the backend authenticates with.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        let url = self.url(LOGIN_PATH);
        let response = self.send(self.client.post(&url).json(credentials), &url).await?;
        let cookie = response
            .cookies()
            .find(|c| c.name() == ACCESS_COOKIE)
            .map(|c| c.value().to_string());

        let body: LoginResponse = Self::parse_json(response, &url).await?;
        let (user, bearer) = body.into_parts();

        let token = match (cookie, bearer) {
            (Some(cookie), _) => Some(StoredToken::cookie(cookie)),
            (None, Some(bearer)) => Some(StoredToken::bearer(bearer)),
            (None, None) => None,
        };
        match token {
            Some(token) => {
                debug!(source = ?token.source, "Storing access token");
                if let Err(e) = self.tokens.store(token) {
                    warn!(error = %e, "Failed to persist access token");
                }
            }
            None => debug!("Login response carried no access token"),
        }

        Ok(user)
    }

    /// Log out. The persisted token is dropped whatever the backend says.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self.post_empty(LOGOUT_PATH).await;

        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "Failed to clear access token");
        }

        result
    }

    /// Create an account. Sent as multipart so the avatar can ride along.
    pub async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        let mut form = multipart::Form::new()
            .text("email", registration.email.clone())
            .text("password", registration.password.clone())
            .text("confirm_password", registration.confirm_password.clone());

        if let Some(ref avatar) = registration.avatar {
            let part = multipart::Part::bytes(avatar.bytes.clone())
                .file_name(avatar.file_name.clone())
                .mime_str(&avatar.content_type)
                .map_err(|_| {
                    ApiError::InvalidRequest(format!("unsupported content type {}", avatar.content_type))
                })?;
            form = form.part("avatar", part);
        }

        let url = self.url(REGISTER_PATH);
        self.send(self.client.post(&url).multipart(form), &url).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::models::Avatar;

    fn client_for(server: &MockServer, tokens: Arc<TokenStore>) -> ApiClient {
        ApiClient::new(&server.uri(), Duration::from_secs(5), tokens)
            .expect("client should build")
    }

    #[test]
    fn test_url_joining() {
        let tokens = Arc::new(TokenStore::in_memory());
        let client = ApiClient::new("http://127.0.0.1:8000/", Duration::from_secs(1), tokens)
            .expect("client should build");
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");
        assert_eq!(client.url("api/auth/user"), "http://127.0.0.1:8000/api/auth/user");
        assert_eq!(client.url("/api/auth/user"), "http://127.0.0.1:8000/api/auth/user");
    }

    #[test]
    fn test_parse_login_response_shapes() {
        let wrapped: LoginResponse = serde_json::from_str(
            r#"{"user": {"id": "2", "email": "a@b.com"}, "access": "acc", "refresh": "ref"}"#,
        )
        .expect("wrapped login response should parse");
        let (user, token) = wrapped.into_parts();
        assert_eq!(user, User::new("2", "a@b.com"));
        assert_eq!(token.as_deref(), Some("acc"));

        let wrapped_no_token: LoginResponse =
            serde_json::from_str(r#"{"user": {"id": 2, "email": "a@b.com"}}"#)
                .expect("wrapped login response without tokens should parse");
        let (user, token) = wrapped_no_token.into_parts();
        assert_eq!(user.id, "2");
        assert!(token.is_none());

        let bare: LoginResponse = serde_json::from_str(r#"{"id": 5, "email": "c@d.com"}"#)
            .expect("bare user should parse");
        let (user, token) = bare.into_parts();
        assert_eq!(user, User::new("5", "c@d.com"));
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn test_fetch_current_user_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/user"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": 1, "email": "a@b.com"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tokens = Arc::new(TokenStore::in_memory());
        tokens
            .store(StoredToken::bearer("abc"))
            .expect("in-memory store cannot fail");

        let user = client_for(&server, tokens)
            .fetch_current_user()
            .await
            .expect("user should be returned");
        assert_eq!(user, User::new("1", "a@b.com"));
    }

    #[tokio::test]
    async fn test_fetch_current_user_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/user"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                json!({"detail": "Authentication credentials were not provided."}),
            ))
            .mount(&server)
            .await;

        let err = client_for(&server, Arc::new(TokenStore::in_memory()))
            .fetch_current_user()
            .await
            .expect_err("401 should be an error");
        assert!(err.is_unauthorized());
        assert_eq!(err.user_message("Not logged in"), "Not logged in");
    }

    #[tokio::test]
    async fn test_login_posts_credentials_and_stores_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(json!({"email": "a@b.com", "password": "Abcd123!"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": {"id": 2, "email": "a@b.com"},
                "access": "fresh-token"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = Arc::new(TokenStore::in_memory());
        let client = client_for(&server, tokens.clone());
        let user = client
            .login(&Credentials::new("a@b.com", "Abcd123!"))
            .await
            .expect("login should succeed");

        assert_eq!(user, User::new("2", "a@b.com"));
        assert_eq!(tokens.access_token().as_deref(), Some("fresh-token"));
        assert_eq!(tokens.token().map(|t| t.source), Some(TokenSource::Bearer));
    }

    #[tokio::test]
    async fn test_login_cookie_replayed_by_next_client() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "set-cookie",
                        "access_token=jwt; HttpOnly; Max-Age=3600; Domain=localhost; Path=/",
                    )
                    .set_body_json(json!({"id": 2, "email": "a@b.com"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/auth/user"))
            .and(header("cookie", "access_token=jwt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": 2, "email": "a@b.com"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/auth/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("temp dir");
        let first = client_for(&server, Arc::new(TokenStore::open(dir.path().to_path_buf())));
        first
            .login(&Credentials::new("a@b.com", "Abcd123!"))
            .await
            .expect("login should succeed");

        // A fresh process only has what was written under the cache dir.
        let second = client_for(&server, Arc::new(TokenStore::open(dir.path().to_path_buf())));
        let user = second
            .fetch_current_user()
            .await
            .expect("session cookie should be replayed");
        assert_eq!(user, User::new("2", "a@b.com"));
    }

    #[tokio::test]
    async fn test_login_persist_failure_keeps_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "access_token=jwt; HttpOnly; Path=/")
                    .set_body_json(json!({"id": 2, "email": "a@b.com"})),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = dir.path().join("cache");
        std::fs::write(&blocker, "not a directory").expect("write blocker file");
        let tokens = Arc::new(TokenStore::open(blocker));

        client_for(&server, tokens.clone())
            .login(&Credentials::new("a@b.com", "Abcd123!"))
            .await
            .expect("login should still succeed");
        assert_eq!(tokens.access_token().as_deref(), Some("jwt"));
    }

    #[tokio::test]
    async fn test_login_rejected_carries_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"details": "Invalid credentinals"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, Arc::new(TokenStore::in_memory()))
            .login(&Credentials::new("a@b.com", "Abcd123!"))
            .await
            .expect_err("login should fail");
        assert_eq!(err.status(), Some(reqwest::StatusCode::BAD_REQUEST));
        assert_eq!(err.user_message("Login failed"), "Invalid credentinals");
    }

    #[tokio::test]
    async fn test_login_with_unexpected_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let err = client_for(&server, Arc::new(TokenStore::in_memory()))
            .login(&Credentials::new("a@b.com", "Abcd123!"))
            .await
            .expect_err("non-JSON body should fail");
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_logout_clears_token_even_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = Arc::new(TokenStore::in_memory());
        tokens
            .store(StoredToken::bearer("abc"))
            .expect("in-memory store cannot fail");

        let result = client_for(&server, tokens.clone()).logout().await;
        assert!(result.is_err());
        assert!(tokens.access_token().is_none());
    }

    #[tokio::test]
    async fn test_logout_accepts_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server, Arc::new(TokenStore::in_memory()))
            .logout()
            .await
            .expect("204 should be success");
    }

    #[tokio::test]
    async fn test_register_posts_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/users"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let registration = Registration {
            email: "jane@shop.ng".to_string(),
            password: "Abcd123!".to_string(),
            confirm_password: "Abcd123!".to_string(),
            avatar: Some(Avatar {
                file_name: "me.png".to_string(),
                content_type: "image/png".to_string(),
                bytes: vec![0x89, b'P', b'N', b'G'],
            }),
        };

        client_for(&server, Arc::new(TokenStore::in_memory()))
            .register(&registration)
            .await
            .expect("registration should succeed");

        let requests = server
            .received_requests()
            .await
            .expect("request recording is enabled");
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"email\""));
        assert!(body.contains("jane@shop.ng"));
        assert!(body.contains("filename=\"me.png\""));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let tokens = Arc::new(TokenStore::in_memory());
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(2), tokens)
            .expect("client should build");

        let err = client
            .fetch_current_user()
            .await
            .expect_err("nothing listens on the discard port");
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(err.user_message("Login failed"), "Login failed");
    }
}
