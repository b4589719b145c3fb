//! Authenticated-session endpoints.
//!
//! Sessions are cookie-backed: a successful login sets the session cookie on
//! the shared client, and every later call carries it implicitly. Session
//! validity is always checked against the server — the presence of a cached
//! user record proves nothing.

use crate::http::{ApiClient, ApiError};
use freightline_core::model::UserProfile;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Registration payload for a new local account.
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Envelope the backend wraps every auth response in.
#[derive(Debug, Default, Deserialize)]
struct AuthResponse {
    #[allow(dead_code)]
    success: bool,
    message: Option<String>,
    user: Option<UserProfile>,
}

impl AuthResponse {
    fn into_user(self) -> Result<UserProfile, ApiError> {
        self.user.ok_or_else(|| {
            ApiError::Parse(format!(
                "auth response carried no user record: {}",
                self.message.unwrap_or_default()
            ))
        })
    }
}

impl ApiClient {
    /// Register a new local account and return its profile.
    pub async fn signup(&self, request: &SignupRequest) -> Result<UserProfile, ApiError> {
        let response: AuthResponse = self.post("/auth/signup", Some(request)).await?;
        response.into_user()
    }

    /// Authenticate with email and password.
    ///
    /// On success the session cookie is installed on this client. Invalid
    /// credentials surface as [`ApiError::Http`] with a 401 status.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        let request = LoginRequest { email, password };
        let response: AuthResponse = self.post("/auth/login", Some(&request)).await?;
        let user = response.into_user()?;
        info!(email = %user.email, "session established");
        Ok(user)
    }

    /// Invalidate the current server-side session.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let _: AuthResponse = self.post("/auth/logout", None::<&()>).await?;
        info!("session terminated");
        Ok(())
    }

    /// Fetch the user behind the current session, if the session is valid.
    ///
    /// A 401 means "no valid session" and maps to `Ok(None)`; every other
    /// failure propagates.
    pub async fn current_user(&self) -> Result<Option<UserProfile>, ApiError> {
        match self.get::<AuthResponse>("/auth/user").await {
            Ok(response) => Ok(response.user),
            Err(ApiError::Http { status }) if status == StatusCode::UNAUTHORIZED => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Server-validated session check.
    pub async fn is_authenticated(&self) -> Result<bool, ApiError> {
        Ok(self.current_user().await?.is_some())
    }
}
