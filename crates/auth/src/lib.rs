//! Firebase Authentication client for NutriTrack
//!
//! This crate wraps the Identity Toolkit REST endpoints used by the app:
//! email/password sign-up and sign-in, Google credential exchange, account
//! lookup, and refresh-token exchange against the secure-token service.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors surfaced by the identity service.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The email/password pair was rejected.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Sign-up was attempted with an email that already has an account.
    #[error("email already in use")]
    EmailInUse,

    /// The server rejected the password; the message carries the server's
    /// requirement text.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// A federated credential exchange was requested without a token.
    #[error("missing federated ID token")]
    MissingToken,

    /// The account has been disabled upstream.
    #[error("user disabled")]
    UserDisabled,

    /// The refresh token was revoked or has expired.
    #[error("token expired or revoked")]
    TokenExpired,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The authenticated user's server-issued reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Response from `accounts:signUp`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpResponse {
    pub local_id: String,
    pub email: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    /// Token lifetime in seconds; the wire carries a decimal string.
    pub expires_in: String,
}

/// Response from `accounts:signInWithPassword`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub local_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: String,
    pub registered: Option<bool>,
}

/// Response from `accounts:signInWithIdp` (federated sign-in).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpSignInResponse {
    pub local_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: String,
    pub provider_id: Option<String>,
    pub is_new_user: Option<bool>,
}

/// Response from the secure-token refresh exchange. Unlike the account
/// endpoints this one is snake_case on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub id_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub expires_in: String,
}

/// A single account record from `accounts:lookup`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub local_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub email_verified: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    users: Option<Vec<AccountInfo>>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl SignUpResponse {
    pub fn identity(&self) -> Identity {
        Identity {
            uid: self.local_id.clone(),
            email: self.email.clone(),
            display_name: None,
            photo_url: None,
        }
    }
}

impl SignInResponse {
    pub fn identity(&self) -> Identity {
        Identity {
            uid: self.local_id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            photo_url: None,
        }
    }
}

impl IdpSignInResponse {
    pub fn identity(&self) -> Identity {
        Identity {
            uid: self.local_id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            photo_url: self.photo_url.clone(),
        }
    }
}

impl AccountInfo {
    pub fn identity(&self) -> Identity {
        Identity {
            uid: self.local_id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            photo_url: self.photo_url.clone(),
        }
    }
}

/// Client for the Firebase Authentication REST API.
pub struct AuthClient {
    /// Base URL of the Identity Toolkit API (`.../v1`).
    identity_url: String,
    /// Base URL of the secure-token service (`.../v1`).
    token_url: String,
    /// Web API key identifying the Firebase project.
    api_key: String,
    http_client: Client,
}

impl AuthClient {
    /// Create a new auth client.
    pub fn new(identity_url: &str, token_url: &str, api_key: &str, http_client: Client) -> Self {
        Self {
            identity_url: identity_url.trim_end_matches('/').to_string(),
            token_url: token_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http_client,
        }
    }

    fn account_url(&self, action: &str) -> String {
        format!("{}/accounts:{}", self.identity_url, action)
    }

    /// Create a new email/password account.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, AuthError> {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });

        let response = self
            .http_client
            .post(self.account_url("signUp"))
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;

        Self::parse(response).await
    }

    /// Sign in with an email/password pair.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignInResponse, AuthError> {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });

        let response = self
            .http_client
            .post(self.account_url("signInWithPassword"))
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;

        Self::parse(response).await
    }

    /// Exchange a federated provider's ID token for a Firebase credential.
    ///
    /// `provider_id` is the IdP identifier, e.g. `google.com`.
    pub async fn sign_in_with_idp(
        &self,
        provider_id: &str,
        id_token: &str,
    ) -> Result<IdpSignInResponse, AuthError> {
        let payload = serde_json::json!({
            "postBody": format!("id_token={}&providerId={}", id_token, provider_id),
            "requestUri": "http://localhost",
            "returnSecureToken": true,
            "returnIdpCredential": true,
        });

        let response = self
            .http_client
            .post(self.account_url("signInWithIdp"))
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;

        Self::parse(response).await
    }

    /// Fetch the account record behind an ID token.
    pub async fn lookup(&self, id_token: &str) -> Result<AccountInfo, AuthError> {
        let payload = serde_json::json!({ "idToken": id_token });

        let response = self
            .http_client
            .post(self.account_url("lookup"))
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;

        let lookup: LookupResponse = Self::parse(response).await?;
        lookup
            .users
            .and_then(|mut users| if users.is_empty() { None } else { Some(users.remove(0)) })
            .ok_or_else(|| AuthError::Api("lookup returned no account".to_string()))
    }

    /// Exchange a refresh token for a fresh ID token at the secure-token
    /// service. Used to restore a session at startup.
    pub async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshResponse, AuthError> {
        let url = format!("{}/token", self.token_url);

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        Self::parse(response).await
    }

    /// Build the Google OAuth authorization URL for interactive sign-in.
    ///
    /// A REST client cannot open a popup; callers on a browser-hosted
    /// runtime redirect to this URL and feed the resulting ID token to
    /// [`AuthClient::sign_in_with_idp`].
    pub fn google_auth_url(&self, client_id: &str, redirect_uri: &str) -> Result<Url, AuthError> {
        Url::parse_with_params(
            "https://accounts.google.com/o/oauth2/v2/auth",
            &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "id_token"),
                ("scope", "openid email profile"),
            ],
        )
        .map_err(|err| AuthError::Api(format!("invalid OAuth URL parameters: {}", err)))
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AuthError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            log::debug!("identity service rejected request: {} {}", status, body);
            Err(Self::error_from_body(status, &body))
        }
    }

    /// Map the Identity Toolkit error envelope onto the crate taxonomy.
    fn error_from_body(status: reqwest::StatusCode, body: &str) -> AuthError {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| body.to_string());

        // Codes may carry a trailing explanation, e.g.
        // "WEAK_PASSWORD : Password should be at least 6 characters".
        let code = message
            .split([':', ' '])
            .next()
            .unwrap_or("")
            .trim();

        match code {
            "EMAIL_EXISTS" => AuthError::EmailInUse,
            "WEAK_PASSWORD" => AuthError::WeakPassword(message),
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
                AuthError::InvalidCredentials
            }
            "USER_DISABLED" => AuthError::UserDisabled,
            "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" => AuthError::TokenExpired,
            _ => AuthError::Api(format!("{}: {}", status, message)),
        }
    }
}
