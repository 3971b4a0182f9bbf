//! Configuration for the NutriTrack client

use std::env;
use std::time::Duration;

use crate::error::Error;

const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";
const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

/// Connection settings for the app's Firebase project.
///
/// Endpoint URLs default to the public Google endpoints; overrides exist for
/// emulators and tests.
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    /// Web API key identifying the project.
    pub api_key: String,

    /// Firebase project id (the Firestore database lives under it).
    pub project_id: String,

    /// Base URL of the Identity Toolkit API.
    pub identity_url: String,

    /// Base URL of the secure-token (refresh) service.
    pub secure_token_url: String,

    /// Base URL of the Firestore REST API.
    pub firestore_url: String,
}

impl FirebaseConfig {
    /// Create a config pointing at the production Google endpoints.
    pub fn new(api_key: &str, project_id: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            project_id: project_id.to_string(),
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            secure_token_url: DEFAULT_TOKEN_URL.to_string(),
            firestore_url: DEFAULT_FIRESTORE_URL.to_string(),
        }
    }

    /// Load the config from `FIREBASE_API_KEY` / `FIREBASE_PROJECT_ID`,
    /// with optional `FIREBASE_IDENTITY_URL`, `FIREBASE_TOKEN_URL` and
    /// `FIREBASE_FIRESTORE_URL` endpoint overrides.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = env::var("FIREBASE_API_KEY")
            .map_err(|_| Error::config("FIREBASE_API_KEY is not set"))?;
        let project_id = env::var("FIREBASE_PROJECT_ID")
            .map_err(|_| Error::config("FIREBASE_PROJECT_ID is not set"))?;

        let mut config = Self::new(&api_key, &project_id);
        if let Ok(value) = env::var("FIREBASE_IDENTITY_URL") {
            config.identity_url = value;
        }
        if let Ok(value) = env::var("FIREBASE_TOKEN_URL") {
            config.secure_token_url = value;
        }
        if let Ok(value) = env::var("FIREBASE_FIRESTORE_URL") {
            config.firestore_url = value;
        }
        Ok(config)
    }

    /// Override the Identity Toolkit endpoint.
    pub fn with_identity_url(mut self, value: &str) -> Self {
        self.identity_url = value.to_string();
        self
    }

    /// Override the secure-token endpoint.
    pub fn with_secure_token_url(mut self, value: &str) -> Self {
        self.secure_token_url = value.to_string();
        self
    }

    /// Override the Firestore endpoint.
    pub fn with_firestore_url(mut self, value: &str) -> Self {
        self.firestore_url = value.to_string();
        self
    }
}

/// Behavioral options for the client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout applied to the shared HTTP client.
    pub request_timeout: Option<Duration>,

    /// OAuth web client id used to build the interactive Google sign-in URL.
    pub google_client_id: Option<String>,

    /// Redirect URI registered for the Google OAuth flow.
    pub google_redirect_uri: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            google_client_id: None,
            google_redirect_uri: None,
        }
    }
}

impl ClientOptions {
    /// Set the request timeout.
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the Google OAuth web client id.
    pub fn with_google_client_id(mut self, value: &str) -> Self {
        self.google_client_id = Some(value.to_string());
        self
    }

    /// Set the Google OAuth redirect URI.
    pub fn with_google_redirect_uri(mut self, value: &str) -> Self {
        self.google_redirect_uri = Some(value.to_string());
        self
    }
}
