//! Error handling for the NutriTrack client

use std::fmt;

use thiserror::Error;

use nutritrack_auth::AuthError;
use nutritrack_firestore::FirestoreError;

/// Unified error type for the NutriTrack client.
#[derive(Error, Debug)]
pub enum Error {
    /// Identity service errors (bad credentials, email in use, ...)
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Document store errors (not found, permission denied, unavailable)
    #[error("store error: {0}")]
    Store(#[from] FirestoreError),

    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A profile document failed boundary validation
    #[error("profile error: {0}")]
    Profile(String),

    /// Missing or malformed client configuration
    #[error("config error: {0}")]
    Config(String),

    /// An identity exists without a matching profile document. The caller
    /// holds a signed-in session and should reconcile by re-creating the
    /// profile.
    #[error("identity {uid} is missing its profile document: {source}")]
    ConsistencyGap {
        uid: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a new profile validation error
    pub fn profile<T: fmt::Display>(msg: T) -> Self {
        Error::Profile(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Wrap a failure that left an identity without a profile document
    pub fn consistency_gap(uid: &str, source: impl Into<Error>) -> Self {
        Error::ConsistencyGap {
            uid: uid.to_string(),
            source: Box::new(source.into()),
        }
    }
}
