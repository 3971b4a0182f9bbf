//! NutriTrack Rust Client Library
//!
//! A Rust client for the NutriTrack Firebase backend: email/password and
//! Google authentication through the identity service, per-user profile
//! documents and meal logging through the document store.
//!
//! ```no_run
//! use nutritrack::prelude::*;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = FirebaseConfig::new("web-api-key", "nutritrack-prod");
//! let client = NutriTrack::new(config);
//!
//! let _watch = client.session().subscribe(|identity| match identity {
//!     Some(identity) => println!("signed in as {}", identity.uid),
//!     None => println!("signed out"),
//! });
//!
//! client.session().sign_in("jane@x.com", "password").await?;
//! let profile = client.profiles().read(
//!     &client.session().current_identity().unwrap().uid,
//! ).await?;
//! println!("walked {} km", profile.stats.walking);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod meals;
pub mod profile;
pub mod session;

use reqwest::Client;

use crate::config::{ClientOptions, FirebaseConfig};
use crate::meals::MealLog;
use crate::profile::ProfileStore;
use crate::session::SessionManager;

pub use nutritrack_auth::{AuthClient, AuthError, Identity};
pub use nutritrack_firestore::{
    Document, FieldValue, Fields, FirestoreClient, FirestoreError,
};

/// The main entry point for the NutriTrack client.
pub struct NutriTrack {
    /// Connection settings for the Firebase project
    pub config: FirebaseConfig,
    /// Client options
    pub options: ClientOptions,
    /// HTTP client shared by all sub-clients
    pub http_client: Client,
    firestore: FirestoreClient,
    session: SessionManager,
}

impl NutriTrack {
    /// Create a new client with default options.
    ///
    /// # Example
    ///
    /// ```
    /// use nutritrack::{NutriTrack, config::FirebaseConfig};
    ///
    /// let client = NutriTrack::new(FirebaseConfig::new("web-api-key", "my-project"));
    /// ```
    pub fn new(config: FirebaseConfig) -> Self {
        Self::with_options(config, ClientOptions::default())
    }

    /// Create a new client with custom options.
    pub fn with_options(config: FirebaseConfig, options: ClientOptions) -> Self {
        let http_client = match options.request_timeout {
            Some(timeout) => Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            None => Client::new(),
        };

        let auth = AuthClient::new(
            &config.identity_url,
            &config.secure_token_url,
            &config.api_key,
            http_client.clone(),
        );
        let firestore = FirestoreClient::new(
            &config.firestore_url,
            &config.project_id,
            http_client.clone(),
        );
        let session = SessionManager::new(auth, firestore.clone(), options.clone());

        Self {
            config,
            options,
            http_client,
            firestore,
            session,
        }
    }

    /// The session manager: authentication state, sign-in/up/out and
    /// identity-change subscriptions.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Accessor for per-user profile documents. Document requests carry the
    /// session's current ID token automatically.
    pub fn profiles(&self) -> ProfileStore {
        ProfileStore::new(self.firestore.clone())
    }

    /// Accessor for the append-only meal log.
    pub fn meals(&self) -> MealLog {
        MealLog::new(self.firestore.clone())
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::config::{ClientOptions, FirebaseConfig};
    pub use crate::error::Error;
    pub use crate::meals::{MealEntry, MealLog, MealType};
    pub use crate::profile::{ProfileDocument, ProfileSeed, ProfileStore, Stats};
    pub use crate::session::{AuthState, Session, SessionManager, Subscription};
    pub use crate::{Identity, NutriTrack};
}
