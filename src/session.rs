//! Session management and authentication orchestration
//!
//! The session manager owns the process-wide authentication state: it wraps
//! the identity service calls, keeps the current [`Session`] and
//! [`Identity`], seeds the profile document on sign-up and first federated
//! sign-in, and notifies subscribers on every identity change.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use url::Url;

use nutritrack_auth::{AuthClient, AuthError, Identity};
use nutritrack_firestore::FirestoreClient;

use crate::config::ClientOptions;
use crate::error::Error;
use crate::profile::{ProfileSeed, ProfileStore};

/// Authentication state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    Authenticating,
    SignedIn,
}

/// Token material for the current signed-in identity. Serializable so the
/// host app can persist the refresh token across launches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id_token: String,
    pub refresh_token: String,
    pub uid: String,
    /// Unix timestamp after which the ID token is stale.
    pub expires_at: Option<i64>,
}

impl Session {
    pub fn new(id_token: String, refresh_token: String, uid: String, expires_in: i64) -> Self {
        Self {
            id_token,
            refresh_token,
            uid,
            expires_at: Some(unix_now() + expires_in),
        }
    }

    /// Check if the ID token has expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => unix_now() >= expires_at,
            None => false,
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

/// The wire carries token lifetimes as decimal strings.
fn parse_expires_in(text: &str) -> i64 {
    text.parse().unwrap_or(3600)
}

type IdentityCallback = Arc<dyn Fn(Option<&Identity>) + Send + Sync>;

struct Current {
    state: AuthState,
    session: Option<Session>,
    identity: Option<Identity>,
}

struct Shared {
    current: Mutex<Current>,
    subscribers: Mutex<HashMap<u64, IdentityCallback>>,
    next_subscriber: AtomicU64,
    /// Serializes state transitions and their notifications so subscribers
    /// observe changes in transition order, one notification per change.
    ordering: Mutex<()>,
    /// True until the startup restore attempt has resolved.
    initializing: AtomicBool,
}

/// Handle for an identity-change subscription. Unsubscribes on drop.
pub struct Subscription {
    id: u64,
    shared: Arc<Shared>,
}

impl Subscription {
    /// Remove the subscription explicitly.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut subscribers = self.shared.subscribers.lock().unwrap();
        subscribers.remove(&self.id);
    }
}

/// Orchestrates sign-in, sign-up, federated sign-in, sign-out and session
/// restore, and owns the observer registry for identity changes.
pub struct SessionManager {
    auth: AuthClient,
    profiles: ProfileStore,
    store: FirestoreClient,
    options: ClientOptions,
    shared: Arc<Shared>,
}

impl SessionManager {
    pub(crate) fn new(auth: AuthClient, store: FirestoreClient, options: ClientOptions) -> Self {
        Self {
            auth,
            profiles: ProfileStore::new(store.clone()),
            store,
            options,
            shared: Arc::new(Shared {
                current: Mutex::new(Current {
                    state: AuthState::SignedOut,
                    session: None,
                    identity: None,
                }),
                subscribers: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(0),
                ordering: Mutex::new(()),
                initializing: AtomicBool::new(true),
            }),
        }
    }

    /// Sign in with an email/password pair.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, Error> {
        self.begin_authenticating();

        let response = match self.auth.sign_in_with_password(email, password).await {
            Ok(response) => response,
            Err(err) => {
                self.transition_signed_out();
                return Err(err.into());
            }
        };

        let identity = response.identity();
        let session = Session::new(
            response.id_token,
            response.refresh_token,
            response.local_id,
            parse_expires_in(&response.expires_in),
        );
        self.transition_signed_in(session, identity.clone());
        log::debug!("signed in as {}", identity.uid);
        Ok(identity)
    }

    /// Create an account, then create its profile document seeded from
    /// `seed`.
    ///
    /// If the account is created but the profile write fails, the caller is
    /// left signed in and receives [`Error::ConsistencyGap`];
    /// [`ProfileStore::ensure`] reconciles the gap on next access.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        seed: ProfileSeed,
    ) -> Result<Identity, Error> {
        self.begin_authenticating();

        let response = match self.auth.sign_up(email, password).await {
            Ok(response) => response,
            Err(err) => {
                self.transition_signed_out();
                return Err(err.into());
            }
        };

        let identity = response.identity();
        let session = Session::new(
            response.id_token,
            response.refresh_token,
            response.local_id,
            parse_expires_in(&response.expires_in),
        );
        self.transition_signed_in(session, identity.clone());

        let mut seed = seed;
        if seed.email.is_none() {
            seed.email = identity.email.clone().or_else(|| Some(email.to_string()));
        }

        if let Err(err) = self.profiles.create(&identity.uid, &seed).await {
            log::warn!(
                "account {} created but profile seeding failed: {}",
                identity.uid,
                err
            );
            return Err(Error::consistency_gap(&identity.uid, err));
        }

        log::debug!("signed up {}", identity.uid);
        Ok(identity)
    }

    /// Sign in with a pre-obtained Google ID token and upsert the profile
    /// from the federated name/email/photo.
    ///
    /// Interactive runtimes obtain the token by redirecting to
    /// [`SessionManager::google_auth_url`]; passing `None` here fails with
    /// [`AuthError::MissingToken`].
    pub async fn sign_in_with_google(&self, id_token: Option<&str>) -> Result<Identity, Error> {
        let id_token = id_token.ok_or(AuthError::MissingToken)?;

        self.begin_authenticating();

        let response = match self.auth.sign_in_with_idp("google.com", id_token).await {
            Ok(response) => response,
            Err(err) => {
                self.transition_signed_out();
                return Err(err.into());
            }
        };

        let identity = response.identity();
        let session = Session::new(
            response.id_token,
            response.refresh_token,
            response.local_id,
            parse_expires_in(&response.expires_in),
        );
        self.transition_signed_in(session, identity.clone());

        if let Err(err) = self
            .profiles
            .upsert_federated(
                &identity.uid,
                identity.display_name.as_deref(),
                identity.email.as_deref(),
                identity.photo_url.as_deref(),
            )
            .await
        {
            log::warn!(
                "federated sign-in for {} succeeded but profile upsert failed: {}",
                identity.uid,
                err
            );
            return Err(Error::consistency_gap(&identity.uid, err));
        }

        Ok(identity)
    }

    /// The Google OAuth URL for interactive sign-in, built from the
    /// configured web client id and redirect URI.
    pub fn google_auth_url(&self) -> Result<Url, Error> {
        let client_id = self
            .options
            .google_client_id
            .as_deref()
            .ok_or_else(|| Error::config("google_client_id is not configured"))?;
        let redirect_uri = self
            .options
            .google_redirect_uri
            .as_deref()
            .ok_or_else(|| Error::config("google_redirect_uri is not configured"))?;
        Ok(self.auth.google_auth_url(client_id, redirect_uri)?)
    }

    /// Sign out. Clears the local session and always lands in
    /// [`AuthState::SignedOut`]; calling it again is a no-op.
    ///
    /// The identity service's REST surface has no server-side logout, so
    /// the refresh token is discarded rather than revoked.
    pub async fn sign_out(&self) -> Result<(), Error> {
        self.store.set_auth_token(None);
        if self.transition_signed_out() {
            log::debug!("signed out");
        }
        Ok(())
    }

    /// Resolve the initial authentication state at startup.
    ///
    /// With a persisted refresh token the session is restored; without one
    /// the state settles at [`AuthState::SignedOut`]. Either way the
    /// `initializing` flag clears once the outcome is known.
    pub async fn initialize(&self, refresh_token: Option<&str>) -> Result<Option<Identity>, Error> {
        let result = match refresh_token {
            None => Ok(None),
            Some(token) => self.restore(token).await.map(Some),
        };
        self.shared.initializing.store(false, Ordering::SeqCst);
        result
    }

    /// Exchange a persisted refresh token for a fresh session.
    ///
    /// A revoked or expired token (external session invalidation) lands in
    /// [`AuthState::SignedOut`].
    pub async fn restore(&self, refresh_token: &str) -> Result<Identity, Error> {
        self.begin_authenticating();

        let refreshed = match self.auth.exchange_refresh_token(refresh_token).await {
            Ok(response) => response,
            Err(err) => {
                log::warn!("session restore failed: {}", err);
                self.transition_signed_out();
                return Err(err.into());
            }
        };

        let account = match self.auth.lookup(&refreshed.id_token).await {
            Ok(account) => account,
            Err(err) => {
                self.transition_signed_out();
                return Err(err.into());
            }
        };

        let identity = account.identity();
        let session = Session::new(
            refreshed.id_token,
            refreshed.refresh_token,
            refreshed.user_id,
            parse_expires_in(&refreshed.expires_in),
        );
        self.transition_signed_in(session, identity.clone());
        log::debug!("restored session for {}", identity.uid);
        Ok(identity)
    }

    /// Register an identity-change callback.
    ///
    /// The callback fires once immediately with the current identity (or
    /// `None`), then once per subsequent transition, in transition order.
    /// Callbacks must not call back into the subscription API.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<&Identity>) + Send + Sync + 'static,
    {
        let callback: IdentityCallback = Arc::new(callback);
        let id = self.shared.next_subscriber.fetch_add(1, Ordering::SeqCst);

        // Registration and the initial delivery happen under the ordering
        // lock so a concurrent transition cannot double-notify.
        let _ordering = self.shared.ordering.lock().unwrap();
        {
            let mut subscribers = self.shared.subscribers.lock().unwrap();
            subscribers.insert(id, callback.clone());
        }
        let identity = self.shared.current.lock().unwrap().identity.clone();
        callback(identity.as_ref());

        Subscription {
            id,
            shared: Arc::clone(&self.shared),
        }
    }

    /// The identity currently signed in, if any.
    pub fn current_identity(&self) -> Option<Identity> {
        self.shared.current.lock().unwrap().identity.clone()
    }

    /// The current session's token material, if signed in.
    pub fn session(&self) -> Option<Session> {
        self.shared.current.lock().unwrap().session.clone()
    }

    /// The current authentication state.
    pub fn state(&self) -> AuthState {
        self.shared.current.lock().unwrap().state
    }

    /// True until the startup restore attempt has resolved; UI rendered
    /// before then cannot trust [`SessionManager::state`].
    pub fn is_initializing(&self) -> bool {
        self.shared.initializing.load(Ordering::SeqCst)
    }

    fn begin_authenticating(&self) {
        let mut current = self.shared.current.lock().unwrap();
        current.state = AuthState::Authenticating;
    }

    fn transition_signed_in(&self, session: Session, identity: Identity) {
        let _ordering = self.shared.ordering.lock().unwrap();
        {
            let mut current = self.shared.current.lock().unwrap();
            current.state = AuthState::SignedIn;
            current.session = Some(session.clone());
            current.identity = Some(identity.clone());
        }
        self.store.set_auth_token(Some(session.id_token));
        self.notify(Some(&identity));
    }

    /// Returns true when an identity was actually cleared. A failed sign-in
    /// from a signed-out state changes nothing observable and emits no
    /// notification.
    fn transition_signed_out(&self) -> bool {
        let _ordering = self.shared.ordering.lock().unwrap();
        let had_identity = {
            let mut current = self.shared.current.lock().unwrap();
            let had_identity = current.identity.is_some();
            current.state = AuthState::SignedOut;
            current.session = None;
            current.identity = None;
            had_identity
        };
        if had_identity {
            self.notify(None);
        }
        had_identity
    }

    /// Caller must hold the ordering lock. Callbacks run outside the
    /// registry lock so a subscriber may drop its handle from another
    /// thread without deadlocking.
    fn notify(&self, identity: Option<&Identity>) {
        let callbacks: Vec<IdentityCallback> = {
            let subscribers = self.shared.subscribers.lock().unwrap();
            subscribers.values().cloned().collect()
        };
        for callback in callbacks {
            callback(identity);
        }
    }
}
