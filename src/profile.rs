//! Typed per-user profile documents and their store accessor
//!
//! One profile document exists per identity, keyed by its uid at
//! `users/{uid}`. The document shape is validated here at the store
//! boundary; nothing downstream handles untyped field maps.

use chrono::{DateTime, Utc};

use nutritrack_firestore::{FieldValue, Fields, FirestoreClient, FirestoreError};

use crate::error::Error;

/// Wellness statistics carried on the profile document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub calories_intake: f64,
    pub walking: f64,
    pub sleep: f64,
}

impl Default for Stats {
    /// The onboarding defaults seeded at registration.
    fn default() -> Self {
        Self {
            calories_intake: 78.0,
            walking: 10.0,
            sleep: 8.0,
        }
    }
}

impl Stats {
    fn to_field(self) -> FieldValue {
        let mut fields = Fields::new();
        fields.insert(
            "caloriesIntake".to_string(),
            FieldValue::Double(self.calories_intake),
        );
        fields.insert("walking".to_string(), FieldValue::Double(self.walking));
        fields.insert("sleep".to_string(), FieldValue::Double(self.sleep));
        FieldValue::Map(fields)
    }

    fn from_field(value: &FieldValue) -> Result<Self, Error> {
        let fields = value
            .as_map()
            .ok_or_else(|| Error::profile("stats is not a map"))?;
        Ok(Self {
            calories_intake: require_number(fields, "caloriesIntake")?,
            walking: require_number(fields, "walking")?,
            sleep: require_number(fields, "sleep")?,
        })
    }
}

/// The data a new profile document is created from.
#[derive(Debug, Clone)]
pub struct ProfileSeed {
    pub first_name: String,
    pub last_name: String,
    /// Defaults to the account email when absent.
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub stats: Stats,
    /// Defaults to the creation call time when absent.
    pub created_at: Option<DateTime<Utc>>,
}

impl ProfileSeed {
    pub fn new(first_name: &str, last_name: &str) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: None,
            photo_url: None,
            stats: Stats::default(),
            created_at: None,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_photo_url(mut self, photo_url: &str) -> Self {
        self.photo_url = Some(photo_url.to_string());
        self
    }

    pub fn with_stats(mut self, stats: Stats) -> Self {
        self.stats = stats;
        self
    }

    fn to_fields(&self, now: DateTime<Utc>) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            "firstName".to_string(),
            FieldValue::from(self.first_name.as_str()),
        );
        fields.insert(
            "lastName".to_string(),
            FieldValue::from(self.last_name.as_str()),
        );
        if let Some(email) = &self.email {
            fields.insert("email".to_string(), FieldValue::from(email.as_str()));
        }
        if let Some(photo_url) = &self.photo_url {
            fields.insert("photoURL".to_string(), FieldValue::from(photo_url.as_str()));
        }
        fields.insert(
            "createdAt".to_string(),
            FieldValue::Timestamp(self.created_at.unwrap_or(now)),
        );
        fields.insert("stats".to_string(), self.stats.to_field());
        fields
    }
}

/// A persisted profile document.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDocument {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub stats: Stats,
}

impl ProfileDocument {
    /// Decode and validate a document's fields. Required fields missing or
    /// mistyped fail with [`Error::Profile`].
    pub fn from_fields(fields: &Fields) -> Result<Self, Error> {
        Ok(Self {
            first_name: require_string(fields, "firstName")?,
            last_name: require_string(fields, "lastName")?,
            email: require_string(fields, "email")?,
            photo_url: fields
                .get("photoURL")
                .and_then(FieldValue::as_str)
                .map(str::to_string),
            created_at: fields
                .get("createdAt")
                .and_then(FieldValue::as_timestamp)
                .ok_or_else(|| Error::profile("missing or invalid createdAt"))?,
            stats: Stats::from_field(
                fields
                    .get("stats")
                    .ok_or_else(|| Error::profile("missing stats"))?,
            )?,
        })
    }
}

fn require_string(fields: &Fields, name: &str) -> Result<String, Error> {
    fields
        .get(name)
        .and_then(FieldValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::profile(format!("missing or invalid {}", name)))
}

fn require_number(fields: &Fields, name: &str) -> Result<f64, Error> {
    fields
        .get(name)
        .and_then(FieldValue::as_f64)
        .ok_or_else(|| Error::profile(format!("missing or invalid {}", name)))
}

/// Split a federated display name into first name and the rest.
pub(crate) fn split_display_name(display_name: &str) -> (String, String) {
    let mut parts = display_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, rest)
}

/// Accessor for profile documents. Point reads and writes only; no caching,
/// no retries.
#[derive(Clone)]
pub struct ProfileStore {
    client: FirestoreClient,
}

impl ProfileStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    fn document_path(uid: &str) -> String {
        format!("users/{}", uid)
    }

    /// Idempotent upsert-or-replace of the profile document keyed by `uid`.
    /// A creation timestamp is filled in when the seed lacks one.
    pub async fn create(&self, uid: &str, seed: &ProfileSeed) -> Result<(), Error> {
        let fields = seed.to_fields(Utc::now());
        self.client
            .set_document(&Self::document_path(uid), &fields)
            .await?;
        Ok(())
    }

    /// Point lookup of the profile keyed by `uid`.
    pub async fn read(&self, uid: &str) -> Result<ProfileDocument, Error> {
        let document = self.client.get_document(&Self::document_path(uid)).await?;
        ProfileDocument::from_fields(&document.fields)
    }

    /// Partial merge keyed by dotted field paths, e.g.
    /// `("stats.walking", FieldValue::Integer(12))`. Fails with
    /// [`FirestoreError::NotFound`] when no profile exists.
    pub async fn update(&self, uid: &str, updates: &[(&str, FieldValue)]) -> Result<(), Error> {
        self.client
            .update_document(&Self::document_path(uid), updates)
            .await?;
        Ok(())
    }

    /// Read the profile, re-creating it from `seed` when missing.
    ///
    /// Reconciliation path for [`crate::error::Error::ConsistencyGap`]: an
    /// identity whose profile write failed gets its document back on the
    /// next access.
    pub async fn ensure(&self, uid: &str, seed: &ProfileSeed) -> Result<ProfileDocument, Error> {
        match self.read(uid).await {
            Ok(profile) => Ok(profile),
            Err(Error::Store(FirestoreError::NotFound)) => {
                log::warn!("profile for {} was missing; re-creating", uid);
                self.create(uid, seed).await?;
                self.read(uid).await
            }
            Err(err) => Err(err),
        }
    }

    /// Upsert the profile from a federated identity's name/email/photo.
    ///
    /// A first federated sign-in creates a full document with default
    /// stats; later sign-ins merge only the fields the provider actually
    /// supplied, so logged statistics and locally edited names survive.
    pub async fn upsert_federated(
        &self,
        uid: &str,
        display_name: Option<&str>,
        email: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<(), Error> {
        match self.client.get_document(&Self::document_path(uid)).await {
            Ok(_) => {
                let mut fields = Fields::new();
                let mut mask: Vec<&str> = Vec::new();

                if let Some(display_name) = display_name {
                    let (first_name, last_name) = split_display_name(display_name);
                    fields.insert("firstName".to_string(), FieldValue::from(first_name));
                    mask.push("firstName");
                    fields.insert("lastName".to_string(), FieldValue::from(last_name));
                    mask.push("lastName");
                }
                if let Some(email) = email {
                    fields.insert("email".to_string(), FieldValue::from(email));
                    mask.push("email");
                }
                if let Some(photo_url) = photo_url {
                    fields.insert("photoURL".to_string(), FieldValue::from(photo_url));
                    mask.push("photoURL");
                }
                if mask.is_empty() {
                    return Ok(());
                }

                self.client
                    .merge_document(&Self::document_path(uid), &fields, &mask)
                    .await?;
                Ok(())
            }
            Err(FirestoreError::NotFound) => {
                let (first_name, last_name) = split_display_name(display_name.unwrap_or_default());
                let mut seed = ProfileSeed::new(&first_name, &last_name);
                if let Some(email) = email {
                    seed = seed.with_email(email);
                }
                if let Some(photo_url) = photo_url {
                    seed = seed.with_photo_url(photo_url);
                }
                self.create(uid, &seed).await
            }
            Err(err) => Err(err.into()),
        }
    }
}
