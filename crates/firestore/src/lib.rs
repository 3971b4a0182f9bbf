//! Cloud Firestore REST document client for NutriTrack
//!
//! Point reads and writes against the app's per-user documents
//! (`users/{uid}` and its `dailyMeals` sub-collection). Every operation is a
//! single request; transient store errors propagate unchanged and retry
//! policy is left to callers.

use std::sync::{Arc, RwLock};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

mod codec;

pub use codec::{fields_from_wire, fields_to_wire, FieldValue, Fields};

/// Errors surfaced by the document store.
#[derive(Error, Debug)]
pub enum FirestoreError {
    /// No document exists at the requested path.
    #[error("document not found")]
    NotFound,

    /// The store's security rules rejected the request.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Transient store outage; callers decide whether to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// A document returned by the store.
#[derive(Debug, Clone)]
pub struct Document {
    /// Full resource name, `projects/.../documents/users/{uid}`.
    pub name: String,
    pub fields: Fields,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

impl Document {
    /// The document id, i.e. the last path segment of the resource name.
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    fn from_wire(value: &JsonValue) -> Result<Self, FirestoreError> {
        let name = value
            .get("name")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| FirestoreError::Decode("document missing name".to_string()))?
            .to_string();

        let fields = match value.get("fields") {
            Some(raw) => fields_from_wire(raw)?,
            None => Fields::new(),
        };

        Ok(Self {
            name,
            fields,
            create_time: value
                .get("createTime")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            update_time: value
                .get("updateTime")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
        })
    }
}

/// Client for the Firestore REST API, scoped to one project's default
/// database.
#[derive(Clone)]
pub struct FirestoreClient {
    base_url: String,
    project_id: String,
    http_client: Client,
    /// Current ID token; shared across clones so the session layer can
    /// rotate it in one place.
    auth_token: Arc<RwLock<Option<String>>>,
}

impl FirestoreClient {
    /// Create a new document client.
    pub fn new(base_url: &str, project_id: &str, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            http_client,
            auth_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Set or clear the bearer token attached to every request.
    pub fn set_auth_token(&self, token: Option<String>) {
        let mut guard = self.auth_token.write().unwrap();
        *guard = token;
    }

    fn document_url(&self, path: &str) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            self.base_url, self.project_id, path
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.auth_token.read().unwrap().clone();
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Point lookup of a single document. No caching; reflects the latest
    /// committed write visible to this client.
    pub async fn get_document(&self, path: &str) -> Result<Document, FirestoreError> {
        let request = self.http_client.get(self.document_url(path));
        let body = self.send(request).await?;
        Document::from_wire(&body)
    }

    /// Upsert-or-replace the document at `path` with exactly `fields`.
    pub async fn set_document(&self, path: &str, fields: &Fields) -> Result<Document, FirestoreError> {
        let request = self
            .http_client
            .patch(self.document_url(path))
            .json(&json!({ "fields": fields_to_wire(fields)? }));
        let body = self.send(request).await?;
        Document::from_wire(&body)
    }

    /// Merge `fields` into the document at `path`, touching only the paths
    /// named in `mask`. Creates the document when absent.
    pub async fn merge_document(
        &self,
        path: &str,
        fields: &Fields,
        mask: &[&str],
    ) -> Result<Document, FirestoreError> {
        let params: Vec<(&str, &str)> = mask
            .iter()
            .map(|field_path| ("updateMask.fieldPaths", *field_path))
            .collect();

        let request = self
            .http_client
            .patch(self.document_url(path))
            .query(&params)
            .json(&json!({ "fields": fields_to_wire(fields)? }));
        let body = self.send(request).await?;
        Document::from_wire(&body)
    }

    /// Partial merge keyed by dotted field paths (`stats.walking`). Fails
    /// with [`FirestoreError::NotFound`] when the document does not exist.
    pub async fn update_document(
        &self,
        path: &str,
        updates: &[(&str, FieldValue)],
    ) -> Result<Document, FirestoreError> {
        let mut params: Vec<(&str, &str)> = updates
            .iter()
            .map(|(field_path, _)| ("updateMask.fieldPaths", *field_path))
            .collect();
        params.push(("currentDocument.exists", "true"));

        let fields = nest_updates(updates);
        let request = self
            .http_client
            .patch(self.document_url(path))
            .query(&params)
            .json(&json!({ "fields": fields_to_wire(&fields)? }));
        let body = self.send(request).await?;
        Document::from_wire(&body)
    }

    /// Append a document with a server-assigned id to the collection at
    /// `collection_path` (e.g. `users/{uid}/dailyMeals`).
    pub async fn add_document(
        &self,
        collection_path: &str,
        fields: &Fields,
    ) -> Result<Document, FirestoreError> {
        let request = self
            .http_client
            .post(self.document_url(collection_path))
            .json(&json!({ "fields": fields_to_wire(fields)? }));
        let body = self.send(request).await?;
        Document::from_wire(&body)
    }

    async fn send(&self, request: RequestBuilder) -> Result<JsonValue, FirestoreError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<JsonValue>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        log::debug!("document store rejected request: {} {}", status, body);
        Err(Self::error_from_body(status, &body))
    }

    /// Map the REST error envelope onto the crate taxonomy.
    fn error_from_body(status: StatusCode, body: &str) -> FirestoreError {
        let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
        let grpc_status = parsed
            .as_ref()
            .and_then(|envelope| envelope.error.status.clone())
            .unwrap_or_default();
        let message = parsed
            .and_then(|envelope| envelope.error.message)
            .unwrap_or_else(|| body.to_string());

        match (grpc_status.as_str(), status) {
            ("NOT_FOUND", _) => FirestoreError::NotFound,
            (_, StatusCode::NOT_FOUND) => FirestoreError::NotFound,
            ("PERMISSION_DENIED", _) => FirestoreError::PermissionDenied(message),
            (_, StatusCode::FORBIDDEN) => FirestoreError::PermissionDenied(message),
            ("UNAVAILABLE", _) => FirestoreError::Unavailable(message),
            (_, StatusCode::SERVICE_UNAVAILABLE) => FirestoreError::Unavailable(message),
            _ => FirestoreError::Api { status, message },
        }
    }
}

/// Expand dotted update paths into the nested field tree the wire expects.
fn nest_updates(updates: &[(&str, FieldValue)]) -> Fields {
    let mut root = Fields::new();
    for (path, value) in updates {
        insert_at_path(&mut root, path, value.clone());
    }
    root
}

fn insert_at_path(fields: &mut Fields, path: &str, value: FieldValue) {
    match path.split_once('.') {
        None => {
            fields.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = fields
                .entry(head.to_string())
                .or_insert_with(|| FieldValue::Map(Fields::new()));
            if let FieldValue::Map(nested) = entry {
                insert_at_path(nested, rest, value);
            } else {
                // A scalar and a nested path collided; the deeper write wins.
                let mut nested = Fields::new();
                insert_at_path(&mut nested, rest, value);
                *entry = FieldValue::Map(nested);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nests_dotted_update_paths() {
        let fields = nest_updates(&[
            ("stats.walking", FieldValue::Integer(12)),
            ("stats.sleep", FieldValue::Integer(7)),
            ("firstName", FieldValue::from("Jane")),
        ]);

        assert_eq!(fields["firstName"].as_str(), Some("Jane"));
        let stats = fields["stats"].as_map().unwrap();
        assert_eq!(stats["walking"].as_i64(), Some(12));
        assert_eq!(stats["sleep"].as_i64(), Some(7));
    }

    #[test]
    fn document_id_is_last_path_segment() {
        let document = Document {
            name: "projects/p/databases/(default)/documents/users/uid-123".to_string(),
            fields: Fields::new(),
            create_time: None,
            update_time: None,
        };
        assert_eq!(document.id(), "uid-123");
    }

    #[test]
    fn maps_error_envelope_statuses() {
        let not_found = FirestoreClient::error_from_body(
            StatusCode::NOT_FOUND,
            r#"{"error":{"code":404,"message":"missing","status":"NOT_FOUND"}}"#,
        );
        assert!(matches!(not_found, FirestoreError::NotFound));

        let denied = FirestoreClient::error_from_body(
            StatusCode::FORBIDDEN,
            r#"{"error":{"code":403,"message":"no access","status":"PERMISSION_DENIED"}}"#,
        );
        assert!(matches!(denied, FirestoreError::PermissionDenied(_)));

        let unavailable = FirestoreClient::error_from_body(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"error":{"code":503,"message":"backend","status":"UNAVAILABLE"}}"#,
        );
        assert!(matches!(unavailable, FirestoreError::Unavailable(_)));
    }
}
