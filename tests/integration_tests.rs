use std::sync::{Arc, Mutex};

use nutritrack::prelude::*;
use nutritrack::{AuthError, FieldValue, FirestoreError};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER_DOC: &str = "/projects/test-project/databases/(default)/documents/users/uid-123";

fn client(server: &MockServer) -> NutriTrack {
    let config = FirebaseConfig::new("test_api_key", "test-project")
        .with_identity_url(&server.uri())
        .with_secure_token_url(&server.uri())
        .with_firestore_url(&server.uri());
    NutriTrack::new(config)
}

fn sign_in_response() -> serde_json::Value {
    json!({
        "localId": "uid-123",
        "email": "jane@x.com",
        "displayName": "Jane Doe",
        "idToken": "test_id_token",
        "refreshToken": "test_refresh_token",
        "expiresIn": "3600",
        "registered": true
    })
}

fn profile_doc_body(walking: i64) -> serde_json::Value {
    json!({
        "name": "projects/test-project/databases/(default)/documents/users/uid-123",
        "fields": {
            "firstName": { "stringValue": "Jane" },
            "lastName": { "stringValue": "Doe" },
            "email": { "stringValue": "jane@x.com" },
            "createdAt": { "timestampValue": "2024-06-06T08:00:00Z" },
            "stats": {
                "mapValue": {
                    "fields": {
                        "caloriesIntake": { "integerValue": "78" },
                        "walking": { "integerValue": walking.to_string() },
                        "sleep": { "integerValue": "8" }
                    }
                }
            }
        },
        "createTime": "2024-06-06T08:00:00Z",
        "updateTime": "2024-06-06T08:00:00Z"
    })
}

#[tokio::test]
async fn sign_up_seeds_profile_then_read_returns_seeded_fields() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts:signUp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "localId": "uid-123",
            "email": "jane@x.com",
            "idToken": "test_id_token",
            "refreshToken": "test_refresh_token",
            "expiresIn": "3600"
        })))
        .mount(&mock_server)
        .await;

    // Profile creation carries the seed plus a creation timestamp.
    Mock::given(method("PATCH"))
        .and(path(USER_DOC))
        .and(body_string_contains("Jane"))
        .and(body_string_contains("timestampValue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_doc_body(10)))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(USER_DOC))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_doc_body(10)))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let seed = ProfileSeed::new("Jane", "Doe");
    let identity = client
        .session()
        .sign_up("jane@x.com", "password123", seed)
        .await
        .unwrap();

    assert_eq!(identity.uid, "uid-123");
    assert_eq!(client.session().state(), AuthState::SignedIn);

    let profile = client.profiles().read(&identity.uid).await.unwrap();
    assert_eq!(profile.first_name, "Jane");
    assert_eq!(profile.last_name, "Doe");
    assert_eq!(profile.email, "jane@x.com");
    assert_eq!(profile.stats.walking, 10.0);
    assert_eq!(profile.stats.calories_intake, 78.0);
    assert_eq!(profile.stats.sleep, 8.0);
}

#[tokio::test]
async fn sign_in_returns_stable_uid_across_calls() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sign_in_response()))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let first = client
        .session()
        .sign_in("jane@x.com", "password123")
        .await
        .unwrap();
    let second = client
        .session()
        .sign_in("jane@x.com", "password123")
        .await
        .unwrap();

    assert_eq!(first.uid, second.uid);
}

#[tokio::test]
async fn subscribe_before_sign_in_fires_once_with_none() {
    let mock_server = MockServer::start().await;
    let client = client(&mock_server);

    let events: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _watch = client.session().subscribe(move |identity| {
        sink.lock()
            .unwrap()
            .push(identity.map(|identity| identity.uid.clone()));
    });

    let events = events.lock().unwrap();
    assert_eq!(events.as_slice(), &[None]);
}

#[tokio::test]
async fn subscribers_observe_transitions_in_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sign_in_response()))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);

    let events: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _watch = client.session().subscribe(move |identity| {
        sink.lock()
            .unwrap()
            .push(identity.map(|identity| identity.uid.clone()));
    });

    client
        .session()
        .sign_in("jane@x.com", "password123")
        .await
        .unwrap();
    client.session().sign_out().await.unwrap();
    // Second sign-out is a no-op and emits nothing.
    client.session().sign_out().await.unwrap();

    let events = events.lock().unwrap();
    assert_eq!(
        events.as_slice(),
        &[None, Some("uid-123".to_string()), None]
    );
    assert_eq!(client.session().state(), AuthState::SignedOut);
}

#[tokio::test]
async fn dropped_subscription_stops_delivery() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sign_in_response()))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);

    let unsubscribed: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&unsubscribed);
    let watch = client.session().subscribe(move |identity| {
        sink.lock()
            .unwrap()
            .push(identity.map(|identity| identity.uid.clone()));
    });
    watch.unsubscribe();

    let dropped: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let sink = Arc::clone(&dropped);
        let _watch = client.session().subscribe(move |identity| {
            sink.lock()
                .unwrap()
                .push(identity.map(|identity| identity.uid.clone()));
        });
    }

    // A retained subscriber proves the transition still notifies.
    let live: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&live);
    let _watch = client.session().subscribe(move |identity| {
        sink.lock()
            .unwrap()
            .push(identity.map(|identity| identity.uid.clone()));
    });

    client
        .session()
        .sign_in("jane@x.com", "password123")
        .await
        .unwrap();

    // The released handles saw only their initial callback.
    assert_eq!(unsubscribed.lock().unwrap().as_slice(), &[None]);
    assert_eq!(dropped.lock().unwrap().as_slice(), &[None]);
    assert_eq!(
        live.lock().unwrap().as_slice(),
        &[None, Some("uid-123".to_string())]
    );
}

#[tokio::test]
async fn failed_sign_in_lands_signed_out_without_notification() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "INVALID_LOGIN_CREDENTIALS" }
        })))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);

    let events: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _watch = client.session().subscribe(move |identity| {
        sink.lock()
            .unwrap()
            .push(identity.map(|identity| identity.uid.clone()));
    });

    let result = client.session().sign_in("jane@x.com", "wrong").await;
    assert!(matches!(
        result,
        Err(Error::Auth(AuthError::InvalidCredentials))
    ));
    assert_eq!(client.session().state(), AuthState::SignedOut);

    // Only the immediate subscription callback fired.
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn updating_a_stat_leaves_other_fields_unchanged() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(USER_DOC))
        .and(query_param("updateMask.fieldPaths", "stats.walking"))
        .and(query_param("currentDocument.exists", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_doc_body(12)))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(USER_DOC))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_doc_body(12)))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    client
        .profiles()
        .update("uid-123", &[("stats.walking", FieldValue::Integer(12))])
        .await
        .unwrap();

    let profile = client.profiles().read("uid-123").await.unwrap();
    assert_eq!(profile.stats.walking, 12.0);
    assert_eq!(profile.stats.calories_intake, 78.0);
    assert_eq!(profile.stats.sleep, 8.0);
    assert_eq!(profile.first_name, "Jane");
}

#[tokio::test]
async fn updating_a_missing_profile_fails_with_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(
            "/projects/test-project/databases/(default)/documents/users/never-created",
        ))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "message": "no entity to update", "status": "NOT_FOUND" }
        })))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let result = client
        .profiles()
        .update("never-created", &[("stats.walking", FieldValue::Integer(12))])
        .await;

    assert!(matches!(
        result,
        Err(Error::Store(FirestoreError::NotFound))
    ));
}

#[tokio::test]
async fn ensure_recreates_a_missing_profile() {
    let mock_server = MockServer::start().await;

    // First read misses; after the re-create the read succeeds.
    Mock::given(method("GET"))
        .and(path(USER_DOC))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "message": "missing", "status": "NOT_FOUND" }
        })))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(USER_DOC))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_doc_body(10)))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(USER_DOC))
        .and(body_string_contains("Jane"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_doc_body(10)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let seed = ProfileSeed::new("Jane", "Doe").with_email("jane@x.com");
    let profile = client.profiles().ensure("uid-123", &seed).await.unwrap();

    assert_eq!(profile.first_name, "Jane");
    assert_eq!(profile.stats.walking, 10.0);
}

#[tokio::test]
async fn google_sign_in_without_token_fails_fast() {
    let mock_server = MockServer::start().await;
    let client = client(&mock_server);

    let result = client.session().sign_in_with_google(None).await;

    assert!(matches!(result, Err(Error::Auth(AuthError::MissingToken))));
    assert_eq!(client.session().state(), AuthState::SignedOut);
}

#[tokio::test]
async fn first_google_sign_in_creates_a_profile_with_default_stats() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts:signInWithIdp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "localId": "uid-123",
            "email": "jane@gmail.com",
            "displayName": "Jane Doe",
            "photoUrl": "https://lh3.example.com/photo.jpg",
            "idToken": "test_id_token",
            "refreshToken": "test_refresh_token",
            "expiresIn": "3600",
            "providerId": "google.com",
            "isNewUser": true
        })))
        .mount(&mock_server)
        .await;

    // No profile yet: the upsert reads first, then creates.
    Mock::given(method("GET"))
        .and(path(USER_DOC))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "message": "missing", "status": "NOT_FOUND" }
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(USER_DOC))
        .and(body_string_contains("Jane"))
        .and(body_string_contains("photo.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_doc_body(10)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let identity = client
        .session()
        .sign_in_with_google(Some("google-id-token"))
        .await
        .unwrap();

    assert_eq!(identity.uid, "uid-123");
    assert_eq!(identity.display_name, Some("Jane Doe".to_string()));
    assert_eq!(client.session().state(), AuthState::SignedIn);
}

#[tokio::test]
async fn federated_upsert_without_a_name_keeps_existing_profile_names() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(USER_DOC))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_doc_body(10)))
        .mount(&mock_server)
        .await;

    // Only the supplied field lands in the merge mask.
    Mock::given(method("PATCH"))
        .and(path(USER_DOC))
        .and(query_param("updateMask.fieldPaths", "email"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_doc_body(10)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    client
        .profiles()
        .upsert_federated("uid-123", None, Some("jane@gmail.com"), None)
        .await
        .unwrap();

    // The name fields never appear in any update mask, so "Jane"/"Doe"
    // survive a provider that sends no display name.
    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .all(|request| !request.url.query().unwrap_or_default().contains("firstName")));
}

#[tokio::test]
async fn profile_seeding_failure_surfaces_a_consistency_gap() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/accounts:signUp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "localId": "uid-123",
            "email": "jane@x.com",
            "idToken": "test_id_token",
            "refreshToken": "test_refresh_token",
            "expiresIn": "3600"
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(USER_DOC))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "code": 503, "message": "backend unavailable", "status": "UNAVAILABLE" }
        })))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let result = client
        .session()
        .sign_up("jane@x.com", "password123", ProfileSeed::new("Jane", "Doe"))
        .await;

    match result {
        Err(Error::ConsistencyGap { uid, .. }) => assert_eq!(uid, "uid-123"),
        other => panic!("expected ConsistencyGap, got {:?}", other),
    }

    // The identity exists and stays signed in; the caller reconciles.
    assert_eq!(client.session().state(), AuthState::SignedIn);
    assert_eq!(
        client.session().current_identity().map(|identity| identity.uid),
        Some("uid-123".to_string())
    );
}

#[tokio::test]
async fn logging_a_meal_appends_to_the_daily_meals_collection() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(
            "/projects/test-project/databases/(default)/documents/users/uid-123/dailyMeals",
        ))
        .and(body_string_contains("\"b\""))
        .and(body_string_contains("Oatmeal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/test-project/databases/(default)/documents/users/uid-123/dailyMeals/auto-meal-1",
            "fields": { "meal": { "stringValue": "b" } },
            "createTime": "2024-06-06T08:05:00Z",
            "updateTime": "2024-06-06T08:05:00Z"
        })))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let entry = MealEntry {
        meal: MealType::Breakfast,
        name: "Oatmeal".to_string(),
        protein: 10.0,
        calorie: 320.0,
        fats: 6.0,
        carb: 54.0,
        created_at: None,
    };

    let meal_id = client.meals().add("uid-123", &entry).await.unwrap();
    assert_eq!(meal_id, "auto-meal-1");
}

#[tokio::test]
async fn initialize_restores_a_persisted_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id_token": "fresh_id_token",
            "refresh_token": "fresh_refresh_token",
            "user_id": "uid-123",
            "expires_in": "3600"
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/accounts:lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{
                "localId": "uid-123",
                "email": "jane@x.com",
                "displayName": "Jane Doe"
            }]
        })))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    assert!(client.session().is_initializing());

    let identity = client
        .session()
        .initialize(Some("persisted_refresh_token"))
        .await
        .unwrap();

    assert_eq!(identity.map(|identity| identity.uid), Some("uid-123".to_string()));
    assert!(!client.session().is_initializing());
    assert_eq!(client.session().state(), AuthState::SignedIn);
}

#[tokio::test]
async fn initialize_without_a_token_settles_signed_out() {
    let mock_server = MockServer::start().await;
    let client = client(&mock_server);

    let identity = client.session().initialize(None).await.unwrap();

    assert!(identity.is_none());
    assert!(!client.session().is_initializing());
    assert_eq!(client.session().state(), AuthState::SignedOut);
}

#[tokio::test]
async fn revoked_refresh_token_lands_signed_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "TOKEN_EXPIRED" }
        })))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let result = client.session().initialize(Some("revoked")).await;

    assert!(matches!(result, Err(Error::Auth(AuthError::TokenExpired))));
    assert!(!client.session().is_initializing());
    assert_eq!(client.session().state(), AuthState::SignedOut);
}
