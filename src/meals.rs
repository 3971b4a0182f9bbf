//! Meal logging
//!
//! Meal entries live in the user-scoped `users/{uid}/dailyMeals`
//! sub-collection with server-assigned ids. Entries are append-only and
//! write-only: nothing in the app reads them back, so no read path exists
//! here.

use chrono::{DateTime, Utc};

use nutritrack_firestore::{FieldValue, Fields, FirestoreClient};

use crate::error::Error;

/// The meal slot an entry belongs to. The wire carries the app's
/// single-letter codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealType {
    pub fn code(&self) -> &'static str {
        match self {
            MealType::Breakfast => "b",
            MealType::Lunch => "l",
            MealType::Dinner => "d",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "b" => Some(MealType::Breakfast),
            "l" => Some(MealType::Lunch),
            "d" => Some(MealType::Dinner),
            _ => None,
        }
    }
}

/// A single logged meal. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct MealEntry {
    pub meal: MealType,
    pub name: String,
    pub protein: f64,
    pub calorie: f64,
    pub fats: f64,
    pub carb: f64,
    /// Defaults to the submission time when absent.
    pub created_at: Option<DateTime<Utc>>,
}

impl MealEntry {
    fn to_fields(&self, now: DateTime<Utc>) -> Fields {
        let mut fields = Fields::new();
        fields.insert("meal".to_string(), FieldValue::from(self.meal.code()));
        fields.insert("name".to_string(), FieldValue::from(self.name.as_str()));
        fields.insert("protein".to_string(), FieldValue::Double(self.protein));
        fields.insert("calorie".to_string(), FieldValue::Double(self.calorie));
        fields.insert("fats".to_string(), FieldValue::Double(self.fats));
        fields.insert("carb".to_string(), FieldValue::Double(self.carb));
        fields.insert(
            "createdAt".to_string(),
            FieldValue::Timestamp(self.created_at.unwrap_or(now)),
        );
        fields
    }
}

/// Append-only accessor for a user's meal log.
#[derive(Clone)]
pub struct MealLog {
    client: FirestoreClient,
}

impl MealLog {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    fn collection_path(uid: &str) -> String {
        format!("users/{}/dailyMeals", uid)
    }

    /// Log a meal for `uid`; returns the server-assigned entry id.
    pub async fn add(&self, uid: &str, entry: &MealEntry) -> Result<String, Error> {
        let fields = entry.to_fields(Utc::now());
        let document = self
            .client
            .add_document(&Self::collection_path(uid), &fields)
            .await?;
        log::debug!("logged meal {} for user {}", document.id(), uid);
        Ok(document.id().to_string())
    }
}
