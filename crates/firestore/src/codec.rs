//! Typed field values and their Firestore REST wire encoding
//!
//! The REST API wraps every document field in a single-key object naming its
//! type (`{"stringValue": "x"}`, `{"integerValue": "42"}`, ...). Integers are
//! stringified on the wire; timestamps travel as RFC 3339 strings.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value as JsonValue};

use crate::FirestoreError;

/// A document's named fields.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single Firestore field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Map(Fields),
    Array(Vec<FieldValue>),
}

impl FieldValue {
    /// Encode into the REST `Value` representation. Non-finite doubles have
    /// no JSON number form (`json!` would emit `null`) and are rejected.
    pub fn to_wire(&self) -> Result<JsonValue, FirestoreError> {
        Ok(match self {
            FieldValue::Null => json!({ "nullValue": null }),
            FieldValue::Bool(value) => json!({ "booleanValue": value }),
            FieldValue::Integer(value) => json!({ "integerValue": value.to_string() }),
            FieldValue::Double(value) => {
                if !value.is_finite() {
                    return Err(FirestoreError::Decode(format!(
                        "non-finite doubleValue: {}",
                        value
                    )));
                }
                json!({ "doubleValue": value })
            }
            FieldValue::String(value) => json!({ "stringValue": value }),
            FieldValue::Timestamp(value) => {
                json!({ "timestampValue": value.to_rfc3339_opts(SecondsFormat::Micros, true) })
            }
            FieldValue::Map(fields) => json!({ "mapValue": { "fields": fields_to_wire(fields)? } }),
            FieldValue::Array(values) => {
                let encoded: Vec<JsonValue> = values
                    .iter()
                    .map(FieldValue::to_wire)
                    .collect::<Result<_, _>>()?;
                json!({ "arrayValue": { "values": encoded } })
            }
        })
    }

    /// Decode from the REST `Value` representation.
    pub fn from_wire(value: &JsonValue) -> Result<FieldValue, FirestoreError> {
        let object = value
            .as_object()
            .ok_or_else(|| FirestoreError::Decode(format!("expected value object, got {}", value)))?;

        if object.contains_key("nullValue") {
            return Ok(FieldValue::Null);
        }
        if let Some(raw) = object.get("booleanValue") {
            let parsed = raw
                .as_bool()
                .ok_or_else(|| FirestoreError::Decode(format!("bad booleanValue: {}", raw)))?;
            return Ok(FieldValue::Bool(parsed));
        }
        if let Some(raw) = object.get("integerValue") {
            // Servers stringify 64-bit integers; accept bare numbers too.
            let parsed = match raw {
                JsonValue::String(text) => text.parse::<i64>().ok(),
                JsonValue::Number(number) => number.as_i64(),
                _ => None,
            }
            .ok_or_else(|| FirestoreError::Decode(format!("bad integerValue: {}", raw)))?;
            return Ok(FieldValue::Integer(parsed));
        }
        if let Some(raw) = object.get("doubleValue") {
            let parsed = raw
                .as_f64()
                .ok_or_else(|| FirestoreError::Decode(format!("bad doubleValue: {}", raw)))?;
            return Ok(FieldValue::Double(parsed));
        }
        if let Some(raw) = object.get("stringValue") {
            let parsed = raw
                .as_str()
                .ok_or_else(|| FirestoreError::Decode(format!("bad stringValue: {}", raw)))?;
            return Ok(FieldValue::String(parsed.to_string()));
        }
        if let Some(raw) = object.get("timestampValue") {
            let text = raw
                .as_str()
                .ok_or_else(|| FirestoreError::Decode(format!("bad timestampValue: {}", raw)))?;
            let parsed = DateTime::parse_from_rfc3339(text)
                .map_err(|err| FirestoreError::Decode(format!("bad timestamp {}: {}", text, err)))?;
            return Ok(FieldValue::Timestamp(parsed.with_timezone(&Utc)));
        }
        if let Some(raw) = object.get("mapValue") {
            let fields = raw.get("fields").cloned().unwrap_or_else(|| json!({}));
            return Ok(FieldValue::Map(fields_from_wire(&fields)?));
        }
        if let Some(raw) = object.get("arrayValue") {
            let values = match raw.get("values") {
                Some(JsonValue::Array(items)) => items
                    .iter()
                    .map(FieldValue::from_wire)
                    .collect::<Result<Vec<_>, _>>()?,
                _ => Vec::new(),
            };
            return Ok(FieldValue::Array(values));
        }

        Err(FirestoreError::Decode(format!("unsupported value: {}", value)))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric view: integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Double(value) => Some(*value),
            FieldValue::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            FieldValue::Map(fields) => Some(fields),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Double(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

/// Encode a field map into the wire `fields` object.
pub fn fields_to_wire(fields: &Fields) -> Result<JsonValue, FirestoreError> {
    let mut object = serde_json::Map::new();
    for (name, value) in fields {
        object.insert(name.clone(), value.to_wire()?);
    }
    Ok(JsonValue::Object(object))
}

/// Decode a wire `fields` object into a field map.
pub fn fields_from_wire(value: &JsonValue) -> Result<Fields, FirestoreError> {
    let object = value
        .as_object()
        .ok_or_else(|| FirestoreError::Decode(format!("expected fields object, got {}", value)))?;

    let mut fields = Fields::new();
    for (name, raw) in object {
        fields.insert(name.clone(), FieldValue::from_wire(raw)?);
    }
    Ok(fields)
}
