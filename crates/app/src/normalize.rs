use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::fixtures::{FIXED_DATE, FIXED_ID};
use crate::validate::{is_recent_at, is_value_valid_uuid};

/// Identifier keys emitted by the Capacious API.
pub const DEFAULT_ID_FIELDS: &[&str] = &[
    "event_id",
    "guest_id",
    "invitee_id",
    "invitee_friend_id",
    "invitee_request_id",
    "invitee_seating_request_id",
    "menu_choice_id",
    "menu_item_id",
    "menu_item_option_id",
    "menu_note_id",
    "user_id",
];

/// Timestamp keys stamped by the server on write.
pub const DEFAULT_TIMESTAMP_FIELDS: &[&str] = &["created_at", "updated_at"];

/// Validates and replaces non-deterministic fields anywhere in a JSON document.
#[derive(Debug, Clone)]
pub struct Normalizer {
    id_fields: BTreeSet<String>,
    timestamp_fields: BTreeSet<String>,
    now: Option<DateTime<Utc>>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            id_fields: DEFAULT_ID_FIELDS.iter().map(|f| f.to_string()).collect(),
            timestamp_fields: DEFAULT_TIMESTAMP_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            now: None,
        }
    }
}

impl Normalizer {
    /// Pin the clock used for recency checks.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_fields.insert(field.into());
        self
    }

    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_fields.insert(field.into());
        self
    }

    /// Return a copy of `value` with ids replaced by `FIXED_ID` and timestamps by `FIXED_DATE`.
    pub fn normalize(&self, value: &Value) -> Result<Value, ValidationError> {
        let now = self.now.unwrap_or_else(Utc::now);
        self.walk(value, "$", now)
    }

    fn walk(&self, value: &Value, path: &str, now: DateTime<Utc>) -> Result<Value, ValidationError> {
        match value {
            Value::Object(map) => self.walk_map(map, path, now).map(Value::Object),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.walk(item, &format!("{path}[{i}]"), now))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn walk_map(
        &self,
        map: &Map<String, Value>,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<Map<String, Value>, ValidationError> {
        let mut cleaned = Map::new();
        for (key, val) in map {
            let field = format!("{path}.{key}");
            let replaced = if self.id_fields.contains(key) {
                if val.is_null() {
                    Value::Null
                } else {
                    clean_id(&field, val)?
                }
            } else if self.timestamp_fields.contains(key) {
                clean_timestamp(&field, val, now)?
            } else {
                self.walk(val, &field, now)?
            };
            cleaned.insert(key.clone(), replaced);
        }
        Ok(cleaned)
    }
}

fn clean_id(field: &str, value: &Value) -> Result<Value, ValidationError> {
    if is_value_valid_uuid(value) {
        return Ok(Value::String(FIXED_ID.into()));
    }
    Err(ValidationError::InvalidUuid {
        field: field.to_string(),
        value: display(value),
    })
}

fn clean_timestamp(field: &str, value: &Value, now: DateTime<Utc>) -> Result<Value, ValidationError> {
    if is_recent_at(value, now) {
        return Ok(Value::String(FIXED_DATE.into()));
    }
    Err(ValidationError::StaleTimestamp {
        field: field.to_string(),
        value: display(value),
    })
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Normalize with the default field sets and the system clock.
pub fn normalize_json(value: &Value) -> Result<Value, ValidationError> {
    Normalizer::default().normalize(value)
}
