//! Typed views of the response records the Capacious API returns.
//!
//! Unknown fields are kept in `extra` so that a record survives a
//! deserialize/clean/serialize pass without hiding unexpected server output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::fixtures::{FIXED_DATE, validate_and_clean_uuid};
use crate::validate::is_recent_at;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub respond_by: String,
    #[serde(default)]
    pub allowed_friends: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    /// Replace the id and any present timestamps with sentinels.
    ///
    /// Each timestamp that is present must fall inside the recency window of `now`.
    pub fn clean(&self, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        Ok(Self {
            event_id: validate_and_clean_uuid("event_id", &self.event_id)?,
            created_at: clean_timestamp("created_at", self.created_at.as_deref(), now)?,
            updated_at: clean_timestamp("updated_at", self.updated_at.as_deref(), now)?,
            ..self.clone()
        })
    }
}

fn clean_timestamp(
    field: &str,
    value: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<String>, ValidationError> {
    match value {
        None => Ok(None),
        Some(ts) if is_recent_at(ts, now) => Ok(Some(FIXED_DATE.to_string())),
        Some(ts) => Err(ValidationError::StaleTimestamp {
            field: field.to_string(),
            value: ts.to_string(),
        }),
    }
}

/// A guest's choice of an option for one menu item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuChoice {
    pub menu_choice_id: String,
    pub menu_item_id: String,
    pub menu_item_option_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MenuChoice {
    pub fn new(
        menu_choice_id: impl Into<String>,
        menu_item_id: impl Into<String>,
        menu_item_option_id: impl Into<String>,
    ) -> Self {
        Self {
            menu_choice_id: menu_choice_id.into(),
            menu_item_id: menu_item_id.into(),
            menu_item_option_id: menu_item_option_id.into(),
            extra: Map::new(),
        }
    }
}

/// An invitee's request to be seated near another invitee.
///
/// The API omits `invitee_seating_request_id` when it lists seating request
/// *choices*, so both ids are optional here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeatingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitee_seating_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitee_request_id: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Deserialize a JSON response body into a typed record, reporting failures as
/// a [`ValidationError::Shape`] on `field`.
pub fn from_body<T: for<'de> Deserialize<'de>>(
    field: &str,
    body: Value,
) -> Result<T, ValidationError> {
    serde_json::from_value(body).map_err(|err| ValidationError::Shape {
        field: field.to_string(),
        message: err.to_string(),
    })
}

/// Serialize a typed record back into JSON for comparison against a fixture.
pub fn to_body<T: Serialize>(field: &str, record: &T) -> Result<Value, ValidationError> {
    serde_json::to_value(record).map_err(|err| ValidationError::Shape {
        field: field.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use serde_json::json;

    fn created_event(now: DateTime<Utc>) -> Value {
        let stamp = (now - TimeDelta::milliseconds(20)).to_rfc3339();
        json!({
            "event_id": "cd7bc650-2e71-11e5-a390-675459b99309",
            "name": "Christmas Party",
            "description": "A Christmas Party",
            "location": "",
            "start_time": "0001-01-01T00:00:00Z",
            "end_time": "0001-01-01T00:00:00Z",
            "respond_by": "0001-01-01T00:00:00Z",
            "allowed_friends": 0,
            "created_at": stamp,
            "updated_at": stamp,
        })
    }

    #[test]
    fn event_clean_replaces_id_and_recent_timestamps() {
        let now = Utc::now();
        let event: Event = from_body("event", created_event(now)).unwrap();
        let cleaned = event.clean(now).unwrap();
        assert_eq!(cleaned.event_id, "FIXED_ID");
        assert_eq!(cleaned.created_at.as_deref(), Some("FIXED_DATE"));
        assert_eq!(cleaned.updated_at.as_deref(), Some("FIXED_DATE"));
        assert_eq!(cleaned.name, "Christmas Party");
        // input untouched
        assert_eq!(event.event_id, "cd7bc650-2e71-11e5-a390-675459b99309");
    }

    #[test]
    fn event_clean_rejects_stale_timestamp() {
        let now = Utc::now();
        let mut body = created_event(now);
        body["updated_at"] = json!("2015-07-19T00:00:00Z");
        let event: Event = from_body("event", body).unwrap();
        let err = event.clean(now).unwrap_err();
        assert_eq!(err.field(), "updated_at");
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let now = Utc::now();
        let mut body = created_event(now);
        body["venue_capacity"] = json!(120);
        let event: Event = from_body("event", body).unwrap();
        let back = to_body("event", &event.clean(now).unwrap()).unwrap();
        assert_eq!(back["venue_capacity"], 120);
    }

    #[test]
    fn wrong_shape_is_a_validation_error() {
        let err = from_body::<MenuChoice>("menu_choices[0]", json!({"menu_item_id": 3}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::Shape { .. }));
        assert_eq!(err.field(), "menu_choices[0]");
    }
}
