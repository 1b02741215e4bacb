use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::records::{MenuChoice, SeatingRequest};
use crate::validate::is_string_valid_uuid;

/// Placeholder substituted for server-generated identifiers.
pub const FIXED_ID: &str = "FIXED_ID";
/// Placeholder substituted for server-generated timestamps.
pub const FIXED_DATE: &str = "FIXED_DATE";

pub struct Fixture;

impl Fixture {
    /// Load a JSON fixture relative to `fixtures/`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Value> {
        let full = fixtures_root().join(path.as_ref());
        let data = fs::read_to_string(&full)
            .with_context(|| format!("failed to read fixture {}", full.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("invalid JSON in fixture {}", full.display()))
    }
}

/// Validate that `value` is a UUID and swap it for [`FIXED_ID`].
pub fn validate_and_clean_uuid(field: &str, value: &str) -> Result<String, ValidationError> {
    if !is_string_valid_uuid(value) {
        return Err(ValidationError::InvalidUuid {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(FIXED_ID.to_string())
}

/// Clean all three identifiers of every menu choice, preserving order.
pub fn clean_menu_choice_ids(records: &[MenuChoice]) -> Result<Vec<MenuChoice>, ValidationError> {
    records
        .iter()
        .enumerate()
        .map(|(i, choice)| -> Result<MenuChoice, ValidationError> {
            let field = |name: &str| format!("menu_choices[{i}].{name}");
            Ok(MenuChoice {
                menu_choice_id: validate_and_clean_uuid(
                    &field("menu_choice_id"),
                    &choice.menu_choice_id,
                )?,
                menu_item_id: validate_and_clean_uuid(
                    &field("menu_item_id"),
                    &choice.menu_item_id,
                )?,
                menu_item_option_id: validate_and_clean_uuid(
                    &field("menu_item_option_id"),
                    &choice.menu_item_option_id,
                )?,
                extra: choice.extra.clone(),
            })
        })
        .collect()
}

/// Whether a record's id fields must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdFields {
    /// A missing id is a validation failure.
    #[default]
    Guaranteed,
    /// Missing ids are skipped.
    Optional,
}

impl From<bool> for IdFields {
    fn from(guaranteed: bool) -> Self {
        if guaranteed {
            Self::Guaranteed
        } else {
            Self::Optional
        }
    }
}

/// Clean the request ids of every seating request, preserving order.
pub fn clean_seating_request_ids(
    records: &[SeatingRequest],
    ids: impl Into<IdFields>,
) -> Result<Vec<SeatingRequest>, ValidationError> {
    let ids = ids.into();
    records
        .iter()
        .enumerate()
        .map(|(i, request)| -> Result<SeatingRequest, ValidationError> {
            let field = |name: &str| format!("seating_requests[{i}].{name}");
            Ok(SeatingRequest {
                invitee_seating_request_id: clean_optional_id(
                    &field("invitee_seating_request_id"),
                    request.invitee_seating_request_id.as_deref(),
                    ids,
                )?,
                invitee_request_id: clean_optional_id(
                    &field("invitee_request_id"),
                    request.invitee_request_id.as_deref(),
                    ids,
                )?,
                ..request.clone()
            })
        })
        .collect()
}

fn clean_optional_id(
    field: &str,
    value: Option<&str>,
    ids: IdFields,
) -> Result<Option<String>, ValidationError> {
    match (value, ids) {
        (Some(id), _) => validate_and_clean_uuid(field, id).map(Some),
        (None, IdFields::Optional) => Ok(None),
        (None, IdFields::Guaranteed) => Err(ValidationError::MissingField {
            field: field.to_string(),
        }),
    }
}

pub(crate) fn fixtures_root() -> PathBuf {
    crate::workspace_root().join("fixtures").into_std_path_buf()
}
