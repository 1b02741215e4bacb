//! End-to-end test kit for the Capacious event-planning API.
//!
//! The core is the fixture normalizer: validators and mutators that swap
//! server-generated UUIDs and timestamps for fixed sentinels so live responses
//! can be compared to literal fixtures. Around it sit JWT fixtures, a blocking
//! API client, a declarative scenario runner and the built-in suites.

use camino::{Utf8Path, Utf8PathBuf};
use once_cell::sync::Lazy;

pub mod client;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod harness;
pub mod jwt;
pub mod normalize;
pub mod records;
pub mod scenario;
pub mod suites;
pub mod validate;

pub use error::{TokenError, ValidationError};
pub use fixtures::{
    FIXED_DATE, FIXED_ID, IdFields, clean_menu_choice_ids, clean_seating_request_ids,
    validate_and_clean_uuid,
};
pub use jwt::{valid_jwt, valid_jwt_with_invalid_user};
pub use normalize::{Normalizer, normalize_json};
pub use validate::{is_date_less_than_a_second_old, is_string_valid_uuid};

pub static APP_NAME: &str = "capacious-e2e";

/// Repository root (two levels above this crate's manifest).
pub fn workspace_root() -> &'static Utf8Path {
    static ROOT: Lazy<Utf8PathBuf> = Lazy::new(|| {
        let manifest_dir = Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        manifest_dir
            .parent()
            .and_then(|p| p.parent())
            .map(Utf8PathBuf::from)
            .unwrap_or(manifest_dir)
    });
    ROOT.as_path()
}
