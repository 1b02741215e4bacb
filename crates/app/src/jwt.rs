//! Signed tokens for exercising the API's JWT middleware.

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;

/// Subject of the seeded user the API knows about.
pub const VALID_USER_ID: &str = "cd7bc650-2e71-11e5-a390-675459b99309";
/// Well-formed subject that matches no principal.
pub const INVALID_USER_ID: &str = "81e6d338-7917-11e5-8b8e-a37beb0fdae8";
/// `exp` used for tokens that must be rejected as expired (2015-07-19).
pub const EXPIRED_AT: i64 = 1_437_265_807;

pub const ALGORITHM: Algorithm = Algorithm::HS512;

pub fn token_ttl() -> TimeDelta {
    TimeDelta::days(2)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Token for the known user, valid for two days.
pub fn valid_jwt(secret: &str) -> Result<String, TokenError> {
    signed_jwt(secret, VALID_USER_ID, Utc::now() + token_ttl())
}

/// Token that verifies but names a user the API has never seen.
pub fn valid_jwt_with_invalid_user(secret: &str) -> Result<String, TokenError> {
    signed_jwt(secret, INVALID_USER_ID, Utc::now() + token_ttl())
}

/// Token for the known user whose expiry is long past.
pub fn expired_jwt(secret: &str) -> Result<String, TokenError> {
    let claims = Claims {
        sub: VALID_USER_ID.to_string(),
        exp: EXPIRED_AT,
        iat: None,
    };
    sign(secret, &claims)
}

pub fn signed_jwt(
    secret: &str,
    subject: &str,
    expires_at: DateTime<Utc>,
) -> Result<String, TokenError> {
    let claims = Claims {
        sub: subject.to_string(),
        exp: expires_at.timestamp(),
        iat: Some(Utc::now().timestamp()),
    };
    sign(secret, &claims)
}

fn sign(secret: &str, claims: &Claims) -> Result<String, TokenError> {
    encode(
        &Header::new(ALGORITHM),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(TokenError::Sign)
}

/// Verify an HS512 token against `secret`, requiring an unexpired `exp` with no leeway.
pub fn verify_jwt(secret: &str, token: &str) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(ALGORITHM);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(TokenError::Verify)
}
