//! Identity and access: HMAC bearer tokens, data-user login/register, and
//! the claim set that rides along into the database session for RLS.

pub mod signin;
pub mod signup;
pub mod token;

use serde_json::Value as Json;

/// The verified claim set of a request. Arbitrary keys copied from the
/// authenticated row, plus `database` and (optionally) `exp`.
pub type Claims = serde_json::Map<String, Json>;

/// The role key the column allow-lists are looked up by.
pub fn claims_role(claims: &Claims) -> Option<&str> {
	claims.get("role_name").and_then(Json::as_str)
}

/// Whether the claims bypass per-database scoping (engine administrators).
pub fn claims_bypass_all(claims: &Claims) -> bool {
	claims.get("bypass_all").and_then(Json::as_bool).unwrap_or(false)
}
