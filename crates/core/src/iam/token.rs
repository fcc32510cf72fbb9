//! Token signing and verification. Only HMAC algorithms are accepted; a
//! token signed any other way fails verification outright.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;

use crate::cnf;
use crate::err::Error;
use crate::iam::Claims;
use crate::Result;

static HEADER: Lazy<Header> = Lazy::new(|| Header::new(Algorithm::HS256));

fn encoding_key() -> EncodingKey {
	EncodingKey::from_secret(cnf::JWT_SECRET.as_bytes())
}

fn decoding_key() -> DecodingKey {
	DecodingKey::from_secret(cnf::JWT_SECRET.as_bytes())
}

fn validation() -> Validation {
	let mut validation = Validation::new(Algorithm::HS256);
	validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
	// tokens without an expiry are allowed when JWT_EXPIRATION_IN_MINUTES
	// is unset; an expired `exp` still fails
	validation.required_spec_claims.clear();
	validation
}

/// The `exp` value for a token issued now, when expiry is configured.
pub fn expiration_timestamp() -> Option<i64> {
	let minutes = *cnf::JWT_EXPIRATION_IN_MINUTES;
	(minutes > 0).then(|| (Utc::now() + Duration::minutes(minutes)).timestamp())
}

pub fn sign(claims: &Claims) -> Result<String> {
	Ok(encode(&HEADER, claims, &encoding_key())?)
}

pub fn verify(token: &str) -> Result<Claims> {
	decode::<Claims>(token, &decoding_key(), &validation())
		.map(|data| data.claims)
		.map_err(|_| Error::unauthenticated("unauthorized"))
}

/// Verify a token and check its `database` claim against the requested
/// database. Rejection happens before any compilation.
pub fn verify_for_database(token: &str, database: &str) -> Result<Claims> {
	let claims = verify(token)?;
	if claims_cover_database(&claims, database) {
		Ok(claims)
	} else {
		Err(Error::unauthenticated("unauthorized"))
	}
}

pub fn claims_cover_database(claims: &Claims, database: &str) -> bool {
	if super::claims_bypass_all(claims) {
		return true;
	}
	claims.get("database").and_then(serde_json::Value::as_str) == Some(database)
}

/// Strip the scheme from an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: &str) -> Result<&str> {
	let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
	if token.is_empty() {
		return Err(Error::unauthenticated("no token was provided"));
	}
	Ok(token)
}

/// Re-sign existing claims with a refreshed expiry.
pub fn refresh(claims: &Claims) -> Result<String> {
	let mut claims = claims.clone();
	if let Some(exp) = expiration_timestamp() {
		claims.insert("exp".into(), exp.into());
	}
	sign(&claims)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn claims(database: &str) -> Claims {
		let mut claims = Claims::new();
		claims.insert("id".into(), json!(1));
		claims.insert("email".into(), json!("a@b.c"));
		claims.insert("database".into(), json!(database));
		claims
	}

	#[test]
	fn tokens_round_trip() {
		let token = sign(&claims("eshop")).unwrap();
		let verified = verify(&token).unwrap();
		assert_eq!(verified.get("email"), Some(&json!("a@b.c")));
		assert_eq!(verified.get("database"), Some(&json!("eshop")));
	}

	#[test]
	fn tampered_tokens_are_rejected() {
		let mut token = sign(&claims("eshop")).unwrap();
		token.push('x');
		assert!(verify(&token).is_err());
		assert!(verify("not-a-token").is_err());
	}

	#[test]
	fn database_scoping_is_checked_before_anything_else() {
		let token = sign(&claims("d1")).unwrap();
		assert!(verify_for_database(&token, "d1").is_ok());
		assert!(verify_for_database(&token, "d2").is_err());
	}

	#[test]
	fn bypass_all_claims_cover_every_database() {
		let mut c = claims("d1");
		c.insert("bypass_all".into(), json!(true));
		let token = sign(&c).unwrap();
		assert!(verify_for_database(&token, "d2").is_ok());
	}

	#[test]
	fn bearer_scheme_is_stripped() {
		assert_eq!(bearer_token("Bearer abc").unwrap(), "abc");
		assert_eq!(bearer_token("abc").unwrap(), "abc");
		assert!(bearer_token("Bearer ").is_err());
	}

	#[test]
	fn refresh_preserves_identity() {
		let token = sign(&claims("eshop")).unwrap();
		let original = verify(&token).unwrap();
		let refreshed = refresh(&original).unwrap();
		let verified = verify(&refreshed).unwrap();
		assert_eq!(verified.get("id"), original.get("id"));
	}
}
