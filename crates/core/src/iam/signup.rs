//! Data-user registration: validate the identity and password, hash the
//! password, insert through the mutation pipeline, and return the stored
//! row without its password field.

use serde_json::{json, Value as Json};

use crate::cat::trigger::TriggerOrigin;
use crate::cat::Engine;
use crate::err::Error;
use crate::iam::Claims;
use crate::Result;

/// A non-empty identity; anything containing `@` must parse as an email.
pub fn validate_identity(identity: &str) -> Result<()> {
	let identity = identity.trim();
	if identity.is_empty() {
		return Err(Error::invalid("identity was not provided"));
	}
	if identity.contains('@') && !is_valid_email(identity) {
		return Err(Error::invalid("identity is not a valid email address"));
	}
	Ok(())
}

fn is_valid_email(candidate: &str) -> bool {
	let Some((local, domain)) = candidate.split_once('@') else {
		return false;
	};
	!local.is_empty()
		&& !domain.is_empty()
		&& domain.contains('.')
		&& !domain.starts_with('.')
		&& !domain.ends_with('.')
		&& !candidate.contains(char::is_whitespace)
		&& !domain.contains('@')
}

/// Passwords are 8 to 16 characters after trimming.
pub fn validate_password(password: &str) -> Result<()> {
	let len = password.trim().chars().count();
	if !(8..=16).contains(&len) {
		return Err(Error::invalid("password should be between 8 and 16 characters"));
	}
	Ok(())
}

impl Engine {
	pub async fn register(
		&self,
		database: &str,
		table: &str,
		body: &serde_json::Map<String, Json>,
	) -> Result<Json> {
		let catalog = self.catalog().await;
		let entity = catalog
			.auth_entity(database, table)
			.ok_or_else(|| Error::not_found("Not Found"))?;
		let config = entity.auth_config.clone();
		drop(catalog);

		let identity = body
			.get(&config.identity_field)
			.and_then(Json::as_str)
			.ok_or_else(|| Error::invalid(format!("{} was not provided", config.identity_field)))?;
		let password = body
			.get(&config.password_field)
			.and_then(Json::as_str)
			.ok_or_else(|| Error::invalid(format!("{} was not provided", config.password_field)))?;
		validate_identity(identity)?;
		validate_password(password)?;

		let mut row = body.clone();
		row.remove("database");
		row.remove("table");
		row.insert(
			config.password_field.clone(),
			json!(bcrypt::hash(password, bcrypt::DEFAULT_COST)?),
		);

		let insert_body = json!({ table: { "objects": [row] } });
		let mut result = self
			.insert_exec(&Claims::new(), database, &insert_body, TriggerOrigin::Rest, None)
			.await?;

		// never echo the hash back
		if let Some(rows) = result.get_mut(table).and_then(Json::as_array_mut) {
			for row in rows {
				if let Some(map) = row.as_object_mut() {
					map.remove(&config.password_field);
				}
			}
		}
		Ok(result)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identities_may_be_plain_or_email() {
		assert!(validate_identity("someuser").is_ok());
		assert!(validate_identity("a@b.co").is_ok());
		assert!(validate_identity("").is_err());
		assert!(validate_identity("a@b").is_err());
		assert!(validate_identity("@b.co").is_err());
		assert!(validate_identity("a@.co").is_err());
		assert!(validate_identity("a b@c.co").is_err());
	}

	#[test]
	fn passwords_are_bounded() {
		assert!(validate_password("12345678").is_ok());
		assert!(validate_password("1234567812345678").is_ok());
		assert!(validate_password("1234567").is_err());
		assert!(validate_password("12345678123456789").is_err());
		assert!(validate_password("  12345678  ").is_ok());
	}

	#[test]
	fn hashed_passwords_verify() {
		let hash = bcrypt::hash("pw123456", 4).unwrap();
		assert!(bcrypt::verify("pw123456", &hash).unwrap());
		assert!(!bcrypt::verify("wrong", &hash).unwrap());
	}
}
