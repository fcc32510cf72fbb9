//! Data-user login: look up the auth entity, select the identity row
//! through the regular select pipeline, verify the password hash, and sign
//! the row (minus the password) into a token.

use serde_json::{json, Value as Json};

use crate::cat::Engine;
use crate::err::Error;
use crate::iam::{token, Claims};
use crate::Result;

/// Extract the identity and password values named by the auth config from
/// the request body.
fn credentials<'a>(
	body: &'a serde_json::Map<String, Json>,
	identity_field: &str,
	password_field: &str,
) -> Result<(&'a str, &'a str)> {
	let identity = body
		.get(identity_field)
		.and_then(Json::as_str)
		.ok_or_else(|| Error::invalid(format!("{identity_field} was not provided")))?;
	let password = body
		.get(password_field)
		.and_then(Json::as_str)
		.ok_or_else(|| Error::invalid(format!("{password_field} was not provided")))?;
	Ok((identity, password))
}

impl Engine {
	/// Authenticate a data user against its (database, table) auth entity
	/// and return a signed token carrying the row as claims.
	pub async fn login(
		&self,
		database: &str,
		table: &str,
		body: &serde_json::Map<String, Json>,
	) -> Result<String> {
		let catalog = self.catalog().await;
		let entity = catalog
			.auth_entity(database, table)
			.ok_or_else(|| Error::not_found("Not Found"))?;
		let config = entity.auth_config.clone();
		let (identity, password) = credentials(body, &config.identity_field, &config.password_field)?;

		// the lookup runs through the select compiler, augmented with the
		// entity's base query
		let mut filter = serde_json::Map::new();
		filter.insert(config.identity_field.clone(), json!({"_eq": identity}));
		if let Some(base) = config.base_query.as_ref().and_then(Json::as_object) {
			for (key, value) in base {
				filter.insert(key.clone(), value.clone());
			}
		}
		let select_body = json!({ table: { "_where": filter, "_limit": 1 } });
		drop(catalog);

		let result = self.select_exec(&Claims::new(), database, &select_body).await?;
		let row = result
			.get(table)
			.and_then(Json::as_array)
			.and_then(|rows| rows.first())
			.and_then(Json::as_object)
			.ok_or_else(|| Error::unauthenticated("unauthorized"))?;

		let hash = row
			.get(&config.password_field)
			.and_then(Json::as_str)
			.ok_or_else(|| Error::unauthenticated("unauthorized"))?;
		if !bcrypt::verify(password, hash)? {
			return Err(Error::unauthenticated("unauthorized"));
		}

		let mut claims: Claims = row.clone();
		claims.remove(&config.password_field);
		claims.insert("database".into(), json!(database));
		if let Some(exp) = token::expiration_timestamp() {
			claims.insert("exp".into(), exp.into());
		}
		token::sign(&claims)
	}
}
