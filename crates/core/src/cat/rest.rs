//! Custom REST handlers: engineer-supplied parameterized SQL bound to an
//! endpoint under `/rest`. The SQL is trusted, but user values still go
//! through driver parameter binding.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

use crate::cat::Catalog;
use crate::cnf;
use crate::err::Error;
use crate::Result;

static ENDPOINT: Lazy<Regex> = Lazy::new(|| Regex::new("^/rest(/[a-zA-Z0-9_]+)+$").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestHandler {
	#[serde(default)]
	pub id: i64,
	pub database: String,
	pub method: String,
	pub endpoint: String,
	pub query: String,
	#[serde(default)]
	pub enabled: bool,
	#[serde(default)]
	pub auth: bool,
}

pub fn validate_method(handler: &RestHandler) -> Result<()> {
	match handler.method.as_str() {
		"GET" | "POST" | "PUT" | "PATCH" | "DELETE" => Ok(()),
		_ => Err(Error::invalid("not supported method")),
	}
}

pub fn validate_endpoint(handler: &RestHandler) -> Result<()> {
	if !ENDPOINT.is_match(&handler.endpoint) {
		return Err(Error::invalid(
			"endpoint should start with /rest/ and should contain only letters numbers and underscores",
		));
	}
	Ok(())
}

pub fn validate_database(catalog: &Catalog, handler: &RestHandler) -> Result<()> {
	let database = handler.database.trim().to_lowercase();
	if database.is_empty() {
		return Err(Error::invalid("database name was not provided"));
	}
	if database == *cnf::INTERNAL_SCHEMA_NAME {
		return Err(Error::invalid(format!(
			"cannot use {database} database for this action"
		)));
	}
	if !catalog.database_exists(&database) {
		return Err(Error::invalid(format!("database {database} doesn't exist")));
	}
	Ok(())
}

/// A handler's SQL must at least prepare: syntax errors surface without the
/// statement ever running.
pub async fn check_sql_validity(pool: &PgPool, query: &str) -> Result<()> {
	if query.is_empty() {
		return Err(Error::invalid("query was not provided"));
	}
	use sqlx::Executor;
	pool.prepare(query).await?;
	Ok(())
}

pub async fn load_rest_handlers(pool: &PgPool) -> Result<Vec<RestHandler>> {
	let query = format!(
		"SELECT id,method,endpoint,db,query,enabled,auth FROM {}.engine_rest_actions",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	let rows = sqlx::query(&query).fetch_all(pool).await?;
	let mut handlers = Vec::with_capacity(rows.len());
	for row in rows {
		handlers.push(RestHandler {
			id: row.try_get(0)?,
			method: row.try_get(1)?,
			endpoint: row.try_get(2)?,
			database: row.try_get(3)?,
			query: row.try_get(4)?,
			enabled: row.try_get(5)?,
			auth: row.try_get(6)?,
		});
	}
	Ok(handlers)
}

pub async fn create_rest_handler(
	pool: &PgPool,
	catalog: &Catalog,
	handler: &RestHandler,
) -> Result<()> {
	let mut handler = handler.clone();
	handler.database = handler.database.trim().to_lowercase();
	handler.query = handler.query.trim().to_owned();
	validate_database(catalog, &handler)?;
	validate_method(&handler)?;
	validate_endpoint(&handler)?;
	check_sql_validity(pool, &handler.query).await?;

	let query = format!(
		"INSERT INTO {}.engine_rest_actions(endpoint,method,db,query,enabled,auth) \
		 VALUES($1,$2,$3,$4,$5,$6)",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	sqlx::query(&query)
		.bind(&handler.endpoint)
		.bind(&handler.method)
		.bind(&handler.database)
		.bind(&handler.query)
		.bind(handler.enabled)
		.bind(handler.auth)
		.execute(pool)
		.await?;
	Ok(())
}

pub async fn update_rest_handler(
	pool: &PgPool,
	catalog: &Catalog,
	handler: &RestHandler,
) -> Result<()> {
	if handler.id == 0 {
		return Err(Error::invalid("rest handler id was not provided"));
	}
	let mut handler = handler.clone();
	handler.database = handler.database.trim().to_lowercase();
	handler.query = handler.query.trim().to_owned();
	validate_database(catalog, &handler)?;
	validate_method(&handler)?;
	validate_endpoint(&handler)?;
	check_sql_validity(pool, &handler.query).await?;

	let query = format!(
		"UPDATE {}.engine_rest_actions SET endpoint = $1, method = $2, db = $3, query = $4, \
		 enabled = $5, auth = $6 WHERE id = $7",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	sqlx::query(&query)
		.bind(&handler.endpoint)
		.bind(&handler.method)
		.bind(&handler.database)
		.bind(&handler.query)
		.bind(handler.enabled)
		.bind(handler.auth)
		.bind(handler.id)
		.execute(pool)
		.await?;
	Ok(())
}

pub async fn delete_rest_handler(pool: &PgPool, id: i64) -> Result<()> {
	let query = format!(
		"DELETE FROM {}.engine_rest_actions WHERE id = $1",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	sqlx::query(&query).bind(id).execute(pool).await?;
	Ok(())
}

/// Cascade: dropping a database removes its custom handlers.
pub async fn delete_rest_handlers_by_database(pool: &PgPool, database: &str) -> Result<()> {
	let query = format!(
		"DELETE FROM {}.engine_rest_actions WHERE db = $1",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	sqlx::query(&query).bind(database).execute(pool).await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn handler(endpoint: &str, method: &str) -> RestHandler {
		RestHandler {
			id: 0,
			database: "eshop".into(),
			method: method.into(),
			endpoint: endpoint.into(),
			query: "SELECT 1".into(),
			enabled: true,
			auth: false,
		}
	}

	#[test]
	fn endpoint_shape_is_enforced() {
		for accepted in ["/rest/x", "/rest/x/y", "/rest/abc_123"] {
			assert!(validate_endpoint(&handler(accepted, "GET")).is_ok(), "{accepted}");
		}
		for rejected in ["/rest", "/rest/", "/foo/bar", "/rest/x-y", "/rest/x/"] {
			assert!(validate_endpoint(&handler(rejected, "GET")).is_err(), "{rejected}");
		}
	}

	#[test]
	fn only_known_methods_are_accepted() {
		for accepted in ["GET", "POST", "PUT", "PATCH", "DELETE"] {
			assert!(validate_method(&handler("/rest/x", accepted)).is_ok());
		}
		assert!(validate_method(&handler("/rest/x", "TRACE")).is_err());
	}
}
