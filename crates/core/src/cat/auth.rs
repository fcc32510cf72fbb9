//! Auth entities: the (database, table) pairs allowed to serve login and
//! register, each with its identity/password field configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sqlx::{PgPool, Row};

use crate::cnf;
use crate::Result;

/// Field configuration for an auth-serving table. `base_query` is an extra
/// `_where` fragment merged into the login lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
	pub identity_field: String,
	pub password_field: String,
	#[serde(default)]
	pub base_query: Option<Json>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthEntity {
	#[serde(default)]
	pub id: i64,
	pub database: String,
	pub table: String,
	pub auth_config: AuthConfig,
}

pub async fn load_auth_entities(pool: &PgPool) -> Result<Vec<AuthEntity>> {
	let query = format!(
		"SELECT id,db,tbl,auth_config FROM {}.engine_auth_provider",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	let rows = sqlx::query(&query).fetch_all(pool).await?;
	let mut entities = Vec::with_capacity(rows.len());
	for row in rows {
		let config: Json = row.try_get(3)?;
		let auth_config: AuthConfig = serde_json::from_value(config).unwrap_or_default();
		entities.push(AuthEntity {
			id: row.try_get(0)?,
			database: row.try_get(1)?,
			table: row.try_get(2)?,
			auth_config,
		});
	}
	Ok(entities)
}

pub async fn create_auth_entity(pool: &PgPool, entity: &AuthEntity) -> Result<()> {
	let query = format!(
		"INSERT INTO {}.engine_auth_provider(db,tbl,auth_config) VALUES($1,$2,$3)",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	sqlx::query(&query)
		.bind(&entity.database)
		.bind(&entity.table)
		.bind(serde_json::to_value(&entity.auth_config)?)
		.execute(pool)
		.await?;
	Ok(())
}

pub async fn delete_auth_entity(pool: &PgPool, id: i64) -> Result<()> {
	let query = format!(
		"DELETE FROM {}.engine_auth_provider WHERE id = $1",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	sqlx::query(&query).bind(id).execute(pool).await?;
	Ok(())
}
