//! Webhook records, keyed by (database, table, operation, timing).

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;

use crate::cnf;
use crate::Result;

pub const PRE_EXEC: &str = "PRE_EXEC";
pub const POST_EXEC: &str = "POST_EXEC";

pub const INSERT_OPERATION: &str = "INSERT";
pub const UPDATE_OPERATION: &str = "UPDATE";
pub const DELETE_OPERATION: &str = "DELETE";
pub const ERROR_OPERATION: &str = "ERROR";

pub type WebhookKey = (String, String, String, String);

fn default_timing() -> String {
	POST_EXEC.to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
	#[serde(default)]
	pub id: i64,
	pub endpoint: String,
	#[serde(default)]
	pub enabled: bool,
	pub database: String,
	pub table: String,
	pub operation: String,
	#[serde(default)]
	pub rest_enabled: bool,
	#[serde(default)]
	pub graphql_enabled: bool,
	#[serde(rename = "type", default = "default_timing")]
	pub timing: String,
	#[serde(default)]
	pub forward_auth_headers: bool,
}

pub async fn load_webhooks(pool: &PgPool) -> Result<HashMap<WebhookKey, Vec<Webhook>>> {
	let query = format!(
		"SELECT id,endpoint,enabled,db,db_table,operation,rest,graphql,type,\
		 forward_auth_headers FROM {}.engine_webhooks",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	let rows = sqlx::query(&query).fetch_all(pool).await?;
	let mut webhooks: HashMap<WebhookKey, Vec<Webhook>> = HashMap::new();
	for row in rows {
		let webhook = Webhook {
			id: i64::from(row.try_get::<i32, _>(0)?),
			endpoint: row.try_get(1)?,
			enabled: row.try_get(2)?,
			database: row.try_get(3)?,
			table: row.try_get(4)?,
			operation: row.try_get(5)?,
			rest_enabled: row.try_get(6)?,
			graphql_enabled: row.try_get(7)?,
			timing: row.try_get(8)?,
			forward_auth_headers: row.try_get(9)?,
		};
		let key = (
			webhook.database.clone(),
			webhook.table.clone(),
			webhook.operation.clone(),
			webhook.timing.clone(),
		);
		webhooks.entry(key).or_default().push(webhook);
	}
	Ok(webhooks)
}

pub async fn create_webhook(pool: &PgPool, webhook: &Webhook) -> Result<()> {
	let query = format!(
		"INSERT INTO {}.engine_webhooks(endpoint,db,db_table,operation,enabled,rest,graphql,\
		 forward_auth_headers,type) VALUES($1,$2,$3,$4,$5,$6,$7,$8,$9)",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	sqlx::query(&query)
		.bind(&webhook.endpoint)
		.bind(&webhook.database)
		.bind(&webhook.table)
		.bind(&webhook.operation)
		.bind(webhook.enabled)
		.bind(webhook.rest_enabled)
		.bind(webhook.graphql_enabled)
		.bind(webhook.forward_auth_headers)
		.bind(&webhook.timing)
		.execute(pool)
		.await?;
	Ok(())
}

pub async fn delete_webhook(pool: &PgPool, id: i64) -> Result<()> {
	let query =
		format!("DELETE FROM {}.engine_webhooks WHERE id = $1", &*cnf::INTERNAL_SCHEMA_NAME);
	sqlx::query(&query).bind(id).execute(pool).await?;
	Ok(())
}
