//! Data triggers: per-(database, table) notification records with per-
//! operation and per-origin enablement stored as a JSON config blob.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;

use crate::cnf;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOrigin {
	Rest,
	GraphQl,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
	#[serde(default, rename = "rest")]
	pub rest_enabled: bool,
	#[serde(default, rename = "graphql")]
	pub graphql_enabled: bool,
	#[serde(default, rename = "insert")]
	pub insert_enabled: bool,
	#[serde(default, rename = "update")]
	pub update_enabled: bool,
	#[serde(default, rename = "delete")]
	pub delete_enabled: bool,
	#[serde(default, rename = "error")]
	pub error_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTrigger {
	#[serde(default)]
	pub id: i64,
	pub database: String,
	pub table: String,
	#[serde(default)]
	pub config: TriggerConfig,
}

impl DataTrigger {
	pub fn allows_origin(&self, origin: TriggerOrigin) -> bool {
		match origin {
			TriggerOrigin::Rest => self.config.rest_enabled,
			TriggerOrigin::GraphQl => self.config.graphql_enabled,
		}
	}

	pub fn allows_operation(&self, operation: &str) -> bool {
		match operation {
			super::webhook::INSERT_OPERATION => self.config.insert_enabled,
			super::webhook::UPDATE_OPERATION => self.config.update_enabled,
			super::webhook::DELETE_OPERATION => self.config.delete_enabled,
			super::webhook::ERROR_OPERATION => self.config.error_enabled,
			_ => false,
		}
	}
}

pub async fn load_triggers(pool: &PgPool) -> Result<HashMap<(String, String), DataTrigger>> {
	let query = format!(
		"SELECT id,db,tbl,trigger_config FROM {}.engine_data_triggers",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	let rows = sqlx::query(&query).fetch_all(pool).await?;
	let mut triggers = HashMap::new();
	for row in rows {
		let config: Json = row.try_get(3)?;
		let trigger = DataTrigger {
			id: row.try_get(0)?,
			database: row.try_get(1)?,
			table: row.try_get(2)?,
			config: serde_json::from_value(config).unwrap_or_default(),
		};
		triggers.insert((trigger.database.clone(), trigger.table.clone()), trigger);
	}
	Ok(triggers)
}

pub async fn create_trigger(pool: &PgPool, trigger: &DataTrigger) -> Result<()> {
	let query = format!(
		"INSERT INTO {}.engine_data_triggers(db,tbl,trigger_config) VALUES($1,$2,$3)",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	sqlx::query(&query)
		.bind(&trigger.database)
		.bind(&trigger.table)
		.bind(serde_json::to_value(&trigger.config)?)
		.execute(pool)
		.await?;
	Ok(())
}

pub async fn delete_trigger(pool: &PgPool, id: i64) -> Result<()> {
	let query = format!(
		"DELETE FROM {}.engine_data_triggers WHERE id = $1",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	sqlx::query(&query).bind(id).execute(pool).await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn trigger_gating_is_per_operation_and_per_origin() {
		let trigger = DataTrigger {
			id: 1,
			database: "eshop".into(),
			table: "orders".into(),
			config: TriggerConfig {
				rest_enabled: true,
				insert_enabled: true,
				..TriggerConfig::default()
			},
		};
		assert!(trigger.allows_origin(TriggerOrigin::Rest));
		assert!(!trigger.allows_origin(TriggerOrigin::GraphQl));
		assert!(trigger.allows_operation("INSERT"));
		assert!(!trigger.allows_operation("DELETE"));
		assert!(!trigger.allows_operation("TRUNCATE"));
	}

	#[test]
	fn trigger_config_parses_from_json_blob() {
		let config: TriggerConfig =
			serde_json::from_value(serde_json::json!({"rest": true, "update": true})).unwrap();
		assert!(config.rest_enabled);
		assert!(config.update_enabled);
		assert!(!config.insert_enabled);
	}
}
