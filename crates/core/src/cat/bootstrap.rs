//! Startup provisioning: the internal schema, the engine tables, and the
//! super-user role. Everything here is idempotent (`CREATE ... IF NOT
//! EXISTS` throughout) so a restart over an initialised database is a
//! no-op.

use sqlx::PgPool;

use crate::adm::table::{ColumnSpec, IndexSpec, TableSpec};
use crate::adm::{database, index, table};
use crate::cnf;
use crate::Result;

fn id_column(ty: &str) -> ColumnSpec {
	ColumnSpec::new("id", ty).auto_increment()
}

fn created_at_column() -> ColumnSpec {
	ColumnSpec::new("created_at", "timestamp").default_value("CURRENT_TIMESTAMP")
}

fn varchar(name: &str) -> ColumnSpec {
	ColumnSpec::new(name, "varchar").max_length(255)
}

fn engine_table(name: &str, columns: Vec<ColumnSpec>, mut indexes: Vec<IndexSpec>) -> TableSpec {
	let id = columns.first().cloned().expect("engine tables lead with their id column");
	indexes.insert(0, IndexSpec::primary(id));
	TableSpec {
		database: cnf::INTERNAL_SCHEMA_NAME.clone(),
		name: name.into(),
		columns,
		indexes,
	}
}

fn engine_tables() -> Vec<TableSpec> {
	vec![
		engine_table(
			"engine_logs",
			vec![
				id_column("int"),
				varchar("log_type"),
				created_at_column(),
				ColumnSpec::new("log_data", "json"),
			],
			vec![],
		),
		engine_table(
			"engine_webhooks",
			vec![
				id_column("int"),
				varchar("endpoint"),
				varchar("db"),
				varchar("db_table"),
				varchar("operation"),
				ColumnSpec::new("enabled", "boolean").default_value(false),
				ColumnSpec::new("rest", "boolean").default_value(false),
				ColumnSpec::new("graphql", "boolean").default_value(false),
				ColumnSpec::new("forward_auth_headers", "boolean").default_value(false),
				varchar("type").default_value("'POST_EXEC'"),
				created_at_column(),
			],
			vec![IndexSpec::unique(vec![
				varchar("endpoint"),
				varchar("db"),
				varchar("db_table"),
				varchar("operation"),
			])],
		),
		engine_table(
			"engine_auth_provider",
			vec![
				id_column("bigint"),
				ColumnSpec::new("auth_config", "jsonb"),
				varchar("db"),
				varchar("tbl"),
				created_at_column(),
			],
			vec![],
		),
		engine_table(
			"engine_data_triggers",
			vec![
				id_column("bigint"),
				ColumnSpec::new("trigger_config", "jsonb"),
				varchar("db"),
				varchar("tbl"),
				created_at_column(),
			],
			vec![],
		),
		engine_table(
			"relations",
			vec![
				id_column("bigint"),
				varchar("alias"),
				varchar("db"),
				varchar("from_table"),
				varchar("to_table"),
				varchar("from_column"),
				varchar("to_column"),
				varchar("relation"),
			],
			vec![IndexSpec::unique(vec![varchar("alias")])],
		),
		engine_table(
			"engine_api_keys",
			vec![
				id_column("bigint"),
				varchar("api_key"),
				created_at_column(),
				ColumnSpec::new("enabled", "boolean").default_value(false),
			],
			vec![IndexSpec::unique(vec![varchar("api_key")])],
		),
		engine_table(
			"engine_rest_actions",
			vec![
				id_column("bigint"),
				varchar("endpoint"),
				varchar("method"),
				varchar("db"),
				ColumnSpec::new("query", "text"),
				ColumnSpec::new("auth", "boolean").default_value(false),
				ColumnSpec::new("enabled", "boolean").default_value(false),
				created_at_column(),
			],
			vec![IndexSpec::unique(vec![varchar("endpoint"), varchar("method")])],
		),
		engine_table(
			"engine_row_level_security",
			vec![
				id_column("bigint"),
				varchar("db"),
				varchar("tbl"),
				varchar("policy_type"),
				varchar("policy_name"),
				varchar("policy_for"),
				ColumnSpec::new("enabled", "boolean").default_value(false),
				ColumnSpec::new("sql_input", "text"),
				ColumnSpec::new("description", "text").nullable(),
				created_at_column(),
			],
			vec![],
		),
	]
}

/// Create the internal schema and every engine table.
pub async fn initialize_internal_schema(pool: &PgPool) -> Result<()> {
	database::create_database(pool, &cnf::INTERNAL_SCHEMA_NAME).await?;
	for spec in engine_tables() {
		table::create_table(pool, &spec).await?;
		index::create_indexes(pool, &spec).await?;
	}
	Ok(())
}

/// Provision the configured super-user role. Failure is logged, not fatal:
/// the role usually exists already, or the connecting user lacks CREATEROLE.
pub async fn create_super_user(pool: &PgPool) {
	let query = format!(
		"CREATE ROLE {} WITH LOGIN PASSWORD '{}'",
		&*cnf::SUPER_USER,
		&*cnf::SUPER_USER_PASSWORD
	);
	if let Err(err) = sqlx::query(&query).execute(pool).await {
		debug!(target: "lattice::cat", "super user provisioning skipped: {err}");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_engine_table_has_a_primary_key_and_created_at_or_id() {
		let tables = engine_tables();
		assert_eq!(tables.len(), 8);
		for spec in &tables {
			assert_eq!(spec.indexes[0].kind, "PRIMARY");
			assert_eq!(spec.columns[0].name, "id");
			assert!(spec.columns[0].auto_increment);
		}
	}

	#[test]
	fn natural_keys_are_unique() {
		let tables = engine_tables();
		let relations = tables.iter().find(|t| t.name == "relations").unwrap();
		assert!(relations
			.indexes
			.iter()
			.any(|i| i.kind == "UNIQUE" && i.columns.iter().any(|c| c.name == "alias")));
		let actions = tables.iter().find(|t| t.name == "engine_rest_actions").unwrap();
		assert!(actions.indexes.iter().any(|i| i.kind == "UNIQUE" && i.columns.len() == 2));
	}
}
