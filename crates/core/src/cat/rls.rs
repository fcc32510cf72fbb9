//! Row-level-security policies: engine records in the internal schema plus
//! the real `pg_policies` entries they manage. The `enabled` flag reflects
//! whether the database actually carries the policy.

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

use crate::cat::Catalog;
use crate::cnf;
use crate::err::Error;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlsPolicy {
	#[serde(default)]
	pub id: i64,
	pub policy_name: String,
	/// SELECT, INSERT, UPDATE, or DELETE
	pub policy_for: String,
	/// PERMISSIVE or RESTRICTIVE
	pub policy_type: String,
	pub database: String,
	pub table: String,
	#[serde(default)]
	pub enabled: bool,
	/// The raw predicate supplied by the engineer
	pub sql: String,
	#[serde(default)]
	pub description: Option<String>,
}

pub fn validate_policy_for(policy: &RlsPolicy) -> Result<()> {
	match policy.policy_for.as_str() {
		"SELECT" | "INSERT" | "UPDATE" | "DELETE" => Ok(()),
		_ => Err(Error::invalid("not supported policy for configuration")),
	}
}

pub fn validate_policy_type(policy: &RlsPolicy) -> Result<()> {
	match policy.policy_type.as_str() {
		"PERMISSIVE" | "RESTRICTIVE" => Ok(()),
		_ => Err(Error::invalid("not supported policy type")),
	}
}

pub fn format_policy_name(policy: &RlsPolicy) -> String {
	policy.policy_name.trim().to_lowercase()
}

pub fn validate_policy_name(catalog: &Catalog, name: &str, unique: bool) -> Result<()> {
	if name.is_empty() {
		return Err(Error::invalid("no policy name was provided"));
	}
	if !crate::adm::valid_ident(name) {
		return Err(Error::invalid(format!("illegal policy name {name}")));
	}
	if unique && catalog.policies.iter().any(|p| p.policy_name == name) {
		return Err(Error::invalid("policy name is not unique"));
	}
	Ok(())
}

pub fn validate_policy_sql(policy: &RlsPolicy) -> Result<()> {
	if policy.sql.trim().is_empty() {
		return Err(Error::invalid("please provide condition for policy"));
	}
	Ok(())
}

/// SELECT policies constrain visible rows with USING; statement policies
/// (INSERT) gate written rows with WITH CHECK.
fn policy_statement(policy: &RlsPolicy) -> String {
	let clause = if policy.policy_for == "INSERT" { "WITH CHECK" } else { "USING" };
	format!(
		"CREATE POLICY {} ON {}.{} AS {} FOR {} {clause} ({})",
		policy.policy_name,
		policy.database,
		policy.table,
		policy.policy_type,
		policy.policy_for,
		policy.sql
	)
}

/// Load engine policy records and mark the ones the database enforces.
pub async fn load_policies(pool: &PgPool) -> Result<Vec<RlsPolicy>> {
	let live = sqlx::query("SELECT policyname, tablename, schemaname FROM pg_policies")
		.fetch_all(pool)
		.await?;
	let live: Vec<(String, String, String)> = live
		.iter()
		.map(|row| {
			Ok::<_, Error>((row.try_get(0)?, row.try_get(1)?, row.try_get(2)?))
		})
		.collect::<Result<_>>()?;

	let query = format!(
		"SELECT id,policy_name,policy_for,policy_type,db,tbl,enabled,sql_input,description \
		 FROM {}.engine_row_level_security",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	let rows = sqlx::query(&query).fetch_all(pool).await?;
	let mut policies = Vec::with_capacity(rows.len());
	for row in rows {
		let mut policy = RlsPolicy {
			id: row.try_get(0)?,
			policy_name: row.try_get(1)?,
			policy_for: row.try_get(2)?,
			policy_type: row.try_get(3)?,
			database: row.try_get(4)?,
			table: row.try_get(5)?,
			enabled: row.try_get(6)?,
			sql: row.try_get(7)?,
			description: row.try_get(8)?,
		};
		policy.enabled = live.iter().any(|(name, table, schema)| {
			*name == policy.policy_name && *table == policy.table && *schema == policy.database
		});
		policies.push(policy);
	}
	Ok(policies)
}

pub async fn enable_rls_for_table(
	pool: &PgPool,
	database: &str,
	table: &str,
	force: bool,
) -> Result<()> {
	let query = format!("ALTER TABLE {database}.{table} ENABLE ROW LEVEL SECURITY");
	sqlx::query(&query).execute(pool).await?;
	if force {
		let query = format!("ALTER TABLE {database}.{table} FORCE ROW LEVEL SECURITY");
		sqlx::query(&query).execute(pool).await?;
	}
	Ok(())
}

pub async fn disable_rls_for_table(pool: &PgPool, database: &str, table: &str) -> Result<()> {
	let query = format!("ALTER TABLE {database}.{table} DISABLE ROW LEVEL SECURITY");
	sqlx::query(&query).execute(pool).await?;
	Ok(())
}

/// Enable (and force) row security on every table of a database.
pub async fn enable_rls_for_database(
	pool: &PgPool,
	catalog: &Catalog,
	database: &str,
) -> Result<()> {
	let tables = catalog
		.models
		.get(database)
		.ok_or_else(|| Error::invalid(format!("no tables available for database {database}")))?;
	for model in tables.values() {
		enable_rls_for_table(pool, &model.database, &model.table, true).await?;
	}
	Ok(())
}

pub async fn disable_rls_for_database(
	pool: &PgPool,
	catalog: &Catalog,
	database: &str,
) -> Result<()> {
	let tables = catalog
		.models
		.get(database)
		.ok_or_else(|| Error::invalid(format!("no tables available for database {database}")))?;
	for model in tables.values() {
		disable_rls_for_table(pool, &model.database, &model.table).await?;
	}
	Ok(())
}

/// Validate, create the pg policy, record it, and switch row security on
/// for the affected table.
pub async fn create_policy(pool: &PgPool, catalog: &Catalog, input: &RlsPolicy) -> Result<()> {
	catalog.model(&input.database, &input.table)?;
	validate_policy_for(input)?;
	validate_policy_type(input)?;
	let mut policy = input.clone();
	policy.policy_name = format_policy_name(input);
	validate_policy_name(catalog, &policy.policy_name, true)?;
	validate_policy_sql(&policy)?;

	let statement = policy_statement(&policy);
	sqlx::query(&statement).execute(pool).await?;

	let record = format!(
		"INSERT INTO {}.engine_row_level_security\
		 (policy_name,policy_for,policy_type,db,tbl,enabled,sql_input,description) \
		 VALUES($1,$2,$3,$4,$5,$6,$7,$8)",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	sqlx::query(&record)
		.bind(&policy.policy_name)
		.bind(&policy.policy_for)
		.bind(&policy.policy_type)
		.bind(&policy.database)
		.bind(&policy.table)
		.bind(policy.enabled)
		.bind(&statement)
		.bind(&policy.description)
		.execute(pool)
		.await?;

	enable_rls_for_table(pool, &policy.database, &policy.table, true).await?;
	Ok(())
}

pub async fn drop_policy(pool: &PgPool, catalog: &Catalog, input: &RlsPolicy) -> Result<()> {
	catalog.model(&input.database, &input.table)?;
	if !crate::adm::valid_ident(&input.policy_name) {
		return Err(Error::invalid(format!("illegal policy name {}", input.policy_name)));
	}
	let statement = format!(
		"DROP POLICY IF EXISTS {} ON {}.{}",
		input.policy_name, input.database, input.table
	);
	sqlx::query(&statement).execute(pool).await?;

	let record = format!(
		"DELETE FROM {}.engine_row_level_security WHERE policy_name = $1",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	sqlx::query(&record).bind(&input.policy_name).execute(pool).await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cat::fixtures;

	fn policy() -> RlsPolicy {
		RlsPolicy {
			id: 0,
			policy_name: "Owner_Only".into(),
			policy_for: "SELECT".into(),
			policy_type: "PERMISSIVE".into(),
			database: "eshop".into(),
			table: "orders".into(),
			enabled: false,
			sql: "user_id = (current_setting('my.jwt_user')::json->>'id')::bigint".into(),
			description: None,
		}
	}

	#[test]
	fn policy_enums_are_validated() {
		let mut p = policy();
		assert!(validate_policy_for(&p).is_ok());
		assert!(validate_policy_type(&p).is_ok());
		p.policy_for = "TRUNCATE".into();
		assert!(validate_policy_for(&p).is_err());
		p.policy_type = "SOFT".into();
		assert!(validate_policy_type(&p).is_err());
	}

	#[test]
	fn policy_names_are_normalised_and_unique() {
		let catalog = fixtures::catalog();
		let p = policy();
		assert_eq!(format_policy_name(&p), "owner_only");
		assert!(validate_policy_name(&catalog, "owner_only", true).is_ok());
		assert!(validate_policy_name(&catalog, "", true).is_err());
		assert!(validate_policy_name(&catalog, "bad name", true).is_err());
	}

	#[test]
	fn select_policies_use_using_and_insert_policies_check() {
		let mut p = policy();
		p.policy_name = "owner_only".into();
		assert_eq!(
			policy_statement(&p),
			"CREATE POLICY owner_only ON eshop.orders AS PERMISSIVE FOR SELECT USING \
			 (user_id = (current_setting('my.jwt_user')::json->>'id')::bigint)"
		);
		p.policy_for = "INSERT".into();
		assert!(policy_statement(&p).contains("WITH CHECK ("));
	}
}
