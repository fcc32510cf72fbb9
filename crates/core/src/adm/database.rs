//! Database (schema) administration. A "database" in the gateway is a
//! Postgres schema; the engine's internal schema can never be targeted.

use sqlx::PgPool;

use crate::adm::valid_ident;
use crate::cnf;
use crate::err::Error;
use crate::sql::log_sql;
use crate::Result;

/// Normalise and validate a user-supplied database name.
pub fn format_database_name(database: &str) -> Result<String> {
	let name = database.trim().to_lowercase();
	if name.is_empty() {
		return Err(Error::invalid("database name has 0 length"));
	}
	if name == *cnf::INTERNAL_SCHEMA_NAME {
		return Err(Error::invalid(
			"cannot create database with the same name as the internal schema",
		));
	}
	if !valid_ident(&name) {
		return Err(Error::invalid(format!("illegal database name {name}")));
	}
	Ok(name)
}

pub async fn create_database(pool: &PgPool, database: &str) -> Result<()> {
	let query = format!("CREATE SCHEMA IF NOT EXISTS {database}");
	sqlx::query(&query).execute(pool).await?;
	log_sql(&query);
	Ok(())
}

pub async fn drop_database(pool: &PgPool, database: &str) -> Result<()> {
	let query = format!("DROP SCHEMA IF EXISTS {database} CASCADE");
	sqlx::query(&query).execute(pool).await?;
	log_sql(&query);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn database_names_are_normalised() {
		assert_eq!(format_database_name("  EShop ").unwrap(), "eshop");
		assert!(format_database_name("").is_err());
		assert!(format_database_name("bad name").is_err());
		assert!(format_database_name("root_engine").is_err());
	}
}
