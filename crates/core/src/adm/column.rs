//! Column administration: validation against the catalog, then ALTER TABLE.

use sqlx::PgPool;

use crate::adm::table::{column_definition, TableSpec};
use crate::cat::Catalog;
use crate::err::Error;
use crate::sql::log_sql;
use crate::Result;

fn resolve<'a>(
	catalog: &'a Catalog,
	table: &TableSpec,
) -> Result<&'a crate::cat::Model> {
	let tables = catalog
		.models
		.get(&table.database)
		.ok_or_else(|| Error::invalid(format!("database {} doesn't exist", table.database)))?;
	tables.get(&table.name).ok_or_else(|| {
		Error::invalid(format!(
			"table {} of database {} doesn't exist",
			table.name, table.database
		))
	})
}

pub fn validate_create_column(catalog: &Catalog, table: &TableSpec) -> Result<()> {
	let model = resolve(catalog, table)?;
	let column = table.columns.first().ok_or_else(|| {
		Error::invalid(format!(
			"no column provided for table {} of database {}",
			table.name, table.database
		))
	})?;
	if model.is_model_column(&column.name) {
		return Err(Error::invalid(format!(
			"column {} already exists for table {} of database {}",
			column.name, table.name, table.database
		)));
	}
	Ok(())
}

pub fn validate_drop_column(catalog: &Catalog, table: &TableSpec) -> Result<()> {
	let model = resolve(catalog, table)?;
	let column = table.columns.first().ok_or_else(|| {
		Error::invalid(format!(
			"no column provided for table {} of database {}",
			table.name, table.database
		))
	})?;
	if !model.is_model_column(&column.name) {
		return Err(Error::invalid(format!(
			"column {} doesn't exist for table {} of database {}",
			column.name, table.name, table.database
		)));
	}
	Ok(())
}

pub async fn create_column(pool: &PgPool, table: &TableSpec) -> Result<()> {
	let column = table.columns.first().ok_or_else(|| {
		Error::invalid(format!(
			"no column provided for table {} of database {}",
			table.name, table.database
		))
	})?;
	let definition = column_definition(column)?;
	let query = format!("ALTER TABLE {}.{} ADD COLUMN {definition}", table.database, table.name);
	sqlx::query(&query).execute(pool).await?;
	log_sql(&query);
	Ok(())
}

pub async fn drop_column(pool: &PgPool, table: &TableSpec) -> Result<()> {
	let column = table.columns.first().ok_or_else(|| {
		Error::invalid(format!(
			"no column provided for table {} of database {}",
			table.name, table.database
		))
	})?;
	if !crate::adm::valid_ident(&column.name) {
		return Err(Error::invalid(format!("illegal column name {}", column.name)));
	}
	let query =
		format!("ALTER TABLE {}.{} DROP COLUMN {}", table.database, table.name, column.name);
	sqlx::query(&query).execute(pool).await?;
	log_sql(&query);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::adm::table::ColumnSpec;
	use crate::cat::fixtures;

	fn spec(table: &str, column: &str) -> TableSpec {
		TableSpec {
			database: "eshop".into(),
			name: table.into(),
			columns: vec![ColumnSpec::new(column, "text")],
			..TableSpec::default()
		}
	}

	#[test]
	fn create_rejects_existing_and_drop_rejects_missing() {
		let catalog = fixtures::catalog();
		assert!(validate_create_column(&catalog, &spec("users", "email")).is_err());
		assert!(validate_create_column(&catalog, &spec("users", "nickname")).is_ok());
		assert!(validate_drop_column(&catalog, &spec("users", "email")).is_ok());
		assert!(validate_drop_column(&catalog, &spec("users", "nickname")).is_err());
		assert!(validate_drop_column(&catalog, &spec("ghost", "x")).is_err());
	}
}
