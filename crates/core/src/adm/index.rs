//! Index DDL: primary keys (with auto-increment sequences), unique indexes,
//! and foreign keys with validated referential actions.

use sqlx::PgPool;

use crate::adm::table::{ColumnSpec, IndexSpec, TableSpec};
use crate::cat::reflect;
use crate::err::Error;
use crate::sql::log_sql;
use crate::Result;

const ALLOWED_ACTIONS: [&str; 3] = ["RESTRICT", "CASCADE", "NO ACTION"];

fn valid_action(action: &str) -> bool {
	action.is_empty() || ALLOWED_ACTIONS.iter().any(|a| a.eq_ignore_ascii_case(action))
}

/// ON UPDATE / ON DELETE accept RESTRICT, CASCADE, and NO ACTION only.
pub fn validate_foreign_key_actions(index: &IndexSpec) -> bool {
	valid_action(&index.on_update) && valid_action(&index.on_delete)
}

fn column_names(columns: &[ColumnSpec]) -> Vec<String> {
	columns.iter().map(|c| c.name.clone()).collect()
}

/// Index names are derived, not user supplied: prefix, table, and the
/// sorted column list.
pub fn index_name(prefix: &str, table: &TableSpec, columns: &[ColumnSpec]) -> String {
	let mut names = column_names(columns);
	names.sort();
	format!("{prefix}_{}_{}_{}", table.database, table.name, names.join("_"))
}

pub async fn create_unique_index(
	pool: &PgPool,
	table: &TableSpec,
	index: &IndexSpec,
) -> Result<()> {
	let columns = column_names(&index.columns);
	if columns.is_empty() {
		return Err(Error::invalid("no columns were provided"));
	}
	let name = index_name("unique_idx", table, &index.columns);
	let query = format!(
		"CREATE UNIQUE INDEX IF NOT EXISTS {name} ON {}.{} ({})",
		table.database,
		table.name,
		columns.join(",")
	);
	sqlx::query(&query).execute(pool).await?;
	log_sql(&query);
	Ok(())
}

pub async fn create_foreign_index(
	pool: &PgPool,
	table: &TableSpec,
	index: &IndexSpec,
) -> Result<()> {
	if index.columns.is_empty() || index.columns.len() != index.ref_columns.len() {
		return Err(Error::invalid("invalid configuration for foreign key"));
	}
	if !validate_foreign_key_actions(index) {
		return Err(Error::invalid("invalid action configuration for foreign key"));
	}
	let columns = column_names(&index.columns);
	let ref_columns = column_names(&index.ref_columns);
	let name = index_name("foreign_idx", table, &index.columns);
	let mut query = format!(
		"ALTER TABLE {}.{} ADD CONSTRAINT {name} FOREIGN KEY ({}) REFERENCES {}.{} ({})",
		table.database,
		table.name,
		columns.join(","),
		index.ref_database,
		index.ref_table,
		ref_columns.join(",")
	);
	if !index.on_update.is_empty() {
		query.push_str(&format!(" ON UPDATE {}", index.on_update.to_uppercase()));
	}
	if !index.on_delete.is_empty() {
		query.push_str(&format!(" ON DELETE {}", index.on_delete.to_uppercase()));
	}
	sqlx::query(&query).execute(pool).await?;
	log_sql(&query);
	Ok(())
}

fn sequence_name(table: &TableSpec, column: &ColumnSpec) -> String {
	format!("{}.{}_{}", table.database, table.name, column.name)
}

fn auto_increment_column(columns: &[ColumnSpec]) -> Option<&ColumnSpec> {
	columns.iter().find(|c| c.auto_increment)
}

/// Primary keys run inside one transaction: the backing sequence, the
/// column default, and the constraint either all land or none do. A table
/// that already has a primary key is left untouched.
pub async fn create_primary_index(
	pool: &PgPool,
	table: &TableSpec,
	index: &IndexSpec,
) -> Result<()> {
	let columns = column_names(&index.columns);
	if columns.is_empty() {
		return Err(Error::invalid("no columns were provided"));
	}

	let existing = reflect::get_table_indexes(pool, &table.database, &table.name)
		.await
		.unwrap_or_default();
	if existing.iter().any(|i| i.kind == crate::cat::model::IndexKind::Primary) {
		log_sql(&format!("primary key index already exists for table: {}", table.name));
		return Ok(());
	}

	let mut tx = pool.begin().await?;

	if let Some(column) = auto_increment_column(&index.columns) {
		let sequence = sequence_name(table, column);
		let create_sequence = format!("CREATE SEQUENCE IF NOT EXISTS {sequence}");
		sqlx::query(&create_sequence).execute(&mut *tx).await?;
		log_sql(&create_sequence);
		let set_default = format!(
			"ALTER TABLE {}.{} ALTER COLUMN {} SET DEFAULT nextval('{sequence}')",
			table.database, table.name, column.name
		);
		sqlx::query(&set_default).execute(&mut *tx).await?;
		log_sql(&set_default);
	}

	let name = index_name("primary_idx", table, &index.columns);
	let query = format!(
		"ALTER TABLE {}.{} ADD CONSTRAINT {name} PRIMARY KEY ({})",
		table.database,
		table.name,
		columns.join(",")
	);
	sqlx::query(&query).execute(&mut *tx).await?;
	log_sql(&query);

	tx.commit().await?;
	Ok(())
}

pub async fn create_index(pool: &PgPool, table: &TableSpec, index: &IndexSpec) -> Result<()> {
	match index.kind.as_str() {
		"UNIQUE" => create_unique_index(pool, table, index).await,
		"FOREIGN" => create_foreign_index(pool, table, index).await,
		"PRIMARY" => create_primary_index(pool, table, index).await,
		_ => Ok(()),
	}
}

pub async fn create_indexes(pool: &PgPool, table: &TableSpec) -> Result<()> {
	for index in &table.indexes {
		if let Err(err) = create_index(pool, table, index).await {
			log_sql(&err.to_string());
			return Err(err);
		}
	}
	Ok(())
}

pub async fn drop_index(pool: &PgPool, index_name: &str) -> Result<()> {
	if !crate::adm::valid_ident(index_name) {
		return Err(Error::invalid(format!("illegal index name {index_name}")));
	}
	let query = format!("DROP INDEX {index_name}");
	sqlx::query(&query).execute(pool).await?;
	log_sql(&query);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn spec() -> TableSpec {
		TableSpec {
			database: "eshop".into(),
			name: "orders".into(),
			..TableSpec::default()
		}
	}

	#[test]
	fn index_names_sort_their_columns() {
		let cols = vec![ColumnSpec::new("b", "int"), ColumnSpec::new("a", "int")];
		assert_eq!(index_name("unique_idx", &spec(), &cols), "unique_idx_eshop_orders_a_b");
	}

	#[test]
	fn foreign_key_actions_are_validated_case_insensitively() {
		let mut index = IndexSpec {
			kind: "FOREIGN".into(),
			on_delete: "cascade".into(),
			..IndexSpec::default()
		};
		assert!(validate_foreign_key_actions(&index));
		index.on_update = "SET NULL".into();
		assert!(!validate_foreign_key_actions(&index));
		index.on_update.clear();
		assert!(validate_foreign_key_actions(&index));
	}
}
