//! Table DDL from structured specs. The same specs drive the admin HTTP
//! surface and the internal-schema bootstrap.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sqlx::PgPool;

use crate::adm::valid_ident;
use crate::err::Error;
use crate::sql::log_sql;
use crate::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnSpec {
	pub name: String,
	#[serde(rename = "type")]
	pub ty: String,
	#[serde(default, rename = "maxLength")]
	pub max_length: i64,
	#[serde(default)]
	pub nullable: bool,
	#[serde(default, rename = "defaultValue")]
	pub default_value: Option<Json>,
	#[serde(default)]
	pub auto_increment: bool,
}

impl ColumnSpec {
	pub fn new(name: &str, ty: &str) -> ColumnSpec {
		ColumnSpec {
			name: name.into(),
			ty: ty.into(),
			..ColumnSpec::default()
		}
	}

	pub fn max_length(mut self, len: i64) -> ColumnSpec {
		self.max_length = len;
		self
	}

	pub fn nullable(mut self) -> ColumnSpec {
		self.nullable = true;
		self
	}

	pub fn default_value(mut self, value: impl Into<Json>) -> ColumnSpec {
		self.default_value = Some(value.into());
		self
	}

	pub fn auto_increment(mut self) -> ColumnSpec {
		self.auto_increment = true;
		self
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSpec {
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub columns: Vec<ColumnSpec>,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default, rename = "refDatabase")]
	pub ref_database: String,
	#[serde(default, rename = "refTable")]
	pub ref_table: String,
	#[serde(default, rename = "refColumns")]
	pub ref_columns: Vec<ColumnSpec>,
	#[serde(default, rename = "onDelete")]
	pub on_delete: String,
	#[serde(default, rename = "onUpdate")]
	pub on_update: String,
}

impl IndexSpec {
	pub fn primary(column: ColumnSpec) -> IndexSpec {
		IndexSpec {
			kind: "PRIMARY".into(),
			columns: vec![column],
			..IndexSpec::default()
		}
	}

	pub fn unique(columns: Vec<ColumnSpec>) -> IndexSpec {
		IndexSpec {
			kind: "UNIQUE".into(),
			columns,
			..IndexSpec::default()
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSpec {
	pub database: String,
	pub name: String,
	#[serde(default)]
	pub columns: Vec<ColumnSpec>,
	#[serde(default)]
	pub indexes: Vec<IndexSpec>,
}

/// Render one column of a CREATE TABLE statement. String default values are
/// spliced raw so expressions like `CURRENT_TIMESTAMP` or quoted literals
/// pass through unchanged.
pub fn column_definition(column: &ColumnSpec) -> Result<String> {
	if !valid_ident(&column.name) {
		return Err(Error::invalid(format!("illegal column name {}", column.name)));
	}
	let mut out = format!("{} {}", column.name, column.ty);
	if column.max_length != 0 {
		out.push_str(&format!("({})", column.max_length));
	}
	if !column.nullable {
		out.push_str(" NOT NULL");
	}
	if let Some(default) = &column.default_value {
		let rendered = match default {
			Json::String(s) => s.clone(),
			other => other.to_string(),
		};
		out.push_str(&format!(" DEFAULT {rendered}"));
	}
	Ok(out)
}

pub async fn create_table(pool: &PgPool, table: &TableSpec) -> Result<()> {
	if table.database.is_empty() || table.name.is_empty() {
		return Err(Error::invalid("provide database name and table name"));
	}
	if !valid_ident(&table.name) {
		return Err(Error::invalid(format!("illegal table name {}", table.name)));
	}
	let mut parts = Vec::with_capacity(table.columns.len());
	for column in &table.columns {
		parts.push(column_definition(column)?);
	}
	if parts.is_empty() {
		return Err(Error::invalid("no columns were provided"));
	}
	let query = format!(
		"CREATE TABLE IF NOT EXISTS {}.{} ({})",
		table.database,
		table.name,
		parts.join(",")
	);
	sqlx::query(&query).execute(pool).await?;
	log_sql(&query);
	Ok(())
}

pub async fn drop_table(pool: &PgPool, database: &str, table: &str) -> Result<()> {
	let query = format!("DROP TABLE {database}.{table}");
	sqlx::query(&query).execute(pool).await?;
	log_sql(&query);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn column_definitions_render_length_nullability_and_default() {
		let col = ColumnSpec::new("email", "varchar").max_length(255);
		assert_eq!(column_definition(&col).unwrap(), "email varchar(255) NOT NULL");

		let col = ColumnSpec::new("created_at", "timestamp").default_value("CURRENT_TIMESTAMP");
		assert_eq!(
			column_definition(&col).unwrap(),
			"created_at timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP"
		);

		let col = ColumnSpec::new("enabled", "boolean").default_value(false);
		assert_eq!(
			column_definition(&col).unwrap(),
			"enabled boolean NOT NULL DEFAULT false"
		);

		let col = ColumnSpec::new("note", "text").nullable();
		assert_eq!(column_definition(&col).unwrap(), "note text");
	}

	#[test]
	fn illegal_column_names_are_rejected() {
		let col = ColumnSpec::new("drop table x", "text");
		assert!(column_definition(&col).is_err());
	}
}
