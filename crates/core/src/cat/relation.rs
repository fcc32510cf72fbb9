//! Engineer-declared relations. A relation is an alias from
//! `(from_table, from_column)` to `(to_table, to_column)` stored in the
//! internal `relations` table; it is not a foreign key, and both endpoints
//! must resolve against the catalog when the relation is created.

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

use crate::cat::Catalog;
use crate::cnf;
use crate::err::Error;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationType {
	#[serde(rename = "ARRAY")]
	Array,
	#[serde(rename = "OBJECT")]
	Object,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationSchema {
	#[serde(default)]
	pub id: i64,
	pub alias: String,
	pub database: String,
	pub from_table: String,
	pub from_column: String,
	pub to_table: String,
	pub to_column: String,
	pub relation_type: RelationType,
}

/// Load every declared relation from the internal schema.
pub async fn load_relations(pool: &PgPool) -> Result<Vec<RelationSchema>> {
	let query = format!(
		"SELECT id,alias,db,from_table,from_column,to_table,to_column,relation FROM {}.relations",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	let rows = sqlx::query(&query).fetch_all(pool).await?;
	let mut relations = Vec::with_capacity(rows.len());
	for row in rows {
		let relation_type = match row.try_get::<String, _>("relation")?.as_str() {
			"OBJECT" => RelationType::Object,
			_ => RelationType::Array,
		};
		relations.push(RelationSchema {
			id: row.try_get("id")?,
			alias: row.try_get("alias")?,
			database: row.try_get("db")?,
			from_table: row.try_get("from_table")?,
			from_column: row.try_get("from_column")?,
			to_table: row.try_get("to_table")?,
			to_column: row.try_get("to_column")?,
			relation_type,
		});
	}
	Ok(relations)
}

/// Check that both endpoints of a relation resolve before it is stored.
pub fn validate_relation(catalog: &Catalog, input: &RelationSchema) -> Result<()> {
	let tables = catalog
		.models
		.get(&input.database)
		.ok_or_else(|| Error::invalid(format!("database {} doesn't exist", input.database)))?;
	let from = tables.get(&input.from_table).ok_or_else(|| {
		Error::invalid(format!(
			"table {} doesn't exist for database {}",
			input.from_table, input.database
		))
	})?;
	if !from.is_model_column(&input.from_column) {
		return Err(Error::invalid(format!(
			"column {} doesn't exist for table {} of database {}",
			input.from_column, input.from_table, input.database
		)));
	}
	let to = tables.get(&input.to_table).ok_or_else(|| {
		Error::invalid(format!(
			"table {} doesn't exist for database {}",
			input.to_table, input.database
		))
	})?;
	if !to.is_model_column(&input.to_column) {
		return Err(Error::invalid(format!(
			"column {} doesn't exist for table {} of database {}",
			input.to_column, input.to_table, input.database
		)));
	}
	Ok(())
}

pub async fn create_relation(pool: &PgPool, input: &RelationSchema) -> Result<()> {
	let query = format!(
		"INSERT INTO {}.relations(alias,db,from_table,to_table,from_column,to_column,relation) \
		 VALUES($1,$2,$3,$4,$5,$6,$7)",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	let relation = match input.relation_type {
		RelationType::Array => "ARRAY",
		RelationType::Object => "OBJECT",
	};
	sqlx::query(&query)
		.bind(&input.alias)
		.bind(&input.database)
		.bind(&input.from_table)
		.bind(&input.to_table)
		.bind(&input.from_column)
		.bind(&input.to_column)
		.bind(relation)
		.execute(pool)
		.await?;
	Ok(())
}

pub async fn update_relation(pool: &PgPool, input: &RelationSchema) -> Result<()> {
	let query = format!(
		"UPDATE {}.relations SET db = $1,from_table = $2,to_table = $3,from_column = $4,\
		 to_column = $5,alias = $6,relation = $7 WHERE id = $8",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	let relation = match input.relation_type {
		RelationType::Array => "ARRAY",
		RelationType::Object => "OBJECT",
	};
	sqlx::query(&query)
		.bind(&input.database)
		.bind(&input.from_table)
		.bind(&input.to_table)
		.bind(&input.from_column)
		.bind(&input.to_column)
		.bind(&input.alias)
		.bind(relation)
		.bind(input.id)
		.execute(pool)
		.await?;
	Ok(())
}

pub async fn delete_relation(pool: &PgPool, id: i64) -> Result<()> {
	let query =
		format!("DELETE FROM {}.relations WHERE id = $1", &*cnf::INTERNAL_SCHEMA_NAME);
	sqlx::query(&query).bind(id).execute(pool).await?;
	Ok(())
}

/// Cascade: a dropped database takes its relations with it.
pub async fn delete_relations_by_database(pool: &PgPool, database: &str) -> Result<()> {
	let query = format!("DELETE FROM {}.relations WHERE db = $1", &*cnf::INTERNAL_SCHEMA_NAME);
	sqlx::query(&query).bind(database).execute(pool).await?;
	Ok(())
}

/// Cascade: a dropped table invalidates relations on either side.
pub async fn delete_relations_by_table(pool: &PgPool, database: &str, table: &str) -> Result<()> {
	let query = format!(
		"DELETE FROM {}.relations WHERE db = $1 AND (from_table = $2 OR to_table = $3)",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	sqlx::query(&query).bind(database).bind(table).bind(table).execute(pool).await?;
	Ok(())
}

/// Cascade: a dropped column invalidates relations anchored on it.
pub async fn delete_relations_by_column(
	pool: &PgPool,
	database: &str,
	table: &str,
	column: &str,
) -> Result<()> {
	let query = format!(
		"DELETE FROM {}.relations WHERE db = $1 AND ((from_table = $2 AND from_column = $3) \
		 OR (to_table = $4 AND to_column = $5))",
		&*cnf::INTERNAL_SCHEMA_NAME
	);
	sqlx::query(&query)
		.bind(database)
		.bind(table)
		.bind(column)
		.bind(table)
		.bind(column)
		.execute(pool)
		.await?;
	Ok(())
}
