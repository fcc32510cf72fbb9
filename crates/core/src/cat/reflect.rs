//! Schema reflection: databases, tables, columns, and indexes are read from
//! `information_schema` and `pg_*` on every build and reload.

use sqlx::{PgPool, Row};

use crate::cat::model::{Column, Index, IndexKind, Model};
use crate::Result;

/// System schemas never surface as gateway databases.
const GET_DATABASES: &str = "SELECT schema_name FROM information_schema.schemata \
	WHERE schema_name NOT IN ('information_schema','pg_catalog','pg_toast') \
	AND schema_name NOT LIKE 'pg_%' ORDER BY schema_name";

const GET_DATABASE_TABLES: &str = "SELECT table_name FROM information_schema.tables \
	WHERE table_schema = $1 ORDER BY table_name";

/// Array columns report `ARRAY` as their data type; the element type lives
/// in `udt_name` with a leading underscore, so `_int4` becomes `int4[]` and
/// the compilers can key off the `[]` suffix.
const GET_DATABASE_TABLE_COLUMNS: &str = "SELECT column_name,\
	CASE WHEN data_type = 'ARRAY' THEN concat(ltrim(udt_name,'_'),'[]') ELSE data_type END,\
	character_maximum_length,\
	CASE WHEN is_nullable = 'NO' THEN false ELSE true END,\
	CASE WHEN column_default IS NULL THEN NULL ELSE column_default::text END \
	FROM information_schema.columns WHERE table_schema = $1 AND table_name = $2 \
	ORDER BY ordinal_position";

const GET_DATABASE_TABLE_INDEXES: &str = "SELECT tc.constraint_name, tc.table_name, \
	kcu.column_name, ccu.table_name AS referer_table_name, \
	ccu.column_name AS referer_column_name, tc.constraint_type \
	FROM information_schema.table_constraints AS tc \
	JOIN information_schema.key_column_usage AS kcu \
	ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
	JOIN information_schema.constraint_column_usage AS ccu \
	ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema \
	WHERE tc.table_schema = $1 AND tc.table_name = $2 \
	GROUP BY tc.constraint_name,tc.constraint_type,tc.table_schema,tc.table_name,\
	kcu.column_name,ccu.table_name,ccu.table_schema,ccu.column_name";

const GET_UNIQUE_INDEXES: &str = "SELECT n.nspname, t.relname AS table_name, \
	i.relname AS index_name, ix.indisunique, \
	array_to_string(array_agg(a.attname), ', ') AS columns \
	FROM pg_index ix \
	JOIN pg_class t ON t.oid = ix.indrelid \
	JOIN pg_class i ON i.oid = ix.indexrelid \
	JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
	JOIN pg_namespace n ON n.oid = t.relnamespace \
	WHERE n.nspname = $1 AND t.relname = $2 \
	GROUP BY n.nspname, t.relname, i.relname, ix.indisunique";

pub async fn get_databases(pool: &PgPool) -> Result<Vec<String>> {
	let rows = sqlx::query(GET_DATABASES).fetch_all(pool).await?;
	rows.iter().map(|row| Ok(row.try_get(0)?)).collect()
}

pub async fn get_table_names(pool: &PgPool, database: &str) -> Result<Vec<String>> {
	let rows = sqlx::query(GET_DATABASE_TABLES).bind(database).fetch_all(pool).await?;
	rows.iter().map(|row| Ok(row.try_get(0)?)).collect()
}

pub async fn get_table_columns(
	pool: &PgPool,
	database: &str,
	table: &str,
) -> Result<Vec<Column>> {
	let rows = sqlx::query(GET_DATABASE_TABLE_COLUMNS)
		.bind(database)
		.bind(table)
		.fetch_all(pool)
		.await?;
	let mut columns = Vec::with_capacity(rows.len());
	for row in rows {
		columns.push(Column {
			name: row.try_get(0)?,
			ty: row.try_get(1)?,
			max_length: row.try_get(2)?,
			nullable: row.try_get(3)?,
			default_value: row.try_get(4)?,
		});
	}
	Ok(columns)
}

pub async fn get_table_indexes(pool: &PgPool, database: &str, table: &str) -> Result<Vec<Index>> {
	let rows = sqlx::query(GET_DATABASE_TABLE_INDEXES)
		.bind(database)
		.bind(table)
		.fetch_all(pool)
		.await?;
	let mut indexes = Vec::new();
	for row in rows {
		let kind: String = row.try_get(5)?;
		let Some(kind) = IndexKind::parse(&kind) else {
			continue;
		};
		let reference = kind == IndexKind::Foreign;
		indexes.push(Index {
			name: row.try_get(0)?,
			kind,
			table: row.try_get(1)?,
			column: row.try_get(2)?,
			reference_table: reference.then(|| row.try_get(3)).transpose()?,
			reference_column: reference.then(|| row.try_get(4)).transpose()?,
		});
	}

	// Unique indexes created outside constraints only show up in pg_index.
	let rows =
		sqlx::query(GET_UNIQUE_INDEXES).bind(database).bind(table).fetch_all(pool).await?;
	for row in rows {
		let unique: bool = row.try_get(3)?;
		if !unique {
			continue;
		}
		let name: String = row.try_get(2)?;
		let table_name: String = row.try_get(1)?;
		let columns: String = row.try_get(4)?;
		for column in columns.split(',') {
			indexes.push(Index {
				name: name.clone(),
				kind: IndexKind::Unique,
				table: table_name.clone(),
				column: column.trim().to_owned(),
				reference_table: None,
				reference_column: None,
			});
		}
	}

	Ok(indexes)
}

/// Build a model for every table of every reflected database.
pub async fn initialize_models(pool: &PgPool, databases: &[String]) -> Result<Vec<Model>> {
	let mut models = Vec::new();
	for database in databases {
		for table in get_table_names(pool, database).await? {
			let columns = get_table_columns(pool, database, &table).await?;
			let indexes = get_table_indexes(pool, database, &table).await?;
			let mut model = Model::new(database.clone(), table);
			model.set_columns(columns);
			model.indexes = indexes;
			models.push(model);
		}
	}
	Ok(models)
}
