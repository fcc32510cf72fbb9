//! Statement execution. Selects run on a dedicated pooled connection with
//! the caller's identity injected as a session variable (so RLS predicates
//! can inspect it); every mutation runs inside one transaction that either
//! commits fully or rolls back fully, and schedules its post-commit effects
//! only after the commit.

pub mod row;

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value as Json};
use sqlx::postgres::PgArguments;
use sqlx::{PgConnection, Postgres, Row, Transaction};

use crate::cat::trigger::TriggerOrigin;
use crate::cat::webhook::{DELETE_OPERATION, INSERT_OPERATION, UPDATE_OPERATION};
use crate::cat::{Catalog, Engine, Model};
use crate::cnf;
use crate::err::Error;
use crate::fx::EffectInput;
use crate::iam::{claims_role, Claims};
use crate::sql::{self, SqlArg};
use crate::Result;

use row::row_to_value;

fn bind_all(query: &str, args: Vec<SqlArg>) -> sqlx::query::Query<'_, Postgres, PgArguments> {
	let mut q = sqlx::query(query);
	for arg in args {
		q = arg.bind(q);
	}
	q
}

impl Engine {
	/// Execute a nested-select body: one compiled statement per top-level
	/// key, all on the same identity-scoped connection, assembled into one
	/// JSON document in body order.
	pub async fn select_exec(&self, claims: &Claims, database: &str, body: &Json) -> Result<Json> {
		let catalog = self.catalog().await;
		if !catalog.database_exists(database) {
			return Err(Error::not_found(format!("database {database} doesn't exist")));
		}
		let entries =
			body.as_object().ok_or_else(|| Error::invalid("invalid body provided"))?;

		let mut conn = self.pool().acquire().await?;
		let claims_json = serde_json::to_string(claims)?;
		if let Err(err) = sqlx::query("SELECT set_config($1, $2, false)")
			.bind(cnf::JWT_SESSION_VARIABLE)
			.bind(&claims_json)
			.execute(&mut *conn)
			.await
		{
			warn!(target: "lattice::dbs", "failed to set identity variable: {err}");
		}

		let result =
			run_selects(&catalog, claims_role(claims), database, entries, &mut *conn).await;

		// the variable must not leak into the next checkout of this connection
		let reset = format!("RESET {}", cnf::JWT_SESSION_VARIABLE);
		let _ = sqlx::query(&reset).execute(&mut *conn).await;

		result
	}

	pub async fn insert_exec(
		&self,
		claims: &Claims,
		database: &str,
		body: &Json,
		origin: TriggerOrigin,
		auth: Option<String>,
	) -> Result<Json> {
		let catalog = self.catalog().await;
		if !catalog.database_exists(database) {
			return Err(Error::not_found(format!("database {database} doesn't exist")));
		}
		let args = body.as_object().ok_or_else(|| Error::invalid("invalid body provided"))?;
		let role = claims_role(claims);

		let mut tx = self.pool().begin().await?;
		match insert_in_tx(&catalog, role, database, args, &mut tx).await {
			Ok(results) => {
				tx.commit().await?;
				self.dispatch_for(&catalog, &results, database, INSERT_OPERATION, origin, auth);
				Ok(Json::Object(results))
			}
			Err(err) => {
				let _ = tx.rollback().await;
				Err(err)
			}
		}
	}

	pub async fn update_exec(
		&self,
		claims: &Claims,
		database: &str,
		body: &Json,
		origin: TriggerOrigin,
		auth: Option<String>,
	) -> Result<Json> {
		let catalog = self.catalog().await;
		if !catalog.database_exists(database) {
			return Err(Error::not_found(format!("database {database} doesn't exist")));
		}
		let args = body.as_object().ok_or_else(|| Error::invalid("invalid body provided"))?;
		let role = claims_role(claims);

		let mut tx = self.pool().begin().await?;
		match update_in_tx(&catalog, role, database, args, &mut tx).await {
			Ok(results) => {
				tx.commit().await?;
				self.dispatch_for(&catalog, &results, database, UPDATE_OPERATION, origin, auth);
				Ok(Json::Object(results))
			}
			Err(err) => {
				let _ = tx.rollback().await;
				Err(err)
			}
		}
	}

	pub async fn delete_exec(
		&self,
		claims: &Claims,
		database: &str,
		body: &Json,
		origin: TriggerOrigin,
		auth: Option<String>,
	) -> Result<Json> {
		let catalog = self.catalog().await;
		if !catalog.database_exists(database) {
			return Err(Error::not_found(format!("database {database} doesn't exist")));
		}
		let args = body.as_object().ok_or_else(|| Error::invalid("invalid body provided"))?;
		let role = claims_role(claims);

		let mut tx = self.pool().begin().await?;
		match delete_in_tx(&catalog, role, database, args, &mut tx).await {
			Ok(results) => {
				tx.commit().await?;
				self.dispatch_for(&catalog, &results, database, DELETE_OPERATION, origin, auth);
				Ok(Json::Object(results))
			}
			Err(err) => {
				let _ = tx.rollback().await;
				Err(err)
			}
		}
	}

	/// The multi-statement pipeline: `{transactions: [{insert|update|delete:
	/// ...}, ...]}` runs in submission order inside one transaction.
	/// Nothing is dispatched unless every entry succeeds and the commit
	/// lands.
	pub async fn process_exec(
		&self,
		claims: &Claims,
		database: &str,
		body: &Json,
		origin: TriggerOrigin,
		auth: Option<String>,
	) -> Result<Json> {
		let catalog = self.catalog().await;
		if !catalog.database_exists(database) {
			return Err(Error::not_found(format!("database {database} doesn't exist")));
		}
		let parsed = body.as_object().ok_or_else(|| Error::invalid("invalid input"))?;
		let transactions = parsed
			.get("transactions")
			.ok_or_else(|| Error::invalid("transactions key is missing"))?
			.as_array()
			.ok_or_else(|| Error::invalid("process many transactions payload should be an array"))?;
		let role = claims_role(claims);

		let mut tx = self.pool().begin().await?;
		match process_in_tx(&catalog, role, database, transactions, &mut tx).await {
			Ok((results, touched)) => {
				tx.commit().await?;
				for (operation, tables) in touched {
					self.dispatch_for(&catalog, &tables, database, &operation, origin, auth.clone());
				}
				Ok(Json::Object(results))
			}
			Err(err) => {
				let _ = tx.rollback().await;
				Err(err)
			}
		}
	}

	/// One effect per touched (table, operation) pair.
	fn dispatch_for(
		&self,
		catalog: &Arc<Catalog>,
		results: &Map<String, Json>,
		database: &str,
		operation: &str,
		origin: TriggerOrigin,
		auth: Option<String>,
	) {
		for (table, rows) in results {
			self.dispatch_effects(catalog.clone(), EffectInput {
				database: database.to_owned(),
				table: table.clone(),
				operation: operation.to_owned(),
				payload: rows.clone(),
				origin,
				auth: auth.clone(),
			});
		}
	}
}

async fn run_selects(
	catalog: &Catalog,
	role: Option<&str>,
	database: &str,
	entries: &Map<String, Json>,
	conn: &mut PgConnection,
) -> Result<Json> {
	let mut out = Map::new();
	for (key, model_body) in entries {
		let model = catalog.model(database, key)?;
		let mut idx = 1;
		let (query, args) = if sql::is_aggregation(key) {
			model.select_aggregate(
				catalog,
				role,
				model_body,
				0,
				&mut idx,
				None,
				&format!("_0_{key}"),
				key,
			)?
		} else {
			model.select(catalog, role, model_body, 0, &mut idx, None, &format!("_0_{key}"))?
		};
		if query.is_empty() {
			return Err(Error::invalid(format!("invalid body for {key}")));
		}
		sql::log_sql(&query);
		let row = bind_all(&query, args).fetch_one(&mut *conn).await?;
		let value: Json = row.try_get(0)?;
		out.insert(key.clone(), value);
	}
	Ok(Json::Object(out))
}

async fn insert_in_tx(
	catalog: &Catalog,
	role: Option<&str>,
	database: &str,
	args: &Map<String, Json>,
	tx: &mut Transaction<'static, Postgres>,
) -> Result<Map<String, Json>> {
	let mut results = Map::new();
	for (key, input) in args {
		let model = catalog.model(database, key)?;
		let parsed = input.as_object().ok_or_else(|| Error::invalid("invalid body provided"))?;
		let objects = parsed
			.get("objects")
			.ok_or_else(|| Error::invalid("no input was found"))?
			.as_array()
			.ok_or_else(|| Error::invalid("insert objects should be an array"))?;
		let on_conflict = parsed.get("onConflict");
		let mut rows = Vec::with_capacity(objects.len());
		for entry in objects {
			rows.push(insert_row(catalog, model, role, entry, on_conflict, tx).await?);
		}
		results.insert(key.clone(), Json::Array(rows));
	}
	Ok(results)
}

/// Insert one row, then recurse into any relation aliases in the payload:
/// the parent's returned `from_column` value is copied onto each child row
/// as its `to_column` before the child inserts, all inside the same
/// transaction. Nested results attach to the parent row under the alias.
fn insert_row<'a>(
	catalog: &'a Catalog,
	model: &'a Model,
	role: Option<&'a str>,
	entry: &'a Json,
	on_conflict: Option<&'a Json>,
	tx: &'a mut Transaction<'static, Postgres>,
) -> BoxFuture<'a, Result<Json>> {
	Box::pin(async move {
		let (query, args) = model.compile_insert(role, entry, on_conflict)?;
		sql::log_sql(&query);
		let returned = bind_all(&query, args).fetch_one(&mut **tx).await?;
		let mut parent = row_to_value(model, &returned)?;

		if let Some(entry_map) = entry.as_object() {
			for alias in model.relation_keys_in(entry_map) {
				let Some((related, info)) = catalog.related(model, &alias) else {
					continue;
				};
				let objects = entry_map[&alias]
					.as_object()
					.and_then(|rel| rel.get("objects"))
					.and_then(Json::as_array)
					.ok_or_else(|| Error::invalid("malformed insertion"))?;
				let parent_value = parent.get(&info.from_column).cloned().ok_or_else(|| {
					Error::internal("could not enhance entry with relational column")
				})?;
				let mut nested = Vec::with_capacity(objects.len());
				for child in objects {
					let mut child_row = child
						.as_object()
						.cloned()
						.ok_or_else(|| Error::invalid("malformed insertion"))?;
					child_row.insert(info.to_column.clone(), parent_value.clone());
					nested.push(
						insert_row(catalog, related, role, &Json::Object(child_row), None, tx)
							.await?,
					);
				}
				parent.insert(alias, Json::Array(nested));
			}
		}

		Ok(Json::Object(parent))
	})
}

async fn update_in_tx(
	catalog: &Catalog,
	role: Option<&str>,
	database: &str,
	args: &Map<String, Json>,
	tx: &mut Transaction<'static, Postgres>,
) -> Result<Map<String, Json>> {
	let mut results = Map::new();
	for (key, input) in args {
		let model = catalog.model(database, key)?;
		let (query, qargs) = model.compile_update(catalog, role, input)?;
		sql::log_sql(&query);
		let returned = bind_all(&query, qargs).fetch_all(&mut **tx).await?;
		let rows = returned
			.iter()
			.map(|r| row_to_value(model, r).map(Json::Object))
			.collect::<Result<Vec<_>>>()?;
		results.insert(key.clone(), Json::Array(rows));
	}
	Ok(results)
}

async fn delete_in_tx(
	catalog: &Catalog,
	_role: Option<&str>,
	database: &str,
	args: &Map<String, Json>,
	tx: &mut Transaction<'static, Postgres>,
) -> Result<Map<String, Json>> {
	let mut results = Map::new();
	for (key, input) in args {
		let model = catalog.model(database, key)?;
		let (query, qargs) = model.compile_delete(catalog, input)?;
		sql::log_sql(&query);
		let returned = bind_all(&query, qargs).fetch_all(&mut **tx).await?;
		let rows = returned
			.iter()
			.map(|r| row_to_value(model, r).map(Json::Object))
			.collect::<Result<Vec<_>>>()?;
		results.insert(key.clone(), Json::Array(rows));
	}
	Ok(results)
}

type Touched = Vec<(String, Map<String, Json>)>;

async fn process_in_tx(
	catalog: &Catalog,
	role: Option<&str>,
	database: &str,
	transactions: &[Json],
	tx: &mut Transaction<'static, Postgres>,
) -> Result<(Map<String, Json>, Touched)> {
	let mut results = Map::new();
	let mut touched = Touched::new();
	for entry in transactions {
		let entry = entry.as_object().ok_or_else(|| Error::invalid("invalid operation"))?;
		let (kind, operation, result) = if let Some(payload) = entry.get("insert") {
			let payload =
				payload.as_object().ok_or_else(|| Error::invalid("invalid input"))?;
			("insert", INSERT_OPERATION, insert_in_tx(catalog, role, database, payload, tx).await?)
		} else if let Some(payload) = entry.get("update") {
			let payload =
				payload.as_object().ok_or_else(|| Error::invalid("invalid input"))?;
			("update", UPDATE_OPERATION, update_in_tx(catalog, role, database, payload, tx).await?)
		} else if let Some(payload) = entry.get("delete") {
			let payload =
				payload.as_object().ok_or_else(|| Error::invalid("invalid input"))?;
			("delete", DELETE_OPERATION, delete_in_tx(catalog, role, database, payload, tx).await?)
		} else {
			return Err(Error::invalid("invalid operation"));
		};
		let list = results
			.entry(kind.to_owned())
			.or_insert_with(|| Json::Array(Vec::new()));
		if let Some(list) = list.as_array_mut() {
			list.push(Json::Object(result.clone()));
		}
		touched.push((operation.to_owned(), result));
	}
	Ok((results, touched))
}
