//! The administrative surface under `/engine`: schema, table, column,
//! index, relation, RLS, webhook, data-trigger, auth-entity, and custom
//! REST handler management. Every successful mutation reloads the catalog.

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use lattice_core::adm::{column, database, index, table, IndexSpec, TableSpec};
use lattice_core::cat::relation::{self, RelationSchema};
use lattice_core::cat::rls::{self, RlsPolicy};
use lattice_core::cat::trigger::{self, DataTrigger};
use lattice_core::cat::webhook::{self, Webhook};
use lattice_core::cat::{auth as cat_auth, rest as cat_rest};
use lattice_core::Error as CoreError;

use crate::dbs::engine;
use crate::err::Error;
use crate::net::auth::{authorize_engine, Identity};

pub fn router() -> Router {
	Router::new()
		.route("/engine/config", get(config))
		.route("/engine/reload", post(reload))
		.route("/engine/databases", get(list_databases).post(create_database))
		.route(
			"/engine/databases/{database}",
			get(list_tables).delete(drop_database),
		)
		.route("/engine/tables", post(create_table).delete(drop_table))
		.route("/engine/columns", post(create_column).delete(drop_column))
		.route("/engine/indexes", post(create_index))
		.route("/engine/indexes/{name}", delete(drop_index))
		.route(
			"/engine/relations",
			get(list_relations).post(create_relation).put(update_relation).delete(delete_relation),
		)
		.route("/engine/rls", get(list_policies).post(create_policy).delete(drop_policy))
		.route("/engine/rls/table", post(toggle_table_rls))
		.route("/engine/rls/database", post(toggle_database_rls))
		.route(
			"/engine/webhooks",
			get(list_webhooks).post(create_webhook).delete(delete_webhook),
		)
		.route(
			"/engine/data-triggers",
			get(list_triggers).post(create_trigger).delete(delete_trigger),
		)
		.route(
			"/engine/auth",
			get(list_auth_entities).post(create_auth_entity).delete(delete_auth_entity),
		)
		.route(
			"/engine/rest-handlers",
			get(list_rest_handlers)
				.post(create_rest_handler)
				.put(update_rest_handler)
				.delete(delete_rest_handler),
		)
}

#[derive(Deserialize)]
struct IdPayload {
	id: i64,
}

#[derive(Deserialize)]
struct DatabasePayload {
	database: String,
}

#[derive(Deserialize)]
struct TableRlsPayload {
	database: String,
	table: String,
	#[serde(default)]
	force: bool,
	#[serde(default)]
	enabled: bool,
}

#[derive(Deserialize)]
struct DatabaseRlsPayload {
	database: String,
	#[serde(default)]
	enabled: bool,
}

#[derive(Deserialize)]
struct IndexPayload {
	database: String,
	table: String,
	index: IndexSpec,
}

async fn reloaded(payload: serde_json::Value) -> Result<impl IntoResponse, Error> {
	engine().reload().await.map_err(Error::Core)?;
	Ok((StatusCode::CREATED, Json(payload)))
}

/// The catalog as configuration: databases, relations, and models with the
/// relation cycle broken (aliases point at table names, never at models).
async fn config(identity: Identity) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	let models: Vec<_> = catalog
		.models
		.values()
		.flat_map(|tables| tables.values())
		.collect();
	Ok(Json(json!({
		"databases": catalog.list_databases(),
		"relations": catalog.relations,
		"models": models,
	})))
}

async fn reload(identity: Identity) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	engine().reload().await.map_err(Error::Core)?;
	Ok(Json(json!({ "message": "Engine has been reloaded!" })))
}

async fn list_databases(identity: Identity) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	Ok(Json(json!({ "databases": catalog.list_databases() })))
}

async fn create_database(
	identity: Identity,
	Json(payload): Json<DatabasePayload>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let name = database::format_database_name(&payload.database).map_err(Error::Core)?;
	database::create_database(engine().pool(), &name).await.map_err(Error::Core)?;
	reloaded(json!({ "message": format!("database {name} created") })).await
}

async fn list_tables(
	identity: Identity,
	Path(db): Path<String>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	let models = catalog.list_models(&db).map_err(Error::Core)?;
	let tables: Vec<&str> = models.iter().map(|m| m.table.as_str()).collect();
	Ok(Json(json!({ "database": db, "tables": tables })))
}

async fn drop_database(
	identity: Identity,
	Path(db): Path<String>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let name = database::format_database_name(&db).map_err(Error::Core)?;
	let catalog = engine().catalog().await;
	if !catalog.database_exists(&name) {
		return Err(Error::Core(CoreError::not_found(format!("database {name} doesn't exist"))));
	}
	drop(catalog);
	let pool = engine().pool();
	database::drop_database(pool, &name).await.map_err(Error::Core)?;
	relation::delete_relations_by_database(pool, &name).await.map_err(Error::Core)?;
	cat_rest::delete_rest_handlers_by_database(pool, &name).await.map_err(Error::Core)?;
	reloaded(json!({ "message": format!("database {name} dropped") })).await
}

async fn create_table(
	identity: Identity,
	Json(spec): Json<TableSpec>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	if !catalog.database_exists(&spec.database) {
		return Err(Error::Core(CoreError::invalid(format!(
			"database {} doesn't exist",
			spec.database
		))));
	}
	drop(catalog);
	let pool = engine().pool();
	table::create_table(pool, &spec).await.map_err(Error::Core)?;
	index::create_indexes(pool, &spec).await.map_err(Error::Core)?;
	reloaded(json!({ "message": format!("table {} created", spec.name) })).await
}

async fn drop_table(
	identity: Identity,
	Json(spec): Json<TableSpec>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	catalog.model(&spec.database, &spec.name).map_err(Error::Core)?;
	drop(catalog);
	let pool = engine().pool();
	table::drop_table(pool, &spec.database, &spec.name).await.map_err(Error::Core)?;
	relation::delete_relations_by_table(pool, &spec.database, &spec.name)
		.await
		.map_err(Error::Core)?;
	reloaded(json!({ "message": format!("table {} dropped", spec.name) })).await
}

async fn create_column(
	identity: Identity,
	Json(spec): Json<TableSpec>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	column::validate_create_column(&catalog, &spec).map_err(Error::Core)?;
	drop(catalog);
	column::create_column(engine().pool(), &spec).await.map_err(Error::Core)?;
	reloaded(json!({ "message": "column created" })).await
}

async fn drop_column(
	identity: Identity,
	Json(spec): Json<TableSpec>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	column::validate_drop_column(&catalog, &spec).map_err(Error::Core)?;
	drop(catalog);
	let pool = engine().pool();
	column::drop_column(pool, &spec).await.map_err(Error::Core)?;
	if let Some(dropped) = spec.columns.first() {
		relation::delete_relations_by_column(pool, &spec.database, &spec.name, &dropped.name)
			.await
			.map_err(Error::Core)?;
	}
	reloaded(json!({ "message": "column dropped" })).await
}

async fn create_index(
	identity: Identity,
	Json(payload): Json<IndexPayload>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	catalog.model(&payload.database, &payload.table).map_err(Error::Core)?;
	drop(catalog);
	let spec = TableSpec {
		database: payload.database,
		name: payload.table,
		columns: Vec::new(),
		indexes: Vec::new(),
	};
	index::create_index(engine().pool(), &spec, &payload.index).await.map_err(Error::Core)?;
	reloaded(json!({ "message": "index created" })).await
}

async fn drop_index(
	identity: Identity,
	Path(name): Path<String>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	index::drop_index(engine().pool(), &name).await.map_err(Error::Core)?;
	reloaded(json!({ "message": format!("index {name} dropped") })).await
}

async fn list_relations(identity: Identity) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	Ok(Json(json!({ "relations": catalog.relations })))
}

async fn create_relation(
	identity: Identity,
	Json(input): Json<RelationSchema>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	relation::validate_relation(&catalog, &input).map_err(Error::Core)?;
	drop(catalog);
	relation::create_relation(engine().pool(), &input).await.map_err(Error::Core)?;
	reloaded(json!({ "message": format!("relation {} created", input.alias) })).await
}

async fn update_relation(
	identity: Identity,
	Json(input): Json<RelationSchema>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	relation::validate_relation(&catalog, &input).map_err(Error::Core)?;
	drop(catalog);
	relation::update_relation(engine().pool(), &input).await.map_err(Error::Core)?;
	reloaded(json!({ "message": format!("relation {} updated", input.alias) })).await
}

async fn delete_relation(
	identity: Identity,
	Json(payload): Json<IdPayload>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	relation::delete_relation(engine().pool(), payload.id).await.map_err(Error::Core)?;
	reloaded(json!({ "message": "relation deleted" })).await
}

async fn list_policies(identity: Identity) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	Ok(Json(json!({ "policies": catalog.policies })))
}

async fn create_policy(
	identity: Identity,
	Json(input): Json<RlsPolicy>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	rls::create_policy(engine().pool(), &catalog, &input).await.map_err(Error::Core)?;
	drop(catalog);
	reloaded(json!({ "message": format!("policy {} created", input.policy_name) })).await
}

async fn drop_policy(
	identity: Identity,
	Json(input): Json<RlsPolicy>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	rls::drop_policy(engine().pool(), &catalog, &input).await.map_err(Error::Core)?;
	drop(catalog);
	reloaded(json!({ "message": format!("policy {} dropped", input.policy_name) })).await
}

async fn toggle_table_rls(
	identity: Identity,
	Json(payload): Json<TableRlsPayload>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let pool = engine().pool();
	if payload.enabled {
		rls::enable_rls_for_table(pool, &payload.database, &payload.table, payload.force)
			.await
			.map_err(Error::Core)?;
	} else {
		rls::disable_rls_for_table(pool, &payload.database, &payload.table)
			.await
			.map_err(Error::Core)?;
	}
	reloaded(json!({ "message": "row level security updated" })).await
}

async fn toggle_database_rls(
	identity: Identity,
	Json(payload): Json<DatabaseRlsPayload>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	let pool = engine().pool();
	if payload.enabled {
		rls::enable_rls_for_database(pool, &catalog, &payload.database)
			.await
			.map_err(Error::Core)?;
	} else {
		rls::disable_rls_for_database(pool, &catalog, &payload.database)
			.await
			.map_err(Error::Core)?;
	}
	drop(catalog);
	reloaded(json!({ "message": "row level security updated" })).await
}

async fn list_webhooks(identity: Identity) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	let webhooks: Vec<&Webhook> = catalog.webhooks.values().flatten().collect();
	Ok(Json(json!({ "webhooks": webhooks })))
}

async fn create_webhook(
	identity: Identity,
	Json(input): Json<Webhook>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	catalog.model(&input.database, &input.table).map_err(Error::Core)?;
	drop(catalog);
	webhook::create_webhook(engine().pool(), &input).await.map_err(Error::Core)?;
	reloaded(json!({ "message": "webhook created" })).await
}

async fn delete_webhook(
	identity: Identity,
	Json(payload): Json<IdPayload>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	webhook::delete_webhook(engine().pool(), payload.id).await.map_err(Error::Core)?;
	reloaded(json!({ "message": "webhook deleted" })).await
}

async fn list_triggers(identity: Identity) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	let triggers: Vec<&DataTrigger> = catalog.triggers.values().collect();
	Ok(Json(json!({ "data_triggers": triggers })))
}

async fn create_trigger(
	identity: Identity,
	Json(input): Json<DataTrigger>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	catalog.model(&input.database, &input.table).map_err(Error::Core)?;
	drop(catalog);
	trigger::create_trigger(engine().pool(), &input).await.map_err(Error::Core)?;
	reloaded(json!({ "message": "data trigger created" })).await
}

async fn delete_trigger(
	identity: Identity,
	Json(payload): Json<IdPayload>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	trigger::delete_trigger(engine().pool(), payload.id).await.map_err(Error::Core)?;
	reloaded(json!({ "message": "data trigger deleted" })).await
}

async fn list_auth_entities(identity: Identity) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	Ok(Json(json!({ "auth_entities": catalog.auth_entities })))
}

async fn create_auth_entity(
	identity: Identity,
	Json(input): Json<cat_auth::AuthEntity>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	catalog.model(&input.database, &input.table).map_err(Error::Core)?;
	drop(catalog);
	cat_auth::create_auth_entity(engine().pool(), &input).await.map_err(Error::Core)?;
	reloaded(json!({ "message": "auth entity created" })).await
}

async fn delete_auth_entity(
	identity: Identity,
	Json(payload): Json<IdPayload>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	cat_auth::delete_auth_entity(engine().pool(), payload.id).await.map_err(Error::Core)?;
	reloaded(json!({ "message": "auth entity deleted" })).await
}

async fn list_rest_handlers(identity: Identity) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	Ok(Json(json!({ "rest_handlers": catalog.rest_handlers })))
}

async fn create_rest_handler(
	identity: Identity,
	Json(input): Json<cat_rest::RestHandler>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	cat_rest::create_rest_handler(engine().pool(), &catalog, &input)
		.await
		.map_err(Error::Core)?;
	drop(catalog);
	reloaded(json!({
		"message": format!("rest handler [{}]: {} created", input.method, input.endpoint)
	}))
	.await
}

async fn update_rest_handler(
	identity: Identity,
	Json(input): Json<cat_rest::RestHandler>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	let catalog = engine().catalog().await;
	cat_rest::update_rest_handler(engine().pool(), &catalog, &input)
		.await
		.map_err(Error::Core)?;
	drop(catalog);
	reloaded(json!({
		"message": format!("rest handler [{}]: {} updated", input.method, input.endpoint)
	}))
	.await
}

async fn delete_rest_handler(
	identity: Identity,
	Json(payload): Json<IdPayload>,
) -> Result<impl IntoResponse, Error> {
	authorize_engine(&identity)?;
	cat_rest::delete_rest_handler(engine().pool(), payload.id).await.map_err(Error::Core)?;
	reloaded(json!({ "message": "rest handler deleted" })).await
}
