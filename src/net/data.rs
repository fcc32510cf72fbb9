//! The data surface: nested selects, single mutations, and the
//! multi-statement `process` pipeline, all scoped to one database.

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value as JsonValue;

use lattice_core::cat::trigger::TriggerOrigin;

use crate::dbs::engine;
use crate::err::Error;
use crate::net::auth::{authorize_database, Identity};

pub fn router() -> Router {
	Router::new()
		.route("/{database}", post(select))
		.route(
			"/{database}/actions",
			post(insert).put(update).delete(delete),
		)
		.route("/{database}/process", post(process))
}

async fn select(
	Path(database): Path<String>,
	identity: Identity,
	Json(body): Json<JsonValue>,
) -> Result<impl IntoResponse, Error> {
	authorize_database(&identity, &database)?;
	let result = engine().select_exec(&identity.claims, &database, &body).await?;
	Ok(Json(result))
}

async fn insert(
	Path(database): Path<String>,
	identity: Identity,
	Json(body): Json<JsonValue>,
) -> Result<impl IntoResponse, Error> {
	authorize_database(&identity, &database)?;
	let result = engine()
		.insert_exec(&identity.claims, &database, &body, TriggerOrigin::Rest, identity.token)
		.await?;
	Ok((StatusCode::CREATED, Json(result)))
}

async fn update(
	Path(database): Path<String>,
	identity: Identity,
	Json(body): Json<JsonValue>,
) -> Result<impl IntoResponse, Error> {
	authorize_database(&identity, &database)?;
	let result = engine()
		.update_exec(&identity.claims, &database, &body, TriggerOrigin::Rest, identity.token)
		.await?;
	Ok(Json(result))
}

async fn delete(
	Path(database): Path<String>,
	identity: Identity,
	Json(body): Json<JsonValue>,
) -> Result<impl IntoResponse, Error> {
	authorize_database(&identity, &database)?;
	let result = engine()
		.delete_exec(&identity.claims, &database, &body, TriggerOrigin::Rest, identity.token)
		.await?;
	Ok(Json(result))
}

async fn process(
	Path(database): Path<String>,
	identity: Identity,
	Json(body): Json<JsonValue>,
) -> Result<impl IntoResponse, Error> {
	authorize_database(&identity, &database)?;
	let result = engine()
		.process_exec(&identity.claims, &database, &body, TriggerOrigin::Rest, identity.token)
		.await?;
	Ok((StatusCode::CREATED, Json(result)))
}
