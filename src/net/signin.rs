//! Data-user authentication: login, register, and token refresh.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};

use lattice_core::iam::token;
use lattice_core::Error as CoreError;

use crate::dbs::engine;
use crate::err::Error;
use crate::net::auth::Identity;

pub fn router() -> Router {
	Router::new()
		.route("/auth", get(refresh))
		.route("/auth/login", post(login))
		.route("/auth/register", post(register))
}

fn target(body: &serde_json::Map<String, JsonValue>) -> Result<(&str, &str), Error> {
	let database = body
		.get("database")
		.and_then(JsonValue::as_str)
		.ok_or_else(|| Error::Core(CoreError::invalid("Database was not provided!")))?;
	let table = body
		.get("table")
		.and_then(JsonValue::as_str)
		.ok_or_else(|| Error::Core(CoreError::invalid("Table was not provided!")))?;
	Ok((database, table))
}

async fn login(Json(body): Json<JsonValue>) -> Result<impl IntoResponse, Error> {
	let body = body.as_object().ok_or(Error::Request)?;
	let (database, table) = target(body)?;
	let token = engine().login(database, table, body).await?;
	Ok(Json(json!({ "token": token })))
}

async fn register(Json(body): Json<JsonValue>) -> Result<impl IntoResponse, Error> {
	let body = body.as_object().ok_or(Error::Request)?;
	let (database, table) = target(body)?;
	let result = engine().register(database, table, body).await?;
	Ok((StatusCode::CREATED, Json(result)))
}

async fn refresh(identity: Identity) -> Result<impl IntoResponse, Error> {
	let token = token::refresh(&identity.claims).map_err(Error::Core)?;
	Ok(Json(json!({ "token": token })))
}
