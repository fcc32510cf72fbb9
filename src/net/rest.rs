//! Custom REST handlers: any request under `/rest` resolves against the
//! stored (method, endpoint) handlers. The body's `params` array binds
//! positionally to the stored SQL; the statement is wrapped in a CTE so
//! every handler uniformly returns JSON rows (RETURNING included).

use axum::body::Bytes;
use axum::extract::Path;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Method};
use axum::response::IntoResponse;
use axum::routing::any;
use axum::{Json, Router};
use serde_json::Value as JsonValue;
use sqlx::Row;

use lattice_core::cnf::DISABLE_AUTH;
use lattice_core::iam::token;
use lattice_core::sql::SqlArg;
use lattice_core::Error as CoreError;

use crate::dbs::engine;
use crate::err::Error;

pub fn router() -> Router {
	Router::new().route("/rest/{*path}", any(dispatch))
}

fn authorize(headers: &HeaderMap) -> Result<(), Error> {
	if *DISABLE_AUTH {
		return Ok(());
	}
	let header = headers
		.get(AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.ok_or_else(|| Error::Core(CoreError::unauthenticated("no token was provided")))?;
	token::verify(token::bearer_token(header).map_err(Error::Core)?).map_err(Error::Core)?;
	Ok(())
}

async fn dispatch(
	method: Method,
	Path(path): Path<String>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<impl IntoResponse, Error> {
	let endpoint = format!("/rest/{path}");
	let catalog = engine().catalog().await;
	let handler = catalog
		.rest_handler(method.as_str(), &endpoint)
		.filter(|handler| handler.enabled)
		.cloned()
		.ok_or_else(|| Error::Core(CoreError::not_found("NOT_FOUND")))?;
	drop(catalog);

	if handler.auth {
		authorize(&headers)?;
	}

	let parsed: Option<JsonValue> =
		if body.is_empty() { None } else { Some(serde_json::from_slice(&body)?) };
	let params: Vec<SqlArg> = parsed
		.as_ref()
		.and_then(|body| body.get("params"))
		.and_then(JsonValue::as_array)
		.map(|values| values.iter().map(SqlArg::from_json).collect())
		.unwrap_or_default();

	let wrapped = format!("WITH _rest AS ({}) SELECT row_to_json(_rest) FROM _rest", handler.query);
	let mut query = sqlx::query(&wrapped);
	for param in params {
		query = param.bind(query);
	}
	let rows = query.fetch_all(engine().pool()).await.map_err(CoreError::Db)?;

	let results: Vec<JsonValue> = rows
		.iter()
		.map(|row| row.try_get::<JsonValue, _>(0).unwrap_or(JsonValue::Null))
		.collect();
	Ok(Json(JsonValue::Array(results)))
}
