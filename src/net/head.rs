use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::cnf::{PKG_NAME, PKG_VERSION};

pub fn router() -> Router {
	Router::new().route("/", get(info)).route("/alive", get(alive))
}

async fn info() -> Json<serde_json::Value> {
	Json(json!({
		"version": format!("{PKG_NAME} {}", *PKG_VERSION),
	}))
}

async fn alive() -> Json<serde_json::Value> {
	Json(json!({ "message": "Api is alive" }))
}
