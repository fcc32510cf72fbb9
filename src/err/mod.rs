use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use lattice_core::Error as CoreError;

#[derive(Error, Debug)]
pub enum Error {
	#[error("The request body contains invalid data")]
	Request,

	#[error("{0}")]
	Core(#[from] CoreError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON Error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("DB Error: {0}")]
	Db(#[from] sqlx::Error),
}

impl Error {
	fn status(&self) -> StatusCode {
		match self {
			Error::Request => StatusCode::BAD_REQUEST,
			Error::Json(_) => StatusCode::BAD_REQUEST,
			Error::Core(core) => match core {
				CoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
				CoreError::Unauthenticated(_) | CoreError::Token(_) => StatusCode::UNAUTHORIZED,
				CoreError::NotFound(_) => StatusCode::NOT_FOUND,
				_ => StatusCode::INTERNAL_SERVER_ERROR,
			},
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> Response {
		let status = self.status();
		if status == StatusCode::INTERNAL_SERVER_ERROR {
			error!(target: "lattice::net", "{self}");
		}
		(status, Json(json!({ "message": self.to_string() }))).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn error_kinds_map_onto_status_codes() {
		assert_eq!(
			Error::Core(CoreError::invalid("bad")).status(),
			StatusCode::BAD_REQUEST
		);
		assert_eq!(
			Error::Core(CoreError::unauthenticated("no")).status(),
			StatusCode::UNAUTHORIZED
		);
		assert_eq!(
			Error::Core(CoreError::not_found("missing")).status(),
			StatusCode::NOT_FOUND
		);
		assert_eq!(
			Error::Core(CoreError::internal("boom")).status(),
			StatusCode::INTERNAL_SERVER_ERROR
		);
		assert_eq!(Error::Request.status(), StatusCode::BAD_REQUEST);
	}
}
