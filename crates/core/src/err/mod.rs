use thiserror::Error;

/// The error kinds surfaced by the engine.
///
/// Compilers and catalog lookups never panic on bad input; they return one
/// of these. The HTTP edge maps kinds onto status codes (400 / 401 / 404 /
/// 500) and renders every error as `{"message": "..."}`.
#[derive(Error, Debug)]
pub enum Error {
	/// The request body was malformed or failed validation
	#[error("{0}")]
	InvalidArgument(String),

	/// The caller could not be authenticated, or the token does not cover
	/// the requested database
	#[error("{0}")]
	Unauthenticated(String),

	/// The requested database, table, or model key does not exist
	#[error("{0}")]
	NotFound(String),

	/// An error from the database driver
	#[error("database error: {0}")]
	Db(#[from] sqlx::Error),

	/// A JSON encoding or decoding failure
	#[error("serialization error: {0}")]
	Json(#[from] serde_json::Error),

	/// A token signing or verification failure
	#[error("invalid token: {0}")]
	Token(#[from] jsonwebtoken::errors::Error),

	/// A password hashing failure
	#[error("password error: {0}")]
	Password(#[from] bcrypt::BcryptError),

	/// Any other internal failure
	#[error("{0}")]
	Internal(String),
}

impl Error {
	pub fn invalid(msg: impl Into<String>) -> Self {
		Self::InvalidArgument(msg.into())
	}

	pub fn unauthenticated(msg: impl Into<String>) -> Self {
		Self::Unauthenticated(msg.into())
	}

	pub fn not_found(msg: impl Into<String>) -> Self {
		Self::NotFound(msg.into())
	}

	pub fn internal(msg: impl Into<String>) -> Self {
		Self::Internal(msg.into())
	}
}
