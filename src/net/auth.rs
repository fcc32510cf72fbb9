//! Request identity. The extractor verifies the bearer token (HMAC only)
//! and carries both the claims and the raw token, so effects can forward
//! the original credential. `DISABLE_AUTH=ON` turns every check into a
//! pass-through with an anonymous identity.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use lattice_core::cnf::DISABLE_AUTH;
use lattice_core::iam::{claims_bypass_all, token, Claims};
use lattice_core::Error as CoreError;

use crate::err::Error;

/// The verified identity of a request.
pub struct Identity {
	pub claims: Claims,
	pub token: Option<String>,
}

impl Identity {
	fn anonymous() -> Identity {
		Identity {
			claims: Claims::new(),
			token: None,
		}
	}
}

impl<S> FromRequestParts<S> for Identity
where
	S: Send + Sync,
{
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		if *DISABLE_AUTH {
			return Ok(Identity::anonymous());
		}
		let header = parts
			.headers
			.get(AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.ok_or_else(|| Error::Core(CoreError::unauthenticated("no token was provided")))?;
		let token = token::bearer_token(header).map_err(Error::Core)?;
		let claims = token::verify(token).map_err(Error::Core)?;
		Ok(Identity {
			claims,
			token: Some(token.to_owned()),
		})
	}
}

/// Database-scoped authorization: the token's `database` claim must match
/// the URL's database. Rejected before any compilation happens.
pub fn authorize_database(identity: &Identity, database: &str) -> Result<(), Error> {
	if *DISABLE_AUTH {
		return Ok(());
	}
	if token::claims_cover_database(&identity.claims, database) {
		Ok(())
	} else {
		Err(Error::Core(CoreError::unauthenticated("unauthorized")))
	}
}

/// Engine-surface authorization: administrative tokens carry `bypass_all`.
pub fn authorize_engine(identity: &Identity) -> Result<(), Error> {
	if *DISABLE_AUTH {
		return Ok(());
	}
	if claims_bypass_all(&identity.claims) {
		Ok(())
	} else {
		Err(Error::Core(CoreError::unauthenticated("unauthorized")))
	}
}
