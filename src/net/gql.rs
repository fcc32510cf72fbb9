//! The GraphQL endpoint plus the flag-gated GraphiQL page.

use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};

use lattice_core::cnf::{GRAPHIQL, GRAPHQL_ENDPOINT};
use lattice_core::gql::GraphQlRequest;
use lattice_core::Error as CoreError;

use crate::dbs::engine;
use crate::err::Error;
use crate::net::auth::Identity;

pub fn router() -> Router {
	Router::new()
		.route(GRAPHQL_ENDPOINT.as_str(), post(graphql))
		.route(lattice_core::cnf::GRAPHIQL_ENDPOINT.as_str(), get(graphiql))
}

async fn graphql(
	identity: Identity,
	Json(request): Json<GraphQlRequest>,
) -> Result<impl IntoResponse, Error> {
	request.validate().map_err(Error::Core)?;

	if request.is_introspection() {
		if !*GRAPHIQL {
			return Err(Error::Core(CoreError::not_found("not found")));
		}
		let response = engine().graphql_introspection(&request).await?;
		return Ok(Json(response));
	}

	let response = engine().graphql_exec(&identity.claims, &request, identity.token).await?;
	Ok(Json(response))
}

async fn graphiql() -> Result<impl IntoResponse, Error> {
	if !*GRAPHIQL {
		return Err(Error::Core(CoreError::not_found("not found")));
	}
	let html = async_graphql::http::GraphiQLSource::build()
		.endpoint(GRAPHQL_ENDPOINT.as_str())
		.finish();
	Ok(Html(html))
}
