mod auth;
mod data;
mod engine;
mod gql;
mod head;
mod rest;
mod signin;
mod ws;

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::Request;
use axum::http::{header, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use axum::response::IntoResponse;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::MakeRequestUuid;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tower_http::ServiceBuilderExt;

use lattice_core::Error as CoreError;

use crate::cnf;
use crate::err::Error;

const LOG: &str = "lattice::net";

pub async fn init() -> Result<(), Error> {
	// relay engine events to connected WebSocket clients
	ws::init();

	let service = ServiceBuilder::new()
		.set_x_request_id(MakeRequestUuid)
		.propagate_x_request_id()
		.layer(TraceLayer::new_for_http())
		.layer(middleware::from_fn(http_logger))
		.layer(middleware::from_fn(poison_guard))
		.layer(TimeoutLayer::new(cnf::HTTP_TIMEOUT))
		.layer(
			CorsLayer::new()
				.allow_methods([
					Method::GET,
					Method::PUT,
					Method::POST,
					Method::PATCH,
					Method::DELETE,
					Method::OPTIONS,
				])
				.allow_headers([
					header::ACCEPT,
					header::AUTHORIZATION,
					header::CONTENT_TYPE,
					header::ORIGIN,
				])
				.allow_origin(Any)
				.max_age(Duration::from_secs(86400)),
		);

	let app = Router::new()
		.merge(head::router())
		.merge(signin::router())
		.merge(gql::router())
		.merge(rest::router())
		.merge(ws::router())
		.merge(engine::router())
		.merge(data::router())
		.layer(service);

	// an optional mount prefix for reverse-proxied deployments
	let app = match cnf::ROUTER_ENTRY_POINT.trim_matches('/') {
		"" => app,
		prefix => Router::new().nest(&format!("/{prefix}"), app),
	};

	let addr = SocketAddr::from(([0, 0, 0, 0], *cnf::PORT));
	let listener = tokio::net::TcpListener::bind(addr).await?;
	info!(target: LOG, "Started web server on {addr}");

	axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	info!(target: LOG, "Web server stopped. Bye!");
	Ok(())
}

/// A failed post-mutation catalog reload leaves the engine poisoned: the
/// in-memory catalog no longer matches the database. From that point every
/// request, the liveness route included, is refused until the process is
/// restarted.
async fn poison_guard(request: Request, next: Next) -> Response {
	if crate::dbs::ENGINE.get().is_some_and(|engine| engine.is_poisoned()) {
		return Error::Core(CoreError::internal(
			"engine catalog is poisoned after a failed reload; restart required",
		))
		.into_response();
	}
	next.run(request).await
}

/// Request lines at info level when HTTP_LOGGER=ON.
async fn http_logger(request: Request, next: Next) -> Response {
	let method = request.method().clone();
	let path = request.uri().path().to_owned();
	let response = next.run(request).await;
	if *cnf::HTTP_LOGGER {
		info!(target: LOG, "[METHOD: {method}] [PATH: {path}] [STATUS: {}]", response.status());
	}
	response
}

async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		error!(target: LOG, "failed to listen for shutdown signal: {err}");
	}
}
