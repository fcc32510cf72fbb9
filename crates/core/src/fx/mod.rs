//! The effect dispatcher: post-commit fan-out to webhooks, external data
//! triggers, and the in-process event emitter feeding the WebSocket hub.
//! Everything here is fire-and-forget; a failing effect is logged and never
//! touches the response that triggered it.

pub mod emitter;
pub mod trigger;
pub mod webhook;

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::{json, Value as Json};

use crate::cat::trigger::TriggerOrigin;
use crate::cat::{Catalog, Engine};
use crate::cnf;

pub(crate) static HTTP: Lazy<reqwest::Client> = Lazy::new(|| {
	reqwest::Client::builder()
		.timeout(cnf::EFFECT_HTTP_TIMEOUT)
		.build()
		.expect("effect http client")
});

/// One committed (database, table, operation) with its affected rows.
#[derive(Debug, Clone)]
pub struct EffectInput {
	pub database: String,
	pub table: String,
	pub operation: String,
	pub payload: Json,
	pub origin: TriggerOrigin,
	/// The caller's bearer token, forwarded to webhooks that ask for it
	pub auth: Option<String>,
}

impl Engine {
	/// Schedule post-commit effects for one mutation. Returns immediately;
	/// the fan-out runs on its own task against the catalog snapshot the
	/// request was served with, with its own HTTP timeouts.
	pub fn dispatch_effects(&self, catalog: Arc<Catalog>, input: EffectInput) {
		let emitter = Arc::clone(&self.emitter);
		tokio::spawn(async move {
			webhook::execute_webhooks(&catalog, &input).await;
			trigger::execute_data_trigger(&catalog, &input).await;
			emitter.emit(
				&input.operation,
				json!({
					"database": input.database,
					"table": input.table,
					"data": input.payload,
					"operation": input.operation.to_lowercase(),
				}),
			);
		});
	}
}
