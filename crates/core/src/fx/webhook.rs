//! Webhook execution at POST_EXEC timing.

use serde_json::json;

use crate::cat::trigger::TriggerOrigin;
use crate::cat::webhook::{Webhook, POST_EXEC};
use crate::cat::Catalog;
use crate::fx::{EffectInput, HTTP};

fn origin_enabled(webhook: &Webhook, origin: TriggerOrigin) -> bool {
	match origin {
		TriggerOrigin::Rest => webhook.rest_enabled,
		TriggerOrigin::GraphQl => webhook.graphql_enabled,
	}
}

async fn execute_webhook(webhook: Webhook, input: EffectInput, data: serde_json::Value) {
	let payload = json!({
		"database": input.database,
		"table": input.table,
		"data": data,
	});
	let mut request = HTTP.post(&webhook.endpoint).json(&payload);
	if webhook.forward_auth_headers {
		if let Some(auth) = &input.auth {
			request = request.bearer_auth(auth);
		}
	}
	if let Err(err) = request.send().await {
		warn!(target: "lattice::fx", "webhook {} failed: {err}", webhook.endpoint);
	}
}

/// Fire every enabled webhook registered for this (database, table,
/// operation) at POST_EXEC, one invocation per affected row, each on its
/// own task.
pub async fn execute_webhooks(catalog: &Catalog, input: &EffectInput) {
	let webhooks =
		catalog.webhooks_for(&input.database, &input.table, &input.operation, POST_EXEC);
	for webhook in webhooks {
		if !webhook.enabled || !origin_enabled(webhook, input.origin) {
			continue;
		}
		match input.payload.as_array() {
			Some(rows) => {
				for row in rows {
					tokio::spawn(execute_webhook(webhook.clone(), input.clone(), row.clone()));
				}
			}
			None => {
				tokio::spawn(execute_webhook(
					webhook.clone(),
					input.clone(),
					input.payload.clone(),
				));
			}
		}
	}
}
