//! Data-trigger execution: committed mutations notify the configured
//! external service when the trigger's operation and origin gates allow.

use serde_json::json;

use crate::cat::Catalog;
use crate::cnf;
use crate::fx::{EffectInput, HTTP};

pub async fn execute_data_trigger(catalog: &Catalog, input: &EffectInput) {
	let Some(trigger) = catalog.trigger_for(&input.database, &input.table) else {
		return;
	};
	if !trigger.allows_origin(input.origin) || !trigger.allows_operation(&input.operation) {
		return;
	}
	let service = cnf::WEBSOCKET_SERVICE.clone();
	if service.is_empty() {
		return;
	}

	let payload = json!({
		"database": input.database,
		"table": input.table,
		"data": input.payload,
		"operation": input.operation.to_lowercase(),
	});
	let url = format!("{service}/data-trigger");
	let mut request =
		HTTP.post(&url).json(&payload).header("X-Api-Key", &*cnf::DATA_TRIGGER_SERVICE_API_KEY);
	if let Some(auth) = &input.auth {
		request = request.bearer_auth(auth);
	}
	if let Err(err) = request.send().await {
		warn!(target: "lattice::fx", "data trigger for {}.{} failed: {err}", input.database, input.table);
	}
}
