//! Root-field dispatch: parsed operations are grouped per database, reads
//! go through the select pipeline (one statement per root field), and
//! mutations become a `process` transaction batch per database.

use std::collections::HashMap;

use serde_json::{json, Map, Value as Json};

use crate::cat::trigger::TriggerOrigin;
use crate::cat::Engine;
use crate::err::Error;
use crate::gql::{parse, ActionType, GraphQlRequest, ResolverConfig};
use crate::iam::Claims;
use crate::Result;

/// Collect the SELECT root fields into one select body per database,
/// keeping selection order. Aggregate fields keep their `_aggregate`
/// suffix so the select pipeline compiles them as aggregates.
fn group_select_bodies(
	resolvers: &HashMap<String, ResolverConfig>,
	tree: &Map<String, Json>,
) -> Result<Map<String, Json>> {
	let mut by_database: Map<String, Json> = Map::new();
	for (key, value) in tree {
		let config = resolvers
			.get(key)
			.ok_or_else(|| Error::not_found(format!("no such resolver {key}")))?;
		if config.action != ActionType::Select {
			continue;
		}
		let body_key = if key.ends_with("_aggregate") {
			format!("{}_aggregate", config.table)
		} else {
			config.table.clone()
		};
		by_database
			.entry(config.database.clone())
			.or_insert_with(|| Json::Object(Map::new()))
			.as_object_mut()
			.expect("select group is an object")
			.insert(body_key, value.clone());
	}
	Ok(by_database)
}

/// Collect the mutation root fields into a `transactions` list per
/// database, in selection order.
fn group_mutation_transactions(
	resolvers: &HashMap<String, ResolverConfig>,
	tree: &Map<String, Json>,
) -> Result<Vec<(String, Vec<Json>)>> {
	let mut by_database: Vec<(String, Vec<Json>)> = Vec::new();
	for (key, value) in tree {
		let config = resolvers
			.get(key)
			.ok_or_else(|| Error::not_found(format!("no such resolver {key}")))?;
		let entry = match config.action {
			ActionType::Select => continue,
			ActionType::Insert => {
				let args = value
					.get("args")
					.ok_or_else(|| Error::invalid("no insert input provided"))?;
				json!({"insert": {config.table.clone(): args}})
			}
			ActionType::Update => json!({"update": {config.table.clone(): value}}),
			ActionType::Delete => json!({"delete": {config.table.clone(): value}}),
		};
		match by_database.iter_mut().find(|(db, _)| *db == config.database) {
			Some((_, transactions)) => transactions.push(entry),
			None => by_database.push((config.database.clone(), vec![entry])),
		}
	}
	Ok(by_database)
}

impl Engine {
	/// Serve a full GraphQL request: parse once, resolve reads, then
	/// mutations; the response carries whichever produced data.
	pub async fn graphql_exec(
		&self,
		claims: &Claims,
		request: &GraphQlRequest,
		auth: Option<String>,
	) -> Result<Json> {
		request.validate()?;
		let variables = request
			.variables
			.as_ref()
			.and_then(Json::as_object)
			.cloned()
			.unwrap_or_default();
		let tree =
			parse::parse_operation(&request.query, request.operation_name.as_deref(), &variables)?;

		let query_data = self.graphql_query_resolve(claims, &tree).await?;
		let mutation_data = self.graphql_mutation_resolve(claims, &tree, auth).await?;

		let data = if mutation_data.is_empty() {
			query_data
		} else {
			Json::Object(mutation_data)
		};
		Ok(json!({ "data": data }))
	}

	async fn graphql_query_resolve(
		&self,
		claims: &Claims,
		tree: &Map<String, Json>,
	) -> Result<Json> {
		let catalog = self.catalog().await;
		let by_database = group_select_bodies(&catalog.graphql.resolvers, tree)?;
		drop(catalog);

		let mut merged = Map::new();
		for (database, payload) in &by_database {
			let result = self.select_exec(claims, database, payload).await?;
			if let Json::Object(object) = result {
				for (key, value) in object {
					merged.insert(key, value);
				}
			}
		}
		Ok(Json::Object(merged))
	}

	async fn graphql_mutation_resolve(
		&self,
		claims: &Claims,
		tree: &Map<String, Json>,
		auth: Option<String>,
	) -> Result<Map<String, Json>> {
		let catalog = self.catalog().await;
		let by_database = group_mutation_transactions(&catalog.graphql.resolvers, tree)?;
		drop(catalog);

		let mut results = Map::new();
		for (database, transactions) in by_database {
			let body = json!({ "transactions": transactions });
			let result = self
				.process_exec(claims, &database, &body, TriggerOrigin::GraphQl, auth.clone())
				.await?;
			results.insert(database, result);
		}
		Ok(results)
	}

	/// Serve an introspection request when enabled.
	pub async fn graphql_introspection(&self, request: &GraphQlRequest) -> Result<Json> {
		let catalog = self.catalog().await;
		catalog.graphql.introspection_response(request).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cat::fixtures;
	use crate::gql::parse::parse_operation;

	#[test]
	fn select_fields_group_per_database_with_table_keys() {
		let catalog = fixtures::catalog();
		let tree = parse_operation(
			r#"{ eshop_users { id } eshop_orders_aggregate { count } }"#,
			None,
			&Map::new(),
		)
		.unwrap();
		let groups = group_select_bodies(&catalog.graphql.resolvers, &tree).unwrap();
		let eshop = groups["eshop"].as_object().unwrap();
		assert!(eshop.contains_key("users"));
		assert!(eshop.contains_key("orders_aggregate"));
	}

	#[test]
	fn unknown_root_fields_are_not_found() {
		let catalog = fixtures::catalog();
		let tree =
			parse_operation(r#"{ ghost_table { id } }"#, None, &Map::new()).unwrap();
		assert!(matches!(
			group_select_bodies(&catalog.graphql.resolvers, &tree),
			Err(Error::NotFound(_))
		));
	}

	#[test]
	fn mutations_become_ordered_transaction_batches() {
		let catalog = fixtures::catalog();
		let tree = parse_operation(
			r#"mutation {
				eshop_users_insert(args: {objects: [{email: "x@y.z"}]})
				eshop_users_update(_set: {email: "z@y.x"}, _where: {id: {_eq: 1}})
				eshop_orders_delete(_where: {id: {_eq: 2}})
			}"#,
			None,
			&Map::new(),
		)
		.unwrap();
		let groups = group_mutation_transactions(&catalog.graphql.resolvers, &tree).unwrap();
		assert_eq!(groups.len(), 1);
		let (database, transactions) = &groups[0];
		assert_eq!(database, "eshop");
		assert_eq!(transactions.len(), 3);
		assert!(transactions[0].get("insert").is_some());
		assert_eq!(
			transactions[0]["insert"]["users"]["objects"][0]["email"],
			serde_json::json!("x@y.z")
		);
		assert!(transactions[1].get("update").is_some());
		assert!(transactions[2]["delete"]["orders"].is_object());
	}

	#[test]
	fn graphql_tree_matches_the_equivalent_rest_tree() {
		// the parsed tree for a select compiles through the same pipeline
		// as its hand-written REST counterpart
		let catalog = fixtures::catalog();
		let tree = parse_operation(
			r#"{ eshop_users(_where: {id: {_eq: 1}}) { id email orders(_limit: 1) { id } } }"#,
			None,
			&Map::new(),
		)
		.unwrap();
		let groups = group_select_bodies(&catalog.graphql.resolvers, &tree).unwrap();
		let gql_body = &groups["eshop"]["users"];

		let rest_body = serde_json::json!({
			"_where": {"id": {"_eq": 1}},
			"orders": {"_limit": 1, "_select": {"id": true}},
			"_select": {"id": true, "email": true}
		});

		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let (gql_sql, gql_args) =
			model.select(&catalog, None, gql_body, 0, &mut idx, None, "_0_users").unwrap();
		idx = 1;
		let (rest_sql, rest_args) =
			model.select(&catalog, None, &rest_body, 0, &mut idx, None, "_0_users").unwrap();
		assert_eq!(gql_sql, rest_sql);
		assert_eq!(gql_args, rest_args);
	}
}
