//! Operation parsing: a GraphQL document becomes the ordered tree the REST
//! compilers already understand. Arguments land as `_where` / `_orderBy` /
//! `_limit` keys, selection sets become `_select` maps or nested relation
//! bodies, and aggregate selections collapse into `_count` / `_min: [...]`
//! style keys. Selection order is preserved end to end.

use async_graphql::parser::parse_query;
use async_graphql::parser::types::{DocumentOperations, ExecutableDocument, Field, Selection};
use async_graphql::Name;
use async_graphql_value::Value as GqlValue;
use serde_json::{Map, Value as Json};

use crate::err::Error;
use crate::Result;

/// Resolve a parsed GraphQL value (including variables) to JSON.
fn value_to_json(value: &GqlValue, variables: &Map<String, Json>) -> Json {
	match value {
		GqlValue::Variable(name) => variables.get(name.as_str()).cloned().unwrap_or(Json::Null),
		GqlValue::Null => Json::Null,
		GqlValue::Number(n) => Json::Number(n.clone()),
		GqlValue::String(s) => Json::String(s.clone()),
		GqlValue::Boolean(b) => Json::Bool(*b),
		GqlValue::Enum(name) => Json::String(name.to_string()),
		GqlValue::List(items) => {
			Json::Array(items.iter().map(|v| value_to_json(v, variables)).collect())
		}
		GqlValue::Object(map) => {
			let mut out = Map::new();
			for (key, val) in map {
				out.insert(key.to_string(), value_to_json(val, variables));
			}
			Json::Object(out)
		}
		GqlValue::Binary(_) => Json::Null,
	}
}

fn selection_fields(field: &Field) -> impl Iterator<Item = &Field> {
	field.selection_set.node.items.iter().filter_map(|item| match &item.node {
		Selection::Field(field) => Some(&field.node),
		_ => None,
	})
}

/// Translate one field into its body. `inherited_aggregate` is set while
/// walking inside an aggregate selector, where leaves are aggregate columns
/// rather than scalar selections.
fn field_to_tree(field: &Field, variables: &Map<String, Json>, inherited_aggregate: bool) -> Json {
	let mut result = Map::new();
	let aggregate = inherited_aggregate || field.name.node.ends_with("_aggregate");

	for (name, value) in &field.arguments {
		result.insert(name.node.to_string(), value_to_json(&value.node, variables));
	}

	let mut select = Map::new();
	for child in selection_fields(field) {
		let child_name = child.name.node.to_string();
		let child_tree = field_to_tree(child, variables, aggregate);
		let Some(child_map) = child_tree.as_object() else {
			continue;
		};
		if child_map.is_empty() {
			if aggregate {
				if inherited_aggregate {
					result.insert(child_name, Json::Bool(true));
				} else {
					result.insert(format!("_{child_name}"), Json::Bool(true));
				}
			} else {
				select.insert(child_name, Json::Bool(true));
			}
		} else if aggregate {
			let keys: Vec<Json> =
				child_map.keys().cloned().map(Json::String).collect();
			result.insert(format!("_{child_name}"), Json::Array(keys));
		} else {
			result.insert(child_name, child_tree);
		}
	}

	if aggregate {
		for (key, value) in select {
			result.insert(key, value);
		}
	} else if !select.is_empty() {
		result.insert("_select".into(), Json::Object(select));
	}

	Json::Object(result)
}

/// Parse a document and produce the root ordered map: one entry per root
/// field, shaped exactly like a REST body.
pub fn parse_operation(
	query: &str,
	operation_name: Option<&str>,
	variables: &Map<String, Json>,
) -> Result<Map<String, Json>> {
	if query.trim().is_empty() {
		return Err(Error::invalid("no query provided"));
	}
	let document: ExecutableDocument =
		parse_query(query).map_err(|err| Error::invalid(err.to_string()))?;

	let operation = match &document.operations {
		DocumentOperations::Single(operation) => &operation.node,
		DocumentOperations::Multiple(operations) => {
			let name = operation_name
				.map(Name::new)
				.or_else(|| operations.keys().next().cloned())
				.ok_or_else(|| Error::invalid("no operation provided"))?;
			&operations
				.get(&name)
				.ok_or_else(|| Error::invalid(format!("no such operation {name}")))?
				.node
		}
	};

	let mut root = Map::new();
	for item in &operation.selection_set.node.items {
		if let Selection::Field(field) = &item.node {
			root.insert(
				field.node.name.node.to_string(),
				field_to_tree(&field.node, variables, false),
			);
		}
	}
	Ok(root)
}
