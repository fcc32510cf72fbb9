//! The reflected shape of a single table, plus the column-level helpers the
//! compilers lean on.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::cat::relation::RelationSchema;
use crate::err::Error;
use crate::sql::SqlArg;
use crate::Result;

/// A reflected column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
	pub name: String,
	#[serde(rename = "type")]
	pub ty: String,
	pub max_length: Option<i64>,
	pub nullable: bool,
	pub default_value: Option<String>,
}

impl Column {
	/// Whether the column draws its value from a sequence.
	pub fn auto_increment(&self) -> bool {
		self.default_value.as_deref().is_some_and(|d| d.starts_with("nextval("))
	}

	/// Whether the column type is an array type.
	pub fn is_array(&self) -> bool {
		self.ty.ends_with("[]")
	}
}

/// The kind of a reflected index or constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
	#[serde(rename = "PRIMARY")]
	Primary,
	#[serde(rename = "UNIQUE")]
	Unique,
	#[serde(rename = "FOREIGN")]
	Foreign,
}

impl IndexKind {
	pub fn parse(s: &str) -> Option<IndexKind> {
		match s {
			"PRIMARY" | "PRIMARY KEY" => Some(IndexKind::Primary),
			"UNIQUE" | "UNIQUE KEY" => Some(IndexKind::Unique),
			"FOREIGN" | "FOREIGN KEY" => Some(IndexKind::Foreign),
			_ => None,
		}
	}
}

/// A reflected index. Foreign keys carry the referenced side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
	pub name: String,
	#[serde(rename = "type")]
	pub kind: IndexKind,
	pub table: String,
	pub column: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reference_table: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reference_column: Option<String>,
}

/// One table of one database, as the compilers see it: ordered columns, a
/// name→type lookup, indexes, the engineer-declared relations leaving this
/// table, and the per-role column allow-lists.
///
/// Relation targets are resolved through the catalog at compile time, so a
/// model never owns another model and the graph stays acyclic.
#[derive(Debug, Clone, Serialize)]
pub struct Model {
	pub database: String,
	pub table: String,
	pub columns: Vec<Column>,
	#[serde(skip)]
	pub columns_map: HashMap<String, String>,
	pub indexes: Vec<Index>,
	#[serde(serialize_with = "serialize_relations")]
	pub relations: IndexMap<String, RelationSchema>,
	#[serde(skip)]
	pub rls: HashMap<String, HashSet<String>>,
}

/// Serialize relations as alias → target-table pairs. Inlining the target
/// model would re-introduce the cycle the catalog breaks.
fn serialize_relations<S>(
	relations: &IndexMap<String, RelationSchema>,
	serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	use serde::ser::SerializeMap;
	let mut map = serializer.serialize_map(Some(relations.len()))?;
	for (alias, info) in relations {
		map.serialize_entry(alias, &info.to_table)?;
	}
	map.end()
}

impl Model {
	pub fn new(database: impl Into<String>, table: impl Into<String>) -> Model {
		Model {
			database: database.into(),
			table: table.into(),
			columns: Vec::new(),
			columns_map: HashMap::new(),
			indexes: Vec::new(),
			relations: IndexMap::new(),
			rls: HashMap::new(),
		}
	}

	pub fn set_columns(&mut self, columns: Vec<Column>) {
		self.columns_map =
			columns.iter().map(|c| (c.name.clone(), c.ty.clone())).collect();
		self.columns = columns;
	}

	pub fn is_model_column(&self, key: &str) -> bool {
		self.columns_map.contains_key(key)
	}

	/// Relation info for an alias, with any `_aggregate` suffix stripped.
	pub fn relation_info(&self, alias: &str) -> Option<&RelationSchema> {
		self.relations.get(crate::sql::base_alias(alias))
	}

	pub fn is_relation_column(&self, key: &str) -> bool {
		self.relation_info(key).is_some()
	}

	pub fn is_relation_aggregate(&self, key: &str) -> bool {
		crate::sql::is_aggregation(key) && self.is_relation_column(key)
	}

	/// The columns the calling role may see, in declaration order. An empty
	/// role map means no restriction; a populated map with no entry for the
	/// role yields nothing.
	pub fn allowed_columns(&self, role: Option<&str>) -> Result<Vec<&str>> {
		if self.rls.is_empty() {
			return Ok(self.columns.iter().map(|c| c.name.as_str()).collect());
		}
		let allowed = role
			.and_then(|r| self.rls.get(r))
			.ok_or_else(|| Error::invalid("no columns are available"))?;
		Ok(self
			.columns
			.iter()
			.map(|c| c.name.as_str())
			.filter(|name| allowed.contains(*name))
			.collect())
	}

	/// The SELECT column list for this model, honouring `_select` and the
	/// role allow-list. An empty or missing `_select` means all allowed
	/// columns.
	pub fn columns_with_alias(
		&self,
		role: Option<&str>,
		body: &Json,
		alias: &str,
	) -> Result<String> {
		let prefix = if alias.is_empty() { String::new() } else { format!("{alias}.") };
		let selected = body
			.as_object()
			.and_then(|b| b.get("_select"))
			.and_then(Json::as_object)
			.filter(|s| !s.is_empty());
		let columns: Vec<String> = self
			.allowed_columns(role)?
			.into_iter()
			.filter(|name| selected.map_or(true, |s| s.contains_key(*name)))
			.map(|name| format!("{prefix}{name}"))
			.collect();
		Ok(columns.join(","))
	}

	/// Shape a value for binding according to the column's type.
	pub fn argument_value(&self, key: &str, value: &Json) -> Result<SqlArg> {
		let ty = self
			.columns_map
			.get(key)
			.ok_or_else(|| Error::invalid(format!("invalid column {key} for parsed value")))?;
		if ty.ends_with("[]") {
			return Ok(SqlArg::array(value));
		}
		match ty.as_str() {
			"json" | "jsonb" => Ok(SqlArg::json(value)),
			_ => Ok(SqlArg::from_json(value)),
		}
	}

	/// The relation aliases present in a payload, in payload order.
	pub fn relation_keys_in(&self, payload: &serde_json::Map<String, Json>) -> Vec<String> {
		payload.keys().filter(|k| self.is_relation_column(k)).cloned().collect()
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::cat::relation::{RelationSchema, RelationType};
	use serde_json::json;

	pub fn column(name: &str, ty: &str) -> Column {
		Column {
			name: name.into(),
			ty: ty.into(),
			max_length: None,
			nullable: true,
			default_value: None,
		}
	}

	pub fn users_model() -> Model {
		let mut model = Model::new("eshop", "users");
		model.set_columns(vec![
			column("id", "bigint"),
			column("email", "varchar"),
			column("password", "varchar"),
			column("tags", "varchar[]"),
			column("profile", "jsonb"),
		]);
		model.relations.insert(
			"orders".into(),
			RelationSchema {
				id: 1,
				alias: "orders".into(),
				database: "eshop".into(),
				from_table: "users".into(),
				from_column: "id".into(),
				to_table: "orders".into(),
				to_column: "user_id".into(),
				relation_type: RelationType::Array,
			},
		);
		model
	}

	#[test]
	fn select_list_defaults_to_all_allowed_columns() {
		let model = users_model();
		let cols = model.columns_with_alias(None, &json!({}), "_0_users").unwrap();
		assert_eq!(cols, "_0_users.id,_0_users.email,_0_users.password,_0_users.tags,_0_users.profile");
	}

	#[test]
	fn select_list_honours_explicit_selection() {
		let model = users_model();
		let body = json!({"_select": {"email": true, "id": true}});
		let cols = model.columns_with_alias(None, &body, "u").unwrap();
		// declaration order wins, not selection order
		assert_eq!(cols, "u.id,u.email");
	}

	#[test]
	fn role_allow_list_filters_columns() {
		let mut model = users_model();
		model.rls.insert("viewer".into(), ["id", "email"].iter().map(|s| s.to_string()).collect());
		let cols = model.columns_with_alias(Some("viewer"), &json!({}), "u").unwrap();
		assert_eq!(cols, "u.id,u.email");
		assert!(model.columns_with_alias(Some("other"), &json!({}), "u").is_err());
	}

	#[test]
	fn argument_values_follow_column_types() {
		let model = users_model();
		assert_eq!(
			model.argument_value("tags", &json!(["a", "b"])).unwrap(),
			SqlArg::TextArray(vec!["a".into(), "b".into()])
		);
		assert_eq!(
			model.argument_value("profile", &json!({"x": 1})).unwrap(),
			SqlArg::Json(json!({"x": 1}))
		);
		assert_eq!(model.argument_value("id", &json!(9)).unwrap(), SqlArg::Int(9));
		assert!(model.argument_value("missing", &json!(1)).is_err());
	}

	#[test]
	fn aggregate_aliases_resolve_relations() {
		let model = users_model();
		assert!(model.is_relation_column("orders"));
		assert!(model.is_relation_aggregate("orders_aggregate"));
		assert!(!model.is_relation_aggregate("orders"));
		assert_eq!(model.relation_info("orders_aggregate").unwrap().to_column, "user_id");
	}
}
