//! The select compiler: a nested selection tree becomes ONE statement whose
//! single result column is the whole nested JSON document. Each nested
//! relation compiles to a correlated subquery spliced in with
//! `LEFT OUTER JOIN LATERAL (...) ON true`, and its JSON value becomes a
//! column of the parent row. Aliases are depth-tagged (`_0_users`,
//! `_1_orders`, ...) so a table visited at several depths never collides.

use serde_json::Value as Json;

use crate::cat::relation::{RelationSchema, RelationType};
use crate::cat::{Catalog, Model};
use crate::err::Error;
use crate::sql::{self, SqlArg};
use crate::Result;

/// How a compiled subquery folds into its parent: ARRAY relations (and the
/// root) aggregate to a JSON array defaulting to `[]`; OBJECT relations
/// extract the first element and default to `null`.
struct CoalesceBuilder {
	extract: &'static str,
	default: &'static str,
	alias: String,
	where_join: String,
}

fn coalesce_symbols(
	model: &Model,
	relation_info: Option<&RelationSchema>,
	depth: usize,
	parent_alias: &str,
) -> CoalesceBuilder {
	let mut builder = CoalesceBuilder {
		extract: "",
		default: "[]",
		alias: model.table.clone(),
		where_join: String::new(),
	};
	let Some(info) = relation_info else {
		return builder;
	};
	if info.relation_type == RelationType::Object {
		builder.extract = "->0";
		builder.default = "null";
	}
	let current_alias = format!("_{depth}_{}", info.to_table);
	builder.alias = info.alias.clone();
	builder.where_join = format!(
		" WHERE {parent_alias}.{} = {current_alias}.{}",
		info.from_column, info.to_column
	);
	builder
}

static EMPTY_BODY: Json = Json::Null;

fn eligible_body(body: &Json) -> Option<&Json> {
	match body {
		Json::Bool(_) => Some(&EMPTY_BODY),
		Json::Object(_) => Some(body),
		_ => None,
	}
}

impl Model {
	/// Compile a row query. `relation_info` is present when this model is
	/// reached through a relation, in which case the join predicate against
	/// `parent_alias` seeds the WHERE clause.
	#[allow(clippy::too_many_arguments)]
	pub fn select(
		&self,
		catalog: &Catalog,
		role: Option<&str>,
		body: &Json,
		depth: usize,
		idx: &mut usize,
		relation_info: Option<&RelationSchema>,
		parent_alias: &str,
	) -> Result<(String, Vec<SqlArg>)> {
		let Some(body) = eligible_body(body) else {
			return Ok((String::new(), Vec::new()));
		};
		let builder = coalesce_symbols(self, relation_info, depth, parent_alias);
		let current_alias = format!("_{depth}_{}", self.table);
		let mut args = Vec::new();

		let columns = self.columns_with_alias(role, body, &current_alias)?;

		let mut where_join = builder.where_join.clone();
		if let Some(filter) = body.get("_where") {
			let (initial, binder) = if where_join.is_empty() {
				(" WHERE ".to_string(), "")
			} else {
				(where_join.clone(), "AND")
			};
			let (q, a) =
				self.build_where_clause(catalog, Some(filter), &current_alias, idx, &initial, binder);
			where_join = q;
			args.extend(a);
		}

		let distinct = self.build_distinct_on(body, &current_alias);
		let group = self.build_group_by(body, &current_alias);
		let (pagination, pagination_args) = self.build_pagination(body, idx);
		args.extend(pagination_args);
		let order = self.build_order_by(body);

		// Nested relations: compile each one level deeper and splice it in
		// as a lateral join plus a column on the parent row.
		let mut relation_columns = String::new();
		let mut joins = String::new();
		let mut child_depth = depth;
		if let Some(entries) = body.as_object() {
			for key in entries.keys().filter(|k| !sql::is_select_body_key(k)) {
				let Some((related, info)) = catalog.related(self, key) else {
					continue;
				};
				let relation_body = &entries[key];
				child_depth += 1;
				let join_alias = format!("_{child_depth}_{}", related.table);
				let (q, a) = if sql::is_aggregation(key) {
					relation_columns.push_str(&format!(",{join_alias}.{key}"));
					related.select_aggregate(
						catalog,
						role,
						relation_body,
						child_depth,
						idx,
						Some(info),
						&current_alias,
						key,
					)?
				} else {
					relation_columns.push_str(&format!(",{join_alias}.{}", info.alias));
					related.select(
						catalog,
						role,
						relation_body,
						child_depth,
						idx,
						Some(info),
						&current_alias,
					)?
				};
				joins.push_str(&format!(" LEFT OUTER JOIN LATERAL ({q}) AS {join_alias} on true "));
				args.extend(a);
			}
		}

		let query = format!(
			"SELECT coalesce(json_agg({ca}){extract},'{default}') as {out} FROM (\
			 SELECT row_to_json((SELECT {ca} FROM (SELECT {columns}{relation_columns} ) {ca} )) {ca} \
			 FROM ( SELECT {distinct} * FROM {db}.{table} {ca} {where_join} {group} {order} {pagination}) {ca}\
			 {joins}) _{depth}_{table}",
			ca = current_alias,
			extract = builder.extract,
			default = builder.default,
			out = builder.alias,
			db = self.database,
			table = self.table,
		);

		Ok((query, args))
	}

	/// Compile an aggregate query: the SELECT list is one
	/// `json_build_object` document over the filtered rows.
	#[allow(clippy::too_many_arguments)]
	pub fn select_aggregate(
		&self,
		catalog: &Catalog,
		role: Option<&str>,
		body: &Json,
		depth: usize,
		idx: &mut usize,
		relation_info: Option<&RelationSchema>,
		parent_alias: &str,
		aggregation_name: &str,
	) -> Result<(String, Vec<SqlArg>)> {
		let Some(body) = eligible_body(body) else {
			return Ok((String::new(), Vec::new()));
		};
		let builder = coalesce_symbols(self, relation_info, depth, parent_alias);
		let current_alias = format!("_{depth}_{}", self.table);
		let mut args = Vec::new();

		let mut where_join = builder.where_join.clone();
		if let Some(filter) = body.get("_where") {
			let (initial, binder) = if where_join.is_empty() {
				(" WHERE ".to_string(), "")
			} else {
				(where_join.clone(), "AND")
			};
			let (q, a) =
				self.build_where_clause(catalog, Some(filter), &current_alias, idx, &initial, binder);
			where_join = q;
			args.extend(a);
		}

		let distinct = self.build_distinct_on(body, &current_alias);
		let group = self.build_group_by(body, &current_alias);
		let (pagination, pagination_args) = self.build_pagination(body, idx);
		args.extend(pagination_args);
		let order = self.build_order_by(body);

		let select_list = self.build_aggregate(role, body, &current_alias);
		if select_list.is_empty() {
			return Err(Error::invalid(format!(
				"no aggregation was provided for {aggregation_name}"
			)));
		}

		let query = format!(
			"SELECT {select_list} as {aggregation_name} FROM (\
			 SELECT {distinct} * FROM {db}.{table} {ca} {where_join} {group} {order} {pagination}) {ca}",
			ca = current_alias,
			db = self.database,
			table = self.table,
		);

		Ok((query, args))
	}
}

#[cfg(test)]
mod tests {
	use crate::cat::fixtures;
	use crate::sql::SqlArg;
	use serde_json::json;

	fn collapse(s: &str) -> String {
		s.split_whitespace().collect::<Vec<_>>().join(" ")
	}

	#[test]
	fn flat_select_compiles_to_one_json_statement() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({"_where": {"id": {"_eq": 1}}, "_select": {"id": true, "email": true}});
		let (sql, args) =
			model.select(&catalog, None, &body, 0, &mut idx, None, "_0_users").unwrap();
		assert_eq!(
			collapse(&sql),
			"SELECT coalesce(json_agg(_0_users),'[]') as users FROM (\
			 SELECT row_to_json((SELECT _0_users FROM (SELECT _0_users.id,_0_users.email ) _0_users )) _0_users \
			 FROM ( SELECT * FROM eshop.users _0_users WHERE _0_users.id = $1 ) _0_users) _0_users"
		);
		assert_eq!(args, vec![SqlArg::Int(1)]);
	}

	#[test]
	fn array_relation_joins_laterally_and_defaults_to_empty_list() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({
			"_select": {"id": true},
			"orders": {"_select": {"id": true}, "_orderBy": {"id": "ASC"}}
		});
		let (sql, args) =
			model.select(&catalog, None, &body, 0, &mut idx, None, "_0_users").unwrap();
		let sql = collapse(&sql);
		// the nested document becomes a column of the parent row
		assert!(sql.contains("(SELECT _0_users.id,_1_orders.orders ) _0_users"), "{sql}");
		// the child aggregates its own rows, joined on the declared columns
		assert!(
			sql.contains(
				"LEFT OUTER JOIN LATERAL (SELECT coalesce(json_agg(_1_orders),'[]') as orders"
			),
			"{sql}"
		);
		assert!(sql.contains("WHERE _0_users.id = _1_orders.user_id ORDER BY id ASC"), "{sql}");
		assert!(sql.ends_with("AS _1_orders on true ) _0_users"), "{sql}");
		assert!(args.is_empty());
	}

	#[test]
	fn object_relation_extracts_first_element_and_defaults_to_null() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "orders").unwrap();
		let mut idx = 1;
		let body = json!({"_select": {"id": true}, "user": {"_select": {"email": true}}});
		let (sql, _) =
			model.select(&catalog, None, &body, 0, &mut idx, None, "_0_orders").unwrap();
		let sql = collapse(&sql);
		assert!(sql.contains("coalesce(json_agg(_1_users)->0,'null') as user"), "{sql}");
		assert!(sql.contains("WHERE _0_orders.user_id = _1_users.id"), "{sql}");
	}

	#[test]
	fn relation_filter_appends_to_the_join_predicate() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({
			"_select": {"id": true},
			"orders": {"_where": {"total": {"_gt": 50}}}
		});
		let (sql, args) =
			model.select(&catalog, None, &body, 0, &mut idx, None, "_0_users").unwrap();
		let sql = collapse(&sql);
		assert!(
			sql.contains("WHERE _0_users.id = _1_orders.user_id AND _1_orders.total > $1"),
			"{sql}"
		);
		assert_eq!(args, vec![SqlArg::Int(50)]);
	}

	#[test]
	fn sibling_relations_get_distinct_depth_tags() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({
			"_select": {"id": true},
			"orders": {"_select": {"id": true}},
			"orders_aggregate": {"_count": true}
		});
		let (sql, _) =
			model.select(&catalog, None, &body, 0, &mut idx, None, "_0_users").unwrap();
		assert!(sql.contains("AS _1_orders on true"), "{sql}");
		assert!(sql.contains("AS _2_orders on true"), "{sql}");
		assert!(sql.contains(",_2_orders.orders_aggregate"), "{sql}");
	}

	#[test]
	fn aggregate_select_emits_json_build_object_document() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "orders").unwrap();
		let mut idx = 1;
		let body = json!({"_count": true, "_where": {"total": {"_gte": 10}}});
		let (sql, args) = model
			.select_aggregate(
				&catalog,
				None,
				&body,
				0,
				&mut idx,
				None,
				"_0_orders_aggregate",
				"orders_aggregate",
			)
			.unwrap();
		assert_eq!(
			collapse(&sql),
			"SELECT json_build_object('count',COUNT(*)) as orders_aggregate FROM (\
			 SELECT * FROM eshop.orders _0_orders WHERE _0_orders.total >= $1 ) _0_orders"
		);
		assert_eq!(args, vec![SqlArg::Int(10)]);
	}

	#[test]
	fn empty_aggregate_body_is_rejected() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "orders").unwrap();
		let mut idx = 1;
		let body = json!({"_where": {"id": {"_eq": 1}}});
		let res = model.select_aggregate(
			&catalog,
			None,
			&body,
			0,
			&mut idx,
			None,
			"_0_orders_aggregate",
			"orders_aggregate",
		);
		assert!(res.is_err());
	}

	#[test]
	fn pagination_parameters_follow_filter_parameters() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({"_where": {"id": {"_gt": 0}}, "_limit": 5, "_offset": 10});
		let (sql, args) =
			model.select(&catalog, None, &body, 0, &mut idx, None, "_0_users").unwrap();
		let sql = collapse(&sql);
		assert!(sql.contains("_0_users.id > $1"), "{sql}");
		assert!(sql.contains("LIMIT $2 OFFSET $3"), "{sql}");
		assert_eq!(args, vec![SqlArg::Int(0), SqlArg::Int(5), SqlArg::Int(10)]);
	}
}
