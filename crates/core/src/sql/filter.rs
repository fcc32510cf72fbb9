//! The filter compiler: turns a `_where` tree (plus `_orderBy`, `_groupBy`,
//! `_distinct`, `_limit`/`_offset`, and aggregate selections) rooted at a
//! model into SQL fragments and a bound-argument list.
//!
//! A single placeholder counter is threaded through the whole statement so
//! `$1..$n` stay globally unique across every fragment the final statement
//! is assembled from. A group of conditions compiles to
//! `(c1 <binder> c2 <binder> ...)` where the binder defaults to `AND`.

use serde_json::Value as Json;

use crate::cat::{Catalog, Model};
use crate::sql::{self, SqlArg};

impl Model {
	/// Compile a filter tree. `initial` seeds the output (` WHERE ` at the
	/// root, or the relation join predicate for a lateral subquery, in which
	/// case subsequent conditions attach with `AND`). `binder` joins the
	/// conditions of the current group.
	pub fn build_where_clause(
		&self,
		catalog: &Catalog,
		body: Option<&Json>,
		alias: &str,
		idx: &mut usize,
		initial: &str,
		binder: &str,
	) -> (String, Vec<SqlArg>) {
		let mut query = initial.to_string();
		let mut args = Vec::new();
		let Some(body) = body else {
			return (query, args);
		};

		if let Some(list) = body.as_array() {
			for (i, value) in list.iter().enumerate() {
				let qbinder = if i == 0 { "" } else { binder };
				let (q, a) = self.build_where_clause(catalog, Some(value), alias, idx, "", qbinder);
				query.push_str(&q);
				args.extend(a);
			}
			return (query, args);
		}

		let Some(operation) = body.as_object() else {
			return (query, args);
		};

		for (key, value) in operation {
			if self.is_model_column(key) {
				let mut qbinder = binder;
				if query.len() > initial.len() && qbinder.is_empty() {
					qbinder = "AND";
				}
				query.push_str(&format!(" {qbinder} {alias}.{key} "));
				let (q, a) = self.build_where_clause(catalog, Some(value), alias, idx, "", qbinder);
				query.push_str(&q);
				args.extend(a);
			} else if let Some(op) = sql::binder_operator(key) {
				let (q, a) = self.build_where_clause(catalog, Some(value), alias, idx, "", op);
				let qbinder = if query.len() > initial.len() { op } else { binder };
				query.push_str(&format!("{qbinder} ({q})"));
				args.extend(a);
			} else if let Some(op) = sql::where_operator(key) {
				if value.is_null() {
					query.push_str(&format!(" {op} NULL"));
				} else {
					query.push_str(&sql::operator_fragment(key, op, *idx));
					args.push(operator_argument(key, value));
					*idx += 1;
				}
			} else if self.is_relation_aggregate(key) {
				let mut qbinder = binder;
				if query.len() > initial.len() && binder.is_empty() {
					qbinder = "AND";
				}
				let (q, a) =
					self.build_relation_where_aggregate(catalog, key, value, alias, qbinder, idx);
				query.push_str(&q);
				args.extend(a);
			} else if self.is_relation_column(key) {
				let mut qbinder = binder;
				if query.len() > initial.len() && binder.is_empty() {
					qbinder = "AND";
				}
				let Some((related, info)) = catalog.related(self, key) else {
					continue;
				};
				query.push_str(&format!(
					" {qbinder} {alias}.{} IN ( SELECT {} FROM {}.{} ",
					info.from_column, info.to_column, info.database, info.to_table
				));
				let (q, a) = related.build_where_clause(
					catalog,
					Some(value),
					&info.to_table,
					idx,
					"WHERE",
					"",
				);
				query.push_str(&q);
				query.push(')');
				args.extend(a);
			}
		}

		(query, args)
	}

	/// A relation-aggregate predicate: restrict parent rows by an aggregate
	/// over their related rows, e.g. `orders_aggregate: {_count: {_gt: 2}}`.
	fn build_relation_where_aggregate(
		&self,
		catalog: &Catalog,
		key: &str,
		body: &Json,
		alias: &str,
		binder: &str,
		idx: &mut usize,
	) -> (String, Vec<SqlArg>) {
		let mut args = Vec::new();
		let Some((related, info)) = catalog.related(self, key) else {
			return (String::new(), args);
		};
		let Some(parsed) = body.as_object().filter(|m| !m.is_empty()) else {
			return (String::new(), args);
		};

		let qbinder = if binder.is_empty() { "AND" } else { binder };
		let mut aggregates = String::new();

		for (aggregation_key, payload) in parsed {
			let Some(function) = sql::aggregation_function(aggregation_key) else {
				return (String::new(), args);
			};
			if aggregation_key == "_count" {
				let Some((operator_key, operand)) =
					payload.as_object().and_then(|m| m.iter().next())
				else {
					return (String::new(), args);
				};
				let Some(operator) = sql::where_operator(operator_key) else {
					return (String::new(), args);
				};
				aggregates.push_str(&format!(
					" {qbinder} (SELECT COUNT(*) FROM {}.{} WHERE {alias}.{} = {}.{}) {operator} ${idx}",
					info.database, info.to_table, info.from_column, info.to_table, info.to_column,
					idx = *idx
				));
				args.push(SqlArg::from_json(operand));
				*idx += 1;
			} else {
				let Some((column, comparison)) =
					payload.as_object().and_then(|m| m.iter().next())
				else {
					return (String::new(), args);
				};
				if !related.is_model_column(column) {
					return (String::new(), args);
				}
				let Some((operator_key, operand)) =
					comparison.as_object().and_then(|m| m.iter().next())
				else {
					return (String::new(), args);
				};
				let Some(operator) = sql::where_operator(operator_key) else {
					return (String::new(), args);
				};
				aggregates.push_str(&format!(
					" {qbinder} (SELECT {function}({column}) FROM {}.{} WHERE {alias}.{} = {}.{}) {operator} ${idx}",
					info.database, info.to_table, info.from_column, info.to_table, info.to_column,
					idx = *idx
				));
				args.push(SqlArg::from_json(operand));
				*idx += 1;
			}
		}

		let query = format!(
			" {binder} {alias}.{from} IN ( SELECT {to} FROM {db}.{table} WHERE {alias}.{from} = {table}.{to} {aggregates} )",
			from = info.from_column,
			to = info.to_column,
			db = info.database,
			table = info.to_table,
		);
		(query, args)
	}

	/// `_orderBy: {column: DIRECTION}`. Only model columns are accepted and
	/// unknown directions are skipped.
	pub fn build_order_by(&self, body: &Json) -> String {
		let Some(fields) =
			body.as_object().and_then(|b| b.get("_orderBy")).and_then(Json::as_object)
		else {
			return String::new();
		};
		let parts: Vec<String> = fields
			.iter()
			.filter_map(|(key, value)| {
				let direction = value.as_str().and_then(sql::order_direction)?;
				self.is_model_column(key).then(|| format!("{key} {direction}"))
			})
			.collect();
		if parts.is_empty() {
			return String::new();
		}
		format!(" ORDER BY {} ", parts.join(","))
	}

	/// `_distinct: [column, ...]` emits `DISTINCT ON (...)`.
	pub fn build_distinct_on(&self, body: &Json, alias: &str) -> String {
		self.column_list_clause(body, alias, "_distinct")
			.map(|cols| format!(" DISTINCT ON ({cols}) "))
			.unwrap_or_default()
	}

	/// `_groupBy: [column, ...]`.
	pub fn build_group_by(&self, body: &Json, alias: &str) -> String {
		self.column_list_clause(body, alias, "_groupBy")
			.map(|cols| format!(" GROUP BY {cols} "))
			.unwrap_or_default()
	}

	fn column_list_clause(&self, body: &Json, alias: &str, key: &str) -> Option<String> {
		let fields = body.as_object()?.get(key)?.as_array()?;
		let parts: Vec<String> = fields
			.iter()
			.filter_map(Json::as_str)
			.filter(|column| self.is_model_column(column))
			.map(|column| format!("{alias}.{column}"))
			.collect();
		(!parts.is_empty()).then(|| parts.join(","))
	}

	/// `_limit` / `_offset` become bound parameters.
	pub fn build_pagination(&self, body: &Json, idx: &mut usize) -> (String, Vec<SqlArg>) {
		let mut args = Vec::new();
		let mut limit = String::new();
		let mut offset = String::new();
		if let Some(value) = body.as_object().and_then(|b| b.get("_limit")) {
			limit = format!("LIMIT ${idx}");
			args.push(SqlArg::from_json(value));
			*idx += 1;
		}
		if let Some(value) = body.as_object().and_then(|b| b.get("_offset")) {
			offset = format!("OFFSET ${idx}");
			args.push(SqlArg::from_json(value));
			*idx += 1;
		}
		(format!(" {limit} {offset} "), args)
	}

	/// The aggregate SELECT list: a single `json_build_object` document with
	/// `count`, `min`, `max`, `sum`, `avg` members as requested.
	pub fn build_aggregate(&self, role: Option<&str>, body: &Json, alias: &str) -> String {
		let mut parts = Vec::new();
		if let Some(count) = body.as_object().and_then(|b| b.get("_count")) {
			if count.is_boolean() {
				parts.push("'count',COUNT(*)".to_string());
			}
		}
		for (key, function) in
			[("_min", "MIN"), ("_max", "MAX"), ("_sum", "SUM"), ("_avg", "AVG")]
		{
			if let Some(group) = self.build_column_aggregate(role, body, alias, key, function) {
				parts.push(group);
			}
		}
		if parts.is_empty() {
			return String::new();
		}
		format!("json_build_object({})", parts.join(","))
	}

	fn build_column_aggregate(
		&self,
		role: Option<&str>,
		body: &Json,
		alias: &str,
		key: &str,
		function: &str,
	) -> Option<String> {
		let columns = body.as_object()?.get(key)?.as_array()?;
		let allowed = self.allowed_columns(role).ok()?;
		let parts: Vec<String> = columns
			.iter()
			.filter_map(Json::as_str)
			.filter(|column| allowed.contains(column))
			.map(|column| format!("'{column}',{function}({alias}.{column})"))
			.collect();
		if parts.is_empty() {
			return None;
		}
		Some(format!("'{}',json_build_object({})", &key[1..], parts.join(",")))
	}
}

fn operator_argument(key: &str, value: &Json) -> SqlArg {
	if sql::requires_wildcard(key) {
		let text = value.as_str().map(str::to_owned).unwrap_or_else(|| value.to_string());
		return SqlArg::Text(format!("%{text}%"));
	}
	if matches!(key, "_in" | "_nin" | "_any" | "_nany" | "_all") {
		return SqlArg::array(value);
	}
	SqlArg::from_json(value)
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
	fn simple_comparison_binds_one_placeholder() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({"id": {"_eq": 1}});
		let (sql, args) =
			model.build_where_clause(&catalog, Some(&body), "_0_users", &mut idx, " WHERE ", "");
		assert_eq!(collapse(&sql), "WHERE _0_users.id = $1");
		assert_eq!(args, vec![SqlArg::Int(1)]);
		assert_eq!(idx, 2);
	}

	#[test]
	fn every_operator_compiles_exactly_once() {
		let cases = [
			("_eq", json!(1), "="),
			("_neq", json!(1), "<>"),
			("_gt", json!(1), ">"),
			("_gte", json!(1), ">="),
			("_lt", json!(1), "<"),
			("_lte", json!(1), "<="),
			("_ilike", json!("a"), "ILIKE"),
			("_like", json!("a"), "LIKE"),
			("_is", json!(true), "IS"),
			("_is_not", json!(true), "IS NOT"),
			("_in", json!([1, 2]), "= ANY"),
			("_any", json!([1]), "= ANY"),
			("_nany", json!([1]), "<> ANY"),
			("_all", json!([1]), "= ALL"),
			("_nin", json!([1]), "<> ALL"),
			("_contains", json!({"a": 1}), "@>"),
			("_contained_in", json!({"a": 1}), "<@"),
			("_key_exists", json!("a"), "?"),
			("_key_exists_any", json!(["a"]), "?|"),
			("_key_exists_all", json!(["a"]), "?&"),
			("_text_search", json!("a"), "@@ to_tsquery"),
		];
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		for (key, value, operator) in cases {
			let mut idx = 1;
			let body = json!({"profile": {key: value}});
			let (sql, args) =
				model.build_where_clause(&catalog, Some(&body), "u", &mut idx, "", "");
			assert_eq!(sql.matches(operator).count(), 1, "operator {key} in {sql}");
			assert!(sql.contains("$1"), "placeholder for {key} in {sql}");
			assert_eq!(args.len(), 1, "single argument for {key}");
			assert_eq!(idx, 2);
		}
	}

	#[test]
	fn like_values_are_wrapped_with_wildcards() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({"email": {"_like": "a@b"}});
		let (_, args) = model.build_where_clause(&catalog, Some(&body), "u", &mut idx, "", "");
		assert_eq!(args, vec![SqlArg::Text("%a@b%".into())]);
	}

	#[test]
	fn null_comparisons_bind_nothing() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({"email": {"_is": null}});
		let (sql, args) = model.build_where_clause(&catalog, Some(&body), "u", &mut idx, "", "");
		assert_eq!(collapse(&sql), "u.email IS NULL");
		assert!(args.is_empty());
		assert_eq!(idx, 1);
	}

	#[test]
	fn conditions_in_a_group_join_with_the_declared_binder() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({"_or": [{"id": {"_eq": 1}}, {"email": {"_eq": "a@b.c"}}]});
		let (sql, args) =
			model.build_where_clause(&catalog, Some(&body), "u", &mut idx, " WHERE ", "");
		assert_eq!(collapse(&sql), "WHERE ( u.id = $1 OR u.email = $2 )");
		assert_eq!(args, vec![SqlArg::Int(1), SqlArg::Text("a@b.c".into())]);
		assert_eq!(idx, 3);
	}

	#[test]
	fn sibling_conditions_default_to_and() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({"id": {"_gte": 1}, "email": {"_neq": "x"}});
		let (sql, args) =
			model.build_where_clause(&catalog, Some(&body), "u", &mut idx, " WHERE ", "");
		assert_eq!(collapse(&sql), "WHERE u.id >= $1 AND u.email <> $2");
		assert_eq!(args.len(), 2);
	}

	#[test]
	fn relation_traversal_compiles_a_correlated_subquery() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({"orders": {"id": {"_gt": 10}}});
		let (sql, args) =
			model.build_where_clause(&catalog, Some(&body), "u", &mut idx, " WHERE ", "");
		assert_eq!(
			collapse(&sql),
			"WHERE u.id IN ( SELECT user_id FROM eshop.orders WHERE orders.id > $1 )"
		);
		assert_eq!(args, vec![SqlArg::Int(10)]);
	}

	#[test]
	fn relation_aggregate_count_predicate() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({"orders_aggregate": {"_count": {"_gt": 2}}});
		let (sql, args) =
			model.build_where_clause(&catalog, Some(&body), "u", &mut idx, " WHERE ", "");
		assert_eq!(
			collapse(&sql),
			"WHERE u.id IN ( SELECT user_id FROM eshop.orders WHERE u.id = orders.user_id \
			 AND (SELECT COUNT(*) FROM eshop.orders WHERE u.id = orders.user_id) > $1 )"
		);
		assert_eq!(args, vec![SqlArg::Int(2)]);
	}

	#[test]
	fn relation_aggregate_column_predicate() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({"orders_aggregate": {"_min": {"total": {"_gte": 5}}}});
		let (sql, args) =
			model.build_where_clause(&catalog, Some(&body), "u", &mut idx, " WHERE ", "");
		assert!(collapse(&sql)
			.contains("(SELECT MIN(total) FROM eshop.orders WHERE u.id = orders.user_id) >= $1"));
		assert_eq!(args, vec![SqlArg::Int(5)]);
	}

	#[test]
	fn placeholders_stay_globally_unique_across_fragments() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({"id": {"_gt": 1}, "orders": {"total": {"_lt": 100}}});
		let (sql, args) =
			model.build_where_clause(&catalog, Some(&body), "u", &mut idx, " WHERE ", "");
		assert!(sql.contains("$1"));
		assert!(sql.contains("$2"));
		assert_eq!(args.len(), 2);
		assert_eq!(idx, 3);
	}

	#[test]
	fn order_by_accepts_model_columns_only() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let body = json!({"_orderBy": {"id": "ASC", "ghost": "DESC", "email": "DESC_NULLS_LAST"}});
		let sql = model.build_order_by(&body);
		assert_eq!(collapse(&sql), "ORDER BY id ASC,email DESC NULLS LAST");
	}

	#[test]
	fn group_by_and_distinct_filter_unknown_columns() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let body = json!({"_groupBy": ["id", "nope"], "_distinct": ["email"]});
		assert_eq!(collapse(&model.build_group_by(&body, "u")), "GROUP BY u.id");
		assert_eq!(collapse(&model.build_distinct_on(&body, "u")), "DISTINCT ON (u.email)");
	}

	#[test]
	fn pagination_binds_limit_then_offset() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let mut idx = 1;
		let body = json!({"_limit": 10, "_offset": 20});
		let (sql, args) = model.build_pagination(&body, &mut idx);
		assert_eq!(collapse(&sql), "LIMIT $1 OFFSET $2");
		assert_eq!(args, vec![SqlArg::Int(10), SqlArg::Int(20)]);
		assert_eq!(idx, 3);
	}

	#[test]
	fn aggregate_select_list_is_one_json_document() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "orders").unwrap();
		let body = json!({"_count": true, "_min": ["total"], "_avg": ["total", "ghost"]});
		let sql = model.build_aggregate(None, &body, "o");
		assert_eq!(
			sql,
			"json_build_object('count',COUNT(*),'min',json_build_object('total',MIN(o.total)),\
			 'avg',json_build_object('total',AVG(o.total)))"
		);
	}
}
