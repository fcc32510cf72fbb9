//! The mutation compilers. Every statement returns its affected rows with
//! `RETURNING *`; inserts go one row at a time because the nested cascade
//! needs the parent's returned row before its children can compile.

use serde_json::Value as Json;

use crate::cat::{Catalog, Model};
use crate::err::Error;
use crate::sql::{self, SqlArg};
use crate::Result;

impl Model {
	/// Compile a single-row INSERT. Unknown keys are dropped (relation
	/// aliases among them are handled by the executor's cascade); a row with
	/// no usable column is rejected. `on_conflict` is accepted and reserved:
	/// no ON CONFLICT clause is emitted yet.
	pub fn compile_insert(
		&self,
		role: Option<&str>,
		row: &Json,
		_on_conflict: Option<&Json>,
	) -> Result<(String, Vec<SqlArg>)> {
		let parsed = row.as_object().ok_or_else(|| Error::invalid("invalid body provided"))?;
		let allowed = self.allowed_columns(role)?;
		let mut columns = Vec::new();
		let mut values = Vec::new();
		let mut args = Vec::new();
		let mut idx = 1;
		for (key, value) in parsed {
			if allowed.contains(&key.as_str()) {
				columns.push(key.as_str());
				values.push(format!("${idx}"));
				args.push(self.argument_value(key, value)?);
				idx += 1;
			}
		}
		if columns.is_empty() {
			return Err(Error::invalid("nothing to insert here"));
		}
		let query = format!(
			"INSERT INTO {}.{}({}) VALUES({}) RETURNING *",
			self.database,
			self.table,
			columns.join(","),
			values.join(",")
		);
		Ok((query, args))
	}

	/// Compile an UPDATE from `_set` plus the self-referencing operators
	/// (`_inc`/`_dec`/`_mul`/`_div`), with an optional `_where` filter.
	pub fn compile_update(
		&self,
		catalog: &Catalog,
		role: Option<&str>,
		body: &Json,
	) -> Result<(String, Vec<SqlArg>)> {
		let parsed = body.as_object().ok_or_else(|| Error::invalid("invalid body provided"))?;
		let allowed = self.allowed_columns(role)?;
		let mut parts = Vec::new();
		let mut args = Vec::new();
		let mut idx = 1;

		if let Some(set) = parsed.get("_set").and_then(Json::as_object) {
			for (key, value) in set {
				if allowed.contains(&key.as_str()) {
					parts.push(format!("{key} = ${idx}"));
					args.push(
						self.argument_value(key, value)
							.map_err(|_| Error::invalid("invalid value provided"))?,
					);
					idx += 1;
				}
			}
		}

		for op_key in ["_inc", "_dec", "_mul", "_div"] {
			let Some(payload) = parsed.get(op_key).and_then(Json::as_object) else {
				continue;
			};
			let symbol = sql::update_operator(op_key).unwrap();
			for (key, value) in payload {
				if allowed.contains(&key.as_str()) {
					parts.push(format!("{key} = {key} {symbol} ${idx}"));
					args.push(
						self.argument_value(key, value)
							.map_err(|_| Error::invalid("invalid value provided"))?,
					);
					idx += 1;
				}
			}
		}

		if parts.is_empty() {
			return Err(Error::invalid("invalid update input"));
		}

		let mut query =
			format!("UPDATE {}.{} SET {}", self.database, self.table, parts.join(", "));
		let (clause, where_args) =
			self.build_where_clause(catalog, parsed.get("_where"), &self.table, &mut idx, "", "");
		if !clause.is_empty() {
			args.extend(where_args);
			query.push_str(&format!(" WHERE {clause}"));
		}
		query.push_str(" RETURNING *");
		Ok((query, args))
	}

	/// Compile a DELETE with an optional `_where` filter.
	pub fn compile_delete(&self, catalog: &Catalog, body: &Json) -> Result<(String, Vec<SqlArg>)> {
		let mut idx = 1;
		let filter = body.as_object().and_then(|b| b.get("_where"));
		let mut query = format!("DELETE FROM {}.{}", self.database, self.table);
		let (clause, args) =
			self.build_where_clause(catalog, filter, &self.table, &mut idx, "", "");
		if !clause.is_empty() {
			query.push_str(&format!(" WHERE {clause}"));
		}
		query.push_str(" RETURNING *");
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
	fn insert_binds_known_columns_in_row_order() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "orders").unwrap();
		let row = json!({"user_id": 1, "total": 25});
		let (sql, args) = model.compile_insert(None, &row, None).unwrap();
		assert_eq!(sql, "INSERT INTO eshop.orders(user_id,total) VALUES($1,$2) RETURNING *");
		assert_eq!(args, vec![SqlArg::Int(1), SqlArg::Int(25)]);
	}

	#[test]
	fn insert_drops_unknown_keys_and_relation_aliases() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		let row = json!({"email": "a@b.c", "ghost": 1, "orders": {"objects": []}});
		let (sql, args) = model.compile_insert(None, &row, None).unwrap();
		assert_eq!(sql, "INSERT INTO eshop.users(email) VALUES($1) RETURNING *");
		assert_eq!(args, vec![SqlArg::Text("a@b.c".into())]);
	}

	#[test]
	fn insert_with_no_usable_column_is_rejected() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "users").unwrap();
		assert!(model.compile_insert(None, &json!({"ghost": 1}), None).is_err());
		assert!(model.compile_insert(None, &json!([1, 2]), None).is_err());
	}

	#[test]
	fn update_combines_set_and_self_referencing_operators() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "orders").unwrap();
		let body = json!({
			"_set": {"user_id": 2},
			"_inc": {"total": 5},
			"_where": {"id": {"_eq": 7}}
		});
		let (sql, args) = model.compile_update(&catalog, None, &body).unwrap();
		assert_eq!(
			collapse(&sql),
			"UPDATE eshop.orders SET user_id = $1, total = total + $2 WHERE orders.id = $3 RETURNING *"
		);
		assert_eq!(args, vec![SqlArg::Int(2), SqlArg::Int(5), SqlArg::Int(7)]);
	}

	#[test]
	fn update_without_any_column_is_rejected() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "orders").unwrap();
		let body = json!({"_set": {"ghost": 1}});
		assert!(model.compile_update(&catalog, None, &body).is_err());
	}

	#[test]
	fn delete_appends_filter_and_returns_rows() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "orders").unwrap();
		let body = json!({"_where": {"user_id": {"_eq": 1}}});
		let (sql, args) = model.compile_delete(&catalog, &body).unwrap();
		assert_eq!(
			collapse(&sql),
			"DELETE FROM eshop.orders WHERE orders.user_id = $1 RETURNING *"
		);
		assert_eq!(args, vec![SqlArg::Int(1)]);
	}

	#[test]
	fn delete_without_filter_touches_every_row() {
		let catalog = fixtures::catalog();
		let model = catalog.model("eshop", "orders").unwrap();
		let (sql, args) = model.compile_delete(&catalog, &json!({})).unwrap();
		assert_eq!(sql, "DELETE FROM eshop.orders RETURNING *");
		assert!(args.is_empty());
	}
}
