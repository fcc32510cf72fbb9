//! Bound-parameter values. Request bodies arrive as untyped JSON; before a
//! value is bound to a `$n` placeholder it is shaped by the target column
//! type (array columns become SQL arrays, `json`/`jsonb` columns are bound
//! as JSON, integral floats are normalised to integers).

use serde_json::Value as Json;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Text(String),
	Json(Json),
	BoolArray(Vec<bool>),
	IntArray(Vec<i64>),
	FloatArray(Vec<f64>),
	TextArray(Vec<String>),
}

impl SqlArg {
	/// Shape a JSON value for binding, normalising numbers on the way: a
	/// float with no fractional part binds as an integer.
	pub fn from_json(value: &Json) -> SqlArg {
		match value {
			Json::Null => SqlArg::Null,
			Json::Bool(b) => SqlArg::Bool(*b),
			Json::Number(n) => Self::from_number(n),
			Json::String(s) => SqlArg::Text(s.clone()),
			Json::Array(_) => Self::array(value),
			Json::Object(_) => SqlArg::Json(value.clone()),
		}
	}

	fn from_number(n: &serde_json::Number) -> SqlArg {
		if let Some(i) = n.as_i64() {
			return SqlArg::Int(i);
		}
		match n.as_f64() {
			Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => SqlArg::Int(f as i64),
			Some(f) => SqlArg::Float(f),
			None => SqlArg::Null,
		}
	}

	/// Bind as a SQL array. Homogeneous arrays bind with a concrete element
	/// type; anything else falls back to a JSON binding. A scalar becomes a
	/// one-element array so array-typed columns accept it.
	pub fn array(value: &Json) -> SqlArg {
		let items: Vec<Json> = match value {
			Json::Array(items) => items.clone(),
			other => vec![other.clone()],
		};
		if items.iter().all(Json::is_boolean) {
			return SqlArg::BoolArray(items.iter().filter_map(Json::as_bool).collect());
		}
		if items.iter().all(|v| v.as_i64().is_some()) {
			return SqlArg::IntArray(items.iter().filter_map(Json::as_i64).collect());
		}
		if items.iter().all(Json::is_number) {
			return SqlArg::FloatArray(items.iter().filter_map(Json::as_f64).collect());
		}
		if items.iter().all(Json::is_string) {
			return SqlArg::TextArray(
				items.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect(),
			);
		}
		SqlArg::Json(Json::Array(items))
	}

	/// Bind as JSON bytes regardless of shape.
	pub fn json(value: &Json) -> SqlArg {
		SqlArg::Json(value.clone())
	}

	/// Attach this value to a query as the next bound parameter.
	pub fn bind<'q>(
		self,
		query: Query<'q, Postgres, PgArguments>,
	) -> Query<'q, Postgres, PgArguments> {
		match self {
			SqlArg::Null => query.bind(Option::<String>::None),
			SqlArg::Bool(v) => query.bind(v),
			SqlArg::Int(v) => query.bind(v),
			SqlArg::Float(v) => query.bind(v),
			SqlArg::Text(v) => query.bind(v),
			SqlArg::Json(v) => query.bind(v),
			SqlArg::BoolArray(v) => query.bind(v),
			SqlArg::IntArray(v) => query.bind(v),
			SqlArg::FloatArray(v) => query.bind(v),
			SqlArg::TextArray(v) => query.bind(v),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn integral_floats_normalise_to_integers() {
		assert_eq!(SqlArg::from_json(&json!(3.0)), SqlArg::Int(3));
		assert_eq!(SqlArg::from_json(&json!(3.5)), SqlArg::Float(3.5));
		assert_eq!(SqlArg::from_json(&json!(7)), SqlArg::Int(7));
	}

	#[test]
	fn homogeneous_arrays_bind_with_concrete_element_types() {
		assert_eq!(SqlArg::array(&json!([1, 2, 3])), SqlArg::IntArray(vec![1, 2, 3]));
		assert_eq!(
			SqlArg::array(&json!(["a", "b"])),
			SqlArg::TextArray(vec!["a".into(), "b".into()])
		);
		assert_eq!(SqlArg::array(&json!([1, "a"])), SqlArg::Json(json!([1, "a"])));
	}

	#[test]
	fn scalars_promote_to_one_element_arrays() {
		assert_eq!(SqlArg::array(&json!("x")), SqlArg::TextArray(vec!["x".into()]));
	}

	#[test]
	fn objects_bind_as_json() {
		assert_eq!(SqlArg::from_json(&json!({"a": 1})), SqlArg::Json(json!({"a": 1})));
	}
}
