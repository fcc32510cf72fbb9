//! SQL compilation: the structured JSON query language is translated here
//! into single statements with `$1..$n` bound parameters. The vocabulary
//! below is fixed; anything not in it is treated as a column or relation
//! reference by the compilers.

pub mod args;
pub mod filter;
pub mod mutate;
pub mod select;

pub use args::SqlArg;

use crate::cnf;

/// Keys reserved in a select body. Every other key at that level is a
/// relation alias (or a relation-aggregate alias).
pub fn is_select_body_key(key: &str) -> bool {
	matches!(key, "_where" | "_select" | "_orderBy" | "_groupBy" | "_distinct" | "_offset" | "_limit")
}

/// The comparison / set / pattern / JSON / text-search operator vocabulary.
pub fn where_operator(key: &str) -> Option<&'static str> {
	Some(match key {
		"_eq" => "=",
		"_neq" => "<>",
		"_gt" => ">",
		"_gte" => ">=",
		"_lt" => "<",
		"_lte" => "<=",
		"_ilike" => "ILIKE",
		"_like" => "LIKE",
		"_is" => "IS",
		"_is_not" => "IS NOT",
		"_in" => "= ANY",
		"_any" => "= ANY",
		"_nany" => "<> ANY",
		"_all" => "= ALL",
		"_nin" => "<> ALL",
		"_contains" => "@>",
		"_contained_in" => "<@",
		"_key_exists" => "?",
		"_key_exists_any" => "?|",
		"_key_exists_all" => "?&",
		"_text_search" => "@@ to_tsquery",
		_ => return None,
	})
}

/// `_and` / `_or` open a group of sub-conditions joined by the binder.
pub fn binder_operator(key: &str) -> Option<&'static str> {
	match key {
		"_and" => Some("AND"),
		"_or" => Some("OR"),
		_ => None,
	}
}

/// Operators whose bound parameter is emitted as `op($n)`.
fn parenthesised_parameter(key: &str) -> bool {
	matches!(key, "_in" | "_nin" | "_any" | "_nany" | "_all" | "_text_search")
}

/// Operators whose value is wrapped with `%...%` before binding.
pub fn requires_wildcard(key: &str) -> bool {
	matches!(key, "_like" | "_ilike")
}

/// Emit the right-hand side of a comparison for the given operator key.
pub fn operator_fragment(key: &str, operator: &str, idx: usize) -> String {
	if parenthesised_parameter(key) {
		format!(" {operator}(${idx}) ")
	} else {
		format!(" {operator} ${idx} ")
	}
}

/// The aggregate selector vocabulary.
pub fn aggregation_function(key: &str) -> Option<&'static str> {
	Some(match key {
		"_count" => "COUNT",
		"_min" => "MIN",
		"_max" => "MAX",
		"_avg" => "AVG",
		"_sum" => "SUM",
		_ => return None,
	})
}

/// The `_orderBy` direction vocabulary.
pub fn order_direction(key: &str) -> Option<&'static str> {
	Some(match key {
		"ASC" => "ASC",
		"ASC_NULLS_FIRST" => "ASC NULLS FIRST",
		"ASC_NULLS_LAST" => "ASC NULLS LAST",
		"DESC" => "DESC",
		"DESC_NULLS_FIRST" => "DESC NULLS FIRST",
		"DESC_NULLS_LAST" => "DESC NULLS LAST",
		_ => return None,
	})
}

/// Self-referencing update operators: `col = col <op> $n`.
pub fn update_operator(key: &str) -> Option<&'static str> {
	Some(match key {
		"_inc" => "+",
		"_dec" => "-",
		"_mul" => "*",
		"_div" => "/",
		_ => return None,
	})
}

/// Whether a model key addresses the aggregate view of its table.
pub fn is_aggregation(alias: &str) -> bool {
	alias.ends_with("_aggregate")
}

/// Strip the `_aggregate` suffix so the underlying table resolves.
pub fn base_alias(alias: &str) -> &str {
	alias.split("_aggregate").next().unwrap_or(alias)
}

/// Log a compiled statement when `SQL_LOGGER=ON`.
pub fn log_sql(query: &str) {
	if *cnf::SQL_LOGGER {
		info!(target: "lattice::sql", "{query}");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn operator_vocabulary_is_fixed() {
		assert_eq!(where_operator("_eq"), Some("="));
		assert_eq!(where_operator("_nin"), Some("<> ALL"));
		assert_eq!(where_operator("_key_exists_any"), Some("?|"));
		assert_eq!(where_operator("_select"), None);
		assert_eq!(binder_operator("_and"), Some("AND"));
		assert_eq!(binder_operator("_eq"), None);
	}

	#[test]
	fn array_operators_parenthesise_their_parameter() {
		assert_eq!(operator_fragment("_in", "= ANY", 3), " = ANY($3) ");
		assert_eq!(operator_fragment("_eq", "=", 1), " = $1 ");
		assert_eq!(operator_fragment("_text_search", "@@ to_tsquery", 2), " @@ to_tsquery($2) ");
	}

	#[test]
	fn aggregate_alias_resolves_to_base_table() {
		assert!(is_aggregation("users_aggregate"));
		assert!(!is_aggregation("users"));
		assert_eq!(base_alias("users_aggregate"), "users");
		assert_eq!(base_alias("users"), "users");
	}
}
