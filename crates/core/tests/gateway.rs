//! End-to-end compilation tests over a hand-assembled catalog: the shapes
//! the HTTP surface promises, checked at the SQL layer without a database.

use std::collections::HashMap;

use serde_json::{json, Map, Value as Json};

use lattice_core::cat::relation::{RelationSchema, RelationType};
use lattice_core::cat::{rest, Catalog, Column, Model};
use lattice_core::gql::parse::parse_operation;
use lattice_core::iam::token;
use lattice_core::sql::SqlArg;

fn column(name: &str, ty: &str) -> Column {
	Column {
		name: name.into(),
		ty: ty.into(),
		max_length: None,
		nullable: true,
		default_value: None,
	}
}

/// The catalog of spec scenario S1-S6: eshop.users with an ARRAY relation
/// `orders` onto eshop.orders.
fn eshop() -> Catalog {
	let mut users = Model::new("eshop", "users");
	users.set_columns(vec![
		column("id", "bigint"),
		column("email", "varchar"),
		column("password", "varchar"),
	]);
	let mut orders = Model::new("eshop", "orders");
	orders.set_columns(vec![
		column("id", "bigint"),
		column("user_id", "bigint"),
		column("total", "int"),
	]);
	let relations = vec![RelationSchema {
		id: 1,
		alias: "orders".into(),
		database: "eshop".into(),
		from_table: "users".into(),
		from_column: "id".into(),
		to_table: "orders".into(),
		to_column: "user_id".into(),
		relation_type: RelationType::Array,
	}];
	Catalog::assemble(
		vec!["eshop".into()],
		vec![users, orders],
		relations,
		Vec::new(),
		Vec::new(),
		HashMap::new(),
		HashMap::new(),
		Vec::new(),
	)
	.expect("catalog")
}

fn collapse(s: &str) -> String {
	s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[test]
fn nested_select_compiles_to_a_single_lateral_statement() {
	let catalog = eshop();
	let users = catalog.model("eshop", "users").unwrap();
	let body = json!({
		"_select": {"id": true},
		"orders": {"_select": {"id": true}, "_orderBy": {"id": "ASC"}}
	});
	let mut idx = 1;
	let (sql, args) = users.select(&catalog, None, &body, 0, &mut idx, None, "_0_users").unwrap();

	// one statement, one lateral join, whole result as one JSON document
	assert_eq!(sql.matches("LEFT OUTER JOIN LATERAL").count(), 1);
	assert_eq!(sql.matches("json_agg").count(), 2);
	assert!(collapse(&sql).starts_with("SELECT coalesce(json_agg(_0_users),'[]') as users"));
	assert!(collapse(&sql).contains("WHERE _0_users.id = _1_orders.user_id ORDER BY id ASC"));
	assert!(args.is_empty());
}

#[test]
fn unknown_top_level_keys_fail_with_not_found() {
	let catalog = eshop();
	assert!(matches!(
		catalog.model("eshop", "ghosts"),
		Err(lattice_core::Error::NotFound(_))
	));
}

#[test]
fn where_vocabulary_binds_sequential_placeholders() {
	let catalog = eshop();
	let users = catalog.model("eshop", "users").unwrap();
	let body = json!({
		"id": {"_gte": 1, "_lte": 10},
		"email": {"_ilike": "shop"},
		"orders": {"total": {"_gt": 100}}
	});
	let mut idx = 1;
	let (sql, args) = users.build_where_clause(&catalog, Some(&body), "u", &mut idx, " WHERE ", "");
	for n in 1..=4 {
		assert!(sql.contains(&format!("${n}")), "${n} missing in {sql}");
	}
	assert_eq!(args.len(), 4);
	assert_eq!(args[2], SqlArg::Text("%shop%".into()));
	assert_eq!(idx, 5);
}

#[test]
fn aggregate_bodies_produce_one_json_document() {
	let catalog = eshop();
	let orders = catalog.model("eshop", "orders").unwrap();
	let body = json!({"_count": true, "_max": ["total"], "_avg": ["total"]});
	let mut idx = 1;
	let (sql, _) = orders
		.select_aggregate(&catalog, None, &body, 0, &mut idx, None, "_0_orders_aggregate", "orders_aggregate")
		.unwrap();
	let sql = collapse(&sql);
	assert!(sql.starts_with(
		"SELECT json_build_object('count',COUNT(*),'max',json_build_object('total',MAX(_0_orders.total)),\
		 'avg',json_build_object('total',AVG(_0_orders.total))) as orders_aggregate"
	));
}

#[test]
fn graphql_and_rest_trees_compile_to_identical_sql() {
	let catalog = eshop();
	let users = catalog.model("eshop", "users").unwrap();

	let tree = parse_operation(
		r#"{ eshop_users(_where: {id: {_eq: 1}}) { id email orders(_limit: 1) { id } } }"#,
		None,
		&Map::new(),
	)
	.unwrap();
	let gql_body = &tree["eshop_users"];

	let rest_body = json!({
		"_where": {"id": {"_eq": 1}},
		"orders": {"_limit": 1, "_select": {"id": true}},
		"_select": {"id": true, "email": true}
	});

	let mut idx = 1;
	let (gql_sql, gql_args) =
		users.select(&catalog, None, gql_body, 0, &mut idx, None, "_0_users").unwrap();
	idx = 1;
	let (rest_sql, rest_args) =
		users.select(&catalog, None, &rest_body, 0, &mut idx, None, "_0_users").unwrap();

	assert_eq!(gql_sql, rest_sql);
	assert_eq!(gql_args, rest_args);
	assert_eq!(gql_args, vec![SqlArg::Int(1), SqlArg::Int(1)]);
}

#[test]
fn generated_schema_reflects_the_catalog() {
	let catalog = eshop();
	let sdl = &catalog.graphql.sdl;
	assert!(sdl.contains("type eshop_users"));
	assert!(sdl.contains("eshop_users_aggregate"));
	assert!(sdl.contains("input eshop_orders_bool_exp"));
	assert!(sdl.contains("order_by_direction_enum"));
	// the relation surfaces as a field of the parent type
	assert!(sdl.contains("orders("));
}

#[test]
fn identity_scoping_rejects_foreign_databases_before_compilation() {
	let mut claims = lattice_core::iam::Claims::new();
	claims.insert("id".into(), json!(1));
	claims.insert("database".into(), json!("d1"));
	let bearer = token::sign(&claims).unwrap();

	assert!(token::verify_for_database(&bearer, "d1").is_ok());
	assert!(matches!(
		token::verify_for_database(&bearer, "d2"),
		Err(lattice_core::Error::Unauthenticated(_))
	));
}

#[test]
fn custom_endpoint_shapes_are_validated() {
	let handler = |endpoint: &str| rest::RestHandler {
		id: 0,
		database: "eshop".into(),
		method: "GET".into(),
		endpoint: endpoint.into(),
		query: "SELECT 1".into(),
		enabled: true,
		auth: false,
	};
	for accepted in ["/rest/x", "/rest/x/y", "/rest/abc_123"] {
		assert!(rest::validate_endpoint(&handler(accepted)).is_ok(), "{accepted}");
	}
	for rejected in ["/rest", "/rest/", "/foo/bar", "/rest/x-y"] {
		assert!(rest::validate_endpoint(&handler(rejected)).is_err(), "{rejected}");
	}
}

#[test]
fn nested_insert_bodies_compile_row_by_row() {
	let catalog = eshop();
	let users = catalog.model("eshop", "users").unwrap();

	// the relation alias is dropped from the parent row; the executor
	// recurses into it after reading the parent's RETURNING row
	let row = json!({"email": "a@b.c", "orders": {"objects": [{"total": 5}]}});
	let (sql, args) = users.compile_insert(None, &row, None).unwrap();
	assert_eq!(sql, "INSERT INTO eshop.users(email) VALUES($1) RETURNING *");
	assert_eq!(args, vec![SqlArg::Text("a@b.c".into())]);

	let orders = catalog.model("eshop", "orders").unwrap();
	let child = json!({"total": 5, "user_id": 1});
	let (sql, _) = orders.compile_insert(None, &child, None).unwrap();
	assert_eq!(sql, "INSERT INTO eshop.orders(total,user_id) VALUES($1,$2) RETURNING *");
}

#[test]
fn update_and_delete_return_affected_rows() {
	let catalog = eshop();
	let users = catalog.model("eshop", "users").unwrap();

	let update = json!({"_set": {"email": "z@y.x"}, "_where": {"email": {"_eq": "x@y.z"}}});
	let (sql, args) = users.compile_update(&catalog, None, &update).unwrap();
	assert!(collapse(&sql).ends_with("WHERE users.email = $2 RETURNING *"), "{sql}");
	assert_eq!(args.len(), 2);

	let delete = json!({"_where": {"id": {"_in": [1, 2, 3]}}});
	let (sql, args) = users.compile_delete(&catalog, &delete).unwrap();
	assert!(collapse(&sql).contains("users.id = ANY($1)"), "{sql}");
	assert_eq!(args, vec![SqlArg::IntArray(vec![1, 2, 3])]);
}
