//! Runtime schema generation. For every model (internal schema excluded)
//! the builder registers the object type, the aggregate types, the filter /
//! order / enum / insert / update inputs, and the root Query and Mutation
//! selectors, using the fixed SQL → GraphQL type map.

use std::collections::HashMap;

use async_graphql::dynamic::{
	Enum, Field, FieldFuture, FieldValue, InputObject, InputValue, Object, Scalar, Schema,
	TypeRef,
};
use async_graphql::Value as GqlValue;

use crate::cat::{Column, Model, Models};
use crate::cnf;
use crate::err::Error;
use crate::gql::{ActionType, GraphQlEntity, ResolverConfig};
use crate::Result;

/// The fixed SQL → GraphQL scalar map. Unknown types read as String.
fn scalar_type(ty: &str) -> &'static str {
	match ty {
		"int" | "integer" | "bigint" | "bigserial" => "Int",
		"float" | "double" => "Float",
		"character varying" | "character" | "varchar" | "char" => "String",
		"tinyint" | "boolean" | "bool" => "Boolean",
		"json" | "jsonb" => "Object",
		_ => "String",
	}
}

/// Aggregate result fields: numeric and character types map directly,
/// everything else surfaces as Float.
fn aggregate_type(ty: &str) -> &'static str {
	match ty {
		"int" | "integer" | "bigint" | "bigserial" => "Int",
		"float" | "double" => "Float",
		"character varying" | "character" | "varchar" | "char" => "String",
		_ => "Float",
	}
}

/// Array columns wrap the base type in a list whose inner nullability
/// follows the column's nullability.
fn field_type(column: &Column) -> TypeRef {
	let base = scalar_type(column.ty.trim_end_matches("[]"));
	match (column.is_array(), column.nullable) {
		(true, false) => TypeRef::named_nn_list(base),
		(true, true) => TypeRef::named_list(base),
		(false, false) => TypeRef::named_nn(base),
		(false, true) => TypeRef::named(base),
	}
}

fn nullable_field_type(column: &Column) -> TypeRef {
	let base = scalar_type(column.ty.trim_end_matches("[]"));
	if column.is_array() {
		TypeRef::named_list(base)
	} else {
		TypeRef::named(base)
	}
}

fn type_name(model: &Model) -> String {
	format!("{}_{}", model.database, model.table)
}

/// Resolve a field off the parent row object. Only introspection executes
/// through the dynamic schema, but the resolvers stay correct regardless.
fn column_field(name: &str, ty: TypeRef) -> Field {
	let field_name = name.to_owned();
	Field::new(name.to_owned(), ty, move |ctx| {
		let field_name = field_name.clone();
		FieldFuture::new(async move {
			let Some(GqlValue::Object(parent)) = ctx.parent_value.as_value() else {
				return Ok(None);
			};
			Ok(parent.get(field_name.as_str()).cloned().map(FieldValue::value))
		})
	})
}

fn empty_field(name: &str, ty: TypeRef) -> Field {
	Field::new(name.to_owned(), ty, |_| {
		FieldFuture::new(async move { Ok(None::<FieldValue>) })
	})
}

fn select_arguments(mut field: Field, target: &str, paginated: bool) -> Field {
	field = field
		.argument(InputValue::new("_where", TypeRef::named(format!("{target}_bool_exp"))))
		.argument(InputValue::new("_groupBy", TypeRef::named_nn_list(format!("{target}_enum"))))
		.argument(InputValue::new("_orderBy", TypeRef::named(format!("{target}_order_by_exp"))))
		.argument(InputValue::new("_distinct", TypeRef::named_nn_list(format!("{target}_enum"))));
	if paginated {
		field = field
			.argument(InputValue::new("_limit", TypeRef::named(TypeRef::INT)))
			.argument(InputValue::new("_offset", TypeRef::named(TypeRef::INT)));
	}
	field
}

const OPERATOR_INPUTS: [(&str, OperatorShape); 21] = [
	("_in", OperatorShape::ValueList),
	("_nin", OperatorShape::ValueList),
	("_lt", OperatorShape::Value),
	("_lte", OperatorShape::Value),
	("_gt", OperatorShape::Value),
	("_gte", OperatorShape::Value),
	("_is", OperatorShape::Value),
	("_is_not", OperatorShape::Value),
	("_like", OperatorShape::Text),
	("_ilike", OperatorShape::Text),
	("_eq", OperatorShape::Value),
	("_neq", OperatorShape::Value),
	("_any", OperatorShape::ValueList),
	("_nany", OperatorShape::Value),
	("_all", OperatorShape::ValueList),
	("_contains", OperatorShape::Json),
	("_contained_in", OperatorShape::Json),
	("_key_exists", OperatorShape::Text),
	("_key_exists_any", OperatorShape::TextList),
	("_key_exists_all", OperatorShape::TextList),
	("_text_search", OperatorShape::Value),
];

#[derive(Clone, Copy)]
enum OperatorShape {
	Value,
	ValueList,
	Text,
	TextList,
	Json,
}

fn operator_type(shape: OperatorShape) -> TypeRef {
	match shape {
		OperatorShape::Value => TypeRef::named("SingleValue"),
		OperatorShape::ValueList => TypeRef::named_nn_list("SingleValue"),
		OperatorShape::Text => TypeRef::named(TypeRef::STRING),
		OperatorShape::TextList => TypeRef::named_list(TypeRef::STRING),
		OperatorShape::Json => TypeRef::named("Object"),
	}
}

fn column_input() -> InputObject {
	let mut input = InputObject::new("column_input");
	for (name, shape) in OPERATOR_INPUTS {
		input = input.field(InputValue::new(name, operator_type(shape)));
	}
	input
}

fn order_by_direction() -> Enum {
	Enum::new("order_by_direction_enum")
		.item("ASC")
		.item("ASC_NULLS_FIRST")
		.item("ASC_NULLS_LAST")
		.item("DESC")
		.item("DESC_NULLS_FIRST")
		.item("DESC_NULLS_LAST")
}

fn model_enum(model: &Model, name: &str) -> Enum {
	let mut items = Enum::new(format!("{name}_enum"));
	for column in &model.columns {
		items = items.item(column.name.clone());
	}
	items
}

fn model_bool_exp(model: &Model, name: &str, models: &Models) -> InputObject {
	let mut input = InputObject::new(format!("{name}_bool_exp"));
	for column in &model.columns {
		input = input.field(InputValue::new(column.name.clone(), TypeRef::named("column_input")));
	}
	for info in model.relations.values() {
		if models.get(&info.database).map_or(false, |t| t.contains_key(&info.to_table)) {
			input = input.field(InputValue::new(
				info.alias.clone(),
				TypeRef::named(format!("{}_{}_bool_exp", info.database, info.to_table)),
			));
		}
	}
	input = input
		.field(InputValue::new("_and", TypeRef::named_nn_list(format!("{name}_bool_exp"))))
		.field(InputValue::new("_or", TypeRef::named_nn_list(format!("{name}_bool_exp"))));
	input
}

fn model_order_by_exp(model: &Model, name: &str) -> InputObject {
	let mut input = InputObject::new(format!("{name}_order_by_exp"));
	for column in &model.columns {
		input = input.field(InputValue::new(
			column.name.clone(),
			TypeRef::named("order_by_direction_enum"),
		));
	}
	input
}

fn model_update_input(model: &Model, name: &str) -> InputObject {
	let mut input = InputObject::new(format!("{name}_update_input"));
	for column in &model.columns {
		input = input.field(InputValue::new(column.name.clone(), nullable_field_type(column)));
	}
	input
}

fn model_insert_inputs(model: &Model, name: &str, models: &Models) -> [InputObject; 3] {
	let mut objects = InputObject::new(format!("{name}_insert_input_objects"));
	for column in &model.columns {
		objects =
			objects.field(InputValue::new(column.name.clone(), nullable_field_type(column)));
	}
	for info in model.relations.values() {
		if models.get(&info.database).map_or(false, |t| t.contains_key(&info.to_table)) {
			objects = objects.field(InputValue::new(
				info.alias.clone(),
				TypeRef::named(format!("{}_{}_insert_input", info.database, info.to_table)),
			));
		}
	}

	let input = InputObject::new(format!("{name}_insert_input"))
		.field(InputValue::new(
			"objects",
			TypeRef::named_nn_list_nn(format!("{name}_insert_input_objects")),
		))
		.field(InputValue::new(
			"onConflict",
			TypeRef::named(format!("{name}_insert_input_conflict")),
		));

	let conflict = InputObject::new(format!("{name}_insert_input_conflict"))
		.field(InputValue::new("ignore", TypeRef::named(TypeRef::BOOLEAN)))
		.field(InputValue::new("update", TypeRef::named_nn_list(format!("{name}_enum"))))
		.field(InputValue::new("constraint", TypeRef::named(TypeRef::STRING)));

	[input, objects, conflict]
}

fn model_object(model: &Model, name: &str, models: &Models) -> Object {
	let mut object = Object::new(name.to_owned());
	for column in &model.columns {
		object = object.field(column_field(&column.name, field_type(column)));
	}
	for info in model.relations.values() {
		if !models.get(&info.database).map_or(false, |t| t.contains_key(&info.to_table)) {
			continue;
		}
		let target = format!("{}_{}", info.database, info.to_table);
		object = object.field(select_arguments(
			column_field(&info.alias, TypeRef::named(target.clone())),
			&target,
			true,
		));
		object = object.field(select_arguments(
			column_field(
				&format!("{}_aggregate", info.alias),
				TypeRef::named(format!("{target}_aggregate")),
			),
			&target,
			false,
		));
	}
	object
}

fn model_aggregate_objects(model: &Model, name: &str) -> Vec<Object> {
	let mut objects = Vec::new();
	let mut aggregate = Object::new(format!("{name}_aggregate"))
		.field(column_field("count", TypeRef::named(TypeRef::INT)));
	for agg in ["min", "max", "sum", "avg"] {
		let sub_name = format!("{name}_aggregate_{agg}");
		let mut sub = Object::new(sub_name.clone());
		for column in &model.columns {
			sub = sub.field(column_field(
				&column.name,
				TypeRef::named(aggregate_type(column.ty.trim_end_matches("[]"))),
			));
		}
		aggregate = aggregate.field(column_field(agg, TypeRef::named(sub_name)));
		objects.push(sub);
	}
	objects.push(aggregate);
	objects
}

/// The resolver-name → (database, table, action) routing table.
fn resolver_configs(models: &[&Model]) -> HashMap<String, ResolverConfig> {
	let mut configs = HashMap::new();
	for model in models {
		let base = type_name(model);
		let entry = |action| ResolverConfig {
			database: model.database.clone(),
			table: model.table.clone(),
			action,
		};
		configs.insert(base.clone(), entry(ActionType::Select));
		configs.insert(format!("{base}_aggregate"), entry(ActionType::Select));
		configs.insert(format!("{base}_insert"), entry(ActionType::Insert));
		configs.insert(format!("{base}_update"), entry(ActionType::Update));
		configs.insert(format!("{base}_delete"), entry(ActionType::Delete));
	}
	configs
}

pub(super) fn build_entity(models: &Models) -> Result<GraphQlEntity> {
	// deterministic schema: databases and tables in name order, internal
	// schema excluded
	let mut list: Vec<&Model> = models
		.values()
		.flat_map(|tables| tables.values())
		.filter(|m| m.database != *cnf::INTERNAL_SCHEMA_NAME)
		.collect();
	list.sort_by(|a, b| (&a.database, &a.table).cmp(&(&b.database, &b.table)));

	let mut query = Object::new("Query").field(Field::new(
		"version",
		TypeRef::named_nn(TypeRef::STRING),
		|_| {
			FieldFuture::new(async move {
				Ok(Some(FieldValue::value(env!("CARGO_PKG_VERSION"))))
			})
		},
	));
	let mut mutation = Object::new("Mutation");
	let mut has_mutations = false;

	let mut builder = Schema::build("Query", (!list.is_empty()).then_some("Mutation"), None::<String>.as_deref())
		.register(Scalar::new("Object"))
		.register(Scalar::new("SingleValue"))
		.register(order_by_direction())
		.register(column_input());

	for model in &list {
		let name = type_name(model);

		builder = builder.register(model_object(model, &name, models));
		for aggregate in model_aggregate_objects(model, &name) {
			builder = builder.register(aggregate);
		}
		builder = builder
			.register(model_enum(model, &name))
			.register(model_bool_exp(model, &name, models))
			.register(model_order_by_exp(model, &name))
			.register(model_update_input(model, &name));
		for input in model_insert_inputs(model, &name, models) {
			builder = builder.register(input);
		}

		query = query.field(select_arguments(
			empty_field(&name, TypeRef::named_nn_list(name.clone())),
			&name,
			true,
		));
		query = query.field(select_arguments(
			empty_field(&format!("{name}_aggregate"), TypeRef::named(format!("{name}_aggregate"))),
			&name,
			false,
		));

		mutation = mutation.field(
			empty_field(&format!("{name}_insert"), TypeRef::named("Object")).argument(
				InputValue::new("args", TypeRef::named_nn(format!("{name}_insert_input"))),
			),
		);
		mutation = mutation.field(
			empty_field(&format!("{name}_update"), TypeRef::named("Object"))
				.argument(InputValue::new(
					"_set",
					TypeRef::named_nn(format!("{name}_update_input")),
				))
				.argument(InputValue::new("_where", TypeRef::named(format!("{name}_bool_exp")))),
		);
		mutation = mutation.field(
			empty_field(&format!("{name}_delete"), TypeRef::named("Object"))
				.argument(InputValue::new("_where", TypeRef::named(format!("{name}_bool_exp")))),
		);
		has_mutations = true;
	}

	builder = builder.register(query);
	if has_mutations {
		builder = builder.register(mutation);
	}

	let schema = builder.finish().map_err(|err| Error::internal(err.to_string()))?;
	let sdl = schema.sdl();
	let resolvers = resolver_configs(&list);

	Ok(GraphQlEntity {
		schema,
		sdl,
		resolvers,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cat::fixtures;

	#[test]
	fn schema_carries_models_inputs_and_roots() {
		let catalog = fixtures::catalog();
		let sdl = &catalog.graphql.sdl;
		assert!(sdl.contains("type eshop_users"), "{sdl}");
		assert!(sdl.contains("type eshop_orders_aggregate"), "{sdl}");
		assert!(sdl.contains("input eshop_users_bool_exp"), "{sdl}");
		assert!(sdl.contains("input eshop_orders_insert_input_objects"), "{sdl}");
		assert!(sdl.contains("enum eshop_users_enum"), "{sdl}");
		assert!(sdl.contains("eshop_users(") && sdl.contains("eshop_users_aggregate("), "{sdl}");
		assert!(sdl.contains("eshop_orders_insert("), "{sdl}");
		assert!(sdl.contains("scalar SingleValue"), "{sdl}");
	}

	#[test]
	fn resolver_map_routes_every_action() {
		let catalog = fixtures::catalog();
		let resolvers = &catalog.graphql.resolvers;
		assert_eq!(resolvers["eshop_users"].action, ActionType::Select);
		assert_eq!(resolvers["eshop_users_aggregate"].action, ActionType::Select);
		assert_eq!(resolvers["eshop_orders_insert"].action, ActionType::Insert);
		assert_eq!(resolvers["eshop_orders_update"].action, ActionType::Update);
		assert_eq!(resolvers["eshop_orders_delete"].action, ActionType::Delete);
		assert_eq!(resolvers["eshop_users"].table, "users");
	}

	#[test]
	fn sql_types_map_onto_graphql_scalars() {
		assert_eq!(scalar_type("bigint"), "Int");
		assert_eq!(scalar_type("character varying"), "String");
		assert_eq!(scalar_type("jsonb"), "Object");
		assert_eq!(scalar_type("boolean"), "Boolean");
		assert_eq!(scalar_type("bytea"), "String");
		assert_eq!(aggregate_type("jsonb"), "Float");
	}

	#[test]
	fn array_columns_wrap_their_base_type() {
		let column = Column {
			name: "tags".into(),
			ty: "varchar[]".into(),
			max_length: None,
			nullable: false,
			default_value: None,
		};
		assert_eq!(field_type(&column).to_string(), "[String!]");
		let column = Column {
			nullable: true,
			..column
		};
		assert_eq!(field_type(&column).to_string(), "[String]");
	}
}
