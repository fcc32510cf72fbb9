//! The GraphQL layer. The schema is generated from the live catalog on
//! every build/reload; incoming operations are parsed into the same ordered
//! tree shape the REST compilers consume, so one compiler pipeline serves
//! both surfaces. The dynamic schema itself only executes introspection
//! queries (and renders the SDL); data operations never run through its
//! resolvers.

pub mod parse;
pub mod resolve;
pub mod schema;

use std::collections::HashMap;

use async_graphql::dynamic::Schema;
use serde::Deserialize;

use crate::cat::Models;
use crate::cnf;
use crate::err::Error;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
	Select,
	Insert,
	Update,
	Delete,
}

/// Where a root field lands: which database, which table, which action.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
	pub database: String,
	pub table: String,
	pub action: ActionType,
}

pub struct GraphQlEntity {
	pub schema: Schema,
	pub sdl: String,
	pub resolvers: HashMap<String, ResolverConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlRequest {
	pub query: String,
	#[serde(default, rename = "operationName")]
	pub operation_name: Option<String>,
	#[serde(default)]
	pub variables: Option<serde_json::Value>,
}

impl GraphQlRequest {
	pub fn validate(&self) -> Result<()> {
		if self.query.trim().is_empty() {
			return Err(Error::invalid("please provide at least a query or a mutation"));
		}
		Ok(())
	}

	pub fn is_introspection(&self) -> bool {
		self.operation_name.as_deref() == Some("IntrospectionQuery")
	}
}

impl GraphQlEntity {
	pub fn build(models: &Models) -> Result<GraphQlEntity> {
		schema::build_entity(models)
	}

	/// Dump the SDL to disk when `WRITE_GRAPHQL_SCHEMA_FILE=ON`.
	pub fn write_schema_file(&self) {
		if !*cnf::WRITE_GRAPHQL_SCHEMA_FILE {
			return;
		}
		match std::fs::write(&*cnf::GRAPHQL_SCHEMA_FILE_NAME, &self.sdl) {
			Ok(()) => {
				info!(target: "lattice::gql", "GraphQL schema written to {}", &*cnf::GRAPHQL_SCHEMA_FILE_NAME)
			}
			Err(err) => warn!(target: "lattice::gql", "error writing schema file: {err}"),
		}
	}

	/// Run an introspection query against the generated schema.
	pub async fn introspection_response(&self, request: &GraphQlRequest) -> Result<serde_json::Value> {
		let mut req = async_graphql::Request::new(&request.query);
		if let Some(operation) = &request.operation_name {
			req = req.operation_name(operation);
		}
		if let Some(variables) = &request.variables {
			req = req.variables(async_graphql::Variables::from_json(variables.clone()));
		}
		let response = self.schema.execute(req).await;
		Ok(serde_json::to_value(&response)?)
	}
}
