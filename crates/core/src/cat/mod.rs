//! The catalog: an in-memory reflection of the database (schemas, tables,
//! columns, indexes) joined with everything the engine stores about them:
//! engineer-declared relations, RLS policies, auth entities, webhooks, data
//! triggers, custom REST handlers, and the generated GraphQL schema.
//!
//! The catalog is immutable once built. Reload builds a fresh value and
//! swaps the shared `Arc`, so readers keep the snapshot they started with
//! and never observe a half-rebuilt catalog.

pub mod auth;
pub mod bootstrap;
pub mod model;
pub mod reflect;
pub mod relation;
pub mod rest;
pub mod rls;
pub mod trigger;
pub mod webhook;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use sqlx::PgPool;
use tokio::sync::{Mutex, RwLock};

pub use model::{Column, Index, IndexKind, Model};
pub use relation::{RelationSchema, RelationType};

use crate::cnf;
use crate::err::Error;
use crate::fx::emitter::EventEmitter;
use crate::gql::GraphQlEntity;
use crate::Result;

/// database → table → model, tables in reflection (name) order.
pub type Models = HashMap<String, IndexMap<String, Model>>;

pub struct Catalog {
	pub databases: Vec<String>,
	pub models: Models,
	pub relations: Vec<RelationSchema>,
	pub policies: Vec<rls::RlsPolicy>,
	pub auth_entities: Vec<auth::AuthEntity>,
	pub webhooks: HashMap<webhook::WebhookKey, Vec<webhook::Webhook>>,
	pub triggers: HashMap<(String, String), trigger::DataTrigger>,
	pub rest_handlers: Vec<rest::RestHandler>,
	pub graphql: GraphQlEntity,
}

impl Catalog {
	/// Reflect the database and load every engine table.
	pub async fn build(pool: &PgPool) -> Result<Catalog> {
		let databases = reflect::get_databases(pool).await?;
		let models = reflect::initialize_models(pool, &databases).await?;
		let relations = relation::load_relations(pool).await?;
		let policies = rls::load_policies(pool).await?;
		let auth_entities = auth::load_auth_entities(pool).await?;
		let webhooks = webhook::load_webhooks(pool).await?;
		let triggers = trigger::load_triggers(pool).await?;
		let rest_handlers = rest::load_rest_handlers(pool).await?;
		Self::assemble(
			databases,
			models,
			relations,
			policies,
			auth_entities,
			webhooks,
			triggers,
			rest_handlers,
		)
	}

	/// Join reflected models with engine records and generate the GraphQL
	/// schema. Relations only land on a model when both endpoints resolve.
	#[allow(clippy::too_many_arguments)]
	pub fn assemble(
		databases: Vec<String>,
		models: Vec<Model>,
		relations: Vec<RelationSchema>,
		policies: Vec<rls::RlsPolicy>,
		auth_entities: Vec<auth::AuthEntity>,
		webhooks: HashMap<webhook::WebhookKey, Vec<webhook::Webhook>>,
		triggers: HashMap<(String, String), trigger::DataTrigger>,
		rest_handlers: Vec<rest::RestHandler>,
	) -> Result<Catalog> {
		let mut map: Models = HashMap::new();
		for model in models {
			map.entry(model.database.clone())
				.or_default()
				.insert(model.table.clone(), model);
		}
		for relation in &relations {
			let Some(tables) = map.get(&relation.database) else {
				continue;
			};
			if !tables.contains_key(&relation.to_table) {
				continue;
			}
			if let Some(tables) = map.get_mut(&relation.database) {
				if let Some(from) = tables.get_mut(&relation.from_table) {
					from.relations.insert(relation.alias.clone(), relation.clone());
				}
			}
		}
		let graphql = GraphQlEntity::build(&map)?;
		Ok(Catalog {
			databases,
			models: map,
			relations,
			policies,
			auth_entities,
			webhooks,
			triggers,
			rest_handlers,
			graphql,
		})
	}

	pub fn database_exists(&self, database: &str) -> bool {
		self.models.contains_key(database)
	}

	/// Look a model up by a body key; `_aggregate` suffixes resolve to the
	/// underlying table.
	pub fn model(&self, database: &str, key: &str) -> Result<&Model> {
		let tables = self.models.get(database).ok_or_else(|| {
			Error::not_found(format!("no such model {key} for database {database}"))
		})?;
		tables
			.get(crate::sql::base_alias(key))
			.ok_or_else(|| Error::not_found(format!("no such model {key}")))
	}

	/// Resolve a relation alias on a model to the target model plus the
	/// relation record.
	pub fn related<'a>(
		&'a self,
		model: &'a Model,
		alias: &str,
	) -> Option<(&'a Model, &'a RelationSchema)> {
		let info = model.relation_info(alias)?;
		let related = self.models.get(&info.database)?.get(&info.to_table)?;
		Some((related, info))
	}

	/// The user-facing database list: the internal schema is hidden.
	pub fn list_databases(&self) -> Vec<&str> {
		self.databases
			.iter()
			.map(String::as_str)
			.filter(|db| *db != cnf::INTERNAL_SCHEMA_NAME.as_str())
			.collect()
	}

	pub fn list_models(&self, database: &str) -> Result<Vec<&Model>> {
		let tables = self
			.models
			.get(database)
			.ok_or_else(|| Error::not_found(format!("database {database} doesn't exist")))?;
		Ok(tables.values().collect())
	}

	pub fn webhooks_for(
		&self,
		database: &str,
		table: &str,
		operation: &str,
		timing: &str,
	) -> &[webhook::Webhook] {
		let key =
			(database.to_owned(), table.to_owned(), operation.to_owned(), timing.to_owned());
		self.webhooks.get(&key).map(Vec::as_slice).unwrap_or_default()
	}

	pub fn trigger_for(&self, database: &str, table: &str) -> Option<&trigger::DataTrigger> {
		self.triggers.get(&(database.to_owned(), table.to_owned()))
	}

	pub fn rest_handler(&self, method: &str, endpoint: &str) -> Option<&rest::RestHandler> {
		self.rest_handlers.iter().find(|h| h.method == method && h.endpoint == endpoint)
	}

	pub fn auth_entity(&self, database: &str, table: &str) -> Option<&auth::AuthEntity> {
		self.auth_entities.iter().find(|e| e.database == database && e.table == table)
	}
}

/// The shared engine state: the connection pool, the current catalog
/// snapshot, and the in-process event emitter. Reloads are serialized by a
/// dedicated mutex while readers swap-in whole catalogs. A reload failure
/// after an admin mutation poisons the engine: the in-memory catalog can no
/// longer be trusted to match the database, so nothing is served until the
/// process restarts.
pub struct Engine {
	pool: PgPool,
	catalog: RwLock<Arc<Catalog>>,
	reload_lock: Mutex<()>,
	poisoned: AtomicBool,
	pub emitter: Arc<EventEmitter>,
}

impl Engine {
	/// Bootstrap the internal schema, provision the super user, and build
	/// the first catalog. A reflection failure here is fatal to the caller.
	pub async fn init(pool: PgPool) -> Result<Engine> {
		bootstrap::initialize_internal_schema(&pool).await?;
		bootstrap::create_super_user(&pool).await;
		let catalog = Catalog::build(&pool).await?;
		catalog.graphql.write_schema_file();
		info!(target: "lattice::cat", "catalog built: {} databases", catalog.databases.len());
		Ok(Engine {
			pool,
			catalog: RwLock::new(Arc::new(catalog)),
			reload_lock: Mutex::new(()),
			poisoned: AtomicBool::new(false),
			emitter: Arc::new(EventEmitter::new()),
		})
	}

	pub fn pool(&self) -> &PgPool {
		&self.pool
	}

	/// The current catalog snapshot. Requests hold one snapshot for their
	/// whole lifetime and never mix in a mid-request reload.
	pub async fn catalog(&self) -> Arc<Catalog> {
		self.catalog.read().await.clone()
	}

	/// Whether a post-mutation reload has failed. A poisoned engine keeps
	/// its stale snapshot only so the flag can be observed; callers must
	/// refuse to serve from it.
	pub fn is_poisoned(&self) -> bool {
		self.poisoned.load(Ordering::Relaxed)
	}

	/// Rebuild the catalog and swap it in. Concurrent reloads queue behind
	/// each other; readers are never blocked for the duration of the build.
	/// A rebuild failure here is fatal: the admin mutation that triggered it
	/// has already committed, so the old snapshot no longer reflects the
	/// database and the engine is poisoned until the process restarts.
	pub async fn reload(&self) -> Result<()> {
		let _guard = self.reload_lock.lock().await;
		match Catalog::build(&self.pool).await {
			Ok(catalog) => {
				catalog.graphql.write_schema_file();
				*self.catalog.write().await = Arc::new(catalog);
				info!(target: "lattice::cat", "catalog reloaded");
				Ok(())
			}
			Err(err) => {
				self.poisoned.store(true, Ordering::Relaxed);
				error!(target: "lattice::cat", "catalog reload failed, engine is poisoned: {err}");
				Err(err)
			}
		}
	}
}

#[cfg(test)]
pub(crate) mod fixtures {
	use super::model::tests::column;
	use super::relation::{RelationSchema, RelationType};
	use super::*;

	/// Two tables with an ARRAY relation (users.orders) and an OBJECT
	/// relation back (orders.user), enough for every compiler test.
	pub fn catalog() -> Catalog {
		let mut users = Model::new("eshop", "users");
		users.set_columns(vec![
			column("id", "bigint"),
			column("email", "varchar"),
			column("password", "varchar"),
			column("tags", "varchar[]"),
			column("profile", "jsonb"),
		]);

		let mut orders = Model::new("eshop", "orders");
		orders.set_columns(vec![
			column("id", "bigint"),
			column("user_id", "bigint"),
			column("total", "int"),
		]);

		let relations = vec![
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
			RelationSchema {
				id: 2,
				alias: "user".into(),
				database: "eshop".into(),
				from_table: "orders".into(),
				from_column: "user_id".into(),
				to_table: "users".into(),
				to_column: "id".into(),
				relation_type: RelationType::Object,
			},
		];

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
		.expect("fixture catalog")
	}

	#[test]
	fn lookups_resolve_models_and_relations() {
		let catalog = catalog();
		assert!(catalog.database_exists("eshop"));
		assert!(!catalog.database_exists("ghost"));
		assert!(catalog.model("eshop", "users").is_ok());
		assert!(catalog.model("eshop", "users_aggregate").is_ok());
		assert!(matches!(catalog.model("eshop", "ghost"), Err(Error::NotFound(_))));
		assert!(matches!(catalog.model("ghost", "users"), Err(Error::NotFound(_))));

		let users = catalog.model("eshop", "users").unwrap();
		let (related, info) = catalog.related(users, "orders").unwrap();
		assert_eq!(related.table, "orders");
		assert_eq!(info.to_column, "user_id");
	}
}
