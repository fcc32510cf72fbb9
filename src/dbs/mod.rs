use std::sync::Arc;

use once_cell::sync::OnceCell;
use sqlx::postgres::PgPoolOptions;

use lattice_core::Engine;

use crate::cnf;
use crate::err::Error;

/// The shared engine, initialised once at startup.
pub static ENGINE: OnceCell<Arc<Engine>> = OnceCell::new();

pub async fn init() -> Result<(), Error> {
	let pool = PgPoolOptions::new()
		.max_connections(*cnf::MAX_CONNECTIONS)
		.min_connections((*cnf::MAX_IDLE_CONNECTIONS).min(*cnf::MAX_CONNECTIONS))
		.connect(&cnf::CONNECTION_STRING)
		.await?;

	let engine = Engine::init(pool).await?;
	let _ = ENGINE.set(Arc::new(engine));
	Ok(())
}

/// The engine handle. Only valid after [`init`] has completed.
pub fn engine() -> &'static Arc<Engine> {
	ENGINE.get().expect("engine is initialised at startup")
}
