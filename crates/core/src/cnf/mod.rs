use once_cell::sync::Lazy;

fn env_or(key: &str, default: &str) -> String {
	match std::env::var(key) {
		Ok(v) if !v.trim().is_empty() => v,
		_ => default.to_owned(),
	}
}

fn env_flag(key: &str) -> bool {
	matches!(std::env::var(key).as_deref(), Ok("ON"))
}

/// The schema hosting the engine's own tables
pub static INTERNAL_SCHEMA_NAME: Lazy<String> =
	Lazy::new(|| env_or("INTERNAL_SCHEMA_NAME", "root_engine"));

/// The HMAC signing key for issued and verified tokens
pub static JWT_SECRET: Lazy<String> = Lazy::new(|| env_or("JWT_SECRET", "lattice-dev-secret"));

/// Token lifetime in minutes; zero or negative disables the `exp` claim
pub static JWT_EXPIRATION_IN_MINUTES: Lazy<i64> = Lazy::new(|| {
	std::env::var("JWT_EXPIRATION_IN_MINUTES").ok().and_then(|v| v.parse().ok()).unwrap_or(0)
});

/// Whether compiled SQL statements are logged
pub static SQL_LOGGER: Lazy<bool> = Lazy::new(|| env_flag("SQL_LOGGER"));

/// Whether every auth middleware passes requests through unchecked
pub static DISABLE_AUTH: Lazy<bool> = Lazy::new(|| env_flag("DISABLE_AUTH"));

/// The Postgres role created for the engine at startup
pub static SUPER_USER: Lazy<String> = Lazy::new(|| env_or("SUPER_USER", "engine_administrator"));

/// The password for the super-user role
pub static SUPER_USER_PASSWORD: Lazy<String> =
	Lazy::new(|| env_or("SUPER_USER_PASSWORD", "12345678"));

/// The base URL of the external notification service for data triggers
pub static WEBSOCKET_SERVICE: Lazy<String> = Lazy::new(|| env_or("WEBSOCKET_SERVICE", ""));

/// The API key forwarded to the data-trigger notification service
pub static DATA_TRIGGER_SERVICE_API_KEY: Lazy<String> =
	Lazy::new(|| env_or("DATA_TRIGGER_SERVICE_API_KEY", ""));

/// Whether the GraphiQL page and introspection responses are served
pub static GRAPHIQL: Lazy<bool> = Lazy::new(|| env_flag("GRAPHIQL"));

/// The path the GraphQL endpoint is mounted on
pub static GRAPHQL_ENDPOINT: Lazy<String> = Lazy::new(|| env_or("GRAPHQL_ENDPOINT", "/graphql"));

/// The path the GraphiQL page is mounted on
pub static GRAPHIQL_ENDPOINT: Lazy<String> = Lazy::new(|| env_or("GRAPHIQL_ENDPOINT", "/graphiql"));

/// Whether the generated GraphQL SDL is dumped to disk on every reload
pub static WRITE_GRAPHQL_SCHEMA_FILE: Lazy<bool> =
	Lazy::new(|| env_flag("WRITE_GRAPHQL_SCHEMA_FILE"));

/// The file the generated GraphQL SDL is written to
pub static GRAPHQL_SCHEMA_FILE_NAME: Lazy<String> =
	Lazy::new(|| env_or("GRAPHQL_SCHEMA_FILE_NAME", "lattice_graphql_schema.gql"));

/// The timeout applied to outbound webhook and data-trigger requests
pub const EFFECT_HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// The session variable carrying the caller's claims into RLS predicates
pub const JWT_SESSION_VARIABLE: &str = "my.jwt_user";
