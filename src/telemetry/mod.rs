use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialise the tracing subscriber. `RUST_LOG` wins when set; otherwise
/// the gateway logs at info.
pub fn init() {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new("lattice=info,lattice_core=info"));
	tracing_subscriber::registry()
		.with(fmt::layer().compact().with_writer(std::io::stderr))
		.with(filter)
		.init();
}
