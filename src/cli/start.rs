use clap::Args;

use crate::{dbs, net, telemetry};

#[derive(Args, Debug)]
pub struct StartArguments {
	/// The Postgres connection string (falls back to CONNECTION_STRING)
	#[arg(long, env = "CONNECTION_STRING")]
	pub connection_string: Option<String>,

	/// The port to bind (falls back to PORT)
	#[arg(long, env = "PORT")]
	pub port: Option<u16>,
}

pub fn init(args: StartArguments) -> anyhow::Result<()> {
	// flags override the environment before anything reads it
	if let Some(conn) = &args.connection_string {
		std::env::set_var("CONNECTION_STRING", conn);
	}
	if let Some(port) = args.port {
		std::env::set_var("PORT", port.to_string());
	}

	telemetry::init();

	let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
	runtime.block_on(async {
		dbs::init().await?;
		net::init().await?;
		Ok::<_, anyhow::Error>(())
	})?;
	Ok(())
}
