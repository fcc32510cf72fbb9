#[macro_use]
extern crate tracing;

mod cli;
mod cnf;
mod dbs;
mod err;
mod net;
mod telemetry;

fn main() -> anyhow::Result<()> {
	cli::init()
}
