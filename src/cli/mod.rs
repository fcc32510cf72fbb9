mod start;

use clap::{Parser, Subcommand};

use crate::cnf::{LOGO, PKG_VERSION};

#[derive(Parser)]
#[command(name = "lattice", bin_name = "lattice")]
#[command(about = "A schema-aware data gateway for PostgreSQL")]
#[command(version = PKG_VERSION.as_str())]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Start the gateway server
	Start(start::StartArguments),
	/// Print the version
	Version,
}

pub fn init() -> anyhow::Result<()> {
	let cli = Cli::parse();
	match cli.command {
		Command::Start(args) => {
			println!("{LOGO}");
			start::init(args)
		}
		Command::Version => {
			println!("lattice {}", *PKG_VERSION);
			Ok(())
		}
	}
}
