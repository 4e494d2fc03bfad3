mod cli;
mod config;
mod logging;
mod messages;
mod server;

use anyhow::Result;
use clap::Parser;

use sift_engine::SessionManager;

fn main() -> Result<()> {
	let cli = cli::CliArgs::parse();
	logging::initialize();

	let app = config::resolve(&cli)?;
	tracing::info!(source = %app.source_label, "starting filter server");

	let (manager, updates) = SessionManager::spawn(app.options, app.factory);

	let stdin = std::io::stdin().lock();
	let stdout = std::io::stdout();
	server::run(stdin, stdout, manager, updates)
}
