use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, ensure};

use sift_engine::{
	CommandProvider, EngineOptions, MemoryProvider, ProviderFactory, SourceProvider,
};

use crate::cli::CliArgs;

/// Resolved application configuration: engine tunables plus the candidate
/// source each session will be constructed from.
pub struct AppConfig {
	/// Engine tunables handed to the session manager.
	pub options: EngineOptions,
	/// Builds one fresh provider per session.
	pub factory: ProviderFactory,
	/// Description of the source, for logging.
	pub source_label: String,
}

impl std::fmt::Debug for AppConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AppConfig")
			.field("options", &self.options)
			.field("source_label", &self.source_label)
			.finish_non_exhaustive()
	}
}

/// Build configuration from CLI arguments with sensible defaults.
pub fn resolve(cli: &CliArgs) -> Result<AppConfig> {
	ensure!(cli.max_results > 0, "max-results must be greater than zero");
	if let Some(workers) = cli.workers {
		ensure!(workers > 0, "workers must be greater than zero");
	}

	let options = EngineOptions {
		max_results: cli.max_results,
		debounce: Duration::from_millis(cli.debounce_ms),
		worker_count: cli.workers.unwrap_or(0),
		case_mode: cli.case_mode.into(),
		emit_interval: Duration::from_millis(cli.emit_interval_ms),
	};

	let (factory, source_label) = if let Some(command) = &cli.command {
		command_factory(command)?
	} else if let Some(path) = &cli.candidates {
		let text = fs::read_to_string(path)
			.with_context(|| format!("failed to read candidate file {}", path.display()))?;
		let entries: Arc<Vec<String>> =
			Arc::new(text.lines().map(str::to_string).collect());
		let label = format!("{} ({} candidates)", path.display(), entries.len());
		let factory: ProviderFactory = Arc::new(move || {
			Ok(Box::new(MemoryProvider::new(Arc::clone(&entries))) as Box<dyn SourceProvider>)
		});
		(factory, label)
	} else {
		// clap's source group makes this unreachable in practice.
		anyhow::bail!("no candidate source configured");
	};

	Ok(AppConfig {
		options,
		factory,
		source_label,
	})
}

fn command_factory(command: &str) -> Result<(ProviderFactory, String)> {
	let mut parts = command.split_whitespace();
	let program = parts
		.next()
		.context("source command must not be empty")?
		.to_string();
	let args: Vec<String> = parts.map(str::to_string).collect();
	let label = command.to_string();

	let factory: ProviderFactory = Arc::new(move || {
		// A fresh child per session: the superseded one is killed by its
		// own session's teardown.
		CommandProvider::spawn(&program, &args)
			.map(|provider| Box::new(provider) as Box<dyn SourceProvider>)
	});
	Ok((factory, label))
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::Parser;
	use std::io::Write;

	fn cli(args: &[&str]) -> CliArgs {
		CliArgs::try_parse_from(args).unwrap()
	}

	#[test]
	fn loads_candidates_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "src/main.rs\nsrc/lib.rs").unwrap();
		let path = file.path().to_str().unwrap().to_string();

		let config = resolve(&cli(&["sift", path.as_str()])).unwrap();
		assert!(config.source_label.contains("2 candidates"));

		let mut provider = (config.factory)().unwrap();
		let fetched = provider.poll_next(Duration::from_millis(10)).unwrap();
		match fetched {
			sift_engine::Fetch::Item(candidate) => assert_eq!(candidate.text, "src/main.rs"),
			other => panic!("expected a candidate, got {other:?}"),
		}
	}

	#[test]
	fn missing_candidate_file_is_an_error() {
		let err = resolve(&cli(&["sift", "/definitely/not/here.txt"])).unwrap_err();
		assert!(err.to_string().contains("failed to read candidate file"));
	}

	#[test]
	fn rejects_zero_max_results() {
		let err = resolve(&cli(&["sift", "x.txt", "--max-results", "0"])).unwrap_err();
		assert!(err.to_string().contains("max-results"));
	}

	#[test]
	fn command_source_builds_a_fresh_child_per_session() {
		let config = resolve(&cli(&["sift", "--command", "printf first\\nsecond\\n"])).unwrap();
		assert_eq!(config.options.worker_count, 0);
		let provider_a = (config.factory)();
		let provider_b = (config.factory)();
		assert!(provider_a.is_ok());
		assert!(provider_b.is_ok());
	}
}
