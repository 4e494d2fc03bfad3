use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};
use sift_matcher::CaseMode;

/// Command line interface for the sift filtering server.
#[derive(Debug, Parser)]
#[command(name = "sift", version, about = "Fuzzy filtering engine speaking line-delimited JSON over stdio")]
#[command(group = ArgGroup::new("source").required(true).args(["candidates", "command"]))]
pub struct CliArgs {
	/// File containing candidate lines, one per line.
	#[arg(value_name = "CANDIDATES")]
	pub candidates: Option<PathBuf>,

	/// External command whose stdout lines are the candidate stream.
	#[arg(long, env = "SIFT_SOURCE_COMMAND", value_name = "COMMAND")]
	pub command: Option<String>,

	/// Maximum number of ranked results kept and reported.
	#[arg(long, default_value_t = 100, env = "SIFT_MAX_RESULTS")]
	pub max_results: usize,

	/// Queries arriving faster than this are coalesced; only the latest
	/// starts a search.
	#[arg(long = "debounce-ms", default_value_t = 50)]
	pub debounce_ms: u64,

	/// Scoring worker threads. Defaults to available parallelism.
	#[arg(long)]
	pub workers: Option<usize>,

	/// Case folding behaviour for matching.
	#[arg(long, value_enum, default_value_t = CaseModeArg::Smart)]
	pub case_mode: CaseModeArg,

	/// Minimum milliseconds between progressive snapshot notifications.
	#[arg(long = "emit-interval-ms", default_value_t = 100)]
	pub emit_interval_ms: u64,
}

/// CLI surface of the matcher's case modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CaseModeArg {
	/// Case-insensitive unless the query contains an uppercase character.
	Smart,
	/// Characters must match exactly.
	Sensitive,
	/// Characters always compare case-folded.
	Insensitive,
}

impl From<CaseModeArg> for CaseMode {
	fn from(arg: CaseModeArg) -> Self {
		match arg {
			CaseModeArg::Smart => Self::Smart,
			CaseModeArg::Sensitive => Self::Sensitive,
			CaseModeArg::Insensitive => Self::Insensitive,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn requires_a_candidate_source() {
		assert!(CliArgs::try_parse_from(["sift"]).is_err());
		assert!(CliArgs::try_parse_from(["sift", "candidates.txt"]).is_ok());
		assert!(CliArgs::try_parse_from(["sift", "--command", "rg --files"]).is_ok());
		assert!(
			CliArgs::try_parse_from(["sift", "candidates.txt", "--command", "rg --files"]).is_err(),
			"file and command sources are mutually exclusive"
		);
	}

	#[test]
	fn parses_engine_tunables() {
		let cli = CliArgs::try_parse_from([
			"sift",
			"candidates.txt",
			"--max-results",
			"25",
			"--debounce-ms",
			"10",
			"--workers",
			"4",
			"--case-mode",
			"sensitive",
		])
		.unwrap();
		assert_eq!(cli.max_results, 25);
		assert_eq!(cli.debounce_ms, 10);
		assert_eq!(cli.workers, Some(4));
		assert_eq!(cli.case_mode, CaseModeArg::Sensitive);
	}
}
