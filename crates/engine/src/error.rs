use std::io;

use thiserror::Error;

/// Failure raised by a candidate source.
///
/// Provider errors are confined to the session that observed them: the
/// session transitions to `Failed` and reports the reason, while the
/// session manager and any newer session continue untouched.
#[derive(Debug, Error)]
pub enum ProviderError {
	/// The underlying source failed to produce candidates.
	#[error("candidate source i/o failed: {0}")]
	Io(#[from] io::Error),

	/// An external producer process could not be started.
	#[error("failed to spawn candidate source `{command}`: {source}")]
	Spawn {
		/// The command line that failed to launch.
		command: String,
		/// The originating spawn error.
		source: io::Error,
	},
}
