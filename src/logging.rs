use tracing_subscriber::EnvFilter;

/// Route structured logs to stderr, keeping stdout a clean protocol
/// channel. `RUST_LOG` overrides the default `info` filter.
pub fn initialize() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}
