//! Single-flight session ownership, generation bumping and debounce.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sift_matcher::CaseMode;

use crate::error::ProviderError;
use crate::pool::WorkerPool;
use crate::provider::SourceProvider;
use crate::session::{FailureKind, SessionEvent, SessionParams, SessionUpdate, run_session};

/// Builds a fresh provider for each session, so no partial consumption from
/// a superseded query leaks into a new one.
pub type ProviderFactory =
	Arc<dyn Fn() -> Result<Box<dyn SourceProvider>, ProviderError> + Send + Sync>;

/// Engine configuration consumed from the host application.
#[derive(Debug, Clone)]
pub struct EngineOptions {
	/// Result cap K.
	pub max_results: usize,
	/// Queries arriving faster than this are coalesced; only the latest
	/// one starts a session.
	pub debounce: Duration,
	/// Scoring threads; `0` means available parallelism.
	pub worker_count: usize,
	/// Case folding mode handed to the matcher.
	pub case_mode: CaseMode,
	/// Minimum interval between snapshot emissions of a session.
	pub emit_interval: Duration,
}

impl Default for EngineOptions {
	fn default() -> Self {
		Self {
			max_results: 100,
			debounce: Duration::from_millis(50),
			worker_count: 0,
			case_mode: CaseMode::Smart,
			emit_interval: Duration::from_millis(100),
		}
	}
}

enum ManagerCommand {
	Query { generation: u64, raw: String },
	Shutdown,
}

/// Owns at most one running filter session.
///
/// [`SessionManager::submit`] bumps the shared generation counter before
/// anything else; that bump is the cancellation signal for whatever session
/// is still running, observed cooperatively at its next yield point. The
/// manager thread then debounces and starts a session for the latest query
/// only.
pub struct SessionManager {
	commands: Sender<ManagerCommand>,
	latest: Arc<AtomicU64>,
	thread: Option<JoinHandle<()>>,
}

impl SessionManager {
	/// Start the manager thread. Updates from all sessions arrive on the
	/// returned receiver, tagged with their generation.
	#[must_use]
	pub fn spawn(options: EngineOptions, factory: ProviderFactory) -> (Self, Receiver<SessionUpdate>) {
		let latest = Arc::new(AtomicU64::new(0));
		let (command_tx, command_rx) = channel();
		let (update_tx, update_rx) = channel();

		let pool = Arc::new(if options.worker_count == 0 {
			WorkerPool::with_available_parallelism()
		} else {
			WorkerPool::new(options.worker_count)
		});
		tracing::info!(
			workers = pool.worker_count(),
			max_results = options.max_results,
			"filter engine ready"
		);

		let thread_latest = Arc::clone(&latest);
		let thread = thread::spawn(move || {
			manager_loop(&options, &factory, &pool, &thread_latest, &command_rx, &update_tx);
		});

		(
			Self {
				commands: command_tx,
				latest,
				thread: Some(thread),
			},
			update_rx,
		)
	}

	/// Submit a new query, superseding any running or pending one.
	/// Non-blocking; returns the generation assigned to this query.
	pub fn submit(&self, raw: impl Into<String>) -> u64 {
		let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
		let _ = self.commands.send(ManagerCommand::Query {
			generation,
			raw: raw.into(),
		});
		generation
	}

	/// Generation of the most recently submitted query.
	#[must_use]
	pub fn current_generation(&self) -> u64 {
		self.latest.load(Ordering::Acquire)
	}

	/// Cancel any running session and stop the manager thread.
	pub fn shutdown(&mut self) {
		// The bump cancels the running session cooperatively.
		self.latest.fetch_add(1, Ordering::AcqRel);
		let _ = self.commands.send(ManagerCommand::Shutdown);
		if let Some(thread) = self.thread.take() {
			let _ = thread.join();
		}
	}
}

impl Drop for SessionManager {
	fn drop(&mut self) {
		self.shutdown();
	}
}

fn manager_loop(
	options: &EngineOptions,
	factory: &ProviderFactory,
	pool: &Arc<WorkerPool>,
	latest: &Arc<AtomicU64>,
	commands: &Receiver<ManagerCommand>,
	updates: &Sender<SessionUpdate>,
) {
	let mut pending: Option<(u64, String)> = None;
	let mut deadline = Instant::now();

	loop {
		let command = if pending.is_some() {
			let now = Instant::now();
			if now >= deadline {
				if let Some((generation, raw)) = pending.take() {
					start_session(options, factory, pool, latest, updates, generation, raw);
				}
				continue;
			}
			match commands.recv_timeout(deadline - now) {
				Ok(command) => command,
				Err(RecvTimeoutError::Timeout) => continue,
				Err(RecvTimeoutError::Disconnected) => break,
			}
		} else {
			match commands.recv() {
				Ok(command) => command,
				Err(_) => break,
			}
		};

		match command {
			ManagerCommand::Query { generation, raw } => {
				// An older pending query is coalesced away before it ever
				// starts; the window restarts from the newest keystroke.
				pending = Some((generation, raw));
				deadline = Instant::now() + options.debounce;
			}
			ManagerCommand::Shutdown => break,
		}
	}
}

fn start_session(
	options: &EngineOptions,
	factory: &ProviderFactory,
	pool: &Arc<WorkerPool>,
	latest: &Arc<AtomicU64>,
	updates: &Sender<SessionUpdate>,
	generation: u64,
	raw: String,
) {
	// A newer submission may have bumped the counter while this query sat
	// in the debounce window.
	if latest.load(Ordering::Acquire) != generation {
		tracing::debug!(generation, "query superseded before starting");
		return;
	}

	let provider = match factory() {
		Ok(provider) => provider,
		Err(err) => {
			tracing::warn!(generation, %err, "failed to construct candidate source");
			let _ = updates.send(SessionUpdate {
				generation,
				event: SessionEvent::Failed {
					kind: FailureKind::Provider,
					message: err.to_string(),
					total_scanned: 0,
				},
			});
			return;
		}
	};

	let params = SessionParams {
		generation,
		query: raw,
		case_mode: options.case_mode,
		max_results: options.max_results,
		emit_interval: options.emit_interval,
	};
	let pool = Arc::clone(pool);
	let latest = Arc::clone(latest);
	let updates = updates.clone();
	// Detached on purpose: a superseded session winds down on its own
	// while the next one starts.
	thread::spawn(move || {
		run_session(&params, provider, &pool, &latest, &updates);
	});
}
