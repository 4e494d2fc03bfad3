//! One query's filtering lifecycle.
//!
//! A session runs on its own coordinator thread: it pulls candidates from
//! its provider, dispatches scoring chunks to the shared worker pool,
//! merges scored results into a session-private [`RankedSet`] and emits
//! throttled snapshot updates. It terminates as `Completed`, `Cancelled`
//! or `Failed`; there is no re-entry.
//!
//! Supersession is observed cooperatively: the session captures its
//! generation once at start and compares the shared counter against it at
//! every candidate pull and before every dispatch. Work already handed to
//! the pool may finish, but a superseded session never emits its results.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::time::{Duration, Instant};

use sift_matcher::{CaseMode, match_candidate};

use crate::candidate::{Candidate, ScoredCandidate};
use crate::pool::WorkerPool;
use crate::provider::{Fetch, SourceProvider};
use crate::ranked::RankedSet;

/// Maximum wait per provider read; bounds how long cancellation of a hung
/// producer can take.
const READ_WAIT: Duration = Duration::from_millis(50);

/// Candidates scored per worker job.
const SCORE_CHUNK: usize = 128;

/// Maximum time a partially filled chunk may sit before it is dispatched
/// anyway, so slow sources still surface results promptly.
const CHUNK_WAIT: Duration = Duration::from_millis(50);

/// Lifecycle state of a filter session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	/// Actively pulling and scoring candidates.
	Running,
	/// Source exhausted and every result merged; final snapshot emitted.
	Completed,
	/// Superseded by a newer generation; nothing further is emitted.
	Cancelled,
	/// Provider or scoring failure; a failure notification was emitted.
	Failed,
}

/// Progress event for one generation, delivered to the transport layer.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
	/// Generation this update belongs to. Stale generations are suppressed
	/// again at the transport edge.
	pub generation: u64,
	/// What happened.
	pub event: SessionEvent,
}

/// Payload of a [`SessionUpdate`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
	/// A refreshed view of the top-K matches.
	Snapshot {
		/// Ranked matches, best first.
		matches: Vec<ScoredCandidate>,
		/// Candidates pulled from the source so far.
		total_scanned: u64,
		/// Candidates that matched the query so far (retained or not).
		total_matched: u64,
		/// Set once, on the last snapshot of a completed session.
		is_final: bool,
	},
	/// The session failed; partial progress is still reported.
	Failed {
		/// Where the failure originated.
		kind: FailureKind,
		/// Human-readable reason.
		message: String,
		/// Candidates pulled before the failure.
		total_scanned: u64,
	},
}

/// Origin of a session failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
	/// The candidate source could not be constructed or read.
	Provider,
	/// The scoring machinery itself broke.
	Internal,
}

/// Immutable inputs for one session run.
pub struct SessionParams {
	/// Generation captured at session start.
	pub generation: u64,
	/// Raw query text.
	pub query: String,
	/// Case folding mode for the matcher.
	pub case_mode: CaseMode,
	/// Result cap K.
	pub max_results: usize,
	/// Minimum interval between snapshot emissions.
	pub emit_interval: Duration,
}

enum JobOutcome {
	Scored(Vec<ScoredCandidate>),
	Panicked,
}

enum LoopExit {
	Exhausted,
	Superseded,
	ClientGone,
	ProviderFailed(String),
}

struct Coordinator<'a> {
	params: &'a SessionParams,
	query: Arc<str>,
	latest: &'a AtomicU64,
	pool: &'a WorkerPool,
	updates: &'a Sender<SessionUpdate>,
	ranked: RankedSet,
	result_tx: Sender<JobOutcome>,
	result_rx: Receiver<JobOutcome>,
	outstanding: usize,
	scanned: u64,
	dirty: bool,
	last_emit: Option<Instant>,
	scoring_panicked: bool,
}

/// Run one session to a terminal state on the current thread.
///
/// `latest` is the shared generation counter; any value different from
/// `params.generation` means this session has been superseded.
pub fn run_session(
	params: &SessionParams,
	mut provider: Box<dyn SourceProvider>,
	pool: &WorkerPool,
	latest: &AtomicU64,
	updates: &Sender<SessionUpdate>,
) -> SessionState {
	let (result_tx, result_rx) = channel();
	let mut coordinator = Coordinator {
		params,
		query: Arc::from(params.query.as_str()),
		latest,
		pool,
		updates,
		ranked: RankedSet::new(params.max_results),
		result_tx,
		result_rx,
		outstanding: 0,
		scanned: 0,
		dirty: false,
		last_emit: None,
		scoring_panicked: false,
	};

	tracing::debug!(
		generation = params.generation,
		query = %params.query,
		"session started"
	);
	let state = coordinator.run(provider.as_mut());
	provider.shutdown();
	tracing::debug!(generation = params.generation, ?state, "session finished");
	state
}

impl Coordinator<'_> {
	fn superseded(&self) -> bool {
		self.latest.load(Ordering::Acquire) != self.params.generation
	}

	fn run(&mut self, provider: &mut dyn SourceProvider) -> SessionState {
		let exit = self.pump(provider);
		match exit {
			LoopExit::Exhausted => self.complete(),
			LoopExit::Superseded | LoopExit::ClientGone => SessionState::Cancelled,
			LoopExit::ProviderFailed(message) => self.fail(FailureKind::Provider, message),
		}
	}

	/// Pull/score/merge until the source is exhausted or the session stops
	/// mattering.
	fn pump(&mut self, provider: &mut dyn SourceProvider) -> LoopExit {
		let mut batch: Vec<Candidate> = Vec::with_capacity(SCORE_CHUNK);
		let mut batch_since: Option<Instant> = None;
		loop {
			if self.superseded() {
				return LoopExit::Superseded;
			}

			match provider.poll_next(READ_WAIT) {
				Ok(Fetch::Item(candidate)) => {
					self.scanned += 1;
					if batch.is_empty() {
						batch_since = Some(Instant::now());
					}
					batch.push(candidate);
				}
				Ok(Fetch::Pending) => {}
				Ok(Fetch::Exhausted) => {
					if !batch.is_empty()
						&& let Some(exit) = self.dispatch(&mut batch)
					{
						return exit;
					}
					return LoopExit::Exhausted;
				}
				Err(err) => return LoopExit::ProviderFailed(err.to_string()),
			}

			// Full chunks go out immediately; a partial chunk goes out once
			// it has aged past CHUNK_WAIT, which also covers the Pending
			// case since the poll itself waits that long.
			let due = batch.len() >= SCORE_CHUNK
				|| batch_since.is_some_and(|since| since.elapsed() >= CHUNK_WAIT);
			if !batch.is_empty() && due {
				batch_since = None;
				if let Some(exit) = self.dispatch(&mut batch) {
					return exit;
				}
			}

			self.drain_ready();
			if !self.flush_partial() {
				return LoopExit::ClientGone;
			}
		}
	}

	/// Hand a chunk to the worker pool. Checks supersession first; already
	/// dispatched work is merely discarded later, new work is not started.
	fn dispatch(&mut self, batch: &mut Vec<Candidate>) -> Option<LoopExit> {
		if self.superseded() {
			return Some(LoopExit::Superseded);
		}
		let chunk = std::mem::replace(batch, Vec::with_capacity(SCORE_CHUNK));
		let query = Arc::clone(&self.query);
		let case_mode = self.params.case_mode;
		let tx = self.result_tx.clone();
		let submitted = self.pool.submit(move || {
			let scored = catch_unwind(AssertUnwindSafe(|| score_chunk(&query, case_mode, chunk)));
			let outcome = match scored {
				Ok(scored) => JobOutcome::Scored(scored),
				Err(_) => JobOutcome::Panicked,
			};
			let _ = tx.send(outcome);
		});
		if !submitted {
			// Pool shut down under us; the process is exiting.
			return Some(LoopExit::Superseded);
		}
		self.outstanding += 1;
		None
	}

	fn merge(&mut self, outcome: JobOutcome) {
		self.outstanding -= 1;
		match outcome {
			JobOutcome::Scored(scored) => {
				for item in scored {
					if self.ranked.offer(item) {
						self.dirty = true;
					}
				}
			}
			JobOutcome::Panicked => self.scoring_panicked = true,
		}
	}

	fn drain_ready(&mut self) {
		while let Ok(outcome) = self.result_rx.try_recv() {
			self.merge(outcome);
		}
	}

	/// Source exhausted: wait out the remaining jobs, then emit the final
	/// snapshot.
	fn complete(&mut self) -> SessionState {
		while self.outstanding > 0 {
			if self.superseded() {
				return SessionState::Cancelled;
			}
			match self.result_rx.recv_timeout(READ_WAIT) {
				Ok(outcome) => self.merge(outcome),
				Err(RecvTimeoutError::Timeout) => {}
				Err(RecvTimeoutError::Disconnected) => break,
			}
		}
		if self.scoring_panicked {
			return self.fail(FailureKind::Internal, "scoring worker panicked".to_string());
		}
		if self.superseded() {
			return SessionState::Cancelled;
		}
		self.emit(true);
		SessionState::Completed
	}

	/// Provider or scoring failure: discard outstanding work and report the
	/// reason with partial progress. The failure is confined to this
	/// generation.
	fn fail(&mut self, kind: FailureKind, message: String) -> SessionState {
		let deadline = Instant::now() + Duration::from_millis(500);
		while self.outstanding > 0 && Instant::now() < deadline {
			match self.result_rx.recv_timeout(READ_WAIT) {
				Ok(_) => self.outstanding -= 1,
				Err(RecvTimeoutError::Timeout) => {}
				Err(RecvTimeoutError::Disconnected) => break,
			}
		}
		if self.superseded() {
			return SessionState::Cancelled;
		}
		tracing::warn!(
			generation = self.params.generation,
			scanned = self.scanned,
			?kind,
			%message,
			"session failed"
		);
		let _ = self.updates.send(SessionUpdate {
			generation: self.params.generation,
			event: SessionEvent::Failed {
				kind,
				message,
				total_scanned: self.scanned,
			},
		});
		SessionState::Failed
	}

	/// Emit a snapshot when the visible set changed and the throttle allows
	/// it. Returns `false` when the update receiver hung up.
	fn flush_partial(&mut self) -> bool {
		if !self.dirty {
			return true;
		}
		let due = self
			.last_emit
			.is_none_or(|at| at.elapsed() >= self.params.emit_interval);
		if !due {
			return true;
		}
		// Emission is a yield point: a superseded session must not push
		// another snapshot. The transport edge suppresses the remaining
		// race between this check and the send.
		if self.superseded() {
			return true;
		}
		self.emit(false)
	}

	fn emit(&mut self, is_final: bool) -> bool {
		self.dirty = false;
		self.last_emit = Some(Instant::now());
		self.updates
			.send(SessionUpdate {
				generation: self.params.generation,
				event: SessionEvent::Snapshot {
					matches: self.ranked.snapshot(),
					total_scanned: self.scanned,
					total_matched: self.ranked.offered(),
					is_final,
				},
			})
			.is_ok()
	}
}

/// Monotonic generation watermark applied where updates are delivered.
///
/// Sessions already stop emitting once they observe supersession, but two
/// detached sessions can race between that check and the actual send. The
/// consumer side closes the gap: once an update for generation `g` has been
/// admitted, everything older is dropped, so delivered notifications never
/// go backwards.
#[derive(Debug, Default)]
pub struct StaleFilter {
	newest: u64,
}

impl StaleFilter {
	/// Create a filter that has seen nothing yet.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Whether `update` may be delivered; advances the watermark when so.
	pub fn admit(&mut self, update: &SessionUpdate) -> bool {
		if update.generation < self.newest {
			return false;
		}
		self.newest = update.generation;
		true
	}
}

fn score_chunk(query: &str, case_mode: CaseMode, chunk: Vec<Candidate>) -> Vec<ScoredCandidate> {
	chunk
		.into_iter()
		.filter_map(|candidate| {
			match_candidate(query, &candidate.text, case_mode).map(|outcome| ScoredCandidate {
				candidate,
				score: outcome.score,
				indices: outcome.indices,
			})
		})
		.collect()
}
