//! Process-wide scoring worker pool.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of scoring threads shared by all sessions.
///
/// Jobs run FIFO; that is acceptable because a superseded session's jobs
/// are cheap to discard. Submission is serialised behind a mutex, and jobs
/// from a winding-down session may execute interleaved with a new
/// session's.
pub struct WorkerPool {
	sender: Mutex<Option<Sender<Job>>>,
	workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
	/// Spawn `worker_count` scoring threads (at least one).
	#[must_use]
	pub fn new(worker_count: usize) -> Self {
		let worker_count = worker_count.max(1);
		let (tx, rx) = channel::<Job>();
		let rx = Arc::new(Mutex::new(rx));

		let workers = (0..worker_count)
			.map(|index| {
				let rx = Arc::clone(&rx);
				thread::Builder::new()
					.name(format!("sift-score-{index}"))
					.spawn(move || worker_loop(&rx))
					.unwrap_or_else(|err| panic!("failed to spawn scoring worker: {err}"))
			})
			.collect();

		Self {
			sender: Mutex::new(Some(tx)),
			workers,
		}
	}

	/// Pool sized to the machine's available parallelism.
	#[must_use]
	pub fn with_available_parallelism() -> Self {
		let count = thread::available_parallelism().map_or(1, |n| n.get());
		Self::new(count)
	}

	/// Number of worker threads.
	#[must_use]
	pub fn worker_count(&self) -> usize {
		self.workers.len()
	}

	/// Queue a job for execution. Returns `false` after shutdown.
	pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
		let guard = match self.sender.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		match guard.as_ref() {
			Some(tx) => tx.send(Box::new(job)).is_ok(),
			None => false,
		}
	}
}

fn worker_loop(rx: &Mutex<Receiver<Job>>) {
	loop {
		let job = {
			let guard = match rx.lock() {
				Ok(guard) => guard,
				Err(poisoned) => poisoned.into_inner(),
			};
			guard.recv()
		};
		match job {
			Ok(job) => {
				// A panicking job must not take the worker thread down with
				// it; the owning session reports the failure itself.
				if catch_unwind(AssertUnwindSafe(job)).is_err() {
					tracing::warn!("scoring job panicked");
				}
			}
			Err(_) => break,
		}
	}
}

impl Drop for WorkerPool {
	fn drop(&mut self) {
		if let Ok(mut guard) = self.sender.lock() {
			guard.take();
		}
		for worker in self.workers.drain(..) {
			let _ = worker.join();
		}
	}
}
