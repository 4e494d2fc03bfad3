//! Candidate sources.
//!
//! A provider is a lazy producer of [`Candidate`]s with a uniform pull
//! contract. Every session constructs a fresh provider instance, so partial
//! consumption by a superseded query can never contaminate a newer one.
//! Exhaustion is normal termination (`Fetch::Exhausted`), never an error.
//!
//! Pulls are bounded: [`SourceProvider::poll_next`] waits at most `wait`
//! before returning [`Fetch::Pending`], which gives the session coordinator
//! a guaranteed opportunity to observe cancellation even when an external
//! producer hangs.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::thread;
use std::time::Duration;

use crate::candidate::Candidate;
use crate::error::ProviderError;

/// Result of one bounded pull from a provider.
#[derive(Debug)]
pub enum Fetch {
	/// The next candidate in discovery order.
	Item(Candidate),
	/// Nothing available within the wait budget; the source is still live.
	Pending,
	/// The source produced everything it ever will.
	Exhausted,
}

/// Uniform pull contract over candidate sources.
pub trait SourceProvider: Send {
	/// Pull the next candidate, waiting at most `wait` for a slow source.
	fn poll_next(&mut self, wait: Duration) -> Result<Fetch, ProviderError>;

	/// Release external resources promptly (subprocesses, cursors).
	/// Called on cancellation; also invoked by drop where applicable.
	fn shutdown(&mut self) {}
}

/// Static in-memory candidate sequence.
///
/// The backing list is shared behind an `Arc` so repeated sessions re-read
/// it without copying.
pub struct MemoryProvider {
	entries: Arc<Vec<String>>,
	cursor: usize,
}

impl MemoryProvider {
	/// Create a provider over a shared candidate list.
	#[must_use]
	pub fn new(entries: Arc<Vec<String>>) -> Self {
		Self { entries, cursor: 0 }
	}
}

impl SourceProvider for MemoryProvider {
	fn poll_next(&mut self, _wait: Duration) -> Result<Fetch, ProviderError> {
		match self.entries.get(self.cursor) {
			Some(text) => {
				let candidate = Candidate::new(self.cursor as u64, text.clone());
				self.cursor += 1;
				Ok(Fetch::Item(candidate))
			}
			None => Ok(Fetch::Exhausted),
		}
	}
}

type PageFetcher = Box<dyn FnMut(usize) -> Result<Option<Vec<String>>, ProviderError> + Send>;

/// Paginated lazy list: fetches the next chunk on demand.
pub struct PagedProvider {
	fetch: PageFetcher,
	page: usize,
	buffered: VecDeque<String>,
	next_id: u64,
	exhausted: bool,
}

impl PagedProvider {
	/// Create a provider that pulls pages from `fetch` until it returns
	/// `Ok(None)`.
	#[must_use]
	pub fn new(fetch: PageFetcher) -> Self {
		Self {
			fetch,
			page: 0,
			buffered: VecDeque::new(),
			next_id: 0,
			exhausted: false,
		}
	}

	fn emit(&mut self, text: String) -> Fetch {
		let candidate = Candidate::new(self.next_id, text);
		self.next_id += 1;
		Fetch::Item(candidate)
	}
}

impl SourceProvider for PagedProvider {
	fn poll_next(&mut self, _wait: Duration) -> Result<Fetch, ProviderError> {
		if let Some(text) = self.buffered.pop_front() {
			return Ok(self.emit(text));
		}
		if self.exhausted {
			return Ok(Fetch::Exhausted);
		}
		loop {
			match (self.fetch)(self.page)? {
				Some(chunk) => {
					self.page += 1;
					if chunk.is_empty() {
						// An empty page is not exhaustion; try the next one.
						continue;
					}
					self.buffered.extend(chunk);
					let text = self
						.buffered
						.pop_front()
						.unwrap_or_default();
					return Ok(self.emit(text));
				}
				None => {
					self.exhausted = true;
					return Ok(Fetch::Exhausted);
				}
			}
		}
	}
}

enum LineEvent {
	Line(String),
	Error(std::io::Error),
}

/// External streaming process whose stdout lines are the candidate stream.
///
/// A dedicated reader thread drains the child's stdout into a bounded
/// channel, so `poll_next` can apply a per-read timeout without blocking on
/// the pipe. [`CommandProvider::shutdown`] kills the child immediately;
/// repeated cancellations therefore cannot leak subprocesses.
pub struct CommandProvider {
	child: Option<Child>,
	lines: Option<Receiver<LineEvent>>,
	next_id: u64,
	command: String,
}

/// Backpressure bound between the reader thread and the session.
const LINE_CHANNEL_BOUND: usize = 1024;

impl CommandProvider {
	/// Spawn `program` with `args` and stream its stdout lines.
	pub fn spawn(program: &str, args: &[String]) -> Result<Self, ProviderError> {
		let command_line = if args.is_empty() {
			program.to_string()
		} else {
			format!("{program} {}", args.join(" "))
		};
		let mut child = Command::new(program)
			.args(args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::null())
			.spawn()
			.map_err(|source| ProviderError::Spawn {
				command: command_line.clone(),
				source,
			})?;

		// Taking stdout before moving the child keeps kill() available on
		// the main handle.
		let stdout = child.stdout.take().ok_or_else(|| {
			ProviderError::Io(std::io::Error::other("child process has no stdout pipe"))
		})?;

		let (tx, rx): (SyncSender<LineEvent>, Receiver<LineEvent>) =
			sync_channel(LINE_CHANNEL_BOUND);
		thread::Builder::new()
			.name("sift-source-reader".into())
			.spawn(move || {
				let reader = BufReader::new(stdout);
				for line in reader.lines() {
					let event = match line {
						Ok(line) => LineEvent::Line(line),
						Err(err) => LineEvent::Error(err),
					};
					// A closed receiver means the session was cancelled or
					// dropped; stop draining.
					if tx.send(event).is_err() {
						break;
					}
				}
			})
			.map_err(ProviderError::Io)?;

		tracing::debug!(command = %command_line, "spawned candidate source");

		Ok(Self {
			child: Some(child),
			lines: Some(rx),
			next_id: 0,
			command: command_line,
		})
	}
}

impl SourceProvider for CommandProvider {
	fn poll_next(&mut self, wait: Duration) -> Result<Fetch, ProviderError> {
		let Some(lines) = self.lines.as_ref() else {
			return Ok(Fetch::Exhausted);
		};
		match lines.recv_timeout(wait) {
			Ok(LineEvent::Line(text)) => {
				let candidate = Candidate::new(self.next_id, text);
				self.next_id += 1;
				Ok(Fetch::Item(candidate))
			}
			Ok(LineEvent::Error(err)) => {
				self.shutdown();
				Err(ProviderError::Io(err))
			}
			Err(RecvTimeoutError::Timeout) => Ok(Fetch::Pending),
			Err(RecvTimeoutError::Disconnected) => {
				// Reader thread finished: the pipe closed, so the stream is
				// complete. Reap the child to avoid a zombie.
				self.reap();
				Ok(Fetch::Exhausted)
			}
		}
	}

	fn shutdown(&mut self) {
		self.lines = None;
		if let Some(mut child) = self.child.take() {
			if let Err(err) = child.kill() {
				tracing::debug!(command = %self.command, %err, "failed to kill candidate source");
			}
			let _ = child.wait();
			tracing::debug!(command = %self.command, "terminated candidate source");
		}
	}
}

impl CommandProvider {
	fn reap(&mut self) {
		self.lines = None;
		if let Some(mut child) = self.child.take() {
			let _ = child.wait();
		}
	}
}

impl Drop for CommandProvider {
	fn drop(&mut self) {
		self.shutdown();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Instant;

	const WAIT: Duration = Duration::from_millis(200);

	fn drain(provider: &mut dyn SourceProvider) -> Vec<Candidate> {
		let mut items = Vec::new();
		loop {
			match provider.poll_next(WAIT).unwrap() {
				Fetch::Item(candidate) => items.push(candidate),
				Fetch::Pending => continue,
				Fetch::Exhausted => return items,
			}
		}
	}

	#[test]
	fn memory_provider_yields_in_order_with_sequential_ids() {
		let entries = Arc::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
		let mut provider = MemoryProvider::new(entries);
		let items = drain(&mut provider);
		assert_eq!(items.len(), 3);
		assert_eq!(items[0].id, 0);
		assert_eq!(items[2].id, 2);
		assert_eq!(items[1].text, "b");
		// Exhaustion is stable.
		assert!(matches!(provider.poll_next(WAIT).unwrap(), Fetch::Exhausted));
	}

	#[test]
	fn fresh_memory_providers_restart_from_the_top() {
		let entries = Arc::new(vec!["x".to_string(), "y".to_string()]);
		let mut first = MemoryProvider::new(Arc::clone(&entries));
		let _ = drain(&mut first);
		let mut second = MemoryProvider::new(entries);
		let items = drain(&mut second);
		assert_eq!(items[0].text, "x");
	}

	#[test]
	fn paged_provider_flattens_pages() {
		let pages = vec![
			vec!["p0-a".to_string(), "p0-b".to_string()],
			Vec::new(),
			vec!["p2-a".to_string()],
		];
		let mut provider = PagedProvider::new(Box::new(move |page| {
			Ok(pages.get(page).cloned())
		}));
		let items = drain(&mut provider);
		let texts: Vec<&str> = items.iter().map(|c| c.text.as_str()).collect();
		assert_eq!(texts, vec!["p0-a", "p0-b", "p2-a"]);
		assert_eq!(items[2].id, 2);
	}

	#[test]
	fn paged_provider_surfaces_fetch_errors() {
		let mut provider = PagedProvider::new(Box::new(|page| {
			if page == 0 {
				Ok(Some(vec!["only".to_string()]))
			} else {
				Err(ProviderError::Io(std::io::Error::other("backend gone")))
			}
		}));
		assert!(matches!(provider.poll_next(WAIT), Ok(Fetch::Item(_))));
		assert!(provider.poll_next(WAIT).is_err());
	}

	#[test]
	fn command_provider_streams_stdout_lines() {
		let mut provider = CommandProvider::spawn(
			"sh",
			&["-c".to_string(), "printf 'one\\ntwo\\nthree\\n'".to_string()],
		)
		.unwrap();
		let items = drain(&mut provider);
		let texts: Vec<&str> = items.iter().map(|c| c.text.as_str()).collect();
		assert_eq!(texts, vec!["one", "two", "three"]);
	}

	#[test]
	fn command_provider_spawn_failure_is_an_error() {
		let result = CommandProvider::spawn("sift-no-such-binary", &[]);
		assert!(matches!(result, Err(ProviderError::Spawn { .. })));
	}

	#[test]
	fn shutdown_kills_a_hung_producer_quickly() {
		let mut provider = CommandProvider::spawn(
			"sh",
			&["-c".to_string(), "echo ready; sleep 30".to_string()],
		)
		.unwrap();
		// Wait for the first line so the child is definitely running.
		loop {
			match provider.poll_next(WAIT).unwrap() {
				Fetch::Item(item) => {
					assert_eq!(item.text, "ready");
					break;
				}
				Fetch::Pending => continue,
				Fetch::Exhausted => panic!("producer exited early"),
			}
		}

		let start = Instant::now();
		provider.shutdown();
		assert!(
			start.elapsed() < Duration::from_secs(2),
			"kill should not wait out the sleep"
		);
		assert!(matches!(provider.poll_next(WAIT).unwrap(), Fetch::Exhausted));
	}
}
