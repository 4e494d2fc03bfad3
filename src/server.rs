//! Transport endpoint: stdin requests in, stdout notifications out.
//!
//! The reader loop parses one JSON request per line and hands queries to
//! the [`SessionManager`]; malformed input gets a synchronous error reply
//! and never touches session state. A dedicated writer thread owns the
//! output stream and applies the [`StaleFilter`] watermark at flush time,
//! so no notification for a superseded generation is ever written after a
//! newer one.

use std::io::{BufRead, Write};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;

use anyhow::{Context, Result};

use sift_engine::{SessionManager, SessionUpdate, StaleFilter};

use crate::messages::{Ack, AckResult, ErrorBody, ErrorReply, Request, SubmitQueryParams, notification_for};

enum Outgoing {
	/// Pre-serialised reply to a request; never suppressed.
	Reply(String),
	/// Engine progress, subject to stale suppression.
	Update(SessionUpdate),
}

/// What the reader decided to do with one input line.
enum Handled {
	Continue,
	Shutdown,
}

/// Serve the protocol until stdin closes or a `shutdown` request arrives.
pub fn run(
	input: impl BufRead,
	output: impl Write + Send + 'static,
	mut manager: SessionManager,
	updates: Receiver<SessionUpdate>,
) -> Result<()> {
	let (out_tx, out_rx) = channel::<Outgoing>();

	// Engine updates are forwarded into the single writer channel so
	// replies and notifications share one ordered stream.
	let forward_tx = out_tx.clone();
	let forwarder = thread::spawn(move || {
		while let Ok(update) = updates.recv() {
			if forward_tx.send(Outgoing::Update(update)).is_err() {
				break;
			}
		}
	});

	let writer = thread::spawn(move || write_loop(output, &out_rx));

	for line in input.lines() {
		let line = line.context("failed to read request from client")?;
		if line.trim().is_empty() {
			continue;
		}
		match handle_line(&line, &manager, &out_tx) {
			Handled::Continue => {}
			Handled::Shutdown => break,
		}
	}

	tracing::info!("client disconnected; shutting down");
	// Cancels the running session and joins the manager thread; detached
	// sessions observe the generation bump and wind down on their own.
	manager.shutdown();
	drop(manager);
	drop(out_tx);
	let _ = forwarder.join();
	let _ = writer.join();
	Ok(())
}

fn handle_line(line: &str, manager: &SessionManager, out: &Sender<Outgoing>) -> Handled {
	let reply = match serde_json::from_str::<Request>(line) {
		Ok(request) => match request.method.as_str() {
			"submit_query" => match serde_json::from_value::<SubmitQueryParams>(request.params) {
				Ok(params) => {
					let generation = manager.submit(params.raw_text);
					request.id.map(|id| {
						ack(Ack {
							id,
							result: AckResult { generation },
						})
					})
				}
				Err(err) => Some(protocol_error(
					request.id,
					format!("invalid submit_query params: {err}"),
				)),
			},
			"shutdown" => return Handled::Shutdown,
			other => Some(protocol_error(
				request.id,
				format!("unknown method `{other}`"),
			)),
		},
		Err(err) => {
			tracing::warn!(%err, "malformed request");
			Some(protocol_error(None, format!("malformed request: {err}")))
		}
	};

	if let Some(reply) = reply {
		let _ = out.send(Outgoing::Reply(reply));
	}
	Handled::Continue
}

fn ack(ack: Ack) -> String {
	serde_json::to_string(&ack).unwrap_or_default()
}

fn protocol_error(id: Option<u64>, message: String) -> String {
	let reply = ErrorReply {
		id,
		error: ErrorBody {
			kind: "protocol",
			message,
		},
	};
	serde_json::to_string(&reply).unwrap_or_default()
}

fn write_loop(mut output: impl Write, messages: &Receiver<Outgoing>) {
	let mut filter = StaleFilter::new();
	while let Ok(message) = messages.recv() {
		let line = match message {
			Outgoing::Reply(line) => line,
			Outgoing::Update(update) => {
				if !filter.admit(&update) {
					continue;
				}
				match serde_json::to_string(&notification_for(update)) {
					Ok(line) => line,
					Err(err) => {
						tracing::warn!(%err, "failed to serialise notification");
						continue;
					}
				}
			}
		};
		if writeln!(output, "{line}").and_then(|()| output.flush()).is_err() {
			// Output gone; nothing left to serve.
			break;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::sync::mpsc;
	use std::time::Duration;

	use sift_engine::{EngineOptions, MemoryProvider, ProviderFactory, SourceProvider};

	fn test_manager(entries: &[&str]) -> (SessionManager, Receiver<SessionUpdate>) {
		let entries = Arc::new(
			entries
				.iter()
				.map(|entry| entry.to_string())
				.collect::<Vec<_>>(),
		);
		let factory: ProviderFactory = Arc::new(move || {
			Ok(Box::new(MemoryProvider::new(Arc::clone(&entries))) as Box<dyn SourceProvider>)
		});
		let options = EngineOptions {
			max_results: 10,
			debounce: Duration::ZERO,
			worker_count: 2,
			emit_interval: Duration::ZERO,
			..EngineOptions::default()
		};
		SessionManager::spawn(options, factory)
	}

	fn parse(line: &str) -> serde_json::Value {
		serde_json::from_str(line).unwrap()
	}

	#[test]
	fn submit_query_is_acknowledged_with_its_generation() {
		let (manager, _updates) = test_manager(&["a"]);
		let (tx, rx) = mpsc::channel();
		let line = r#"{"id":1,"method":"submit_query","params":{"raw_text":"a"}}"#;
		assert!(matches!(handle_line(line, &manager, &tx), Handled::Continue));

		let Ok(Outgoing::Reply(reply)) = rx.try_recv() else {
			panic!("expected an ack");
		};
		let json = parse(&reply);
		assert_eq!(json["id"], 1);
		assert_eq!(json["result"]["generation"], 1);
	}

	#[test]
	fn malformed_request_gets_protocol_error_and_no_session() {
		let (manager, _updates) = test_manager(&["a"]);
		let (tx, rx) = mpsc::channel();

		assert!(matches!(
			handle_line("{not json", &manager, &tx),
			Handled::Continue
		));
		let Ok(Outgoing::Reply(reply)) = rx.try_recv() else {
			panic!("expected an error reply");
		};
		let json = parse(&reply);
		assert_eq!(json["error"]["kind"], "protocol");
		assert_eq!(
			manager.current_generation(),
			0,
			"malformed input must not start a session"
		);
	}

	#[test]
	fn unknown_method_and_bad_params_are_rejected() {
		let (manager, _updates) = test_manager(&["a"]);
		let (tx, rx) = mpsc::channel();

		handle_line(r#"{"id":3,"method":"resize"}"#, &manager, &tx);
		let Ok(Outgoing::Reply(reply)) = rx.try_recv() else {
			panic!("expected an error reply");
		};
		assert!(parse(&reply)["error"]["message"]
			.as_str()
			.unwrap()
			.contains("unknown method"));

		handle_line(
			r#"{"id":4,"method":"submit_query","params":{"text":"oops"}}"#,
			&manager,
			&tx,
		);
		let Ok(Outgoing::Reply(reply)) = rx.try_recv() else {
			panic!("expected an error reply");
		};
		assert_eq!(parse(&reply)["id"], 4);
		assert_eq!(manager.current_generation(), 0);
	}

	#[test]
	fn shutdown_request_stops_the_reader() {
		let (manager, _updates) = test_manager(&["a"]);
		let (tx, _rx) = mpsc::channel();
		assert!(matches!(
			handle_line(r#"{"method":"shutdown"}"#, &manager, &tx),
			Handled::Shutdown
		));
	}

	#[test]
	fn writer_suppresses_stale_generations_at_flush() {
		use sift_engine::{Candidate, ScoredCandidate, SessionEvent};

		let snapshot = |generation: u64, text: &str| {
			Outgoing::Update(SessionUpdate {
				generation,
				event: SessionEvent::Snapshot {
					matches: vec![ScoredCandidate {
						candidate: Candidate::new(0, text),
						score: 1,
						indices: vec![0],
					}],
					total_scanned: 1,
					total_matched: 1,
					is_final: false,
				},
			})
		};

		let (tx, rx) = mpsc::channel();
		tx.send(snapshot(1, "old")).unwrap();
		tx.send(snapshot(2, "new")).unwrap();
		tx.send(snapshot(1, "stale")).unwrap();
		tx.send(Outgoing::Reply("{\"id\":1}".to_string())).unwrap();
		drop(tx);

		let mut buffer = Vec::new();
		write_loop(&mut buffer, &rx);

		let written = String::from_utf8(buffer).unwrap();
		let generations: Vec<u64> = written
			.lines()
			.filter_map(|line| parse(line)["params"]["generation"].as_u64())
			.collect();
		assert_eq!(generations, vec![1, 2], "stale generation must be dropped");
		assert!(written.contains("\"id\":1"), "replies are never suppressed");
	}

	#[test]
	fn full_query_round_trip_reaches_a_final_snapshot() {
		let (manager, updates) = test_manager(&["main.rs", "maple_core/src/lib.rs", "matcher/src/lib.rs"]);
		let (tx, rx) = mpsc::channel();
		handle_line(
			r#"{"id":1,"method":"submit_query","params":{"raw_text":"mc"}}"#,
			&manager,
			&tx,
		);

		let final_params = loop {
			let update = updates
				.recv_timeout(Duration::from_secs(5))
				.expect("expected a final snapshot");
			let json = serde_json::to_value(notification_for(update)).unwrap();
			if json["params"]["is_final"] == true {
				break json["params"].clone();
			}
		};
		assert_eq!(final_params["generation"], 1);
		assert_eq!(final_params["total_scanned_count"], 3);
		assert_eq!(final_params["total_matched_count"], 2);
		assert_eq!(
			final_params["matches"][0]["display_text"],
			"matcher/src/lib.rs"
		);
		drop(rx);
	}
}
