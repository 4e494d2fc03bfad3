//! Wire message types for the editor-facing protocol.
//!
//! Line-delimited JSON: requests come in on stdin, acknowledgements and
//! generation-tagged notifications go out on stdout. Every notification
//! carries its generation so the client can drop stale results that race
//! with its own newer submission, on top of server-side cancellation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sift_engine::{FailureKind, SessionEvent, SessionUpdate};

/// Inbound request envelope.
#[derive(Debug, Deserialize)]
pub struct Request {
	/// Client-chosen correlation id; requests without one get no reply.
	pub id: Option<u64>,
	/// Method name, e.g. `submit_query`.
	pub method: String,
	/// Method parameters.
	#[serde(default)]
	pub params: Value,
}

/// Parameters of `submit_query`.
#[derive(Debug, Deserialize)]
pub struct SubmitQueryParams {
	/// The query text as typed, untrimmed.
	pub raw_text: String,
}

/// Successful acknowledgement of a request.
#[derive(Debug, Serialize)]
pub struct Ack {
	/// Mirrors the request id.
	pub id: u64,
	/// Request outcome.
	pub result: AckResult,
}

/// Payload of an [`Ack`].
#[derive(Debug, Serialize)]
pub struct AckResult {
	/// Generation assigned to the submitted query.
	pub generation: u64,
}

/// Error reply for a malformed or unknown request.
#[derive(Debug, Serialize)]
pub struct ErrorReply {
	/// Mirrors the request id when one could be parsed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<u64>,
	/// Error details.
	pub error: ErrorBody,
}

/// Error classification and description.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
	/// Stable machine-readable kind.
	pub kind: &'static str,
	/// Human-readable description.
	pub message: String,
}

/// Outbound notification envelope.
#[derive(Debug, Serialize)]
pub struct Notification {
	/// Notification method name.
	pub method: &'static str,
	/// Method parameters.
	pub params: NotificationParams,
}

/// Parameters of the two notification kinds.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum NotificationParams {
	/// Progressive or final ranked results.
	Snapshot(SnapshotParams),
	/// The search for one generation failed.
	Failure(FailureParams),
}

/// Body of a `snapshot` notification.
#[derive(Debug, Serialize)]
pub struct SnapshotParams {
	/// Generation these results belong to.
	pub generation: u64,
	/// Ranked matches, best first.
	pub matches: Vec<MatchEntry>,
	/// Candidates pulled from the source so far.
	pub total_scanned_count: u64,
	/// Candidates that matched the query so far.
	pub total_matched_count: u64,
	/// Whether this is the terminal snapshot for the generation.
	pub is_final: bool,
}

/// One ranked match on the wire.
#[derive(Debug, Serialize)]
pub struct MatchEntry {
	/// Text to render.
	pub display_text: String,
	/// Character positions to highlight.
	pub match_indices: Vec<usize>,
	/// Relevance score, for client-side diagnostics.
	pub score: i64,
}

/// Body of a `search_failed` notification.
#[derive(Debug, Serialize)]
pub struct FailureParams {
	/// Generation whose search failed.
	pub generation: u64,
	/// Stable machine-readable kind.
	pub error_kind: &'static str,
	/// Human-readable reason.
	pub message: String,
	/// Partial progress before the failure, so the client can still show
	/// "N scanned, search failed".
	pub total_scanned_count: u64,
}

/// Convert an engine update into its wire notification.
#[must_use]
pub fn notification_for(update: SessionUpdate) -> Notification {
	match update.event {
		SessionEvent::Snapshot {
			matches,
			total_scanned,
			total_matched,
			is_final,
		} => Notification {
			method: "snapshot",
			params: NotificationParams::Snapshot(SnapshotParams {
				generation: update.generation,
				matches: matches
					.into_iter()
					.map(|scored| MatchEntry {
						display_text: scored.candidate.text,
						match_indices: scored.indices,
						score: scored.score,
					})
					.collect(),
				total_scanned_count: total_scanned,
				total_matched_count: total_matched,
				is_final,
			}),
		},
		SessionEvent::Failed {
			kind,
			message,
			total_scanned,
		} => Notification {
			method: "search_failed",
			params: NotificationParams::Failure(FailureParams {
				generation: update.generation,
				error_kind: match kind {
					FailureKind::Provider => "provider_io",
					FailureKind::Internal => "internal",
				},
				message,
				total_scanned_count: total_scanned,
			}),
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sift_engine::{Candidate, ScoredCandidate};

	#[test]
	fn parses_a_submit_query_request() {
		let line = r#"{"id":7,"method":"submit_query","params":{"raw_text":"mc"}}"#;
		let request: Request = serde_json::from_str(line).unwrap();
		assert_eq!(request.id, Some(7));
		assert_eq!(request.method, "submit_query");
		let params: SubmitQueryParams = serde_json::from_value(request.params).unwrap();
		assert_eq!(params.raw_text, "mc");
	}

	#[test]
	fn request_id_and_params_are_optional() {
		let line = r#"{"method":"submit_query"}"#;
		let request: Request = serde_json::from_str(line).unwrap();
		assert_eq!(request.id, None);
		assert!(request.params.is_null());
	}

	#[test]
	fn rejects_non_object_input() {
		assert!(serde_json::from_str::<Request>("[1,2,3]").is_err());
		assert!(serde_json::from_str::<Request>("not json").is_err());
	}

	#[test]
	fn snapshot_notification_shape() {
		let update = SessionUpdate {
			generation: 4,
			event: SessionEvent::Snapshot {
				matches: vec![ScoredCandidate {
					candidate: Candidate::new(0, "matcher/src/lib.rs"),
					score: 25,
					indices: vec![0, 3],
				}],
				total_scanned: 3,
				total_matched: 2,
				is_final: true,
			},
		};
		let json = serde_json::to_value(notification_for(update)).unwrap();
		assert_eq!(json["method"], "snapshot");
		assert_eq!(json["params"]["generation"], 4);
		assert_eq!(json["params"]["is_final"], true);
		assert_eq!(json["params"]["total_scanned_count"], 3);
		assert_eq!(json["params"]["total_matched_count"], 2);
		assert_eq!(json["params"]["matches"][0]["display_text"], "matcher/src/lib.rs");
		assert_eq!(json["params"]["matches"][0]["match_indices"][1], 3);
	}

	#[test]
	fn failure_notification_reports_partial_progress() {
		let update = SessionUpdate {
			generation: 9,
			event: SessionEvent::Failed {
				kind: FailureKind::Provider,
				message: "pipe broke".into(),
				total_scanned: 17,
			},
		};
		let json = serde_json::to_value(notification_for(update)).unwrap();
		assert_eq!(json["method"], "search_failed");
		assert_eq!(json["params"]["generation"], 9);
		assert_eq!(json["params"]["error_kind"], "provider_io");
		assert_eq!(json["params"]["total_scanned_count"], 17);
	}

	#[test]
	fn internal_failures_are_not_reported_as_provider_errors() {
		let update = SessionUpdate {
			generation: 2,
			event: SessionEvent::Failed {
				kind: FailureKind::Internal,
				message: "scoring worker panicked".into(),
				total_scanned: 40,
			},
		};
		let json = serde_json::to_value(notification_for(update)).unwrap();
		assert_eq!(json["method"], "search_failed");
		assert_eq!(json["params"]["error_kind"], "internal");
	}

	#[test]
	fn error_reply_omits_missing_id() {
		let reply = ErrorReply {
			id: None,
			error: ErrorBody {
				kind: "protocol",
				message: "malformed request".into(),
			},
		};
		let json = serde_json::to_value(&reply).unwrap();
		assert!(json.get("id").is_none());
		assert_eq!(json["error"]["kind"], "protocol");
	}
}
