/// One line/item eligible for matching against a query.
///
/// `id` is the discovery sequence number assigned by the producing source
/// provider; it doubles as the deterministic tie-break when scores are
/// equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
	/// Discovery-order handle, unique within one session.
	pub id: u64,
	/// Text shown to the user and matched against the query.
	pub text: String,
}

impl Candidate {
	/// Create a candidate from its discovery index and display text.
	#[must_use]
	pub fn new(id: u64, text: impl Into<String>) -> Self {
		Self {
			id,
			text: text.into(),
		}
	}
}

/// A candidate together with its match score and highlight positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredCandidate {
	/// The matched candidate.
	pub candidate: Candidate,
	/// Relevance score from the matcher; higher ranks earlier.
	pub score: i64,
	/// Character positions of the matched query characters. Empty for the
	/// empty query, which matches everything.
	pub indices: Vec<usize>,
}
