//! Subsequence fuzzy scoring with match position recovery.
//!
//! The scorer answers one question: does every character of the query appear
//! in the candidate text, in order? If so it returns a relevance score along
//! with the character positions of the chosen match, otherwise `None`. A
//! non-match is represented by absence rather than a low score, so callers
//! can exclude candidates outright.
//!
//! Ranking follows the usual finder heuristics: contiguous runs beat
//! scattered matches, matches at the start of the text or right after a
//! path/word separator beat mid-token matches, and long spans or a late
//! first match are penalised. The function is pure and deterministic, so it
//! can run on any number of worker threads without synchronisation.

use std::cmp::Ordering;

const NEG_INF: i64 = i64::MIN / 4;

// Scoring weights. The gap penalty deliberately dominates the boundary
// bonuses so that a tight match span always outranks a scattered match that
// happens to land on a separator.
const SCORE_MATCH: i64 = 10;
const BONUS_START: i64 = 15;
const BONUS_BOUNDARY: i64 = 12;
const BONUS_CAMEL: i64 = 10;
const BONUS_CONSECUTIVE: i64 = 15;
const PENALTY_GAP: i64 = 5;
const PENALTY_LEADING: i64 = 1;

/// Case folding behaviour applied before comparing characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseMode {
	/// Case-insensitive unless the query contains an uppercase character.
	#[default]
	Smart,
	/// Characters must match exactly.
	Sensitive,
	/// Characters always compare case-folded.
	Insensitive,
}

impl CaseMode {
	fn is_sensitive(self, query: &str) -> bool {
		match self {
			Self::Sensitive => true,
			Self::Insensitive => false,
			Self::Smart => query.chars().any(char::is_uppercase),
		}
	}
}

/// Successful match: relevance score plus the character positions matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
	/// Relevance score; higher ranks earlier. May be negative for poor
	/// matches, which is still distinct from "no match".
	pub score: i64,
	/// Character indices (not byte offsets) of the matched positions, in
	/// ascending order. Empty for the empty query.
	pub indices: Vec<usize>,
}

fn fold(c: char) -> char {
	c.to_lowercase().next().unwrap_or(c)
}

fn is_separator(c: char) -> bool {
	c.is_whitespace() || matches!(c, '/' | '\\' | '-' | '_' | '.' | ':' | '@' | '#')
}

/// Positional bonus for matching the character at `idx`.
fn position_bonus(prev: Option<char>, current: char, idx: usize) -> i64 {
	if idx == 0 {
		return BONUS_START;
	}
	let Some(prev) = prev else {
		return 0;
	};
	if is_separator(prev) {
		return BONUS_BOUNDARY;
	}
	if prev.is_lowercase() && current.is_uppercase() {
		return BONUS_CAMEL;
	}
	0
}

/// Match `query` against `text`, returning the score and match positions of
/// the best alignment, or `None` when `query` is not an in-order
/// subsequence of `text`.
///
/// An empty (or whitespace-only) query matches everything with a neutral
/// score of zero and no positions, so an idle prompt passes candidates
/// through in discovery order.
#[must_use]
pub fn match_candidate(query: &str, text: &str, case: CaseMode) -> Option<MatchOutcome> {
	let trimmed = query.trim();
	if trimmed.is_empty() {
		return Some(MatchOutcome {
			score: 0,
			indices: Vec::new(),
		});
	}

	let sensitive = case.is_sensitive(trimmed);
	let needle: Vec<char> = if sensitive {
		trimmed.chars().collect()
	} else {
		trimmed.chars().map(fold).collect()
	};
	let text_chars: Vec<char> = text.chars().collect();
	if needle.len() > text_chars.len() {
		return None;
	}
	let haystack: Vec<char> = if sensitive {
		text_chars.clone()
	} else {
		text_chars.iter().copied().map(fold).collect()
	};

	let n = haystack.len();
	let m = needle.len();

	// Per-position bonus computed on the original (unfolded) text so camel
	// humps survive case folding.
	let bonus: Vec<i64> = text_chars
		.iter()
		.enumerate()
		.map(|(idx, &c)| {
			let prev = if idx == 0 { None } else { Some(text_chars[idx - 1]) };
			SCORE_MATCH + position_bonus(prev, c, idx)
		})
		.collect();

	// rows[i][j]: best score of an alignment matching needle[..=i] whose
	// last match is at haystack position j. parents[i][j] records the
	// position of needle[i - 1] in that alignment for traceback.
	let mut rows: Vec<Vec<i64>> = Vec::with_capacity(m);
	let mut parents: Vec<Vec<usize>> = Vec::with_capacity(m);

	let mut first = vec![NEG_INF; n];
	for (j, slot) in first.iter_mut().enumerate() {
		if haystack[j] == needle[0] {
			*slot = bonus[j] - PENALTY_LEADING * (j as i64);
		}
	}
	rows.push(first);
	parents.push(vec![usize::MAX; n]);

	for i in 1..m {
		let prev_row = &rows[i - 1];
		let mut row = vec![NEG_INF; n];
		let mut row_parents = vec![usize::MAX; n];
		let want = needle[i];

		// Running maximum of prev_row[k] + PENALTY_GAP * (k + 1) over
		// k < j, so a gap transition costs PENALTY_GAP per skipped
		// character without an inner loop.
		let mut best_prefix = NEG_INF;
		let mut best_prefix_at = usize::MAX;

		for j in 0..n {
			if j > 0 {
				let k = j - 1;
				if prev_row[k] != NEG_INF {
					let adjusted = prev_row[k] + PENALTY_GAP * ((k + 1) as i64);
					if adjusted > best_prefix {
						best_prefix = adjusted;
						best_prefix_at = k;
					}
				}
			}

			if haystack[j] != want {
				continue;
			}

			let mut best = NEG_INF;
			let mut parent = usize::MAX;

			if best_prefix != NEG_INF {
				best = best_prefix - PENALTY_GAP * (j as i64);
				parent = best_prefix_at;
			}

			if j > 0 && prev_row[j - 1] != NEG_INF {
				let consecutive = prev_row[j - 1] + BONUS_CONSECUTIVE;
				if consecutive > best {
					best = consecutive;
					parent = j - 1;
				}
			}

			if best != NEG_INF {
				row[j] = bonus[j] + best;
				row_parents[j] = parent;
			}
		}

		rows.push(row);
		parents.push(row_parents);
	}

	// Leftmost best end position keeps the result deterministic when
	// several alignments tie.
	let last = &rows[m - 1];
	let (mut at, mut best) = (usize::MAX, NEG_INF);
	for (j, &score) in last.iter().enumerate() {
		if score > best {
			best = score;
			at = j;
		}
	}
	if best == NEG_INF {
		return None;
	}

	let mut indices = vec![0usize; m];
	let mut j = at;
	for i in (0..m).rev() {
		indices[i] = j;
		j = parents[i][j];
	}

	Some(MatchOutcome {
		score: best,
		indices,
	})
}

/// Compare two optional scores, treating `None` as strictly worse than any
/// match.
#[must_use]
pub fn compare_scores(a: Option<i64>, b: Option<i64>) -> Ordering {
	match (a, b) {
		(Some(a), Some(b)) => a.cmp(&b),
		(Some(_), None) => Ordering::Greater,
		(None, Some(_)) => Ordering::Less,
		(None, None) => Ordering::Equal,
	}
}
