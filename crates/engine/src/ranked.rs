//! Bounded top-K accumulator for scored candidates.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use crate::candidate::ScoredCandidate;

#[derive(Clone)]
struct RankedEntry {
	scored: ScoredCandidate,
}

impl RankedEntry {
	/// Higher score ranks first; equal scores keep discovery order, so the
	/// earlier candidate compares greater and survives eviction.
	fn rank(&self, other: &Self) -> Ordering {
		self.scored
			.score
			.cmp(&other.scored.score)
			.then_with(|| other.scored.candidate.id.cmp(&self.scored.candidate.id))
	}
}

impl PartialEq for RankedEntry {
	fn eq(&self, other: &Self) -> bool {
		self.rank(other) == Ordering::Equal
	}
}

impl Eq for RankedEntry {}

impl Ord for RankedEntry {
	fn cmp(&self, other: &Self) -> Ordering {
		self.rank(other)
	}
}

impl PartialOrd for RankedEntry {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

/// Maintains the K highest-scoring candidates seen so far for one session.
///
/// The set is owned exclusively by its session's coordinator, which
/// serialises all access; [`RankedSet::snapshot`] never mutates state.
/// Ties break on discovery order, so equal-score candidates never reorder
/// relative to how the source produced them.
pub struct RankedSet {
	capacity: usize,
	heap: BinaryHeap<Reverse<RankedEntry>>,
	retained_ids: HashSet<u64>,
	offered: u64,
}

impl RankedSet {
	/// Create a set retaining at most `capacity` candidates.
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity,
			heap: BinaryHeap::with_capacity(capacity.min(4096)),
			retained_ids: HashSet::new(),
			offered: 0,
		}
	}

	/// Offer a scored candidate, evicting the current minimum when the set
	/// is full. Returns whether the visible top-K changed, which callers
	/// use to decide whether a fresh snapshot is worth emitting.
	pub fn offer(&mut self, scored: ScoredCandidate) -> bool {
		self.offered += 1;
		if self.capacity == 0 {
			return false;
		}
		// Each candidate id is produced once per session; a repeat offer
		// would corrupt the no-duplicates invariant, so drop it.
		if self.retained_ids.contains(&scored.candidate.id) {
			debug_assert!(false, "candidate id offered twice");
			return false;
		}

		let entry = RankedEntry { scored };
		if self.heap.len() < self.capacity {
			self.retained_ids.insert(entry.scored.candidate.id);
			self.heap.push(Reverse(entry));
			return true;
		}

		if let Some(mut current_min) = self.heap.peek_mut() {
			if entry > current_min.0 {
				self.retained_ids.remove(&current_min.0.scored.candidate.id);
				self.retained_ids.insert(entry.scored.candidate.id);
				*current_min = Reverse(entry);
				return true;
			}
		}
		false
	}

	/// Materialise the current top-K, sorted by `(score desc, discovery
	/// order asc)`.
	#[must_use]
	pub fn snapshot(&self) -> Vec<ScoredCandidate> {
		let mut entries: Vec<&RankedEntry> = self.heap.iter().map(|entry| &entry.0).collect();
		entries.sort_unstable_by(|a, b| b.cmp(a));
		entries.into_iter().map(|entry| entry.scored.clone()).collect()
	}

	/// Number of candidates currently retained.
	#[must_use]
	pub fn len(&self) -> usize {
		self.heap.len()
	}

	/// Whether no candidates are retained.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.heap.is_empty()
	}

	/// Total number of candidates ever offered, including those evicted or
	/// rejected, for "N matched of M scanned" reporting.
	#[must_use]
	pub fn offered(&self) -> u64 {
		self.offered
	}
}
