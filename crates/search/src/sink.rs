//! Throttled, coalescing delivery between the parser and the consumer.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::types::Match;

/// One coalesced delivery: a cumulative snapshot of everything accepted so
/// far, so the consumer's replace semantics hold on every batch.
#[derive(Debug, Clone)]
pub struct Batch {
	pub rows: Arc<[Match]>,
	pub total_matched: usize,
	pub truncated: bool,
}

/// Caps and rate-limits result delivery.
///
/// The sink owns no timer: `deadline()` exposes the armed flush instant and
/// the session loop sleeps on it, which keeps the throttle logic
/// deterministic under a paused test clock. Arming is edge-triggered: the
/// first record after a flush arms the timer, later records coalesce into
/// that same flush.
#[derive(Debug)]
pub struct ResultSink {
	throttle: Duration,
	cap: usize,
	rows: Vec<Match>,
	pending: usize,
	truncated: bool,
	deadline: Option<Instant>,
}

impl ResultSink {
	pub fn new(throttle: Duration, cap: usize) -> Self {
		Self {
			throttle,
			cap: cap.max(1),
			rows: Vec::new(),
			pending: 0,
			truncated: false,
			deadline: None,
		}
	}

	/// Accepts one record. Returns true once the cap is reached; the caller
	/// must then flush immediately and terminate the producer. Records past
	/// the cap are not accepted.
	pub fn append(&mut self, row: Match) -> bool {
		if self.truncated {
			return true;
		}
		self.rows.push(row);
		self.pending += 1;
		if self.rows.len() >= self.cap {
			self.truncated = true;
			self.deadline = None;
			return true;
		}
		if self.deadline.is_none() {
			self.deadline = Some(Instant::now() + self.throttle);
		}
		false
	}

	/// Armed flush instant, if any records await delivery.
	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	/// Takes the pending snapshot, disarming the timer. None when nothing
	/// accumulated since the last flush.
	pub fn flush(&mut self) -> Option<Batch> {
		self.deadline = None;
		if self.pending == 0 {
			return None;
		}
		self.pending = 0;
		tracing::trace!(rows = self.rows.len(), truncated = self.truncated, "search.sink.flush");
		Some(self.snapshot())
	}

	/// Final delivery at end of stream: always yields the full snapshot,
	/// regardless of timer state.
	pub fn finalize(&mut self) -> Batch {
		self.deadline = None;
		self.pending = 0;
		self.snapshot()
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn truncated(&self) -> bool {
		self.truncated
	}

	fn snapshot(&self) -> Batch {
		Batch {
			rows: Arc::from(self.rows.as_slice()),
			total_matched: self.rows.len(),
			truncated: self.truncated,
		}
	}
}
