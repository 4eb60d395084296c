//! Seam to the native filename-ranking engine.

use std::path::Path;

use crate::types::Match;

/// Synchronous, non-streaming match producer.
///
/// Implementations score and order filename candidates; the pipeline
/// consumes the call opaquely as a drop-in alternative to the streaming
/// backend, feeding the same sink and presentation contract without any of
/// the process/parsing machinery. The call runs on a blocking worker, so it
/// may burn CPU freely but must return in bounded time.
pub trait RankingEngine: Send + Sync + 'static {
	/// Returns matches ordered best-first, at most `cap` entries.
	///
	/// `pinned` is the currently-open file, handed through so engines can
	/// deprioritize it in the ranking.
	fn search(&self, query: &str, cap: usize, concurrency: usize, pinned: Option<&Path>) -> Vec<Match>;
}
