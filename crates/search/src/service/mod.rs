//! Search service: the public handle over the session controller.
//!
//! The handle is cheap state, a command channel plus a shared snapshot.
//! Hosts call [`SearchService::set_input`] per keystroke, then drain
//! [`SearchService::pump`] once per render tick and redraw from
//! [`SearchService::results`] when it reports a change.

mod core;
#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};

use parking_lot::RwLock;
use tokio::sync::mpsc;

pub use self::core::ResultsCallback;
use self::core::{ControllerActor, ControllerCmd, SharedState};
use crate::config::SearchConfig;
use crate::error::Notice;
use crate::rank::RankingEngine;
use crate::session::Producer;
use crate::types::{Match, ResultMeta, SessionPhase};
#[cfg(test)]
use crate::types::SessionEvent;

/// Handle to the incremental search pipeline.
///
/// Must be created inside a tokio runtime; the controller runs as a task
/// and ends on [`SearchService::shutdown`] or when the handle is dropped.
pub struct SearchService {
	shared: Arc<RwLock<SharedState>>,
	changed: Arc<AtomicBool>,
	cmd_tx: mpsc::UnboundedSender<ControllerCmd>,
	#[cfg(test)]
	events_tx: mpsc::UnboundedSender<SessionEvent>,
	_task: tokio::task::JoinHandle<()>,
}

impl SearchService {
	/// Streaming-backend service rooted at `base`.
	pub fn new(base: impl Into<PathBuf>, config: SearchConfig) -> Self {
		Self::build(base.into(), config, Producer::Stream)
	}

	/// Service fed by a synchronous ranking engine instead of a backend
	/// process; the delivery contract is identical.
	pub fn with_ranker(base: impl Into<PathBuf>, config: SearchConfig, engine: Arc<dyn RankingEngine>) -> Self {
		Self::build(base.into(), config, Producer::Ranker(engine))
	}

	fn build(base: PathBuf, config: SearchConfig, producer: Producer) -> Self {
		let shared = Arc::new(RwLock::new(SharedState::default()));
		let changed = Arc::new(AtomicBool::new(false));
		let latest = Arc::new(AtomicU64::new(0));
		let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
		let (events_tx, events_rx) = mpsc::unbounded_channel();

		let actor = ControllerActor::new(
			config,
			producer,
			base,
			latest,
			events_tx.clone(),
			Arc::clone(&shared),
			Arc::clone(&changed),
		);
		let task = tokio::spawn(self::core::run(actor, cmd_rx, events_rx));

		Self {
			shared,
			changed,
			cmd_tx,
			#[cfg(test)]
			events_tx,
			_task: task,
		}
	}

	/// Supersedes the current query. The previous session is cancelled and
	/// its remaining output discarded.
	pub fn set_input(&mut self, text: impl Into<String>) {
		let _ = self.cmd_tx.send(ControllerCmd::Input { text: text.into() });
	}

	/// Sets the file handed through to ranking producers.
	pub fn set_pinned(&mut self, pinned: Option<PathBuf>) {
		let _ = self.cmd_tx.send(ControllerCmd::SetPinned { pinned });
	}

	/// Registers the delivery callback invoked on every applied batch.
	pub fn on_results(&mut self, callback: ResultsCallback) {
		let _ = self.cmd_tx.send(ControllerCmd::SetCallback { callback });
	}

	/// Cancels the current session and stops the controller.
	pub fn shutdown(&mut self) {
		let _ = self.cmd_tx.send(ControllerCmd::Shutdown);
	}

	/// Latest applied result snapshot, in producer order.
	pub fn results(&self) -> Arc<[Match]> {
		Arc::clone(&self.shared.read().results)
	}

	pub fn meta(&self) -> ResultMeta {
		let shared = self.shared.read();
		ResultMeta {
			total_matched: shared.total_matched,
			truncated: shared.truncated,
		}
	}

	pub fn phase(&self) -> SessionPhase {
		self.shared.read().phase
	}

	pub fn generation(&self) -> u64 {
		self.shared.read().generation
	}

	/// Takes the pending user notice, if any.
	pub fn take_notice(&mut self) -> Option<Notice> {
		self.shared.write().last_notice.take()
	}

	/// True when shared state changed since the last call; drain once per
	/// render tick.
	pub fn pump(&mut self) -> bool {
		self.changed.swap(false, AtomicOrdering::AcqRel)
	}

	#[cfg(test)]
	pub(crate) fn inject_event(&self, event: SessionEvent) {
		let _ = self.events_tx.send(event);
	}
}
