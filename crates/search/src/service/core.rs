use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::config::SearchConfig;
use crate::error::{Notice, NoticeKind};
use crate::session::{self, Producer, SessionHandle};
use crate::types::{Match, Query, ResultMeta, SessionEvent, SessionPhase};

/// Results-delivery callback registered via `SearchService::on_results`.
pub type ResultsCallback = Arc<dyn Fn(Arc<[Match]>, ResultMeta) + Send + Sync>;

/// Snapshot shared between the controller actor and the service handle.
#[derive(Clone)]
pub(crate) struct SharedState {
	pub generation: u64,
	pub phase: SessionPhase,
	pub results: Arc<[Match]>,
	pub total_matched: usize,
	pub truncated: bool,
	pub last_notice: Option<Notice>,
}

impl Default for SharedState {
	fn default() -> Self {
		Self {
			generation: 0,
			phase: SessionPhase::Idle,
			results: Arc::from(Vec::<Match>::new()),
			total_matched: 0,
			truncated: false,
			last_notice: None,
		}
	}
}

/// Command protocol for the controller actor.
pub(crate) enum ControllerCmd {
	Input { text: String },
	SetPinned { pinned: Option<PathBuf> },
	SetCallback { callback: ResultsCallback },
	Shutdown,
}

/// Owns the single current-session record. All mutation happens on the
/// dispatch task; sessions only talk to it through generation-tagged
/// events, and every event is checked against the current generation
/// before it touches shared state.
pub(crate) struct ControllerActor {
	config: Arc<SearchConfig>,
	producer: Producer,
	base: PathBuf,
	pinned: Option<PathBuf>,
	generation: u64,
	latest: Arc<AtomicU64>,
	current: Option<SessionHandle>,
	finished: bool,
	missing_reported: bool,
	on_results: Option<ResultsCallback>,
	events_tx: mpsc::UnboundedSender<SessionEvent>,
	shared: Arc<RwLock<SharedState>>,
	pub(crate) changed: Arc<AtomicBool>,
}

impl ControllerActor {
	pub fn new(
		config: SearchConfig,
		producer: Producer,
		base: PathBuf,
		latest: Arc<AtomicU64>,
		events_tx: mpsc::UnboundedSender<SessionEvent>,
		shared: Arc<RwLock<SharedState>>,
		changed: Arc<AtomicBool>,
	) -> Self {
		Self {
			config: Arc::new(config),
			producer,
			base,
			pinned: None,
			generation: 0,
			latest,
			current: None,
			finished: false,
			missing_reported: false,
			on_results: None,
			events_tx,
			shared,
			changed,
		}
	}

	/// Atomic supersede: cancel any non-terminal session, bump the
	/// generation, install the replacement, all within one handler turn,
	/// so no interleaved event can observe both sessions as live.
	fn start_session(&mut self, text: String) {
		if let Some(handle) = self.current.take() {
			tracing::trace!(superseded = handle.generation, "search.service.supersede");
			handle.cancel();
		}
		self.generation = self.generation.saturating_add(1);
		self.latest.store(self.generation, AtomicOrdering::Release);
		self.finished = false;

		let query = Query {
			text,
			base: self.base.clone(),
			pinned: self.pinned.clone(),
			generation: self.generation,
		};
		tracing::debug!(generation = self.generation, query = %query.text, "search.service.input");
		let handle = session::spawn(
			query,
			Arc::clone(&self.config),
			self.producer.clone(),
			Arc::clone(&self.latest),
			self.events_tx.clone(),
		);
		self.current = Some(handle);

		let mut shared = self.shared.write();
		shared.generation = self.generation;
		shared.phase = SessionPhase::Idle;
	}

	/// Applies a session event; returns whether shared state changed.
	/// Events from superseded generations are discarded silently; a stale
	/// result is not an error.
	fn apply_event(&mut self, event: SessionEvent) -> bool {
		match event {
			SessionEvent::Phase { generation, phase } => {
				if generation != self.generation || self.finished {
					return false;
				}
				let mut shared = self.shared.write();
				if shared.phase == phase {
					return false;
				}
				shared.phase = phase;
				true
			}
			SessionEvent::Batch {
				generation,
				rows,
				total_matched,
				truncated,
			} => {
				if generation != self.generation || self.finished {
					tracing::trace!(generation, current = self.generation, "search.service.stale_batch");
					return false;
				}
				{
					let mut shared = self.shared.write();
					shared.results = Arc::clone(&rows);
					shared.total_matched = total_matched;
					shared.truncated = truncated;
				}
				self.emit_results(rows, ResultMeta { total_matched, truncated });
				true
			}
			SessionEvent::Notice { generation, notice } => {
				if generation != self.generation {
					return false;
				}
				if notice.kind == NoticeKind::BackendMissing {
					// One report per controller, not one per keystroke.
					if self.missing_reported {
						return false;
					}
					self.missing_reported = true;
				}
				self.shared.write().last_notice = Some(notice);
				true
			}
			SessionEvent::Finished {
				generation,
				phase,
				outcome,
			} => {
				if generation != self.generation || self.finished {
					return false;
				}
				// Terminal transition: release the handle exactly once;
				// anything arriving after this is a no-op.
				self.finished = true;
				self.current = None;
				{
					let mut shared = self.shared.write();
					shared.phase = phase;
					shared.results = Arc::clone(&outcome.matches);
					shared.total_matched = outcome.total_matched;
					shared.truncated = outcome.truncated;
				}
				tracing::debug!(generation, phase = ?phase, rows = outcome.total_matched, "search.service.finished");
				self.emit_results(
					outcome.matches,
					ResultMeta {
						total_matched: outcome.total_matched,
						truncated: outcome.truncated,
					},
				);
				true
			}
		}
	}

	fn emit_results(&self, rows: Arc<[Match]>, meta: ResultMeta) {
		if let Some(callback) = &self.on_results {
			callback(rows, meta);
		}
	}

	fn shutdown(&mut self) {
		if let Some(handle) = self.current.take() {
			handle.cancel();
		}
	}
}

/// Dispatch loop: multiplexes handle commands and session events onto the
/// actor so all state mutation happens in one task.
pub(crate) async fn run(
	mut actor: ControllerActor,
	mut cmd_rx: mpsc::UnboundedReceiver<ControllerCmd>,
	mut evt_rx: mpsc::UnboundedReceiver<SessionEvent>,
) {
	loop {
		let changed = tokio::select! {
			biased;
			maybe_cmd = cmd_rx.recv() => match maybe_cmd {
				Some(ControllerCmd::Input { text }) => {
					actor.start_session(text);
					true
				}
				Some(ControllerCmd::SetPinned { pinned }) => {
					actor.pinned = pinned;
					false
				}
				Some(ControllerCmd::SetCallback { callback }) => {
					actor.on_results = Some(callback);
					false
				}
				Some(ControllerCmd::Shutdown) | None => {
					actor.shutdown();
					break;
				}
			},
			maybe_evt = evt_rx.recv() => match maybe_evt {
				Some(event) => actor.apply_event(event),
				None => break,
			},
		};
		if changed {
			actor.changed.store(true, AtomicOrdering::Release);
		}
	}
}
