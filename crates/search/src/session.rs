//! One query's lifecycle: debounce, spawn, drive, terminate.
//!
//! A session is a task racing three things: the cancellation token (the
//! controller superseding or shutting down this generation), backend
//! output, and the sink's flush deadline. The captured generation is
//! re-checked against the controller's latest at every suspension point, so
//! a superseded session can only ever end silently.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;
use crate::error::{Notice, SearchError};
use crate::parse::LineParser;
use crate::rank::RankingEngine;
use crate::sink::{Batch, ResultSink};
use crate::types::{Outcome, Query, SessionEvent, SessionPhase};

/// Producer behind a session.
#[derive(Clone)]
pub(crate) enum Producer {
	/// External line-oriented backend process.
	Stream,
	/// In-process ranking engine, run on a blocking worker.
	Ranker(Arc<dyn RankingEngine>),
}

/// Handle to a live session. Cancelling is idempotent, kills the backend
/// best-effort, and guarantees no further event for this generation is
/// applied.
pub(crate) struct SessionHandle {
	pub generation: u64,
	cancel: CancellationToken,
	_task: JoinHandle<()>,
}

impl SessionHandle {
	pub fn cancel(&self) {
		self.cancel.cancel();
	}
}

pub(crate) fn spawn(
	query: Query,
	config: Arc<SearchConfig>,
	producer: Producer,
	latest: Arc<AtomicU64>,
	events: mpsc::UnboundedSender<SessionEvent>,
) -> SessionHandle {
	let cancel = CancellationToken::new();
	let generation = query.generation;
	let task = tokio::spawn(drive(query, config, producer, latest, events, cancel.clone()));
	SessionHandle {
		generation,
		cancel,
		_task: task,
	}
}

async fn drive(
	query: Query,
	config: Arc<SearchConfig>,
	producer: Producer,
	latest: Arc<AtomicU64>,
	events: mpsc::UnboundedSender<SessionEvent>,
	cancel: CancellationToken,
) {
	let generation = query.generation;

	// A blank query clears the result list without touching the backend.
	if query.text.trim().is_empty() {
		let _ = events.send(SessionEvent::Finished {
			generation,
			phase: SessionPhase::Completed,
			outcome: Outcome::empty(),
		});
		return;
	}

	let _ = events.send(SessionEvent::Phase {
		generation,
		phase: SessionPhase::Debouncing,
	});
	tokio::select! {
		() = cancel.cancelled() => return,
		() = tokio::time::sleep(config.debounce()) => {}
	}
	if latest.load(AtomicOrdering::Acquire) != generation {
		tracing::trace!(generation, "search.session.superseded");
		return;
	}

	let _ = events.send(SessionEvent::Phase {
		generation,
		phase: SessionPhase::Running,
	});
	match producer {
		Producer::Stream => drive_stream(query, &config, &events, &cancel).await,
		Producer::Ranker(engine) => drive_ranked(query, &config, engine, &latest, &events, &cancel).await,
	}
}

async fn drive_stream(query: Query, config: &SearchConfig, events: &mpsc::UnboundedSender<SessionEvent>, cancel: &CancellationToken) {
	let generation = query.generation;
	let mut child = match spawn_backend(config, &query) {
		Ok(child) => child,
		Err(err) => {
			tracing::warn!(generation, error = %err, "search.session.spawn_failed");
			let _ = events.send(SessionEvent::Notice {
				generation,
				notice: Notice::for_error(&err),
			});
			let _ = events.send(SessionEvent::Finished {
				generation,
				phase: SessionPhase::Completed,
				outcome: Outcome::empty(),
			});
			return;
		}
	};
	tracing::debug!(generation, program = %config.program, query = %query.text, "search.session.spawn");

	let Some(mut stdout) = child.stdout.take() else {
		let _ = child.start_kill();
		let _ = events.send(SessionEvent::Finished {
			generation,
			phase: SessionPhase::Errored,
			outcome: Outcome::empty(),
		});
		return;
	};

	let mut parser = LineParser::new(query.base.clone());
	let mut sink = ResultSink::new(config.throttle(), config.max_results);
	let mut buf = vec![0u8; 8192];
	let mut capped = false;
	let mut read_failed = false;

	loop {
		let flush_at = sink.deadline();
		tokio::select! {
			() = cancel.cancelled() => {
				let _ = child.start_kill();
				let _ = events.send(SessionEvent::Phase { generation, phase: SessionPhase::Cancelled });
				return;
			}
			() = flush_wait(flush_at) => {
				if let Some(batch) = sink.flush() {
					send_batch(events, generation, batch);
				}
			}
			read = stdout.read(&mut buf) => match read {
				Ok(0) => break,
				Ok(len) => {
					for row in parser.feed(&buf[..len]) {
						if sink.append(row) {
							capped = true;
							break;
						}
					}
					if capped {
						// Backpressure at the producer: stop the backend
						// instead of discarding its excess output.
						let _ = child.start_kill();
						tracing::debug!(generation, rows = sink.len(), "search.session.capped");
						if let Some(batch) = sink.flush() {
							send_batch(events, generation, batch);
						}
						break;
					}
				}
				Err(err) => {
					tracing::warn!(generation, error = %err, "search.session.read_failed");
					read_failed = true;
					break;
				}
			},
		}
	}

	let _ = events.send(SessionEvent::Phase {
		generation,
		phase: SessionPhase::Draining,
	});
	if !capped && !read_failed && let Some(row) = parser.finish() {
		let _ = sink.append(row);
	}
	if read_failed {
		let _ = child.start_kill();
	}

	let status = tokio::select! {
		() = cancel.cancelled() => {
			let _ = child.start_kill();
			let _ = events.send(SessionEvent::Phase { generation, phase: SessionPhase::Cancelled });
			return;
		}
		status = child.wait() => status,
	};
	let code = match status {
		Ok(status) => status.code(),
		Err(err) => {
			tracing::warn!(generation, error = %err, "search.session.wait_failed");
			None
		}
	};

	let batch = sink.finalize();
	let outcome = Outcome {
		matches: batch.rows,
		total_matched: batch.total_matched,
		truncated: batch.truncated,
	};
	match classify_exit(code) {
		Ok(()) => {
			tracing::debug!(generation, rows = outcome.total_matched, truncated = outcome.truncated, "search.session.complete");
			let _ = events.send(SessionEvent::Finished {
				generation,
				phase: SessionPhase::Completed,
				outcome,
			});
		}
		Err(err) => {
			// Matches parsed before the failure are still surfaced.
			tracing::warn!(generation, error = %err, rows = outcome.total_matched, "search.session.backend_failed");
			let _ = events.send(SessionEvent::Notice {
				generation,
				notice: Notice::for_error(&err),
			});
			let _ = events.send(SessionEvent::Finished {
				generation,
				phase: SessionPhase::Errored,
				outcome,
			});
		}
	}
}

async fn drive_ranked(
	query: Query,
	config: &SearchConfig,
	engine: Arc<dyn RankingEngine>,
	latest: &AtomicU64,
	events: &mpsc::UnboundedSender<SessionEvent>,
	cancel: &CancellationToken,
) {
	let generation = query.generation;
	let text = query.text.clone();
	let pinned = query.pinned.clone();
	let cap = config.max_results;
	let concurrency = config.concurrency;
	let ranking = tokio::task::spawn_blocking(move || engine.search(&text, cap, concurrency, pinned.as_deref()));

	let ranked = tokio::select! {
		() = cancel.cancelled() => {
			let _ = events.send(SessionEvent::Phase { generation, phase: SessionPhase::Cancelled });
			return;
		}
		ranked = ranking => match ranked {
			Ok(rows) => rows,
			Err(err) => {
				tracing::warn!(generation, error = %err, "search.session.ranker_panicked");
				Vec::new()
			}
		},
	};
	if latest.load(AtomicOrdering::Acquire) != generation {
		tracing::trace!(generation, "search.session.superseded");
		return;
	}

	let mut sink = ResultSink::new(config.throttle(), cap);
	for row in ranked {
		if sink.append(row) {
			break;
		}
	}
	let batch = sink.finalize();
	tracing::debug!(generation, rows = batch.total_matched, "search.session.ranked");
	let _ = events.send(SessionEvent::Finished {
		generation,
		phase: SessionPhase::Completed,
		outcome: Outcome {
			matches: batch.rows,
			total_matched: batch.total_matched,
			truncated: batch.truncated,
		},
	});
}

async fn flush_wait(at: Option<Instant>) {
	match at {
		Some(at) => tokio::time::sleep_until(at).await,
		None => std::future::pending().await,
	}
}

fn send_batch(events: &mpsc::UnboundedSender<SessionEvent>, generation: u64, batch: Batch) {
	let _ = events.send(SessionEvent::Batch {
		generation,
		rows: batch.rows,
		total_matched: batch.total_matched,
		truncated: batch.truncated,
	});
}

fn spawn_backend(config: &SearchConfig, query: &Query) -> Result<Child, SearchError> {
	let mut command = Command::new(&config.program);
	command
		.args(&config.extra_flags)
		.arg(&query.text)
		.arg(&query.base)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::null())
		.kill_on_drop(true);
	match command.spawn() {
		Ok(child) => Ok(child),
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(SearchError::BackendMissing(config.program.clone())),
		Err(err) => Err(SearchError::Spawn(err)),
	}
}

/// Exit-status policy: 0 is success, 1 is "no matches" (not an error), any
/// other code is a backend failure whose partial results are still kept. A
/// signal exit carries no code and is never an error; it is what our own
/// kill looks like.
fn classify_exit(code: Option<i32>) -> Result<(), SearchError> {
	match code {
		Some(0) | Some(1) | None => Ok(()),
		Some(code) => Err(SearchError::Backend { code }),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exit_codes_zero_and_one_are_success() {
		assert!(classify_exit(Some(0)).is_ok());
		assert!(classify_exit(Some(1)).is_ok());
	}

	#[test]
	fn signal_exit_is_never_an_error() {
		assert!(classify_exit(None).is_ok());
	}

	#[test]
	fn other_exit_codes_are_backend_failures() {
		let err = classify_exit(Some(2)).expect_err("code 2 must fail");
		assert!(matches!(err, SearchError::Backend { code: 2 }));
	}
}
