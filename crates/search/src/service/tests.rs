use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep, timeout};

use super::SearchService;
use crate::config::SearchConfig;
use crate::rank::RankingEngine;
use crate::types::{Match, ResultMeta, SessionEvent, SessionPhase};

async fn wait_until<F>(name: &str, mut condition: F)
where
	F: FnMut() -> bool,
{
	timeout(Duration::from_secs(4), async move {
		loop {
			if condition() {
				return;
			}
			sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.unwrap_or_else(|_| panic!("timed out waiting for {name}"));
}

/// Backend scripted through `sh -c`; the pattern and search root arrive as
/// `$0` and `$1`.
fn script_config(script: &str, debounce_ms: u64) -> SearchConfig {
	SearchConfig {
		program: "sh".to_string(),
		extra_flags: vec!["-c".to_string(), script.to_string()],
		debounce_ms,
		throttle_ms: 20,
		..SearchConfig::default()
	}
}

fn fake_row(stem: &str) -> Match {
	Match::file(Path::new("/repo"), stem)
}

#[tokio::test]
async fn blank_query_completes_immediately_without_spawning() {
	// A missing program would surface a notice if a spawn were attempted;
	// the huge debounce would blow the wait timeout if it were not skipped.
	let mut config = script_config("exit 3", 60_000);
	config.program = "quarry-test-missing-backend".to_string();
	let mut service = SearchService::new("/repo", config);

	service.set_input("   ");
	wait_until("blank query completion", || service.phase() == SessionPhase::Completed).await;
	assert!(service.results().is_empty());
	assert_eq!(service.meta(), ResultMeta::default());
	assert!(service.take_notice().is_none());
}

#[tokio::test]
async fn streams_matches_to_completion() {
	let root = tempfile::tempdir().expect("must create tempdir");
	let config = script_config("printf 'src/a.rs:1:2:alpha\\nsrc/b.rs:3:4:beta\\n'", 10);
	let mut service = SearchService::new(root.path(), config);

	service.set_input("alpha");
	wait_until("streamed completion", || service.phase() == SessionPhase::Completed).await;

	let rows = service.results();
	assert_eq!(rows.len(), 2);
	assert_eq!(rows[0].relative.as_ref(), "src/a.rs");
	assert_eq!(rows[0].line, Some(1));
	assert_eq!(rows[0].snippet.as_deref(), Some("alpha"));
	assert_eq!(rows[1].name.as_ref(), "b.rs");
	assert!(Path::new(rows[0].path.as_ref()).is_absolute());
	assert_eq!(service.meta(), ResultMeta { total_matched: 2, truncated: false });
	assert!(service.take_notice().is_none());
}

#[tokio::test]
async fn exit_code_one_means_no_matches() {
	let mut service = SearchService::new("/repo", script_config("exit 1", 5));

	service.set_input("needle");
	wait_until("no-match completion", || service.phase() == SessionPhase::Completed).await;
	assert!(service.results().is_empty());
	assert_eq!(service.meta().total_matched, 0);
	assert!(service.take_notice().is_none());
}

#[tokio::test]
async fn backend_failure_keeps_partial_results() {
	let mut service = SearchService::new("/repo", script_config("printf 'src/a.rs:1:1:x\\n'; exit 2", 5));

	service.set_input("needle");
	wait_until("errored session", || service.phase() == SessionPhase::Errored).await;
	assert_eq!(service.results().len(), 1);
	let notice = service.take_notice().expect("backend failure must surface a notice");
	assert_eq!(notice.kind, crate::error::NoticeKind::BackendFailed);
	assert!(notice.message.contains("status 2"));
}

#[tokio::test]
async fn missing_backend_reports_once() {
	let mut config = SearchConfig {
		debounce_ms: 5,
		..SearchConfig::default()
	};
	config.program = "quarry-test-missing-backend".to_string();
	let mut service = SearchService::new("/repo", config);

	service.set_input("alpha");
	wait_until("first completion", || service.generation() == 1 && service.phase() == SessionPhase::Completed).await;
	let notice = service.take_notice().expect("first query must report the missing backend");
	assert_eq!(notice.kind, crate::error::NoticeKind::BackendMissing);

	service.set_input("beta");
	wait_until("second completion", || service.generation() == 2 && service.phase() == SessionPhase::Completed).await;
	assert!(service.take_notice().is_none(), "the missing backend must only be reported once");
}

#[tokio::test]
async fn rapid_requeries_spawn_exactly_once() {
	let root = tempfile::tempdir().expect("must create tempdir");
	let script = "echo run >> \"$1/runs.log\"; printf 'src/hit.rs:1:1:%s\\n' \"$0\"";
	let mut service = SearchService::new(root.path(), script_config(script, 120));

	service.set_input("foo");
	sleep(Duration::from_millis(10)).await;
	service.set_input("foobar");
	wait_until("debounced completion", || {
		service.generation() == 2 && service.phase() == SessionPhase::Completed
	})
	.await;

	let runs = std::fs::read_to_string(root.path().join("runs.log")).expect("backend must have run");
	assert_eq!(runs.lines().count(), 1, "only the settled query may spawn");
	let rows = service.results();
	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].snippet.as_deref(), Some("foobar"));
}

#[tokio::test]
async fn superseding_a_running_session_discards_its_output() {
	let root = tempfile::tempdir().expect("must create tempdir");
	let script = "sleep 0.2; printf 'src/%s.rs:1:1:m\\n' \"$0\"";
	let mut service = SearchService::new(root.path(), script_config(script, 5));

	service.set_input("first");
	wait_until("first session running", || service.phase() == SessionPhase::Running).await;
	service.set_input("second");
	wait_until("second completion", || {
		service.generation() == 2 && service.phase() == SessionPhase::Completed
	})
	.await;

	let rows = service.results();
	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].name.as_ref(), "second.rs");

	// Give any straggler from the killed first session time to misbehave.
	sleep(Duration::from_millis(300)).await;
	service.pump();
	let rows = service.results();
	assert!(rows.iter().all(|row| !row.path.contains("first")));
}

#[tokio::test]
async fn cap_terminates_the_backend_early() {
	let root = tempfile::tempdir().expect("must create tempdir");
	let script = "i=0; while [ \"$i\" -lt 100 ]; do printf 'src/f%s.rs:1:1:x\\n' \"$i\"; i=$((i+1)); done; sleep 30";
	let config = SearchConfig {
		max_results: 10,
		..script_config(script, 5)
	};
	let mut service = SearchService::new(root.path(), config);

	service.set_input("needle");
	// Completion within the wait timeout proves the backend was killed
	// long before its trailing sleep ended.
	wait_until("capped completion", || service.phase() == SessionPhase::Completed).await;
	assert_eq!(service.results().len(), 10);
	assert!(service.meta().truncated);
}

#[tokio::test]
async fn stale_and_post_terminal_events_are_no_ops() {
	let mut service = SearchService::new("/repo", script_config("sleep 0.3; exit 1", 5));

	service.set_input("needle");
	wait_until("session running", || service.phase() == SessionPhase::Running).await;
	let generation = service.generation();

	// Stale generation: discarded silently.
	service.inject_event(SessionEvent::Batch {
		generation: generation.wrapping_sub(1),
		rows: Arc::from(vec![fake_row("stale.rs")]),
		total_matched: 1,
		truncated: false,
	});
	sleep(Duration::from_millis(50)).await;
	assert!(service.results().is_empty());

	// Live generation: applied.
	service.inject_event(SessionEvent::Batch {
		generation,
		rows: Arc::from(vec![fake_row("live.rs")]),
		total_matched: 1,
		truncated: false,
	});
	wait_until("live batch applied", || service.results().len() == 1).await;

	wait_until("terminal phase", || service.phase() == SessionPhase::Completed).await;

	// Same generation after its terminal transition: a no-op.
	service.inject_event(SessionEvent::Batch {
		generation,
		rows: Arc::from(vec![fake_row("late.rs"), fake_row("later.rs")]),
		total_matched: 2,
		truncated: false,
	});
	service.inject_event(SessionEvent::Finished {
		generation,
		phase: SessionPhase::Errored,
		outcome: crate::types::Outcome::empty(),
	});
	sleep(Duration::from_millis(50)).await;
	assert_eq!(service.phase(), SessionPhase::Completed);
	assert!(service.results().is_empty());
}

struct FakeRanker {
	rows: Vec<Match>,
	calls: Mutex<Vec<(String, usize, usize, Option<PathBuf>)>>,
}

impl FakeRanker {
	fn new(rows: Vec<Match>) -> Arc<Self> {
		Arc::new(Self {
			rows,
			calls: Mutex::new(Vec::new()),
		})
	}
}

impl RankingEngine for FakeRanker {
	fn search(&self, query: &str, cap: usize, concurrency: usize, pinned: Option<&Path>) -> Vec<Match> {
		self.calls.lock().push((query.to_string(), cap, concurrency, pinned.map(Path::to_path_buf)));
		self.rows.clone()
	}
}

#[tokio::test]
async fn ranking_engine_feeds_the_same_contract() {
	let ranker = FakeRanker::new(vec![fake_row("src/a.rs"), fake_row("src/b.rs"), fake_row("src/c.rs")]);
	let config = SearchConfig {
		debounce_ms: 5,
		max_results: 2,
		..SearchConfig::default()
	};
	let mut service = SearchService::with_ranker("/repo", config, Arc::clone(&ranker) as Arc<dyn RankingEngine>);

	service.set_input("ab");
	wait_until("ranked completion", || service.phase() == SessionPhase::Completed).await;

	let rows = service.results();
	assert_eq!(rows.len(), 2, "the pipeline cap applies to ranked producers too");
	assert_eq!(rows[0].relative.as_ref(), "src/a.rs");
	assert!(service.meta().truncated);

	let calls = ranker.calls.lock();
	assert_eq!(calls.len(), 1);
	assert_eq!(calls[0].0, "ab");
	assert_eq!(calls[0].1, 2);
}

#[tokio::test]
async fn pinned_path_reaches_the_ranking_engine() {
	let ranker = FakeRanker::new(vec![fake_row("src/a.rs")]);
	let config = SearchConfig {
		debounce_ms: 5,
		..SearchConfig::default()
	};
	let mut service = SearchService::with_ranker("/repo", config, Arc::clone(&ranker) as Arc<dyn RankingEngine>);

	service.set_pinned(Some(PathBuf::from("/repo/src/current.rs")));
	service.set_input("a");
	wait_until("ranked completion", || service.phase() == SessionPhase::Completed).await;

	let calls = ranker.calls.lock();
	assert_eq!(calls[0].3.as_deref(), Some(Path::new("/repo/src/current.rs")));
}

#[tokio::test]
async fn results_callback_observes_applied_batches() {
	let root = tempfile::tempdir().expect("must create tempdir");
	let seen: Arc<Mutex<Vec<(usize, ResultMeta)>>> = Arc::new(Mutex::new(Vec::new()));
	let mut service = SearchService::new(root.path(), script_config("printf 'src/a.rs:1:1:x\\n'", 5));

	let sink = Arc::clone(&seen);
	service.on_results(Arc::new(move |rows, meta| {
		sink.lock().push((rows.len(), meta));
	}));
	service.set_input("needle");
	wait_until("callback completion", || service.phase() == SessionPhase::Completed).await;

	let seen = seen.lock();
	assert!(!seen.is_empty());
	let (len, meta) = seen[seen.len() - 1];
	assert_eq!(len, 1);
	assert_eq!(meta, ResultMeta { total_matched: 1, truncated: false });
}

#[tokio::test]
async fn generations_are_monotonic_across_queries() {
	let mut service = SearchService::new("/repo", script_config("exit 1", 5));

	for query in ["a", "ab", "abc"] {
		service.set_input(query);
	}
	wait_until("third generation", || service.generation() == 3).await;
	wait_until("final completion", || service.phase() == SessionPhase::Completed).await;
}
