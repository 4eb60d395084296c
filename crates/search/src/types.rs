use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Notice;

/// One query issued against the project tree.
#[derive(Debug, Clone)]
pub struct Query {
	pub text: String,
	/// Search root; parsed relative paths are resolved against it.
	pub base: PathBuf,
	/// Currently-open file, handed through to ranking producers.
	pub pinned: Option<PathBuf>,
	/// Monotonic per controller; tags every event this query produces.
	pub generation: u64,
}

/// A ranked match, by filename or by file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
	/// Absolute path of the matched file.
	pub path: Arc<str>,
	/// Path relative to the query base, used for presentation.
	pub relative: Arc<str>,
	/// Final path component.
	pub name: Arc<str>,
	pub line: Option<u32>,
	pub column: Option<u32>,
	/// Matched line content for content searches.
	pub snippet: Option<Arc<str>>,
}

impl Match {
	/// Builds a match from a parsed path, resolving it against `base`.
	///
	/// A path stands alone iff it is absolute; anything else is joined to
	/// the base lexically. No filesystem probing.
	pub fn resolve(base: &Path, raw: &str, line: Option<u32>, column: Option<u32>, snippet: Option<&str>) -> Self {
		let parsed = Path::new(raw);
		let absolute = if parsed.is_absolute() { parsed.to_path_buf() } else { base.join(parsed) };
		let relative = absolute.strip_prefix(base).unwrap_or(&absolute);
		let name = absolute.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
		Self {
			relative: Arc::from(relative.to_string_lossy().as_ref()),
			name: Arc::from(name.as_str()),
			path: Arc::from(absolute.to_string_lossy().as_ref()),
			line,
			column,
			snippet: snippet.map(Arc::from),
		}
	}

	/// Filename-only match, as produced by a ranking engine.
	pub fn file(base: &Path, raw: &str) -> Self {
		Self::resolve(base, raw, None, None, None)
	}

	/// Presentation text: relative path plus location and snippet when present.
	pub fn display(&self) -> String {
		match (self.line, self.column, self.snippet.as_deref()) {
			(Some(line), Some(column), Some(snippet)) => format!("{}:{line}:{column}: {snippet}", self.relative),
			(Some(line), _, _) => format!("{}:{line}", self.relative),
			_ => self.relative.to_string(),
		}
	}
}

/// Final result of one session.
#[derive(Debug, Clone)]
pub struct Outcome {
	pub matches: Arc<[Match]>,
	pub total_matched: usize,
	pub truncated: bool,
}

impl Outcome {
	pub fn empty() -> Self {
		Self {
			matches: Arc::from(Vec::<Match>::new()),
			total_matched: 0,
			truncated: false,
		}
	}
}

/// Delivery metadata accompanying a result snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultMeta {
	pub total_matched: usize,
	pub truncated: bool,
}

/// Lifecycle phase of a search session.
///
/// `Idle → Debouncing → Running → Draining → {Completed | Cancelled |
/// Errored}`; a session superseded while debouncing ends silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
	#[default]
	Idle,
	Debouncing,
	Running,
	Draining,
	Cancelled,
	Completed,
	Errored,
}

impl SessionPhase {
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Cancelled | Self::Completed | Self::Errored)
	}
}

/// Events a session sends to its controller, each tagged with the
/// generation that produced it.
#[derive(Debug)]
pub(crate) enum SessionEvent {
	Phase {
		generation: u64,
		phase: SessionPhase,
	},
	Batch {
		generation: u64,
		rows: Arc<[Match]>,
		total_matched: usize,
		truncated: bool,
	},
	Notice {
		generation: u64,
		notice: Notice,
	},
	Finished {
		generation: u64,
		phase: SessionPhase,
		outcome: Outcome,
	},
}
