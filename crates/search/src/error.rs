//! Error taxonomy and user-facing notices.
//!
//! Failures never propagate into the presentation layer: every path
//! resolves to a well-formed (possibly empty or partial) outcome plus an
//! optional side-channel notice for the host to surface. Malformed backend
//! lines are dropped per-line, stale-generation results are discarded
//! silently, and cancellation is not an error at all.

use std::sync::Arc;

/// Errors internal to the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
	#[error("search backend `{0}` is not installed or not on PATH")]
	BackendMissing(String),
	#[error("failed to spawn search backend: {0}")]
	Spawn(#[from] std::io::Error),
	#[error("search backend exited with status {code}")]
	Backend { code: i32 },
}

/// Category of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
	BackendMissing,
	BackendFailed,
}

/// A side-channel message for the host to surface to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
	pub kind: NoticeKind,
	pub message: Arc<str>,
}

impl Notice {
	pub(crate) fn for_error(err: &SearchError) -> Self {
		let kind = match err {
			SearchError::BackendMissing(_) => NoticeKind::BackendMissing,
			SearchError::Spawn(_) | SearchError::Backend { .. } => NoticeKind::BackendFailed,
		};
		Self {
			kind,
			message: Arc::from(err.to_string().as_str()),
		}
	}
}
