//! Incremental project search pipeline.
//!
//! As the user types, [`SearchService`] supersedes the previous query with a
//! new generation, debounces it, drives a cancellable producer (an external
//! line-oriented backend or an in-process [`RankingEngine`]), reassembles its
//! streamed output across chunk boundaries, and delivers capped, throttled
//! result snapshots. Stale generations never reach the consumer: every event
//! is tagged with the generation that produced it and checked against the
//! controller's current one before any shared state moves.
//!
//! Data flow: input change → controller supersedes session → debounce →
//! spawn → [`LineParser`] → [`ResultSink`] → snapshot/callback → render.

mod config;
mod error;
mod parse;
mod rank;
mod service;
mod session;
mod sink;
mod types;

pub use config::SearchConfig;
pub use error::{Notice, NoticeKind, SearchError};
pub use parse::LineParser;
pub use rank::RankingEngine;
pub use service::{ResultsCallback, SearchService};
pub use sink::{Batch, ResultSink};
pub use types::{Match, Outcome, Query, ResultMeta, SessionPhase};
