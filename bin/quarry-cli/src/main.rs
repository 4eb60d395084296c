//! Terminal front-end for the quarry search pipeline.
//!
//! One-shot mode drives a single query to a terminal phase and prints the
//! outcome; `--interactive` reads query lines from stdin, superseding the
//! previous query per line, and redraws through the view's coalescing
//! gate.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use quarry_search::{Match, SearchConfig, SearchService, SessionPhase};
use quarry_view::{Anchor, RedrawGate, ViewList};

#[derive(Debug, Parser)]
#[command(name = "quarry", about = "Incremental project search", version)]
struct Args {
	/// Query to run; omit it with --interactive to read queries from stdin.
	query: Option<String>,
	/// Search root.
	#[arg(short = 'C', long, default_value = ".")]
	root: PathBuf,
	/// Read query lines from stdin, superseding the previous query per line.
	#[arg(long)]
	interactive: bool,
	/// Backend executable.
	#[arg(long)]
	program: Option<String>,
	/// Extra flag handed to the backend (repeatable).
	#[arg(long = "flag")]
	flags: Vec<String>,
	#[arg(long)]
	debounce_ms: Option<u64>,
	#[arg(long)]
	throttle_ms: Option<u64>,
	/// Result cap; the backend is terminated early once reached.
	#[arg(long)]
	max_results: Option<usize>,
	/// Rows shown in the result viewport.
	#[arg(long, default_value_t = 15)]
	height: usize,
}

impl Args {
	fn config(&self) -> SearchConfig {
		let mut config = SearchConfig::default();
		if let Some(program) = &self.program {
			config.program = program.clone();
		}
		config.extra_flags.extend(self.flags.iter().cloned());
		if let Some(debounce_ms) = self.debounce_ms {
			config.debounce_ms = debounce_ms;
		}
		if let Some(throttle_ms) = self.throttle_ms {
			config.throttle_ms = throttle_ms;
		}
		if let Some(max_results) = self.max_results {
			config.max_results = max_results;
		}
		config
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_writer(std::io::stderr)
		.init();

	let args = Args::parse();
	let root = std::fs::canonicalize(&args.root).with_context(|| format!("cannot resolve search root {}", args.root.display()))?;
	tracing::debug!(root = %root.display(), "quarry.start");
	let service = SearchService::new(root, args.config());

	if args.interactive {
		run_interactive(service, args.height).await
	} else {
		let query = args.query.clone().context("either a query or --interactive is required")?;
		run_once(service, query, args.height).await
	}
}

async fn run_once(mut service: SearchService, query: String, height: usize) -> anyhow::Result<()> {
	service.set_input(query);
	loop {
		tokio::time::sleep(Duration::from_millis(20)).await;
		service.pump();
		if service.phase().is_terminal() {
			break;
		}
	}

	let mut view = ViewList::new(height, Anchor::First);
	view.replace(service.results().to_vec());
	render(&view, &service);
	if let Some(notice) = service.take_notice() {
		eprintln!("quarry: {}", notice.message);
	}
	service.shutdown();
	Ok(())
}

async fn run_interactive(mut service: SearchService, height: usize) -> anyhow::Result<()> {
	use tokio::io::AsyncBufReadExt;

	let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
	let mut view = ViewList::new(height, Anchor::First);
	let mut gate = RedrawGate::new(Duration::from_millis(33));
	let mut tick = tokio::time::interval(Duration::from_millis(16));

	loop {
		tokio::select! {
			line = lines.next_line() => match line.context("reading stdin")? {
				Some(line) => service.set_input(line.trim().to_string()),
				None => break,
			},
			_ = tick.tick() => {
				if service.pump() {
					view.replace(service.results().to_vec());
					gate.mark();
				}
				if let Some(notice) = service.take_notice() {
					eprintln!("quarry: {}", notice.message);
				}
				if gate.poll(Instant::now()) {
					render(&view, &service);
				}
			}
		}
	}
	service.shutdown();
	Ok(())
}

fn render(view: &ViewList<Match>, service: &SearchService) {
	for index in view.visible_range() {
		let marker = if index == view.selected_index() { '>' } else { ' ' };
		if let Some(row) = view.get(index) {
			println!("{marker} {}", row.display());
		}
	}
	let meta = service.meta();
	let searching = matches!(service.phase(), SessionPhase::Running | SessionPhase::Draining);
	println!(
		"-- {} match(es){}{}",
		meta.total_matched,
		if meta.truncated { ", truncated" } else { "" },
		if searching { ", searching..." } else { "" },
	);
}
