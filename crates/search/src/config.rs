//! Configuration surface for the search pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the incremental search pipeline.
///
/// Hosts usually deserialize this from their own configuration file; every
/// field has a default so a partial table works.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
	/// Line-oriented content-search executable.
	pub program: String,
	/// Flags passed before the pattern and search root. The defaults make
	/// the backend emit one `path:line:col:content` record per line.
	pub extra_flags: Vec<String>,
	/// Quiet period after the last keystroke before a backend is spawned.
	pub debounce_ms: u64,
	/// Minimum interval between result deliveries while records stream in.
	pub throttle_ms: u64,
	/// Result cap; the producer is terminated early once reached.
	pub max_results: usize,
	/// Worker parallelism handed to ranking producers.
	pub concurrency: usize,
}

impl Default for SearchConfig {
	fn default() -> Self {
		Self {
			program: "rg".to_string(),
			extra_flags: default_flags(),
			debounce_ms: 120,
			throttle_ms: 80,
			max_results: 1000,
			concurrency: default_concurrency(),
		}
	}
}

impl SearchConfig {
	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}

	pub fn throttle(&self) -> Duration {
		Duration::from_millis(self.throttle_ms)
	}
}

fn default_flags() -> Vec<String> {
	["--line-number", "--column", "--no-heading", "--color=never", "--smart-case"]
		.into_iter()
		.map(str::to_string)
		.collect()
}

fn default_concurrency() -> usize {
	std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_documented_values() {
		let config = SearchConfig::default();
		assert_eq!(config.debounce(), Duration::from_millis(120));
		assert_eq!(config.throttle(), Duration::from_millis(80));
		assert_eq!(config.max_results, 1000);
		assert!(config.concurrency >= 1);
	}

	#[test]
	fn partial_table_deserializes_with_defaults() {
		let config: SearchConfig = serde_json::from_str(r#"{"debounce_ms": 40}"#).expect("must deserialize");
		assert_eq!(config.debounce_ms, 40);
		assert_eq!(config.throttle_ms, 80);
		assert_eq!(config.program, "rg");
	}
}
