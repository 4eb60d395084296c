//! Incremental parsing of the streaming backend's output.
//!
//! The backend emits one match per line as `path:line:col:content`, where
//! the path may itself contain colons (URIs, drive letters). The tokenizer
//! scans colon positions from the end of the line and takes the first split
//! whose two fields left of the candidate separator are numeric, so the
//! rightmost two numeric fields win. Malformed lines are dropped and never
//! abort the stream.

use std::path::PathBuf;

use memchr::memchr;

use crate::types::Match;

/// Splits raw output chunks into matches, retaining an incomplete trailing
/// line across calls.
///
/// `feed` is chunk-boundary-invariant: splitting one byte stream at
/// arbitrary points yields the same records as feeding it whole.
#[derive(Debug)]
pub struct LineParser {
	base: PathBuf,
	partial: Vec<u8>,
}

impl LineParser {
	pub fn new(base: impl Into<PathBuf>) -> Self {
		Self {
			base: base.into(),
			partial: Vec::new(),
		}
	}

	/// Feeds one chunk of backend output, returning the records completed
	/// by it.
	pub fn feed(&mut self, chunk: &[u8]) -> Vec<Match> {
		let mut out = Vec::new();
		let mut rest = chunk;
		while let Some(newline) = memchr(b'\n', rest) {
			let (head, tail) = rest.split_at(newline);
			rest = &tail[1..];
			if self.partial.is_empty() {
				self.push_line(head, &mut out);
			} else {
				self.partial.extend_from_slice(head);
				let line = std::mem::take(&mut self.partial);
				self.push_line(&line, &mut out);
			}
		}
		self.partial.extend_from_slice(rest);
		out
	}

	/// Drains an unterminated final line at end of stream.
	pub fn finish(&mut self) -> Option<Match> {
		if self.partial.is_empty() {
			return None;
		}
		let line = std::mem::take(&mut self.partial);
		let mut out = Vec::new();
		self.push_line(&line, &mut out);
		out.pop()
	}

	fn push_line(&self, line: &[u8], out: &mut Vec<Match>) {
		let line = strip_cr(line);
		if line.is_empty() {
			return;
		}
		let text = String::from_utf8_lossy(line);
		match split_record(&text) {
			Some(record) => out.push(Match::resolve(
				&self.base,
				record.path,
				Some(record.line),
				Some(record.column),
				Some(record.content),
			)),
			None => tracing::trace!(line = %text, "search.parse.drop"),
		}
	}
}

fn strip_cr(line: &[u8]) -> &[u8] {
	match line.split_last() {
		Some((b'\r', head)) => head,
		_ => line,
	}
}

/// One tokenized `path:line:col:content` record borrowing from its line.
#[derive(Debug, PartialEq, Eq)]
struct RawRecord<'a> {
	path: &'a str,
	line: u32,
	column: u32,
	content: &'a str,
}

/// Scans candidate content separators right to left; the first candidate
/// preceded by two numeric fields wins.
fn split_record(text: &str) -> Option<RawRecord<'_>> {
	let mut cursor = text.len();
	while let Some(content_sep) = text[..cursor].rfind(':') {
		cursor = content_sep;
		if let Some(record) = try_split_at(text, content_sep) {
			return Some(record);
		}
	}
	None
}

fn try_split_at(text: &str, content_sep: usize) -> Option<RawRecord<'_>> {
	let head = &text[..content_sep];
	let column_sep = head.rfind(':')?;
	let column = numeric_field(&head[column_sep + 1..])?;
	let head = &head[..column_sep];
	let line_sep = head.rfind(':')?;
	let line = numeric_field(&head[line_sep + 1..])?;
	let path = &head[..line_sep];
	if path.is_empty() {
		return None;
	}
	Some(RawRecord {
		path,
		line,
		column,
		content: &text[content_sep + 1..],
	})
}

fn numeric_field(field: &str) -> Option<u32> {
	if field.is_empty() || !field.bytes().all(|byte| byte.is_ascii_digit()) {
		return None;
	}
	field.parse().ok()
}
