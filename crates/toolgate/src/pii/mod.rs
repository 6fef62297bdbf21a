//! PII (Personally Identifiable Information) Redaction
//!
//! This module provides the pattern-based redaction engine applied to tool
//! results before they are logged, persisted, or returned to lower-trust
//! consumers, plus a cruder storage redactor used on at-rest event text.
//!
//! # Redaction levels
//! - `none`: engine disabled, text passes through untouched
//! - `basic`: email, phone and credit card patterns
//! - `strict`: the full catalog (adds SSN, IPv4, street address, ZIP)
//!
//! # Replacement semantics
//! Every occurrence of every match is replaced by position, pattern by pattern
//! in catalog order. Each redaction record carries the byte offset of the match
//! in the original input, even when earlier patterns have already rewritten
//! the text around it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

mod patterns;
pub mod storage;

pub use patterns::{PiiPattern, PiiType, catalog};

/// Number of leading catalog entries enabled at the `basic` level
const BASIC_PATTERN_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionLevel {
	None,
	Basic,
	#[default]
	Strict,
}

/// One replaced span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redaction {
	/// Name of the pattern that matched
	#[serde(rename = "type")]
	pub kind: String,
	pub original: String,
	pub replacement: String,
	/// Byte offset of the match in the original text
	pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionResult {
	pub original_text: String,
	pub redacted_text: String,
	pub redactions: Vec<Redaction>,
}

impl RedactionResult {
	fn unchanged(text: &str) -> Self {
		Self {
			original_text: text.to_string(),
			redacted_text: text.to_string(),
			redactions: Vec::new(),
		}
	}

	pub fn is_redacted(&self) -> bool {
		!self.redactions.is_empty()
	}
}

/// Pattern-based PII scanner and rewriter
#[derive(Debug, Clone)]
pub struct PiiRedactionEngine {
	enabled: bool,
	patterns: Vec<PiiPattern>,
}

impl Default for PiiRedactionEngine {
	fn default() -> Self {
		Self::for_level(RedactionLevel::default())
	}
}

impl PiiRedactionEngine {
	pub fn new(enabled: bool, patterns: Vec<PiiPattern>) -> Self {
		Self { enabled, patterns }
	}

	pub fn for_level(level: RedactionLevel) -> Self {
		match level {
			RedactionLevel::None => Self::new(false, Vec::new()),
			RedactionLevel::Basic => Self::new(
				true,
				catalog().into_iter().take(BASIC_PATTERN_COUNT).collect(),
			),
			RedactionLevel::Strict => Self::new(true, catalog()),
		}
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	pub fn set_enabled(&mut self, enabled: bool) {
		self.enabled = enabled;
	}

	pub fn patterns(&self) -> &[PiiPattern] {
		&self.patterns
	}

	/// Append a pattern; it runs after every existing one.
	pub fn add_pattern(&mut self, pattern: PiiPattern) {
		tracing::debug!(pattern = %pattern.name, "adding PII pattern");
		self.patterns.push(pattern);
	}

	/// Remove every pattern named `name`. Returns whether any was removed.
	pub fn remove_pattern(&mut self, name: &str) -> bool {
		let before = self.patterns.len();
		self.patterns.retain(|p| p.name != name);
		before != self.patterns.len()
	}

	fn active(&self) -> bool {
		self.enabled && !self.patterns.is_empty()
	}

	pub fn redact(&self, text: &str) -> RedactionResult {
		if !self.active() || text.is_empty() {
			return RedactionResult::unchanged(text);
		}

		let mut current = text.to_string();
		let mut edits: Vec<Edit> = Vec::new();
		let mut redactions = Vec::new();

		for pattern in &self.patterns {
			let mut rewritten = String::with_capacity(current.len());
			let mut last = 0;
			let mut pass = Vec::new();

			for m in pattern.regex.find_iter(&current) {
				rewritten.push_str(&current[last..m.start()]);
				rewritten.push_str(&pattern.replacement);
				last = m.end();

				let orig_start = to_original(&edits, m.start());
				let orig_end = to_original_end(&edits, m.end()).max(orig_start);
				pass.push(Edit {
					start: m.start(),
					len: m.len(),
					orig_start,
					orig_len: orig_end - orig_start,
				});
				redactions.push(Redaction {
					kind: pattern.name.clone(),
					original: m.as_str().to_string(),
					replacement: pattern.replacement.clone(),
					position: orig_start,
				});
			}

			if !pass.is_empty() {
				rewritten.push_str(&current[last..]);
				current = rewritten;
				edits = merge_edits(edits, pass, pattern.replacement.len());
			}
		}

		RedactionResult {
			original_text: text.to_string(),
			redacted_text: current,
			redactions,
		}
	}

	pub fn is_pii_present(&self, text: &str) -> bool {
		self.active() && self.patterns.iter().any(|p| p.regex.is_match(text))
	}

	/// Names of every pattern that matches somewhere in `text`
	pub fn pii_types(&self, text: &str) -> BTreeSet<String> {
		if !self.active() {
			return BTreeSet::new();
		}
		self
			.patterns
			.iter()
			.filter(|p| p.regex.is_match(text))
			.map(|p| p.name.clone())
			.collect()
	}

	/// Redact every string inside a JSON value in place, object keys included,
	/// returning the number of redactions applied. Keys that redact to the same
	/// token collapse into one entry holding the last value.
	pub fn redact_json(&self, value: &mut serde_json::Value) -> usize {
		match value {
			serde_json::Value::String(s) => {
				let result = self.redact(s);
				let count = result.redactions.len();
				if count > 0 {
					*s = result.redacted_text;
				}
				count
			},
			serde_json::Value::Array(arr) => arr.iter_mut().map(|v| self.redact_json(v)).sum(),
			serde_json::Value::Object(obj) => {
				if !obj.keys().any(|k| self.is_pii_present(k)) {
					return obj.values_mut().map(|v| self.redact_json(v)).sum();
				}
				let mut count = 0;
				for (key, mut v) in std::mem::take(&mut *obj) {
					count += self.redact_json(&mut v);
					let result = self.redact(&key);
					count += result.redactions.len();
					obj.insert(result.redacted_text, v);
				}
				count
			},
			_ => 0,
		}
	}

	/// Whether any string or object key inside a JSON value contains PII
	pub fn json_contains_pii(&self, value: &serde_json::Value) -> bool {
		match value {
			serde_json::Value::String(s) => self.is_pii_present(s),
			serde_json::Value::Array(arr) => arr.iter().any(|v| self.json_contains_pii(v)),
			serde_json::Value::Object(obj) => obj
				.iter()
				.any(|(k, v)| self.is_pii_present(k) || self.json_contains_pii(v)),
			_ => false,
		}
	}

	/// Names of every pattern matching a string or object key inside `value`
	pub fn json_pii_types(&self, value: &serde_json::Value) -> BTreeSet<String> {
		let mut types = BTreeSet::new();
		self.collect_json_pii_types(value, &mut types);
		types
	}

	fn collect_json_pii_types(&self, value: &serde_json::Value, types: &mut BTreeSet<String>) {
		match value {
			serde_json::Value::String(s) => types.extend(self.pii_types(s)),
			serde_json::Value::Array(arr) => arr
				.iter()
				.for_each(|v| self.collect_json_pii_types(v, types)),
			serde_json::Value::Object(obj) => {
				for (k, v) in obj {
					types.extend(self.pii_types(k));
					self.collect_json_pii_types(v, types);
				}
			},
			_ => {},
		}
	}
}

/// A replacement already applied to the working text: `start..start + len` in
/// the working text stands for `orig_start..orig_start + orig_len` in the input.
#[derive(Debug, Clone, Copy)]
struct Edit {
	start: usize,
	len: usize,
	orig_start: usize,
	orig_len: usize,
}

impl Edit {
	fn end(&self) -> usize {
		self.start + self.len
	}

	/// Offset between input and working text for positions after this edit
	fn shift(&self) -> isize {
		(self.orig_start + self.orig_len) as isize - self.end() as isize
	}
}

/// Map a match start in the working text back to the input. A start inside a
/// replacement token maps to the start of the text that token replaced.
fn to_original(edits: &[Edit], pos: usize) -> usize {
	let mut shift = 0;
	for edit in edits {
		if pos < edit.start {
			break;
		}
		if pos >= edit.end() {
			shift = edit.shift();
			continue;
		}
		return edit.orig_start;
	}
	pos.saturating_add_signed(shift)
}

/// Map an exclusive match end in the working text back to the input
fn to_original_end(edits: &[Edit], pos: usize) -> usize {
	let mut shift = 0;
	for edit in edits {
		if pos <= edit.start {
			break;
		}
		if pos >= edit.end() {
			shift = edit.shift();
			continue;
		}
		return edit.orig_start + edit.orig_len;
	}
	pos.saturating_add_signed(shift)
}

/// Fold one pattern pass into the edit list, moving everything into the
/// coordinates of the rewritten text. Earlier edits swallowed by a new match
/// are dropped; the new edit already spans their input range.
fn merge_edits(previous: Vec<Edit>, pass: Vec<Edit>, replacement_len: usize) -> Vec<Edit> {
	let mut merged = Vec::with_capacity(previous.len() + pass.len());
	let mut previous = previous.into_iter().peekable();
	let mut delta: isize = 0;

	for new in pass {
		while let Some(edit) = previous.next_if(|e| e.end() <= new.start) {
			merged.push(Edit {
				start: edit.start.saturating_add_signed(delta),
				..edit
			});
		}
		while previous.next_if(|e| e.start < new.end()).is_some() {}
		merged.push(Edit {
			start: new.start.saturating_add_signed(delta),
			len: replacement_len,
			..new
		});
		delta += replacement_len as isize - new.len as isize;
	}
	merged.extend(previous.map(|edit| Edit {
		start: edit.start.saturating_add_signed(delta),
		..edit
	}));
	merged
}
