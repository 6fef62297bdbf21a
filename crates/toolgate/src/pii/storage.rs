// Storage redaction
//
// A deliberately cruder pass than the pattern engine, applied to transcript
// and tool-event text before it is written to persistent storage:
// - phone-number-like digit runs are masked, never across a line break
// - on lines that mention an address keyword and contain a digit, every digit
//   is blanked
//
// This protects at-rest data and stays separate from the response-side engine.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

pub const PHONE_MASK: &str = "[REDACTED_PHONE]";
pub const DIGIT_MASK: char = '#';

static PHONE_LIKE: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"\+?\d[\d \t().-]{7,}\d").unwrap_or_else(|e| panic!("invalid phone pattern: {e}"))
});

static ADDRESS_HINT: Lazy<Regex> = Lazy::new(|| {
	Regex::new(
		r"(?i)\b(?:street|st|road|rd|avenue|ave|boulevard|blvd|lane|ln|drive|dr|suite|ste|apt|apartment|unit|floor|fl)\b",
	)
	.unwrap_or_else(|e| panic!("invalid address hint pattern: {e}"))
});

pub fn redact_for_storage(text: &str) -> String {
	let masked = PHONE_LIKE.replace_all(text, PHONE_MASK);
	if !ADDRESS_HINT.is_match(&masked) {
		return masked.into_owned();
	}

	masked
		.split_inclusive('\n')
		.map(|line| {
			if ADDRESS_HINT.is_match(line) && line.chars().any(|c| c.is_ascii_digit()) {
				Cow::Owned(blank_digits(line))
			} else {
				Cow::Borrowed(line)
			}
		})
		.collect()
}

fn blank_digits(line: &str) -> String {
	line
		.chars()
		.map(|c| if c.is_ascii_digit() { DIGIT_MASK } else { c })
		.collect()
}

/// Apply [`redact_for_storage`] to every string inside a JSON value.
pub fn redact_json_for_storage(value: &mut serde_json::Value) {
	match value {
		serde_json::Value::String(s) => *s = redact_for_storage(s),
		serde_json::Value::Array(arr) => arr.iter_mut().for_each(redact_json_for_storage),
		serde_json::Value::Object(obj) => obj.values_mut().for_each(redact_json_for_storage),
		_ => {},
	}
}
