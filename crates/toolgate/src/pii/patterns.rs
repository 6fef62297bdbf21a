// Built-in PII pattern catalog
//
// Catalog order matters: the engine applies patterns in this order, and the
// "basic" redaction level takes only the first three entries.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// PII categories recognized by the built-in catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
	/// Email addresses (e.g., user@example.com)
	Email,
	/// North American phone numbers, optionally with +1 prefix
	#[serde(alias = "phone_number")]
	Phone,
	/// 16-digit card numbers in groups of four
	CreditCard,
	/// US Social Security Numbers (###-##-####)
	Ssn,
	/// Dotted-quad IPv4 addresses
	IpAddress,
	/// House number followed by a street-type word
	Address,
	/// US ZIP and ZIP+4 codes
	ZipCode,
}

impl PiiType {
	/// All built-in types in catalog order
	pub fn all() -> Vec<PiiType> {
		vec![
			PiiType::Email,
			PiiType::Phone,
			PiiType::CreditCard,
			PiiType::Ssn,
			PiiType::IpAddress,
			PiiType::Address,
			PiiType::ZipCode,
		]
	}

	pub fn name(self) -> &'static str {
		match self {
			PiiType::Email => "email",
			PiiType::Phone => "phone",
			PiiType::CreditCard => "credit_card",
			PiiType::Ssn => "ssn",
			PiiType::IpAddress => "ip_address",
			PiiType::Address => "address",
			PiiType::ZipCode => "zip_code",
		}
	}

	pub fn replacement(self) -> &'static str {
		match self {
			PiiType::Email => "[EMAIL_REDACTED]",
			PiiType::Phone => "[PHONE_REDACTED]",
			PiiType::CreditCard => "[CREDIT_CARD_REDACTED]",
			PiiType::Ssn => "[SSN_REDACTED]",
			PiiType::IpAddress => "[IP_REDACTED]",
			PiiType::Address => "[ADDRESS_REDACTED]",
			PiiType::ZipCode => "[ZIP_REDACTED]",
		}
	}

	pub fn description(self) -> &'static str {
		match self {
			PiiType::Email => "Email addresses",
			PiiType::Phone => "Phone numbers",
			PiiType::CreditCard => "Credit card numbers",
			PiiType::Ssn => "Social Security Numbers",
			PiiType::IpAddress => "IPv4 addresses",
			PiiType::Address => "Street addresses",
			PiiType::ZipCode => "ZIP codes",
		}
	}

	pub fn regex(self) -> &'static Regex {
		match self {
			PiiType::Email => &EMAIL,
			PiiType::Phone => &PHONE,
			PiiType::CreditCard => &CREDIT_CARD,
			PiiType::Ssn => &SSN,
			PiiType::IpAddress => &IP_ADDRESS,
			PiiType::Address => &ADDRESS,
			PiiType::ZipCode => &ZIP_CODE,
		}
	}
}

// Compiled once; the expressions are constants so compilation cannot fail.
fn compile(pattern: &str) -> Regex {
	Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in PII pattern {pattern}: {e}"))
}

static EMAIL: Lazy<Regex> = Lazy::new(|| compile(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"));

static PHONE: Lazy<Regex> =
	Lazy::new(|| compile(r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)|\b\d{3})[-.\s]?\d{3}[-.\s]?\d{4}\b"));

static CREDIT_CARD: Lazy<Regex> =
	Lazy::new(|| compile(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b"));

static SSN: Lazy<Regex> = Lazy::new(|| compile(r"\b\d{3}-\d{2}-\d{4}\b"));

static IP_ADDRESS: Lazy<Regex> = Lazy::new(|| compile(r"\b(?:\d{1,3}\.){3}\d{1,3}\b"));

static ADDRESS: Lazy<Regex> = Lazy::new(|| {
	compile(
		r"\b\d+\s+(?:[A-Za-z]+\s+){1,3}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Way)\b",
	)
});

static ZIP_CODE: Lazy<Regex> = Lazy::new(|| compile(r"\b\d{5}(?:-\d{4})?\b"));

/// One entry of a redaction engine's pattern list
#[derive(Debug, Clone)]
pub struct PiiPattern {
	pub name: String,
	pub regex: Regex,
	pub replacement: String,
	pub description: String,
}

impl PiiPattern {
	pub fn new(
		name: impl Into<String>,
		regex: Regex,
		replacement: impl Into<String>,
		description: impl Into<String>,
	) -> Self {
		Self {
			name: name.into(),
			regex,
			replacement: replacement.into(),
			description: description.into(),
		}
	}

	/// Build a pattern from a user-supplied expression
	pub fn custom(
		name: impl Into<String>,
		pattern: &str,
		replacement: impl Into<String>,
		description: impl Into<String>,
	) -> Result<Self, regex::Error> {
		Ok(Self::new(name, Regex::new(pattern)?, replacement, description))
	}

	pub fn builtin(pii_type: PiiType) -> Self {
		Self::new(
			pii_type.name(),
			pii_type.regex().clone(),
			pii_type.replacement(),
			pii_type.description(),
		)
	}
}

/// The full built-in catalog in application order
pub fn catalog() -> Vec<PiiPattern> {
	PiiType::all().into_iter().map(PiiPattern::builtin).collect()
}
