// Caller identity and trust tiers
//
// Every tool call is made on behalf of a caller at one of five ordered trust
// tiers. Policies gate tools by the minimum tier (or an explicit allow-list of
// tiers) the caller must hold.

use serde::{Deserialize, Serialize};

/// Trust tier of a caller, ordered from least to most trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityLevel {
	/// Throwaway identity scoped to a single connection
	Ephemeral,
	/// Identity persisted only on the caller's device
	Local,
	/// Server-issued anonymous id
	Anonymous,
	/// Stable pseudonym without verified credentials
	Pseudonymous,
	/// Fully authenticated user
	Authenticated,
}

impl IdentityLevel {
	/// All tiers in ascending order of trust.
	pub const ALL: [IdentityLevel; 5] = [
		IdentityLevel::Ephemeral,
		IdentityLevel::Local,
		IdentityLevel::Anonymous,
		IdentityLevel::Pseudonymous,
		IdentityLevel::Authenticated,
	];

	/// Position of this tier in the hierarchy (0 = ephemeral).
	pub fn index(self) -> usize {
		match self {
			IdentityLevel::Ephemeral => 0,
			IdentityLevel::Local => 1,
			IdentityLevel::Anonymous => 2,
			IdentityLevel::Pseudonymous => 3,
			IdentityLevel::Authenticated => 4,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			IdentityLevel::Ephemeral => "ephemeral",
			IdentityLevel::Local => "local",
			IdentityLevel::Anonymous => "anonymous",
			IdentityLevel::Pseudonymous => "pseudonymous",
			IdentityLevel::Authenticated => "authenticated",
		}
	}
}

impl std::fmt::Display for IdentityLevel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// True iff `actual` is at least as trusted as `required`.
pub fn meets_minimum(actual: IdentityLevel, required: IdentityLevel) -> bool {
	actual.index() >= required.index()
}

/// An explicit allow-list takes precedence over the minimum tier.
pub fn is_allowed_level(
	actual: IdentityLevel,
	allowed_levels: Option<&[IdentityLevel]>,
	min_level: IdentityLevel,
) -> bool {
	match allowed_levels {
		Some(levels) => levels.contains(&actual),
		None => meets_minimum(actual, min_level),
	}
}

/// Whether the user agreed to have session data persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentState {
	Accepted,
	Declined,
	#[default]
	Unknown,
}

/// Identity resolved by the auth layer for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIdentity {
	pub level: IdentityLevel,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub anonymous_id: Option<String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pseudonymous_id: Option<String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub consent: Option<ConsentState>,
}

impl ClientIdentity {
	pub fn new(level: IdentityLevel) -> Self {
		Self {
			level,
			anonymous_id: None,
			pseudonymous_id: None,
			user_id: None,
			consent: None,
		}
	}

	pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = Some(user_id.into());
		self
	}

	pub fn with_anonymous_id(mut self, id: impl Into<String>) -> Self {
		self.anonymous_id = Some(id.into());
		self
	}

	pub fn with_pseudonymous_id(mut self, id: impl Into<String>) -> Self {
		self.pseudonymous_id = Some(id.into());
		self
	}

	pub fn with_consent(mut self, consent: ConsentState) -> Self {
		self.consent = Some(consent);
		self
	}

	pub fn has_accepted_consent(&self) -> bool {
		self.consent == Some(ConsentState::Accepted)
	}

	/// Most specific identifier carried by this identity, if any.
	pub fn subject_id(&self) -> Option<&str> {
		self
			.user_id
			.as_deref()
			.or(self.pseudonymous_id.as_deref())
			.or(self.anonymous_id.as_deref())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[test]
	fn test_meets_minimum_matches_index_order() {
		for actual in IdentityLevel::ALL {
			for required in IdentityLevel::ALL {
				assert_eq!(
					meets_minimum(actual, required),
					actual.index() >= required.index(),
					"{actual} vs {required}"
				);
			}
		}
	}

	#[test]
	fn test_meets_minimum_reflexive_and_transitive() {
		for a in IdentityLevel::ALL {
			assert!(meets_minimum(a, a));
			for b in IdentityLevel::ALL {
				for c in IdentityLevel::ALL {
					if meets_minimum(a, b) && meets_minimum(b, c) {
						assert!(meets_minimum(a, c), "{a} >= {b} >= {c}");
					}
				}
			}
		}
	}

	#[rstest]
	#[case(IdentityLevel::Ephemeral, IdentityLevel::Authenticated, false)]
	#[case(IdentityLevel::Anonymous, IdentityLevel::Local, true)]
	#[case(IdentityLevel::Pseudonymous, IdentityLevel::Pseudonymous, true)]
	#[case(IdentityLevel::Local, IdentityLevel::Anonymous, false)]
	fn test_meets_minimum_cases(
		#[case] actual: IdentityLevel,
		#[case] required: IdentityLevel,
		#[case] expected: bool,
	) {
		assert_eq!(meets_minimum(actual, required), expected);
	}

	#[test]
	fn test_allowed_levels_override_minimum() {
		let allowed = [IdentityLevel::Ephemeral, IdentityLevel::Authenticated];
		assert!(is_allowed_level(
			IdentityLevel::Ephemeral,
			Some(&allowed),
			IdentityLevel::Authenticated
		));
		// Pseudonymous meets the minimum but is not in the list
		assert!(!is_allowed_level(
			IdentityLevel::Pseudonymous,
			Some(&allowed),
			IdentityLevel::Local
		));
		assert!(is_allowed_level(
			IdentityLevel::Pseudonymous,
			None,
			IdentityLevel::Local
		));
	}

	#[test]
	fn test_identity_deserialization() {
		let json = r#"{"level":"pseudonymous","pseudonymousId":"p-1","consent":"ACCEPTED"}"#;
		let identity: ClientIdentity = serde_json::from_str(json).unwrap();
		assert_eq!(identity.level, IdentityLevel::Pseudonymous);
		assert_eq!(identity.subject_id(), Some("p-1"));
		assert!(identity.has_accepted_consent());
	}

	#[test]
	fn test_subject_id_prefers_user_id() {
		let identity = ClientIdentity::new(IdentityLevel::Authenticated)
			.with_anonymous_id("a-1")
			.with_user_id("u-1");
		assert_eq!(identity.subject_id(), Some("u-1"));
		assert_eq!(ClientIdentity::new(IdentityLevel::Local).subject_id(), None);
	}
}
