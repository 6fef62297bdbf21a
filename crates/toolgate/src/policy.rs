// Tool policy evaluation
//
// Gates run in a fixed order and short-circuit on the first failure:
// 1. identity level (allow-list or minimum tier)
// 2. consent, when the tool requires it
// 3. per-session quota, reserved atomically on success
//
// External access never denies; it only tells the gateway to track the
// tool's health when its handler fails.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::identity::{ClientIdentity, IdentityLevel, is_allowed_level};
use crate::session::SessionCallCounters;

/// What happens to PII found in a tool's result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiHandling {
	/// Reject any result containing detected PII
	Block,
	/// Rewrite PII in result text before returning it
	#[default]
	Redact,
	/// Return results unchanged
	Allow,
}

/// Declarative rules attached to a tool at registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ToolPolicy {
	pub min_identity_level: IdentityLevel,

	/// When set, only these tiers may call the tool
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub allowed_levels: Option<Vec<IdentityLevel>>,

	#[serde(default)]
	pub requires_external_access: bool,

	#[serde(default)]
	pub pii_handling: PiiHandling,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_calls_per_session: Option<u32>,

	#[serde(default)]
	pub requires_consent: bool,
}

impl Default for ToolPolicy {
	fn default() -> Self {
		Self::new(IdentityLevel::Ephemeral)
	}
}

impl ToolPolicy {
	pub fn new(min_identity_level: IdentityLevel) -> Self {
		Self {
			min_identity_level,
			allowed_levels: None,
			requires_external_access: false,
			pii_handling: PiiHandling::default(),
			max_calls_per_session: None,
			requires_consent: false,
		}
	}

	pub fn allowed_levels(mut self, levels: impl Into<Vec<IdentityLevel>>) -> Self {
		self.allowed_levels = Some(levels.into());
		self
	}

	pub fn external_access(mut self) -> Self {
		self.requires_external_access = true;
		self
	}

	pub fn pii_handling(mut self, handling: PiiHandling) -> Self {
		self.pii_handling = handling;
		self
	}

	pub fn max_calls_per_session(mut self, max: u32) -> Self {
		self.max_calls_per_session = Some(max);
		self
	}

	pub fn requires_consent(mut self) -> Self {
		self.requires_consent = true;
		self
	}
}

/// Reason for denying a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyReason {
	pub code: ErrorCode,
	pub message: String,
}

impl DenyReason {
	fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
		}
	}
}

/// Instructions the gateway applies to an admitted call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDirectives {
	pub pii_handling: PiiHandling,
	pub track_health: bool,
	/// Whether a session quota slot was reserved for this call
	pub quota_reserved: bool,
}

impl PolicyDirectives {
	pub fn must_redact(&self) -> bool {
		self.pii_handling == PiiHandling::Redact
	}

	pub fn must_block_pii(&self) -> bool {
		self.pii_handling == PiiHandling::Block
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
	Allow(PolicyDirectives),
	Deny(DenyReason),
}

impl PolicyDecision {
	pub fn is_allow(&self) -> bool {
		matches!(self, PolicyDecision::Allow(_))
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ToolPolicyEvaluator;

impl ToolPolicyEvaluator {
	pub fn new() -> Self {
		Self
	}

	/// Evaluate `policy` for one call of `tool` in `session`.
	///
	/// On allow with a session quota, one slot is already taken from
	/// `counters`; the caller must release it if the call is abandoned.
	pub fn evaluate(
		&self,
		policy: &ToolPolicy,
		identity: &ClientIdentity,
		counters: &SessionCallCounters,
		session: &str,
		tool: &str,
	) -> PolicyDecision {
		if let Err(reason) = self.check_identity(policy, identity) {
			return PolicyDecision::Deny(reason);
		}
		if let Err(reason) = self.check_consent(policy, identity) {
			return PolicyDecision::Deny(reason);
		}

		let quota_reserved = match policy.max_calls_per_session {
			Some(max) => {
				if !counters.try_acquire(session, tool, Some(max)) {
					return PolicyDecision::Deny(DenyReason::new(
						ErrorCode::SessionQuotaExceeded,
						format!("tool '{tool}' allows at most {max} call(s) per session"),
					));
				}
				true
			},
			None => false,
		};

		PolicyDecision::Allow(PolicyDirectives {
			pii_handling: policy.pii_handling,
			track_health: policy.requires_external_access,
			quota_reserved,
		})
	}

	pub fn check_identity(
		&self,
		policy: &ToolPolicy,
		identity: &ClientIdentity,
	) -> Result<(), DenyReason> {
		if is_allowed_level(
			identity.level,
			policy.allowed_levels.as_deref(),
			policy.min_identity_level,
		) {
			return Ok(());
		}
		let message = match &policy.allowed_levels {
			Some(levels) => format!(
				"identity level '{}' is not one of [{}]",
				identity.level,
				levels.iter().map(|l| l.as_str()).join(", ")
			),
			None => format!(
				"identity level '{}' is below required '{}'",
				identity.level, policy.min_identity_level
			),
		};
		Err(DenyReason::new(ErrorCode::InsufficientIdentityLevel, message))
	}

	pub fn check_consent(
		&self,
		policy: &ToolPolicy,
		identity: &ClientIdentity,
	) -> Result<(), DenyReason> {
		if !policy.requires_consent || identity.has_accepted_consent() {
			return Ok(());
		}
		Err(DenyReason::new(
			ErrorCode::ConsentRequired,
			"tool requires accepted consent",
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::identity::ConsentState;
	use assert_matches::assert_matches;

	fn evaluate(policy: &ToolPolicy, identity: &ClientIdentity, counters: &SessionCallCounters) -> PolicyDecision {
		ToolPolicyEvaluator::new().evaluate(policy, identity, counters, "session-1", "calendar")
	}

	#[test]
	fn test_identity_gate_denies_low_tier() {
		let policy = ToolPolicy::new(IdentityLevel::Authenticated);
		let identity = ClientIdentity::new(IdentityLevel::Ephemeral);
		let decision = evaluate(&policy, &identity, &SessionCallCounters::new());
		assert_matches!(decision, PolicyDecision::Deny(reason) => {
			assert_eq!(reason.code, ErrorCode::InsufficientIdentityLevel);
			assert!(reason.message.contains("ephemeral"));
		});
	}

	#[test]
	fn test_allowed_levels_gate() {
		let policy = ToolPolicy::new(IdentityLevel::Ephemeral)
			.allowed_levels(vec![IdentityLevel::Pseudonymous]);
		let counters = SessionCallCounters::new();
		assert!(evaluate(&policy, &ClientIdentity::new(IdentityLevel::Pseudonymous), &counters).is_allow());
		assert_matches!(
			evaluate(&policy, &ClientIdentity::new(IdentityLevel::Authenticated), &counters),
			PolicyDecision::Deny(DenyReason { code: ErrorCode::InsufficientIdentityLevel, .. })
		);
	}

	#[test]
	fn test_consent_gate() {
		let policy = ToolPolicy::new(IdentityLevel::Anonymous).requires_consent();
		let counters = SessionCallCounters::new();

		for consent in [None, Some(ConsentState::Declined), Some(ConsentState::Unknown)] {
			let mut identity = ClientIdentity::new(IdentityLevel::Anonymous);
			identity.consent = consent;
			assert_matches!(
				evaluate(&policy, &identity, &counters),
				PolicyDecision::Deny(DenyReason { code: ErrorCode::ConsentRequired, .. })
			);
		}

		let identity = ClientIdentity::new(IdentityLevel::Anonymous).with_consent(ConsentState::Accepted);
		assert!(evaluate(&policy, &identity, &counters).is_allow());
	}

	#[test]
	fn test_identity_checked_before_consent() {
		let policy = ToolPolicy::new(IdentityLevel::Authenticated).requires_consent();
		let identity = ClientIdentity::new(IdentityLevel::Local);
		assert_matches!(
			evaluate(&policy, &identity, &SessionCallCounters::new()),
			PolicyDecision::Deny(DenyReason { code: ErrorCode::InsufficientIdentityLevel, .. })
		);
	}

	#[test]
	fn test_session_quota_gate() {
		let policy = ToolPolicy::new(IdentityLevel::Ephemeral).max_calls_per_session(2);
		let identity = ClientIdentity::new(IdentityLevel::Ephemeral);
		let counters = SessionCallCounters::new();

		assert_matches!(
			evaluate(&policy, &identity, &counters),
			PolicyDecision::Allow(PolicyDirectives { quota_reserved: true, .. })
		);
		assert!(evaluate(&policy, &identity, &counters).is_allow());
		assert_matches!(
			evaluate(&policy, &identity, &counters),
			PolicyDecision::Deny(DenyReason { code: ErrorCode::SessionQuotaExceeded, .. })
		);
		assert_eq!(counters.count("session-1", "calendar"), 2);
	}

	#[test]
	fn test_denied_identity_does_not_consume_quota() {
		let policy = ToolPolicy::new(IdentityLevel::Authenticated).max_calls_per_session(1);
		let counters = SessionCallCounters::new();
		let decision = evaluate(&policy, &ClientIdentity::new(IdentityLevel::Local), &counters);
		assert!(!decision.is_allow());
		assert_eq!(counters.count("session-1", "calendar"), 0);
	}

	#[test]
	fn test_directives_follow_policy() {
		let policy = ToolPolicy::new(IdentityLevel::Ephemeral)
			.pii_handling(PiiHandling::Block)
			.external_access();
		let decision = evaluate(
			&policy,
			&ClientIdentity::new(IdentityLevel::Ephemeral),
			&SessionCallCounters::new(),
		);
		assert_matches!(decision, PolicyDecision::Allow(directives) => {
			assert!(directives.must_block_pii());
			assert!(!directives.must_redact());
			assert!(directives.track_health);
			assert!(!directives.quota_reserved);
		});
	}

	#[test]
	fn test_policy_deserialization() {
		let yaml = r#"
minIdentityLevel: pseudonymous
piiHandling: block
maxCallsPerSession: 3
requiresConsent: true
"#;
		let policy: ToolPolicy = serde_yaml::from_str(yaml).unwrap();
		assert_eq!(policy.min_identity_level, IdentityLevel::Pseudonymous);
		assert_eq!(policy.pii_handling, PiiHandling::Block);
		assert_eq!(policy.max_calls_per_session, Some(3));
		assert!(policy.requires_consent);
		assert!(!policy.requires_external_access);
		assert!(policy.allowed_levels.is_none());
	}
}
