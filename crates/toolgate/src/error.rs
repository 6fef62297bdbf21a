use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stable error codes surfaced in `ToolCallResponse.code`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
	ToolNotFound,
	InsufficientIdentityLevel,
	ConsentRequired,
	SessionQuotaExceeded,
	RateLimitExceeded,
	HandlerError,
	HandlerTimeout,
	RedactionPolicyViolation,
	/// Input that could not be decoded into a tool call
	InvalidRequest,
}

impl ErrorCode {
	pub fn as_str(self) -> &'static str {
		match self {
			ErrorCode::ToolNotFound => "tool_not_found",
			ErrorCode::InsufficientIdentityLevel => "insufficient_identity_level",
			ErrorCode::ConsentRequired => "consent_required",
			ErrorCode::SessionQuotaExceeded => "session_quota_exceeded",
			ErrorCode::RateLimitExceeded => "rate_limit_exceeded",
			ErrorCode::HandlerError => "handler_error",
			ErrorCode::HandlerTimeout => "handler_timeout",
			ErrorCode::RedactionPolicyViolation => "redaction_policy_violation",
			ErrorCode::InvalidRequest => "invalid_request",
		}
	}

	/// HTTP status a boundary layer should answer with
	pub fn status(self) -> StatusCode {
		match self {
			ErrorCode::ToolNotFound => StatusCode::NOT_FOUND,
			ErrorCode::InsufficientIdentityLevel
			| ErrorCode::ConsentRequired
			| ErrorCode::RedactionPolicyViolation => StatusCode::FORBIDDEN,
			ErrorCode::SessionQuotaExceeded | ErrorCode::RateLimitExceeded => {
				StatusCode::TOO_MANY_REQUESTS
			},
			ErrorCode::HandlerError => StatusCode::BAD_GATEWAY,
			ErrorCode::HandlerTimeout => StatusCode::GATEWAY_TIMEOUT,
			ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
		}
	}
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Failure reported by a tool handler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
	#[error("{0}")]
	Failed(String),

	#[error("invalid arguments: {0}")]
	InvalidArguments(String),

	#[error("upstream service error: {0}")]
	Upstream(String),
}

impl HandlerError {
	pub fn failed(msg: impl Into<String>) -> Self {
		HandlerError::Failed(msg.into())
	}
}

impl From<anyhow::Error> for HandlerError {
	fn from(e: anyhow::Error) -> Self {
		HandlerError::Failed(e.to_string())
	}
}

/// Outcome of a handler run that did not produce a value
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
	#[error(transparent)]
	Handler(#[from] HandlerError),

	#[error("handler panicked: {0}")]
	Panicked(String),

	#[error("handler timed out after {0:?}")]
	Timeout(Duration),
}

impl InvokeError {
	pub fn code(&self) -> ErrorCode {
		match self {
			InvokeError::Handler(_) | InvokeError::Panicked(_) => ErrorCode::HandlerError,
			InvokeError::Timeout(_) => ErrorCode::HandlerTimeout,
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	#[error("tool name must not be empty")]
	EmptyName,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config: {0}")]
	Io(#[from] std::io::Error),

	#[error("failed to parse config: {0}")]
	Parse(#[from] serde_yaml::Error),

	#[error("invalid config: {0}")]
	Invalid(String),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_mapping() {
		assert_eq!(ErrorCode::ToolNotFound.status(), StatusCode::NOT_FOUND);
		assert_eq!(
			ErrorCode::InsufficientIdentityLevel.status(),
			StatusCode::FORBIDDEN
		);
		assert_eq!(
			ErrorCode::RateLimitExceeded.status(),
			StatusCode::TOO_MANY_REQUESTS
		);
		assert_eq!(ErrorCode::HandlerError.status(), StatusCode::BAD_GATEWAY);
		assert_eq!(ErrorCode::HandlerTimeout.status(), StatusCode::GATEWAY_TIMEOUT);
		assert_eq!(ErrorCode::InvalidRequest.status(), StatusCode::BAD_REQUEST);
	}

	#[test]
	fn test_code_wire_names() {
		let json = serde_json::to_string(&ErrorCode::SessionQuotaExceeded).unwrap();
		assert_eq!(json, "\"session_quota_exceeded\"");
		assert_eq!(
			ErrorCode::RedactionPolicyViolation.to_string(),
			"redaction_policy_violation"
		);
	}

	#[test]
	fn test_invoke_error_codes() {
		let e: InvokeError = HandlerError::failed("boom").into();
		assert_eq!(e.code(), ErrorCode::HandlerError);
		assert_eq!(e.to_string(), "boom");
		assert_eq!(
			InvokeError::Timeout(Duration::from_millis(5)).code(),
			ErrorCode::HandlerTimeout
		);
	}
}
