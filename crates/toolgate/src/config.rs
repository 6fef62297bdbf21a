use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pii::RedactionLevel;
use crate::ratelimit::RateLimitConfig;
use crate::telemetry::LogFormat;

/// Gateway configuration, usually loaded from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
	/// Which PII patterns the response redactor applies
	#[serde(default)]
	pub redaction_level: RedactionLevel,

	/// Default deadline for a tool handler
	#[serde(default = "default_handler_timeout_ms")]
	pub handler_timeout_ms: u64,

	/// Limiter applied to every admitted tool call
	#[serde(default = "RateLimitConfig::tool_calls")]
	pub tool_rate_limit: RateLimitConfig,

	/// Interval of the rate-limit and session sweep
	#[serde(default = "default_cleanup_interval_ms")]
	pub cleanup_interval_ms: u64,

	/// Session counters idle for this long are evicted
	#[serde(default = "default_session_idle_ttl_ms")]
	pub session_idle_ttl_ms: u64,

	#[serde(default)]
	pub log_format: LogFormat,
}

fn default_handler_timeout_ms() -> u64 {
	30_000
}

fn default_cleanup_interval_ms() -> u64 {
	5 * 60 * 1000
}

fn default_session_idle_ttl_ms() -> u64 {
	60 * 60 * 1000
}

impl Default for GatewayConfig {
	fn default() -> Self {
		Self {
			redaction_level: RedactionLevel::default(),
			handler_timeout_ms: default_handler_timeout_ms(),
			tool_rate_limit: RateLimitConfig::tool_calls(),
			cleanup_interval_ms: default_cleanup_interval_ms(),
			session_idle_ttl_ms: default_session_idle_ttl_ms(),
			log_format: LogFormat::default(),
		}
	}
}

impl GatewayConfig {
	pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
		let config: GatewayConfig = serde_yaml::from_str(yaml)?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let contents = fs_err::read_to_string(path.as_ref())?;
		Self::from_yaml(&contents)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.tool_rate_limit.window_ms == 0 {
			return Err(ConfigError::Invalid(
				"tool_rate_limit.window_ms must be greater than zero".to_string(),
			));
		}
		if self.tool_rate_limit.max_requests == 0 {
			return Err(ConfigError::Invalid(
				"tool_rate_limit.max_requests must be greater than zero".to_string(),
			));
		}
		if self.handler_timeout_ms == 0 {
			return Err(ConfigError::Invalid(
				"handler_timeout_ms must be greater than zero".to_string(),
			));
		}
		if self.cleanup_interval_ms == 0 {
			return Err(ConfigError::Invalid(
				"cleanup_interval_ms must be greater than zero".to_string(),
			));
		}
		Ok(())
	}

	pub fn handler_timeout(&self) -> Duration {
		Duration::from_millis(self.handler_timeout_ms)
	}

	pub fn cleanup_interval(&self) -> Duration {
		Duration::from_millis(self.cleanup_interval_ms)
	}

	pub fn session_idle_ttl(&self) -> Duration {
		Duration::from_millis(self.session_idle_ttl_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_matches::assert_matches;
	use std::io::Write;

	#[test]
	fn test_config_deserialization() {
		let yaml = r#"
redaction_level: basic
handler_timeout_ms: 5000
tool_rate_limit:
  window_ms: 1000
  max_requests: 3
log_format: json
"#;
		let config = GatewayConfig::from_yaml(yaml).unwrap();
		assert_eq!(config.redaction_level, RedactionLevel::Basic);
		assert_eq!(config.handler_timeout(), Duration::from_secs(5));
		assert_eq!(config.tool_rate_limit, RateLimitConfig::new(1000, 3));
		assert_eq!(config.log_format, LogFormat::Json);
		// Unset fields fall back to defaults
		assert_eq!(config.cleanup_interval(), Duration::from_secs(300));
	}

	#[test]
	fn test_default_config() {
		let config = GatewayConfig::default();
		assert_eq!(config.redaction_level, RedactionLevel::Strict);
		assert_eq!(config.tool_rate_limit, RateLimitConfig::tool_calls());
		assert_eq!(config.handler_timeout_ms, 30_000);
		assert!(config.validate().is_ok());
		assert_eq!(GatewayConfig::from_yaml("{}").unwrap(), config);
	}

	#[test]
	fn test_rejects_unknown_fields() {
		assert_matches!(
			GatewayConfig::from_yaml("redaction: strict"),
			Err(ConfigError::Parse(_))
		);
	}

	#[test]
	fn test_rejects_zero_limits() {
		let yaml = r#"
tool_rate_limit:
  window_ms: 1000
  max_requests: 0
"#;
		assert_matches!(GatewayConfig::from_yaml(yaml), Err(ConfigError::Invalid(_)));
		assert_matches!(
			GatewayConfig::from_yaml("handler_timeout_ms: 0"),
			Err(ConfigError::Invalid(_))
		);
	}

	#[test]
	fn test_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "redaction_level: none").unwrap();
		let config = GatewayConfig::from_file(file.path()).unwrap();
		assert_eq!(config.redaction_level, RedactionLevel::None);

		assert_matches!(
			GatewayConfig::from_file("/definitely/not/here.yaml"),
			Err(ConfigError::Io(_))
		);
	}
}
