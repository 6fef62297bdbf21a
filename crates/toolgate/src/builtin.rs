// Self-contained tools registered by the `toolgate` binary

use itertools::Itertools;

use crate::error::{HandlerError, RegistryError};
use crate::gateway::Gateway;
use crate::identity::IdentityLevel;
use crate::policy::{PiiHandling, ToolPolicy};
use crate::registry::{ToolArgs, ToolDefinition, handler_fn};

pub const ECHO: &str = "echo";
pub const CURRENT_TIME: &str = "current_time";
pub const LOOKUP_CONTACT: &str = "lookup_contact";

const CONTACT_LOOKUP_LIMIT: u32 = 5;

pub fn register_builtin_tools(gateway: &Gateway) -> Result<(), RegistryError> {
	gateway.register(
		ToolDefinition::new(
			ECHO,
			"Repeat the given text back to the caller",
			ToolPolicy::new(IdentityLevel::Anonymous).pii_handling(PiiHandling::Redact),
		)
		.with_parameters(serde_json::json!({
			"type": "object",
			"properties": {"text": {"type": "string"}},
			"required": ["text"]
		})),
		handler_fn(|args: ToolArgs| async move { echo(&args) }),
	)?;

	gateway.register(
		ToolDefinition::new(
			CURRENT_TIME,
			"Current UTC date and time",
			ToolPolicy::new(IdentityLevel::Ephemeral),
		),
		handler_fn(|_| async { Ok(current_time()) }),
	)?;

	gateway.register(
		ToolDefinition::new(
			LOOKUP_CONTACT,
			"Look up the contact card of a person by name",
			ToolPolicy::new(IdentityLevel::Authenticated)
				.pii_handling(PiiHandling::Redact)
				.max_calls_per_session(CONTACT_LOOKUP_LIMIT)
				.requires_consent(),
		)
		.with_parameters(serde_json::json!({
			"type": "object",
			"properties": {"name": {"type": "string"}},
			"required": ["name"]
		})),
		handler_fn(|args: ToolArgs| async move { lookup_contact(&args) }),
	)?;

	Ok(())
}

fn string_arg<'a>(args: &'a ToolArgs, key: &str) -> Result<&'a str, HandlerError> {
	args
		.get(key)
		.and_then(|v| v.as_str())
		.ok_or_else(|| HandlerError::InvalidArguments(format!("missing string argument '{key}'")))
}

fn echo(args: &ToolArgs) -> Result<serde_json::Value, HandlerError> {
	let text = string_arg(args, "text")?;
	Ok(serde_json::json!({ "text": text }))
}

fn current_time() -> serde_json::Value {
	let now = chrono::Utc::now();
	serde_json::json!({
		"utc": now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
		"unix": now.timestamp(),
	})
}

fn lookup_contact(args: &ToolArgs) -> Result<serde_json::Value, HandlerError> {
	let name = string_arg(args, "name")?.trim();
	if name.is_empty() {
		return Err(HandlerError::InvalidArguments("name must not be empty".to_string()));
	}
	let handle = name.to_lowercase().split_whitespace().join(".");
	Ok(serde_json::json!({
		"name": name,
		"email": format!("{handle}@example.com"),
		"phone": "555-010-4477",
		"summary": format!("{name} can be reached at {handle}@example.com or 555-010-4477"),
	}))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::GatewayConfig;
	use crate::error::ErrorCode;
	use crate::gateway::{CallContext, ToolCall};
	use crate::identity::{ClientIdentity, ConsentState};

	fn args(value: serde_json::Value) -> ToolArgs {
		match value {
			serde_json::Value::Object(map) => map,
			_ => ToolArgs::new(),
		}
	}

	fn gateway() -> Gateway {
		let gateway = Gateway::new(GatewayConfig::default());
		register_builtin_tools(&gateway).unwrap();
		gateway
	}

	#[test]
	fn test_registers_catalog() {
		let gateway = gateway();
		assert_eq!(
			gateway.list_available_tools(),
			vec![CURRENT_TIME.to_string(), ECHO.to_string(), LOOKUP_CONTACT.to_string()]
		);
	}

	#[tokio::test]
	async fn test_echo_redacts_pii() {
		let gateway = gateway();
		let call = ToolCall::new("1", ECHO, args(serde_json::json!({"text": "ssn 123-45-6789"})));
		let response = gateway
			.execute(call, &ClientIdentity::new(IdentityLevel::Anonymous))
			.await;
		assert!(response.ok);
		assert_eq!(response.result.unwrap()["text"], "ssn [SSN_REDACTED]");
	}

	#[tokio::test]
	async fn test_echo_requires_text() {
		let gateway = gateway();
		let response = gateway
			.execute(
				ToolCall::new("1", ECHO, ToolArgs::new()),
				&ClientIdentity::new(IdentityLevel::Anonymous),
			)
			.await;
		assert_eq!(response.code, Some(ErrorCode::HandlerError));
		assert!(response.error.unwrap().contains("text"));
	}

	#[tokio::test]
	async fn test_current_time_open_to_everyone() {
		let gateway = gateway();
		let response = gateway
			.execute(
				ToolCall::new("1", CURRENT_TIME, ToolArgs::new()),
				&ClientIdentity::new(IdentityLevel::Ephemeral),
			)
			.await;
		assert!(response.ok);
		assert!(response.result.unwrap()["utc"].as_str().unwrap().ends_with('Z'));
	}

	#[tokio::test]
	async fn test_lookup_contact_gates() {
		let gateway = gateway();
		let call = || ToolCall::new("1", LOOKUP_CONTACT, args(serde_json::json!({"name": "Jane Doe"})));

		let anonymous = ClientIdentity::new(IdentityLevel::Anonymous);
		let denied = gateway.execute(call(), &anonymous).await;
		assert_eq!(denied.code, Some(ErrorCode::InsufficientIdentityLevel));

		let no_consent = ClientIdentity::new(IdentityLevel::Authenticated).with_user_id("u1");
		let denied = gateway.execute(call(), &no_consent).await;
		assert_eq!(denied.code, Some(ErrorCode::ConsentRequired));

		let user = no_consent.with_consent(ConsentState::Accepted);
		let response = gateway.execute_with(call(), &user, CallContext::session("s1")).await;
		assert!(response.ok);
		let card = response.result.unwrap();
		assert_eq!(card["email"], "[EMAIL_REDACTED]");
		assert_eq!(card["phone"], "[PHONE_REDACTED]");
		assert_eq!(card["name"], "Jane Doe");
	}

	#[tokio::test]
	async fn test_lookup_contact_session_limit() {
		let gateway = gateway();
		let user = ClientIdentity::new(IdentityLevel::Authenticated)
			.with_user_id("u1")
			.with_consent(ConsentState::Accepted);
		for _ in 0..CONTACT_LOOKUP_LIMIT {
			let call = ToolCall::new("1", LOOKUP_CONTACT, args(serde_json::json!({"name": "Jane"})));
			assert!(gateway.execute_with(call, &user, CallContext::session("s1")).await.ok);
		}
		let call = ToolCall::new("1", LOOKUP_CONTACT, args(serde_json::json!({"name": "Jane"})));
		let response = gateway.execute_with(call, &user, CallContext::session("s1")).await;
		assert_eq!(response.code, Some(ErrorCode::SessionQuotaExceeded));
	}
}
