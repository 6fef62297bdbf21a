use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use toolgate::builtin::register_builtin_tools;
use toolgate::gateway::LogSink;
use toolgate::{
	CallContext, ClientIdentity, Gateway, GatewayConfig, ToolCall, ToolCallResponse, telemetry,
};

#[derive(Parser)]
#[command(name = "toolgate", about = "Policy-gated tool execution over line-delimited JSON")]
struct Args {
	/// YAML gateway configuration
	#[arg(long)]
	config: Option<PathBuf>,

	/// Print the tool catalog as JSON and exit
	#[arg(long)]
	list_tools: bool,
}

/// One line of input
#[derive(Debug, Deserialize)]
struct Request {
	call: RequestCall,
	identity: ClientIdentity,
	#[serde(default)]
	session_id: Option<String>,
	#[serde(default)]
	client_ip: Option<String>,
}

/// Like [`ToolCall`], but the id may be omitted and is then generated
#[derive(Debug, Deserialize)]
struct RequestCall {
	#[serde(default)]
	id: Option<String>,
	name: String,
	#[serde(default)]
	args: toolgate::registry::ToolArgs,
	#[serde(default)]
	user: Option<String>,
}

impl From<RequestCall> for ToolCall {
	fn from(call: RequestCall) -> Self {
		ToolCall {
			id: call.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
			name: call.name,
			args: call.args,
			user: call.user,
		}
	}
}

/// Decode one input line. Undecodable lines still get a response, carrying
/// the call id when one can be recovered, so output stays paired with input.
fn parse_request(
	line: &str,
) -> Result<(ToolCall, ClientIdentity, CallContext), ToolCallResponse> {
	match serde_json::from_str::<Request>(line) {
		Ok(request) => {
			let ctx = CallContext {
				session_id: request.session_id,
				client_ip: request.client_ip,
				timeout: None,
			};
			Ok((request.call.into(), request.identity, ctx))
		},
		Err(e) => {
			let id = serde_json::from_str::<serde_json::Value>(line)
				.ok()
				.and_then(|v| v.pointer("/call/id").and_then(|id| id.as_str()).map(str::to_string))
				.unwrap_or_default();
			Err(ToolCallResponse::invalid_request(
				id,
				format!("invalid request: {e}"),
			))
		},
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	let config = match &args.config {
		Some(path) => GatewayConfig::from_file(path)
			.with_context(|| format!("loading config from {}", path.display()))?,
		None => GatewayConfig::default(),
	};
	telemetry::init(config.log_format)?;

	let gateway = Arc::new(Gateway::builder(config).sink(Arc::new(LogSink)).build());
	register_builtin_tools(&gateway)?;

	let mut stdout = tokio::io::stdout();
	if args.list_tools {
		let catalog = serde_json::to_string_pretty(&gateway.get_all_tool_definitions())?;
		stdout.write_all(catalog.as_bytes()).await?;
		stdout.write_all(b"\n").await?;
		return Ok(());
	}

	let maintenance = gateway.spawn_maintenance();
	tracing::info!(tools = ?gateway.list_available_tools(), "toolgate ready");

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	while let Some(line) = lines.next_line().await? {
		if line.trim().is_empty() {
			continue;
		}
		let response = match parse_request(&line) {
			Ok((call, identity, ctx)) => gateway.execute_with(call, &identity, ctx).await,
			Err(response) => {
				tracing::warn!(error = ?response.error, "rejecting malformed request");
				response
			},
		};
		let mut out = serde_json::to_vec(&response)?;
		out.push(b'\n');
		stdout.write_all(&out).await?;
		stdout.flush().await?;
	}

	maintenance.abort();
	tracing::info!("input closed, shutting down");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_matches::assert_matches;
	use toolgate::{ErrorCode, IdentityLevel};

	#[test]
	fn test_parse_request() {
		let line = r#"{"call": {"id": "c1", "name": "echo", "args": {"text": "hi"}},
			"identity": {"level": "anonymous"}, "session_id": "s1", "client_ip": "10.0.0.9"}"#;
		let (call, identity, ctx) = parse_request(line).unwrap();
		assert_eq!(call.id, "c1");
		assert_eq!(call.args["text"], "hi");
		assert_eq!(identity.level, IdentityLevel::Anonymous);
		assert_eq!(ctx.session_id.as_deref(), Some("s1"));
		assert_eq!(ctx.client_ip.as_deref(), Some("10.0.0.9"));
	}

	#[test]
	fn test_missing_call_id_is_generated() {
		let line = r#"{"call": {"name": "current_time"}, "identity": {"level": "ephemeral"}}"#;
		let (call, _, _) = parse_request(line).unwrap();
		assert!(uuid::Uuid::parse_str(&call.id).is_ok());
	}

	#[test]
	fn test_malformed_line_yields_error_response() {
		assert_matches!(parse_request("not json"), Err(response) => {
			assert!(!response.ok);
			assert_eq!(response.id, "");
			assert_eq!(response.code, Some(ErrorCode::InvalidRequest));
		});

		// Recoverable id is echoed back so callers can pair the reply
		let missing_identity = r#"{"call": {"id": "c9", "name": "echo"}}"#;
		assert_matches!(parse_request(missing_identity), Err(response) => {
			assert_eq!(response.id, "c9");
			assert!(response.error.unwrap().contains("identity"));
		});
	}
}
