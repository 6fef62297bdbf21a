// Tool Execution Gateway
//
// Sole entry point for invoking a named tool. Each call is routed through:
// - registry lookup
// - policy evaluation (identity, consent, session quota)
// - rate limiting, scoped to the caller
// - handler invocation under a deadline, with panics contained
// - result redaction or blocking per the tool's PII handling
// - best-effort persistence of a storage-redacted tool event
//
// Every failure is reported as a structured `ok: false` response; nothing a
// tool or caller does can take the gateway down.

use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use http::StatusCode;
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::GatewayConfig;
use crate::error::{ErrorCode, InvokeError, RegistryError};
use crate::identity::ClientIdentity;
use crate::pii::PiiRedactionEngine;
use crate::pii::storage::redact_json_for_storage;
use crate::policy::{PiiHandling, PolicyDecision, PolicyDirectives, ToolPolicyEvaluator};
use crate::ratelimit::{RateLimitDecision, RateLimiter};
use crate::registry::{
	RegisteredTool, ToolArgs, ToolDefinition, ToolHandler, ToolRegistry, ToolStats, ToolSummary,
};
use crate::session::SessionCallCounters;

/// Consecutive failures after which an external tool is reported unhealthy
const UNHEALTHY_AFTER_FAILURES: u32 = 3;

/// One invocation request from the agent runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
	pub id: String,
	pub name: String,
	#[serde(default)]
	pub args: ToolArgs,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<String>,
}

impl ToolCall {
	pub fn new(id: impl Into<String>, name: impl Into<String>, args: ToolArgs) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			args,
			user: None,
		}
	}
}

/// Quota metadata surfaced to the caller (maps to rate-limit headers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
	pub limit: u32,
	pub remaining: u32,
	pub reset_after_ms: u64,
}

impl From<&RateLimitDecision> for RateLimitInfo {
	fn from(decision: &RateLimitDecision) -> Self {
		Self {
			limit: decision.limit,
			remaining: decision.remaining,
			reset_after_ms: decision.reset_after().as_millis() as u64,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResponse {
	pub id: String,
	pub ok: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<serde_json::Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<ErrorCode>,
	/// Registered tool names, set when the requested tool does not exist
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub available: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rate_limit: Option<RateLimitInfo>,
}

impl ToolCallResponse {
	fn success(id: String, result: serde_json::Value, rate_limit: RateLimitInfo) -> Self {
		Self {
			id,
			ok: true,
			result: Some(result),
			error: None,
			code: None,
			available: None,
			rate_limit: Some(rate_limit),
		}
	}

	/// Response for input that never became a [`ToolCall`]
	pub fn invalid_request(id: impl Into<String>, error: impl Into<String>) -> Self {
		Self::failure(id.into(), ErrorCode::InvalidRequest, error)
	}

	fn failure(id: String, code: ErrorCode, error: impl Into<String>) -> Self {
		Self {
			id,
			ok: false,
			result: None,
			error: Some(error.into()),
			code: Some(code),
			available: None,
			rate_limit: None,
		}
	}

	/// HTTP status a boundary layer should use for this response
	pub fn status(&self) -> StatusCode {
		match self.code {
			Some(code) if !self.ok => code.status(),
			_ => StatusCode::OK,
		}
	}
}

/// Per-request inputs that do not belong to the call itself
#[derive(Debug, Clone, Default)]
pub struct CallContext {
	pub session_id: Option<String>,
	pub client_ip: Option<String>,
	/// Overrides the configured handler deadline
	pub timeout: Option<Duration>,
}

impl CallContext {
	pub fn session(session_id: impl Into<String>) -> Self {
		Self {
			session_id: Some(session_id.into()),
			..Default::default()
		}
	}

	pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
		self.client_ip = Some(ip.into());
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}
}

/// Record handed to the persistence layer after a successful call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEvent {
	pub name: String,
	pub args: serde_json::Value,
	pub result: serde_json::Value,
}

#[async_trait]
pub trait ToolEventSink: Send + Sync {
	async fn append_tool_event(&self, session_id: &str, event: ToolEvent) -> anyhow::Result<()>;
}

/// Discards every event
#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl ToolEventSink for NoopSink {
	async fn append_tool_event(&self, _session_id: &str, _event: ToolEvent) -> anyhow::Result<()> {
		Ok(())
	}
}

/// Emits each event as a structured log record under the `toolgate::events`
/// target instead of storing it
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl ToolEventSink for LogSink {
	async fn append_tool_event(&self, session_id: &str, event: ToolEvent) -> anyhow::Result<()> {
		let args = serde_json::to_string(&event.args)?;
		let result = serde_json::to_string(&event.result)?;
		tracing::info!(
			target: "toolgate::events",
			session = %session_id,
			tool = %event.name,
			args = %args,
			result = %result,
			"tool event"
		);
		Ok(())
	}
}

/// Keeps events in memory; unbounded, meant for tests and short-lived hosts
#[derive(Debug, Default)]
pub struct MemorySink {
	events: Mutex<Vec<(String, ToolEvent)>>,
}

impl MemorySink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<(String, ToolEvent)> {
		self.events.lock().clone()
	}
}

#[async_trait]
impl ToolEventSink for MemorySink {
	async fn append_tool_event(&self, session_id: &str, event: ToolEvent) -> anyhow::Result<()> {
		self.events.lock().push((session_id.to_string(), event));
		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolHealth {
	Healthy,
	Degraded,
	Unhealthy,
}

pub struct GatewayBuilder {
	config: GatewayConfig,
	rate_limiter: Option<Arc<RateLimiter>>,
	redactor: Option<PiiRedactionEngine>,
	sink: Option<Arc<dyn ToolEventSink>>,
}

impl GatewayBuilder {
	pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
		self.rate_limiter = Some(limiter);
		self
	}

	/// Replace the engine derived from `redaction_level`
	pub fn redactor(mut self, engine: PiiRedactionEngine) -> Self {
		self.redactor = Some(engine);
		self
	}

	pub fn sink(mut self, sink: Arc<dyn ToolEventSink>) -> Self {
		self.sink = Some(sink);
		self
	}

	pub fn build(self) -> Gateway {
		let redactor = self
			.redactor
			.unwrap_or_else(|| PiiRedactionEngine::for_level(self.config.redaction_level));
		Gateway {
			registry: ToolRegistry::new(),
			evaluator: ToolPolicyEvaluator::new(),
			rate_limiter: self.rate_limiter.unwrap_or_default(),
			counters: SessionCallCounters::new(),
			redactor: RwLock::new(redactor),
			sink: self.sink.unwrap_or_else(|| Arc::new(NoopSink)),
			health: Mutex::new(HashMap::new()),
			config: self.config,
		}
	}
}

pub struct Gateway {
	config: GatewayConfig,
	registry: ToolRegistry,
	evaluator: ToolPolicyEvaluator,
	rate_limiter: Arc<RateLimiter>,
	counters: SessionCallCounters,
	redactor: RwLock<PiiRedactionEngine>,
	sink: Arc<dyn ToolEventSink>,
	/// Consecutive handler failures of tools that require external access
	health: Mutex<HashMap<String, u32>>,
}

impl std::fmt::Debug for Gateway {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Gateway")
			.field("config", &self.config)
			.field("registry", &self.registry)
			.field("rate_limiter", &self.rate_limiter)
			.finish_non_exhaustive()
	}
}

impl Gateway {
	pub fn builder(config: GatewayConfig) -> GatewayBuilder {
		GatewayBuilder {
			config,
			rate_limiter: None,
			redactor: None,
			sink: None,
		}
	}

	pub fn new(config: GatewayConfig) -> Self {
		Self::builder(config).build()
	}

	pub fn config(&self) -> &GatewayConfig {
		&self.config
	}

	pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
		&self.rate_limiter
	}

	pub fn session_counters(&self) -> &SessionCallCounters {
		&self.counters
	}

	// ------------------------------------------------------------------
	// Catalog administration
	// ------------------------------------------------------------------

	pub fn register(
		&self,
		definition: ToolDefinition,
		handler: Arc<dyn ToolHandler>,
	) -> Result<(), RegistryError> {
		self.registry.register(definition, handler).map(|_| ())
	}

	/// Register a tool at runtime, outside the startup catalog
	pub fn add_custom_tool(
		&self,
		definition: ToolDefinition,
		handler: Arc<dyn ToolHandler>,
	) -> Result<(), RegistryError> {
		tracing::info!(tool = %definition.name, "adding custom tool");
		self.register(definition, handler)
	}

	pub fn remove_tool(&self, name: &str) -> bool {
		let removed = self.registry.remove(name);
		if removed {
			self.health.lock().remove(name);
		}
		removed
	}

	pub fn list_available_tools(&self) -> Vec<String> {
		self.registry.names()
	}

	pub fn get_tool_stats(&self) -> ToolStats {
		self.registry.stats()
	}

	pub fn get_all_tool_definitions(&self) -> Vec<ToolSummary> {
		self.registry.summaries()
	}

	/// Health of a tool's upstream dependency. Tools without external access
	/// are always healthy; unknown tools have no health.
	pub fn tool_health(&self, name: &str) -> Option<ToolHealth> {
		let tool = self.registry.get(name)?;
		if !tool.definition.policy.requires_external_access {
			return Some(ToolHealth::Healthy);
		}
		let failures = self.health.lock().get(name).copied().unwrap_or(0);
		Some(match failures {
			0 => ToolHealth::Healthy,
			n if n < UNHEALTHY_AFTER_FAILURES => ToolHealth::Degraded,
			_ => ToolHealth::Unhealthy,
		})
	}

	/// Mutate the response redaction engine, e.g. to add a pattern
	pub fn update_redactor<R>(&self, f: impl FnOnce(&mut PiiRedactionEngine) -> R) -> R {
		f(&mut self.redactor.write())
	}

	/// Forget all per-session counters of `session_id`
	pub fn evict_session(&self, session_id: &str) -> bool {
		self.counters.evict(session_id)
	}

	// ------------------------------------------------------------------
	// Execution
	// ------------------------------------------------------------------

	/// Rate-limit key for a caller: user id, then client IP, then any other id
	pub fn rate_limit_key(identity: &ClientIdentity, ctx: &CallContext) -> String {
		let scope = identity
			.user_id
			.as_deref()
			.or(ctx.client_ip.as_deref())
			.or(identity.subject_id())
			.unwrap_or("unknown");
		format!("tools:{scope}")
	}

	fn session_key(call: &ToolCall, identity: &ClientIdentity, ctx: &CallContext) -> String {
		ctx
			.session_id
			.as_deref()
			.or(identity.subject_id())
			.or(call.user.as_deref())
			.unwrap_or("anonymous")
			.to_string()
	}

	pub async fn execute(&self, call: ToolCall, identity: &ClientIdentity) -> ToolCallResponse {
		self.execute_with(call, identity, CallContext::default()).await
	}

	pub async fn execute_with(
		&self,
		call: ToolCall,
		identity: &ClientIdentity,
		ctx: CallContext,
	) -> ToolCallResponse {
		let span = tracing::info_span!(
			"tool_call",
			correlation_id = %call.id,
			tool = %call.name,
			level = %identity.level,
		);
		self.execute_inner(call, identity, ctx).instrument(span).await
	}

	async fn execute_inner(
		&self,
		call: ToolCall,
		identity: &ClientIdentity,
		ctx: CallContext,
	) -> ToolCallResponse {
		let Some(tool) = self.registry.get(&call.name) else {
			let available = self.registry.names();
			tracing::info!(decision = "not_found", "tool call for unknown tool");
			let mut response = ToolCallResponse::failure(
				call.id,
				ErrorCode::ToolNotFound,
				format!(
					"tool not found: '{}'. Available tools: [{}]",
					call.name,
					available.iter().join(", ")
				),
			);
			response.available = Some(available);
			return response;
		};

		let session = Self::session_key(&call, identity, &ctx);
		let directives = match self.evaluator.evaluate(
			&tool.definition.policy,
			identity,
			&self.counters,
			&session,
			&call.name,
		) {
			PolicyDecision::Allow(directives) => directives,
			PolicyDecision::Deny(reason) => {
				tracing::info!(
					decision = "deny",
					session = %session,
					code = %reason.code,
					reason = %reason.message,
					"tool call denied by policy"
				);
				return ToolCallResponse::failure(
					call.id,
					reason.code,
					format!("{}: {}", reason.code, reason.message),
				);
			},
		};

		let rate_key = Self::rate_limit_key(identity, &ctx);
		let rate = self
			.rate_limiter
			.check(&rate_key, &self.config.tool_rate_limit);
		if !rate.allowed {
			if directives.quota_reserved {
				self.counters.release(&session, &call.name);
			}
			tracing::info!(
				decision = "rate_limited",
				session = %session,
				key = %rate_key,
				reset_after_ms = rate.reset_after().as_millis() as u64,
				"tool call rate limited"
			);
			let mut response = ToolCallResponse::failure(
				call.id,
				ErrorCode::RateLimitExceeded,
				ErrorCode::RateLimitExceeded.as_str(),
			);
			response.rate_limit = Some(RateLimitInfo::from(&rate));
			return response;
		}

		let timeout = ctx.timeout.unwrap_or_else(|| self.config.handler_timeout());
		tracing::debug!(
			session = %session,
			arg_keys = ?call.args.keys().collect::<Vec<_>>(),
			timeout_ms = timeout.as_millis() as u64,
			"invoking tool handler"
		);
		let outcome = invoke_handler(&tool, call.args.clone(), timeout).await;
		if directives.track_health {
			self.record_health(&call.name, outcome.is_ok());
		}

		let result = match outcome {
			Ok(result) => result,
			Err(e) => {
				let decision = match e {
					InvokeError::Timeout(_) => "handler_timeout",
					_ => "handler_error",
				};
				tracing::warn!(
					decision,
					session = %session,
					external = directives.track_health,
					error = %e,
					"tool handler failed"
				);
				return ToolCallResponse::failure(call.id, e.code(), e.to_string());
			},
		};

		let result = match self.apply_pii_directive(result, &directives) {
			Ok(result) => result,
			Err(types) => {
				tracing::warn!(
					decision = "blocked",
					session = %session,
					types = ?types,
					"tool result blocked for containing PII"
				);
				return ToolCallResponse::failure(
					call.id,
					ErrorCode::RedactionPolicyViolation,
					format!(
						"{}: result contains PII ({})",
						ErrorCode::RedactionPolicyViolation,
						types.iter().join(", ")
					),
				);
			},
		};

		tracing::info!(decision = "allow", session = %session, "tool call completed");

		if identity.has_accepted_consent() {
			self.persist_event(&session, &call.name, call.args, &result).await;
		}

		ToolCallResponse::success(call.id, result, RateLimitInfo::from(&rate))
	}

	/// Returns the (possibly rewritten) result, or the PII types that caused
	/// a blocking policy to reject it.
	fn apply_pii_directive(
		&self,
		mut result: serde_json::Value,
		directives: &PolicyDirectives,
	) -> Result<serde_json::Value, BTreeSet<String>> {
		let redactor = self.redactor.read();
		match directives.pii_handling {
			PiiHandling::Allow => Ok(result),
			PiiHandling::Redact => {
				let count = redactor.redact_json(&mut result);
				if count > 0 {
					tracing::debug!(redactions = count, "redacted tool result");
				}
				Ok(result)
			},
			PiiHandling::Block => {
				if !redactor.json_contains_pii(&result) {
					return Ok(result);
				}
				Err(redactor.json_pii_types(&result))
			},
		}
	}

	async fn persist_event(
		&self,
		session: &str,
		name: &str,
		args: ToolArgs,
		result: &serde_json::Value,
	) {
		let mut event = ToolEvent {
			name: name.to_string(),
			args: serde_json::Value::Object(args),
			result: result.clone(),
		};
		redact_json_for_storage(&mut event.args);
		redact_json_for_storage(&mut event.result);

		if let Err(e) = self.sink.append_tool_event(session, event).await {
			tracing::warn!(session = %session, error = %e, "failed to persist tool event");
		}
	}

	fn record_health(&self, name: &str, success: bool) {
		let mut health = self.health.lock();
		if success {
			health.remove(name);
		} else {
			*health.entry(name.to_string()).or_insert(0) += 1;
		}
	}

	/// Periodically sweep expired rate-limit entries and idle sessions until
	/// the gateway is dropped.
	pub fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
		let weak: Weak<Self> = Arc::downgrade(self);
		let interval = self.config.cleanup_interval();
		let idle_ttl = self.config.session_idle_ttl();
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			ticker.tick().await;
			loop {
				ticker.tick().await;
				let Some(gateway) = weak.upgrade() else {
					break;
				};
				let expired = gateway.rate_limiter.cleanup();
				let evicted = gateway.counters.evict_idle(idle_ttl);
				tracing::debug!(expired, evicted, "gateway maintenance sweep");
			}
		})
	}
}

async fn invoke_handler(
	tool: &RegisteredTool,
	args: ToolArgs,
	timeout: Duration,
) -> Result<serde_json::Value, InvokeError> {
	let invocation = AssertUnwindSafe(tool.handler.invoke(args)).catch_unwind();
	match tokio::time::timeout(timeout, invocation).await {
		Err(_) => Err(InvokeError::Timeout(timeout)),
		Ok(Err(panic)) => Err(InvokeError::Panicked(panic_message(panic.as_ref()))),
		Ok(Ok(result)) => result.map_err(InvokeError::from),
	}
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
	if let Some(s) = panic.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = panic.downcast_ref::<String>() {
		s.clone()
	} else {
		"unknown panic".to_string()
	}
}
