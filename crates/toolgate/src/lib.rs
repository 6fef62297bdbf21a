//! Policy-gated tool execution for conversational agents.
//!
//! [`Gateway`] is the single entry point: it looks a tool up in its
//! registry, checks the caller's identity, consent and session quota,
//! applies a per-caller rate limit, runs the handler under a deadline and
//! redacts or blocks PII in the result before returning it.

pub mod builtin;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod pii;
pub mod policy;
pub mod ratelimit;
pub mod registry;
pub mod session;
pub mod telemetry;

pub use config::GatewayConfig;
pub use error::{ErrorCode, HandlerError};
pub use gateway::{CallContext, Gateway, ToolCall, ToolCallResponse};
pub use identity::{ClientIdentity, ConsentState, IdentityLevel};
pub use policy::{PiiHandling, ToolPolicy};
pub use registry::{ToolDefinition, ToolHandler, handler_fn};
