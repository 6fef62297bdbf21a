// Tool registry
//
// Name -> (definition, handler) mapping shared by every request. Entries are
// stored behind Arc and swapped whole under the write lock, so readers never
// observe a partially-built entry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{HandlerError, RegistryError};
use crate::policy::ToolPolicy;

/// Arguments passed to a tool handler
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

/// Implementation behind a registered tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
	async fn invoke(&self, args: ToolArgs) -> Result<serde_json::Value, HandlerError>;
}

/// Adapts an async closure into a [`ToolHandler`]
pub struct FnHandler<F> {
	f: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
	F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
{
	async fn invoke(&self, args: ToolArgs) -> Result<serde_json::Value, HandlerError> {
		(self.f)(args).await
	}
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
	F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
{
	Arc::new(FnHandler { f })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
	pub name: String,
	pub description: String,
	/// JSON-Schema describing the arguments; opaque to the gateway
	#[serde(default = "empty_object_schema")]
	pub parameters_schema: serde_json::Value,
	#[serde(default)]
	pub policy: ToolPolicy,
}

fn empty_object_schema() -> serde_json::Value {
	serde_json::json!({"type": "object", "properties": {}})
}

impl ToolDefinition {
	pub fn new(name: impl Into<String>, description: impl Into<String>, policy: ToolPolicy) -> Self {
		Self {
			name: name.into(),
			description: description.into(),
			parameters_schema: empty_object_schema(),
			policy,
		}
	}

	pub fn with_parameters(mut self, schema: serde_json::Value) -> Self {
		self.parameters_schema = schema;
		self
	}

	pub fn summary(&self) -> ToolSummary {
		ToolSummary {
			name: self.name.clone(),
			description: self.description.clone(),
			parameters_schema: self.parameters_schema.clone(),
		}
	}
}

/// Catalog entry exposed to the agent's function-calling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSummary {
	pub name: String,
	pub description: String,
	pub parameters_schema: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStats {
	pub total_tools: usize,
	pub tool_names: Vec<String>,
}

pub struct RegisteredTool {
	pub definition: ToolDefinition,
	pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for RegisteredTool {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RegisteredTool")
			.field("definition", &self.definition)
			.finish_non_exhaustive()
	}
}

#[derive(Default)]
pub struct ToolRegistry {
	tools: RwLock<HashMap<String, Arc<RegisteredTool>>>,
}

impl std::fmt::Debug for ToolRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ToolRegistry")
			.field("tools", &self.names())
			.finish()
	}
}

impl ToolRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a tool. A later registration under the same name replaces the
	/// earlier one; the replaced entry is returned.
	pub fn register(
		&self,
		definition: ToolDefinition,
		handler: Arc<dyn ToolHandler>,
	) -> Result<Option<Arc<RegisteredTool>>, RegistryError> {
		if definition.name.trim().is_empty() {
			return Err(RegistryError::EmptyName);
		}
		let name = definition.name.clone();
		let entry = Arc::new(RegisteredTool {
			definition,
			handler,
		});
		let previous = self.tools.write().insert(name.clone(), entry);
		if previous.is_some() {
			tracing::warn!(tool = %name, "replaced existing tool registration");
		} else {
			tracing::info!(tool = %name, "registered tool");
		}
		Ok(previous)
	}

	pub fn remove(&self, name: &str) -> bool {
		let removed = self.tools.write().remove(name).is_some();
		if removed {
			tracing::info!(tool = %name, "removed tool");
		}
		removed
	}

	pub fn get(&self, name: &str) -> Option<Arc<RegisteredTool>> {
		self.tools.read().get(name).cloned()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.tools.read().contains_key(name)
	}

	/// Registered tool names, sorted
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<_> = self.tools.read().keys().cloned().collect();
		names.sort();
		names
	}

	/// Catalog summaries, sorted by name
	pub fn summaries(&self) -> Vec<ToolSummary> {
		let mut summaries: Vec<_> = self
			.tools
			.read()
			.values()
			.map(|t| t.definition.summary())
			.collect();
		summaries.sort_by(|a, b| a.name.cmp(&b.name));
		summaries
	}

	pub fn len(&self) -> usize {
		self.tools.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn stats(&self) -> ToolStats {
		let tool_names = self.names();
		ToolStats {
			total_tools: tool_names.len(),
			tool_names,
		}
	}
}
