//! Tool registry
//!
//! Ordered set of tools the orchestrator can dispatch through. Registration
//! order is preserved so the catalogue renders deterministically.

use std::sync::Arc;

use duplex_core::{ToolCall, ToolDescriptor};
use tracing::warn;

use crate::{Tool, ToolError, ToolOutcome};

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with a duplicate name replaces the earlier
    /// registration.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            warn!(name = tool.name(), "replacing previously registered tool");
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// Wire-facing catalogue of every registered tool, in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|tool| tool.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke the named tool with the call's JSON arguments.
    ///
    /// Unknown tool names are an error; execution failures are not — they
    /// come back as a `ToolOutcome` carrying the failure text.
    pub async fn invoke(&self, call: &ToolCall) -> Result<ToolOutcome, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let outcome = tool.execute(&call.arguments).await;
        if let Some(err) = &outcome.error {
            warn!(tool = %call.name, error = %err, "tool execution failed");
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use duplex_core::ParameterSpec;
    use serde::Deserialize;

    use super::*;
    use crate::FnTool;

    #[derive(Deserialize)]
    struct ToggleParams {
        enabled: bool,
    }

    fn registry_with_toggle() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new(
            "toggle",
            "Flip a switch",
            BTreeMap::from([(
                "enabled".to_string(),
                ParameterSpec::boolean("Whether the switch is on"),
            )]),
            |params: ToggleParams| Ok(format!("switched {}", if params.enabled { "on" } else { "off" })),
        )));
        registry
    }

    #[tokio::test]
    async fn invokes_registered_tool() {
        let registry = registry_with_toggle();
        let call = ToolCall::new("1", "toggle", r#"{"enabled": true}"#);
        let outcome = registry.invoke(&call).await.unwrap();
        assert_eq!(outcome.response, "switched on");
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let registry = registry_with_toggle();
        let call = ToolCall::new("1", "missing", "{}");
        let err = registry.invoke(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(name) if name == "missing"));
    }

    #[test]
    fn duplicate_registration_replaces() {
        let mut registry = registry_with_toggle();
        let before = registry.len();
        registry.register(registry_with_toggle().tools()[0].clone());
        assert_eq!(registry.len(), before);
    }

    #[test]
    fn descriptors_preserve_registration_order() {
        let registry = registry_with_toggle();
        let descriptors = registry.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "toggle");
    }
}
