//! Tool descriptors
//!
//! The wire-facing description of a tool: what the LLM sees in its tool
//! catalogue. The callable side lives in `duplex-tools`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single named parameter in a tool's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// JSON type name, e.g. "boolean" or "string".
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
}

impl ParameterSpec {
    pub fn new(param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            description: description.into(),
        }
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new("boolean", description)
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new("string", description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::new("number", description)
    }
}

/// Description of a callable tool, as presented to the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// Parameter schema, name → {type, description}. Ordered so the
    /// catalogue renders deterministically.
    pub parameters: BTreeMap<String, ParameterSpec>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn parameter(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_builder_collects_parameters() {
        let descriptor = ToolDescriptor::new("recording_control", "Toggle recording")
            .parameter("is_recording", ParameterSpec::boolean("Whether to record or not"));
        assert_eq!(descriptor.parameters.len(), 1);
        assert_eq!(descriptor.parameters["is_recording"].param_type, "boolean");
    }
}
