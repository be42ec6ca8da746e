//! Raw graph input as supplied by callers.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// A node as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputNode {
    /// Stable external identifier.
    pub id: String,
    /// Optional initial x position in simulation space.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    /// Optional initial y position in simulation space.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    /// Optional per-node size used for picking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f32>,
}

impl InputNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x: None,
            y: None,
            size: None,
        }
    }

    /// Builder-style initial position.
    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    /// Builder-style size.
    pub fn with_size(mut self, size: f32) -> Self {
        self.size = Some(size);
        self
    }
}

/// A directed relation between two node ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputLink {
    pub source: String,
    pub target: String,
}

impl InputLink {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// A complete graph document: `{"nodes": [...], "links": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphInput {
    #[serde(default)]
    pub nodes: Vec<InputNode>,
    #[serde(default)]
    pub links: Vec<InputLink>,
}

impl GraphInput {
    /// Parse a graph document from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a graph document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let graph = Self::from_json_str(&raw)?;
        tracing::debug!(
            path = %path.display(),
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            "Loaded graph input"
        );
        Ok(graph)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_document() {
        let graph = GraphInput::from_json_str(
            r#"{"nodes":[{"id":"a","x":1.5,"y":2.0},{"id":"b"}],"links":[{"source":"a","target":"b"}]}"#,
        )
        .unwrap();

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].x, Some(1.5));
        assert_eq!(graph.nodes[1].x, None);
        assert_eq!(graph.links[0], InputLink::new("a", "b"));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let graph = GraphInput::from_json_str("{}").unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_malformed_json_is_reported() {
        let err = GraphInput::from_json_str("{\"nodes\": [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
