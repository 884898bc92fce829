use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::MarkerId;
use crate::scene::NodeId;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeExtras {
    #[serde(rename = "nodeId", default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// One entry of a `nodes` array. Fields the server does not interpret are
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeRef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<DMat4>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<NodeExtras>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl NodeRef {
    pub fn new(name: impl Into<String>, node: NodeId) -> Self {
        Self {
            name: Some(name.into()),
            matrix: None,
            extras: Some(NodeExtras {
                node_id: Some(node),
                other: Map::new(),
            }),
            other: Map::new(),
        }
    }

    pub fn with_matrix(mut self, matrix: DMat4) -> Self {
        self.matrix = Some(matrix);
        self
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.extras.as_ref().and_then(|extras| extras.node_id)
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// Inbound pointer update. `on: false` is the legacy "pointer off" encoding.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PointerUpdate {
    #[serde(default)]
    pub origin: DVec3,
    #[serde(default)]
    pub end: DVec3,
    #[serde(default)]
    pub on: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerKey {
    pub id: MarkerId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrimitiveRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub matrix: Option<DMat4>,
}

/// A primitive as the server announces it, with its assigned node id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Primitive {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub matrix: DMat4,
    #[serde(rename = "nodeId")]
    pub node_id: NodeId,
}
