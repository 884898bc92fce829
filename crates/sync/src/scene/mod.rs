mod graph;

use std::fmt;

use glam::DMat4;
use serde::{Deserialize, Serialize};

pub use graph::Scene;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("failed to parse glTF document: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("unknown node {0}")]
    UnknownNode(String),
}

/// What the engine asks the scene for when a client adds a primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescriptor {
    pub name: Option<String>,
    pub kind: String,
    pub matrix: DMat4,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub node: NodeId,
    pub name: String,
    pub matrix: DMat4,
}

/// The authoritative node store. Selection locks are exclusive and
/// non-reentrant: `select_node` on a held node returns false, even for the
/// holder.
pub trait SceneGraph {
    fn node(&self, name: &str) -> Option<NodeId>;

    fn contains(&self, node: NodeId) -> bool;

    fn select_node(&mut self, node: NodeId) -> bool;

    fn deselect_node(&mut self, node: NodeId);

    fn set_matrix(&mut self, node: NodeId, matrix: DMat4) -> Result<(), SceneError>;

    fn add_node(&mut self, descriptor: NodeDescriptor) -> NodeId;

    fn node_name(&self, node: NodeId) -> Option<String>;

    fn nodes_data(&self) -> Vec<NodeData>;

    fn load_gltf(&mut self, document: &[u8]) -> Result<(), SceneError>;
}
