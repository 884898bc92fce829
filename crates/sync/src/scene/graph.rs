use std::collections::HashMap;

use glam::{DMat4, Mat4};

use super::{NodeData, NodeDescriptor, NodeId, SceneError, SceneGraph};

#[derive(Debug, Clone)]
struct SceneNode {
    name: String,
    matrix: DMat4,
    locked: bool,
}

/// In-memory scene: a flat node table loaded from a glTF document, plus
/// nodes added at runtime.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: Vec<SceneNode>,
    names: HashMap<String, NodeId>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_gltf(document: &[u8]) -> Result<Self, SceneError> {
        let mut scene = Self::new();
        scene.load_gltf(document)?;
        Ok(scene)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_locked(&self, node: NodeId) -> bool {
        self.get(node).is_some_and(|n| n.locked)
    }

    pub fn matrix(&self, node: NodeId) -> Option<DMat4> {
        self.get(node).map(|n| n.matrix)
    }

    fn get(&self, node: NodeId) -> Option<&SceneNode> {
        self.nodes.get(node.0 as usize)
    }

    fn get_mut(&mut self, node: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(node.0 as usize)
    }

    fn insert(&mut self, name: String, matrix: DMat4) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        // First node wins on duplicate names.
        self.names.entry(name.clone()).or_insert(id);
        self.nodes.push(SceneNode {
            name,
            matrix,
            locked: false,
        });
        id
    }
}

impl SceneGraph for Scene {
    fn node(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    fn contains(&self, node: NodeId) -> bool {
        self.get(node).is_some()
    }

    fn select_node(&mut self, node: NodeId) -> bool {
        match self.get_mut(node) {
            Some(n) if !n.locked => {
                n.locked = true;
                true
            }
            _ => false,
        }
    }

    fn deselect_node(&mut self, node: NodeId) {
        if let Some(n) = self.get_mut(node) {
            n.locked = false;
        }
    }

    fn set_matrix(&mut self, node: NodeId, matrix: DMat4) -> Result<(), SceneError> {
        let n = self
            .get_mut(node)
            .ok_or_else(|| SceneError::UnknownNode(node.to_string()))?;
        n.matrix = matrix;
        Ok(())
    }

    fn add_node(&mut self, descriptor: NodeDescriptor) -> NodeId {
        let next = NodeId(self.nodes.len() as u32);
        let name = descriptor
            .name
            .unwrap_or_else(|| format!("{}_{}", descriptor.kind, next));
        self.insert(name, descriptor.matrix)
    }

    fn node_name(&self, node: NodeId) -> Option<String> {
        self.get(node).map(|n| n.name.clone())
    }

    fn nodes_data(&self) -> Vec<NodeData> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, n)| NodeData {
                node: NodeId(index as u32),
                name: n.name.clone(),
                matrix: n.matrix,
            })
            .collect()
    }

    /// Replaces the node table with the nodes of a `.gltf` or `.glb`
    /// document. Buffers are never resolved; only names and local transforms
    /// are kept.
    fn load_gltf(&mut self, document: &[u8]) -> Result<(), SceneError> {
        let gltf = gltf::Gltf::from_slice(document)?;

        self.nodes.clear();
        self.names.clear();

        for node in gltf.nodes() {
            let name = node
                .name()
                .map(str::to_owned)
                .unwrap_or_else(|| format!("node_{}", node.index()));
            let matrix = Mat4::from_cols_array_2d(&node.transform().matrix()).as_dmat4();
            self.insert(name, matrix);
        }

        log::info!("Loaded scene with {} nodes", self.nodes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;

    const DOCUMENT: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0, 1, 2] }],
        "nodes": [
            { "name": "Board" },
            { "name": "Pawn", "translation": [1.0, 0.0, 2.0] },
            { "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,3,0,1] }
        ]
    }"#;

    #[test]
    fn test_load_gltf_nodes() {
        let scene = Scene::from_gltf(DOCUMENT.as_bytes()).unwrap();

        assert_eq!(scene.node_count(), 3);
        assert_eq!(scene.node("Board"), Some(NodeId(0)));
        assert_eq!(scene.node_name(NodeId(2)).as_deref(), Some("node_2"));

        let pawn = scene.matrix(NodeId(1)).unwrap();
        assert_eq!(pawn.w_axis.truncate(), DVec3::new(1.0, 0.0, 2.0));

        let unnamed = scene.matrix(NodeId(2)).unwrap();
        assert_eq!(unnamed.w_axis.truncate(), DVec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut scene = Scene::new();
        assert!(matches!(
            scene.load_gltf(b"not a document"),
            Err(SceneError::Gltf(_))
        ));
    }

    #[test]
    fn test_selection_lock_is_exclusive() {
        let mut scene = Scene::from_gltf(DOCUMENT.as_bytes()).unwrap();
        let pawn = scene.node("Pawn").unwrap();

        assert!(scene.select_node(pawn));
        assert!(!scene.select_node(pawn));
        assert!(scene.is_locked(pawn));

        scene.deselect_node(pawn);
        assert!(scene.select_node(pawn));

        assert!(!scene.select_node(NodeId(99)));
    }

    #[test]
    fn test_add_node_names_by_kind() {
        let mut scene = Scene::new();
        let cube = scene.add_node(NodeDescriptor {
            name: None,
            kind: "cube".into(),
            matrix: DMat4::IDENTITY,
        });
        let named = scene.add_node(NodeDescriptor {
            name: Some("Lamp".into()),
            kind: "sphere".into(),
            matrix: DMat4::from_translation(DVec3::Y),
        });

        assert_eq!(scene.node_name(cube).as_deref(), Some("cube_0"));
        assert_eq!(scene.node("Lamp"), Some(named));
        assert_eq!(scene.nodes_data().len(), 2);
    }

    #[test]
    fn test_set_matrix_unknown_node() {
        let mut scene = Scene::new();
        assert!(scene.set_matrix(NodeId(0), DMat4::IDENTITY).is_err());
    }
}
