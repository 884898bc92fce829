use crate::handle::ClientHandle;
use crate::protocol::{self, NodeRef, Sender};
use crate::scene::SceneGraph;

use super::{SyncEngine, SyncError};

impl<S: SceneGraph> SyncEngine<S> {
    /// Sends the joining client the current shared state, privately and in
    /// this order: primitives, peer identities, cameras, active pointers,
    /// markers, node transforms, held selections. Transforms go before the
    /// selections that reference them and identities before any peer data.
    pub(super) fn replay(&self, joining: ClientHandle) -> Result<(), SyncError> {
        let peers: Vec<_> = self
            .clients
            .clients_data()
            .into_iter()
            .filter(|peer| peer.handle != joining)
            .collect();

        for primitive in &self.primitives {
            self.send_to(joining, protocol::add_primitive(Sender::Server, primitive)?);
        }

        for peer in &peers {
            self.send_to(joining, protocol::new_user(peer.handle, Some(peer.color))?);
        }

        for peer in &peers {
            self.send_to(joining, protocol::update_camera(peer.handle, &peer.camera_pose)?);
        }

        for peer in &peers {
            if let Some(pointer) = &peer.pointer {
                self.send_to(joining, protocol::start_pointer(peer.handle)?);
                self.send_to(joining, protocol::update_pointer(peer.handle, pointer)?);
            }
        }

        for peer in &peers {
            for marker in &peer.markers {
                self.send_to(joining, protocol::add_marker(peer.handle, marker)?);
            }
        }

        for node in self.scene.nodes_data() {
            let nodes = [NodeRef::new(node.name, node.node).with_matrix(node.matrix)];
            self.send_to(joining, protocol::update_transform(Sender::Server, &nodes)?);
        }

        for peer in &peers {
            for node in &peer.selected {
                let nodes = [self.node_ref(*node)];
                self.send_to(joining, protocol::select(peer.handle, &nodes)?);
            }
        }

        log::debug!(
            "Replayed {} primitives and {} peers to client {}",
            self.primitives.len(),
            peers.len(),
            joining
        );
        Ok(())
    }
}
