mod dispatch;
mod replay;

use crate::channel::{Channel, ChannelError};
use crate::client::{ClientRegistry, ConnectionPhase, RegistryError};
use crate::handle::ClientHandle;
use crate::protocol::{self, Command, Message, NodeRef, Primitive, ProtocolError};
use crate::scene::{NodeId, Scene, SceneError, SceneGraph};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error("{0} is not accepted from clients")]
    UnexpectedCommand(Command),
    #[error("{0} carries no nodes")]
    EmptyNodes(Command),
}

/// The session engine: owns the client registry, the scene and the log of
/// primitives added at runtime. Every entry point runs to completion and
/// never blocks; outbound messages are queued on each recipient's channel.
pub struct SyncEngine<S = Scene> {
    clients: ClientRegistry,
    scene: S,
    primitives: Vec<Primitive>,
}

impl<S: SceneGraph> SyncEngine<S> {
    pub fn new(scene: S) -> Self {
        Self {
            clients: ClientRegistry::new(),
            scene,
            primitives: Vec::new(),
        }
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    /// Registers a new client: announces its own handle to it, replays the
    /// current shared state to it alone, then tells everyone else.
    pub fn connect(&mut self, channel: Box<dyn Channel>) -> Result<ClientHandle, SyncError> {
        let handle = self.clients.create_client();
        self.clients.set_channel(handle, channel)?;
        let color = self.clients.color(handle)?;

        log::info!("Client {} connected ({} live)", handle, self.clients.len());

        self.send_to(handle, protocol::set_user(handle, Some(color))?);
        self.replay(handle)?;

        self.clients.set_phase(handle, ConnectionPhase::Active)?;
        self.broadcast(&protocol::new_user(handle, Some(color))?, Some(handle));

        Ok(handle)
    }

    /// Tears a client down. Its locks are released and announced before the
    /// handle is freed, so no peer is left referencing a vanished owner.
    pub fn disconnect(&mut self, handle: ClientHandle) -> Result<(), SyncError> {
        if !self.clients.is_live(handle) {
            return Err(RegistryError::StaleHandle(handle).into());
        }
        self.clients.set_phase(handle, ConnectionPhase::Closed)?;

        for node in self.clients.selected_nodes(handle)? {
            self.scene.deselect_node(node);
            self.clients.deselect_node(handle, node)?;
            let nodes = [self.node_ref(node)];
            self.broadcast(&protocol::deselect(handle, &nodes)?, Some(handle));
        }

        self.broadcast(&protocol::end_pointer(handle)?, Some(handle));
        self.clients.remove_client(handle)?;
        self.broadcast(&protocol::remove_user(handle)?, None);

        log::info!("Client {} disconnected ({} live)", handle, self.clients.len());
        Ok(())
    }

    /// Queues `message` on every active channel except `exclude`. A failed
    /// recipient is logged and skipped. Returns how many channels accepted it.
    pub fn broadcast(&self, message: &Message, exclude: Option<ClientHandle>) -> usize {
        let mut delivered = 0;
        for handle in self.clients.clients() {
            if Some(handle) == exclude || self.clients.phase(handle) != ConnectionPhase::Active {
                continue;
            }
            if self.deliver(handle, message.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Private send; unknown or unbound handles are a no-op.
    pub fn send_to(&self, handle: ClientHandle, message: Message) {
        let _ = self.deliver(handle, message);
    }

    fn deliver(&self, handle: ClientHandle, message: Message) -> Result<(), ChannelError> {
        let Some(channel) = self.clients.channel(handle) else {
            log::debug!("Dropping message for stale client {}", handle);
            return Err(ChannelError::Closed);
        };

        channel.send(message).inspect_err(|e| {
            log::warn!("Failed to send to client {}: {}", handle, e);
        })
    }

    /// Resolves a wire node reference: `extras.nodeId` when it names a known
    /// node, otherwise the node name.
    fn resolve(&self, node: &NodeRef) -> Result<NodeId, SceneError> {
        if let Some(id) = node.node_id().filter(|id| self.scene.contains(*id)) {
            return Ok(id);
        }
        self.scene
            .node(node.name())
            .ok_or_else(|| SceneError::UnknownNode(node.name().to_owned()))
    }

    fn node_ref(&self, node: NodeId) -> NodeRef {
        let name = self.scene.node_name(node).unwrap_or_default();
        NodeRef::new(name, node)
    }
}
