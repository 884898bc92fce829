use glam::DMat4;
use serde::Deserialize;
use serde_json::Value;

use crate::client::{Marker, RegistryError};
use crate::handle::ClientHandle;
use crate::protocol::{
    self, Command, Envelope, MarkerKey, NodeRef, PointerUpdate, Primitive, PrimitiveRequest,
    ProtocolError,
};
use crate::scene::{NodeDescriptor, SceneGraph};

use super::{SyncEngine, SyncError};

impl<S: SceneGraph> SyncEngine<S> {
    /// Decodes and dispatches one inbound text message from `sender`. Errors
    /// leave the engine untouched except where noted by the handler; the
    /// caller logs them and keeps the connection open.
    pub fn handle_message(&mut self, sender: ClientHandle, text: &str) -> Result<(), SyncError> {
        if !self.clients.is_live(sender) {
            return Err(RegistryError::StaleHandle(sender).into());
        }

        let mut envelope = Envelope::decode(text)?;
        let command = envelope.command()?;
        log::debug!("Client {} sent {}", sender, command);

        match command {
            Command::Select => self.handle_select(sender, &mut envelope),
            Command::Deselect => self.handle_deselect(sender, &mut envelope),
            Command::StartTransform | Command::EndTransform => {
                self.handle_transform_phase(sender, command, &mut envelope)
            }
            Command::UpdateTransform => self.handle_update_transform(sender, &mut envelope),
            Command::UpdateCamera => self.handle_update_camera(sender, &mut envelope),
            Command::StartPointer => self.handle_start_pointer(sender),
            Command::UpdatePointer => self.handle_update_pointer(sender, &mut envelope),
            Command::EndPointer => self.handle_end_pointer(sender),
            Command::AddMarker => self.handle_add_marker(sender, &mut envelope),
            Command::UpdateMarker => self.handle_update_marker(sender, &mut envelope),
            Command::DeleteMarker => self.handle_delete_marker(sender, &mut envelope),
            Command::AddPrimitive => self.handle_add_primitive(sender, &mut envelope),
            Command::Lambda => self.handle_lambda(sender, &mut envelope),
            Command::NewUser | Command::SetUser | Command::RemoveUser => {
                Err(SyncError::UnexpectedCommand(command))
            }
        }
    }

    /// Wrapper for transports: failures are logged and dropped.
    pub fn handle_message_logged(&mut self, sender: ClientHandle, text: &str) {
        if let Err(e) = self.handle_message(sender, text) {
            log::warn!("Dropped message from client {}: {}", sender, e);
        }
    }

    /// Only the first entry is parsed; the rest of the array is ignored.
    fn first_node(command: Command, envelope: &mut Envelope) -> Result<NodeRef, SyncError> {
        let nodes: Vec<Value> = envelope.take("nodes")?;
        let first = nodes
            .into_iter()
            .next()
            .ok_or(SyncError::EmptyNodes(command))?;
        let node = serde_json::from_value(first)
            .map_err(|source| ProtocolError::InvalidField { field: "nodes", source })?;
        Ok(node)
    }

    /// Only the first node is arbitrated; a rejected lock sends nothing back.
    fn handle_select(
        &mut self,
        sender: ClientHandle,
        envelope: &mut Envelope,
    ) -> Result<(), SyncError> {
        let requested = Self::first_node(Command::Select, envelope)?;
        let node = self.resolve(&requested)?;

        if !self.scene.select_node(node) {
            log::debug!("Selection of node {} by client {} rejected", node, sender);
            return Ok(());
        }

        self.clients.select_node(sender, node)?;
        let nodes = [self.node_ref(node)];
        self.broadcast(&protocol::select(sender, &nodes)?, None);
        Ok(())
    }

    /// Releases the lock whoever holds it.
    fn handle_deselect(
        &mut self,
        sender: ClientHandle,
        envelope: &mut Envelope,
    ) -> Result<(), SyncError> {
        let requested = Self::first_node(Command::Deselect, envelope)?;
        let node = self.resolve(&requested)?;

        self.scene.deselect_node(node);
        if let Some(holder) = self.clients.holder_of(node) {
            self.clients.deselect_node(holder, node)?;
        }

        let nodes = [self.node_ref(node)];
        self.broadcast(&protocol::deselect(sender, &nodes)?, None);
        Ok(())
    }

    /// Relayed unmodified; only the array shape is checked.
    fn handle_transform_phase(
        &mut self,
        sender: ClientHandle,
        command: Command,
        envelope: &mut Envelope,
    ) -> Result<(), SyncError> {
        let nodes: Vec<Value> = envelope.take("nodes")?;
        let message = match command {
            Command::StartTransform => protocol::start_transform(sender, &nodes)?,
            _ => protocol::end_transform(sender, &nodes)?,
        };
        self.broadcast(&message, Some(sender));
        Ok(())
    }

    /// Writes every node's matrix into the scene, then relays the array as
    /// received. Nothing is written unless every node resolves and carries a
    /// matrix.
    fn handle_update_transform(
        &mut self,
        sender: ClientHandle,
        envelope: &mut Envelope,
    ) -> Result<(), SyncError> {
        let nodes: Vec<Value> = envelope.take("nodes")?;
        if nodes.is_empty() {
            return Err(SyncError::EmptyNodes(Command::UpdateTransform));
        }

        let mut updates = Vec::with_capacity(nodes.len());
        for value in &nodes {
            let node = NodeRef::deserialize(value)
                .map_err(|source| ProtocolError::InvalidField { field: "nodes", source })?;
            let id = self.resolve(&node)?;
            let matrix = node.matrix.ok_or(ProtocolError::MissingField("matrix"))?;
            updates.push((id, matrix));
        }
        for (id, matrix) in updates {
            self.scene.set_matrix(id, matrix)?;
        }

        self.broadcast(&protocol::update_transform(sender, &nodes)?, Some(sender));
        Ok(())
    }

    fn handle_update_camera(
        &mut self,
        sender: ClientHandle,
        envelope: &mut Envelope,
    ) -> Result<(), SyncError> {
        let view_matrix: DMat4 = envelope.take("viewMatrix")?;
        self.clients.set_camera_pose(sender, &view_matrix)?;
        self.broadcast(&protocol::update_camera(sender, &view_matrix)?, Some(sender));
        Ok(())
    }

    fn handle_start_pointer(&mut self, sender: ClientHandle) -> Result<(), SyncError> {
        self.clients.set_pointer_active(sender, true)?;
        self.broadcast(&protocol::start_pointer(sender)?, Some(sender));
        Ok(())
    }

    fn handle_end_pointer(&mut self, sender: ClientHandle) -> Result<(), SyncError> {
        self.clients.set_pointer_active(sender, false)?;
        self.broadcast(&protocol::end_pointer(sender)?, Some(sender));
        Ok(())
    }

    fn handle_update_pointer(
        &mut self,
        sender: ClientHandle,
        envelope: &mut Envelope,
    ) -> Result<(), SyncError> {
        let update: PointerUpdate = envelope.take("pointer")?;
        match update.on {
            Some(false) => return self.handle_end_pointer(sender),
            Some(true) if self.clients.pointer(sender)?.is_none() => {
                self.handle_start_pointer(sender)?;
            }
            _ => {}
        }

        self.clients.set_pointer(sender, update.origin, update.end)?;
        if let Some(pointer) = self.clients.pointer(sender)? {
            self.broadcast(&protocol::update_pointer(sender, &pointer)?, Some(sender));
        }
        Ok(())
    }

    fn handle_add_marker(
        &mut self,
        sender: ClientHandle,
        envelope: &mut Envelope,
    ) -> Result<(), SyncError> {
        let marker: Marker = envelope.take("marker")?;
        let message = protocol::add_marker(sender, &marker)?;
        self.clients.add_marker(sender, marker)?;
        self.broadcast(&message, Some(sender));
        Ok(())
    }

    fn handle_update_marker(
        &mut self,
        sender: ClientHandle,
        envelope: &mut Envelope,
    ) -> Result<(), SyncError> {
        let marker: Marker = envelope.take("marker")?;
        let message = protocol::update_marker(sender, &marker)?;
        self.clients.add_marker(sender, marker)?;
        self.broadcast(&message, Some(sender));
        Ok(())
    }

    /// Relayed even when the marker does not exist.
    fn handle_delete_marker(
        &mut self,
        sender: ClientHandle,
        envelope: &mut Envelope,
    ) -> Result<(), SyncError> {
        let MarkerKey { id } = envelope.take("marker")?;
        if !self.clients.delete_marker(sender, &id)? {
            log::debug!("Client {} deleted unknown marker {:?}", sender, id);
        }
        self.broadcast(&protocol::delete_marker(sender, &id)?, Some(sender));
        Ok(())
    }

    /// The server assigns the node id and name, so the sender gets the
    /// announcement too.
    fn handle_add_primitive(
        &mut self,
        sender: ClientHandle,
        envelope: &mut Envelope,
    ) -> Result<(), SyncError> {
        let request: PrimitiveRequest = envelope.take("primitive")?;
        let matrix = request.matrix.unwrap_or(DMat4::IDENTITY);

        let node_id = self.scene.add_node(NodeDescriptor {
            name: request.name,
            kind: request.kind.clone(),
            matrix,
        });
        let primitive = Primitive {
            name: self.scene.node_name(node_id).unwrap_or_default(),
            kind: request.kind,
            matrix,
            node_id,
        };

        let message = protocol::add_primitive(sender, &primitive)?;
        log::info!(
            "Client {} added {} primitive {:?} as node {}",
            sender,
            primitive.kind,
            primitive.name,
            node_id
        );
        self.primitives.push(primitive);
        self.broadcast(&message, None);
        Ok(())
    }

    /// Opaque passthrough; `data.all` decides whether the sender hears it.
    fn handle_lambda(
        &mut self,
        sender: ClientHandle,
        envelope: &mut Envelope,
    ) -> Result<(), SyncError> {
        let data: Value = envelope.take_or_default("data")?;
        let include_sender = data.get("all").and_then(Value::as_bool).unwrap_or(false);

        let exclude = (!include_sender).then_some(sender);
        self.broadcast(&protocol::lambda(sender, &data)?, exclude);
        Ok(())
    }
}
