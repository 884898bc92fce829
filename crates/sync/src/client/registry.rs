use std::collections::{BTreeMap, BTreeSet};

use glam::{DMat4, DVec3};

use crate::channel::Channel;
use crate::handle::{ClientHandle, HandleAllocator};
use crate::scene::NodeId;

use super::state::{ClientData, Color, ConnectionPhase, Marker, MarkerId, Pointer};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("client handle {0} is not live")]
    StaleHandle(ClientHandle),
    #[error("pointer of client {0} is not active")]
    PointerInactive(ClientHandle),
}

/// Per-client session state stored as one column per attribute, indexed by
/// handle. A slot is wiped when its handle is released, so a reused handle
/// never observes the previous client's values.
#[derive(Default)]
pub struct ClientRegistry {
    handles: HandleAllocator,
    channels: Vec<Option<Box<dyn Channel>>>,
    phases: Vec<ConnectionPhase>,
    camera_poses: Vec<DMat4>,
    pointers: Vec<Option<Pointer>>,
    markers: Vec<BTreeMap<MarkerId, Marker>>,
    selected: Vec<BTreeSet<NodeId>>,
    colors: Vec<Color>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_client(&mut self) -> ClientHandle {
        self.create_client_with_color(Color::random_pastel())
    }

    pub fn create_client_with_color(&mut self, color: Color) -> ClientHandle {
        let handle = self.handles.allocate();
        let index = handle.index();

        if index == self.channels.len() {
            self.channels.push(None);
            self.phases.push(ConnectionPhase::Closed);
            self.camera_poses.push(DMat4::IDENTITY);
            self.pointers.push(None);
            self.markers.push(BTreeMap::new());
            self.selected.push(BTreeSet::new());
            self.colors.push(color);
        }

        self.reset_slot(index);
        self.phases[index] = ConnectionPhase::Connecting;
        self.colors[index] = color;

        log::debug!("Created client {}", handle);
        handle
    }

    /// Releases the handle after wiping every attribute. Cross-client locks
    /// must already have been revoked by the caller.
    pub fn remove_client(&mut self, handle: ClientHandle) -> Result<(), RegistryError> {
        let index = self.index(handle)?;
        self.reset_slot(index);
        self.handles.release(handle);
        log::debug!("Removed client {}", handle);
        Ok(())
    }

    fn reset_slot(&mut self, index: usize) {
        self.channels[index] = None;
        self.phases[index] = ConnectionPhase::Closed;
        self.camera_poses[index] = DMat4::IDENTITY;
        self.pointers[index] = None;
        self.markers[index].clear();
        self.selected[index].clear();
    }

    fn index(&self, handle: ClientHandle) -> Result<usize, RegistryError> {
        if self.handles.is_live(handle) {
            Ok(handle.index())
        } else {
            Err(RegistryError::StaleHandle(handle))
        }
    }

    pub fn is_live(&self, handle: ClientHandle) -> bool {
        self.handles.is_live(handle)
    }

    pub fn len(&self) -> usize {
        self.handles.live_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_channel(
        &mut self,
        handle: ClientHandle,
        channel: Box<dyn Channel>,
    ) -> Result<(), RegistryError> {
        let index = self.index(handle)?;
        self.channels[index] = Some(channel);
        Ok(())
    }

    /// `None` for dead handles and for clients with no bound channel.
    pub fn channel(&self, handle: ClientHandle) -> Option<&dyn Channel> {
        let index = self.index(handle).ok()?;
        self.channels[index].as_deref()
    }

    pub fn phase(&self, handle: ClientHandle) -> ConnectionPhase {
        match self.index(handle) {
            Ok(index) => self.phases[index],
            Err(_) => ConnectionPhase::Closed,
        }
    }

    pub fn set_phase(
        &mut self,
        handle: ClientHandle,
        phase: ConnectionPhase,
    ) -> Result<(), RegistryError> {
        let index = self.index(handle)?;
        self.phases[index] = phase;
        Ok(())
    }

    pub fn camera_pose(&self, handle: ClientHandle) -> Result<DMat4, RegistryError> {
        let index = self.index(handle)?;
        Ok(self.camera_poses[index])
    }

    pub fn set_camera_pose(
        &mut self,
        handle: ClientHandle,
        pose: &DMat4,
    ) -> Result<(), RegistryError> {
        let index = self.index(handle)?;
        self.camera_poses[index] = *pose;
        Ok(())
    }

    pub fn set_pointer_active(
        &mut self,
        handle: ClientHandle,
        active: bool,
    ) -> Result<(), RegistryError> {
        let index = self.index(handle)?;
        self.pointers[index] = active.then(Pointer::default);
        Ok(())
    }

    pub fn set_pointer(
        &mut self,
        handle: ClientHandle,
        origin: DVec3,
        end: DVec3,
    ) -> Result<(), RegistryError> {
        let index = self.index(handle)?;
        let pointer = self.pointers[index]
            .as_mut()
            .ok_or(RegistryError::PointerInactive(handle))?;
        pointer.origin = origin;
        pointer.end = end;
        Ok(())
    }

    pub fn pointer(&self, handle: ClientHandle) -> Result<Option<Pointer>, RegistryError> {
        let index = self.index(handle)?;
        Ok(self.pointers[index])
    }

    /// Inserts or replaces the marker with the same id.
    pub fn add_marker(
        &mut self,
        handle: ClientHandle,
        marker: Marker,
    ) -> Result<(), RegistryError> {
        let index = self.index(handle)?;
        self.markers[index].insert(marker.id.clone(), marker);
        Ok(())
    }

    /// Returns whether a marker was removed.
    pub fn delete_marker(
        &mut self,
        handle: ClientHandle,
        id: &MarkerId,
    ) -> Result<bool, RegistryError> {
        let index = self.index(handle)?;
        Ok(self.markers[index].remove(id).is_some())
    }

    pub fn markers(&self, handle: ClientHandle) -> Result<Vec<Marker>, RegistryError> {
        let index = self.index(handle)?;
        Ok(self.markers[index].values().cloned().collect())
    }

    /// Local bookkeeping only; cross-client exclusivity is the scene's call.
    pub fn select_node(
        &mut self,
        handle: ClientHandle,
        node: NodeId,
    ) -> Result<bool, RegistryError> {
        let index = self.index(handle)?;
        Ok(self.selected[index].insert(node))
    }

    pub fn deselect_node(
        &mut self,
        handle: ClientHandle,
        node: NodeId,
    ) -> Result<bool, RegistryError> {
        let index = self.index(handle)?;
        Ok(self.selected[index].remove(&node))
    }

    pub fn selected_nodes(&self, handle: ClientHandle) -> Result<Vec<NodeId>, RegistryError> {
        let index = self.index(handle)?;
        Ok(self.selected[index].iter().copied().collect())
    }

    /// The live client whose selection set contains `node`, if any.
    pub fn holder_of(&self, node: NodeId) -> Option<ClientHandle> {
        self.handles
            .live_handles()
            .into_iter()
            .find(|handle| self.selected[handle.index()].contains(&node))
    }

    pub fn color(&self, handle: ClientHandle) -> Result<Color, RegistryError> {
        let index = self.index(handle)?;
        Ok(self.colors[index])
    }

    pub fn clients(&self) -> Vec<ClientHandle> {
        self.handles.live_handles()
    }

    pub fn client_data(&self, handle: ClientHandle) -> Result<ClientData, RegistryError> {
        let index = self.index(handle)?;
        Ok(ClientData {
            handle,
            phase: self.phases[index],
            camera_pose: self.camera_poses[index],
            pointer: self.pointers[index],
            markers: self.markers[index].values().cloned().collect(),
            selected: self.selected[index].iter().copied().collect(),
            color: self.colors[index],
        })
    }

    pub fn clients_data(&self) -> Vec<ClientData> {
        self.handles
            .live_handles()
            .into_iter()
            .filter_map(|handle| self.client_data(handle).ok())
            .collect()
    }
}
