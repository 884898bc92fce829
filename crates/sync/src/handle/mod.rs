use std::fmt;

use serde::{Deserialize, Serialize};

/// Sender id reserved for messages authored by the server itself.
pub const SERVER_ID: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientHandle(u32);

impl ClientHandle {
    pub fn id(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues small reusable handles. Released handles go on a free list and are
/// handed out again before the slot range grows.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    live: Vec<bool>,
    free: Vec<u32>,
    live_count: usize,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> ClientHandle {
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                let id = self.live.len() as u32;
                debug_assert!(id != SERVER_ID, "handle space exhausted");
                self.live.push(false);
                id
            }
        };

        self.live[id as usize] = true;
        self.live_count += 1;
        ClientHandle(id)
    }

    /// Marks `handle` dead. Returns false if it was not live.
    pub fn release(&mut self, handle: ClientHandle) -> bool {
        match self.live.get_mut(handle.index()) {
            Some(live) if *live => {
                *live = false;
                self.free.push(handle.0);
                self.live_count -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn is_live(&self, handle: ClientHandle) -> bool {
        self.live.get(handle.index()).copied().unwrap_or(false)
    }

    /// Snapshot of the live handles in ascending order.
    pub fn live_handles(&self) -> Vec<ClientHandle> {
        self.live
            .iter()
            .enumerate()
            .filter(|(_, live)| **live)
            .map(|(id, _)| ClientHandle(id as u32))
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Number of slots ever allocated; attribute columns are sized to this.
    pub fn capacity(&self) -> usize {
        self.live.len()
    }
}
