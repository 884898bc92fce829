pub mod channel;
pub mod client;
pub mod engine;
pub mod handle;
pub mod protocol;
pub mod scene;

pub use channel::{Channel, ChannelError};
pub use client::{
    ClientData, ClientRegistry, Color, ConnectionPhase, Marker, MarkerId, Pointer, RegistryError,
};
pub use engine::{SyncEngine, SyncError};
pub use handle::{ClientHandle, HandleAllocator, SERVER_ID};
pub use protocol::{Command, Envelope, Message, NodeRef, Primitive, ProtocolError, Sender};
pub use scene::{NodeData, NodeDescriptor, NodeId, Scene, SceneError, SceneGraph};

pub const DEFAULT_PORT: u16 = 8080;
