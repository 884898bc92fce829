mod registry;
mod state;

pub use registry::{ClientRegistry, RegistryError};
pub use state::{ClientData, Color, ConnectionPhase, Marker, MarkerId, Pointer};
