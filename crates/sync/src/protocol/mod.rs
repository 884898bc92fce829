mod command;
mod message;
mod payload;

pub use command::Command;
pub use message::{
    Envelope, Message, ProtocolError, Sender, add_marker, add_primitive, delete_marker, deselect,
    end_pointer, end_transform, lambda, new_user, remove_user, select, set_user, start_pointer,
    start_transform, update_camera, update_marker, update_pointer, update_transform,
};
pub use payload::{MarkerKey, NodeExtras, NodeRef, PointerUpdate, Primitive, PrimitiveRequest};
