use std::fmt;
use std::sync::Arc;

use glam::DMat4;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::{Color, Marker, MarkerId, Pointer};
use crate::handle::{ClientHandle, SERVER_ID};

use super::command::Command;
use super::payload::{MarkerKey, NodeRef, Primitive};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("missing field {0:?}")]
    MissingField(&'static str),
    #[error("invalid field {field:?}: {source}")]
    InvalidField {
        field: &'static str,
        source: serde_json::Error,
    },
    #[error("failed to encode {command}: {source}")]
    Encode {
        command: Command,
        source: serde_json::Error,
    },
}

/// Author of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    Client(ClientHandle),
    Server,
}

impl Sender {
    pub fn id(self) -> u32 {
        match self {
            Sender::Client(handle) => handle.id(),
            Sender::Server => SERVER_ID,
        }
    }
}

impl From<ClientHandle> for Sender {
    fn from(handle: ClientHandle) -> Self {
        Sender::Client(handle)
    }
}

/// An encoded message. Cloning shares the text, so one broadcast encodes once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message(Arc<str>);

impl Message {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self(text.into())
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self(text.into())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A decoded inbound message: the command name plus every other top-level
/// field, left untyped until the handler for that command picks it apart.
/// The claimed `senderId` is kept in the payload and never trusted.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub command: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Envelope {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn command(&self) -> Result<Command, ProtocolError> {
        self.command.parse()
    }

    pub fn take<T: DeserializeOwned>(&mut self, field: &'static str) -> Result<T, ProtocolError> {
        let value = self
            .payload
            .remove(field)
            .ok_or(ProtocolError::MissingField(field))?;
        serde_json::from_value(value)
            .map_err(|source| ProtocolError::InvalidField { field, source })
    }

    pub fn take_or_default<T: DeserializeOwned + Default>(
        &mut self,
        field: &'static str,
    ) -> Result<T, ProtocolError> {
        match self.payload.remove(field) {
            Some(value) => serde_json::from_value(value)
                .map_err(|source| ProtocolError::InvalidField { field, source }),
            None => Ok(T::default()),
        }
    }
}

#[derive(Serialize)]
struct Outbound<'a, T: Serialize> {
    #[serde(rename = "senderId")]
    sender_id: u32,
    command: Command,
    #[serde(flatten)]
    payload: &'a T,
}

#[derive(Serialize)]
struct NoPayload {}

#[derive(Serialize)]
struct UserPayload {
    #[serde(rename = "userId")]
    user_id: ClientHandle,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<Color>,
}

#[derive(Serialize)]
struct CameraPayload<'a> {
    #[serde(rename = "viewMatrix")]
    view_matrix: &'a DMat4,
}

#[derive(Serialize)]
struct PointerPayload<'a> {
    pointer: &'a Pointer,
}

#[derive(Serialize)]
struct NodesPayload<'a, N: Serialize + ?Sized> {
    nodes: &'a N,
}

#[derive(Serialize)]
struct MarkerPayload<'a, M: Serialize> {
    marker: &'a M,
}

#[derive(Serialize)]
struct PrimitivePayload<'a> {
    primitive: &'a Primitive,
}

#[derive(Serialize)]
struct LambdaPayload<'a> {
    data: &'a Value,
}

fn encode<T: Serialize>(
    sender: Sender,
    command: Command,
    payload: &T,
) -> Result<Message, ProtocolError> {
    let outbound = Outbound {
        sender_id: sender.id(),
        command,
        payload,
    };
    serde_json::to_string(&outbound)
        .map(Message::from)
        .map_err(|source| ProtocolError::Encode { command, source })
}

pub fn new_user(user: ClientHandle, color: Option<Color>) -> Result<Message, ProtocolError> {
    encode(
        Sender::Server,
        Command::NewUser,
        &UserPayload {
            user_id: user,
            color,
        },
    )
}

pub fn set_user(user: ClientHandle, color: Option<Color>) -> Result<Message, ProtocolError> {
    encode(
        Sender::Server,
        Command::SetUser,
        &UserPayload {
            user_id: user,
            color,
        },
    )
}

pub fn remove_user(user: ClientHandle) -> Result<Message, ProtocolError> {
    encode(
        Sender::Server,
        Command::RemoveUser,
        &UserPayload {
            user_id: user,
            color: None,
        },
    )
}

pub fn update_camera(
    sender: impl Into<Sender>,
    view_matrix: &DMat4,
) -> Result<Message, ProtocolError> {
    encode(
        sender.into(),
        Command::UpdateCamera,
        &CameraPayload { view_matrix },
    )
}

pub fn start_pointer(sender: impl Into<Sender>) -> Result<Message, ProtocolError> {
    encode(sender.into(), Command::StartPointer, &NoPayload {})
}

pub fn update_pointer(
    sender: impl Into<Sender>,
    pointer: &Pointer,
) -> Result<Message, ProtocolError> {
    encode(
        sender.into(),
        Command::UpdatePointer,
        &PointerPayload { pointer },
    )
}

pub fn end_pointer(sender: impl Into<Sender>) -> Result<Message, ProtocolError> {
    encode(sender.into(), Command::EndPointer, &NoPayload {})
}

pub fn select(sender: impl Into<Sender>, nodes: &[NodeRef]) -> Result<Message, ProtocolError> {
    encode(sender.into(), Command::Select, &NodesPayload { nodes })
}

pub fn deselect(sender: impl Into<Sender>, nodes: &[NodeRef]) -> Result<Message, ProtocolError> {
    encode(sender.into(), Command::Deselect, &NodesPayload { nodes })
}

pub fn start_transform<N: Serialize + ?Sized>(
    sender: impl Into<Sender>,
    nodes: &N,
) -> Result<Message, ProtocolError> {
    encode(sender.into(), Command::StartTransform, &NodesPayload { nodes })
}

pub fn update_transform<N: Serialize + ?Sized>(
    sender: impl Into<Sender>,
    nodes: &N,
) -> Result<Message, ProtocolError> {
    encode(sender.into(), Command::UpdateTransform, &NodesPayload { nodes })
}

pub fn end_transform<N: Serialize + ?Sized>(
    sender: impl Into<Sender>,
    nodes: &N,
) -> Result<Message, ProtocolError> {
    encode(sender.into(), Command::EndTransform, &NodesPayload { nodes })
}

pub fn add_marker(sender: impl Into<Sender>, marker: &Marker) -> Result<Message, ProtocolError> {
    encode(sender.into(), Command::AddMarker, &MarkerPayload { marker })
}

pub fn update_marker(
    sender: impl Into<Sender>,
    marker: &Marker,
) -> Result<Message, ProtocolError> {
    encode(sender.into(), Command::UpdateMarker, &MarkerPayload { marker })
}

pub fn delete_marker(sender: impl Into<Sender>, id: &MarkerId) -> Result<Message, ProtocolError> {
    let key = MarkerKey { id: id.clone() };
    encode(
        sender.into(),
        Command::DeleteMarker,
        &MarkerPayload { marker: &key },
    )
}

pub fn add_primitive(
    sender: impl Into<Sender>,
    primitive: &Primitive,
) -> Result<Message, ProtocolError> {
    encode(
        sender.into(),
        Command::AddPrimitive,
        &PrimitivePayload { primitive },
    )
}

pub fn lambda(sender: impl Into<Sender>, data: &Value) -> Result<Message, ProtocolError> {
    encode(sender.into(), Command::Lambda, &LambdaPayload { data })
}

#[cfg(test)]
mod tests {
    use glam::DVec3;
    use serde_json::json;

    use super::*;
    use crate::client::ClientRegistry;
    use crate::scene::NodeId;

    fn parse(message: &Message) -> Value {
        serde_json::from_str(message.as_str()).unwrap()
    }

    #[test]
    fn test_server_messages_use_reserved_sender() {
        let mut registry = ClientRegistry::new();
        let user = registry.create_client_with_color(Color([0.5, 0.25, 1.0]));

        let message = parse(&set_user(user, Some(Color([0.5, 0.25, 1.0]))).unwrap());
        assert_eq!(message["senderId"], json!(0xFFFF_FFFFu32));
        assert_eq!(message["command"], "SET_USER");
        assert_eq!(message["userId"], json!(user.id()));
        assert_eq!(message["color"], json!([0.5, 0.25, 1.0]));

        let message = parse(&remove_user(user).unwrap());
        assert_eq!(message["command"], "REMOVE_USER");
        assert!(message.get("color").is_none());
    }

    #[test]
    fn test_envelope_is_flat() {
        let mut registry = ClientRegistry::new();
        let sender = registry.create_client();
        let pointer = Pointer {
            origin: DVec3::ZERO,
            end: DVec3::new(1.0, 2.0, 3.0),
        };

        let message = parse(&update_pointer(sender, &pointer).unwrap());
        assert_eq!(message["senderId"], json!(sender.id()));
        assert_eq!(message["command"], "UPDATE_POINTER");
        assert_eq!(message["pointer"]["end"], json!([1.0, 2.0, 3.0]));

        let message = parse(&start_pointer(sender).unwrap());
        assert_eq!(message.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_marker_carries_only_id() {
        let message = parse(&delete_marker(Sender::Server, &MarkerId::from(5)).unwrap());
        assert_eq!(message["command"], "DELETE_MARKER");
        assert_eq!(message["marker"], json!({ "id": 5 }));
    }

    #[test]
    fn test_select_nodes_shape() {
        let message =
            parse(&select(Sender::Server, &[NodeRef::new("Pawn", NodeId(7))]).unwrap());
        assert_eq!(
            message["nodes"],
            json!([{ "name": "Pawn", "extras": { "nodeId": 7 } }])
        );
    }

    #[test]
    fn test_envelope_take_fields() {
        let text = json!({
            "senderId": 3,
            "command": "UPDATE_CAMERA",
            "viewMatrix": [1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1],
        })
        .to_string();
        let mut envelope = Envelope::decode(&text).unwrap();

        assert_eq!(envelope.command().unwrap(), Command::UpdateCamera);
        let pose: DMat4 = envelope.take("viewMatrix").unwrap();
        assert_eq!(pose, DMat4::IDENTITY);
        assert!(matches!(
            envelope.take::<DMat4>("viewMatrix"),
            Err(ProtocolError::MissingField("viewMatrix"))
        ));
    }

    #[test]
    fn test_envelope_rejects_malformed() {
        assert!(matches!(
            Envelope::decode("{not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(Envelope::decode(r#"{"senderId":1}"#).is_err());

        let mut envelope = Envelope::decode(r#"{"command":"UPDATE_CAMERA","viewMatrix":"x"}"#)
            .unwrap();
        assert!(matches!(
            envelope.take::<DMat4>("viewMatrix"),
            Err(ProtocolError::InvalidField { field: "viewMatrix", .. })
        ));
    }
}
