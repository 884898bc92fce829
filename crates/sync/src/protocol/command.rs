use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    NewUser,
    SetUser,
    RemoveUser,
    UpdateCamera,
    StartPointer,
    UpdatePointer,
    EndPointer,
    Select,
    Deselect,
    StartTransform,
    UpdateTransform,
    EndTransform,
    AddMarker,
    UpdateMarker,
    DeleteMarker,
    AddPrimitive,
    Lambda,
}

impl Command {
    pub const ALL: [Command; 17] = [
        Command::NewUser,
        Command::SetUser,
        Command::RemoveUser,
        Command::UpdateCamera,
        Command::StartPointer,
        Command::UpdatePointer,
        Command::EndPointer,
        Command::Select,
        Command::Deselect,
        Command::StartTransform,
        Command::UpdateTransform,
        Command::EndTransform,
        Command::AddMarker,
        Command::UpdateMarker,
        Command::DeleteMarker,
        Command::AddPrimitive,
        Command::Lambda,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::NewUser => "NEW_USER",
            Command::SetUser => "SET_USER",
            Command::RemoveUser => "REMOVE_USER",
            Command::UpdateCamera => "UPDATE_CAMERA",
            Command::StartPointer => "START_POINTER",
            Command::UpdatePointer => "UPDATE_POINTER",
            Command::EndPointer => "END_POINTER",
            Command::Select => "SELECT",
            Command::Deselect => "DESELECT",
            Command::StartTransform => "START_TRANSFORM",
            Command::UpdateTransform => "UPDATE_TRANSFORM",
            Command::EndTransform => "END_TRANSFORM",
            Command::AddMarker => "ADD_MARKER",
            Command::UpdateMarker => "UPDATE_MARKER",
            Command::DeleteMarker => "DELETE_MARKER",
            Command::AddPrimitive => "ADD_PRIMITIVE",
            Command::Lambda => "LAMBDA",
        }
    }

    /// Commands only the server may author.
    pub fn is_server_only(&self) -> bool {
        matches!(
            self,
            Command::NewUser | Command::SetUser | Command::RemoveUser
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownCommand(s.to_owned()))
    }
}
