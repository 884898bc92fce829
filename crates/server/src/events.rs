use scenesync::{ClientHandle, Message};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum InboundEvent {
    Connected {
        outbox: mpsc::UnboundedSender<Message>,
        reply: oneshot::Sender<ClientHandle>,
    },
    Message {
        handle: ClientHandle,
        text: String,
    },
    Disconnected {
        handle: ClientHandle,
        reason: DisconnectReason,
    },
}

#[derive(Debug, Clone, Copy)]
pub enum DisconnectReason {
    Graceful,
    Dropped,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "closed the connection",
            DisconnectReason::Dropped => "dropped",
        }
    }
}
