use tokio::sync::mpsc;

use crate::protocol::Message;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
}

/// Outbound half of one client's connection. Implementations must queue
/// without blocking so a slow recipient never stalls a broadcast.
pub trait Channel: Send {
    fn send(&self, message: Message) -> Result<(), ChannelError>;
}

impl Channel for mpsc::UnboundedSender<Message> {
    fn send(&self, message: Message) -> Result<(), ChannelError> {
        mpsc::UnboundedSender::send(self, message).map_err(|_| ChannelError::Closed)
    }
}
