use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use scenesync::{Message, SyncEngine};

use crate::config::ServerConfig;
use crate::events::{DisconnectReason, InboundEvent};

pub struct EditorServer {
    listener: TcpListener,
    config: ServerConfig,
    live: Arc<AtomicUsize>,
}

impl EditorServer {
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        Ok(Self {
            listener,
            config,
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the future is dropped. The engine lives on
    /// its own task; connection tasks only talk to it through events.
    pub async fn run(self, engine: SyncEngine) -> io::Result<()> {
        let (events, inbox) = mpsc::unbounded_channel();
        tokio::spawn(run_engine(engine, inbox));

        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::warn!("Accept failed: {}", e);
                    continue;
                }
            };

            let Some(slot) = ConnectionSlot::acquire(&self.live, self.config.max_clients) else {
                log::warn!(
                    "Connection denied to {}: server full ({} clients)",
                    addr,
                    self.config.max_clients
                );
                continue;
            };

            let _ = stream.set_nodelay(true);
            tokio::spawn(handle_connection(
                stream,
                addr,
                events.clone(),
                slot,
                self.config.outbound_warn_threshold,
            ));
        }
    }
}

struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(live: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        live.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| Self(Arc::clone(live)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run_engine(mut engine: SyncEngine, mut inbox: mpsc::UnboundedReceiver<InboundEvent>) {
    while let Some(event) = inbox.recv().await {
        match event {
            InboundEvent::Connected { outbox, reply } => match engine.connect(Box::new(outbox)) {
                Ok(handle) => {
                    if reply.send(handle).is_err() {
                        let _ = engine.disconnect(handle);
                    }
                }
                Err(e) => log::error!("Failed to register client: {}", e),
            },
            InboundEvent::Message { handle, text } => engine.handle_message_logged(handle, &text),
            InboundEvent::Disconnected { handle, reason } => {
                log::debug!("Client {} {}", handle, reason.as_str());
                if let Err(e) = engine.disconnect(handle) {
                    log::error!("Failed to disconnect client {}: {}", handle, e);
                }
            }
        }
    }
    log::info!("Engine stopped");
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    events: mpsc::UnboundedSender<InboundEvent>,
    _slot: ConnectionSlot,
    warn_threshold: usize,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            log::warn!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };
    let (mut write_half, mut read_half) = ws_stream.split();

    let (outbox, mut queue) = mpsc::unbounded_channel::<Message>();
    let (reply, registered) = oneshot::channel();
    if events.send(InboundEvent::Connected { outbox, reply }).is_err() {
        return;
    }
    let Ok(handle) = registered.await else {
        let _ = write_half.close().await;
        return;
    };
    log::debug!("Client {} bound to {}", handle, addr);

    let write_task = tokio::spawn(async move {
        let mut backlogged = false;
        while let Some(message) = queue.recv().await {
            let backlog = queue.len();
            if backlog >= warn_threshold && !backlogged {
                log::warn!("Client {} has {} queued messages", handle, backlog);
            }
            backlogged = backlog >= warn_threshold;

            let frame = WsMessage::Text(message.as_str().to_owned().into());
            if write_half.send(frame).await.is_err() {
                break;
            }
        }
        let _ = write_half.close().await;
    });

    let reason = loop {
        match read_half.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                let event = InboundEvent::Message {
                    handle,
                    text: text.as_str().to_owned(),
                };
                if events.send(event).is_err() {
                    break DisconnectReason::Dropped;
                }
            }
            Some(Ok(WsMessage::Binary(data))) => {
                log::debug!("Ignoring {} byte binary frame from client {}", data.len(), handle);
            }
            Some(Ok(WsMessage::Close(_))) => break DisconnectReason::Graceful,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                log::debug!("Read error from client {}: {}", handle, e);
                break DisconnectReason::Dropped;
            }
            None => break DisconnectReason::Dropped,
        }
    };

    let _ = events.send(InboundEvent::Disconnected { handle, reason });
    let _ = write_task.await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use scenesync::Scene;
    use serde_json::{Value, json};
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

    use super::*;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start(max_clients: usize) -> SocketAddr {
        let config = ServerConfig {
            bind: "127.0.0.1".to_string(),
            port: 0,
            max_clients,
            ..Default::default()
        };
        let server = EditorServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run(SyncEngine::new(Scene::new())));
        addr
    }

    async fn next_command(client: &mut Client, command: &str) -> Value {
        let wait = async {
            loop {
                let frame = client.next().await.unwrap().unwrap();
                if let WsMessage::Text(text) = frame {
                    let value: Value = serde_json::from_str(text.as_str()).unwrap();
                    if value["command"] == command {
                        return value;
                    }
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait).await.unwrap()
    }

    #[tokio::test]
    async fn test_relay_between_clients() {
        let addr = start(8).await;
        let url = format!("ws://{}", addr);

        let (mut a, _) = connect_async(url.as_str()).await.unwrap();
        let set_a = next_command(&mut a, "SET_USER").await;
        let (mut b, _) = connect_async(url.as_str()).await.unwrap();
        next_command(&mut b, "SET_USER").await;

        let lambda = json!({ "command": "LAMBDA", "data": { "note": "hi" } });
        a.send(WsMessage::Text(lambda.to_string().into())).await.unwrap();

        let relayed = next_command(&mut b, "LAMBDA").await;
        assert_eq!(relayed["senderId"], set_a["userId"]);
        assert_eq!(relayed["data"]["note"], "hi");

        a.close(None).await.unwrap();
        let removed = next_command(&mut b, "REMOVE_USER").await;
        assert_eq!(removed["userId"], set_a["userId"]);
    }

    #[tokio::test]
    async fn test_connections_beyond_limit_are_closed() {
        let addr = start(1).await;
        let url = format!("ws://{}", addr);

        let (mut first, _) = connect_async(url.as_str()).await.unwrap();
        next_command(&mut first, "SET_USER").await;

        assert!(connect_async(url.as_str()).await.is_err());
    }

    #[test]
    fn test_slot_released_on_drop() {
        let live = Arc::new(AtomicUsize::new(0));
        let slot = ConnectionSlot::acquire(&live, 1).unwrap();
        assert!(ConnectionSlot::acquire(&live, 1).is_none());

        drop(slot);
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert!(ConnectionSlot::acquire(&live, 1).is_some());
    }
}
