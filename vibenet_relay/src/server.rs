// WebSocket listener, connection tasks, and the main event loop.
//
// Architecture: task-per-connection with a central `mpsc` channel.
//
// - **Event loop task** (`run_relay`): owns the `TcpListener` and the
//   `Matchmaker`. Accepts sockets and spawns a connection task for each, and
//   receives `InternalEvent`s from those tasks and dispatches them. Because
//   only this task ever touches the matchmaker, every matchmaking operation
//   runs to completion before the next one starts.
// - **Connection tasks** (one per client, `run_connection`): perform the
//   WebSocket handshake, then loop over three sources: inbound frames
//   (forwarded as `InternalEvent::MessageFrom`), the connection's outbound
//   queue (written to the socket), and the keepalive ping timer. Any read
//   error, close frame, idle timeout, or write error ends the task, which
//   then sends exactly one `InternalEvent::Disconnected`.
//
// The event loop never writes to sockets itself. `ConnectionRegistry` is the
// matchmaker's `Outbox`: it encodes each message once and pushes the text
// onto the target connection's unbounded queue, so a slow client can never
// stall matchmaking.
//
// Shutdown: `RelayHandle::stop` flips a `watch` flag. The event loop exits,
// dropping the registry and with it every outbound queue; each connection
// task sees its queue close and shuts its socket.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, error, info, warn};
use vibenet_protocol::{
    CONNECTED_GREETING, ConnectionId, MAX_MESSAGE_SIZE, ServerMessage, encode_server,
};

use crate::matchmaker::{BlockPolicy, Matchmaker};
use crate::outbox::Outbox;

/// Events sent from connection tasks to the event loop.
enum InternalEvent {
    NewConnection {
        id: ConnectionId,
        outbound: mpsc::UnboundedSender<String>,
    },
    MessageFrom {
        id: ConnectionId,
        text: String,
    },
    Disconnected {
        id: ConnectionId,
    },
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Configuration for starting a relay server.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub bind_addr: IpAddr,
    /// `0` lets the OS pick a free port.
    pub port: u16,
    pub ping_interval: Duration,
    /// A connection with no inbound frame (pongs included) for this long is
    /// treated as disconnected.
    pub idle_timeout: Duration,
    pub block_policy: BlockPolicy,
    /// Room-id PRNG seed. `None` draws one from OS randomness.
    pub seed: Option<u64>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            ping_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            block_policy: BlockPolicy::default(),
            seed: None,
        }
    }
}

/// Handle returned by `start_relay` to control the running server. Dropping
/// it also stops the relay.
pub struct RelayHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for the event loop to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Bind the listener and spawn the event loop. Returns a handle for stopping
/// it and the actual bound address (useful when port 0 is used).
pub async fn start_relay(config: RelayConfig) -> Result<(RelayHandle, SocketAddr), RelayError> {
    let requested = SocketAddr::new(config.bind_addr, config.port);
    let listener = TcpListener::bind(requested)
        .await
        .map_err(|source| RelayError::Bind {
            addr: requested,
            source,
        })?;
    let addr = listener.local_addr()?;
    let (shutdown, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(run_relay(listener, config, shutdown_rx));

    Ok((RelayHandle { shutdown, task }, addr))
}

/// Per-connection timing, copied into each connection task.
#[derive(Clone, Copy)]
struct ConnectionSettings {
    ping_interval: Duration,
    idle_timeout: Duration,
}

/// Main relay loop. Runs until the shutdown flag is set.
async fn run_relay(
    listener: TcpListener,
    config: RelayConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let seed = config.seed.unwrap_or_else(rand::random);
    debug!(seed, "room id seed");
    let mut matchmaker = Matchmaker::new(ConnectionRegistry::default(), seed, config.block_policy);
    let settings = ConnectionSettings {
        ping_interval: config.ping_interval,
        idle_timeout: config.idle_timeout,
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut next_id = 0u64;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let id = ConnectionId(next_id);
                    next_id += 1;
                    debug!(conn = %id, %peer, "accepted socket");
                    tokio::spawn(run_connection(stream, peer, id, tx.clone(), settings));
                }
                Err(e) => warn!(error = %RelayError::Io(e), "accept failed"),
            },
            Some(event) = rx.recv() => handle_event(&mut matchmaker, event),
        }
    }

    info!(
        connections = matchmaker.outbox().len(),
        rooms = matchmaker.room_count(),
        "relay stopped"
    );
}

/// Dispatch a single event to the matchmaker.
fn handle_event(matchmaker: &mut Matchmaker<ConnectionRegistry>, event: InternalEvent) {
    match event {
        InternalEvent::NewConnection { id, outbound } => {
            let registry = matchmaker.outbox_mut();
            registry.register(id, outbound);
            registry.send(
                id,
                &ServerMessage::Connected {
                    message: CONNECTED_GREETING.into(),
                },
            );
            info!(conn = %id, connections = registry.len(), "connected");
            matchmaker.admit(id, None);
        }
        InternalEvent::MessageFrom { id, text } => {
            matchmaker.on_message(id, &text);
        }
        InternalEvent::Disconnected { id } => {
            matchmaker.retire(id);
            let registry = matchmaker.outbox_mut();
            registry.unregister(id);
            info!(conn = %id, connections = registry.len(), "disconnected");
        }
    }
}

/// Live connections, keyed by handle. The matchmaker's `Outbox`.
#[derive(Default)]
struct ConnectionRegistry {
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<String>>,
}

impl ConnectionRegistry {
    fn register(&mut self, id: ConnectionId, outbound: mpsc::UnboundedSender<String>) {
        self.connections.insert(id, outbound);
    }

    fn unregister(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    fn len(&self) -> usize {
        self.connections.len()
    }
}

impl Outbox for ConnectionRegistry {
    fn send(&mut self, to: ConnectionId, msg: &ServerMessage) {
        let Some(outbound) = self.connections.get(&to) else {
            debug!(conn = %to, "send to unknown connection ignored");
            return;
        };
        match encode_server(msg) {
            // A closed queue means the connection task is already on its way
            // out; its Disconnected event will follow.
            Ok(text) => {
                let _ = outbound.send(text);
            }
            Err(e) => error!(conn = %to, error = %e, "failed to encode outbound message"),
        }
    }
}

/// Connection task: handshake, then pump frames both ways until the socket
/// closes, goes idle, or the event loop drops our outbound queue.
async fn run_connection(
    stream: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
    events: mpsc::UnboundedSender<InternalEvent>,
    settings: ConnectionSettings,
) {
    let ws_config = WebSocketConfig::default()
        .max_message_size(Some(MAX_MESSAGE_SIZE))
        .max_frame_size(Some(MAX_MESSAGE_SIZE));
    let ws = match accept_async_with_config(stream, Some(ws_config)).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(conn = %id, %peer, error = %RelayError::Handshake(e), "dropping socket");
            return;
        }
    };

    let (outbound, mut queue) = mpsc::unbounded_channel();
    if events
        .send(InternalEvent::NewConnection { id, outbound })
        .is_err()
    {
        return;
    }

    let (mut sink, mut frames) = ws.split();
    let mut ping = tokio::time::interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_inbound = Instant::now();

    let reason = loop {
        tokio::select! {
            frame = frames.next() => {
                let msg = match frame {
                    None => break "stream ended",
                    Some(Err(e)) => {
                        debug!(conn = %id, error = %e, "read failed");
                        break "read error";
                    }
                    Some(Ok(msg)) => msg,
                };
                last_inbound = Instant::now();
                match msg {
                    Message::Text(text) => {
                        let _ = events.send(InternalEvent::MessageFrom {
                            id,
                            text: text.as_str().to_owned(),
                        });
                    }
                    Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => {
                            let _ = events.send(InternalEvent::MessageFrom { id, text });
                        }
                        Err(_) => debug!(conn = %id, "dropping non-UTF-8 binary frame"),
                    },
                    Message::Close(_) => break "closed by peer",
                    // Pongs only refresh liveness; pings are answered by the
                    // protocol layer on the next write.
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                }
            }
            queued = queue.recv() => {
                let Some(text) = queued else {
                    break "relay shutting down";
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    debug!(conn = %id, error = %e, "write failed");
                    break "write error";
                }
            }
            _ = ping.tick() => {
                if let Err(e) = sink.send(Message::Ping(Default::default())).await {
                    debug!(conn = %id, error = %e, "ping failed");
                    break "write error";
                }
            }
            _ = tokio::time::sleep_until(last_inbound + settings.idle_timeout) => {
                break "idle timeout";
            }
        }
    };

    debug!(conn = %id, reason, "connection task ending");
    let _ = events.send(InternalEvent::Disconnected { id });
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use vibenet_protocol::{Role, decode_server};

    fn registry_with(id: ConnectionId) -> (ConnectionRegistry, mpsc::UnboundedReceiver<String>) {
        let mut registry = ConnectionRegistry::default();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(id, tx);
        (registry, rx)
    }

    #[test]
    fn default_config_matches_deployment() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.idle_timeout, config.ping_interval * 2);
        assert_eq!(config.block_policy, BlockPolicy::Retain);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn registry_encodes_and_queues() {
        let id = ConnectionId(5);
        let (mut registry, mut rx) = registry_with(id);

        registry.send(id, &ServerMessage::NextUser);

        let text = rx.try_recv().unwrap();
        assert_eq!(decode_server(&text).unwrap(), ServerMessage::NextUser);
    }

    #[test]
    fn registry_ignores_unknown_and_closed_connections() {
        let id = ConnectionId(5);
        let (mut registry, rx) = registry_with(id);
        drop(rx);

        registry.send(id, &ServerMessage::DeleteUser);
        registry.send(ConnectionId(6), &ServerMessage::DeleteUser);
        registry.unregister(id);
        registry.send(id, &ServerMessage::DeleteUser);

        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn events_drive_matchmaker() {
        let mut matchmaker = Matchmaker::new(ConnectionRegistry::default(), 3, BlockPolicy::Retain);
        let (a, b) = (ConnectionId(0), ConnectionId(1));
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        handle_event(&mut matchmaker, InternalEvent::NewConnection { id: a, outbound: tx_a });
        handle_event(&mut matchmaker, InternalEvent::NewConnection { id: b, outbound: tx_b });

        let greeting = ServerMessage::Connected {
            message: CONNECTED_GREETING.into(),
        };
        assert_eq!(decode_server(&rx_a.try_recv().unwrap()).unwrap(), greeting);
        assert_eq!(decode_server(&rx_b.try_recv().unwrap()).unwrap(), greeting);

        let room_id = matchmaker.room_of(a).unwrap();
        assert_eq!(
            decode_server(&rx_b.try_recv().unwrap()).unwrap(),
            ServerMessage::Ownership {
                room_id,
                data: Role::Sender
            }
        );
        assert_eq!(
            decode_server(&rx_a.try_recv().unwrap()).unwrap(),
            ServerMessage::Ownership {
                room_id,
                data: Role::Receiver
            }
        );

        handle_event(&mut matchmaker, InternalEvent::MessageFrom {
            id: a,
            text: format!(r#"{{"type":"chat","Roomid":"{room_id}","message":"yo"}}"#),
        });
        assert_eq!(
            decode_server(&rx_b.try_recv().unwrap()).unwrap(),
            ServerMessage::Chat {
                room_id,
                message: "yo".into()
            }
        );

        handle_event(&mut matchmaker, InternalEvent::Disconnected { id: b });
        assert_eq!(
            decode_server(&rx_a.try_recv().unwrap()).unwrap(),
            ServerMessage::DeleteUser
        );
        assert_eq!(matchmaker.outbox().len(), 1);
        assert_eq!(matchmaker.waiting(), vec![a]);
    }
}
