// WebSocket client for talking to the signaling relay.
//
// `SignalClient` is a thin async wrapper over a `tokio-tungstenite` stream
// that speaks the protocol crate's typed messages. It exists so integration
// tests (and small tools) can drive a relay end-to-end without a browser.
//
// Reads skip WebSocket control frames. Reading also lets tungstenite answer
// the relay's keepalive pings, so a client that stops reading will
// eventually be dropped as idle, just like a real one.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use vibenet_protocol::{ClientMessage, ProtocolError, ServerMessage, decode_server, encode_client};

/// How long `recv` waits before giving up.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("connection closed by relay")]
    Closed,
    #[error("no message within {0:?}")]
    Timeout(Duration),
}

pub struct SignalClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl SignalClient {
    /// Connect to a relay at `url` (e.g. `ws://127.0.0.1:8080`).
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws, _response) = connect_async(url).await?;
        Ok(Self { ws })
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> Result<(), ClientError> {
        let text = encode_client(msg)?;
        self.send_raw(&text).await
    }

    /// Send an arbitrary text frame, well-formed or not.
    pub async fn send_raw(&mut self, text: &str) -> Result<(), ClientError> {
        self.ws.send(Message::Text(text.to_owned().into())).await?;
        Ok(())
    }

    /// Send a binary frame carrying arbitrary bytes.
    pub async fn send_binary(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.ws.send(Message::Binary(bytes.to_vec().into())).await?;
        Ok(())
    }

    /// Send a WebSocket ping. Any inbound frame keeps the connection from
    /// being dropped as idle.
    pub async fn ping(&mut self) -> Result<(), ClientError> {
        self.ws.send(Message::Ping(Default::default())).await?;
        Ok(())
    }

    /// Next message from the relay, waiting at most `DEFAULT_RECV_TIMEOUT`.
    pub async fn recv(&mut self) -> Result<ServerMessage, ClientError> {
        self.try_recv_for(DEFAULT_RECV_TIMEOUT)
            .await?
            .ok_or(ClientError::Timeout(DEFAULT_RECV_TIMEOUT))
    }

    /// Next message from the relay, or `None` if nothing arrives within
    /// `wait`. Useful for asserting that a client was told nothing.
    pub async fn try_recv_for(
        &mut self,
        wait: Duration,
    ) -> Result<Option<ServerMessage>, ClientError> {
        match tokio::time::timeout(wait, self.next_message()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Send a close frame and wait for the relay to finish the close
    /// handshake.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.ws.close(None).await?;
        while let Some(frame) = self.ws.next().await {
            if frame.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Result<ServerMessage, ClientError> {
        loop {
            let Some(frame) = self.ws.next().await else {
                return Err(ClientError::Closed);
            };
            match frame? {
                Message::Text(text) => return Ok(decode_server(text.as_str())?),
                Message::Close(_) => return Err(ClientError::Closed),
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}
