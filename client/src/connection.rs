//! One Socket.IO connection to the rate push channel.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::codec::{
    decode_engine, decode_event, decode_socket, encode_connect, encode_disconnect, EnginePacket,
    Handshake, PushEvent, SocketPacket, PONG,
};
use crate::error::{ClientError, ClientResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open, namespace-connected push channel.
pub struct PushConnection {
    socket: WsStream,
    namespace: String,
    handshake: Handshake,
}

impl PushConnection {
    /// Open the WebSocket, complete the Engine.IO handshake and join
    /// `namespace`, all within `timeout`.
    #[instrument(skip_all, fields(url = %url, namespace = %namespace))]
    pub async fn connect(url: &Url, namespace: &str, timeout: Duration) -> ClientResult<Self> {
        tokio::time::timeout(timeout, Self::open(url, namespace))
            .await
            .map_err(|_| ClientError::WebSocket(format!("handshake timed out after {timeout:?}")))?
    }

    async fn open(url: &Url, namespace: &str) -> ClientResult<Self> {
        let (mut socket, _) = connect_async(url.as_str()).await?;

        let handshake = match next_text(&mut socket).await? {
            Some(frame) => match decode_engine(&frame)? {
                EnginePacket::Open(handshake) => handshake,
                other => {
                    return Err(ClientError::Protocol(format!(
                        "expected open packet, got {other:?}"
                    )))
                }
            },
            None => return Err(ClientError::Protocol("closed during handshake".into())),
        };
        debug!(sid = %handshake.sid, ping_interval = handshake.ping_interval, "Engine.IO open");

        socket.send(Message::Text(encode_connect(namespace))).await?;

        loop {
            let Some(frame) = next_text(&mut socket).await? else {
                return Err(ClientError::Protocol("closed before namespace connect".into()));
            };
            match decode_engine(&frame)? {
                EnginePacket::Ping => socket.send(Message::Text(PONG.to_string())).await?,
                EnginePacket::Message(body) => match decode_socket(&body)? {
                    SocketPacket::Connect { namespace: joined } if joined == namespace => break,
                    SocketPacket::ConnectError { message, .. } => {
                        return Err(ClientError::Protocol(format!(
                            "namespace {namespace} refused: {message}"
                        )))
                    }
                    other => debug!(packet = ?other, "Ignoring packet before connect"),
                },
                EnginePacket::Close => {
                    return Err(ClientError::Protocol("closed before namespace connect".into()))
                }
                _ => {}
            }
        }

        info!(sid = %handshake.sid, "Push channel connected");
        Ok(Self {
            socket,
            namespace: namespace.to_string(),
            handshake,
        })
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// Wait for the next rate event.
    ///
    /// Pings are answered along the way. Returns `Ok(None)` when the server
    /// closes the channel, and an error when no traffic arrives within the
    /// negotiated ping window.
    pub async fn next_event(&mut self) -> ClientResult<Option<PushEvent>> {
        let liveness = self.handshake.liveness();

        loop {
            let frame = match tokio::time::timeout(liveness, next_text(&mut self.socket)).await {
                Ok(frame) => frame?,
                Err(_) => {
                    return Err(ClientError::WebSocket(format!(
                        "no ping within {liveness:?}"
                    )))
                }
            };
            let Some(frame) = frame else {
                return Ok(None);
            };

            match decode_engine(&frame)? {
                EnginePacket::Ping => {
                    self.socket.send(Message::Text(PONG.to_string())).await?;
                }
                EnginePacket::Close => return Ok(None),
                EnginePacket::Message(body) => {
                    let packet = match decode_socket(&body) {
                        Ok(packet) => packet,
                        Err(err) => {
                            warn!(error = %err, "Dropping malformed packet");
                            continue;
                        }
                    };
                    if packet.namespace() != self.namespace {
                        continue;
                    }
                    match packet {
                        SocketPacket::Event { name, payload, .. } => {
                            match decode_event(&name, payload) {
                                Ok(event) => return Ok(Some(event)),
                                Err(err) => {
                                    warn!(event = %name, error = %err, "Dropping malformed event")
                                }
                            }
                        }
                        SocketPacket::Disconnect { .. } => {
                            info!("Server disconnected namespace");
                            return Ok(None);
                        }
                        other => debug!(packet = ?other, "Ignoring packet"),
                    }
                }
                _ => {}
            }
        }
    }

    /// Leave the namespace and close the WebSocket.
    pub async fn close(mut self) -> ClientResult<()> {
        let disconnect = encode_disconnect(&self.namespace);
        if let Err(err) = self.socket.send(Message::Text(disconnect)).await {
            debug!(error = %err, "Disconnect packet not sent");
        }
        self.socket.close(None).await?;
        debug!("Push channel closed");
        Ok(())
    }
}

/// Next text frame, or `None` once the socket is closed.
async fn next_text(socket: &mut WsStream) -> ClientResult<Option<String>> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return Ok(Some(text)),
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => return Ok(Some(text)),
                Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
            },
            Some(Ok(Message::Ping(payload))) => socket.send(Message::Pong(payload)).await?,
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(err.into()),
        }
    }
}
