use crate::adapters::socketio::{
    connect_error_message, is_auth_rejection, EnginePacket, OpenInfo, SocketPacket,
};
use crate::domain::model::{DisconnectReason, TransportEvent};
use crate::domain::ports::{Session, Transport};
use crate::utils::error::{AuthSource, LiveError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SESSION_CHANNEL_CAPACITY: usize = 256;

/// `http(s)://host[:port]/...` → `ws(s)://host[:port]/socket.io/?EIO=4&transport=websocket`
pub fn websocket_url(base_url: &str) -> Result<String> {
    let mut url = Url::parse(base_url).map_err(|e| LiveError::ConfigError {
        message: format!("invalid base URL '{}': {}", base_url, e),
    })?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(LiveError::ConfigError {
                message: format!("unsupported URL scheme '{}'", other),
            })
        }
    };
    url.set_scheme(scheme).map_err(|_| LiveError::ConfigError {
        message: format!("cannot use scheme '{}' for {}", scheme, base_url),
    })?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url.to_string())
}

/// Socket.IO client transport over a plain websocket (no polling upgrade
/// dance, no library-level reconnection).
#[derive(Debug, Clone)]
pub struct SocketIoTransport {
    url: String,
    namespace: String,
    cookie: Option<String>,
    identity: Option<String>,
    connect_timeout: Duration,
}

impl SocketIoTransport {
    pub fn new(base_url: &str, namespace: &str) -> Result<Self> {
        Ok(Self {
            url: websocket_url(base_url)?,
            namespace: namespace.to_string(),
            cookie: None,
            identity: None,
            connect_timeout: Duration::from_secs(10),
        })
    }

    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_identity(mut self, identity: Option<String>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request(&self) -> Result<ClientRequestBuilder> {
        let uri = self.url.parse::<Uri>().map_err(|e| LiveError::ConfigError {
            message: format!("invalid websocket URL '{}': {}", self.url, e),
        })?;
        let mut request = ClientRequestBuilder::new(uri);
        if let Some(cookie) = &self.cookie {
            request = request.with_header("Cookie", cookie.clone());
        }
        Ok(request)
    }

    async fn handshake(&self) -> Result<(WsStream, OpenInfo)> {
        let (mut ws, _) = connect_async(self.request()?)
            .await
            .map_err(map_upgrade_error)?;

        let open = loop {
            match next_engine_packet(&mut ws).await? {
                EnginePacket::Open(info) => break info,
                EnginePacket::Noop => continue,
                other => {
                    return Err(LiveError::protocol(format!(
                        "expected OPEN packet, got {:?}",
                        other
                    )))
                }
            }
        };
        tracing::debug!(
            "Engine.IO session {} (ping {}ms / timeout {}ms)",
            open.sid,
            open.ping_interval,
            open.ping_timeout
        );

        let connect = SocketPacket::Connect {
            nsp: self.namespace.clone(),
            data: self.identity.as_ref().map(|id| json!({ "identity": id })),
        };
        ws.send(Message::Text(connect.to_frame())).await?;

        loop {
            match next_engine_packet(&mut ws).await? {
                EnginePacket::Ping => {
                    ws.send(Message::Text(EnginePacket::Pong.encode())).await?;
                }
                EnginePacket::Message(body) => match SocketPacket::decode(&body)? {
                    SocketPacket::Connect { nsp, .. } if nsp == self.namespace => {
                        return Ok((ws, open));
                    }
                    SocketPacket::ConnectError { nsp, data } if nsp == self.namespace => {
                        let message = connect_error_message(&data);
                        return Err(if is_auth_rejection(&message) {
                            LiveError::unauthorized(AuthSource::Transport, message)
                        } else {
                            LiveError::connect(message)
                        });
                    }
                    other => tracing::debug!("Ignoring packet before namespace connect: {:?}", other),
                },
                EnginePacket::Close => {
                    return Err(LiveError::connect("server closed the session during handshake"))
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl Transport for SocketIoTransport {
    async fn open(&self) -> Result<Session> {
        tracing::debug!("Connecting to {} namespace {}", self.url, self.namespace);

        let (ws, open) = tokio::time::timeout(self.connect_timeout, self.handshake())
            .await
            .map_err(|_| LiveError::Timeout {
                operation: format!("connecting to namespace {}", self.namespace),
                seconds: self.connect_timeout.as_secs(),
            })??;

        let (events_tx, events_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let (close_tx, close_rx) = oneshot::channel();
        let heartbeat = open.heartbeat();

        tokio::spawn(run_session(
            ws,
            self.namespace.clone(),
            heartbeat,
            events_tx,
            close_rx,
        ));

        Ok(Session::new(events_rx, close_tx))
    }
}

fn map_upgrade_error(error: tungstenite::Error) -> LiveError {
    if let tungstenite::Error::Http(response) = &error {
        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return LiveError::unauthorized(
                AuthSource::Transport,
                format!("websocket upgrade rejected with HTTP {}", status),
            );
        }
    }
    LiveError::WebSocketError(error)
}

async fn next_engine_packet(ws: &mut WsStream) -> Result<EnginePacket> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return EnginePacket::decode(&text),
            Some(Ok(Message::Close(_))) | None => {
                return Err(LiveError::connect("websocket closed during handshake"))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// Reader loop of one open session. Ends on close request, session drop,
/// server disconnect, socket close or missed heartbeat.
async fn run_session(
    mut ws: WsStream,
    namespace: String,
    heartbeat: Duration,
    events: mpsc::Sender<TransportEvent>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let mut deadline = Instant::now() + heartbeat;

    let reason = loop {
        tokio::select! {
            _ = &mut close_rx => {
                // 主動關閉或 Session 被丟棄
                let goodbye = SocketPacket::Disconnect { nsp: namespace.clone() }.to_frame();
                let _ = ws.send(Message::Text(goodbye)).await;
                let _ = ws.close(None).await;
                tracing::debug!("Closed session on {}", namespace);
                return;
            }
            _ = tokio::time::sleep_until(deadline) => {
                break DisconnectReason::PingTimeout;
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let packet = match EnginePacket::decode(&text) {
                        Ok(packet) => packet,
                        Err(e) => {
                            tracing::warn!("Dropping undecodable frame: {}", e);
                            continue;
                        }
                    };
                    match packet {
                        EnginePacket::Ping => {
                            deadline = Instant::now() + heartbeat;
                            if let Err(e) = ws.send(Message::Text(EnginePacket::Pong.encode())).await {
                                break DisconnectReason::TransportError(e.to_string());
                            }
                        }
                        EnginePacket::Close => break DisconnectReason::TransportClose,
                        EnginePacket::Message(body) => match SocketPacket::decode(&body) {
                            Ok(packet) if packet.nsp() != namespace => {
                                tracing::debug!("Ignoring packet for namespace {}", packet.nsp());
                            }
                            Ok(SocketPacket::Event { name, payload, .. }) => {
                                if events.send(TransportEvent::Event { name, payload }).await.is_err() {
                                    return;
                                }
                            }
                            Ok(SocketPacket::Disconnect { .. }) => {
                                break DisconnectReason::ServerClose;
                            }
                            Ok(other) => tracing::debug!("Ignoring packet: {:?}", other),
                            Err(e) => tracing::warn!("Dropping undecodable packet: {}", e),
                        },
                        _ => {}
                    }
                }
                Some(Ok(Message::Close(_))) | None => break DisconnectReason::TransportClose,
                Some(Ok(_)) => {}
                Some(Err(e)) => break DisconnectReason::TransportError(e.to_string()),
            },
        }
    };

    tracing::debug!("Session on {} ended: {:?}", namespace, reason);
    let _ = events.send(TransportEvent::Disconnected(reason)).await;
}
