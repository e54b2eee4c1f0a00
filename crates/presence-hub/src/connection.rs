//! Per-connection adapter: register with the hub, relay queued count
//! frames to the socket, and watch the socket for disconnection.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use presence_common::ConnectionId;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::hub::PresenceHub;

/// Why a visitor session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// Peer went away the ordinary way: close frame, reset, or EOF.
    Closed(String),
    /// The hub dropped this connection (failed broadcast or duplicate).
    Evicted,
    /// Anything the peer should not have done.
    Failed(String),
}

impl SessionEnd {
    pub(crate) fn is_anomaly(&self) -> bool {
        matches!(self, SessionEnd::Failed(_))
    }

    /// Classify a close frame received from the peer.
    pub(crate) fn from_close(frame: Option<CloseFrame>) -> Self {
        match frame {
            None => SessionEnd::Closed("close without status".into()),
            Some(frame) => match frame.code {
                CloseCode::Normal | CloseCode::Away | CloseCode::Abnormal | CloseCode::Status => {
                    SessionEnd::Closed(format!("close {}", u16::from(frame.code)))
                }
                code => SessionEnd::Failed(format!(
                    "close {} {}",
                    u16::from(code),
                    frame.reason.as_str()
                )),
            },
        }
    }

    /// Classify a transport or protocol error from reading or writing.
    pub(crate) fn from_error(err: &WsError) -> Self {
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                SessionEnd::Closed(err.to_string())
            }
            WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                SessionEnd::Closed(err.to_string())
            }
            WsError::Io(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::BrokenPipe
                        | io::ErrorKind::UnexpectedEof
                ) =>
            {
                SessionEnd::Closed(err.to_string())
            }
            _ => SessionEnd::Failed(err.to_string()),
        }
    }
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Closed(reason) | SessionEnd::Failed(reason) => f.write_str(reason),
            SessionEnd::Evicted => f.write_str("dropped by hub"),
        }
    }
}

/// Unregisters the connection when the session scope ends, however it ends.
struct Registration {
    hub: PresenceHub,
    id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

/// Handle a single upgraded visitor connection until it goes away.
pub async fn handle_connection<S>(ws: WebSocketStream<S>, peer: SocketAddr, hub: PresenceHub)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();

    let (conn, mut outbound) = hub.connect();
    let id = conn.id();

    if let Err(e) = hub.register(conn) {
        warn!(peer = %peer, connection = %id, error = %e, "Could not register visitor");
        let _ = sink.close().await;
        return;
    }
    let _registration = Registration {
        hub: hub.clone(),
        id,
    };

    debug!(peer = %peer, connection = %id, "Visitor session started");

    let end = loop {
        tokio::select! {
            // Count frames queued by the hub → this visitor's socket
            queued = outbound.recv() => match queued {
                Some(frame) => {
                    if let Err(e) = sink.send(Message::Text(frame.into())).await {
                        break SessionEnd::from_error(&e);
                    }
                }
                None => break SessionEnd::Evicted,
            },

            // Inbound frames only matter for liveness
            frame = stream.next() => match frame {
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => break SessionEnd::from_close(frame),
                Some(Ok(_)) => {}
                Some(Err(e)) => break SessionEnd::from_error(&e),
                None => break SessionEnd::Closed("stream ended".into()),
            },
        }
    };

    if end.is_anomaly() {
        warn!(peer = %peer, connection = %id, reason = %end, "Visitor connection error");
    } else {
        debug!(peer = %peer, connection = %id, reason = %end, "Visitor connection closed");
    }

    let _ = sink.close().await;
    info!(peer = %peer, connection = %id, "Visitor session ended");
}
