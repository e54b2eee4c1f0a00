//! Upgrade endpoint: TCP accept loop plus a path-checked WebSocket
//! handshake. No authentication, any origin.

use std::sync::Arc;
use std::time::Duration;

use presence_common::{PresenceError, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{info, warn};

use crate::connection::handle_connection;
use crate::hub::PresenceHub;


/// Bind the listening socket.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Visitor endpoint listening");
    Ok(listener)
}

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause before retrying after `failures` consecutive accept errors.
/// Doubles from 10ms up to one second.
pub(crate) fn accept_backoff(failures: u32) -> Duration {
    let factor = 1u32 << failures.saturating_sub(1).min(7);
    (ACCEPT_BACKOFF_MIN * factor).min(ACCEPT_BACKOFF_MAX)
}

/// Accept connections forever, upgrading each one on its own task.
///
/// Accept errors (e.g. out of file descriptors) pause the loop with a
/// growing backoff that resets on the next success.
pub async fn serve(listener: TcpListener, hub: PresenceHub, ws_path: &str) {
    let ws_path: Arc<str> = Arc::from(ws_path);
    let mut failures: u32 = 0;

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                failures = 0;
                let hub = hub.clone();
                let ws_path = Arc::clone(&ws_path);
                tokio::spawn(async move {
                    match accept(stream, &ws_path).await {
                        Ok(ws) => handle_connection(ws, peer, hub).await,
                        Err(e) => warn!(peer = %peer, error = %e, "Visitor upgrade failed"),
                    }
                });
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let pause = accept_backoff(failures);
                warn!(error = %e, failures, retry_in = ?pause, "TCP accept error");
                tokio::time::sleep(pause).await;
            }
        }
    }
}

/// Run the WebSocket handshake, refusing any path but `ws_path`.
async fn accept(stream: TcpStream, ws_path: &str) -> Result<WebSocketStream<TcpStream>> {
    let callback = |req: &Request, resp: Response| check_upgrade(ws_path, req, resp);
    accept_hdr_async(stream, callback)
        .await
        .map_err(|e| PresenceError::Handshake(e.to_string()))
}

/// Handshake callback: 404 for other paths, open CORS for the endpoint.
pub(crate) fn check_upgrade(
    ws_path: &str,
    req: &Request,
    mut resp: Response,
) -> std::result::Result<Response, ErrorResponse> {
    if req.uri().path() != ws_path {
        let mut refusal = ErrorResponse::new(Some("not found".into()));
        *refusal.status_mut() = StatusCode::NOT_FOUND;
        return Err(refusal);
    }

    resp.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    Ok(resp)
}
