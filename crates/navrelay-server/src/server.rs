//! [`ServiceServer`] – WebSocket endpoint for the navigation services.
//!
//! Listens on `0.0.0.0:9091` (configurable via [`ServiceServer::with_port`]).
//!
//! * Regular HTTP requests → 200 OK with the JSON service index.
//! * WebSocket upgrades → `call_service` / `service_response` exchange.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use navrelay_middleware::Relay;
use navrelay_runtime::Navigator;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::protocol::{ServiceCall, ServiceResponse};
use crate::services::{dispatch, service_index};

/// Default TCP port for the service server.
pub const DEFAULT_PORT: u16 = 9091;

/// Default per-connection call budget.
pub const DEFAULT_MAX_CALLS_PER_SECOND: u32 = 10;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot bind {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },

    #[error("websocket handshake with {peer} failed: {reason}")]
    Handshake { peer: SocketAddr, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// ServiceServer
// ---------------------------------------------------------------------------

/// Exposes a [`Navigator`] as rosbridge-style services.
///
/// Every WebSocket connection gets its own rate limiter; calls beyond the
/// budget are answered with an error instead of being queued.  Each accepted
/// call runs on its own task, so a long `/move_to` never blocks a `/get_pose`
/// on the same connection.  When the connection goes away its unfinished
/// calls are aborted, so a queued goal of a departed caller is never sent.
pub struct ServiceServer<R: Relay + 'static> {
    navigator: Arc<Navigator<R>>,
    port: u16,
    max_calls_per_second: u32,
}

impl<R: Relay + 'static> ServiceServer<R> {
    /// Create a server on the [`DEFAULT_PORT`].
    pub fn new(navigator: Arc<Navigator<R>>) -> Self {
        Self {
            navigator,
            port: DEFAULT_PORT,
            max_calls_per_second: DEFAULT_MAX_CALLS_PER_SECOND,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the per-connection call budget.  `0` disables limiting.
    pub fn with_max_calls_per_second(mut self, max: u32) -> Self {
        self.max_calls_per_second = max;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn max_calls_per_second(&self) -> u32 {
        self.max_calls_per_second
    }

    /// Bind the configured port and serve until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot bind.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| ServerError::Bind {
            addr,
            reason: e.to_string(),
        })?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound `listener`.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener.local_addr()?;
        info!(addr = %local, "navigation services listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let navigator = Arc::clone(&self.navigator);
                    let limiter = build_limiter(self.max_calls_per_second);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, navigator, limiter).await {
                            warn!(%peer, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept error"),
            }
        }
    }
}

fn build_limiter(max_calls_per_second: u32) -> Option<Arc<DefaultDirectRateLimiter>> {
    NonZeroU32::new(max_calls_per_second)
        .map(|n| Arc::new(RateLimiter::direct(Quota::per_second(n))))
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection<R: Relay + 'static>(
    stream: TcpStream,
    peer: SocketAddr,
    navigator: Arc<Navigator<R>>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
) -> Result<(), ServerError> {
    // `peek` leaves the request in the socket for the handshaker.
    let mut buf = [0u8; 1024];
    let n = stream.peek(&mut buf).await?;

    let header_preview = String::from_utf8_lossy(&buf[..n]);
    let is_ws_upgrade = header_preview.lines().any(|line| {
        let line = line.to_lowercase();
        line.starts_with("upgrade:") && line.contains("websocket")
    });

    if is_ws_upgrade {
        handle_ws(stream, peer, navigator, limiter).await
    } else {
        serve_index(stream).await
    }
}

async fn serve_index(mut stream: TcpStream) -> Result<(), ServerError> {
    // Drain the request so closing the socket does not reset the reply.
    let mut request = [0u8; 4096];
    let _ = stream.read(&mut request).await?;

    let body = service_index().to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn handle_ws<R: Relay + 'static>(
    stream: TcpStream,
    peer: SocketAddr,
    navigator: Arc<Navigator<R>>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream).await.map_err(|e| ServerError::Handshake {
        peer,
        reason: e.to_string(),
    })?;
    debug!(%peer, "service client connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (resp_tx, mut resp_rx) = mpsc::unbounded_channel::<ServiceResponse>();
    let mut calls = JoinSet::new();

    loop {
        tokio::select! {
            Some(_) = calls.join_next(), if !calls.is_empty() => {}
            Some(resp) = resp_rx.recv() => {
                match serde_json::to_string(&resp) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!(error = %e, "response serialization error"),
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(text.as_str(), &navigator, limiter.as_deref(), &resp_tx, &mut calls);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(%peer, error = %e, "websocket read error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    if !calls.is_empty() {
        debug!(%peer, pending = calls.len(), "aborting calls of departed client");
    }
    calls.abort_all();
    debug!(%peer, "service client disconnected");
    Ok(())
}

/// Validate one inbound frame and either answer it immediately or hand it
/// to a dispatch task owned by the connection.
fn handle_frame<R: Relay + 'static>(
    text: &str,
    navigator: &Arc<Navigator<R>>,
    limiter: Option<&DefaultDirectRateLimiter>,
    responses: &mpsc::UnboundedSender<ServiceResponse>,
    calls: &mut JoinSet<()>,
) {
    let frame: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            let _ = responses.send(ServiceResponse::error(None, "", format!("malformed frame: {e}")));
            return;
        }
    };

    let call: ServiceCall = match serde_json::from_value(frame.clone()) {
        Ok(call) => call,
        Err(e) => {
            let id = frame.get("id").cloned();
            let service = frame.get("service").and_then(Value::as_str).unwrap_or_default();
            let _ = responses.send(ServiceResponse::error(id, service, format!("malformed call: {e}")));
            return;
        }
    };

    if let Some(limiter) = limiter
        && limiter.check().is_err()
    {
        warn!(service = %call.service, "call rejected by rate limiter");
        let _ = responses.send(ServiceResponse::failed(&call, "rate limit exceeded"));
        return;
    }

    let navigator = Arc::clone(navigator);
    let responses = responses.clone();
    calls.spawn(async move {
        let resp = dispatch(&navigator, &call).await;
        let _ = responses.send(resp);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{navigator, pose_reply, result_reply, ScriptedRelay};
    use serde_json::json;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;

    async fn spawn_server(relay: ScriptedRelay, max_calls: u32) -> SocketAddr {
        serve_navigator(Arc::new(navigator(relay)), max_calls).await
    }

    async fn serve_navigator(nav: Arc<Navigator<ScriptedRelay>>, max_calls: u32) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = ServiceServer::new(nav).with_max_calls_per_second(max_calls);
        tokio::spawn(server.serve(listener));
        addr
    }

    fn text(msg: Message) -> Value {
        match msg {
            Message::Text(t) => serde_json::from_str(t.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    // ── Constructor ───────────────────────────────────────────────────────────

    #[test]
    fn defaults_and_builders() {
        let server = ServiceServer::new(Arc::new(navigator(ScriptedRelay::default())));
        assert_eq!(server.port(), DEFAULT_PORT);
        assert_eq!(server.max_calls_per_second(), DEFAULT_MAX_CALLS_PER_SECOND);

        let server = server.with_port(9999).with_max_calls_per_second(0);
        assert_eq!(server.port(), 9999);
        assert_eq!(server.max_calls_per_second(), 0);
    }

    #[test]
    fn zero_budget_disables_limiting() {
        assert!(build_limiter(0).is_none());
        assert!(build_limiter(5).is_some());
    }

    // ── WebSocket ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn get_pose_over_websocket() {
        let relay = ScriptedRelay::default().with_reply("/amcl_pose", pose_reply(3.0, 4.0));
        let addr = spawn_server(relay, DEFAULT_MAX_CALLS_PER_SECOND).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        let call = json!({"op": "call_service", "service": "/get_pose", "id": "p1"});
        ws.send(Message::Text(call.to_string().into())).await.unwrap();

        let resp = text(ws.next().await.unwrap().unwrap());
        assert_eq!(resp["op"], "service_response");
        assert_eq!(resp["id"], "p1");
        assert_eq!(resp["result"], true);
        assert_eq!(resp["values"], json!({"x": 3.0, "y": 4.0, "theta": 0.0}));
    }

    #[tokio::test]
    async fn malformed_frames_get_error_responses() {
        let addr = spawn_server(ScriptedRelay::default(), DEFAULT_MAX_CALLS_PER_SECOND).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        ws.send(Message::Text("not json".to_string().into())).await.unwrap();
        let resp = text(ws.next().await.unwrap().unwrap());
        assert_eq!(resp["result"], false);
        assert!(resp["values"]["error"].as_str().unwrap().starts_with("malformed frame"));

        ws.send(Message::Text(json!({"op": "call_service", "id": 42}).to_string().into()))
            .await
            .unwrap();
        let resp = text(ws.next().await.unwrap().unwrap());
        assert_eq!(resp["id"], 42);
        assert!(resp["values"]["error"].as_str().unwrap().starts_with("malformed call"));
    }

    #[tokio::test]
    async fn calls_beyond_budget_are_rejected() {
        let addr = spawn_server(ScriptedRelay::default(), 1).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        for id in ["a", "b", "c"] {
            let call = json!({"op": "call_service", "service": "/dock", "id": id});
            ws.send(Message::Text(call.to_string().into())).await.unwrap();
        }

        let mut errors = Vec::new();
        for _ in 0..3 {
            let resp = text(ws.next().await.unwrap().unwrap());
            errors.push(resp["values"]["error"].as_str().unwrap().to_string());
        }
        let limited = errors.iter().filter(|e| *e == "rate limit exceeded").count();
        assert_eq!(limited, 2, "got {errors:?}");
        assert!(errors.contains(&"unknown service '/dock'".to_string()));
    }

    #[tokio::test]
    async fn queued_goals_are_dropped_when_the_caller_leaves() {
        let relay = ScriptedRelay::default()
            .with_delay(Duration::from_millis(300))
            .with_reply("/move_base/result", result_reply(3))
            .with_reply("/move_base/result", result_reply(3))
            .with_reply("/move_base/result", result_reply(3));
        let nav = Arc::new(navigator(relay));
        let addr = serve_navigator(Arc::clone(&nav), DEFAULT_MAX_CALLS_PER_SECOND).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        for id in 0..3 {
            let call = json!({
                "op": "call_service",
                "service": "/move_to",
                "args": {"x": id as f64, "y": 0.0, "theta": 0.0},
                "id": id
            });
            ws.send(Message::Text(call.to_string().into())).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(nav.relay().published().len(), 1, "only the first goal is in flight");

        ws.close(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert_eq!(nav.relay().published().len(), 1);
        assert!(!nav.is_navigating());
    }

    // ── HTTP ──────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn plain_http_returns_service_index() {
        let addr = spawn_server(ScriptedRelay::default(), DEFAULT_MAX_CALLS_PER_SECOND).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.contains("application/json"));
        let body = raw.split("\r\n\r\n").nth(1).unwrap();
        let index: Value = serde_json::from_str(body).unwrap();
        assert_eq!(index["services"].as_array().unwrap().len(), 3);
    }
}
