//! WebSocket client for `rosbridge_server`.
//!
//! [`RosbridgeClient`] owns one connection for the lifetime of the process:
//!
//! 1. **Outbound** – frames are written through a single async-locked sink.
//!    The channel registry lives under the same lock, so the `advertise` for
//!    a new topic always precedes its first `publish`/`subscribe`.
//!
//! 2. **Inbound** – a reader task owns the read half and hands each frame to
//!    the callers waiting on that frame's topic.  A frame for a topic nobody
//!    waits on is dropped.  When the connection ends every waiter is woken
//!    with [`RelayError::Closed`].
//!
//! There is no reconnection: once the link is gone every call fails.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use navrelay_types::RelayError;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::protocol::{correlation_id, BridgeOp, InboundFrame};
use crate::registry::{ChannelRegistry, Registration};
use crate::relay::Relay;

/// Write half of a rosbridge connection.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Read half of a rosbridge connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// `ws://host:port` URL of a rosbridge endpoint.
pub fn endpoint_url(host: &str, port: u16) -> String {
    format!("ws://{host}:{port}")
}

// ---------------------------------------------------------------------------
// Outbound half
// ---------------------------------------------------------------------------

struct Outbound {
    sink: FrameSink,
    registry: ChannelRegistry,
}

impl Outbound {
    async fn send(&mut self, op: &BridgeOp) -> Result<(), RelayError> {
        let json = op.to_json()?;
        debug!(op = op.name(), topic = op.topic(), "rosbridge frame out");
        self.sink
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }

    /// Send an `advertise` frame if `topic` has never been registered.
    ///
    /// The registration only sticks once the frame is out.
    async fn ensure_registered(&mut self, topic: &str, msg_type: &str) -> Result<(), RelayError> {
        if let Some(Registration { id, topic, msg_type }) = self.registry.register(topic, msg_type) {
            let op = BridgeOp::Advertise { id, topic, msg_type };
            if let Err(e) = self.send(&op).await {
                self.registry.remove(op.topic());
                return Err(e);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Inbound demultiplexing
// ---------------------------------------------------------------------------

/// Callers parked on a topic, each identified by a token so a cancelled wait
/// can remove exactly its own entry.
#[derive(Default)]
struct Waiters {
    by_topic: HashMap<String, Vec<(u64, oneshot::Sender<Value>)>>,
}

impl Waiters {
    fn add(&mut self, topic: &str, token: u64) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.by_topic
            .entry(topic.to_string())
            .or_default()
            .push((token, tx));
        rx
    }

    fn remove(&mut self, topic: &str, token: u64) {
        if let Some(list) = self.by_topic.get_mut(topic) {
            list.retain(|(t, _)| *t != token);
            if list.is_empty() {
                self.by_topic.remove(topic);
            }
        }
    }

    /// Deliver `msg` to everybody waiting on `topic`.  Returns how many
    /// waiters were served.
    fn deliver(&mut self, topic: &str, msg: &Value) -> usize {
        let Some(list) = self.by_topic.remove(topic) else {
            return 0;
        };
        let mut served = 0;
        for (_, tx) in list {
            if tx.send(msg.clone()).is_ok() {
                served += 1;
            }
        }
        served
    }

    fn clear(&mut self) {
        self.by_topic.clear();
    }

    fn len(&self) -> usize {
        self.by_topic.values().map(Vec::len).sum()
    }
}

/// Removes a waiter when the waiting future finishes or is dropped.
struct WaiterGuard<'a> {
    waiters: &'a Mutex<Waiters>,
    topic: &'a str,
    token: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut w) = self.waiters.lock() {
            w.remove(self.topic, self.token);
        }
    }
}

fn route_frame(waiters: &Mutex<Waiters>, text: &str) {
    let frame = match InboundFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "dropping unparsable rosbridge frame");
            return;
        }
    };
    let Some(topic) = frame.topic.as_deref() else {
        debug!(op = ?frame.op, "dropping rosbridge frame without topic");
        return;
    };
    let served = match waiters.lock() {
        Ok(mut w) => w.deliver(topic, &frame.msg),
        Err(_) => 0,
    };
    if served == 0 {
        debug!(topic, "no waiter for rosbridge frame");
    }
}

async fn read_loop(mut stream: FrameStream, waiters: Arc<Mutex<Waiters>>, closed: Arc<AtomicBool>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => route_frame(&waiters, text.as_str()),
            Ok(Message::Close(_)) => {
                info!("rosbridge closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "rosbridge read error");
                break;
            }
        }
    }
    closed.store(true, Ordering::SeqCst);
    // Dropping the senders wakes every pending receiver.
    if let Ok(mut w) = waiters.lock() {
        w.clear();
    }
}

// ---------------------------------------------------------------------------
// RosbridgeClient
// ---------------------------------------------------------------------------

/// [`Relay`] over a single rosbridge WebSocket connection.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use navrelay_middleware::{endpoint_url, Relay, RosbridgeClient};
///
/// # async fn demo() -> Result<(), navrelay_types::RelayError> {
/// let client = RosbridgeClient::connect(&endpoint_url("127.0.0.1", 9090)).await?;
/// let pose = client
///     .subscribe_once(
///         "/amcl_pose",
///         "geometry_msgs/PoseWithCovarianceStamped",
///         Duration::from_secs(5),
///     )
///     .await?;
/// println!("{pose}");
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct RosbridgeClient {
    endpoint: String,
    outbound: tokio::sync::Mutex<Outbound>,
    waiters: Arc<Mutex<Waiters>>,
    next_token: AtomicU64,
    closed: Arc<AtomicBool>,
    shut_down: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl RosbridgeClient {
    /// Open a WebSocket connection to `endpoint` (e.g. `ws://127.0.0.1:9090`).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Connect`] if the endpoint cannot be reached or
    /// the WebSocket handshake fails.
    pub async fn connect(endpoint: &str) -> Result<Self, RelayError> {
        let (ws, _response) = connect_async(endpoint).await.map_err(|e| RelayError::Connect {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        info!(endpoint, "connected to rosbridge");
        let (sink, stream) = ws.split();
        Ok(Self::from_parts(endpoint, Box::pin(sink), Box::pin(stream)))
    }

    /// Build a client over an already-established frame sink and stream.
    ///
    /// Spawns the reader task, so it must be called within a Tokio runtime.
    pub fn from_parts(endpoint: impl Into<String>, sink: FrameSink, stream: FrameStream) -> Self {
        let waiters = Arc::new(Mutex::new(Waiters::default()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_loop(stream, Arc::clone(&waiters), Arc::clone(&closed)));
        Self {
            endpoint: endpoint.into(),
            outbound: tokio::sync::Mutex::new(Outbound {
                sink,
                registry: ChannelRegistry::new(),
            }),
            waiters,
            next_token: AtomicU64::new(0),
            closed,
            shut_down: AtomicBool::new(false),
            reader: Mutex::new(Some(reader)),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `true` once the connection has ended or [`Relay::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.shut_down.load(Ordering::SeqCst)
    }

    /// Snapshot of the channel registrations made so far.
    pub async fn registrations(&self) -> Vec<Registration> {
        self.outbound.lock().await.registry.registrations()
    }

    /// Number of callers currently waiting for a message.
    pub fn pending_waits(&self) -> usize {
        self.waiters.lock().map(|w| w.len()).unwrap_or(0)
    }

    fn ensure_open(&self) -> Result<(), RelayError> {
        if self.is_closed() {
            Err(RelayError::Closed)
        } else {
            Ok(())
        }
    }
}

/// A frame published once the reply waiter is in place.
struct Request<'a> {
    topic: &'a str,
    msg_type: &'a str,
    msg: Value,
}

impl RosbridgeClient {
    /// Wait for the next message on `topic`, optionally publishing `request`
    /// after the subscription is in place.
    async fn wait_for(
        &self,
        topic: &str,
        msg_type: &str,
        timeout: Duration,
        request: Option<Request<'_>>,
    ) -> Result<Value, RelayError> {
        self.ensure_open()?;

        // Park before subscribing so the first reply cannot slip past.
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let rx = self
            .waiters
            .lock()
            .map_err(|_| RelayError::Transport("waiter table poisoned".to_string()))?
            .add(topic, token);
        let _guard = WaiterGuard {
            waiters: &self.waiters,
            topic,
            token,
        };

        let subscription_id = correlation_id("subscribe", topic);
        {
            let mut out = self.outbound.lock().await;
            out.ensure_registered(topic, msg_type).await?;
            out.send(&BridgeOp::Subscribe {
                id: subscription_id.clone(),
                topic: topic.to_string(),
                msg_type: msg_type.to_string(),
            })
            .await?;
            if let Some(Request { topic, msg_type, msg }) = request {
                out.ensure_registered(topic, msg_type).await?;
                out.send(&BridgeOp::Publish {
                    id: correlation_id("publish", topic),
                    topic: topic.to_string(),
                    msg,
                })
                .await?;
            }
        }

        let received = tokio::time::timeout(timeout, rx).await;

        if !self.is_closed() {
            let mut out = self.outbound.lock().await;
            let unsubscribe = BridgeOp::Unsubscribe {
                id: subscription_id,
                topic: topic.to_string(),
            };
            if let Err(e) = out.send(&unsubscribe).await {
                warn!(topic, error = %e, "unsubscribe failed");
            }
        }

        match received {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(RelayError::Closed),
            Err(_) => Err(RelayError::Timeout {
                topic: topic.to_string(),
                after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

#[async_trait]
impl Relay for RosbridgeClient {
    async fn publish(&self, topic: &str, msg_type: &str, msg: Value) -> Result<(), RelayError> {
        self.ensure_open()?;
        let mut out = self.outbound.lock().await;
        out.ensure_registered(topic, msg_type).await?;
        out.send(&BridgeOp::Publish {
            id: correlation_id("publish", topic),
            topic: topic.to_string(),
            msg,
        })
        .await
    }

    async fn subscribe_once(
        &self,
        topic: &str,
        msg_type: &str,
        timeout: Duration,
    ) -> Result<Value, RelayError> {
        self.wait_for(topic, msg_type, timeout, None).await
    }

    async fn publish_then_wait(
        &self,
        topic: &str,
        msg_type: &str,
        msg: Value,
        reply_topic: &str,
        reply_type: &str,
        timeout: Duration,
    ) -> Result<Value, RelayError> {
        let request = Request { topic, msg_type, msg };
        self.wait_for(reply_topic, reply_type, timeout, Some(request)).await
    }

    async fn close(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut out = self.outbound.lock().await;
        let registrations = out.registry.drain();
        if !self.closed.load(Ordering::SeqCst) {
            for Registration { id, topic, .. } in registrations {
                let op = BridgeOp::Unadvertise { id, topic };
                if let Err(e) = out.send(&op).await {
                    warn!(topic = op.topic(), error = %e, "unadvertise failed");
                }
            }
            if let Err(e) = out.sink.close().await {
                warn!(error = %e, "closing rosbridge socket failed");
            }
        }
        drop(out);

        if let Ok(mut w) = self.waiters.lock() {
            w.clear();
        }
        if let Ok(mut reader) = self.reader.lock()
            && let Some(handle) = reader.take()
        {
            handle.abort();
        }
        info!(endpoint = %self.endpoint, "rosbridge relay closed");
    }
}

impl Drop for RosbridgeClient {
    fn drop(&mut self) {
        if let Ok(mut reader) = self.reader.lock()
            && let Some(handle) = reader.take()
        {
            handle.abort();
        }
    }
}
