//! Drives [`RosbridgeClient`] against an in-process rosbridge stand-in.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use navrelay_middleware::{Relay, RosbridgeClient};
use navrelay_types::RelayError;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// What the stand-in does when it sees a `subscribe` or `publish` for a
/// topic.
#[derive(Clone)]
enum Reply {
    /// Send these frames, in order.
    Frames(Vec<Value>),
    /// Wait, then send these frames.
    After(Duration, Vec<Value>),
    /// Close the socket.
    Hangup,
}

/// Start a single-connection rosbridge stand-in.
///
/// Returns the `ws://` URL and a receiver yielding every frame the client
/// sent, in order.  The receiver ends once the connection is gone.
async fn spawn_bridge(replies: HashMap<String, Reply>) -> (String, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (mut ws_tx, mut ws_rx) = ws.split();
        while let Some(Ok(msg)) = ws_rx.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let frame: Value = serde_json::from_str(text.as_str()).unwrap();
            let _ = tx.send(frame.clone());
            if frame["op"] != "subscribe" && frame["op"] != "publish" {
                continue;
            }
            let topic = frame["topic"].as_str().unwrap_or_default();
            match replies.get(topic) {
                Some(Reply::Frames(frames)) => {
                    for f in frames {
                        ws_tx.send(Message::Text(f.to_string().into())).await.unwrap();
                    }
                }
                Some(Reply::After(delay, frames)) => {
                    tokio::time::sleep(*delay).await;
                    for f in frames {
                        ws_tx.send(Message::Text(f.to_string().into())).await.unwrap();
                    }
                }
                Some(Reply::Hangup) => {
                    let _ = ws_tx.close().await;
                    break;
                }
                None => {}
            }
        }
    });

    (format!("ws://{addr}"), rx)
}

async fn collect(mut rx: mpsc::UnboundedReceiver<Value>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
        frames.push(frame);
    }
    frames
}

fn ops(frames: &[Value]) -> Vec<String> {
    frames
        .iter()
        .map(|f| format!("{} {}", f["op"].as_str().unwrap(), f["topic"].as_str().unwrap()))
        .collect()
}

#[tokio::test]
async fn publish_advertises_each_topic_once() {
    let (url, rx) = spawn_bridge(HashMap::new()).await;
    let client = RosbridgeClient::connect(&url).await.unwrap();

    for i in 0..3 {
        client
            .publish("/initialpose", "geometry_msgs/PoseWithCovarianceStamped", json!({ "n": i }))
            .await
            .unwrap();
    }
    client
        .publish("/move_base_simple/goal", "geometry_msgs/PoseStamped", json!({}))
        .await
        .unwrap();
    assert_eq!(client.registrations().await.len(), 2);
    client.close().await;

    let frames = collect(rx).await;
    assert_eq!(
        ops(&frames),
        vec![
            "advertise /initialpose",
            "publish /initialpose",
            "publish /initialpose",
            "publish /initialpose",
            "advertise /move_base_simple/goal",
            "publish /move_base_simple/goal",
            "unadvertise /initialpose",
            "unadvertise /move_base_simple/goal",
        ]
    );
    assert_eq!(frames[0]["type"], "geometry_msgs/PoseWithCovarianceStamped");
    assert_eq!(frames[3]["msg"]["n"], 2);
    // The unadvertise reuses the advertise id.
    assert_eq!(frames[6]["id"], frames[0]["id"]);
}

#[tokio::test]
async fn subscribe_once_skips_frames_for_other_topics() {
    let replies = HashMap::from([(
        "/amcl_pose".to_string(),
        Reply::Frames(vec![
            json!({"op": "publish", "topic": "/move_base/result", "msg": {"status": {"status": 4}}}),
            json!({"op": "publish", "topic": "/amcl_pose", "msg": {"seq": 42}}),
        ]),
    )]);
    let (url, rx) = spawn_bridge(replies).await;
    let client = RosbridgeClient::connect(&url).await.unwrap();

    let msg = client
        .subscribe_once(
            "/amcl_pose",
            "geometry_msgs/PoseWithCovarianceStamped",
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(msg, json!({"seq": 42}));
    client.close().await;

    let frames = collect(rx).await;
    assert_eq!(
        ops(&frames),
        vec![
            "advertise /amcl_pose",
            "subscribe /amcl_pose",
            "unsubscribe /amcl_pose",
            "unadvertise /amcl_pose",
        ]
    );
    assert_eq!(frames[1]["id"], frames[2]["id"]);
}

#[tokio::test]
async fn repeated_subscriptions_register_once() {
    let reply = Reply::Frames(vec![json!({"topic": "/amcl_pose", "msg": {}})]);
    let replies = HashMap::from([("/amcl_pose".to_string(), reply)]);
    let (url, rx) = spawn_bridge(replies).await;
    let client = RosbridgeClient::connect(&url).await.unwrap();

    for _ in 0..3 {
        client
            .subscribe_once("/amcl_pose", "geometry_msgs/PoseWithCovarianceStamped", Duration::from_secs(5))
            .await
            .unwrap();
    }
    client.close().await;

    let frames = collect(rx).await;
    let advertises = frames.iter().filter(|f| f["op"] == "advertise").count();
    let subscribes = frames.iter().filter(|f| f["op"] == "subscribe").count();
    assert_eq!(advertises, 1);
    assert_eq!(subscribes, 3);
}

#[tokio::test]
async fn subscribe_once_times_out_without_reply() {
    let (url, _rx) = spawn_bridge(HashMap::new()).await;
    let client = RosbridgeClient::connect(&url).await.unwrap();

    let err = client
        .subscribe_once("/move_base/result", "move_base_msgs/MoveBaseActionResult", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RelayError::Timeout {
            topic: "/move_base/result".to_string(),
            after_ms: 100,
        }
    );
    // The connection is still usable afterwards.
    assert!(!client.is_closed());
    client.close().await;
}

#[tokio::test]
async fn hangup_wakes_waiter_with_closed() {
    let replies = HashMap::from([("/move_base/result".to_string(), Reply::Hangup)]);
    let (url, _rx) = spawn_bridge(replies).await;
    let client = RosbridgeClient::connect(&url).await.unwrap();

    let err = client
        .subscribe_once("/move_base/result", "move_base_msgs/MoveBaseActionResult", Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err, RelayError::Closed);

    // Give the reader task a moment to observe the end of stream.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.is_closed());
    let err = client.publish("/goal", "geometry_msgs/PoseStamped", json!({})).await.unwrap_err();
    assert_eq!(err, RelayError::Closed);
}

#[tokio::test]
async fn calls_after_close_fail() {
    let (url, _rx) = spawn_bridge(HashMap::new()).await;
    let client = RosbridgeClient::connect(&url).await.unwrap();
    client.close().await;
    // A second close is a no-op.
    client.close().await;

    let err = client
        .subscribe_once("/amcl_pose", "geometry_msgs/PoseWithCovarianceStamped", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err, RelayError::Closed);
}

#[tokio::test]
async fn connect_to_unreachable_endpoint_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = RosbridgeClient::connect(&format!("ws://{addr}")).await.err().unwrap();
    assert!(matches!(err, RelayError::Connect { .. }), "got {err:?}");
}

#[tokio::test]
async fn close_wakes_pending_waiter_with_closed() {
    let (url, _rx) = spawn_bridge(HashMap::new()).await;
    let client = Arc::new(RosbridgeClient::connect(&url).await.unwrap());

    let waiting = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .subscribe_once("/amcl_pose", "geometry_msgs/PoseWithCovarianceStamped", Duration::from_secs(5))
                .await
        })
    };
    // The subscription is on the wire once the topic shows up as registered.
    while client.registrations().await.is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    client.close().await;
    let result = tokio::time::timeout(Duration::from_secs(1), waiting)
        .await
        .expect("waiter must wake promptly")
        .unwrap();
    assert_eq!(result, Err(RelayError::Closed));
    assert_eq!(client.pending_waits(), 0);
}

#[tokio::test]
async fn dropped_wait_is_deregistered() {
    let late = Reply::After(
        Duration::from_millis(200),
        vec![json!({"op": "publish", "topic": "/amcl_pose", "msg": {"seq": 1}})],
    );
    let replies = HashMap::from([("/amcl_pose".to_string(), late)]);
    let (url, _rx) = spawn_bridge(replies).await;
    let client = RosbridgeClient::connect(&url).await.unwrap();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        client.subscribe_once("/amcl_pose", "geometry_msgs/PoseWithCovarianceStamped", Duration::from_secs(5)),
    )
    .await;
    assert!(abandoned.is_err(), "the wait must still be pending when dropped");
    assert_eq!(client.pending_waits(), 0);

    // The late frame arrives with nobody left to take it.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.pending_waits(), 0);
    assert!(!client.is_closed());
    client.close().await;
}

#[tokio::test]
async fn immediate_reply_to_a_request_is_not_lost() {
    // The robot rejects the goal as soon as it is published.
    let rejection = Reply::Frames(vec![json!({
        "op": "publish",
        "topic": "/move_base/result",
        "msg": {"status": {"status": 5, "text": "rejected"}}
    })]);
    let replies = HashMap::from([("/move_base_simple/goal".to_string(), rejection)]);
    let (url, rx) = spawn_bridge(replies).await;
    let client = RosbridgeClient::connect(&url).await.unwrap();

    let reply = client
        .publish_then_wait(
            "/move_base_simple/goal",
            "geometry_msgs/PoseStamped",
            json!({}),
            "/move_base/result",
            "move_base_msgs/MoveBaseActionResult",
            Duration::from_secs(2),
        )
        .await
        .unwrap();
    assert_eq!(reply["status"]["status"], 5);
    client.close().await;

    let frames = collect(rx).await;
    assert_eq!(
        ops(&frames)[..4],
        [
            "advertise /move_base/result",
            "subscribe /move_base/result",
            "advertise /move_base_simple/goal",
            "publish /move_base_simple/goal",
        ]
    );
}
