#![allow(dead_code)]

use accordbot::error::BotError;
use accordbot::gateway::session::BackoffPolicy;
use accordbot::gateway::GatewayConfig;
use accordbot::rest::ChatApi;
use accordbot::throttle::ReplyPolicy;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

pub const CHANNEL_ID: &str = "100";
pub const WAIT: Duration = Duration::from_secs(5);

pub type ServerSocket = WebSocketStream<TcpStream>;

/// A local gateway endpoint the bot connects to; tests play the server side.
pub struct FakeGateway {
    listener: TcpListener,
    pub url: String,
}

impl FakeGateway {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        Self {
            listener,
            url: format!("ws://127.0.0.1:{}", addr.port()),
        }
    }

    /// Wait for the bot to open a transport.
    pub async fn accept(&self) -> ServerSocket {
        let (stream, _) = tokio::time::timeout(WAIT, self.listener.accept())
            .await
            .expect("bot did not connect in time")
            .unwrap();
        accept_async(stream).await.unwrap()
    }
}

pub async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

pub async fn send_hello(ws: &mut ServerSocket, interval_ms: u64) {
    let hello = serde_json::json!({ "op": 10, "d": { "heartbeat_interval": interval_ms } });
    send_json(ws, hello).await;
}

pub async fn send_ready(ws: &mut ServerSocket, seq: u64, session_id: &str, user_id: &str) {
    send_json(
        ws,
        serde_json::json!({
            "op": 0, "s": seq, "t": "READY",
            "d": { "session_id": session_id, "user": { "id": user_id, "username": "accordbot" } }
        }),
    )
    .await;
}

pub async fn send_message_create(
    ws: &mut ServerSocket,
    seq: u64,
    message_id: &str,
    author_id: &str,
    channel_id: &str,
) {
    send_json(
        ws,
        serde_json::json!({
            "op": 0, "s": seq, "t": "MESSAGE_CREATE",
            "d": {
                "id": message_id,
                "channel_id": channel_id,
                "content": "hello there",
                "author": { "id": author_id, "username": format!("user{author_id}") }
            }
        }),
    )
    .await;
}

/// Next frame from the bot, or `None` once it closes the transport.
pub async fn recv_frame(ws: &mut ServerSocket) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame from the bot");
        match frame {
            Some(Ok(Message::Text(text))) => {
                return Some(serde_json::from_str(text.as_str()).unwrap());
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => continue,
        }
    }
}

/// Skip frames until one with opcode `op` arrives.
pub async fn recv_op(ws: &mut ServerSocket, op: u64) -> Value {
    loop {
        let frame = recv_frame(ws).await.expect("transport closed before expected opcode");
        if frame["op"] == op {
            return frame;
        }
    }
}

/// Read until the bot closes the transport. Returns true if it sent a close frame.
pub async fn expect_close(ws: &mut ServerSocket) -> bool {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("bot did not close the transport");
        match frame {
            Some(Ok(Message::Close(_))) => return true,
            Some(Err(_)) | None => return false,
            Some(Ok(_)) => continue,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub channel_id: String,
    pub content: String,
    pub reply_to: Option<String>,
}

/// Chat API double that records every outbound message.
#[derive(Default)]
pub struct RecordingApi {
    sent: Mutex<Vec<SentMessage>>,
    notify: Notify,
}

impl RecordingApi {
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub async fn wait_for_sends(&self, count: usize) -> Vec<SentMessage> {
        tokio::time::timeout(WAIT, async {
            loop {
                let notified = self.notify.notified();
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                notified.await;
            }
        })
        .await
        .expect("reply was not sent in time")
    }
}

#[async_trait]
impl ChatApi for RecordingApi {
    async fn send_typing(&self, _channel_id: &str) -> Result<(), BotError> {
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<String, BotError> {
        let id = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(SentMessage {
                channel_id: channel_id.to_string(),
                content: content.to_string(),
                reply_to: reply_to.map(str::to_string),
            });
            format!("reply-{}", sent.len())
        };
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn channel_slow_mode(&self, _channel_id: &str) -> Result<u64, BotError> {
        Ok(0)
    }
}

/// Reply policy with timings short enough for real-time tests.
pub fn fast_policy() -> ReplyPolicy {
    ReplyPolicy {
        channel_id: CHANNEL_ID.to_string(),
        typing_per_char: Duration::from_millis(1),
        min_typing: Duration::from_millis(10),
        max_typing: Duration::from_millis(20),
        cooldown: Duration::from_millis(50),
        ..ReplyPolicy::default()
    }
}

pub fn gateway_config(url: &str, backoff_base: Duration) -> GatewayConfig {
    GatewayConfig {
        url: url.to_string(),
        token: "test-token".to_string(),
        backoff: BackoffPolicy {
            base: backoff_base,
            cap: backoff_base * 4,
        },
        invalid_session_delay: Duration::from_millis(100),
        ..GatewayConfig::default()
    }
}
