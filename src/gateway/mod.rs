pub mod dispatcher;
pub mod events;
pub mod heartbeat;
pub mod machine;
pub mod session;

use futures_util::{Sink, SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, tungstenite};

use crate::config::DEFAULT_GATEWAY_URL;
use crate::error::BotError;
use crate::throttle::ReplyThrottle;
use dispatcher::DispatchEvent;
use events::{ClientProperties, ClientState, GatewayMessage, IdentifyData, PresenceData};
use heartbeat::HeartbeatScheduler;
use machine::{Action, ConnectionState};
use session::{BackoffPolicy, GatewaySession};

/// Delay before re-sending IDENTIFY after an INVALID_SESSION.
pub const INVALID_SESSION_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub token: String,
    pub intents: u64,
    pub properties: ClientProperties,
    pub presence: PresenceData,
    pub backoff: BackoffPolicy,
    pub invalid_session_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            token: String::new(),
            intents: events::ALL_INTENTS,
            properties: ClientProperties::default(),
            presence: PresenceData::default(),
            backoff: BackoffPolicy::default(),
            invalid_session_delay: INVALID_SESSION_DELAY,
        }
    }
}

impl GatewayConfig {
    pub fn identify_payload(&self) -> IdentifyData {
        IdentifyData {
            token: self.token.clone(),
            intents: self.intents,
            properties: self.properties.clone(),
            presence: self.presence.clone(),
            compress: false,
            client_state: ClientState::default(),
        }
    }
}

/// Why a transport was torn down.
#[derive(Debug, Clone, PartialEq)]
enum SessionEnd {
    Closed(Option<u16>),
    ReconnectRequested,
    Shutdown,
}

/// Single persistent gateway session with automatic recovery.
pub struct GatewayConnection {
    config: GatewayConfig,
    session: GatewaySession,
    heartbeat: HeartbeatScheduler,
    throttle: Arc<ReplyThrottle>,
    state_tx: watch::Sender<ConnectionState>,
}

impl GatewayConnection {
    pub fn new(config: GatewayConfig, throttle: Arc<ReplyThrottle>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            session: GatewaySession::default(),
            heartbeat: HeartbeatScheduler::new(),
            throttle,
            state_tx,
        }
    }

    pub fn session(&self) -> &GatewaySession {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions as they happen.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = self.state_tx.send_replace(state);
        if prev != state {
            tracing::debug!("gateway state {prev:?} -> {state:?}");
        }
    }

    /// Connect and keep reconnecting until `shutdown` resolves.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            self.set_state(ConnectionState::Connecting);
            tracing::info!("connecting to gateway {}", self.config.url);

            let connected = tokio::select! {
                _ = &mut shutdown => None,
                result = connect_async(self.config.url.as_str()) => Some(result),
            };
            let Some(connected) = connected else {
                self.stop();
                return;
            };

            let end = match connected {
                Ok((ws, _)) => {
                    tracing::info!("gateway connected");
                    self.drive(ws, &mut shutdown).await
                }
                Err(e) => {
                    tracing::warn!("gateway connect failed: {e}");
                    SessionEnd::Closed(None)
                }
            };
            self.heartbeat.cancel();

            match end {
                SessionEnd::Shutdown => {
                    self.stop();
                    return;
                }
                SessionEnd::ReconnectRequested => {
                    tracing::info!("gateway requested reconnect");
                    self.set_state(ConnectionState::Disconnected);
                }
                SessionEnd::Closed(code) => {
                    self.set_state(ConnectionState::Disconnected);
                    let delay = self.session.next_backoff(&self.config.backoff);
                    tracing::warn!(
                        "gateway closed (code {}), reconnecting in {:?} (attempt {})",
                        code.map_or_else(|| "none".to_string(), |c| c.to_string()),
                        delay,
                        self.session.reconnect_attempts
                    );
                    tokio::select! {
                        _ = &mut shutdown => {
                            self.stop();
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn stop(&mut self) {
        self.heartbeat.cancel();
        self.set_state(ConnectionState::Disconnected);
        tracing::info!("gateway connection stopped");
    }

    async fn drive<S, F>(
        &mut self,
        ws: tokio_tungstenite::WebSocketStream<S>,
        shutdown: &mut F,
    ) -> SessionEnd
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
        F: Future<Output = ()> + Unpin,
    {
        self.session.reset_for_transport();
        self.set_state(ConnectionState::AwaitingHello);

        let (mut sink, mut stream) = ws.split();
        let mut identify_at: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = &mut *shutdown => {
                    self.heartbeat.cancel();
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        tracing::debug!("close frame not sent: {e}");
                    }
                    return SessionEnd::Shutdown;
                }
                _ = self.heartbeat.tick() => {
                    self.send_heartbeat(&mut sink).await;
                }
                _ = wait_until(identify_at) => {
                    identify_at = None;
                    self.send_identify(&mut sink).await;
                }
                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            return SessionEnd::Closed(frame.map(|f| u16::from(f.code)));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            tracing::warn!("gateway transport error: {e}");
                            return SessionEnd::Closed(None);
                        }
                        None => return SessionEnd::Closed(None),
                    };

                    let msg = match serde_json::from_str::<GatewayMessage>(text.as_str()) {
                        Ok(msg) => msg,
                        Err(e) => {
                            tracing::warn!("skipping malformed gateway frame: {e}");
                            continue;
                        }
                    };

                    let (next, actions) = machine::transition(
                        self.state(),
                        &mut self.session,
                        &msg,
                        self.config.invalid_session_delay,
                    );
                    self.set_state(next);

                    for action in actions {
                        match action {
                            Action::StartHeartbeat(interval) => {
                                tracing::info!(
                                    "received HELLO, heartbeat every {}ms",
                                    interval.as_millis()
                                );
                                self.heartbeat.start(interval);
                            }
                            Action::SendHeartbeat => self.send_heartbeat(&mut sink).await,
                            Action::SendIdentify => {
                                identify_at = None;
                                self.send_identify(&mut sink).await;
                            }
                            Action::ScheduleIdentify(delay) => {
                                tracing::warn!(
                                    "session invalidated, identifying again in {delay:?}"
                                );
                                identify_at = Some(Instant::now() + delay);
                            }
                            Action::Dispatch(DispatchEvent::Ready(ready)) => {
                                tracing::info!(
                                    "ready as {} ({}), session {}",
                                    ready.user.username.as_deref().unwrap_or("unknown"),
                                    ready.user.id,
                                    ready.session_id
                                );
                            }
                            Action::Dispatch(DispatchEvent::MessageCreate(message)) => {
                                // Detached: the pipeline logs its own outcome.
                                let self_id = self.session.self_id.as_deref();
                                let _ = self.throttle.on_message(self_id, &message);
                            }
                            Action::Reconnect => {
                                if let Err(e) = sink.send(Message::Close(None)).await {
                                    tracing::debug!("close frame not sent: {e}");
                                }
                                return SessionEnd::ReconnectRequested;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn send_heartbeat<K>(&self, sink: &mut K)
    where
        K: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        match send_frame(sink, &GatewayMessage::heartbeat(self.session.sequence)).await {
            Ok(()) => tracing::debug!("sent heartbeat (seq {:?})", self.session.sequence),
            Err(e) => tracing::warn!("failed to send heartbeat: {e}"),
        }
    }

    async fn send_identify<K>(&self, sink: &mut K)
    where
        K: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let result = match GatewayMessage::identify(&self.config.identify_payload()) {
            Ok(msg) => send_frame(sink, &msg).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => tracing::info!("sent IDENTIFY"),
            Err(e) => tracing::error!("failed to send IDENTIFY: {e}"),
        }
    }
}

async fn send_frame<K>(sink: &mut K, msg: &GatewayMessage) -> Result<(), BotError>
where
    K: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(msg)?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
