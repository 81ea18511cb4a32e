use std::time::Duration;

use super::dispatcher::{self, DispatchEvent};
use super::events::{opcode, GatewayMessage, HelloData};
use super::session::GatewaySession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingHello,
    Identifying,
    Ready,
}

impl ConnectionState {
    /// Past HELLO on the current transport.
    pub fn is_handshaking_or_ready(self) -> bool {
        matches!(self, ConnectionState::Identifying | ConnectionState::Ready)
    }
}

/// Side effects requested by a transition; the receive loop performs them.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    StartHeartbeat(Duration),
    SendHeartbeat,
    SendIdentify,
    ScheduleIdentify(Duration),
    Dispatch(DispatchEvent),
    Reconnect,
}

/// Apply one inbound frame to the connection state.
///
/// The sequence number is recorded before anything else so a heartbeat sent
/// as a result of this frame already reports it.
pub fn transition(
    state: ConnectionState,
    session: &mut GatewaySession,
    msg: &GatewayMessage,
    invalid_session_delay: Duration,
) -> (ConnectionState, Vec<Action>) {
    if let Some(seq) = msg.seq {
        session.observe_sequence(seq);
    }

    match msg.op {
        opcode::HELLO => {
            let hello = msg
                .data
                .as_ref()
                .and_then(|d| serde_json::from_value::<HelloData>(d.clone()).ok());
            let Some(hello) = hello.filter(|h| h.heartbeat_interval > 0) else {
                tracing::warn!("ignoring HELLO without a usable heartbeat_interval");
                return (state, vec![]);
            };
            let interval = Duration::from_millis(hello.heartbeat_interval);
            if state == ConnectionState::AwaitingHello {
                (
                    ConnectionState::Identifying,
                    vec![Action::StartHeartbeat(interval), Action::SendIdentify],
                )
            } else {
                (state, vec![Action::StartHeartbeat(interval)])
            }
        }
        opcode::HEARTBEAT_ACK => {
            tracing::trace!("heartbeat acknowledged");
            (state, vec![])
        }
        opcode::HEARTBEAT => (state, vec![Action::SendHeartbeat]),
        opcode::DISPATCH => {
            if !state.is_handshaking_or_ready() {
                tracing::debug!("dispatch before HELLO, ignoring");
                return (state, vec![]);
            }
            let Some(event_type) = msg.event_type.as_deref() else {
                tracing::warn!("dispatch without an event type");
                return (state, vec![]);
            };
            match dispatcher::route(event_type, msg.data.as_ref()) {
                Some(DispatchEvent::Ready(ready)) => {
                    session.mark_ready(ready.session_id.clone(), ready.user.id.clone());
                    (
                        ConnectionState::Ready,
                        vec![Action::Dispatch(DispatchEvent::Ready(ready))],
                    )
                }
                Some(event) => (state, vec![Action::Dispatch(event)]),
                None => (state, vec![]),
            }
        }
        opcode::INVALID_SESSION => {
            session.invalidate();
            (
                ConnectionState::Identifying,
                vec![Action::ScheduleIdentify(invalid_session_delay)],
            )
        }
        opcode::RECONNECT => (ConnectionState::Disconnected, vec![Action::Reconnect]),
        other => {
            tracing::debug!("ignoring opcode {other}");
            (state, vec![])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DELAY: Duration = Duration::from_secs(5);

    fn frame(value: serde_json::Value) -> GatewayMessage {
        serde_json::from_value(value).unwrap()
    }

    fn step(
        state: ConnectionState,
        session: &mut GatewaySession,
        value: serde_json::Value,
    ) -> (ConnectionState, Vec<Action>) {
        transition(state, session, &frame(value), DELAY)
    }

    #[test]
    fn test_hello_starts_heartbeat_then_identifies() {
        let mut session = GatewaySession::default();
        let (next, actions) = step(
            ConnectionState::AwaitingHello,
            &mut session,
            json!({ "op": 10, "d": { "heartbeat_interval": 41250 } }),
        );
        assert_eq!(next, ConnectionState::Identifying);
        assert_eq!(
            actions,
            vec![
                Action::StartHeartbeat(Duration::from_millis(41250)),
                Action::SendIdentify
            ]
        );
    }

    #[test]
    fn test_second_hello_does_not_reidentify() {
        let mut session = GatewaySession::default();
        let (next, actions) = step(
            ConnectionState::Ready,
            &mut session,
            json!({ "op": 10, "d": { "heartbeat_interval": 1000 } }),
        );
        assert_eq!(next, ConnectionState::Ready);
        assert_eq!(actions, vec![Action::StartHeartbeat(Duration::from_secs(1))]);
    }

    #[test]
    fn test_hello_without_interval_is_ignored() {
        let mut session = GatewaySession::default();
        for bad in [json!({ "op": 10 }), json!({ "op": 10, "d": { "heartbeat_interval": 0 } })] {
            let (next, actions) = step(ConnectionState::AwaitingHello, &mut session, bad);
            assert_eq!(next, ConnectionState::AwaitingHello);
            assert!(actions.is_empty());
        }
    }

    #[test]
    fn test_ready_captures_identity() {
        let mut session = GatewaySession {
            reconnect_attempts: 3,
            ..Default::default()
        };
        let (next, actions) = step(
            ConnectionState::Identifying,
            &mut session,
            json!({
                "op": 0, "s": 1, "t": "READY",
                "d": { "session_id": "abc", "user": { "id": "1" } }
            }),
        );
        assert_eq!(next, ConnectionState::Ready);
        assert_eq!(actions.len(), 1);
        assert_eq!(session.session_id.as_deref(), Some("abc"));
        assert_eq!(session.self_id.as_deref(), Some("1"));
        assert_eq!(session.sequence, Some(1));
        assert_eq!(session.reconnect_attempts, 0);
    }

    #[test]
    fn test_sequence_recorded_for_ignored_frames() {
        let mut session = GatewaySession::default();
        let (next, actions) = step(
            ConnectionState::AwaitingHello,
            &mut session,
            json!({ "op": 0, "s": 4, "t": "MESSAGE_CREATE", "d": {} }),
        );
        assert_eq!(next, ConnectionState::AwaitingHello);
        assert!(actions.is_empty());
        assert_eq!(session.sequence, Some(4));

        step(
            ConnectionState::Ready,
            &mut session,
            json!({ "op": 0, "s": 9, "t": "PRESENCE_UPDATE", "d": {} }),
        );
        assert_eq!(session.sequence, Some(9));
    }

    #[test]
    fn test_message_create_is_forwarded() {
        let mut session = GatewaySession::default();
        let (next, actions) = step(
            ConnectionState::Ready,
            &mut session,
            json!({
                "op": 0, "s": 2, "t": "MESSAGE_CREATE",
                "d": { "id": "m1", "channel_id": "100", "content": "hi", "author": { "id": "2" } }
            }),
        );
        assert_eq!(next, ConnectionState::Ready);
        assert!(matches!(
            actions.as_slice(),
            [Action::Dispatch(DispatchEvent::MessageCreate(m))] if m.id == "m1"
        ));
    }

    #[test]
    fn test_invalid_session_schedules_identify() {
        let mut session = GatewaySession::default();
        session.observe_sequence(12);
        session.mark_ready("abc".to_string(), "1".to_string());
        let (next, actions) =
            step(ConnectionState::Ready, &mut session, json!({ "op": 9, "d": false }));
        assert_eq!(next, ConnectionState::Identifying);
        assert_eq!(actions, vec![Action::ScheduleIdentify(DELAY)]);
        assert!(session.session_id.is_none());
        assert!(session.sequence.is_none());
    }

    #[test]
    fn test_reconnect_request() {
        let mut session = GatewaySession::default();
        let (next, actions) =
            step(ConnectionState::Ready, &mut session, json!({ "op": 7, "d": null }));
        assert_eq!(next, ConnectionState::Disconnected);
        assert_eq!(actions, vec![Action::Reconnect]);
    }

    #[test]
    fn test_ack_and_unknown_ops_are_inert() {
        let mut session = GatewaySession::default();
        for value in [json!({ "op": 11 }), json!({ "op": 42, "d": { "x": 1 } })] {
            let (next, actions) = step(ConnectionState::Ready, &mut session, value);
            assert_eq!(next, ConnectionState::Ready);
            assert!(actions.is_empty());
        }
    }

    #[test]
    fn test_server_heartbeat_request() {
        let mut session = GatewaySession::default();
        let (_, actions) =
            step(ConnectionState::Ready, &mut session, json!({ "op": 1, "d": null }));
        assert_eq!(actions, vec![Action::SendHeartbeat]);
    }
}
