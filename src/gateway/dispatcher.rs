use super::events::{event, MessageCreate, ReadyData};

/// Dispatch events the bot acts on. Everything else is dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    Ready(ReadyData),
    MessageCreate(MessageCreate),
}

/// Map a dispatch `{t, d}` pair onto a known event.
///
/// Unknown event types return `None` without complaint. Known types with a
/// body that fails to decode are logged and also return `None`.
pub fn route(event_type: &str, data: Option<&serde_json::Value>) -> Option<DispatchEvent> {
    match event_type {
        event::READY => decode(event_type, data).map(DispatchEvent::Ready),
        event::MESSAGE_CREATE => decode(event_type, data).map(DispatchEvent::MessageCreate),
        _ => None,
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    event_type: &str,
    data: Option<&serde_json::Value>,
) -> Option<T> {
    let Some(data) = data else {
        tracing::warn!("dispatch {event_type} arrived without a body");
        return None;
    };
    match T::deserialize(data) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("dropping malformed {event_type} dispatch: {e}");
            None
        }
    }
}
