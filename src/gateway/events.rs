use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opcodes for gateway messages.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Dispatch event names the bot understands.
pub mod event {
    pub const READY: &str = "READY";
    pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";
}

/// Intents bitfield requesting every non-privileged and privileged event group.
pub const ALL_INTENTS: u64 = 32767;

/// Gateway message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(rename = "d", default)]
    pub data: Option<serde_json::Value>,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
}

impl GatewayMessage {
    /// HEARTBEAT (opcode 1); the payload is the last sequence or null.
    pub fn heartbeat(seq: Option<u64>) -> Self {
        Self {
            op: opcode::HEARTBEAT,
            data: Some(serde_json::json!(seq)),
            seq: None,
            event_type: None,
        }
    }

    pub fn identify(data: &IdentifyData) -> Result<Self, serde_json::Error> {
        Ok(Self {
            op: opcode::IDENTIFY,
            data: Some(serde_json::to_value(data)?),
            seq: None,
            event_type: None,
        })
    }
}

/// HELLO (opcode 10) payload data.
#[derive(Debug, Clone, Deserialize)]
pub struct HelloData {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// READY dispatch payload, reduced to the fields the bot keeps.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReadyData {
    pub session_id: String,
    pub user: UserRef,
}

/// MESSAGE_CREATE dispatch payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageCreate {
    pub id: String,
    pub channel_id: String,
    pub author: UserRef,
    #[serde(default)]
    pub content: String,
}

impl MessageCreate {
    pub fn author_label(&self) -> &str {
        self.author.username.as_deref().unwrap_or(&self.author.id)
    }
}

/// IDENTIFY (opcode 2) payload data.
#[derive(Debug, Clone, Serialize)]
pub struct IdentifyData {
    pub token: String,
    pub intents: u64,
    pub properties: ClientProperties,
    pub presence: PresenceData,
    pub compress: bool,
    pub client_state: ClientState,
}

/// Client descriptor sent with IDENTIFY.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
    pub release_channel: String,
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "accordbot".to_string(),
            device: "accordbot".to_string(),
            release_channel: "stable".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceData {
    pub status: String,
    pub since: u64,
    pub activities: Vec<serde_json::Value>,
    pub afk: bool,
}

impl Default for PresenceData {
    fn default() -> Self {
        Self {
            status: "online".to_string(),
            since: 0,
            activities: vec![],
            afk: false,
        }
    }
}

/// Snapshot of client-side caches; a fresh client has none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    pub guild_versions: HashMap<String, u64>,
    pub highest_last_message_id: String,
    pub read_state_version: i64,
    pub user_guild_settings_version: i64,
    pub user_settings_version: i64,
    pub private_channels_version: String,
    pub api_code_version: i64,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            guild_versions: HashMap::new(),
            highest_last_message_id: "0".to_string(),
            read_state_version: 0,
            user_guild_settings_version: -1,
            user_settings_version: -1,
            private_channels_version: "0".to_string(),
            api_code_version: 0,
        }
    }
}
