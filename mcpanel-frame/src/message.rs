//! Messages exchanged with the server-side bridge plugin.
//!
//! Unsolicited events look like `{"event": "...", "payload": ...}`, responses
//! to a request look like `{"id": "...", "type": "...", "payload": ...}`.
//! Payloads are kept as raw JSON; typed views exist for the payloads the
//! console consumes itself.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A decoded message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Response(Response),
    Event(Event),
}

impl Frame {
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Self::Event(event) => Some(event),
            Self::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Self::Response(response) => Some(response),
            Self::Event(_) => None,
        }
    }
}

/// Event names emitted by the bridge. Unknown names are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    BridgeReady,
    PlayerJoin,
    PlayerLeave,
    CommandRegistered,
    PluginLoaded,
    PluginUnloaded,
    ServerReady,
    StatusUpdate,
    PlayersUpdate,
    RegistryUpdate,
    CommandsUpdated,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::BridgeReady => "mcpanel_bridge_ready",
            Self::PlayerJoin => "player_join",
            Self::PlayerLeave => "player_leave",
            Self::CommandRegistered => "command_registered",
            Self::PluginLoaded => "plugin_loaded",
            Self::PluginUnloaded => "plugin_unloaded",
            Self::ServerReady => "server_ready",
            Self::StatusUpdate => "status_update",
            Self::PlayersUpdate => "players_update",
            Self::RegistryUpdate => "registry_update",
            Self::CommandsUpdated => "commands_updated",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "mcpanel_bridge_ready" => Self::BridgeReady,
            "player_join" => Self::PlayerJoin,
            "player_leave" => Self::PlayerLeave,
            "command_registered" => Self::CommandRegistered,
            "plugin_loaded" => Self::PluginLoaded,
            "plugin_unloaded" => Self::PluginUnloaded,
            "server_ready" => Self::ServerReady,
            "status_update" => Self::StatusUpdate,
            "players_update" => Self::PlayersUpdate,
            "registry_update" => Self::RegistryUpdate,
            "commands_updated" => Self::CommandsUpdated,
            _ => Self::Other(name),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Event {
    pub fn new(event: EventKind, payload: Option<Value>) -> Self {
        Self { event, payload }
    }

    /// Typed payload of a `status_update` event.
    pub fn status(&self) -> Option<StatusUpdate> {
        self.typed_payload(&EventKind::StatusUpdate)
    }

    /// Typed payload of a `players_update` event.
    pub fn players(&self) -> Option<PlayersUpdate> {
        self.typed_payload(&EventKind::PlayersUpdate)
    }

    /// Typed payload of a `mcpanel_bridge_ready` event.
    pub fn bridge_ready(&self) -> Option<BridgeReady> {
        self.typed_payload(&EventKind::BridgeReady)
    }

    /// Player carried by a `player_join` or `player_leave` event.
    pub fn player(&self) -> Option<PlayerRef> {
        match self.event {
            EventKind::PlayerJoin | EventKind::PlayerLeave => {
                serde_json::from_value(self.payload.clone()?).ok()
            },
            _ => None,
        }
    }

    fn typed_payload<T>(&self, kind: &EventKind) -> Option<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        if &self.event != kind {
            return None;
        }

        serde_json::from_value(self.payload.clone()?).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Response {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            payload,
        }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(id, "error", serde_json::json!({ "message": message.into() }))
    }

    pub fn is_error(&self) -> bool {
        self.kind == "error"
    }

    pub fn error_message(&self) -> Option<&str> {
        if !self.is_error() {
            return None;
        }

        self.payload.get("message").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Complete,
    Commands,
    Players,
    Status,
    Plugins,
    Worlds,
    Ping,
}

/// A request sent to the bridge through the console or RCON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RequestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Request {
    /// Creates a request with a fresh random id.
    pub fn new(kind: RequestType, payload: Option<Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            payload,
        }
    }

    /// Completion request for the text typed so far.
    pub fn complete(buffer: &str, cursor: usize) -> Self {
        Self::new(
            RequestType::Complete,
            Some(serde_json::json!({ "buffer": buffer, "cursor": cursor })),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub tps: f64,
    #[serde(default)]
    pub mspt: Option<f64>,
    pub player_count: u32,
    pub max_players: u32,
    #[serde(rename = "usedMemoryMB")]
    pub used_memory_mb: u64,
    #[serde(rename = "maxMemoryMB")]
    pub max_memory_mb: u64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayersUpdate {
    pub count: u32,
    pub max: u32,
    #[serde(default)]
    pub players: Vec<PlayerEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub name: String,
    pub uuid: String,
    #[serde(default)]
    pub world: Option<String>,
    #[serde(default)]
    pub ping: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub name: String,
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeReady {
    pub version: String,
    pub platform: String,
    #[serde(default)]
    pub features: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_json_decodes_as_event() {
        let frame: Frame = serde_json::from_value(
            json!({ "event": "player_join", "payload": { "name": "Steve", "uuid": "u-1" } }),
        )
        .expect("event json should decode");

        let event = frame.as_event().expect("frame should be an event");
        assert_eq!(event.event, EventKind::PlayerJoin);
        assert_eq!(
            event.player(),
            Some(PlayerRef {
                name: "Steve".into(),
                uuid: "u-1".into()
            })
        );
    }

    #[test]
    fn event_without_payload_is_accepted() {
        let frame: Frame = serde_json::from_value(json!({ "event": "server_ready" }))
            .expect("event json should decode");

        assert_eq!(
            frame,
            Frame::Event(Event::new(EventKind::ServerReady, None))
        );
    }

    #[test]
    fn unknown_event_name_is_preserved() {
        let frame: Frame =
            serde_json::from_value(json!({ "event": "custom_thing", "payload": 1 }))
                .expect("event json should decode");

        let event = frame.as_event().expect("frame should be an event");
        assert_eq!(event.event, EventKind::Other("custom_thing".into()));
        assert_eq!(
            serde_json::to_value(event).expect("event should serialize")["event"],
            json!("custom_thing")
        );
    }

    #[test]
    fn response_json_decodes_as_response() {
        let frame: Frame = serde_json::from_value(
            json!({ "id": "abc", "type": "error", "payload": { "message": "nope" } }),
        )
        .expect("response json should decode");

        let response = frame.as_response().expect("frame should be a response");
        assert!(response.is_error());
        assert_eq!(response.error_message(), Some("nope"));
    }

    #[test]
    fn object_without_known_shape_is_rejected() {
        assert!(serde_json::from_value::<Frame>(json!({ "hello": 1 })).is_err());
        assert!(serde_json::from_value::<Frame>(json!([1, 2])).is_err());
    }

    #[test]
    fn status_update_payload_uses_bridge_field_names() {
        let event = Event::new(
            EventKind::StatusUpdate,
            Some(json!({
                "tps": 19.9,
                "mspt": 12.5,
                "playerCount": 3,
                "maxPlayers": 20,
                "usedMemoryMB": 1024,
                "maxMemoryMB": 4096,
                "uptimeSeconds": 600
            })),
        );

        let status = event.status().expect("status payload should decode");
        assert_eq!(status.player_count, 3);
        assert_eq!(status.max_memory_mb, 4096);
        assert_eq!(status.mspt, Some(12.5));
        assert_eq!(event.players(), None);
    }

    #[test]
    fn request_type_serializes_upper_case() {
        let request = Request::new(RequestType::Ping, None);
        let value = serde_json::to_value(&request).expect("request should serialize");

        assert_eq!(value["type"], json!("PING"));
        assert!(value.get("payload").is_none());
        assert!(Uuid::parse_str(&request.id).is_ok());
    }

    #[test]
    fn fresh_requests_get_distinct_ids() {
        let a = Request::new(RequestType::Status, None);
        let b = Request::new(RequestType::Status, None);

        assert_ne!(a.id, b.id);
    }
}
