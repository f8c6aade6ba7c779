//! Signal protocol messages
//!
//! One JSON object per WebSocket text frame, tagged by its `type` field.
//! Session descriptions and ICE candidates are carried as opaque JSON values.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tandem_core::ConnectionId;

/// Role a connection takes when it joins
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Offers a media stream (`"streamer"` on the wire)
    #[serde(rename = "streamer")]
    Publisher,
    /// Consumes published streams (`"watcher"` on the wire)
    #[serde(rename = "watcher")]
    Subscriber,
}

impl Role {
    /// Map the `clientType` of a join request to a role.
    ///
    /// Anything other than `"streamer"`, including a missing value, is a subscriber.
    pub fn from_client_type(client_type: Option<&str>) -> Self {
        match client_type {
            Some("streamer") => Role::Publisher,
            _ => Role::Subscriber,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Publisher => "streamer",
            Role::Subscriber => "watcher",
        }
    }
}

/// Messages received from clients
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Join the relay, optionally as a streamer.
    ///
    /// `clientType` is kept as raw JSON so that a non-string value still
    /// joins (as a watcher) instead of failing to parse.
    Join {
        #[serde(rename = "clientType", default, skip_serializing_if = "Option::is_none")]
        client_type: Option<Value>,
    },

    /// Session description offer for another connection
    Offer {
        #[serde(rename = "targetId")]
        target_id: ConnectionId,
        offer: Value,
    },

    /// Session description answer for another connection
    Answer {
        #[serde(rename = "targetId")]
        target_id: ConnectionId,
        answer: Value,
    },

    /// ICE candidate for another connection
    IceCandidate {
        #[serde(rename = "targetId")]
        target_id: ConnectionId,
        candidate: Value,
    },

    /// Any other `type`; ignored by the router
    #[serde(other)]
    Unknown,
}

/// Messages generated by the relay
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Join acknowledged
    Joined {
        #[serde(rename = "clientId")]
        client_id: ConnectionId,
        #[serde(rename = "clientType")]
        client_type: Role,
    },

    /// A publisher took a slot
    StreamerJoined {
        #[serde(rename = "clientId")]
        client_id: ConnectionId,
        #[serde(rename = "streamersCount")]
        streamers_count: usize,
    },

    /// Start negotiating toward `target_id`
    CreateOffer {
        #[serde(rename = "targetId")]
        target_id: ConnectionId,
    },

    /// Publishers registered when a subscriber joined
    StreamersList { streamers: Vec<ConnectionId> },

    /// Relayed offer
    Offer {
        #[serde(rename = "senderId")]
        sender_id: ConnectionId,
        offer: Value,
    },

    /// Relayed answer
    Answer {
        #[serde(rename = "senderId")]
        sender_id: ConnectionId,
        answer: Value,
    },

    /// Relayed ICE candidate
    IceCandidate {
        #[serde(rename = "senderId")]
        sender_id: ConnectionId,
        candidate: Value,
    },

    /// A registered connection went away
    UserDisconnected {
        #[serde(rename = "clientId")]
        client_id: ConnectionId,
    },

    /// Join refused
    Error { code: ErrorCode, message: String },
}

/// Error codes
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Every publisher slot is taken
    PublisherLimit,
}

impl ClientMessage {
    /// Parse from JSON.
    ///
    /// Only a JSON object is a valid envelope; serde would otherwise also
    /// accept the sequence form of a tagged enum (`["join", ...]`).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(serde_json::Error::custom("message must be a JSON object"));
        }
        serde_json::from_value(value)
    }

    /// Role requested by a join; `None` for every other message
    pub fn requested_role(&self) -> Option<Role> {
        match self {
            ClientMessage::Join { client_type } => Some(Role::from_client_type(
                client_type.as_ref().and_then(Value::as_str),
            )),
            _ => None,
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    /// Create an error message
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of this message's `type`
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Joined { .. } => "joined",
            ServerMessage::StreamerJoined { .. } => "streamer-joined",
            ServerMessage::CreateOffer { .. } => "create-offer",
            ServerMessage::StreamersList { .. } => "streamers-list",
            ServerMessage::Offer { .. } => "offer",
            ServerMessage::Answer { .. } => "answer",
            ServerMessage::IceCandidate { .. } => "ice-candidate",
            ServerMessage::UserDisconnected { .. } => "user-disconnected",
            ServerMessage::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join() {
        let msg = ClientMessage::from_json(r#"{"type":"join","clientType":"streamer"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                client_type: Some(json!("streamer"))
            }
        );

        let msg = ClientMessage::from_json(r#"{"type":"join"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Join { client_type: None });
    }

    #[test]
    fn test_role_from_client_type() {
        assert_eq!(Role::from_client_type(Some("streamer")), Role::Publisher);
        assert_eq!(Role::from_client_type(Some("watcher")), Role::Subscriber);
        assert_eq!(Role::from_client_type(Some("director")), Role::Subscriber);
        assert_eq!(Role::from_client_type(None), Role::Subscriber);
    }

    #[test]
    fn test_parse_ice_candidate_keeps_payload() {
        let raw = r#"{"type":"ice-candidate","targetId":"ab-1","candidate":{"candidate":"candidate:1 1 udp 2122260223 10.0.0.2 51234 typ host","sdpMid":"0"}}"#;
        match ClientMessage::from_json(raw).unwrap() {
            ClientMessage::IceCandidate {
                target_id,
                candidate,
            } => {
                assert_eq!(target_id.as_str(), "ab-1");
                assert_eq!(candidate["sdpMid"], "0");
            }
            other => panic!("wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let msg = ClientMessage::from_json(r#"{"type":"chat","text":"hi"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Unknown);
    }

    #[test]
    fn test_malformed_frames_fail() {
        assert!(ClientMessage::from_json("not json").is_err());
        assert!(ClientMessage::from_json(r#"{"targetId":"x"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type":"offer","offer":{}}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type":"answer","targetId":"x"}"#).is_err());
        assert!(ClientMessage::from_json(r#"["join"]"#).is_err());
        assert!(ClientMessage::from_json(r#"["join","streamer"]"#).is_err());
        assert!(ClientMessage::from_json(r#"["offer","S",{"sdp":"v=0"}]"#).is_err());
        assert!(ClientMessage::from_json(r#""join""#).is_err());
    }

    #[test]
    fn test_non_string_client_type_joins_as_watcher() {
        for raw in [
            r#"{"type":"join","clientType":5}"#,
            r#"{"type":"join","clientType":{"role":"streamer"}}"#,
            r#"{"type":"join","clientType":null}"#,
            r#"{"type":"join","clientType":["streamer"]}"#,
        ] {
            let msg = ClientMessage::from_json(raw).unwrap();
            assert_eq!(msg.requested_role(), Some(Role::Subscriber), "{}", raw);
        }

        let msg = ClientMessage::from_json(r#"{"type":"join","clientType":"streamer"}"#).unwrap();
        assert_eq!(msg.requested_role(), Some(Role::Publisher));
        assert_eq!(ClientMessage::Unknown.requested_role(), None);
    }

    #[test]
    fn test_outbound_wire_shape() {
        let msg = ServerMessage::Joined {
            client_id: "a-1".into(),
            client_type: Role::Publisher,
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "joined", "clientId": "a-1", "clientType": "streamer"})
        );

        let msg = ServerMessage::StreamerJoined {
            client_id: "c-3".into(),
            streamers_count: 2,
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "streamer-joined", "clientId": "c-3", "streamersCount": 2})
        );

        let msg = ServerMessage::IceCandidate {
            sender_id: "b-2".into(),
            candidate: json!({"candidate": "c"}),
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "ice-candidate", "senderId": "b-2", "candidate": {"candidate": "c"}})
        );
        assert_eq!(msg.kind(), "ice-candidate");
    }

    #[test]
    fn test_error_message() {
        let msg = ServerMessage::error(ErrorCode::PublisherLimit, "all streamer slots are taken");
        let json = msg.to_json().unwrap();

        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("publisher-limit"));
    }
}
