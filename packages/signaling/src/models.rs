use peerline_registry::ConnectionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::AsRefStr;

/// The `messageType` that asks the relay to resolve the recipient from a
/// username instead of trusting a raw connection id.
pub const CALL_REQUEST_MESSAGE_TYPE: &str = "callRequest";

/// An inbound client request, discriminated by its `action` field.
#[derive(Debug, Serialize, Deserialize, Clone, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "action")]
pub enum InboundPayload {
    SetUsername(SetUsernamePayload),
    DeleteUsername(DeleteUsernamePayload),
    PeerMessage(PeerMessagePayload),
    Ping(EmptyPayload),
}

impl std::fmt::Display for InboundPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EmptyPayload {}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SetUsernamePayload {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DeleteUsernamePayload {
    pub username: String,
}

/// A request to relay an opaque signaling payload to a peer.
///
/// The recipient is polymorphic: `peerConnectionId` carries a raw connection
/// id for a direct relay, while a `callRequest` message addresses the peer by
/// `peerUsername` instead. `message` is opaque to the relay.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PeerMessagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_connection_id: Option<ConnectionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_username: Option<String>,
    pub message_type: String,
    #[serde(default)]
    pub message: Value,
}

/// Delivery target for a peer message, decided at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// The sender supplied a connection id it trusts to be live.
    Direct(ConnectionId),
    /// The sender supplied a username that must resolve to a connection.
    Alias(String),
}

/// An outbound frame, discriminated by its `responseType` field.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[serde(tag = "responseType")]
pub enum OutboundPayload {
    DefaultStatus(DefaultStatusPayload),
    UsernameSet(UsernameSetPayload),
    UsernameUnavailable(UsernameUnavailablePayload),
    MissingPeer(MissingPeerPayload),
    PeerMessage(PeerMessageEnvelope),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DefaultStatusPayload {
    pub connection_id: ConnectionId,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UsernameSetPayload {
    pub username: String,
    pub request_time: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UsernameUnavailablePayload {
    pub request_time: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MissingPeerPayload {
    pub message: String,
    pub request_time: u64,
}

/// The envelope delivered to a relay recipient.
///
/// Built fresh for every relay; `request_time` is the capture time of the
/// inbound request so the recipient can measure end-to-end latency.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PeerMessageEnvelope {
    pub sender_connection_id: ConnectionId,
    pub message_type: String,
    pub message: Value,
    pub request_time: u64,
}
