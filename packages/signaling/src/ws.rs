//! Core signaling message processing.
//!
//! This module provides the implementation for handling signaling requests:
//! claiming and releasing usernames, resolving a logical recipient to a
//! connection, and relaying opaque peer messages. Each inbound request is
//! independent; the alias registry is the only shared state.

use core::fmt;
use std::num::ParseIntError;

use async_trait::async_trait;
use peerline_registry::{AliasRegistry, ClaimError, ConnectionId, ReleaseError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{
    CALL_REQUEST_MESSAGE_TYPE, DefaultStatusPayload, DeleteUsernamePayload, InboundPayload,
    MissingPeerPayload, OutboundPayload, PeerMessageEnvelope, PeerMessagePayload, Recipient,
    SetUsernamePayload, UsernameSetPayload, UsernameUnavailablePayload,
};

/// Body returned to the requester when a relay cannot be completed.
const SEND_FAILURE_MESSAGE: &str = "Message could not be sent.";

/// Body of the `missingPeer` response when a `callRequest` username does not
/// resolve.
const MISSING_PEER_MESSAGE: &str = "That peer is not connected. Ensure correct peer.";

/// Response for signaling operations.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// HTTP-style status code indicating operation result.
    pub status_code: u16,
    /// Response message body.
    pub body: String,
}

/// Context for an inbound signaling request.
#[derive(Clone, Default, Debug)]
pub struct WebsocketContext {
    /// Unique identifier for the requesting connection.
    pub connection_id: ConnectionId,
    /// Capture time of the inbound request, in epoch milliseconds.
    pub request_time: u64,
}

/// Errors that can occur when delivering a message to a connection.
#[derive(Debug, Error)]
pub enum WebsocketSendError {
    /// The target connection is no longer live
    #[error("Connection {0} is gone")]
    Gone(ConnectionId),
    /// Failed to parse a connection id
    #[error(transparent)]
    ParseInt(#[from] ParseIntError),
    /// JSON serialization/deserialization error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// Unknown transport error with details
    #[error("Unknown: {0}")]
    Unknown(String),
}

/// Trait for delivering messages to a connection.
///
/// Implementations must not block indefinitely and must report a defunct
/// target as [`WebsocketSendError::Gone`] rather than a generic failure, so
/// callers can tell "peer went away" apart from transport trouble.
#[async_trait]
pub trait WebsocketSender: Send + Sync {
    /// Sends a message to a specific connection.
    ///
    /// # Errors
    ///
    /// * If the target connection is gone
    /// * If the message fails to send
    async fn send(&self, connection_id: &str, data: &str) -> Result<(), WebsocketSendError>;
}

impl fmt::Debug for dyn WebsocketSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{WebsocketSender}}")
    }
}

/// Handles a new websocket connection.
#[must_use]
pub fn connect(context: &WebsocketContext) -> Response {
    log::debug!("Connected {}", context.connection_id);

    Response {
        status_code: 200,
        body: "Connected".into(),
    }
}

/// Handles a websocket disconnection.
///
/// Registry entries are leases bounded by their connection's lifetime, so
/// every username owned by the departing connection is released here.
pub fn disconnect(registry: &AliasRegistry, context: &WebsocketContext) -> Response {
    let released = registry.release_owner(&context.connection_id);

    if !released.is_empty() {
        log::debug!(
            "Released usernames {released:?} from {}",
            context.connection_id
        );
    }

    log::debug!("Disconnected {}", context.connection_id);

    Response {
        status_code: 200,
        body: "Disconnected".into(),
    }
}

/// Sends the caller its own connection id as a `defaultStatus` frame.
///
/// # Errors
///
/// * If the websocket message fails to send
pub async fn send_connection_id(
    sender: &impl WebsocketSender,
    context: &WebsocketContext,
) -> Result<(), WebsocketSendError> {
    sender
        .send(
            &context.connection_id,
            &serde_json::to_value(OutboundPayload::DefaultStatus(DefaultStatusPayload {
                connection_id: context.connection_id.clone(),
            }))?
            .to_string(),
        )
        .await
}

/// Errors that can occur when processing a signaling message.
#[derive(Debug, Error)]
pub enum WebsocketMessageError {
    /// Message action is not recognized or invalid
    #[error("Invalid message type")]
    InvalidMessageType,
    /// Message payload is invalid or malformed
    #[error("Invalid payload: '{0}' ({1})")]
    InvalidPayload(String, String),
    /// Username claim failure
    #[error(transparent)]
    Claim(#[from] ClaimError),
    /// Username release failure
    #[error(transparent)]
    Release(#[from] ReleaseError),
    /// No connection is registered for the requested username
    #[error("No connected peer for username {0:?}")]
    MissingPeer(String),
    /// Websocket send error
    #[error(transparent)]
    WebsocketSend(#[from] WebsocketSendError),
    /// JSON serialization/deserialization error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl WebsocketMessageError {
    /// Maps this error to the wire response for the requesting connection.
    ///
    /// Every failure is terminal and resolved toward the requester only; the
    /// `responseType` discriminators let a client tell "name taken" from
    /// "peer missing" from a generic send failure.
    #[must_use]
    pub fn to_response(&self, request_time: u64) -> Response {
        match self {
            Self::Claim(ClaimError::AliasTaken(_)) => Response {
                status_code: 400,
                body: payload_body(&OutboundPayload::UsernameUnavailable(
                    UsernameUnavailablePayload { request_time },
                )),
            },
            Self::Release(_) => Response {
                status_code: 401,
                body: "Unauthorized".into(),
            },
            Self::MissingPeer(_) => Response {
                status_code: 400,
                body: payload_body(&OutboundPayload::MissingPeer(MissingPeerPayload {
                    message: MISSING_PEER_MESSAGE.into(),
                    request_time,
                })),
            },
            Self::InvalidMessageType
            | Self::InvalidPayload(..)
            | Self::WebsocketSend(_)
            | Self::Serde(_) => Response {
                status_code: 400,
                body: SEND_FAILURE_MESSAGE.into(),
            },
        }
    }
}

fn payload_body(payload: &OutboundPayload) -> String {
    serde_json::to_value(payload).map_or_else(
        |e| {
            log::error!("Failed to serialize outbound payload: {e:?}");
            String::new()
        },
        |value| value.to_string(),
    )
}

/// Processes an incoming websocket message and routes it to the appropriate
/// handler.
///
/// # Errors
///
/// * If the message is an invalid type
/// * If the message fails to process
pub async fn process_message(
    registry: &AliasRegistry,
    body: Value,
    context: WebsocketContext,
    sender: &impl WebsocketSender,
) -> Result<Response, WebsocketMessageError> {
    let payload: InboundPayload = serde_json::from_value(body).map_err(|e| {
        log::error!("Invalid message type: {e:?}");
        WebsocketMessageError::InvalidMessageType
    })?;

    message(registry, sender, payload, &context).await
}

/// Routes a parsed signaling message to its appropriate handler.
///
/// # Errors
///
/// * If the message fails to process
pub async fn message(
    registry: &AliasRegistry,
    sender: &impl WebsocketSender,
    message: InboundPayload,
    context: &WebsocketContext,
) -> Result<Response, WebsocketMessageError> {
    let message_type = message.as_ref().to_string();
    log::debug!(
        "Received message type {} from {}: {:?}",
        message_type,
        context.connection_id,
        message
    );
    match message {
        InboundPayload::SetUsername(payload) => {
            set_username(registry, sender, context, &payload).await?;
            Ok::<_, WebsocketMessageError>(())
        }
        InboundPayload::DeleteUsername(payload) => {
            delete_username(registry, context, &payload)?;
            Ok(())
        }
        InboundPayload::PeerMessage(payload) => {
            peer_message(registry, sender, context, &payload).await?;
            Ok(())
        }
        InboundPayload::Ping(_) => {
            log::trace!("Ping");
            Ok(())
        }
    }?;

    log::debug!(
        "Successfully processed message type {} from {}",
        message_type,
        context.connection_id
    );
    Ok(Response {
        status_code: 200,
        body: "Received".into(),
    })
}

async fn set_username(
    registry: &AliasRegistry,
    sender: &impl WebsocketSender,
    context: &WebsocketContext,
    payload: &SetUsernamePayload,
) -> Result<(), WebsocketMessageError> {
    if payload.username.is_empty() {
        return Err(WebsocketMessageError::InvalidPayload(
            "username".into(),
            "must not be empty".into(),
        ));
    }

    registry.claim(&payload.username, &context.connection_id)?;

    sender
        .send(
            &context.connection_id,
            &serde_json::to_value(OutboundPayload::UsernameSet(UsernameSetPayload {
                username: payload.username.clone(),
                request_time: context.request_time,
            }))?
            .to_string(),
        )
        .await?;

    Ok(())
}

fn delete_username(
    registry: &AliasRegistry,
    context: &WebsocketContext,
    payload: &DeleteUsernamePayload,
) -> Result<(), WebsocketMessageError> {
    registry.release(&payload.username, &context.connection_id)?;

    Ok(())
}

/// Decides the delivery target kind for a peer message.
///
/// A `callRequest` addresses its peer by username and anything else by a raw
/// connection id the sender asserts to be live. The decision is made once
/// here, at parse time.
///
/// # Errors
///
/// * If the field carrying the recipient is absent or empty
pub fn classify_recipient(
    payload: &PeerMessagePayload,
) -> Result<Recipient, WebsocketMessageError> {
    if payload.message_type == CALL_REQUEST_MESSAGE_TYPE {
        payload
            .peer_username
            .as_deref()
            .filter(|username| !username.is_empty())
            .map(|username| Recipient::Alias(username.to_string()))
            .ok_or_else(|| {
                WebsocketMessageError::InvalidPayload(
                    "peerUsername".into(),
                    "required for callRequest messages".into(),
                )
            })
    } else {
        payload
            .peer_connection_id
            .as_deref()
            .filter(|connection_id| !connection_id.is_empty())
            .map(|connection_id| Recipient::Direct(connection_id.to_string()))
            .ok_or_else(|| {
                WebsocketMessageError::InvalidPayload(
                    "peerConnectionId".into(),
                    "must not be empty".into(),
                )
            })
    }
}

/// Resolves a [`Recipient`] to a concrete connection id.
///
/// Direct recipients pass through untouched; usernames are looked up in the
/// registry.
///
/// # Errors
///
/// * If no connection is registered for the username
pub fn resolve_recipient(
    registry: &AliasRegistry,
    recipient: &Recipient,
) -> Result<ConnectionId, WebsocketMessageError> {
    match recipient {
        Recipient::Direct(connection_id) => Ok(connection_id.clone()),
        Recipient::Alias(username) => registry
            .resolve(username)
            .ok_or_else(|| WebsocketMessageError::MissingPeer(username.clone())),
    }
}

async fn peer_message(
    registry: &AliasRegistry,
    sender: &impl WebsocketSender,
    context: &WebsocketContext,
    payload: &PeerMessagePayload,
) -> Result<(), WebsocketMessageError> {
    if payload.message_type.is_empty() {
        return Err(WebsocketMessageError::InvalidPayload(
            "messageType".into(),
            "must not be empty".into(),
        ));
    }
    if payload.message.is_null() || payload.message.as_str().is_some_and(str::is_empty) {
        return Err(WebsocketMessageError::InvalidPayload(
            "message".into(),
            "must not be empty".into(),
        ));
    }

    let recipient = classify_recipient(payload)?;
    let target = resolve_recipient(registry, &recipient)?;

    let envelope = OutboundPayload::PeerMessage(PeerMessageEnvelope {
        sender_connection_id: context.connection_id.clone(),
        message_type: payload.message_type.clone(),
        message: payload.message.clone(),
        request_time: context.request_time,
    });

    sender
        .send(&target, &serde_json::to_value(envelope)?.to_string())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct MockWebsocketSender {
        sent: Mutex<Vec<(ConnectionId, String)>>,
    }

    impl MockWebsocketSender {
        fn sent(&self) -> Vec<(ConnectionId, Value)> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(connection_id, data)| {
                    (connection_id.clone(), serde_json::from_str(data).unwrap())
                })
                .collect()
        }
    }

    #[async_trait]
    impl WebsocketSender for MockWebsocketSender {
        async fn send(&self, connection_id: &str, data: &str) -> Result<(), WebsocketSendError> {
            self.sent
                .lock()
                .unwrap()
                .push((connection_id.to_string(), data.to_string()));
            Ok(())
        }
    }

    struct GoneWebsocketSender;

    #[async_trait]
    impl WebsocketSender for GoneWebsocketSender {
        async fn send(&self, connection_id: &str, _data: &str) -> Result<(), WebsocketSendError> {
            Err(WebsocketSendError::Gone(connection_id.to_string()))
        }
    }

    const REQUEST_TIME: u64 = 1_700_000_000_000;

    fn context(connection_id: &str) -> WebsocketContext {
        WebsocketContext {
            connection_id: connection_id.to_string(),
            request_time: REQUEST_TIME,
        }
    }

    #[test]
    fn test_connect_returns_success_response() {
        let response = connect(&context("conn-1"));

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "Connected");
    }

    #[test]
    fn test_disconnect_releases_owned_usernames() {
        let registry = AliasRegistry::new();
        registry.claim("alice", "conn-1").unwrap();
        registry.claim("bob", "conn-2").unwrap();

        let response = disconnect(&registry, &context("conn-1"));

        assert_eq!(response.status_code, 200);
        assert_eq!(registry.resolve("alice"), None);
        assert_eq!(registry.resolve("bob").as_deref(), Some("conn-2"));
    }

    #[tokio::test]
    async fn test_send_connection_id_sends_default_status() {
        let sender = MockWebsocketSender::default();

        send_connection_id(&sender, &context("conn-1")).await.unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "conn-1");
        assert_eq!(sent[0].1["responseType"], "defaultStatus");
        assert_eq!(sent[0].1["connectionId"], "conn-1");
    }

    #[tokio::test]
    async fn test_set_username_claims_and_echoes_username_set() {
        let registry = AliasRegistry::new();
        let sender = MockWebsocketSender::default();

        let response = message(
            &registry,
            &sender,
            InboundPayload::SetUsername(SetUsernamePayload {
                username: "alice".into(),
            }),
            &context("conn-1"),
        )
        .await
        .unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(registry.resolve("alice").as_deref(), Some("conn-1"));

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "conn-1");
        assert_eq!(sent[0].1["responseType"], "usernameSet");
        assert_eq!(sent[0].1["username"], "alice");
        assert_eq!(sent[0].1["requestTime"], REQUEST_TIME);
    }

    #[tokio::test]
    async fn test_set_username_taken_maps_to_username_unavailable() {
        let registry = AliasRegistry::new();
        registry.claim("alice", "conn-1").unwrap();
        let sender = MockWebsocketSender::default();

        let err = message(
            &registry,
            &sender,
            InboundPayload::SetUsername(SetUsernamePayload {
                username: "alice".into(),
            }),
            &context("conn-2"),
        )
        .await
        .unwrap_err();

        match &err {
            WebsocketMessageError::Claim(ClaimError::AliasTaken(alias)) => {
                assert_eq!(alias, "alice");
            }
            _ => panic!("Expected Claim variant"),
        }

        let response = err.to_response(REQUEST_TIME);
        assert_eq!(response.status_code, 400);
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["responseType"], "usernameUnavailable");
        assert_eq!(body["requestTime"], REQUEST_TIME);

        assert_eq!(registry.resolve("alice").as_deref(), Some("conn-1"));
        assert_eq!(sender.sent().len(), 0);
    }

    #[tokio::test]
    async fn test_set_username_empty_is_invalid_payload() {
        let registry = AliasRegistry::new();
        let sender = MockWebsocketSender::default();

        let err = message(
            &registry,
            &sender,
            InboundPayload::SetUsername(SetUsernamePayload { username: String::new() }),
            &context("conn-1"),
        )
        .await
        .unwrap_err();

        match err {
            WebsocketMessageError::InvalidPayload(..) => {}
            _ => panic!("Expected InvalidPayload variant"),
        }
        assert!(registry.is_empty());
        assert_eq!(sender.sent().len(), 0);
    }

    #[tokio::test]
    async fn test_delete_username_releases_claim() {
        let registry = AliasRegistry::new();
        registry.claim("alice", "conn-1").unwrap();
        let sender = MockWebsocketSender::default();

        let response = message(
            &registry,
            &sender,
            InboundPayload::DeleteUsername(DeleteUsernamePayload {
                username: "alice".into(),
            }),
            &context("conn-1"),
        )
        .await
        .unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(registry.resolve("alice"), None);
    }

    #[tokio::test]
    async fn test_delete_username_wrong_owner_is_unauthorized() {
        let registry = AliasRegistry::new();
        registry.claim("alice", "conn-1").unwrap();
        let sender = MockWebsocketSender::default();

        let err = message(
            &registry,
            &sender,
            InboundPayload::DeleteUsername(DeleteUsernamePayload {
                username: "alice".into(),
            }),
            &context("conn-2"),
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_response(REQUEST_TIME).status_code, 401);
        assert_eq!(registry.resolve("alice").as_deref(), Some("conn-1"));
    }

    #[tokio::test]
    async fn test_delete_username_unclaimed_is_unauthorized() {
        let registry = AliasRegistry::new();
        let sender = MockWebsocketSender::default();

        let err = message(
            &registry,
            &sender,
            InboundPayload::DeleteUsername(DeleteUsernamePayload {
                username: "alice".into(),
            }),
            &context("conn-1"),
        )
        .await
        .unwrap_err();

        match &err {
            WebsocketMessageError::Release(ReleaseError::NotFound(alias)) => {
                assert_eq!(alias, "alice");
            }
            _ => panic!("Expected Release variant"),
        }
        assert_eq!(err.to_response(REQUEST_TIME).status_code, 401);
    }

    #[tokio::test]
    async fn test_peer_message_relays_envelope_to_connection_id() {
        let registry = AliasRegistry::new();
        let sender = MockWebsocketSender::default();

        let response = message(
            &registry,
            &sender,
            InboundPayload::PeerMessage(PeerMessagePayload {
                peer_connection_id: Some("conn-2".into()),
                peer_username: None,
                message_type: "offer".into(),
                message: json!("sdp..."),
            }),
            &context("conn-1"),
        )
        .await
        .unwrap();

        assert_eq!(response.status_code, 200);

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "conn-2");
        assert_eq!(sent[0].1["responseType"], "peerMessage");
        assert_eq!(sent[0].1["senderConnectionId"], "conn-1");
        assert_eq!(sent[0].1["messageType"], "offer");
        assert_eq!(sent[0].1["message"], "sdp...");
        assert_eq!(sent[0].1["requestTime"], REQUEST_TIME);
    }

    #[tokio::test]
    async fn test_call_request_resolves_username_to_connection() {
        let registry = AliasRegistry::new();
        registry.claim("bob", "conn-2").unwrap();
        let sender = MockWebsocketSender::default();

        message(
            &registry,
            &sender,
            InboundPayload::PeerMessage(PeerMessagePayload {
                peer_connection_id: None,
                peer_username: Some("bob".into()),
                message_type: CALL_REQUEST_MESSAGE_TYPE.into(),
                message: json!("call me"),
            }),
            &context("conn-1"),
        )
        .await
        .unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "conn-2");
        assert_eq!(sent[0].1["senderConnectionId"], "conn-1");
    }

    #[tokio::test]
    async fn test_call_request_with_unknown_username_is_missing_peer() {
        let registry = AliasRegistry::new();
        let sender = MockWebsocketSender::default();

        let err = message(
            &registry,
            &sender,
            InboundPayload::PeerMessage(PeerMessagePayload {
                peer_connection_id: None,
                peer_username: Some("bob".into()),
                message_type: CALL_REQUEST_MESSAGE_TYPE.into(),
                message: json!("call me"),
            }),
            &context("conn-1"),
        )
        .await
        .unwrap_err();

        match &err {
            WebsocketMessageError::MissingPeer(username) => assert_eq!(username, "bob"),
            _ => panic!("Expected MissingPeer variant"),
        }

        let response = err.to_response(REQUEST_TIME);
        assert_eq!(response.status_code, 400);
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["responseType"], "missingPeer");

        assert_eq!(sender.sent().len(), 0);
    }

    #[tokio::test]
    async fn test_malformed_peer_message_never_reaches_transport() {
        let registry = AliasRegistry::new();
        let sender = MockWebsocketSender::default();

        let malformed = [
            PeerMessagePayload {
                peer_connection_id: None,
                peer_username: None,
                message_type: "offer".into(),
                message: json!("sdp..."),
            },
            PeerMessagePayload {
                peer_connection_id: Some("conn-2".into()),
                peer_username: None,
                message_type: String::new(),
                message: json!("sdp..."),
            },
            PeerMessagePayload {
                peer_connection_id: Some("conn-2".into()),
                peer_username: None,
                message_type: "offer".into(),
                message: Value::Null,
            },
            PeerMessagePayload {
                peer_connection_id: Some("conn-2".into()),
                peer_username: None,
                message_type: "offer".into(),
                message: json!(""),
            },
        ];

        for payload in malformed {
            let err = message(
                &registry,
                &sender,
                InboundPayload::PeerMessage(payload),
                &context("conn-1"),
            )
            .await
            .unwrap_err();

            match err {
                WebsocketMessageError::InvalidPayload(..) => {}
                _ => panic!("Expected InvalidPayload variant"),
            }
        }

        assert_eq!(sender.sent().len(), 0);
    }

    #[tokio::test]
    async fn test_peer_message_to_gone_connection_is_send_failure() {
        let registry = AliasRegistry::new();
        registry.claim("alice", "conn-1").unwrap();
        let sender = GoneWebsocketSender;

        let err = message(
            &registry,
            &sender,
            InboundPayload::PeerMessage(PeerMessagePayload {
                peer_connection_id: Some("conn-2".into()),
                peer_username: None,
                message_type: "offer".into(),
                message: json!("sdp..."),
            }),
            &context("conn-1"),
        )
        .await
        .unwrap_err();

        match &err {
            WebsocketMessageError::WebsocketSend(WebsocketSendError::Gone(connection_id)) => {
                assert_eq!(connection_id, "conn-2");
            }
            _ => panic!("Expected WebsocketSend variant"),
        }

        let response = err.to_response(REQUEST_TIME);
        assert_eq!(response.status_code, 400);
        assert_eq!(response.body, "Message could not be sent.");

        assert_eq!(registry.resolve("alice").as_deref(), Some("conn-1"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_process_message_parses_wire_format() {
        let registry = AliasRegistry::new();
        let sender = MockWebsocketSender::default();

        let response = process_message(
            &registry,
            json!({
                "action": "peermessage",
                "peerConnectionId": "conn-2",
                "messageType": "iceCandidate",
                "message": "{\"candidate\":\"...\"}",
            }),
            context("conn-1"),
            &sender,
        )
        .await
        .unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "Received");

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1["messageType"], "iceCandidate");
        assert_eq!(sent[0].1["message"], "{\"candidate\":\"...\"}");
    }

    #[tokio::test]
    async fn test_process_message_with_unknown_action_is_invalid() {
        let registry = AliasRegistry::new();
        let sender = MockWebsocketSender::default();

        let err = process_message(
            &registry,
            json!({"action": "blastoff"}),
            context("conn-1"),
            &sender,
        )
        .await
        .unwrap_err();

        match err {
            WebsocketMessageError::InvalidMessageType => {}
            _ => panic!("Expected InvalidMessageType variant"),
        }
        assert_eq!(sender.sent().len(), 0);
    }

    #[tokio::test]
    async fn test_ping_is_acknowledged() {
        let registry = AliasRegistry::new();
        let sender = MockWebsocketSender::default();

        let response = process_message(
            &registry,
            json!({"action": "ping"}),
            context("conn-1"),
            &sender,
        )
        .await
        .unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(sender.sent().len(), 0);
    }

    #[test]
    fn test_classify_recipient_is_decided_by_message_type() {
        let direct = PeerMessagePayload {
            peer_connection_id: Some("conn-2".into()),
            peer_username: Some("bob".into()),
            message_type: "offer".into(),
            message: json!("sdp..."),
        };
        assert_eq!(
            classify_recipient(&direct).unwrap(),
            Recipient::Direct("conn-2".into())
        );

        let via_username = PeerMessagePayload {
            peer_connection_id: Some("conn-2".into()),
            peer_username: Some("bob".into()),
            message_type: CALL_REQUEST_MESSAGE_TYPE.into(),
            message: json!("call me"),
        };
        assert_eq!(
            classify_recipient(&via_username).unwrap(),
            Recipient::Alias("bob".into())
        );
    }

    #[test]
    fn test_response_serialization() {
        let response = Response {
            status_code: 200,
            body: "Success".to_string(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["body"], "Success");
    }

    #[test]
    fn test_peer_message_envelope_wire_format() {
        let envelope = OutboundPayload::PeerMessage(PeerMessageEnvelope {
            sender_connection_id: "conn-1".into(),
            message_type: "answer".into(),
            message: json!("sdp..."),
            request_time: REQUEST_TIME,
        });

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["responseType"], "peerMessage");
        assert_eq!(json["senderConnectionId"], "conn-1");
        assert_eq!(json["messageType"], "answer");
        assert_eq!(json["message"], "sdp...");
        assert_eq!(json["requestTime"], REQUEST_TIME);
    }

    #[test]
    fn test_websocket_message_error_display() {
        let error = WebsocketMessageError::InvalidMessageType;
        assert_eq!(error.to_string(), "Invalid message type");

        let error = WebsocketMessageError::MissingPeer("bob".into());
        assert!(error.to_string().contains("bob"));
    }

    #[test]
    fn test_websocket_sender_debug() {
        let sender = MockWebsocketSender::default();
        let debug_str = format!("{:?}", &sender as &dyn WebsocketSender);
        assert_eq!(debug_str, "{WebsocketSender}");
    }
}
