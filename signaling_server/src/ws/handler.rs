use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use actix_ws::Message;
use futures_util::{
    StreamExt as _,
    future::{Either, select},
};
use log::{debug, error};
use peerline_registry::AliasRegistry;
use peerline_signaling::{WebsocketContext, WebsocketMessageError};
use serde_json::Value;
use tokio::{pin, sync::mpsc, time::interval};

use crate::ws::ConnId;
use crate::ws::server::SignalingServerHandle;

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

fn epoch_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |duration| {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    })
}

/// Process signaling messages received from the client, respond to ping
/// messages, and monitor connection health to detect network issues and free
/// up resources.
pub async fn signaling_ws(
    server_handle: SignalingServerHandle,
    registry: Arc<AliasRegistry>,
    mut session: actix_ws::Session,
    mut msg_stream: actix_ws::MessageStream,
) {
    log::info!("Connected");

    let mut last_heartbeat = Instant::now();
    let mut interval = interval(HEARTBEAT_INTERVAL);

    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();

    // unwrap: signaling server is not dropped before the HTTP server
    let conn_id = server_handle.connect(conn_tx).await;

    log::info!("Connection id: {conn_id}");

    let response = peerline_signaling::connect(&WebsocketContext {
        connection_id: conn_id.to_string(),
        request_time: epoch_millis(),
    });
    debug!("Connect response: {} {}", response.status_code, response.body);

    let close_reason = loop {
        // most of the futures we process need to be stack-pinned to work with select()

        let tick = interval.tick();
        pin!(tick);

        let msg_rx = conn_rx.recv();
        pin!(msg_rx);

        let messages = select(msg_stream.next(), msg_rx);
        pin!(messages);

        match select(messages, tick).await {
            // commands & messages received from client
            Either::Left((Either::Left((Some(Ok(msg)), _)), _)) => match msg {
                Message::Ping(bytes) => {
                    last_heartbeat = Instant::now();
                    session.pong(&bytes).await.unwrap();
                }

                Message::Pong(_) => {
                    last_heartbeat = Instant::now();
                }

                Message::Text(text) => {
                    last_heartbeat = Instant::now();
                    let text: &str = text.as_ref();
                    process_text(&server_handle, &registry, conn_id, &mut session, text).await;
                }

                Message::Binary(_) => {
                    last_heartbeat = Instant::now();
                    debug!("Ignoring unexpected binary message from {conn_id}");
                }

                Message::Close(reason) => break reason,

                _ => {
                    break None;
                }
            },

            // client WebSocket stream error
            Either::Left((Either::Left((Some(Err(err)), _)), _)) => {
                log::error!("{}", err);
                break None;
            }

            // client WebSocket stream ended
            Either::Left((Either::Left((None, _)), _)) => break None,

            // messages relayed from other connections
            Either::Left((Either::Right((Some(relay_msg), _)), _)) => {
                session.text(relay_msg).await.unwrap();
            }

            // all connection's message senders were dropped
            Either::Left((Either::Right((None, _)), _)) => unreachable!(
                "all connection message senders were dropped; signaling server may have panicked"
            ),

            // heartbeat internal tick
            Either::Right((_inst, _)) => {
                // if no heartbeat ping/pong received recently, close the connection
                if Instant::now().duration_since(last_heartbeat) > CLIENT_TIMEOUT {
                    log::info!(
                        "client has not sent heartbeat in over {CLIENT_TIMEOUT:?}; disconnecting"
                    );
                    break None;
                }

                // send heartbeat ping
                let _ = session.ping(b"").await;
            }
        };
    };

    peerline_signaling::disconnect(
        &registry,
        &WebsocketContext {
            connection_id: conn_id.to_string(),
            request_time: epoch_millis(),
        },
    );
    server_handle.disconnect(conn_id);

    // attempt to close connection gracefully
    let _ = session.close(close_reason).await;
}

async fn process_text(
    server_handle: &SignalingServerHandle,
    registry: &AliasRegistry,
    conn_id: ConnId,
    session: &mut actix_ws::Session,
    text: &str,
) {
    let context = WebsocketContext {
        connection_id: conn_id.to_string(),
        request_time: epoch_millis(),
    };

    // blank frames ask the default route for the caller's connection id
    if text.trim().is_empty() {
        if let Err(err) = peerline_signaling::send_connection_id(server_handle, &context).await {
            error!("Failed to send connection id to {conn_id}: {err:?}");
        }
        return;
    }

    let body = match serde_json::from_str::<Value>(text) {
        Ok(body) => body,
        Err(err) => {
            error!("Invalid json message from {conn_id}: {err:?}");
            let response =
                WebsocketMessageError::InvalidMessageType.to_response(context.request_time);
            if session.text(response.body).await.is_err() {
                debug!("Session closed before response could be delivered to {conn_id}");
            }
            return;
        }
    };

    let request_time = context.request_time;

    match peerline_signaling::process_message(registry, body, context, server_handle).await {
        Ok(response) => {
            debug!(
                "Processed message from {conn_id}: {} {}",
                response.status_code, response.body
            );
        }
        Err(err) => {
            error!("Failed to process message from {conn_id}: {err:?}");
            let response = err.to_response(request_time);
            if session.text(response.body).await.is_err() {
                debug!("Session closed before response could be delivered to {conn_id}");
            }
        }
    }
}
