//! Message delivery through a managed WebSocket gateway.
//!
//! Used when the relay is deployed behind an API-gateway style WebSocket
//! service: the gateway owns the sockets and hands out connection ids, and
//! messages are delivered by posting to its connection-management API.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_apigatewaymanagement::{Client, config, primitives::Blob};

use crate::ws::{WebsocketSendError, WebsocketSender};

/// [`WebsocketSender`] that posts to a gateway's connection-management API.
///
/// A gateway `GoneException` maps to [`WebsocketSendError::Gone`] so callers
/// can treat a departed recipient as a normal outcome.
#[derive(Debug, Clone)]
pub struct ApiGatewaySender {
    client: Client,
}

impl ApiGatewaySender {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a sender for the gateway callback endpoint
    /// (`https://{domain}/{stage}`) using ambient credentials.
    pub async fn from_env(endpoint_url: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let api_management_config = config::Builder::from(&config)
            .endpoint_url(endpoint_url)
            .build();

        Self::new(Client::from_conf(api_management_config))
    }
}

#[async_trait]
impl WebsocketSender for ApiGatewaySender {
    async fn send(&self, connection_id: &str, data: &str) -> Result<(), WebsocketSendError> {
        log::debug!("Posting message to connection {connection_id}");

        self.client
            .post_to_connection()
            .connection_id(connection_id)
            .data(Blob::new(data))
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_gone_exception() {
                    WebsocketSendError::Gone(connection_id.to_string())
                } else {
                    WebsocketSendError::Unknown(service_error.to_string())
                }
            })?;

        Ok(())
    }
}
