//! WebSocket signaling for Peerline.
//!
//! This crate provides the signaling core for relaying opaque peer-to-peer
//! payloads (WebRTC offers, answers, ICE candidates) between connected
//! clients. Clients address each other either by raw connection id or by a
//! username claimed through the alias registry.
//!
//! # Main Components
//!
//! * [`WebsocketSender`] - Trait for delivering messages to a connection
//! * [`WebsocketContext`] - Context information for an inbound request
//! * [`process_message`] - Parses and routes incoming WebSocket messages
//! * [`connect`] and [`disconnect`] - Handle connection lifecycle
//! * [`models`] - Message payload types for inbound and outbound communication
//!
//! # Example
//!
//! ```rust,no_run
//! # use peerline_signaling::{WebsocketSender, WebsocketContext, WebsocketSendError, connect};
//! # struct MockSender;
//! # #[async_trait::async_trait]
//! # impl WebsocketSender for MockSender {
//! #     async fn send(&self, _: &str, _: &str) -> Result<(), WebsocketSendError> { Ok(()) }
//! # }
//! # let sender = MockSender;
//! // When a client connects
//! let context = WebsocketContext {
//!     connection_id: "client-123".to_string(),
//!     request_time: 0,
//! };
//! let response = connect(&context);
//! ```

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

mod ws;

pub use ws::*;

#[cfg(feature = "gateway")]
pub mod gateway;

pub mod models;
