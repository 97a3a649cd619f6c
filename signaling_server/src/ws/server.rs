//! In-process session server for the signaling relay.
//!
//! Owns the map of live connections and delivers frames to them on behalf of
//! the message handlers. A defunct or unknown target is reported as
//! [`WebsocketSendError::Gone`], which the relay treats as a normal outcome.

use std::{
    collections::HashMap,
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use log::{debug, error, info};
use peerline_signaling::{WebsocketSendError, WebsocketSender};
use rand::Rng as _;
use tokio::sync::{mpsc, oneshot};

use crate::ws::{ConnId, Msg};

/// A command received by the [`SignalingServer`].
#[derive(Debug)]
enum Command {
    Connect {
        conn_tx: mpsc::UnboundedSender<Msg>,
        res_tx: oneshot::Sender<ConnId>,
    },

    Disconnect {
        conn: ConnId,
    },

    Message {
        msg: Msg,
        conn: ConnId,
        res_tx: oneshot::Sender<Result<(), WebsocketSendError>>,
    },
}

/// Session server for the signaling relay.
///
/// Call and spawn [`run`](Self::run) to start processing commands.
#[derive(Debug)]
pub struct SignalingServer {
    /// Map of connection IDs to their message senders.
    sessions: HashMap<ConnId, mpsc::UnboundedSender<Msg>>,

    /// Tracks total number of historical connections established.
    visitor_count: Arc<AtomicUsize>,

    /// Command receiver.
    cmd_rx: mpsc::UnboundedReceiver<Command>,
}

impl SignalingServer {
    #[must_use]
    pub fn new() -> (Self, SignalingServerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        (
            Self {
                sessions: HashMap::new(),
                visitor_count: Arc::new(AtomicUsize::new(0)),
                cmd_rx,
            },
            SignalingServerHandle { cmd_tx },
        )
    }

    /// Send message directly to the user.
    fn send_message_to(&self, id: ConnId, msg: impl Into<String>) -> Result<(), WebsocketSendError> {
        debug!("Sending message to {id}");

        if let Some(session) = self.sessions.get(&id) {
            // errors if client disconnected abruptly and hasn't been timed-out yet
            session
                .send(msg.into())
                .map_err(|_| WebsocketSendError::Gone(id.to_string()))
        } else {
            Err(WebsocketSendError::Gone(id.to_string()))
        }
    }

    /// Register new session and assign unique ID to this session
    fn connect(&mut self, tx: mpsc::UnboundedSender<Msg>) -> ConnId {
        // register session with random connection ID
        let id = rand::rng().random_range(0..=ConnId::MAX);

        info!("Someone joined {id}");

        self.sessions.insert(id, tx);

        let count = self.visitor_count.fetch_add(1, Ordering::SeqCst);
        info!("Visitor count: {}", count + 1);

        // send id back
        id
    }

    /// Unregister connection from the session map.
    fn disconnect(&mut self, conn_id: ConnId) {
        info!("Someone disconnected {conn_id}");

        self.sessions.remove(&conn_id);
    }

    pub async fn run(mut self) -> io::Result<()> {
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::Connect { conn_tx, res_tx } => {
                    if let Err(error) = res_tx.send(self.connect(conn_tx)) {
                        error!("Failed to connect {error:?}");
                    }
                }

                Command::Disconnect { conn } => self.disconnect(conn),

                Command::Message { conn, msg, res_tx } => {
                    let result = self.send_message_to(conn, &msg);
                    if let Err(error) = &result {
                        error!("Failed to send message to {conn}: {error:?}");
                    }
                    let _ = res_tx.send(result);
                }
            }
        }

        Ok(())
    }
}

/// Handle and command sender for the signaling server.
///
/// Reduces boilerplate of setting up response channels in WebSocket handlers.
#[derive(Debug, Clone)]
pub struct SignalingServerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl SignalingServerHandle {
    /// Register client message sender and obtain connection ID.
    pub async fn connect(&self, conn_tx: mpsc::UnboundedSender<Msg>) -> ConnId {
        let (res_tx, res_rx) = oneshot::channel();

        // unwrap: signaling server should not have been dropped
        self.cmd_tx.send(Command::Connect { conn_tx, res_tx }).unwrap();

        // unwrap: signaling server does not drop our response channel
        res_rx.await.unwrap()
    }

    /// Deliver a message to a connection.
    ///
    /// # Errors
    ///
    /// * If the target connection is gone
    /// * If the signaling server is no longer running
    pub async fn send_message(
        &self,
        conn: ConnId,
        msg: impl Into<String> + Send,
    ) -> Result<(), WebsocketSendError> {
        let (res_tx, res_rx) = oneshot::channel();

        self.cmd_tx
            .send(Command::Message {
                msg: msg.into(),
                conn,
                res_tx,
            })
            .map_err(|e| WebsocketSendError::Unknown(e.to_string()))?;

        res_rx
            .await
            .map_err(|e| WebsocketSendError::Unknown(e.to_string()))?
    }

    /// Unregister message sender.
    pub fn disconnect(&self, conn: ConnId) {
        // unwrap: signaling server should not have been dropped
        self.cmd_tx.send(Command::Disconnect { conn }).unwrap();
    }
}

#[async_trait]
impl WebsocketSender for SignalingServerHandle {
    async fn send(&self, connection_id: &str, data: &str) -> Result<(), WebsocketSendError> {
        let conn = connection_id.parse::<ConnId>()?;

        self.send_message(conn, data).await
    }
}
