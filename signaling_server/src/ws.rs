pub mod api;
pub mod handler;
pub mod server;

/// Connection ID.
pub type ConnId = usize;

/// Message sent to a client.
pub type Msg = String;
