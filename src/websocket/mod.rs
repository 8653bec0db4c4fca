//! Live push channel
//!
//! Sessions authenticate with a JWT on upgrade; every [`PushEvent`] is fanned
//! out to all open sessions and clients filter by the ids in the payload.

pub mod connection;
pub mod handler;
pub mod messages;

pub use connection::ConnectionManager;
pub use handler::ws_handler;
pub use messages::{ClientMessage, PushEvent, WsMessage};
