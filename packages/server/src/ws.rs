//! WebSocket matchmaking server and connection handling.
//!
//! [`server::MatchServer`] is the single task that owns all matchmaking state. Every
//! websocket connection runs [`handler::handle_ws`], which feeds decoded frames to the match
//! server and writes its responses back to the socket.

pub mod handler;
pub mod server;

pub use pairplay_matchmaking::ConnId;

/// An encoded JSON frame on its way to a client.
pub type Msg = String;
