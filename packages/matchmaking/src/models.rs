//! Wire payloads exchanged with game clients.
//!
//! Every websocket frame carries exactly one JSON object. Inbound frames are decoded into
//! [`InboundPayload`], outbound frames are encoded from [`OutboundPayload`].

use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;

/// Move code sent on responses that do not carry a move.
pub const NO_MOVE: i64 = -1;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum InboundAction {
    Match,
    Move,
    Over,
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for InboundAction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// A decoded client frame.
///
/// Every field is optional on the wire. Capitalised field names are accepted as well.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundPayload {
    #[serde(alias = "Action")]
    pub action: InboundAction,
    #[serde(alias = "Username")]
    pub username: String,
    #[serde(alias = "Message")]
    pub message: String,
    #[serde(rename = "move", alias = "Move")]
    pub move_code: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum OutboundAction {
    MatchSuccess,
    MatchFail,
    Move,
    Error,
}

impl std::fmt::Display for OutboundAction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundPayload {
    pub action: OutboundAction,
    pub message: String,
    #[serde(rename = "move")]
    pub move_code: i64,
    pub first_move: bool,
    /// Only present on responses triggered by a `match` request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_users: Option<Vec<String>>,
}

impl OutboundPayload {
    #[must_use]
    pub fn match_success(first_move: bool, connected_users: Vec<String>) -> Self {
        Self {
            action: OutboundAction::MatchSuccess,
            message: "Player found".into(),
            move_code: NO_MOVE,
            first_move,
            connected_users: Some(connected_users),
        }
    }

    #[must_use]
    pub fn match_fail(connected_users: Vec<String>) -> Self {
        Self {
            action: OutboundAction::MatchFail,
            message: "No available players found".into(),
            move_code: NO_MOVE,
            first_move: false,
            connected_users: Some(connected_users),
        }
    }

    #[must_use]
    pub fn relayed_move(move_code: i64, message: impl Into<String>) -> Self {
        Self {
            action: OutboundAction::Move,
            message: message.into(),
            move_code,
            first_move: false,
            connected_users: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            action: OutboundAction::Error,
            message: message.into(),
            move_code: NO_MOVE,
            first_move: false,
            connected_users: None,
        }
    }
}
