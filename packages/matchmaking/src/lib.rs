//! Matchmaking and move relay for two-player `pairplay` sessions.
//!
//! This crate owns the game-facing state: which connections are live, what they call
//! themselves, and who is paired with whom. It has no transport of its own. Everything it
//! writes goes through a [`MatchmakingSender`], and everything it reads arrives as an
//! already-decoded [`models::InboundPayload`].
//!
//! # Main Components
//!
//! * [`Matchmaker`] - Registry plus pairing table, and the dispatch for inbound actions
//! * [`registry::ClientRegistry`] - Live connections and their display names
//! * [`pairing::PairingTable`] - Symmetric pairings and the pairing scan
//! * [`relay`] - Move forwarding and session teardown
//! * [`models`] - Wire payloads
//!
//! A [`Matchmaker`] is not synchronized. It is meant to be owned by exactly one task that
//! processes commands one at a time.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    models::{InboundAction, InboundPayload, OutboundPayload},
    pairing::{PairOutcome, PairingTable},
    registry::{ClientRegistry, RegistryError},
};

pub mod models;
pub mod pairing;
pub mod registry;
pub mod relay;

/// Identifies one live connection. Assigned by the transport, never reused.
pub type ConnId = u64;

/// Errors that can occur when writing to a connection.
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection is not known to the transport
    #[error("Connection {0} not connected")]
    NotConnected(ConnId),
    /// The connection's outbound channel is closed
    #[error("Connection {0} closed")]
    Closed(ConnId),
    /// The connection did not accept the frame in time
    #[error("Timed out writing to connection {0}")]
    Timeout(ConnId),
}

/// Errors that can occur while processing an inbound payload.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// JSON serialization error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Outbound side of the transport.
#[async_trait]
pub trait MatchmakingSender: Send + Sync {
    /// Writes one encoded frame to `conn`.
    ///
    /// # Errors
    ///
    /// * If the frame could not be handed to the connection. Callers treat this as the
    ///   connection being dead.
    async fn send(&self, conn: ConnId, data: &str) -> Result<(), SendError>;

    /// Closes `conn` from the server side.
    fn close(&self, conn: ConnId);
}

impl core::fmt::Debug for dyn MatchmakingSender {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{{MatchmakingSender}}")
    }
}

/// Encodes `payload` and writes it to `conn`.
///
/// # Errors
///
/// * If the payload fails to serialize
pub async fn send_payload(
    sender: &(impl MatchmakingSender + ?Sized),
    conn: ConnId,
    payload: &OutboundPayload,
) -> Result<Result<(), SendError>, ProcessError> {
    let data = serde_json::to_string(payload)?;

    Ok(sender.send(conn, &data).await)
}

#[derive(Debug, Default)]
pub struct Matchmaker {
    registry: ClientRegistry,
    pairs: PairingTable,
}

impl Matchmaker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registry: ClientRegistry::new(),
            pairs: PairingTable::new(),
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn pairs(&self) -> &PairingTable {
        &self.pairs
    }

    /// # Errors
    ///
    /// * If `conn` is already registered
    pub fn register(&mut self, conn: ConnId) -> Result<(), RegistryError> {
        self.registry.register(conn)?;
        log::debug!("register: conn={conn} clients={}", self.registry.len());
        Ok(())
    }

    /// Removes `conn` and ends any session it was part of.
    ///
    /// Returns the display name `conn` had, if it was registered.
    pub fn unregister(&mut self, conn: ConnId) -> Option<String> {
        self.end_session(conn);
        let name = self.registry.unregister(conn);
        if name.is_some() {
            log::debug!("unregister: conn={conn} clients={}", self.registry.len());
        }
        name
    }

    /// Sorted display names of every named connection.
    #[must_use]
    pub fn connected_users(&self) -> Vec<String> {
        self.registry.list_names()
    }

    /// Runs the pairing scan for `conn` over every registered connection.
    pub fn request_match(&mut self, conn: ConnId) -> PairOutcome {
        self.pairs.try_pair(conn, self.registry.connections())
    }

    /// Applies one decoded client frame from `conn`.
    ///
    /// Protocol errors (a move while unpaired, an unknown action, a frame from a connection
    /// that has already been torn down) are logged and dropped. Transport failures tear the
    /// affected connections down through `sender`.
    ///
    /// # Errors
    ///
    /// * If a response fails to serialize
    pub async fn process_message(
        &mut self,
        sender: &(impl MatchmakingSender + ?Sized),
        conn: ConnId,
        payload: InboundPayload,
    ) -> Result<(), ProcessError> {
        if !self.registry.contains(conn) {
            log::debug!(
                "process_message: dropping {} from unregistered conn={conn}",
                payload.action
            );
            return Ok(());
        }

        if !payload.username.is_empty()
            && self.registry.name(conn) != Some(payload.username.as_str())
        {
            log::debug!("process_message: conn={conn} is now '{}'", payload.username);
            self.registry.set_name(conn, payload.username);
        }

        match payload.action {
            InboundAction::Match => self.handle_match(sender, conn).await,
            InboundAction::Move => {
                self.relay_move(sender, conn, payload.move_code, payload.message)
                    .await
            }
            InboundAction::Over => {
                self.end_session(conn);
                Ok(())
            }
            InboundAction::Unknown => {
                log::debug!("process_message: ignoring unknown action from conn={conn}");
                Ok(())
            }
        }
    }

    async fn handle_match(
        &mut self,
        sender: &(impl MatchmakingSender + ?Sized),
        conn: ConnId,
    ) -> Result<(), ProcessError> {
        let users = self.connected_users();
        let outcome = self.request_match(conn);

        log::debug!("handle_match: conn={conn} outcome={outcome:?}");

        let response = if outcome.matched() {
            OutboundPayload::match_success(outcome.first_move(), users)
        } else {
            OutboundPayload::match_fail(users)
        };

        if let Err(e) = send_payload(sender, conn, &response).await? {
            log::warn!("handle_match: failed to respond to conn={conn}: {e}");
            self.teardown(sender, conn);
        }

        Ok(())
    }

    /// Forgets `conn` entirely and closes it.
    pub fn teardown(&mut self, sender: &(impl MatchmakingSender + ?Sized), conn: ConnId) {
        log::debug!("teardown: conn={conn}");
        self.unregister(conn);
        sender.close(conn);
    }
}
