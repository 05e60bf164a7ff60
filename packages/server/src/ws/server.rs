//! The matchmaking event loop.
//!
//! [`MatchServer`] owns the [`Matchmaker`] and every connection's outbound channel. It is
//! the only code that reads or mutates that state, and it handles one [`Command`] fully
//! before starting the next. Connection handlers talk to it exclusively through a
//! [`MatchServerHandle`].

use std::{collections::BTreeMap, panic::AssertUnwindSafe, time::Duration};

use async_trait::async_trait;
use futures_util::FutureExt as _;
use pairplay_matchmaking::{
    Matchmaker, MatchmakingSender, ProcessError, SendError, models::InboundPayload,
    registry::RegistryError,
};
use strum_macros::AsRefStr;
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::SendTimeoutError},
    oneshot,
};
use tokio_util::sync::CancellationToken;

use crate::ws::{ConnId, Msg};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Match server is not running")]
    Stopped,
}

/// A command received by the [`MatchServer`].
#[derive(Debug, AsRefStr)]
pub enum Command {
    /// Registers a new connection.
    Connect {
        /// Channel the connection's handler writes to its socket from.
        conn_tx: mpsc::Sender<Msg>,
        /// Cancelling this closes the connection.
        token: CancellationToken,
        /// Channel to send back the assigned connection ID.
        res_tx: oneshot::Sender<ConnId>,
    },

    /// Forgets a connection whose handler has stopped.
    Disconnect { conn: ConnId },

    /// A decoded frame from a connection.
    Message {
        conn: ConnId,
        payload: InboundPayload,
    },

    /// Reads the sorted list of connected display names.
    ConnectedUsers {
        res_tx: oneshot::Sender<Vec<String>>,
    },
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

#[derive(Debug)]
struct Connection {
    sender: mpsc::Sender<Msg>,
    token: CancellationToken,
}

/// Outbound channels of every live connection.
#[derive(Debug)]
struct Outbound {
    connections: BTreeMap<ConnId, Connection>,
    write_timeout: Duration,
}

#[async_trait]
impl MatchmakingSender for Outbound {
    async fn send(&self, conn: ConnId, data: &str) -> Result<(), SendError> {
        let Some(Connection { sender, .. }) = self.connections.get(&conn) else {
            return Err(SendError::NotConnected(conn));
        };

        log::trace!("Sending to {conn}: {data}");

        sender
            .send_timeout(data.to_string(), self.write_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => SendError::Timeout(conn),
                SendTimeoutError::Closed(_) => SendError::Closed(conn),
            })
    }

    fn close(&self, conn: ConnId) {
        if let Some(Connection { token, .. }) = self.connections.get(&conn) {
            log::debug!("Closing connection {conn}");
            token.cancel();
        }
    }
}

#[derive(Debug)]
pub struct MatchServer {
    matchmaker: Matchmaker,
    outbound: Outbound,
    next_conn_id: ConnId,
    cmd_rx: flume::Receiver<Command>,
    token: CancellationToken,
}

impl MatchServer {
    #[must_use]
    pub fn new(write_timeout: Duration) -> (Self, MatchServerHandle) {
        let (cmd_tx, cmd_rx) = flume::unbounded();
        let token = CancellationToken::new();
        let handle = MatchServerHandle {
            cmd_tx,
            token: token.clone(),
        };

        (
            Self {
                matchmaker: Matchmaker::new(),
                outbound: Outbound {
                    connections: BTreeMap::new(),
                    write_timeout,
                },
                next_conn_id: 1,
                cmd_rx,
                token,
            },
            handle,
        )
    }

    fn connect(
        &mut self,
        conn_tx: mpsc::Sender<Msg>,
        token: CancellationToken,
    ) -> Result<ConnId, ServerError> {
        let id = self.next_conn_id;
        self.next_conn_id += 1;

        self.matchmaker.register(id)?;
        self.outbound.connections.insert(
            id,
            Connection {
                sender: conn_tx,
                token,
            },
        );

        log::info!(
            "Connection {id} joined ({} connected)",
            self.outbound.connections.len()
        );

        Ok(id)
    }

    fn disconnect(&mut self, conn: ConnId) {
        self.matchmaker.unregister(conn);

        if let Some(Connection { token, .. }) = self.outbound.connections.remove(&conn) {
            token.cancel();
            log::info!(
                "Connection {conn} left ({} connected)",
                self.outbound.connections.len()
            );
        }
    }

    async fn process_command(&mut self, cmd: Command) -> Result<(), ServerError> {
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("process_command: cmd={cmd:?}");
        } else {
            log::debug!("process_command: cmd={cmd}");
        }

        match cmd {
            Command::Connect {
                conn_tx,
                token,
                res_tx,
            } => {
                let conn = self.connect(conn_tx, token)?;
                if res_tx.send(conn).is_err() {
                    log::debug!("Connection {conn} went away before it was registered");
                    self.disconnect(conn);
                }
            }

            Command::Disconnect { conn } => self.disconnect(conn),

            Command::Message { conn, payload } => {
                self.matchmaker
                    .process_message(&self.outbound, conn, payload)
                    .await?;
            }

            Command::ConnectedUsers { res_tx } => {
                let _ = res_tx.send(self.matchmaker.connected_users());
            }
        }

        Ok(())
    }

    /// Processes commands until the server is shut down.
    ///
    /// An error or panic while processing one command is logged and the loop moves on to
    /// the next one.
    pub async fn run(mut self) {
        let token = self.token.clone();
        let cmd_rx = self.cmd_rx.clone();

        while let Some(cmd) = tokio::select!(
            biased;
            () = token.cancelled() => {
                log::debug!("MatchServer was cancelled");
                None
            }
            cmd = cmd_rx.recv_async() => cmd.ok()
        ) {
            let cmd_str = cmd.to_string();
            contain_fault(&cmd_str, self.process_command(cmd)).await;
        }

        // queued replies are dropped so their callers see the server as stopped
        cmd_rx.drain().for_each(drop);

        for (_, Connection { token, .. }) in std::mem::take(&mut self.outbound.connections) {
            token.cancel();
        }

        log::debug!("Stopped MatchServer");
    }
}

/// Awaits the processing of one command, logging an error or panic instead of letting it
/// escape.
///
/// Returns `false` if the command failed.
async fn contain_fault(
    cmd: &str,
    processing: impl Future<Output = Result<(), ServerError>>,
) -> bool {
    match AssertUnwindSafe(processing).catch_unwind().await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::error!("Failed to process {cmd} command: {e:?}");
            false
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            log::error!("Panicked while processing {cmd} command: {reason}");
            false
        }
    }
}

/// Handle and command sender for the match server.
///
/// Cloned into every connection handler and HTTP endpoint.
#[derive(Debug, Clone)]
pub struct MatchServerHandle {
    cmd_tx: flume::Sender<Command>,
    token: CancellationToken,
}

impl MatchServerHandle {
    /// Registers a connection's outbound channel.
    ///
    /// Returns the assigned connection id, and a token the server cancels when it wants the
    /// connection closed.
    ///
    /// # Errors
    ///
    /// * If the match server has stopped
    pub async fn connect(
        &self,
        conn_tx: mpsc::Sender<Msg>,
    ) -> Result<(ConnId, CancellationToken), ServerError> {
        log::trace!("Sending Connect command");

        let (res_tx, res_rx) = oneshot::channel();
        let token = self.token.child_token();

        self.cmd_tx
            .send_async(Command::Connect {
                conn_tx,
                token: token.clone(),
                res_tx,
            })
            .await
            .map_err(|_| ServerError::Stopped)?;

        let conn = self.reply(res_rx).await?;

        Ok((conn, token))
    }

    /// Queues a decoded frame from `conn`.
    ///
    /// # Errors
    ///
    /// * If the match server has stopped
    pub async fn send_message(
        &self,
        conn: ConnId,
        payload: InboundPayload,
    ) -> Result<(), ServerError> {
        log::trace!("Sending Message command");

        self.cmd_tx
            .send_async(Command::Message { conn, payload })
            .await
            .map_err(|_| ServerError::Stopped)
    }

    /// # Errors
    ///
    /// * If the match server has stopped
    pub async fn disconnect(&self, conn: ConnId) -> Result<(), ServerError> {
        log::trace!("Sending Disconnect command");

        self.cmd_tx
            .send_async(Command::Disconnect { conn })
            .await
            .map_err(|_| ServerError::Stopped)
    }

    /// # Errors
    ///
    /// * If the match server has stopped
    pub async fn connected_users(&self) -> Result<Vec<String>, ServerError> {
        let (res_tx, res_rx) = oneshot::channel();

        self.cmd_tx
            .send_async(Command::ConnectedUsers { res_tx })
            .await
            .map_err(|_| ServerError::Stopped)?;

        self.reply(res_rx).await
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    async fn reply<T>(&self, res_rx: oneshot::Receiver<T>) -> Result<T, ServerError> {
        tokio::select! {
            res = res_rx => res.map_err(|_| ServerError::Stopped),
            () = self.token.cancelled() => Err(ServerError::Stopped),
        }
    }
}
