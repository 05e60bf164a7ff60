use std::time::{Duration, Instant};

use actix_ws::{CloseCode, CloseReason, Message};
use futures_util::StreamExt as _;
use pairplay_matchmaking::models::{InboundPayload, OutboundPayload};
use tokio::{sync::mpsc, time::interval};

use crate::ws::{ConnId, server::MatchServerHandle};

/// Per-connection timing and buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// How often heartbeat pings are sent
    pub heartbeat_interval: Duration,
    /// How long before lack of client traffic causes a timeout
    pub client_timeout: Duration,
    /// How long a single socket write may take
    pub write_timeout: Duration,
    /// Frames queued for the socket before the match server has to wait
    pub outbound_buffer: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(1),
            outbound_buffer: 64,
        }
    }
}

/// Forwards decoded client frames to the match server, writes the server's frames back to
/// the socket, and monitors connection health.
///
/// The connection ends when the client goes away, stops answering pings, or a write fails,
/// or when the match server cancels it. In every case the match server is told to forget it.
#[allow(clippy::future_not_send, clippy::too_many_lines)]
pub async fn handle_ws(
    server: MatchServerHandle,
    settings: ConnectionSettings,
    mut session: actix_ws::Session,
    mut msg_stream: actix_ws::MessageStream,
) {
    let (conn_tx, mut conn_rx) = mpsc::channel(settings.outbound_buffer);

    let (conn, token) = match server.connect(conn_tx).await {
        Ok(connected) => connected,
        Err(e) => {
            log::error!("Failed to register connection: {e}");
            let _ = session
                .close(Some(CloseReason::from(CloseCode::Away)))
                .await;
            return;
        }
    };

    log::debug!("handle_ws: conn={conn} connected");

    let mut last_heartbeat = Instant::now();
    let mut interval = interval(settings.heartbeat_interval);

    let close_reason = loop {
        tokio::select! {
            () = token.cancelled() => {
                log::debug!("handle_ws: conn={conn} closed by server");
                break Some(CloseReason::from(CloseCode::Normal));
            }

            msg = msg_stream.next() => match msg {
                Some(Ok(msg)) => {
                    last_heartbeat = Instant::now();

                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break None;
                            }
                        }

                        Message::Pong(_) | Message::Nop => {}

                        Message::Text(text) => {
                            if !process_text_msg(&server, &mut session, settings, conn, &text)
                                .await
                            {
                                break None;
                            }
                        }

                        Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                            Ok(text) => {
                                if !process_text_msg(&server, &mut session, settings, conn, text)
                                    .await
                                {
                                    break None;
                                }
                            }
                            Err(e) => {
                                log::warn!("handle_ws: conn={conn} unexpected binary message: {e:?}");
                            }
                        },

                        Message::Close(reason) => break reason,

                        Message::Continuation(_) => {
                            log::warn!("handle_ws: conn={conn} sent a fragmented frame");
                            break Some(CloseReason::from(CloseCode::Unsupported));
                        }
                    }
                }

                // client WebSocket stream error
                Some(Err(e)) => {
                    log::error!("handle_ws: conn={conn} protocol error: {e:?}");
                    break None;
                }

                // client WebSocket stream ended
                None => break None,
            },

            // frames from the match server
            data = conn_rx.recv() => {
                let Some(data) = data else {
                    log::debug!("handle_ws: conn={conn} outbound channel closed");
                    break None;
                };

                if !write_text(&mut session, settings, conn, data).await {
                    break None;
                }
            }

            _ = interval.tick() => {
                if Instant::now().duration_since(last_heartbeat) > settings.client_timeout {
                    log::info!(
                        "handle_ws: conn={conn} has not sent anything in over {:?}; disconnecting",
                        settings.client_timeout
                    );
                    break None;
                }

                if session.ping(b"").await.is_err() {
                    break None;
                }
            }
        }
    };

    if let Err(e) = server.disconnect(conn).await {
        log::debug!("handle_ws: conn={conn} failed to disconnect: {e}");
    }

    log::debug!("handle_ws: conn={conn} disconnected");

    let _ = session.close(close_reason).await;
}

/// Decodes one client frame and queues it on the match server.
///
/// Returns `false` if the connection should be dropped.
async fn process_text_msg(
    server: &MatchServerHandle,
    session: &mut actix_ws::Session,
    settings: ConnectionSettings,
    conn: ConnId,
    text: &str,
) -> bool {
    let payload = match decode(text) {
        Ok(payload) => payload,
        Err(e) => {
            log::debug!("handle_ws: conn={conn} sent an invalid frame: {e}");

            return match serde_json::to_string(&OutboundPayload::error(format!(
                "Invalid message: {e}"
            ))) {
                Ok(data) => write_text(session, settings, conn, data).await,
                Err(e) => {
                    log::error!("handle_ws: failed to encode error frame: {e}");
                    true
                }
            };
        }
    };

    if let Err(e) = server.send_message(conn, payload).await {
        log::error!("handle_ws: conn={conn} failed to queue message: {e}");
        return false;
    }

    true
}

fn decode(text: &str) -> Result<InboundPayload, serde_json::Error> {
    serde_json::from_str(text.trim())
}

async fn write_text(
    session: &mut actix_ws::Session,
    settings: ConnectionSettings,
    conn: ConnId,
    data: String,
) -> bool {
    match tokio::time::timeout(settings.write_timeout, session.text(data)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::debug!("handle_ws: conn={conn} failed to write: {e:?}");
            false
        }
        Err(_) => {
            log::warn!(
                "handle_ws: conn={conn} write took longer than {:?}",
                settings.write_timeout
            );
            false
        }
    }
}
