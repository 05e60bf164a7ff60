//! Move forwarding between the two sides of a pairing, and session teardown.

use crate::{
    ConnId, Matchmaker, MatchmakingSender, ProcessError, models::OutboundPayload, send_payload,
};

impl Matchmaker {
    /// Forwards a move from `conn` to its partner. The sender never gets an echo.
    ///
    /// A move from an unpaired connection is dropped. If the partner cannot be written to,
    /// both sides are torn down.
    ///
    /// # Errors
    ///
    /// * If the move fails to serialize
    pub async fn relay_move(
        &mut self,
        sender: &(impl MatchmakingSender + ?Sized),
        conn: ConnId,
        move_code: i64,
        message: String,
    ) -> Result<(), ProcessError> {
        let Some(partner) = self.pairs.partner(conn) else {
            log::warn!("relay_move: conn={conn} sent a move while unpaired");
            return Ok(());
        };

        log::trace!("relay_move: conn={conn} partner={partner} move={move_code}");

        let response = OutboundPayload::relayed_move(move_code, message);

        if let Err(e) = send_payload(sender, partner, &response).await? {
            log::warn!("relay_move: failed to deliver move from conn={conn} to {partner}: {e}");
            self.teardown(sender, conn);
            self.teardown(sender, partner);
        }

        Ok(())
    }

    /// Ends the session `conn` is part of, leaving both sides free to match again.
    ///
    /// Returns the former partner. Ending a session that does not exist is a no-op.
    pub fn end_session(&mut self, conn: ConnId) -> Option<ConnId> {
        let partner = self.pairs.unpair(conn);
        if let Some(partner) = partner {
            log::debug!("end_session: conn={conn} partner={partner}");
        }
        partner
    }
}
