//! Pairing broker.
//!
//! Pairings are stored as a symmetric map so that either side can find its partner
//! directly. Every mutation here writes both directions together; nothing outside this
//! module can observe a half-written pairing.

use std::collections::BTreeMap;

use crate::ConnId;

/// Result of a [`PairingTable::try_pair`] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    /// A brand-new pairing was created. The requester moves first.
    Paired(ConnId),
    /// The requester was already paired with this connection.
    Restored(ConnId),
    /// No eligible partner right now.
    Unavailable,
}

impl PairOutcome {
    #[must_use]
    pub const fn matched(self) -> bool {
        !matches!(self, Self::Unavailable)
    }

    /// Only the requester that caused a new pairing gets the first move.
    #[must_use]
    pub const fn first_move(self) -> bool {
        matches!(self, Self::Paired(_))
    }

    #[must_use]
    pub const fn partner(self) -> Option<ConnId> {
        match self {
            Self::Paired(partner) | Self::Restored(partner) => Some(partner),
            Self::Unavailable => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct PairingTable {
    partners: BTreeMap<ConnId, ConnId>,
}

impl PairingTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            partners: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn partner(&self, conn: ConnId) -> Option<ConnId> {
        self.partners.get(&conn).copied()
    }

    #[must_use]
    pub fn is_paired(&self, conn: ConnId) -> bool {
        self.partners.contains_key(&conn)
    }

    /// Number of active pairings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.partners.len() / 2
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }

    /// Finds a partner for `conn` among `candidates`, scanned in the order given.
    ///
    /// For each candidate, in order:
    ///
    /// 1. a candidate already paired with `conn` restores that pairing
    /// 2. `conn` itself and candidates paired with someone else are skipped
    /// 3. otherwise the two are paired
    ///
    /// The first eligible candidate wins, even when `conn` is already paired and its own
    /// partner comes later in the scan. In that case the old pairing is dissolved on both
    /// sides before the new one is written. Nothing about fairness or waiting time is
    /// promised beyond that.
    pub fn try_pair(
        &mut self,
        conn: ConnId,
        candidates: impl IntoIterator<Item = ConnId>,
    ) -> PairOutcome {
        for candidate in candidates {
            let candidate_partner = self.partner(candidate);

            if candidate_partner == Some(conn) {
                if self.partner(conn) != Some(candidate) {
                    log::warn!(
                        "try_pair: restoring one-sided pairing {conn} <-> {candidate} (was {:?})",
                        self.partner(conn)
                    );
                }
                self.link(conn, candidate);
                return PairOutcome::Restored(candidate);
            }

            if candidate == conn || candidate_partner.is_some() {
                continue;
            }

            log::debug!("try_pair: paired {conn} with {candidate}");
            self.link(conn, candidate);
            return PairOutcome::Paired(candidate);
        }

        PairOutcome::Unavailable
    }

    /// Dissolves the pairing `conn` belongs to, in both directions.
    ///
    /// Returns the former partner. A connection without a pairing is a no-op.
    pub fn unpair(&mut self, conn: ConnId) -> Option<ConnId> {
        let partner = self.partners.remove(&conn)?;

        if self.partners.get(&partner) == Some(&conn) {
            self.partners.remove(&partner);
        }

        Some(partner)
    }

    fn link(&mut self, a: ConnId, b: ConnId) {
        debug_assert_ne!(a, b, "a connection cannot be paired with itself");

        for conn in [a, b] {
            if let Some(stale) = self.partners.get(&conn).copied()
                && stale != a
                && stale != b
            {
                log::debug!("link: dissolving {conn} <-> {stale}");
                self.unpair(stale);
            }
        }

        self.partners.insert(a, b);
        self.partners.insert(b, a);
    }
}
