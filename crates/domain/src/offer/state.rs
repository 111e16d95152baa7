//! Offer state machine.

use serde::{Deserialize, Serialize};

/// The status of a negotiation message.
///
/// State transitions:
/// ```text
/// Pending ──► Countered ─┐
///    │            │      │
///    ├──► Accepted ◄─────┘
///    ├──► Rejected      (also reachable from Countered)
///    ├──► Expired       (also reachable from Countered and Accepted)
///    └──► Withdrawn     (also reachable from Countered)
/// ```
///
/// A countered offer is superseded by a new counter-offer row (the
/// history is never rewritten), but its original terms remain acceptable
/// until the listing is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    /// Awaiting a response from the counterparty.
    #[default]
    Pending,

    /// Superseded by a counter-offer; still acceptable.
    Countered,

    /// Accepted; at most one offer per listing ever holds this status.
    Accepted,

    /// Declined by the counterparty, or invalidated when a competing
    /// offer was accepted first (terminal).
    Rejected,

    /// Lapsed past its TTL (terminal).
    Expired,

    /// Withdrawn by its author (terminal).
    Withdrawn,
}

impl OfferStatus {
    /// Returns true if the counterparty can still respond
    /// (accept or reject).
    pub fn can_respond(&self) -> bool {
        matches!(self, OfferStatus::Pending | OfferStatus::Countered)
    }

    /// Returns true if a counter-offer can supersede this one.
    pub fn can_counter(&self) -> bool {
        matches!(self, OfferStatus::Pending)
    }

    /// Returns true if the author can withdraw.
    pub fn can_withdraw(&self) -> bool {
        matches!(self, OfferStatus::Pending | OfferStatus::Countered)
    }

    /// Returns true if the expiry sweep can lapse this offer.
    ///
    /// Accepted offers expire too: a reservation whose sale never
    /// finalizes must not hold the listing forever.
    pub fn can_expire(&self) -> bool {
        matches!(
            self,
            OfferStatus::Pending | OfferStatus::Countered | OfferStatus::Accepted
        )
    }

    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OfferStatus::Rejected | OfferStatus::Expired | OfferStatus::Withdrawn
        )
    }

    /// Returns the status name as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Countered => "countered",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Expired => "expired",
            OfferStatus::Withdrawn => "withdrawn",
        }
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OfferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OfferStatus::Pending),
            "countered" => Ok(OfferStatus::Countered),
            "accepted" => Ok(OfferStatus::Accepted),
            "rejected" => Ok(OfferStatus::Rejected),
            "expired" => Ok(OfferStatus::Expired),
            "withdrawn" => Ok(OfferStatus::Withdrawn),
            other => Err(format!("unknown offer status: {other}")),
        }
    }
}
