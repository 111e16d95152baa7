//! Listing state machine.

use serde::{Deserialize, Serialize};

/// The state of a listing in its lifecycle.
///
/// State transitions:
/// ```text
/// Available ◄──► Reserved ──► Sold
///     │              │
///     └──────────────┴──► Removed
/// ```
///
/// `Sold` and `Removed` are terminal; no further mutation is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListingState {
    /// Listed and open to offers.
    #[default]
    Available,

    /// An offer was accepted; the sale awaits finalization.
    Reserved,

    /// Sale finalized (terminal state).
    Sold,

    /// Withdrawn by the seller or cleaned up (terminal state).
    Removed,
}

impl ListingState {
    /// Returns true if the listing can be reserved in this state.
    pub fn can_reserve(&self) -> bool {
        matches!(self, ListingState::Available)
    }

    /// Returns true if the reservation can be released in this state.
    pub fn can_unreserve(&self) -> bool {
        matches!(self, ListingState::Reserved)
    }

    /// Returns true if the sale can be finalized in this state.
    pub fn can_sell(&self) -> bool {
        matches!(self, ListingState::Reserved)
    }

    /// Returns true if the listing can be removed in this state.
    pub fn can_remove(&self) -> bool {
        matches!(self, ListingState::Available | ListingState::Reserved)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ListingState::Sold | ListingState::Removed)
    }

    /// Returns the state name as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingState::Available => "available",
            ListingState::Reserved => "reserved",
            ListingState::Sold => "sold",
            ListingState::Removed => "removed",
        }
    }
}

impl std::fmt::Display for ListingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ListingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(ListingState::Available),
            "reserved" => Ok(ListingState::Reserved),
            "sold" => Ok(ListingState::Sold),
            "removed" => Ok(ListingState::Removed),
            other => Err(format!("unknown listing state: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_available() {
        assert_eq!(ListingState::default(), ListingState::Available);
    }

    #[test]
    fn only_available_can_reserve() {
        assert!(ListingState::Available.can_reserve());
        assert!(!ListingState::Reserved.can_reserve());
        assert!(!ListingState::Sold.can_reserve());
        assert!(!ListingState::Removed.can_reserve());
    }

    #[test]
    fn only_reserved_can_unreserve_or_sell() {
        assert!(ListingState::Reserved.can_unreserve());
        assert!(ListingState::Reserved.can_sell());
        assert!(!ListingState::Available.can_unreserve());
        assert!(!ListingState::Available.can_sell());
        assert!(!ListingState::Sold.can_sell());
        assert!(!ListingState::Removed.can_sell());
    }

    #[test]
    fn removal_is_allowed_from_non_terminal_states() {
        assert!(ListingState::Available.can_remove());
        assert!(ListingState::Reserved.can_remove());
        assert!(!ListingState::Sold.can_remove());
        assert!(!ListingState::Removed.can_remove());
    }

    #[test]
    fn terminal_states() {
        assert!(!ListingState::Available.is_terminal());
        assert!(!ListingState::Reserved.is_terminal());
        assert!(ListingState::Sold.is_terminal());
        assert!(ListingState::Removed.is_terminal());
    }

    #[test]
    fn string_round_trip() {
        for state in [
            ListingState::Available,
            ListingState::Reserved,
            ListingState::Sold,
            ListingState::Removed,
        ] {
            assert_eq!(state.as_str().parse::<ListingState>().unwrap(), state);
        }
        assert!("draft".parse::<ListingState>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&ListingState::Available).unwrap(),
            "\"available\""
        );
    }
}
