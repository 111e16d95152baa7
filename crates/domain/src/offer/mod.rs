//! Negotiation messages: inquiries, offers, and counter-offers.

mod state;

pub use state::OfferStatus;

use chrono::{DateTime, Duration, Utc};
use common::{ListingId, OfferId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::listing::Listing;
use crate::value_objects::Money;

/// Errors produced by offer validation and transitions.
#[derive(Debug, Error)]
pub enum OfferError {
    /// The requested transition is not legal from the current status.
    #[error("invalid offer transition: cannot {action} from {current} status")]
    InvalidTransition {
        current: OfferStatus,
        action: &'static str,
    },

    /// A buyer cannot negotiate on their own listing.
    #[error("buyers cannot purchase their own listing")]
    SelfPurchase,

    /// Offered amounts must not be negative.
    #[error("offer amount must not be negative")]
    NegativeAmount,

    /// The user is neither the buyer nor the seller of this negotiation.
    #[error("user is not a party to this negotiation")]
    NotAParty,

    /// Only the counterparty to the last message may respond to it.
    #[error("only the counterparty may respond to this offer")]
    NotCounterparty,

    /// Only the author of a message may withdraw it.
    #[error("only the author may withdraw an offer")]
    NotAuthor,

    /// Plain inquiries carry no amount and cannot be accepted or
    /// countered.
    #[error("an inquiry carries no price and cannot be {action}")]
    InquiryNotNegotiable { action: &'static str },
}

/// The kind of negotiation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    /// A question to the seller; carries no amount.
    Inquiry,

    /// A buyer's price proposal.
    Offer,

    /// A reply proposing different terms, superseding a previous offer.
    CounterOffer,
}

impl OfferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferKind::Inquiry => "inquiry",
            OfferKind::Offer => "offer",
            OfferKind::CounterOffer => "counter_offer",
        }
    }
}

impl std::str::FromStr for OfferKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inquiry" => Ok(OfferKind::Inquiry),
            "offer" => Ok(OfferKind::Offer),
            "counter_offer" => Ok(OfferKind::CounterOffer),
            other => Err(format!("unknown offer kind: {other}")),
        }
    }
}

/// A negotiation message attached to exactly one listing.
///
/// Counter-offers are new rows linked through `counter_of`, preserving
/// the full negotiation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    /// The party who wrote this message: the buyer for inquiries and
    /// offers, either party for counter-offers.
    pub author_id: UserId,
    pub kind: OfferKind,
    /// `None` only for plain inquiries.
    pub amount: Option<Money>,
    pub status: OfferStatus,
    pub message: Option<String>,
    /// The offer this row supersedes, if it is a counter-offer.
    pub counter_of: Option<OfferId>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl Offer {
    /// Creates a buyer's price offer on a listing.
    pub fn new_offer(
        id: OfferId,
        listing: &Listing,
        buyer_id: UserId,
        amount: Money,
        message: Option<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, OfferError> {
        if buyer_id == listing.seller_id {
            return Err(OfferError::SelfPurchase);
        }
        if amount.is_negative() {
            return Err(OfferError::NegativeAmount);
        }

        Ok(Self {
            id,
            listing_id: listing.id,
            buyer_id,
            seller_id: listing.seller_id,
            author_id: buyer_id,
            kind: OfferKind::Offer,
            amount: Some(amount),
            status: OfferStatus::Pending,
            message,
            counter_of: None,
            created_at: now,
            responded_at: None,
            expires_at: now + ttl,
        })
    }

    /// Creates a plain inquiry on a listing.
    pub fn new_inquiry(
        id: OfferId,
        listing: &Listing,
        buyer_id: UserId,
        message: Option<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, OfferError> {
        if buyer_id == listing.seller_id {
            return Err(OfferError::SelfPurchase);
        }

        Ok(Self {
            id,
            listing_id: listing.id,
            buyer_id,
            seller_id: listing.seller_id,
            author_id: buyer_id,
            kind: OfferKind::Inquiry,
            amount: None,
            status: OfferStatus::Pending,
            message,
            counter_of: None,
            created_at: now,
            responded_at: None,
            expires_at: now + ttl,
        })
    }

    /// Returns true if the user is the buyer or seller of this
    /// negotiation.
    pub fn is_party(&self, user_id: UserId) -> bool {
        user_id == self.buyer_id || user_id == self.seller_id
    }

    /// Returns true if the offer has lapsed past its TTL.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Builds the counter-offer superseding this one.
    ///
    /// Only the counterparty to this message may counter, and only while
    /// it is still pending. The new row starts `Pending` and links back
    /// through `counter_of`; the caller must also apply
    /// [`Offer::mark_countered`] to this offer.
    pub fn counter(
        &self,
        id: OfferId,
        actor_id: UserId,
        amount: Money,
        message: Option<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Offer, OfferError> {
        self.check_responder(actor_id)?;
        if self.kind == OfferKind::Inquiry {
            return Err(OfferError::InquiryNotNegotiable { action: "counter" });
        }
        if !self.status.can_counter() {
            return Err(OfferError::InvalidTransition {
                current: self.status,
                action: "counter",
            });
        }
        if amount.is_negative() {
            return Err(OfferError::NegativeAmount);
        }

        Ok(Offer {
            id,
            listing_id: self.listing_id,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            author_id: actor_id,
            kind: OfferKind::CounterOffer,
            amount: Some(amount),
            status: OfferStatus::Pending,
            message,
            counter_of: Some(self.id),
            created_at: now,
            responded_at: None,
            expires_at: now + ttl,
        })
    }

    /// Marks this offer superseded by a counter-offer.
    pub fn mark_countered(&mut self, now: DateTime<Utc>) -> Result<(), OfferError> {
        if !self.status.can_counter() {
            return Err(OfferError::InvalidTransition {
                current: self.status,
                action: "mark countered",
            });
        }
        self.status = OfferStatus::Countered;
        self.responded_at = Some(now);
        Ok(())
    }

    /// Accepts the offer. Only the counterparty to this message may
    /// accept, and only while it is pending or countered.
    pub fn accept(&mut self, actor_id: UserId, now: DateTime<Utc>) -> Result<(), OfferError> {
        self.check_responder(actor_id)?;
        if self.kind == OfferKind::Inquiry {
            return Err(OfferError::InquiryNotNegotiable { action: "accepted" });
        }
        if !self.status.can_respond() {
            return Err(OfferError::InvalidTransition {
                current: self.status,
                action: "accept",
            });
        }
        self.status = OfferStatus::Accepted;
        self.responded_at = Some(now);
        Ok(())
    }

    /// Rejects the offer. Only the counterparty may reject.
    pub fn reject(&mut self, actor_id: UserId, now: DateTime<Utc>) -> Result<(), OfferError> {
        self.check_responder(actor_id)?;
        if !self.status.can_respond() {
            return Err(OfferError::InvalidTransition {
                current: self.status,
                action: "reject",
            });
        }
        self.status = OfferStatus::Rejected;
        self.responded_at = Some(now);
        Ok(())
    }

    /// Withdraws the offer. Only its author may withdraw.
    pub fn withdraw(&mut self, actor_id: UserId, now: DateTime<Utc>) -> Result<(), OfferError> {
        if !self.is_party(actor_id) {
            return Err(OfferError::NotAParty);
        }
        if actor_id != self.author_id {
            return Err(OfferError::NotAuthor);
        }
        if !self.status.can_withdraw() {
            return Err(OfferError::InvalidTransition {
                current: self.status,
                action: "withdraw",
            });
        }
        self.status = OfferStatus::Withdrawn;
        self.responded_at = Some(now);
        Ok(())
    }

    /// Invalidates an open or accepted offer without an actor check.
    /// Used when a competing offer wins the tie-break or the listing is
    /// removed.
    pub fn force_reject(&mut self, now: DateTime<Utc>) -> Result<(), OfferError> {
        if !self.status.can_respond() && self.status != OfferStatus::Accepted {
            return Err(OfferError::InvalidTransition {
                current: self.status,
                action: "invalidate",
            });
        }
        self.status = OfferStatus::Rejected;
        self.responded_at = Some(now);
        Ok(())
    }

    /// Lapses the offer past its TTL.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), OfferError> {
        if !self.status.can_expire() {
            return Err(OfferError::InvalidTransition {
                current: self.status,
                action: "expire",
            });
        }
        self.status = OfferStatus::Expired;
        self.responded_at = Some(now);
        Ok(())
    }

    fn check_responder(&self, actor_id: UserId) -> Result<(), OfferError> {
        if !self.is_party(actor_id) {
            return Err(OfferError::NotAParty);
        }
        if actor_id == self.author_id {
            return Err(OfferError::NotCounterparty);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ListingTarget;
    use common::{FarmId, ListingId, SubjectId};

    fn ttl() -> Duration {
        Duration::days(7)
    }

    fn listing_with_seller(seller_id: UserId) -> Listing {
        Listing::new(
            ListingId::new(),
            seller_id,
            FarmId::new(),
            ListingTarget::Individual {
                subject_id: SubjectId::new(),
            },
            80.0,
            Money::from_minor(1000),
            vec![],
            Utc::now(),
        )
        .unwrap()
    }

    fn pending_offer() -> (Offer, UserId, UserId) {
        let seller = UserId::new();
        let buyer = UserId::new();
        let listing = listing_with_seller(seller);
        let offer = Offer::new_offer(
            OfferId::new(),
            &listing,
            buyer,
            Money::from_minor(70_000),
            Some("first offer".to_string()),
            Utc::now(),
            ttl(),
        )
        .unwrap();
        (offer, buyer, seller)
    }

    #[test]
    fn new_offer_is_pending_with_expiry() {
        let (offer, buyer, seller) = pending_offer();
        assert_eq!(offer.status, OfferStatus::Pending);
        assert_eq!(offer.author_id, buyer);
        assert_eq!(offer.seller_id, seller);
        assert!(offer.expires_at > offer.created_at);
        assert!(!offer.is_expired_at(offer.created_at));
        assert!(offer.is_expired_at(offer.created_at + ttl()));
    }

    #[test]
    fn self_purchase_is_rejected_at_creation() {
        let seller = UserId::new();
        let listing = listing_with_seller(seller);
        let result = Offer::new_offer(
            OfferId::new(),
            &listing,
            seller,
            Money::from_minor(1),
            None,
            Utc::now(),
            ttl(),
        );
        assert!(matches!(result, Err(OfferError::SelfPurchase)));

        let result = Offer::new_inquiry(OfferId::new(), &listing, seller, None, Utc::now(), ttl());
        assert!(matches!(result, Err(OfferError::SelfPurchase)));
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let seller = UserId::new();
        let listing = listing_with_seller(seller);
        let result = Offer::new_offer(
            OfferId::new(),
            &listing,
            UserId::new(),
            Money::from_minor(-5),
            None,
            Utc::now(),
            ttl(),
        );
        assert!(matches!(result, Err(OfferError::NegativeAmount)));
    }

    #[test]
    fn counter_supersedes_and_links_history() {
        let (mut offer, buyer, seller) = pending_offer();
        let now = Utc::now();

        let counter = offer
            .counter(
                OfferId::new(),
                seller,
                Money::from_minor(75_000),
                None,
                now,
                ttl(),
            )
            .unwrap();
        offer.mark_countered(now).unwrap();

        assert_eq!(offer.status, OfferStatus::Countered);
        assert_eq!(counter.status, OfferStatus::Pending);
        assert_eq!(counter.kind, OfferKind::CounterOffer);
        assert_eq!(counter.counter_of, Some(offer.id));
        assert_eq!(counter.author_id, seller);
        assert_eq!(counter.buyer_id, buyer);
    }

    #[test]
    fn author_cannot_counter_their_own_message() {
        let (offer, buyer, _) = pending_offer();
        let result = offer.counter(
            OfferId::new(),
            buyer,
            Money::from_minor(60_000),
            None,
            Utc::now(),
            ttl(),
        );
        assert!(matches!(result, Err(OfferError::NotCounterparty)));
    }

    #[test]
    fn stranger_cannot_respond() {
        let (mut offer, _, _) = pending_offer();
        assert!(matches!(
            offer.accept(UserId::new(), Utc::now()),
            Err(OfferError::NotAParty)
        ));
    }

    #[test]
    fn superseded_offer_cannot_be_countered_again() {
        let (mut offer, _, seller) = pending_offer();
        offer.mark_countered(Utc::now()).unwrap();
        let result = offer.counter(
            OfferId::new(),
            seller,
            Money::from_minor(72_000),
            None,
            Utc::now(),
            ttl(),
        );
        assert!(matches!(
            result,
            Err(OfferError::InvalidTransition {
                current: OfferStatus::Countered,
                action: "counter",
            })
        ));
    }

    #[test]
    fn counterparty_accepts_a_counter_offer() {
        let (mut offer, buyer, seller) = pending_offer();
        let now = Utc::now();
        let mut counter = offer
            .counter(
                OfferId::new(),
                seller,
                Money::from_minor(75_000),
                None,
                now,
                ttl(),
            )
            .unwrap();
        offer.mark_countered(now).unwrap();

        // The seller authored the counter, so only the buyer may accept it.
        assert!(matches!(
            counter.accept(seller, now),
            Err(OfferError::NotCounterparty)
        ));
        counter.accept(buyer, now).unwrap();
        assert_eq!(counter.status, OfferStatus::Accepted);
    }

    #[test]
    fn superseded_offer_remains_acceptable() {
        let (mut offer, _, seller) = pending_offer();
        offer.mark_countered(Utc::now()).unwrap();
        offer.accept(seller, Utc::now()).unwrap();
        assert_eq!(offer.status, OfferStatus::Accepted);
    }

    #[test]
    fn inquiry_cannot_be_accepted_or_countered() {
        let seller = UserId::new();
        let listing = listing_with_seller(seller);
        let mut inquiry = Offer::new_inquiry(
            OfferId::new(),
            &listing,
            UserId::new(),
            Some("is it still available?".to_string()),
            Utc::now(),
            ttl(),
        )
        .unwrap();

        assert!(matches!(
            inquiry.accept(seller, Utc::now()),
            Err(OfferError::InquiryNotNegotiable { .. })
        ));
        assert!(matches!(
            inquiry.counter(
                OfferId::new(),
                seller,
                Money::from_minor(1),
                None,
                Utc::now(),
                ttl()
            ),
            Err(OfferError::InquiryNotNegotiable { .. })
        ));
    }

    #[test]
    fn withdraw_is_author_only() {
        let (mut offer, buyer, seller) = pending_offer();
        assert!(matches!(
            offer.withdraw(seller, Utc::now()),
            Err(OfferError::NotAuthor)
        ));
        offer.withdraw(buyer, Utc::now()).unwrap();
        assert_eq!(offer.status, OfferStatus::Withdrawn);
        assert!(offer.status.is_terminal());
    }

    #[test]
    fn terminal_offers_reject_further_transitions() {
        let (mut offer, _, seller) = pending_offer();
        offer.reject(seller, Utc::now()).unwrap();
        assert!(matches!(
            offer.accept(seller, Utc::now()),
            Err(OfferError::InvalidTransition { .. })
        ));
        assert!(offer.expire(Utc::now()).is_err());
        assert!(offer.force_reject(Utc::now()).is_err());
    }

    #[test]
    fn force_reject_invalidates_accepted_offers() {
        let (mut offer, _, seller) = pending_offer();
        offer.accept(seller, Utc::now()).unwrap();
        offer.force_reject(Utc::now()).unwrap();
        assert_eq!(offer.status, OfferStatus::Rejected);
    }

    #[test]
    fn expire_covers_accepted_reservations() {
        let (mut offer, _, seller) = pending_offer();
        offer.accept(seller, Utc::now()).unwrap();
        offer.expire(Utc::now()).unwrap();
        assert_eq!(offer.status, OfferStatus::Expired);
    }
}
