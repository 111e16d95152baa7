//! End-to-end engine flows over the in-memory store.

use common::{FarmId, SubjectId, UserId};
use domain::{
    BatchMarketStatus, ListingState, ListingTarget, Money, OfferStatus, SubjectMarketStatus,
};
use marketplace::{
    InMemoryLedger, InMemoryNotifier, ListingService, MarketplaceError, NegotiationService,
    NewListing, SaleFinalizer, SaleRequest,
};
use store::{InMemoryStore, MarketplaceStore, StoreSession};

struct World {
    store: InMemoryStore,
    ledger: InMemoryLedger,
    listings: ListingService<InMemoryStore, InMemoryNotifier>,
    negotiation: NegotiationService<InMemoryStore, InMemoryNotifier>,
    finalizer: SaleFinalizer<InMemoryStore, InMemoryLedger, InMemoryNotifier>,
}

fn world() -> World {
    let store = InMemoryStore::new();
    let ledger = InMemoryLedger::new();
    let notifier = InMemoryNotifier::new();
    World {
        listings: ListingService::new(store.clone(), notifier.clone()),
        negotiation: NegotiationService::new(store.clone(), notifier.clone()),
        finalizer: SaleFinalizer::new(store.clone(), ledger.clone(), notifier),
        store,
        ledger,
    }
}

#[tokio::test]
async fn negotiated_individual_sale_end_to_end() {
    let w = world();
    let seller = UserId::new();
    let buyer = UserId::new();
    let subject = SubjectId::new();
    w.store.seed_subject(subject, None).await;

    // Seller lists one subject: 80 kg at 1000 per kg.
    let listing = w
        .listings
        .create_listing(NewListing {
            seller_id: seller,
            farm_id: FarmId::new(),
            target: ListingTarget::Individual {
                subject_id: subject,
            },
            weight_kg: 80.0,
            price_per_kg: Money::from_minor(1000),
            photos: vec!["barn/pig-001.jpg".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(listing.calculated_price().minor(), 80_000);

    // Buyer opens at 70 000.
    let opening = w
        .negotiation
        .make_offer(
            listing.id,
            buyer,
            Money::from_minor(70_000),
            Some("would take it this week".to_string()),
        )
        .await
        .unwrap();

    // Seller counters at 75 000; the opening offer is superseded.
    let counter = w
        .negotiation
        .counter_offer(opening.id, seller, Money::from_minor(75_000), None)
        .await
        .unwrap();
    assert_eq!(
        w.negotiation.get_offer(opening.id).await.unwrap().status,
        OfferStatus::Countered
    );

    // Buyer accepts the counter; the listing is now reserved.
    w.negotiation.accept_offer(counter.id, buyer).await.unwrap();
    assert_eq!(
        w.listings.get_listing(listing.id).await.unwrap().status,
        ListingState::Reserved
    );

    // Seller finalizes at the agreed price.
    let outcome = w
        .finalizer
        .complete_sale(SaleRequest {
            listing_id: listing.id,
            buyer_id: buyer,
            seller_id: seller,
            final_price: Money::from_minor(75_000),
            payment_method: Some("cash".to_string()),
            notes: None,
            pickup_date: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.transaction.final_price.minor(), 75_000);
    assert_eq!(outcome.transaction.subject_ids, vec![subject]);

    let sold = w.listings.get_listing(listing.id).await.unwrap();
    assert_eq!(sold.status, ListingState::Sold);

    let mut session = w.store.begin().await.unwrap();
    let projection = session.subject(subject).await.unwrap().unwrap();
    assert_eq!(projection.status, SubjectMarketStatus::Sold);
    drop(session);

    assert_eq!(w.store.sale_count().await, 1);
    assert_eq!(w.ledger.entry_count(), 1);
    assert_eq!(
        w.ledger.entry_for(outcome.transaction.id).unwrap().amount,
        Money::from_minor(75_000)
    );
}

#[tokio::test]
async fn batch_sale_settles_every_member_and_the_aggregate() {
    let w = world();
    let seller = UserId::new();
    let buyer = UserId::new();
    let batch_id = common::BatchId::new();
    let members: Vec<SubjectId> = (0..5).map(|_| SubjectId::new()).collect();
    for id in &members {
        w.store.seed_subject(*id, Some(batch_id)).await;
    }

    let listing = w
        .listings
        .create_listing(NewListing {
            seller_id: seller,
            farm_id: FarmId::new(),
            target: ListingTarget::Batch { batch_id },
            weight_kg: 350.0,
            price_per_kg: Money::from_minor(950),
            photos: vec![],
        })
        .await
        .unwrap();

    let offer = w
        .negotiation
        .make_offer(listing.id, buyer, Money::from_minor(320_000), None)
        .await
        .unwrap();
    w.negotiation.accept_offer(offer.id, seller).await.unwrap();

    let outcome = w
        .finalizer
        .complete_sale(SaleRequest {
            listing_id: listing.id,
            buyer_id: buyer,
            seller_id: seller,
            final_price: Money::from_minor(320_000),
            payment_method: None,
            notes: Some("pickup at the north gate".to_string()),
            pickup_date: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.cleanup.subjects_updated, 5);

    let mut session = w.store.begin().await.unwrap();
    let aggregate = session.batch_aggregate(batch_id).await.unwrap().unwrap();
    assert_eq!(aggregate.status, BatchMarketStatus::Sold);

    // The batch aggregate law: sold iff every member is sold.
    for id in &members {
        let projection = session.subject(*id).await.unwrap().unwrap();
        assert_eq!(projection.status, SubjectMarketStatus::Sold);
    }
}

#[tokio::test]
async fn no_subject_is_ever_sold_twice() {
    let w = world();
    let seller = UserId::new();
    let subject = SubjectId::new();
    w.store.seed_subject(subject, None).await;

    let listing = w
        .listings
        .create_listing(NewListing {
            seller_id: seller,
            farm_id: FarmId::new(),
            target: ListingTarget::Individual {
                subject_id: subject,
            },
            weight_kg: 60.0,
            price_per_kg: Money::from_minor(1000),
            photos: vec![],
        })
        .await
        .unwrap();

    let buyer = UserId::new();
    let offer = w
        .negotiation
        .make_offer(listing.id, buyer, Money::from_minor(55_000), None)
        .await
        .unwrap();
    w.negotiation.accept_offer(offer.id, seller).await.unwrap();
    w.finalizer
        .complete_sale(SaleRequest {
            listing_id: listing.id,
            buyer_id: buyer,
            seller_id: seller,
            final_price: Money::from_minor(55_000),
            payment_method: None,
            notes: None,
            pickup_date: None,
        })
        .await
        .unwrap();

    // The sold subject cannot be listed again.
    let relist = w
        .listings
        .create_listing(NewListing {
            seller_id: seller,
            farm_id: FarmId::new(),
            target: ListingTarget::Individual {
                subject_id: subject,
            },
            weight_kg: 60.0,
            price_per_kg: Money::from_minor(1000),
            photos: vec![],
        })
        .await;
    assert!(matches!(
        relist,
        Err(MarketplaceError::DuplicateActiveListing { .. })
    ));

    // And no active listing references it anywhere.
    let mut session = w.store.begin().await.unwrap();
    let active = session
        .active_listings_for_subjects(&[subject], None)
        .await
        .unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
async fn expired_reservation_reopens_negotiation() {
    let w = world();
    let seller = UserId::new();
    let subject = SubjectId::new();
    w.store.seed_subject(subject, None).await;

    let negotiation = NegotiationService::new(w.store.clone(), InMemoryNotifier::new())
        .with_ttl(chrono::Duration::zero());

    let listing = w
        .listings
        .create_listing(NewListing {
            seller_id: seller,
            farm_id: FarmId::new(),
            target: ListingTarget::Individual {
                subject_id: subject,
            },
            weight_kg: 90.0,
            price_per_kg: Money::from_minor(800),
            photos: vec![],
        })
        .await
        .unwrap();

    let ghost_buyer = UserId::new();
    let offer = negotiation
        .make_offer(listing.id, ghost_buyer, Money::from_minor(60_000), None)
        .await
        .unwrap();
    negotiation.accept_offer(offer.id, seller).await.unwrap();

    // The buyer disappears; the sweep reclaims the listing.
    let report = negotiation
        .expire_stale_offers(chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(report.listings_released, 1);

    // A new buyer can now make an offer and close the deal.
    let buyer = UserId::new();
    let offer = w
        .negotiation
        .make_offer(listing.id, buyer, Money::from_minor(70_000), None)
        .await
        .unwrap();
    w.negotiation.accept_offer(offer.id, seller).await.unwrap();
    let outcome = w
        .finalizer
        .complete_sale(SaleRequest {
            listing_id: listing.id,
            buyer_id: buyer,
            seller_id: seller,
            final_price: Money::from_minor(70_000),
            payment_method: None,
            notes: None,
            pickup_date: None,
        })
        .await
        .unwrap();
    assert_eq!(outcome.transaction.buyer_id, buyer);
}

#[tokio::test]
async fn two_buyers_racing_to_buy_get_exactly_one_sale() {
    let w = world();
    let seller = UserId::new();
    let subject = SubjectId::new();
    w.store.seed_subject(subject, None).await;

    let listing = w
        .listings
        .create_listing(NewListing {
            seller_id: seller,
            farm_id: FarmId::new(),
            target: ListingTarget::Individual {
                subject_id: subject,
            },
            weight_kg: 80.0,
            price_per_kg: Money::from_minor(1000),
            photos: vec![],
        })
        .await
        .unwrap();

    let alice = UserId::new();
    let bob = UserId::new();
    let offer = w
        .negotiation
        .make_offer(listing.id, alice, Money::from_minor(78_000), None)
        .await
        .unwrap();
    w.negotiation.accept_offer(offer.id, seller).await.unwrap();

    let make_request = |buyer: UserId| SaleRequest {
        listing_id: listing.id,
        buyer_id: buyer,
        seller_id: seller,
        final_price: Money::from_minor(78_000),
        payment_method: None,
        notes: None,
        pickup_date: None,
    };

    let alice_finalizer = SaleFinalizer::new(
        w.store.clone(),
        w.ledger.clone(),
        InMemoryNotifier::new(),
    );
    let bob_finalizer = SaleFinalizer::new(
        w.store.clone(),
        w.ledger.clone(),
        InMemoryNotifier::new(),
    );

    let (alice_result, bob_result) = tokio::join!(
        alice_finalizer.complete_sale(make_request(alice)),
        bob_finalizer.complete_sale(make_request(bob)),
    );

    // Exactly one winner, and it is the buyer holding the accepted offer.
    let outcome = alice_result.expect("accepted buyer must win");
    assert_eq!(outcome.transaction.buyer_id, alice);
    assert!(matches!(
        bob_result,
        Err(MarketplaceError::ListingNotAvailable { .. })
    ));

    assert_eq!(w.store.sale_count().await, 1);
    assert_eq!(w.ledger.entry_count(), 1);
}
