use common::{BatchId, FarmId, ListingId, SubjectId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    BatchAggregate, Listing, ListingTarget, Money, SubjectMarketStatus, SubjectProjection,
};

fn bench_batch_aggregate(c: &mut Criterion) {
    let batch_id = BatchId::new();
    let members: Vec<SubjectProjection> = (0..500)
        .map(|i| {
            let mut projection = SubjectProjection::unlisted(SubjectId::new(), Some(batch_id));
            projection.status = match i % 3 {
                0 => SubjectMarketStatus::Sold,
                1 => SubjectMarketStatus::Listed,
                _ => SubjectMarketStatus::NotListed,
            };
            projection
        })
        .collect();

    c.bench_function("domain/batch_aggregate_500_members", |b| {
        b.iter(|| BatchAggregate::derive(batch_id, &members));
    });
}

fn bench_listing_lifecycle(c: &mut Criterion) {
    c.bench_function("domain/listing_create_reserve_sell", |b| {
        b.iter(|| {
            let mut listing = Listing::new(
                ListingId::new(),
                UserId::new(),
                FarmId::new(),
                ListingTarget::Individual {
                    subject_id: SubjectId::new(),
                },
                80.0,
                Money::from_minor(1000),
                vec![],
                chrono::Utc::now(),
            )
            .unwrap();
            listing.reserve().unwrap();
            listing.mark_sold(chrono::Utc::now()).unwrap();
            listing.calculated_price()
        });
    });
}

criterion_group!(benches, bench_batch_aggregate, bench_listing_lifecycle);
criterion_main!(benches);
